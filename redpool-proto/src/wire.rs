//! RESP2 framing: command encoding and reply parsing.

use std::io::BufRead;

use bytes::BytesMut;
use thiserror::Error;

use crate::reply::Reply;

/// Failures at the wire level.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    Frame(&'static str),
}

/// Writes the `*<n>\r\n` header of a command array.
pub fn write_array_header(count: usize, out: &mut BytesMut) {
    out.extend_from_slice(b"*");
    write_decimal(count as u64, out);
    out.extend_from_slice(b"\r\n");
}

/// Writes one binary-safe bulk-string argument.
pub fn write_bulk(data: &[u8], out: &mut BytesMut) {
    out.extend_from_slice(b"$");
    write_decimal(data.len() as u64, out);
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Encodes a whole command (name plus arguments) as a RESP2 array.
pub fn write_command(args: &[&[u8]], out: &mut BytesMut) {
    write_array_header(args.len(), out);
    for arg in args {
        write_bulk(arg, out);
    }
}

/// Reads one reply from the buffered stream.
///
/// `scratch` holds the current header line between calls so nested arrays do
/// not allocate a line buffer per element.
pub fn read_reply<R: BufRead>(reader: &mut R, scratch: &mut Vec<u8>) -> Result<Reply, WireError> {
    read_line(reader, scratch)?;
    if scratch.is_empty() {
        return Err(WireError::Frame("empty header line"));
    }

    match scratch[0] {
        b'+' => Ok(Reply::Simple(scratch[1..].to_vec())),
        b'-' => Ok(Reply::Error(scratch[1..].to_vec())),
        b':' => Ok(Reply::Integer(parse_i64(&scratch[1..])?)),
        b'$' => {
            let len = parse_i64(&scratch[1..])?;
            read_bulk(reader, len)
        }
        b'*' => {
            let len = parse_i64(&scratch[1..])?;
            read_array(reader, len, scratch)
        }
        _ => Err(WireError::Frame("unknown type marker")),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> Result<Reply, WireError> {
    if len < 0 {
        return Ok(Reply::Nil);
    }

    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data)?;

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != [b'\r', b'\n'] {
        return Err(WireError::Frame("bulk payload not terminated"));
    }
    Ok(Reply::Bulk(data))
}

fn read_array<R: BufRead>(
    reader: &mut R,
    len: i64,
    scratch: &mut Vec<u8>,
) -> Result<Reply, WireError> {
    if len < 0 {
        return Ok(Reply::Nil);
    }

    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
        items.push(read_reply(reader, scratch)?);
    }
    Ok(Reply::Array(items))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<(), WireError> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(WireError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed mid-reply",
        )));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(WireError::Frame("header line not CRLF terminated"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> Result<i64, WireError> {
    if data.is_empty() {
        return Err(WireError::Frame("empty integer"));
    }

    let (digits, negative) = match data[0] {
        b'-' => (&data[1..], true),
        _ => (data, false),
    };
    if digits.is_empty() {
        return Err(WireError::Frame("empty integer"));
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(WireError::Frame("non-digit in integer"));
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as i64))
            .ok_or(WireError::Frame("integer overflow"))?;
    }
    Ok(if negative { -value } else { value })
}

fn write_decimal(mut value: u64, out: &mut BytesMut) {
    // Digits land in a stack buffer first to keep encoding allocation-free.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
        buf[..len].reverse();
    }
    out.extend_from_slice(&buf[..len]);
}
