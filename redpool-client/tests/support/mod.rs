//! Minimal RESP2 server for exercising the gateway without a real store.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use redpool_client::{ClientConfig, RedisClient};

pub struct MockServer {
    pub addr: String,
}

/// Spawns a server that accepts any number of connections and feeds every
/// parsed command to `handler` together with a reply writer.
pub fn spawn_server<H>(handler: H) -> MockServer
where
    H: Fn(Vec<Vec<u8>>, &mut Wire) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let handler: Arc<H> = Arc::new(handler);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(_) => return,
            };
            let handler = handler.clone();
            thread::spawn(move || serve(stream, handler));
        }
    });

    MockServer { addr }
}

fn serve<H>(stream: TcpStream, handler: Arc<H>)
where
    H: Fn(Vec<Vec<u8>>, &mut Wire) + Send + Sync + 'static,
{
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
    let mut reader = BufReader::new(stream.try_clone().expect("clone"));
    let mut wire = Wire { stream };
    while let Ok(Some(args)) = read_command(&mut reader) {
        handler(args, &mut wire);
    }
}

/// Reply writer handed to test handlers.
pub struct Wire {
    stream: TcpStream,
}

#[allow(dead_code)]
impl Wire {
    pub fn simple(&mut self, text: &str) {
        self.raw(format!("+{text}\r\n").as_bytes());
    }

    pub fn error(&mut self, text: &str) {
        self.raw(format!("-{text}\r\n").as_bytes());
    }

    pub fn int(&mut self, value: i64) {
        self.raw(format!(":{value}\r\n").as_bytes());
    }

    pub fn nil(&mut self) {
        self.raw(b"$-1\r\n");
    }

    pub fn bulk(&mut self, data: &[u8]) {
        let _ = self.stream.write_all(format!("${}\r\n", data.len()).as_bytes());
        let _ = self.stream.write_all(data);
        self.raw(b"\r\n");
    }

    pub fn array_header(&mut self, len: usize) {
        self.raw(format!("*{len}\r\n").as_bytes());
    }

    /// `["subscribe"|"unsubscribe"|..., name, count]` confirmation frame.
    pub fn sub_ack(&mut self, kind: &str, name: &[u8], count: i64) {
        self.array_header(3);
        self.bulk(kind.as_bytes());
        self.bulk(name);
        self.raw(format!(":{count}\r\n").as_bytes());
    }

    pub fn message(&mut self, channel: &[u8], payload: &[u8]) {
        self.array_header(3);
        self.bulk(b"message");
        self.bulk(channel);
        self.bulk(payload);
    }

    pub fn pmessage(&mut self, pattern: &[u8], channel: &[u8], payload: &[u8]) {
        self.array_header(4);
        self.bulk(b"pmessage");
        self.bulk(pattern);
        self.bulk(channel);
        self.bulk(payload);
    }

    /// Drops the connection from the server side.
    pub fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    fn raw(&mut self, bytes: &[u8]) {
        let _ = self.stream.write_all(bytes);
        let _ = self.stream.flush();
    }
}

fn read_command(reader: &mut BufReader<TcpStream>) -> std::io::Result<Option<Vec<Vec<u8>>>> {
    let mut line = Vec::new();
    if read_line(reader, &mut line)?.is_none() {
        return Ok(None);
    }
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array header"));
    }
    let count = parse_usize(&line[1..])?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        read_line(reader, &mut line)?.ok_or_else(|| invalid("eof inside command"))?;
        if line.first() != Some(&b'$') {
            return Err(invalid("expected bulk header"));
        }
        let len = parse_usize(&line[1..])?;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if crlf != [b'\r', b'\n'] {
            return Err(invalid("missing crlf"));
        }
        args.push(data);
    }
    Ok(Some(args))
}

fn read_line(reader: &mut BufReader<TcpStream>, buf: &mut Vec<u8>) -> std::io::Result<Option<()>> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Ok(None);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(invalid("line not crlf terminated"));
    }
    buf.truncate(buf.len() - 2);
    Ok(Some(()))
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    if data.is_empty() {
        return Err(invalid("empty length"));
    }
    let mut value = 0usize;
    for &b in data {
        if !b.is_ascii_digit() {
            return Err(invalid("non-digit length"));
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as usize);
    }
    Ok(value)
}

fn invalid(reason: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, reason.to_string())
}

/// Spawns a server backed by a real key space, covering the handful of
/// commands the round-trip tests need (SET/GET/DEL/EXISTS/INCR).
#[allow(dead_code)]
pub fn store_server() -> MockServer {
    let store = std::sync::Mutex::new(std::collections::HashMap::<Vec<u8>, Vec<u8>>::new());
    spawn_server(move |args, wire| {
        let mut store = store.lock().expect("store mutex");
        match args[0].as_slice() {
            b"SET" => {
                store.insert(args[1].clone(), args[2].clone());
                wire.simple("OK");
            }
            b"GET" => match store.get(&args[1]) {
                Some(value) => wire.bulk(value),
                None => wire.nil(),
            },
            b"DEL" => {
                let removed = store.remove(&args[1]).is_some();
                wire.int(if removed { 1 } else { 0 });
            }
            b"EXISTS" => {
                wire.int(if store.contains_key(&args[1]) { 1 } else { 0 });
            }
            b"INCR" => {
                let entry = store.entry(args[1].clone()).or_insert_with(|| b"0".to_vec());
                let current: i64 = String::from_utf8_lossy(entry).parse().unwrap_or(0);
                *entry = (current + 1).to_string().into_bytes();
                wire.int(current + 1);
            }
            b"PING" => wire.simple("PONG"),
            _ => wire.error("ERR unknown command"),
        }
    })
}

/// Base config pointed at the mock server; tests tighten the knobs they care
/// about.
#[allow(dead_code)]
pub fn base_config(addr: &str) -> ClientConfig {
    ClientConfig {
        addr: addr.to_string(),
        max_idle: 4,
        max_total: 4,
        acquire_timeout: Duration::from_secs(1),
        read_timeout: Some(Duration::from_secs(2)),
        write_timeout: Some(Duration::from_secs(2)),
        connect_timeout: Some(Duration::from_secs(2)),
        dispatch_workers: 2,
    }
}

#[allow(dead_code)]
pub fn connect(addr: &str) -> RedisClient {
    RedisClient::with_config(base_config(addr)).expect("client")
}
