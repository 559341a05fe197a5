//! # Operation Executor
//!
//! Purpose: Run exactly one command per call against a pooled connection,
//! with one acquire/run/translate/release discipline shared by every
//! operation the facade exposes.
//!
//! ## Design Principles
//! 1. **One Generic Path**: Operations differ only in their `Command` and
//!    their reply adaptation; the control flow is written once.
//! 2. **Release Always**: The pool guard returns the connection on success,
//!    error and panic alike.
//! 3. **No Retries**: Failures propagate immediately; retry policy belongs to
//!    the caller.

use std::collections::HashMap;

use redpool_proto::Reply;

use crate::command::Command;
use crate::error::{GatewayError, GatewayResult};
use crate::pool::ConnectionPool;

/// Runs single commands against the pool.
#[derive(Debug, Clone)]
pub(crate) struct Executor {
    pool: ConnectionPool,
}

impl Executor {
    pub(crate) fn new(pool: ConnectionPool) -> Self {
        Executor { pool }
    }

    /// Acquires a connection, runs `cmd`, translates a server error reply
    /// into the gateway error, and adapts the reply to `T`.
    ///
    /// The guard releases the connection on every exit path, so sustained
    /// failures cannot exhaust the pool.
    pub(crate) fn execute<T: FromReply>(&self, cmd: &Command) -> GatewayResult<T> {
        let mut conn = self.pool.acquire()?;
        match conn.run(cmd)? {
            Reply::Error(message) => Err(GatewayError::Server(message)),
            reply => T::from_reply(reply),
        }
    }
}

/// Adapts one reply into the typed result an operation promises.
pub trait FromReply: Sized {
    fn from_reply(reply: Reply) -> GatewayResult<Self>;
}

fn unexpected<T>(reply: Reply) -> GatewayResult<T> {
    Err(GatewayError::UnexpectedReply(reply.kind()))
}

impl FromReply for Reply {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        Ok(reply)
    }
}

impl FromReply for () {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        match reply {
            Reply::Simple(_) => Ok(()),
            other => unexpected(other),
        }
    }
}

impl FromReply for bool {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        match reply {
            Reply::Integer(value) => Ok(value != 0),
            Reply::Simple(ref status) if status == b"OK" => Ok(true),
            Reply::Nil => Ok(false),
            other => unexpected(other),
        }
    }
}

impl FromReply for i64 {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        match reply {
            Reply::Integer(value) => Ok(value),
            other => unexpected(other),
        }
    }
}

impl FromReply for f64 {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        match reply {
            Reply::Integer(value) => Ok(value as f64),
            Reply::Bulk(data) => std::str::from_utf8(&data)
                .ok()
                .and_then(|text| text.parse().ok())
                .ok_or(GatewayError::Protocol("malformed double reply")),
            other => unexpected(other),
        }
    }
}

impl FromReply for Option<f64> {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        match reply {
            Reply::Nil => Ok(None),
            other => f64::from_reply(other).map(Some),
        }
    }
}

impl FromReply for Vec<u8> {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        match reply {
            Reply::Simple(data) | Reply::Bulk(data) => Ok(data),
            other => unexpected(other),
        }
    }
}

impl FromReply for Option<Vec<u8>> {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        match reply {
            Reply::Nil => Ok(None),
            other => Vec::<u8>::from_reply(other).map(Some),
        }
    }
}

impl FromReply for String {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        Ok(String::from_utf8(Vec::<u8>::from_reply(reply)?)?)
    }
}

impl FromReply for Option<String> {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        match reply {
            Reply::Nil => Ok(None),
            other => String::from_reply(other).map(Some),
        }
    }
}

impl FromReply for Vec<Vec<u8>> {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        match reply {
            Reply::Array(items) => items.into_iter().map(Vec::<u8>::from_reply).collect(),
            Reply::Nil => Ok(Vec::new()),
            other => unexpected(other),
        }
    }
}

impl FromReply for Vec<String> {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        Vec::<Vec<u8>>::from_reply(reply)?
            .into_iter()
            .map(|data| Ok(String::from_utf8(data)?))
            .collect()
    }
}

impl FromReply for Vec<Option<Vec<u8>>> {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        match reply {
            Reply::Array(items) => items
                .into_iter()
                .map(Option::<Vec<u8>>::from_reply)
                .collect(),
            other => unexpected(other),
        }
    }
}

/// Blocking list pops reply with `[key, value]` or nil on timeout.
impl FromReply for Option<(Vec<u8>, Vec<u8>)> {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        match reply {
            Reply::Nil => Ok(None),
            Reply::Array(items) if items.len() == 2 => {
                let mut items = items.into_iter();
                let key = Vec::<u8>::from_reply(items.next().expect("len checked"))?;
                let value = Vec::<u8>::from_reply(items.next().expect("len checked"))?;
                Ok(Some((key, value)))
            }
            other => unexpected(other),
        }
    }
}

/// Flat field/value arrays, as returned by HGETALL.
impl FromReply for HashMap<Vec<u8>, Vec<u8>> {
    fn from_reply(reply: Reply) -> GatewayResult<Self> {
        let flat = Vec::<Vec<u8>>::from_reply(reply)?;
        if flat.len() % 2 != 0 {
            return Err(GatewayError::Protocol("odd-length field/value reply"));
        }
        let mut map = HashMap::with_capacity(flat.len() / 2);
        let mut entries = flat.into_iter();
        while let (Some(field), Some(value)) = (entries.next(), entries.next()) {
            map.insert(field, value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_accepts_status_only() {
        assert!(<()>::from_reply(Reply::Simple(b"OK".to_vec())).is_ok());
        assert!(matches!(
            <()>::from_reply(Reply::Integer(1)),
            Err(GatewayError::UnexpectedReply("integer"))
        ));
    }

    #[test]
    fn bool_covers_integer_and_status() {
        assert!(bool::from_reply(Reply::Integer(1)).unwrap());
        assert!(!bool::from_reply(Reply::Integer(0)).unwrap());
        assert!(bool::from_reply(Reply::Simple(b"OK".to_vec())).unwrap());
        assert!(!bool::from_reply(Reply::Nil).unwrap());
    }

    #[test]
    fn optional_bulk_distinguishes_nil_from_empty() {
        assert_eq!(Option::<Vec<u8>>::from_reply(Reply::Nil).unwrap(), None);
        assert_eq!(
            Option::<Vec<u8>>::from_reply(Reply::Bulk(Vec::new())).unwrap(),
            Some(Vec::new())
        );
    }

    #[test]
    fn doubles_parse_from_bulk() {
        assert_eq!(f64::from_reply(Reply::Bulk(b"1.5".to_vec())).unwrap(), 1.5);
        assert!(matches!(
            f64::from_reply(Reply::Bulk(b"not-a-number".to_vec())),
            Err(GatewayError::Protocol(_))
        ));
    }

    #[test]
    fn field_value_map_rejects_odd_length() {
        let reply = Reply::Array(vec![
            Reply::Bulk(b"f".to_vec()),
            Reply::Bulk(b"v".to_vec()),
            Reply::Bulk(b"dangling".to_vec()),
        ]);
        assert!(matches!(
            HashMap::<Vec<u8>, Vec<u8>>::from_reply(reply),
            Err(GatewayError::Protocol(_))
        ));
    }

    #[test]
    fn blocking_pop_pair() {
        let reply = Reply::Array(vec![Reply::Bulk(b"q".to_vec()), Reply::Bulk(b"job".to_vec())]);
        assert_eq!(
            Option::<(Vec<u8>, Vec<u8>)>::from_reply(reply).unwrap(),
            Some((b"q".to_vec(), b"job".to_vec()))
        );
        assert_eq!(Option::<(Vec<u8>, Vec<u8>)>::from_reply(Reply::Nil).unwrap(), None);
    }
}
