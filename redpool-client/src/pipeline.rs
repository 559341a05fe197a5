//! # Batch (Pipelined) Execution
//!
//! Purpose: Stage an ordered sequence of commands against one connection,
//! flush them in a single write, and return replies in stage order.
//!
//! ## Design Principles
//! 1. **No Round Trips While Staging**: Staged commands only append to a
//!    buffer; nothing touches the network until the flush.
//! 2. **Stage Order Is Reply Order**: Callers correlate inputs to outputs
//!    positionally; the i-th reply answers the i-th staged command.
//! 3. **Release on Every Path**: The pool guard covers staging failures too.

use bytes::BytesMut;
use redpool_proto::Reply;

use crate::command::Command;
use crate::error::GatewayResult;
use crate::pool::ConnectionPool;

/// Batch builder handed to the staging closure.
///
/// Commands staged here share one connection and are flushed together.
/// Per-command server errors come back as `Reply::Error` entries in their
/// staged position; transport failures fail the whole batch.
pub struct Pipeline {
    buf: BytesMut,
    count: usize,
}

impl Pipeline {
    pub(crate) fn new() -> Self {
        Pipeline {
            buf: BytesMut::with_capacity(512),
            count: 0,
        }
    }

    /// Stages an arbitrary command.
    pub fn cmd(&mut self, cmd: Command) -> &mut Self {
        cmd.write(&mut self.buf);
        self.count += 1;
        self
    }

    /// Number of commands staged so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    // Convenience stagers for the common cases.

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> &mut Self {
        self.cmd(Command::new("SET").arg(key).arg(value))
    }

    pub fn get(&mut self, key: &[u8]) -> &mut Self {
        self.cmd(Command::new("GET").arg(key))
    }

    pub fn del(&mut self, key: &[u8]) -> &mut Self {
        self.cmd(Command::new("DEL").arg(key))
    }

    pub fn incr(&mut self, key: &[u8]) -> &mut Self {
        self.cmd(Command::new("INCR").arg(key))
    }

    pub fn expire(&mut self, key: &[u8], seconds: u64) -> &mut Self {
        self.cmd(Command::new("EXPIRE").arg(key).arg(seconds))
    }

    pub fn hset(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> &mut Self {
        self.cmd(Command::new("HSET").arg(key).arg(field).arg(value))
    }

    pub fn lpush(&mut self, key: &[u8], value: &[u8]) -> &mut Self {
        self.cmd(Command::new("LPUSH").arg(key).arg(value))
    }

    pub fn sadd(&mut self, key: &[u8], member: &[u8]) -> &mut Self {
        self.cmd(Command::new("SADD").arg(key).arg(member))
    }

    pub fn zadd(&mut self, key: &[u8], score: f64, member: &[u8]) -> &mut Self {
        self.cmd(Command::new("ZADD").arg(key).arg(score).arg(member))
    }
}

/// Acquires one connection, runs the staging closure, flushes the batch, and
/// reads exactly as many replies as were staged, in order.
pub(crate) fn run<F>(pool: &ConnectionPool, stage: F) -> GatewayResult<Vec<Reply>>
where
    F: FnOnce(&mut Pipeline) -> GatewayResult<()>,
{
    let mut conn = pool.acquire()?;
    let mut pipe = Pipeline::new();
    // A staging failure propagates here; the guard still releases the slot.
    stage(&mut pipe)?;

    if pipe.is_empty() {
        return Ok(Vec::new());
    }

    conn.send_raw(&pipe.buf)?;
    let mut replies = Vec::with_capacity(pipe.count);
    for _ in 0..pipe.count {
        replies.push(conn.read_reply()?);
    }
    Ok(replies)
}
