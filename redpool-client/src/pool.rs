//! # Connection Pool
//!
//! Purpose: Hand out exclusive-use connections to the backing store under a
//! hard capacity bound, blocking callers briefly instead of failing fast.
//!
//! ## Design Principles
//! 1. **Exclusive Handles**: A connection is owned by exactly one in-flight
//!    operation; nothing above the pool needs locking.
//! 2. **Release on Every Path**: The RAII guard returns the connection on
//!    success, failure and panic alike.
//! 3. **Timed Acquisition**: Waiting callers are woken as connections come
//!    back; past the acquire timeout they get `ResourceExhausted`.
//! 4. **No Broken Reuse**: A connection that saw a transport or framing error
//!    is discarded, never re-pooled.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use redpool_proto::{read_reply, Reply};
use tracing::debug;

use crate::command::Command;
use crate::config::ClientConfig;
use crate::error::{GatewayError, GatewayResult};

#[derive(Debug)]
struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

#[derive(Debug)]
struct PoolInner {
    config: ClientConfig,
    addr: SocketAddr,
    state: Mutex<PoolState>,
    available: Condvar,
}

/// Bounded pool of connections to one backing store.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionPool {
    inner: Arc<PoolInner>,
}

/// Snapshot of pool occupancy, exposed for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently open (idle + in-use).
    pub total: usize,
    /// Connections sitting idle in the pool.
    pub idle: usize,
}

impl PoolStats {
    /// Connections currently borrowed by in-flight operations.
    pub fn in_use(&self) -> usize {
        self.total - self.idle
    }
}

impl ConnectionPool {
    /// Creates the pool, resolving the configured address eagerly so a bad
    /// address is a caller failure at construction, not a per-call surprise.
    pub(crate) fn new(config: ClientConfig) -> GatewayResult<Self> {
        let addr = config
            .addr
            .to_socket_addrs()
            .map_err(|_| GatewayError::InvalidAddress(config.addr.clone()))?
            .next()
            .ok_or_else(|| GatewayError::InvalidAddress(config.addr.clone()))?;

        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
        };
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                addr,
                state: Mutex::new(state),
                available: Condvar::new(),
            }),
        })
    }

    /// Acquires a connection, blocking up to the configured acquire timeout.
    pub(crate) fn acquire(&self) -> GatewayResult<PooledConnection> {
        let timeout = self.inner.config.acquire_timeout;
        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();

        loop {
            if let Some(conn) = state.idle.pop_front() {
                return Ok(PooledConnection::new(self.clone(), conn));
            }

            if state.total < self.inner.config.max_total {
                state.total += 1;
                drop(state);
                return match Connection::connect(&self.inner) {
                    Ok(conn) => Ok(PooledConnection::new(self.clone(), conn)),
                    Err(err) => {
                        self.release_slot();
                        Err(err)
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(GatewayError::ResourceExhausted(timeout));
            }
            let (next, _) = self
                .inner
                .available
                .wait_timeout(state, deadline - now)
                .expect("pool mutex poisoned");
            state = next;
        }
    }

    /// Returns a detached connection to the idle set.
    ///
    /// Used when a subscription ends cleanly and its connection is back in
    /// plain request/response mode.
    pub(crate) fn restore(&self, conn: Connection) {
        self.return_connection(conn);
    }

    /// Gives up the slot of a detached connection that died.
    pub(crate) fn forget_detached(&self) {
        self.release_slot();
    }

    /// The read timeout ordinary operations run under.
    pub(crate) fn read_timeout(&self) -> Option<Duration> {
        self.inner.config.read_timeout
    }

    /// Current occupancy.
    pub(crate) fn stats(&self) -> PoolStats {
        let state = self.lock_state();
        PoolStats {
            total: state.total,
            idle: state.idle.len(),
        }
    }

    /// Drops all idle connections. In-flight guards still return normally and
    /// are dropped on their way back once over the idle cap.
    pub(crate) fn close(&self) {
        let mut state = self.lock_state();
        let drained = state.idle.len();
        state.idle.clear();
        state.total -= drained;
        self.inner.available.notify_all();
    }

    fn return_connection(&self, conn: Connection) {
        let mut state = self.lock_state();
        if state.idle.len() < self.inner.config.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
        drop(state);
        self.inner.available.notify_one();
    }

    fn release_slot(&self) {
        let mut state = self.lock_state();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.inner.available.notify_one();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.inner.state.lock().expect("pool mutex poisoned")
    }
}

/// RAII pool handle: exclusive use of one connection for one logical
/// operation, returned to the pool on drop on every exit path.
pub(crate) struct PooledConnection {
    pool: ConnectionPool,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: ConnectionPool, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Runs one command and reads its reply.
    pub(crate) fn run(&mut self, cmd: &Command) -> GatewayResult<Reply> {
        let conn = self.conn.as_mut().expect("connection present");
        let result = conn.run(cmd);
        if result.is_err() {
            self.valid = false;
        }
        result
    }

    /// Writes pre-encoded bytes (a flushed batch) without reading.
    pub(crate) fn send_raw(&mut self, bytes: &[u8]) -> GatewayResult<()> {
        let conn = self.conn.as_mut().expect("connection present");
        let result = conn.send_raw(bytes);
        if result.is_err() {
            self.valid = false;
        }
        result
    }

    /// Reads one reply without writing.
    pub(crate) fn read_reply(&mut self) -> GatewayResult<Reply> {
        let conn = self.conn.as_mut().expect("connection present");
        let result = conn.read_reply();
        if result.is_err() {
            self.valid = false;
        }
        result
    }

    /// Takes the connection out of the guard without returning it to the
    /// pool. The slot stays reserved; the caller must later `restore` the
    /// connection or `forget_detached` the slot. Subscriptions use this: a
    /// connection in push mode must not re-enter the pool while subscribed.
    pub(crate) fn detach(mut self) -> Connection {
        self.conn.take().expect("connection present")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return, // detached
        };
        if self.valid {
            self.pool.return_connection(conn);
        } else {
            debug!("discarding connection after transport failure");
            drop(conn);
            self.pool.release_slot();
        }
    }
}

/// One TCP connection with reusable encode and parse buffers.
#[derive(Debug)]
pub(crate) struct Connection {
    reader: BufReader<TcpStream>,
    scratch: Vec<u8>,
    write_buf: BytesMut,
}

impl Connection {
    fn connect(inner: &PoolInner) -> GatewayResult<Self> {
        let config = &inner.config;
        let stream = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&inner.addr, timeout)?,
            None => TcpStream::connect(inner.addr)?,
        };
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        // Small request/reply payloads; Nagle only adds latency here.
        stream.set_nodelay(true)?;
        debug!(addr = %inner.addr, "opened connection");

        Ok(Connection {
            reader: BufReader::new(stream),
            scratch: Vec::with_capacity(128),
            write_buf: BytesMut::with_capacity(256),
        })
    }

    pub(crate) fn run(&mut self, cmd: &Command) -> GatewayResult<Reply> {
        self.write_buf.clear();
        cmd.write(&mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        self.read_reply()
    }

    /// Writes a command without waiting for a reply. Subscription setup uses
    /// this: confirmations arrive as push frames in the listen loop.
    pub(crate) fn send_command(&mut self, cmd: &Command) -> GatewayResult<()> {
        self.write_buf.clear();
        cmd.write(&mut self.write_buf);
        let bytes = self.write_buf.split().freeze();
        self.send_raw(&bytes)
    }

    pub(crate) fn send_raw(&mut self, bytes: &[u8]) -> GatewayResult<()> {
        let stream = self.reader.get_mut();
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }

    pub(crate) fn read_reply(&mut self) -> GatewayResult<Reply> {
        Ok(read_reply(&mut self.reader, &mut self.scratch)?)
    }

    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) -> GatewayResult<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    /// Clones the underlying stream so another thread can write control
    /// commands (unsubscribe) while this side blocks reading.
    pub(crate) fn control_stream(&self) -> GatewayResult<TcpStream> {
        Ok(self.reader.get_ref().try_clone()?)
    }
}
