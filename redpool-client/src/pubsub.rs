//! # Subscriptions
//!
//! Purpose: Bind a dedicated connection to a set of channels or patterns and
//! deliver inbound messages to a caller handler on a background worker.
//!
//! ## Design Principles
//! 1. **Dedicated Handle**: A subscribed connection is in push mode and must
//!    not re-enter the pool until explicitly unsubscribed; reusing it for
//!    ordinary commands would corrupt the pool's view of its state.
//! 2. **Caller Never Blocks**: Setup and the listen loop run on the dispatch
//!    workers; `subscribe` returns a handle immediately.
//! 3. **Handlers Cannot Kill the Loop**: A panicking handler is logged and
//!    the next message is still delivered.
//! 4. **No Silent Death**: A connection dropping mid-subscription terminates
//!    the loop with an error log; reconnecting is a higher-level concern.

use std::io::Write;
use std::net::TcpStream;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};

use bytes::BytesMut;
use redpool_proto::Reply;
use tracing::{debug, error, warn};

use crate::command::Command;
use crate::dispatch::WorkerPool;
use crate::error::{GatewayError, GatewayResult};
use crate::pool::{Connection, ConnectionPool};

/// One message delivered to a subscription handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel the message was published to.
    pub channel: Vec<u8>,
    /// Raw message payload.
    pub payload: Vec<u8>,
    /// The matching pattern, for pattern subscriptions.
    pub pattern: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubscribeMode {
    Channels,
    Patterns,
}

impl SubscribeMode {
    fn subscribe_name(self) -> &'static str {
        match self {
            SubscribeMode::Channels => "SUBSCRIBE",
            SubscribeMode::Patterns => "PSUBSCRIBE",
        }
    }

    fn unsubscribe_name(self) -> &'static str {
        match self {
            SubscribeMode::Channels => "UNSUBSCRIBE",
            SubscribeMode::Patterns => "PUNSUBSCRIBE",
        }
    }
}

#[derive(Debug)]
struct SubState {
    /// Cloned stream for writing control commands; set once the subscribe
    /// command is on the wire.
    control: Option<TcpStream>,
    /// Set when a worker has picked the routine up.
    started: bool,
    /// Set by `unsubscribe` while the routine is still queued; the routine
    /// exits without touching the pool.
    cancelled: bool,
    /// Set when the listen loop has exited, on every path.
    finished: bool,
}

#[derive(Debug)]
struct SubShared {
    state: Mutex<SubState>,
    changed: Condvar,
}

/// Handle to an active subscription.
///
/// Dropping the handle does not unsubscribe; the listen loop keeps running
/// until `unsubscribe` is called or the connection dies.
#[derive(Debug)]
pub struct Subscription {
    shared: Arc<SubShared>,
    mode: SubscribeMode,
}

impl Subscription {
    /// Ends the subscription: sends the unsubscribe command over the control
    /// stream and waits for the listen loop to wind down and return its
    /// connection to the pool.
    pub fn unsubscribe(self) -> GatewayResult<()> {
        let mut state = self.shared.state.lock().expect("subscription mutex poisoned");
        if !state.started {
            // Still queued behind busy dispatch workers; mark it cancelled so
            // the routine exits before acquiring a connection.
            state.cancelled = true;
            state.finished = true;
            drop(state);
            self.shared.changed.notify_all();
            return Ok(());
        }
        while !state.finished && state.control.is_none() {
            state = self
                .shared
                .changed
                .wait(state)
                .expect("subscription mutex poisoned");
        }
        if state.finished {
            // Loop already terminated (setup failure or dropped connection).
            return Ok(());
        }

        let mut stream = state.control.take().expect("control stream present");
        drop(state);

        let mut buf = BytesMut::new();
        Command::new(self.mode.unsubscribe_name()).write(&mut buf);
        stream.write_all(&buf)?;
        stream.flush()?;

        let mut state = self.shared.state.lock().expect("subscription mutex poisoned");
        while !state.finished {
            state = self
                .shared
                .changed
                .wait(state)
                .expect("subscription mutex poisoned");
        }
        Ok(())
    }

    /// True while the listen loop is still running.
    pub fn is_active(&self) -> bool {
        !self
            .shared
            .state
            .lock()
            .expect("subscription mutex poisoned")
            .finished
    }
}

/// Registers interest and submits the setup-and-listen routine to the
/// dispatch workers. Fire-and-forget past this point: setup failures inside
/// the worker are logged, not raised.
pub(crate) fn start<F>(
    pool: ConnectionPool,
    workers: &WorkerPool,
    mode: SubscribeMode,
    names: Vec<Vec<u8>>,
    handler: F,
) -> GatewayResult<Subscription>
where
    F: FnMut(Message) + Send + 'static,
{
    if names.is_empty() {
        return Err(GatewayError::InvalidArgument(
            "at least one channel or pattern is required",
        ));
    }

    let shared = Arc::new(SubShared {
        state: Mutex::new(SubState {
            control: None,
            started: false,
            cancelled: false,
            finished: false,
        }),
        changed: Condvar::new(),
    });

    let worker_shared = shared.clone();
    workers.execute(move || run_subscription(pool, mode, names, handler, worker_shared));

    Ok(Subscription { shared, mode })
}

fn run_subscription<F>(
    pool: ConnectionPool,
    mode: SubscribeMode,
    names: Vec<Vec<u8>>,
    mut handler: F,
    shared: Arc<SubShared>,
) where
    F: FnMut(Message) + Send + 'static,
{
    {
        let mut state = shared.state.lock().expect("subscription mutex poisoned");
        if state.cancelled {
            // Unsubscribed before any worker picked the routine up.
            return;
        }
        state.started = true;
    }

    // The routine borrows its own dedicated handle; it is detached from the
    // guard so an active subscription can never leak back into the pool.
    let guard = match pool.acquire() {
        Ok(guard) => guard,
        Err(err) => {
            error!(error = %err, "subscription setup failed to acquire a connection");
            finish(&shared);
            return;
        }
    };
    let mut conn = guard.detach();

    // The control stream is published only once the subscribe command is on
    // the wire. Published earlier, an immediate unsubscribe could reach the
    // server first; its count-0 ack would end the loop and re-pool a
    // connection the delayed subscribe then moves into push mode.
    let control = match open_push_mode(&mut conn, mode, &names) {
        Ok(stream) => stream,
        Err(err) => {
            error!(error = %err, "subscription setup failed");
            drop(conn);
            pool.forget_detached();
            finish(&shared);
            return;
        }
    };
    {
        let mut state = shared.state.lock().expect("subscription mutex poisoned");
        state.control = Some(control);
    }
    shared.changed.notify_all();

    match listen(&mut conn, &mut handler) {
        Ok(()) => {
            // Clean unsubscribe: the connection is back in request/response
            // mode and safe to pool again.
            debug!("subscription ended, returning connection to the pool");
            if conn.set_read_timeout(pool.read_timeout()).is_ok() {
                pool.restore(conn);
            } else {
                drop(conn);
                pool.forget_detached();
            }
        }
        Err(err) => {
            warn!(error = %err, "subscription terminated");
            drop(conn);
            pool.forget_detached();
        }
    }
    finish(&shared);
}

/// Puts the connection into push mode: clears the read deadline, writes the
/// subscribe command and clones the stream for the unsubscribe side.
fn open_push_mode(
    conn: &mut Connection,
    mode: SubscribeMode,
    names: &[Vec<u8>],
) -> GatewayResult<TcpStream> {
    // Message delivery has no deadline; an ordinary read timeout would kill
    // the subscription during quiet periods.
    conn.set_read_timeout(None)?;

    let cmd = Command::new(mode.subscribe_name()).args(names.iter().map(|n| n.as_slice()));
    conn.send_command(&cmd)?;
    conn.control_stream()
}

fn listen<F>(conn: &mut Connection, handler: &mut F) -> GatewayResult<()>
where
    F: FnMut(Message) + Send + 'static,
{
    loop {
        let frame = match conn.read_reply()? {
            Reply::Array(items) => items,
            Reply::Error(message) => return Err(GatewayError::Server(message)),
            _ => return Err(GatewayError::Protocol("non-array push frame")),
        };

        let kind = match frame.first() {
            Some(Reply::Bulk(kind)) => kind.clone(),
            _ => return Err(GatewayError::Protocol("push frame without kind")),
        };

        match kind.as_slice() {
            b"message" if frame.len() == 3 => {
                let mut items = frame.into_iter().skip(1);
                deliver(
                    handler,
                    Message {
                        channel: expect_bulk(items.next())?,
                        payload: expect_bulk(items.next())?,
                        pattern: None,
                    },
                );
            }
            b"pmessage" if frame.len() == 4 => {
                let mut items = frame.into_iter().skip(1);
                let pattern = expect_bulk(items.next())?;
                deliver(
                    handler,
                    Message {
                        channel: expect_bulk(items.next())?,
                        payload: expect_bulk(items.next())?,
                        pattern: Some(pattern),
                    },
                );
            }
            b"subscribe" | b"psubscribe" => {
                // Confirmation frames; nothing to deliver.
            }
            b"unsubscribe" | b"punsubscribe" => {
                if remaining_count(&frame)? == 0 {
                    return Ok(());
                }
            }
            _ => return Err(GatewayError::Protocol("unknown push frame kind")),
        }
    }
}

fn deliver<F>(handler: &mut F, message: Message)
where
    F: FnMut(Message) + Send + 'static,
{
    // One bad message's handling must not end the subscription.
    if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
        error!("subscription handler panicked; continuing");
    }
}

fn expect_bulk(item: Option<Reply>) -> GatewayResult<Vec<u8>> {
    match item {
        Some(Reply::Bulk(data)) => Ok(data),
        _ => Err(GatewayError::Protocol("truncated push frame")),
    }
}

fn remaining_count(frame: &[Reply]) -> GatewayResult<i64> {
    match frame.last() {
        Some(Reply::Integer(count)) => Ok(*count),
        _ => Err(GatewayError::Protocol("unsubscribe frame without count")),
    }
}

fn finish(shared: &SubShared) {
    let mut state = shared.state.lock().expect("subscription mutex poisoned");
    state.finished = true;
    drop(state);
    shared.changed.notify_all();
}
