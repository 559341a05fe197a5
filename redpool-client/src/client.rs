//! # Uniform Operation Facade
//!
//! Purpose: Expose one typed entry point per supported store capability,
//! each a thin forward into the operation executor or the batch executor.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `RedisClient` hides pooling, framing and dispatch.
//! 2. **One Pattern, Many Operations**: Every operation routes through the
//!    same acquire/run/translate/release path; none bypasses it.
//! 3. **Explicit Lifecycle**: Constructed with `connect`/`with_config`,
//!    torn down with `shutdown`; no implicit process-wide singleton.

use std::collections::HashMap;
use std::time::Duration;

use redpool_proto::Reply;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::command::Command;
use crate::config::ClientConfig;
use crate::dispatch::WorkerPool;
use crate::error::{GatewayError, GatewayResult};
use crate::executor::Executor;
use crate::pipeline::{self, Pipeline};
use crate::pool::{ConnectionPool, PoolStats};
use crate::pubsub::{self, Message, SubscribeMode, Subscription};
use crate::script::Script;

/// TTL state of a key, mirroring the store's -2/-1/n reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the given duration.
    ExpiresIn(Duration),
}

/// Pooled gateway to one backing store.
///
/// Every call borrows one connection for exactly one logical operation and
/// returns it on all outcomes; subscriptions borrow a dedicated connection
/// for their whole lifetime. The client is `Send + Sync`; one instance
/// serves all threads.
#[derive(Debug)]
pub struct RedisClient {
    pool: ConnectionPool,
    executor: Executor,
    workers: WorkerPool,
}

impl RedisClient {
    /// Connects with default configuration.
    pub fn connect(addr: impl Into<String>) -> GatewayResult<Self> {
        let config = ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        };
        Self::with_config(config)
    }

    /// Connects with a custom configuration.
    pub fn with_config(config: ClientConfig) -> GatewayResult<Self> {
        let workers = WorkerPool::new(config.dispatch_workers)?;
        let pool = ConnectionPool::new(config)?;
        Ok(RedisClient {
            executor: Executor::new(pool.clone()),
            pool,
            workers,
        })
    }

    /// Tears the client down: joins the dispatch workers and closes pooled
    /// connections. Active subscriptions must be unsubscribed first, since
    /// their listen loops occupy dispatch workers until they end.
    pub fn shutdown(mut self) {
        self.workers.shutdown();
        self.pool.close();
    }

    /// Pool occupancy, for observability and tests.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    // ---- strings and keys -------------------------------------------------

    pub fn ping(&self) -> GatewayResult<Vec<u8>> {
        self.executor.execute(&Command::new("PING"))
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> GatewayResult<()> {
        self.executor.execute(&Command::new("SET").arg(key).arg(value))
    }

    /// SET with an expiry in seconds. Sub-second durations round up to one
    /// second; a zero `ttl` is a caller failure.
    pub fn set_ex(&self, key: &[u8], value: &[u8], ttl: Duration) -> GatewayResult<()> {
        let secs = whole_seconds(ttl, "set_ex requires a nonzero ttl")?;
        self.executor
            .execute(&Command::new("SET").arg(key).arg(value).arg("EX").arg(secs))
    }

    /// Sets only when the key does not exist; true when the value was set.
    pub fn setnx(&self, key: &[u8], value: &[u8]) -> GatewayResult<bool> {
        self.executor.execute(&Command::new("SETNX").arg(key).arg(value))
    }

    /// Returns `Ok(None)` when the key is missing.
    pub fn get(&self, key: &[u8]) -> GatewayResult<Option<Vec<u8>>> {
        self.executor.execute(&Command::new("GET").arg(key))
    }

    pub fn exists(&self, key: &[u8]) -> GatewayResult<bool> {
        self.executor.execute(&Command::new("EXISTS").arg(key))
    }

    pub fn incr(&self, key: &[u8]) -> GatewayResult<i64> {
        self.executor.execute(&Command::new("INCR").arg(key))
    }

    pub fn incr_by(&self, key: &[u8], delta: i64) -> GatewayResult<i64> {
        self.executor.execute(&Command::new("INCRBY").arg(key).arg(delta))
    }

    /// Number of keys removed; repeating a delete yields 0, not an error.
    pub fn del(&self, key: &[u8]) -> GatewayResult<i64> {
        self.executor.execute(&Command::new("DEL").arg(key))
    }

    /// Sub-second durations round up to one second; a zero `ttl` is a caller
    /// failure, not an implicit delete.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> GatewayResult<bool> {
        let secs = whole_seconds(ttl, "expire requires a nonzero ttl")?;
        self.executor.execute(&Command::new("EXPIRE").arg(key).arg(secs))
    }

    pub fn expire_at(&self, key: &[u8], unix_secs: i64) -> GatewayResult<bool> {
        self.executor.execute(&Command::new("EXPIREAT").arg(key).arg(unix_secs))
    }

    pub fn persist(&self, key: &[u8]) -> GatewayResult<bool> {
        self.executor.execute(&Command::new("PERSIST").arg(key))
    }

    pub fn ttl(&self, key: &[u8]) -> GatewayResult<KeyTtl> {
        let value: i64 = self.executor.execute(&Command::new("TTL").arg(key))?;
        Ok(match value {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::NoExpiry,
            seconds if seconds >= 0 => KeyTtl::ExpiresIn(Duration::from_secs(seconds as u64)),
            _ => return Err(GatewayError::Protocol("negative ttl reply")),
        })
    }

    // ---- JSON convenience -------------------------------------------------

    /// Serializes `value` as JSON and stores it. Serialization failures are
    /// caller failures and never touch the pool.
    pub fn set_json<T: Serialize>(&self, key: &[u8], value: &T) -> GatewayResult<()> {
        let payload = serde_json::to_vec(value)?;
        self.set(key, &payload)
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> GatewayResult<Option<T>> {
        match self.get(key)? {
            Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
            None => Ok(None),
        }
    }

    // ---- lists ------------------------------------------------------------

    pub fn lpush(&self, key: &[u8], values: &[&[u8]]) -> GatewayResult<i64> {
        require_some(values, "lpush requires at least one value")?;
        self.executor
            .execute(&Command::new("LPUSH").arg(key).args(values.iter().copied()))
    }

    pub fn rpush(&self, key: &[u8], values: &[&[u8]]) -> GatewayResult<i64> {
        require_some(values, "rpush requires at least one value")?;
        self.executor
            .execute(&Command::new("RPUSH").arg(key).args(values.iter().copied()))
    }

    pub fn lpop(&self, key: &[u8]) -> GatewayResult<Option<Vec<u8>>> {
        self.executor.execute(&Command::new("LPOP").arg(key))
    }

    pub fn rpop(&self, key: &[u8]) -> GatewayResult<Option<Vec<u8>>> {
        self.executor.execute(&Command::new("RPOP").arg(key))
    }

    pub fn llen(&self, key: &[u8]) -> GatewayResult<i64> {
        self.executor.execute(&Command::new("LLEN").arg(key))
    }

    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> GatewayResult<Vec<Vec<u8>>> {
        self.executor
            .execute(&Command::new("LRANGE").arg(key).arg(start).arg(stop))
    }

    pub fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> GatewayResult<i64> {
        self.executor
            .execute(&Command::new("LREM").arg(key).arg(count).arg(value))
    }

    /// Blocking left pop over one or more keys. `Ok(None)` on timeout.
    /// Blocks the calling thread, not a pooled worker. Sub-second timeouts
    /// round up to one second; a zero `timeout` is a caller failure, since
    /// the store reads 0 as "block forever".
    pub fn blpop(
        &self,
        keys: &[&[u8]],
        timeout: Duration,
    ) -> GatewayResult<Option<(Vec<u8>, Vec<u8>)>> {
        require_some(keys, "blpop requires at least one key")?;
        let secs = whole_seconds(timeout, "blpop requires a nonzero timeout")?;
        self.executor
            .execute(&Command::new("BLPOP").args(keys.iter().copied()).arg(secs))
    }

    pub fn brpop(
        &self,
        keys: &[&[u8]],
        timeout: Duration,
    ) -> GatewayResult<Option<(Vec<u8>, Vec<u8>)>> {
        require_some(keys, "brpop requires at least one key")?;
        let secs = whole_seconds(timeout, "brpop requires a nonzero timeout")?;
        self.executor
            .execute(&Command::new("BRPOP").args(keys.iter().copied()).arg(secs))
    }

    // ---- sets -------------------------------------------------------------

    pub fn sadd(&self, key: &[u8], members: &[&[u8]]) -> GatewayResult<i64> {
        require_some(members, "sadd requires at least one member")?;
        self.executor
            .execute(&Command::new("SADD").arg(key).args(members.iter().copied()))
    }

    pub fn srem(&self, key: &[u8], members: &[&[u8]]) -> GatewayResult<i64> {
        require_some(members, "srem requires at least one member")?;
        self.executor
            .execute(&Command::new("SREM").arg(key).args(members.iter().copied()))
    }

    pub fn scard(&self, key: &[u8]) -> GatewayResult<i64> {
        self.executor.execute(&Command::new("SCARD").arg(key))
    }

    pub fn sismember(&self, key: &[u8], member: &[u8]) -> GatewayResult<bool> {
        self.executor.execute(&Command::new("SISMEMBER").arg(key).arg(member))
    }

    pub fn smembers(&self, key: &[u8]) -> GatewayResult<Vec<Vec<u8>>> {
        self.executor.execute(&Command::new("SMEMBERS").arg(key))
    }

    // ---- hashes -----------------------------------------------------------

    /// Returns the number of fields newly created (0 when updated in place).
    pub fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> GatewayResult<i64> {
        self.executor
            .execute(&Command::new("HSET").arg(key).arg(field).arg(value))
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> GatewayResult<Option<Vec<u8>>> {
        self.executor.execute(&Command::new("HGET").arg(key).arg(field))
    }

    pub fn hdel(&self, key: &[u8], fields: &[&[u8]]) -> GatewayResult<i64> {
        require_some(fields, "hdel requires at least one field")?;
        self.executor
            .execute(&Command::new("HDEL").arg(key).args(fields.iter().copied()))
    }

    pub fn hexists(&self, key: &[u8], field: &[u8]) -> GatewayResult<bool> {
        self.executor.execute(&Command::new("HEXISTS").arg(key).arg(field))
    }

    pub fn hlen(&self, key: &[u8]) -> GatewayResult<i64> {
        self.executor.execute(&Command::new("HLEN").arg(key))
    }

    pub fn hmset(&self, key: &[u8], entries: &[(&[u8], &[u8])]) -> GatewayResult<()> {
        require_some(entries, "hmset requires at least one field")?;
        let mut cmd = Command::new("HMSET").arg(key);
        for (field, value) in entries {
            cmd = cmd.arg(*field).arg(*value);
        }
        self.executor.execute(&cmd)
    }

    /// Field values in request order; `None` for missing fields.
    pub fn hmget(&self, key: &[u8], fields: &[&[u8]]) -> GatewayResult<Vec<Option<Vec<u8>>>> {
        require_some(fields, "hmget requires at least one field")?;
        self.executor
            .execute(&Command::new("HMGET").arg(key).args(fields.iter().copied()))
    }

    pub fn hgetall(&self, key: &[u8]) -> GatewayResult<HashMap<Vec<u8>, Vec<u8>>> {
        self.executor.execute(&Command::new("HGETALL").arg(key))
    }

    pub fn hvals(&self, key: &[u8]) -> GatewayResult<Vec<Vec<u8>>> {
        self.executor.execute(&Command::new("HVALS").arg(key))
    }

    // ---- sorted sets ------------------------------------------------------

    pub fn zadd(&self, key: &[u8], score: f64, member: &[u8]) -> GatewayResult<i64> {
        self.executor
            .execute(&Command::new("ZADD").arg(key).arg(score).arg(member))
    }

    pub fn zscore(&self, key: &[u8], member: &[u8]) -> GatewayResult<Option<f64>> {
        self.executor.execute(&Command::new("ZSCORE").arg(key).arg(member))
    }

    pub fn zcard(&self, key: &[u8]) -> GatewayResult<i64> {
        self.executor.execute(&Command::new("ZCARD").arg(key))
    }

    pub fn zrem(&self, key: &[u8], members: &[&[u8]]) -> GatewayResult<i64> {
        require_some(members, "zrem requires at least one member")?;
        self.executor
            .execute(&Command::new("ZREM").arg(key).args(members.iter().copied()))
    }

    pub fn zrange(&self, key: &[u8], start: i64, stop: i64) -> GatewayResult<Vec<Vec<u8>>> {
        self.executor
            .execute(&Command::new("ZRANGE").arg(key).arg(start).arg(stop))
    }

    /// `min`/`max` use the store's score syntax, e.g. "-inf", "(1.5", "10".
    pub fn zrange_by_score(&self, key: &[u8], min: &str, max: &str) -> GatewayResult<Vec<Vec<u8>>> {
        self.executor
            .execute(&Command::new("ZRANGEBYSCORE").arg(key).arg(min).arg(max))
    }

    pub fn zrem_range_by_rank(&self, key: &[u8], start: i64, stop: i64) -> GatewayResult<i64> {
        self.executor
            .execute(&Command::new("ZREMRANGEBYRANK").arg(key).arg(start).arg(stop))
    }

    pub fn zrem_range_by_score(&self, key: &[u8], min: &str, max: &str) -> GatewayResult<i64> {
        self.executor
            .execute(&Command::new("ZREMRANGEBYSCORE").arg(key).arg(min).arg(max))
    }

    // ---- scripting --------------------------------------------------------

    /// Evaluates a script from source. The reply shape is script-defined, so
    /// the raw reply is returned.
    pub fn eval(&self, script: &str, keys: &[&[u8]], args: &[&[u8]]) -> GatewayResult<Reply> {
        self.executor.execute(
            &Command::new("EVAL")
                .arg(script)
                .arg(keys.len())
                .args(keys.iter().copied())
                .args(args.iter().copied()),
        )
    }

    /// Evaluates a script the store already caches, by digest.
    pub fn evalsha(&self, digest: &str, keys: &[&[u8]], args: &[&[u8]]) -> GatewayResult<Reply> {
        self.executor.execute(
            &Command::new("EVALSHA")
                .arg(digest)
                .arg(keys.len())
                .args(keys.iter().copied())
                .args(args.iter().copied()),
        )
    }

    /// Loads a script into the store's cache and returns its digest.
    pub fn script_load(&self, script: &str) -> GatewayResult<String> {
        self.executor.execute(&Command::new("SCRIPT").arg("LOAD").arg(script))
    }

    /// Runs `script` by cached digest, falling back to source evaluation when
    /// the store does not know the digest yet.
    pub fn eval_script(&self, script: &Script, keys: &[&[u8]], args: &[&[u8]]) -> GatewayResult<Reply> {
        match self.evalsha(script.digest(), keys, args) {
            Err(err) if err.server_code_is("NOSCRIPT") => self.eval(script.source(), keys, args),
            other => other,
        }
    }

    // ---- pub/sub ----------------------------------------------------------

    /// Number of subscribers the message reached.
    pub fn publish(&self, channel: &[u8], message: &[u8]) -> GatewayResult<i64> {
        self.executor
            .execute(&Command::new("PUBLISH").arg(channel).arg(message))
    }

    /// Subscribes to channels; `handler` runs on a dispatch worker once per
    /// inbound message. Returns immediately after registering interest.
    ///
    /// An active subscription occupies one dispatch worker until it ends, so
    /// `dispatch_workers` bounds the concurrent subscriptions; one started
    /// beyond that waits for a worker (and can still be unsubscribed while
    /// waiting).
    pub fn subscribe<F>(&self, handler: F, channels: &[&[u8]]) -> GatewayResult<Subscription>
    where
        F: FnMut(Message) + Send + 'static,
    {
        pubsub::start(
            self.pool.clone(),
            &self.workers,
            SubscribeMode::Channels,
            channels.iter().map(|c| c.to_vec()).collect(),
            handler,
        )
    }

    /// Pattern variant of [`subscribe`](Self::subscribe).
    pub fn psubscribe<F>(&self, handler: F, patterns: &[&[u8]]) -> GatewayResult<Subscription>
    where
        F: FnMut(Message) + Send + 'static,
    {
        pubsub::start(
            self.pool.clone(),
            &self.workers,
            SubscribeMode::Patterns,
            patterns.iter().map(|p| p.to_vec()).collect(),
            handler,
        )
    }

    // ---- batching ---------------------------------------------------------

    /// Stages commands through the closure, flushes them over one
    /// connection, and returns replies in stage order.
    pub fn pipelined<F>(&self, stage: F) -> GatewayResult<Vec<Reply>>
    where
        F: FnOnce(&mut Pipeline) -> GatewayResult<()>,
    {
        pipeline::run(&self.pool, stage)
    }
}

fn require_some<T>(items: &[T], reason: &'static str) -> GatewayResult<()> {
    if items.is_empty() {
        return Err(GatewayError::InvalidArgument(reason));
    }
    Ok(())
}

/// The store counts expiries and blocking timeouts in whole seconds.
/// Truncation would turn a short duration into 0, which the store reads as
/// "no timeout" or an immediate expiry, so fractions round up instead and
/// zero is rejected before the pool is touched.
fn whole_seconds(duration: Duration, reason: &'static str) -> GatewayResult<u64> {
    if duration.is_zero() {
        return Err(GatewayError::InvalidArgument(reason));
    }
    let mut secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs += 1;
    }
    Ok(secs)
}
