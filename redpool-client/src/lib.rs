//! # Pooled Redis Operation Gateway
//!
//! Purpose: Provide a uniform, typed facade over a Redis-compatible store in
//! which every operation borrows one pooled connection, runs one logical unit
//! of work, and releases the connection on every outcome.
//!
//! ## Design Principles
//! 1. **One Execution Pattern**: Single commands, batches and subscriptions
//!    all follow the same acquire/run/translate/release discipline.
//! 2. **Single Error Domain**: Pool exhaustion, transport faults and server
//!    errors all surface as [`GatewayError`]; no retries are performed here.
//! 3. **Dedicated Subscription Handles**: A subscribed connection stays out
//!    of the pool until explicitly unsubscribed.
//! 4. **Explicit Lifecycle**: The client is constructed and shut down
//!    explicitly; nothing is process-global.

mod client;
mod command;
mod config;
mod dispatch;
mod error;
mod executor;
mod pipeline;
mod pool;
mod pubsub;
mod script;

pub use client::{KeyTtl, RedisClient};
pub use command::{Command, ToArg};
pub use config::ClientConfig;
pub use error::{GatewayError, GatewayResult};
pub use executor::FromReply;
pub use pipeline::Pipeline;
pub use pool::PoolStats;
pub use pubsub::{Message, Subscription};
pub use redpool_proto::Reply;
pub use script::Script;
