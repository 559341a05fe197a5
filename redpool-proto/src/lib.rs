//! # RESP2 Wire Protocol
//!
//! Purpose: Encode Redis commands and parse server replies for the pooled
//! gateway, with binary-safe arguments throughout.
//!
//! ## Design Principles
//! 1. **Binary Safety**: Keys, values and bulk replies are raw bytes, never
//!    re-encoded as text.
//! 2. **Buffer Reuse**: Callers provide the encode buffer and a scratch line
//!    buffer so the hot path stays allocation-light.
//! 3. **Explicit Nil**: Null bulk strings and null arrays parse to a dedicated
//!    variant instead of being folded into empty values.
//! 4. **Fail Fast**: Malformed framing surfaces immediately as a wire error.

mod reply;
mod wire;

pub use reply::Reply;
pub use wire::{read_reply, write_array_header, write_bulk, write_command, WireError};
