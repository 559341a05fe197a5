//! # Command Descriptors
//!
//! Purpose: Describe one backing-store operation as data (name plus ordered
//! binary-safe arguments) so a single generic executor can run all of them.
//!
//! ## Design Principles
//! 1. **Data over Control Flow**: Each facade operation is one `Command`
//!    value, not a bespoke code path.
//! 2. **Binary Safety**: Arguments are raw byte vectors end to end.
//! 3. **Immutable Once Built**: A command has no identity beyond its
//!    arguments and never changes after construction.

use bytes::BytesMut;
use redpool_proto::{write_array_header, write_bulk};

/// One request to the backing store: command name plus typed arguments.
#[derive(Debug, Clone)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    /// Starts a command with the given name, e.g. `Command::new("GET")`.
    pub fn new(name: &str) -> Self {
        Command {
            args: vec![name.as_bytes().to_vec()],
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl ToArg) -> Self {
        self.args.push(arg.to_arg());
        self
    }

    /// Appends every argument from an iterator.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        for arg in args {
            self.args.push(arg.to_arg());
        }
        self
    }

    /// The command name (first argument).
    pub fn name(&self) -> &[u8] {
        &self.args[0]
    }

    /// Encodes the command as one RESP2 array into `out`.
    pub(crate) fn write(&self, out: &mut BytesMut) {
        write_array_header(self.args.len(), out);
        for arg in &self.args {
            write_bulk(arg, out);
        }
    }
}

/// Conversion of typed caller arguments into binary-safe wire arguments.
///
/// Numbers are rendered as ASCII decimal, which is how the store expects
/// counts, scores and timeouts; byte slices pass through untouched.
pub trait ToArg {
    fn to_arg(&self) -> Vec<u8>;
}

impl ToArg for &[u8] {
    fn to_arg(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl<const N: usize> ToArg for &[u8; N] {
    fn to_arg(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Vec<u8> {
        self.clone()
    }
}

impl ToArg for &str {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for i64 {
    fn to_arg(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl ToArg for u64 {
    fn to_arg(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl ToArg for usize {
    fn to_arg(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl ToArg for f64 {
    fn to_arg(&self) -> Vec<u8> {
        // Matches the store's score syntax, including "inf" and "-inf".
        if self.is_infinite() {
            return if *self > 0.0 { b"+inf".to_vec() } else { b"-inf".to_vec() };
        }
        self.to_string().into_bytes()
    }
}
