//! Reply values returned by the backing store.

/// One parsed RESP2 reply.
///
/// `Nil` covers both the null bulk string (`$-1`) and the null array (`*-1`);
/// callers that care about "missing" versus "empty" rely on this distinction.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `+OK` style status lines.
    Simple(Vec<u8>),
    /// `-ERR ...` error lines, payload without the leading dash.
    Error(Vec<u8>),
    /// `:123` integers.
    Integer(i64),
    /// `$n` bulk strings with their raw payload.
    Bulk(Vec<u8>),
    /// Null bulk string or null array.
    Nil,
    /// `*n` arrays, possibly nested.
    Array(Vec<Reply>),
}

impl Reply {
    /// Short name of the reply variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Simple(_) => "simple",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(_) => "bulk",
            Reply::Nil => "nil",
            Reply::Array(_) => "array",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// Returns the bulk or simple-string payload, if this reply carries one.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Simple(data) | Reply::Bulk(data) => Some(data),
            _ => None,
        }
    }
}
