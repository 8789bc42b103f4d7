//! Error types for lwlink.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Decode-time, call-level and
//! transport-level failures are all captured here.
//!
//! Decode errors ([`Error::MalformedEvent`], [`Error::MalformedLegacyReply`])
//! are logged by the receive loop and the datagram dropped. Call-level errors
//! ([`Error::UnexpectedReply`], [`Error::Timeout`], [`Error::Cancelled`]) are
//! returned to the caller and leave the client usable. [`Error::Transport`] is
//! fatal to the client instance.

/// The error type for all lwlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A `*`-prefixed datagram that is not a valid `*!{...}` JSON event.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// A legacy datagram that lacks the `sequence,payload` shape.
    #[error("malformed legacy reply: {0}")]
    MalformedLegacyReply(String),

    /// A command received a legacy reply other than the expected `OK`.
    ///
    /// The payload is usually an `ERR,<code>,"<message>"` triple.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Timed out waiting for a matching reply from the Link.
    #[error("timeout waiting for response")]
    Timeout,

    /// The caller cancelled the operation before it resolved.
    #[error("operation cancelled")]
    Cancelled,

    /// A socket-level failure. The client that reported it is no longer usable.
    #[error("transport error: {0}")]
    Transport(String),

    /// An invalid parameter was passed when rendering a command.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The client has been closed.
    #[error("not connected")]
    NotConnected,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error was produced while decoding a single datagram.
    ///
    /// Decode errors never terminate the receive loop.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::MalformedEvent(_) | Error::MalformedLegacyReply(_))
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
