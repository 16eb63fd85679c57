use std::fmt;

use error::Reason;
use frame::StreamId;

/// Errors caused by the peer's bytes.
///
/// The variant picks the blast radius: a connection error becomes a
/// GOAWAY followed by close, a stream error becomes RST_STREAM plus a
/// local reset, and `CloseImmediately` tears the socket down without
/// attempting to send anything (bad preface class).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    Connection(Reason),
    Stream { id: StreamId, reason: Reason },
    CloseImmediately,
}

/// Errors caused by the host using the API out of order.
///
/// These never touch the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserError {
    /// The referenced stream is not live.
    InactiveStreamId,

    /// The operation is not valid in the stream's current send state,
    /// e.g. data before a response or a second response.
    UnexpectedSendState,
}

impl fmt::Display for UserError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let msg = match *self {
            UserError::InactiveStreamId => "stream is not live",
            UserError::UnexpectedSendState => "operation not valid in stream send state",
        };
        write!(fmt, "{}", msg)
    }
}

impl ::std::error::Error for UserError {}
