//! Network error taxonomy (spec §7 "Network errors" + "Address errors").

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum NetError {
    /// Malformed textual address representation; carries a human-readable
    /// fragment naming the offending form (spec §4.1).
    InvalidStrRepr(String),
    /// A prefix length or similar constructor argument was out of range.
    InvalidArgument(String),
    /// DNS resolution failure.
    SystemError(io::Error),
    /// Generic socket failure (bind/listen/poll/setsockopt/getsockopt/...).
    SocketError(io::Error),
    /// Outbound `connect()` failed.
    ConnectionError(io::Error),
    /// `recv`/`read` failed for a reason other than peer reset.
    ReceiveError(io::Error),
    /// Peer reset the connection while we were receiving.
    SenderClosed,
    /// `send`/`write`/`sendfile` failed for a reason other than peer reset.
    TransmitError(io::Error),
    /// Peer reset or closed the connection while we were transmitting.
    ReceiverClosed,
    /// A blocking operation did not complete within its timeout. Distinct
    /// from every other network error: the socket remains usable.
    OperationTimeout,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::InvalidStrRepr(s) => write!(f, "invalid string representation: {s}"),
            NetError::InvalidArgument(s) => write!(f, "invalid argument: {s}"),
            NetError::SystemError(e) => write!(f, "DNS resolution failed: {e}"),
            NetError::SocketError(e) => write!(f, "socket error: {e}"),
            NetError::ConnectionError(e) => write!(f, "connect failed: {e}"),
            NetError::ReceiveError(e) => write!(f, "receive failed: {e}"),
            NetError::SenderClosed => write!(f, "peer reset the connection while receiving"),
            NetError::TransmitError(e) => write!(f, "transmit failed: {e}"),
            NetError::ReceiverClosed => write!(f, "peer closed the connection while transmitting"),
            NetError::OperationTimeout => write!(f, "operation timed out"),
        }
    }
}

impl std::error::Error for NetError {}

impl From<io::Error> for NetError {
    fn from(error: io::Error) -> Self {
        NetError::SocketError(error)
    }
}

/// True for the class of errors spec §4.2 says map a receive failure to
/// [`NetError::SenderClosed`] (`ECONNRESET`).
pub(crate) fn is_reset(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::ConnectionReset
}

/// True for the class of errors spec §4.2 says map a transmit failure to
/// [`NetError::ReceiverClosed`] (`EPIPE`, `ECONNRESET`).
pub(crate) fn is_closed_pipe(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    )
}
