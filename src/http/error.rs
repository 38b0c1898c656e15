//! HTTP error taxonomy (spec §4.4.5, §7 "HTTP errors").

use std::fmt;

use crate::net::NetError;

#[derive(Debug)]
pub enum HttpError {
    /// Peer closed mid-frame: during header parse, or mid-body on a bounded
    /// framing (spec §4.4.1, §7 EOF-during-header reclassification).
    ConnectionClosed,
    /// A framing invariant was violated (missing CRLF between chunks, a
    /// `data_size` mismatch, and the like).
    MessageError(String),
    /// Caller sequencing violation: a new `send_message` while the previous
    /// one is not finished, an unbalanced `respond()`, exceeding a
    /// contiguous body's declared length.
    LogicError(String),
    InvalidHeader(String),
    InvalidRequest(String),
    InvalidMethod(String),
    ResponseError(String),
    UnsupportedVersion(String),
    Net(NetError),
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::ConnectionClosed => write!(f, "connection closed mid-frame"),
            HttpError::MessageError(s) => write!(f, "message framing error: {s}"),
            HttpError::LogicError(s) => write!(f, "logic error: {s}"),
            HttpError::InvalidHeader(s) => write!(f, "invalid header: {s}"),
            HttpError::InvalidRequest(s) => write!(f, "invalid request line: {s}"),
            HttpError::InvalidMethod(s) => write!(f, "invalid method: {s}"),
            HttpError::ResponseError(s) => write!(f, "invalid response: {s}"),
            HttpError::UnsupportedVersion(s) => write!(f, "unsupported HTTP version: {s}"),
            HttpError::Net(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for HttpError {}

impl From<NetError> for HttpError {
    fn from(error: NetError) -> Self {
        HttpError::Net(error)
    }
}
