//! Crate-wide error aggregation.
//!
//! Each subsystem (`net`, `http`, `journal`) defines its own error enum and
//! converts into [`PcommonError`] at the API boundary, the way
//! `GoatNsError` aggregates `sqlx`/`reqwest`/`regex` errors in the teacher
//! crate. No `thiserror` derive is used here; the teacher hand-writes
//! `Debug`/`Display`/`From` and this crate follows suit.

use std::fmt;

use crate::http::HttpError;
use crate::journal::JournalError;
use crate::net::NetError;

#[derive(Debug)]
pub enum PcommonError {
    Net(NetError),
    Http(HttpError),
    Journal(JournalError),
    Io(std::io::Error),
}

impl fmt::Display for PcommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PcommonError::Net(e) => write!(f, "network error: {e}"),
            PcommonError::Http(e) => write!(f, "HTTP error: {e}"),
            PcommonError::Journal(e) => write!(f, "journal error: {e}"),
            PcommonError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for PcommonError {}

impl From<NetError> for PcommonError {
    fn from(error: NetError) -> Self {
        PcommonError::Net(error)
    }
}

impl From<HttpError> for PcommonError {
    fn from(error: HttpError) -> Self {
        PcommonError::Http(error)
    }
}

impl From<JournalError> for PcommonError {
    fn from(error: JournalError) -> Self {
        PcommonError::Journal(error)
    }
}

impl From<std::io::Error> for PcommonError {
    fn from(error: std::io::Error) -> Self {
        PcommonError::Io(error)
    }
}
