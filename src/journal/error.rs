//! Journal error taxonomy (spec §7 "Journal errors").

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum JournalError {
    /// An operation was attempted from a state that forbids it (spec
    /// §4.6's transition table).
    StateError(String),
    /// A restored record named an unknown opcode/opversion.
    OpError { opcode: u32, opversion: u32 },
    /// A storage record failed its magic/size/CRC check on replay.
    CorruptRecord(String),
    Io(io::Error),
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::StateError(s) => write!(f, "illegal journal state transition: {s}"),
            JournalError::OpError { opcode, opversion } => {
                write!(f, "unknown opcode {opcode} version {opversion}")
            }
            JournalError::CorruptRecord(s) => write!(f, "corrupt journal record: {s}"),
            JournalError::Io(e) => write!(f, "journal I/O error: {e}"),
        }
    }
}

impl std::error::Error for JournalError {}

impl From<io::Error> for JournalError {
    fn from(error: io::Error) -> Self {
        JournalError::Io(error)
    }
}
