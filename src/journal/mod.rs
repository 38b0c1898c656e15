//! Write-ahead journaling engine (spec §2 "J"): crash-safe
//! checkpoint-plus-operation-log persistence for an arbitrary
//! in-memory [`Target`]. Grounded on `pcomn_journal.cpp`'s
//! `Port`/`Journallable` split.

mod error;
mod operation;
mod port;
mod storage;
mod target;

pub use error::JournalError;
pub use operation::Operation;
pub use port::Port;
pub use storage::{FileStorage, Storage};
pub use target::{JournalTarget, State, Target};
