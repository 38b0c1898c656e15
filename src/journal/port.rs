//! A `Port` owns one [`Storage`] backend and hands out monotonically
//! numbered write events to whatever [`Target`](super::target::Target)
//! is currently attached to it (spec §4.5). A port holds a back-pointer
//! to its attached target (by id, since `Port<S>` is not parameterised
//! over the target type) so at most one target can be attached at a
//! time — a second concurrent attach is rejected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::error::JournalError;
use super::operation::Operation;
use super::storage::{CheckpointWriter, Storage};

pub struct Port<S: Storage> {
    storage: Mutex<S>,
    event_counter: AtomicU64,
    attached_target: Mutex<Option<u64>>,
}

impl<S: Storage> Port<S> {
    pub fn new(storage: S) -> Self {
        Port {
            storage: Mutex::new(storage),
            event_counter: AtomicU64::new(0),
            attached_target: Mutex::new(None),
        }
    }

    pub fn event_count(&self) -> u64 {
        self.event_counter.load(Ordering::SeqCst)
    }

    /// Attaches `target_id` as this port's back-pointer. Idempotent for
    /// the already-attached target (re-attach from `restore_from` then
    /// `set_journal` on the same target); rejects any other target
    /// while one is already attached.
    pub(crate) fn attach(&self, target_id: u64) -> Result<(), JournalError> {
        let mut attached = self.attached_target.lock().unwrap();
        match *attached {
            Some(existing) if existing != target_id => Err(JournalError::StateError(
                "port already has a target attached".into(),
            )),
            _ => {
                *attached = Some(target_id);
                Ok(())
            }
        }
    }

    /// Releases `target_id`'s attachment, if it is the one currently
    /// holding the port.
    pub(crate) fn detach(&self, target_id: u64) {
        let mut attached = self.attached_target.lock().unwrap();
        if *attached == Some(target_id) {
            *attached = None;
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached_target.lock().unwrap().is_some()
    }

    /// Persists `op` and returns the event number assigned to it.
    pub fn store_operation(&self, op: &Operation) -> Result<u64, JournalError> {
        let mut storage = self.storage.lock().unwrap();
        storage.append_record(op)?;
        Ok(self.event_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub(crate) fn replay_records(
        &self,
        handler: &mut dyn FnMut(&Operation) -> Result<(), JournalError>,
    ) -> Result<u32, JournalError> {
        self.storage.lock().unwrap().replay_records(handler)
    }

    pub(crate) fn replay_checkpoint(
        &self,
        handler: &mut dyn FnMut(&[u8]) -> Result<(), JournalError>,
    ) -> Result<Option<u64>, JournalError> {
        self.storage.lock().unwrap().replay_checkpoint(handler)
    }

    pub(crate) fn create_checkpoint(&self) -> Result<(CheckpointWriter, u64), JournalError> {
        self.storage.lock().unwrap().create_checkpoint()
    }

    pub(crate) fn close_checkpoint(
        &self,
        writer: CheckpointWriter,
        commit: bool,
    ) -> Result<(), JournalError> {
        self.storage.lock().unwrap().close_checkpoint(writer, commit)
    }

    pub fn set_user_magic(&self, magic: u32) -> Result<(), JournalError> {
        self.storage.lock().unwrap().set_user_magic(magic)
    }

    pub fn storage_len(&self) -> Result<u64, JournalError> {
        self.storage.lock().unwrap().len()
    }

    pub(crate) fn make_writable(&self) -> Result<(), JournalError> {
        self.storage.lock().unwrap().make_writable()
    }
}
