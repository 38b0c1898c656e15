//! The journalled-object state machine (spec §4.6): INITIAL → RESTORED
//! → ACTIVE ⇄ CHECKPOINT, with INVALID as the terminal failure state.
//! Grounded on `Journallable::restore_from`/`apply`/`take_checkpoint`
//! in `pcomn_journal.cpp`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::error::JournalError;
use super::operation::Operation;
use super::port::Port;
use super::storage::Storage;

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// The in-memory object a journal keeps consistent with its log. `T`
/// must be cheaply cloneable so a checkpoint can snapshot it without
/// holding the state lock for the whole write.
pub trait Target: Clone + Send {
    fn apply_operation(&mut self, op: &Operation) -> Result<(), JournalError>;

    /// Whether an error raised while replaying `op` should be logged
    /// and skipped rather than aborting recovery entirely.
    fn is_ignorable(&self, _op: &Operation, _err: &JournalError) -> bool {
        false
    }

    fn save_checkpoint(&self) -> Vec<u8>;
    fn restore_checkpoint(&mut self, body: &[u8]) -> Result<(), JournalError>;

    /// A caller-defined tag stamped into the checkpoint slot on
    /// activation, for format versioning (spec §3.3's `set_user_magic`).
    fn user_magic(&self) -> u32 {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initial,
    Restoring,
    Restored,
    Active,
    Checkpoint,
    Invalid,
}

pub struct JournalTarget<S: Storage, T: Target> {
    id: u64,
    state: Mutex<State>,
    data: RwLock<T>,
    checkpoint_lock: Mutex<()>,
    port: Mutex<Option<Arc<Port<S>>>>,
    change_count: Mutex<u64>,
}

impl<S: Storage, T: Target> JournalTarget<S, T> {
    pub fn new(initial: T) -> Self {
        JournalTarget {
            id: NEXT_TARGET_ID.fetch_add(1, Ordering::SeqCst),
            state: Mutex::new(State::Initial),
            data: RwLock::new(initial),
            checkpoint_lock: Mutex::new(()),
            port: Mutex::new(None),
            change_count: Mutex::new(0),
        }
    }

    pub fn state(&self) -> State {
        *self.state.lock().unwrap()
    }

    pub fn change_count(&self) -> u64 {
        *self.change_count.lock().unwrap()
    }

    /// Reads the current application state. Blocks out concurrent
    /// `apply`, matching the target RW-lock ordering used throughout.
    pub fn with_data<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.data.read().unwrap())
    }

    fn require_state(&self, expected: &[State]) -> Result<(), JournalError> {
        let state = self.state();
        if expected.contains(&state) {
            Ok(())
        } else {
            Err(JournalError::StateError(format!(
                "expected one of {expected:?}, found {state:?}"
            )))
        }
    }

    /// Replays the checkpoint (if any) and the operation log, then —
    /// if `set_journal` — attaches `port` and transitions to ACTIVE,
    /// taking an immediate checkpoint if none was found on disk.
    pub fn restore_from(&self, port: Arc<Port<S>>, set_journal: bool) -> Result<(), JournalError> {
        self.require_state(&[State::Initial])?;
        *self.state.lock().unwrap() = State::Restoring;

        let restore_result = (|| -> Result<Option<u64>, JournalError> {
            let mut data = self.data.write().unwrap();
            let generation = port.replay_checkpoint(&mut |body| data.restore_checkpoint(body))?;
            port.replay_records(&mut |op| match data.apply_operation(op) {
                Ok(()) => Ok(()),
                Err(e) if data.is_ignorable(op, &e) => {
                    tracing::warn!(opcode = op.opcode, error = %e, "ignoring error while replaying operation");
                    Ok(())
                }
                Err(e) => Err(e),
            })?;
            Ok(generation)
        })();

        let generation = match restore_result {
            Ok(generation) => generation,
            Err(e) => {
                *self.state.lock().unwrap() = State::Invalid;
                return Err(e);
            }
        };

        *self.state.lock().unwrap() = State::Restored;

        if set_journal {
            port.attach(self.id)?;
            *self.port.lock().unwrap() = Some(port);
            self.port
                .lock()
                .unwrap()
                .as_ref()
                .unwrap()
                .make_writable()?;
            *self.state.lock().unwrap() = State::Active;
            if generation.is_none() {
                self.take_checkpoint()?;
            }
        }

        Ok(())
    }

    /// Attaches a brand-new, never-persisted target to `port` and
    /// immediately takes a checkpoint before going ACTIVE. Rejected if
    /// `port` already has a different target attached.
    pub fn set_journal(&self, port: Arc<Port<S>>) -> Result<(), JournalError> {
        self.require_state(&[State::Initial, State::Restored])?;
        port.attach(self.id)?;
        port.set_user_magic(self.data.read().unwrap().user_magic())?;
        port.make_writable()?;
        *self.port.lock().unwrap() = Some(port);
        *self.state.lock().unwrap() = State::Active;
        self.take_checkpoint()?;
        Ok(())
    }

    /// Persists and applies `op`. Persistence failure propagates;
    /// application failure is logged and swallowed — the record
    /// remains on disk but the in-memory target is left unchanged.
    pub fn apply(&self, op: Operation) -> Result<(), JournalError> {
        self.require_state(&[State::Restored, State::Active, State::Checkpoint])?;
        let port = self.port.lock().unwrap().clone();

        let mut data = self.data.write().unwrap();
        if let Some(port) = &port {
            port.store_operation(&op)?;
        }
        match data.apply_operation(&op) {
            Ok(()) => {
                *self.change_count.lock().unwrap() += 1;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(opcode = op.opcode, error = %e, "operation not applied");
                Ok(())
            }
        }
    }

    /// Snapshots the target and writes it as a new checkpoint, without
    /// holding the target's RW-lock for the duration of the write.
    pub fn take_checkpoint(&self) -> Result<u64, JournalError> {
        self.require_state(&[State::Active])?;
        let _cp_guard = self.checkpoint_lock.lock().unwrap();
        *self.state.lock().unwrap() = State::Checkpoint;

        let snapshot = self.data.read().unwrap().clone();
        let port = self
            .port
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| JournalError::StateError("no journal attached".into()))?;

        let result = (|| -> Result<u64, JournalError> {
            let (mut writer, generation) = port.create_checkpoint()?;
            std::io::Write::write_all(&mut writer, &snapshot.save_checkpoint())?;
            port.close_checkpoint(writer, true)?;
            Ok(generation)
        })();

        match result {
            Ok(generation) => {
                *self.state.lock().unwrap() = State::Active;
                Ok(generation)
            }
            Err(e) => {
                *self.state.lock().unwrap() = State::Invalid;
                Err(e)
            }
        }
    }
}

impl<S: Storage, T: Target> Drop for JournalTarget<S, T> {
    fn drop(&mut self) {
        if let Some(port) = self.port.lock().unwrap().as_ref() {
            port.detach(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::operation::Operation;
    use crate::journal::storage::FileStorage;
    use tempfile::tempdir;

    #[derive(Clone, Debug, PartialEq)]
    struct Counter(i64);

    const OP_ADD: u32 = 1;
    const OP_MUL: u32 = 2;

    impl Target for Counter {
        fn apply_operation(&mut self, op: &Operation) -> Result<(), JournalError> {
            let body = op.body.as_ref().ok_or({
                JournalError::OpError {
                    opcode: op.opcode,
                    opversion: op.opversion,
                }
            })?;
            let arg = i64::from_le_bytes(body.as_slice().try_into().map_err(|_| {
                JournalError::CorruptRecord("operand size mismatch".into())
            })?);
            match op.opcode {
                OP_ADD => self.0 += arg,
                OP_MUL => self.0 *= arg,
                _ => {
                    return Err(JournalError::OpError {
                        opcode: op.opcode,
                        opversion: op.opversion,
                    })
                }
            }
            Ok(())
        }

        fn save_checkpoint(&self) -> Vec<u8> {
            self.0.to_le_bytes().to_vec()
        }

        fn restore_checkpoint(&mut self, body: &[u8]) -> Result<(), JournalError> {
            self.0 = i64::from_le_bytes(
                body.try_into()
                    .map_err(|_| JournalError::CorruptRecord("checkpoint size mismatch".into()))?,
            );
            Ok(())
        }
    }

    fn add(n: i64) -> Operation {
        Operation::new(OP_ADD, 0, Some(n.to_le_bytes().to_vec()))
    }

    fn mul(n: i64) -> Operation {
        Operation::new(OP_MUL, 0, Some(n.to_le_bytes().to_vec()))
    }

    #[test]
    fn replay_then_checkpoint_then_replay_again() {
        let dir = tempdir().unwrap();

        // First activation: never-persisted target goes straight ACTIVE
        // and takes an immediate checkpoint.
        {
            let storage = FileStorage::open(dir.path(), "counter").unwrap();
            let port = Arc::new(Port::new(storage));
            let target = JournalTarget::new(Counter(0));
            target.restore_from(port.clone(), true).unwrap();
            target.apply(add(5)).unwrap();
            target.apply(mul(3)).unwrap();
            target.with_data(|c| assert_eq!(c.0, 15));
        }

        // Restart: replay the checkpoint plus log recovers state 15.
        {
            let storage = FileStorage::open(dir.path(), "counter").unwrap();
            let port = Arc::new(Port::new(storage));
            let target = JournalTarget::new(Counter(0));
            target.restore_from(port.clone(), true).unwrap();
            target.with_data(|c| assert_eq!(c.0, 15));

            target.apply(add(2)).unwrap();
            target.with_data(|c| assert_eq!(c.0, 17));
            target.take_checkpoint().unwrap();
            target.apply(add(1)).unwrap();
            target.with_data(|c| assert_eq!(c.0, 18));
        }

        // Restart again: checkpoint captured 17, log replays the
        // trailing +1 to reach 18.
        {
            let storage = FileStorage::open(dir.path(), "counter").unwrap();
            let port = Arc::new(Port::new(storage));
            let target = JournalTarget::new(Counter(0));
            target.restore_from(port, true).unwrap();
            target.with_data(|c| assert_eq!(c.0, 18));
        }
    }

    #[test]
    fn apply_before_restore_is_rejected() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path(), "counter").unwrap();
        let port = Arc::new(Port::new(storage));
        let target: JournalTarget<FileStorage, Counter> = JournalTarget::new(Counter(0));
        // Not restored/activated yet.
        assert!(target.apply(add(1)).is_err());
        let _ = port;
    }

    #[test]
    fn second_target_cannot_attach_to_an_occupied_port() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path(), "counter").unwrap();
        let port = Arc::new(Port::new(storage));

        let first: JournalTarget<FileStorage, Counter> = JournalTarget::new(Counter(0));
        first.restore_from(port.clone(), true).unwrap();
        assert!(port.is_attached());

        let second: JournalTarget<FileStorage, Counter> = JournalTarget::new(Counter(0));
        let err = second.restore_from(port, true).unwrap_err();
        assert!(matches!(err, JournalError::StateError(_)));
    }

    #[test]
    fn checkpoint_failure_invalidates_target() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path(), "counter").unwrap();
        let port = Arc::new(Port::new(storage));
        let target = JournalTarget::new(Counter(0));
        target.restore_from(port, true).unwrap();
        assert_eq!(target.state(), State::Active);

        // Remove the directory backing the checkpoint slot out from
        // under the storage to force close_checkpoint to fail.
        std::fs::remove_dir_all(dir.path()).unwrap();
        assert!(target.take_checkpoint().is_err());
        assert_eq!(target.state(), State::Invalid);
    }
}
