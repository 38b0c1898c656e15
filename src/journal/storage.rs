//! Storage backend for a journal: an append-only operation log plus a
//! single checkpoint slot, matching spec §4.5's `Storage` port. The
//! file-backed implementation keeps the operation log truncated to
//! only what has accumulated since the last committed checkpoint,
//! since a checkpoint already captures everything before it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use super::error::JournalError;
use super::operation::{decode_record, encode_record, Operation};

#[allow(clippy::len_without_is_empty)]
pub trait Storage: Send {
    fn append_record(&mut self, op: &Operation) -> Result<u64, JournalError>;

    /// Replays every record currently in the operation log, in order,
    /// calling `handler` for each. Stops and propagates on the first
    /// error the handler returns.
    fn replay_records(
        &mut self,
        handler: &mut dyn FnMut(&Operation) -> Result<(), JournalError>,
    ) -> Result<u32, JournalError>;

    fn create_checkpoint(&mut self) -> Result<(CheckpointWriter, u64), JournalError>;

    /// Commits or discards a checkpoint previously opened with
    /// [`Storage::create_checkpoint`]. Committing also truncates the
    /// operation log, since the checkpoint now subsumes it.
    fn close_checkpoint(&mut self, writer: CheckpointWriter, commit: bool) -> Result<(), JournalError>;

    /// Replays the most recently committed checkpoint, if any.
    fn replay_checkpoint(
        &mut self,
        handler: &mut dyn FnMut(&[u8]) -> Result<(), JournalError>,
    ) -> Result<Option<u64>, JournalError>;

    fn set_user_magic(&mut self, magic: u32) -> Result<(), JournalError>;
    fn make_writable(&mut self) -> Result<(), JournalError>;

    /// Total bytes currently held by the operation log plus the
    /// committed checkpoint, for introspection (`journal dump` CLI).
    fn len(&self) -> Result<u64, JournalError>;
}

/// An in-progress checkpoint body, accumulated in memory and flushed
/// to the checkpoint slot on commit.
pub struct CheckpointWriter {
    buf: Vec<u8>,
    generation: u64,
}

impl Write for CheckpointWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.write(data)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

const CHECKPOINT_MAGIC: u32 = 0x4A52_4B43; // "JRKC"

pub struct FileStorage {
    ops_path: PathBuf,
    checkpoint_path: PathBuf,
    user_magic: u32,
    generation: u64,
    writable: bool,
}

impl FileStorage {
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self, JournalError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let ops_path = dir.join(format!("{name}.ops"));
        let checkpoint_path = dir.join(format!("{name}.ckpt"));
        if !ops_path.exists() {
            File::create(&ops_path)?;
        }
        let generation = read_checkpoint_generation(&checkpoint_path)?.unwrap_or(0);
        Ok(FileStorage {
            ops_path,
            checkpoint_path,
            user_magic: 0,
            generation,
            writable: false,
        })
    }
}

fn read_checkpoint_generation(path: &Path) -> Result<Option<u64>, JournalError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    if bytes.len() < 12 {
        return Ok(None);
    }
    let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if magic != CHECKPOINT_MAGIC {
        return Err(JournalError::CorruptRecord("bad checkpoint magic".into()));
    }
    let generation = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
    Ok(Some(generation))
}

impl Storage for FileStorage {
    fn append_record(&mut self, op: &Operation) -> Result<u64, JournalError> {
        if !self.writable {
            return Err(JournalError::StateError("storage is not writable".into()));
        }
        let record = encode_record(op);
        let mut file = OpenOptions::new().append(true).open(&self.ops_path)?;
        let offset = file.metadata()?.len();
        file.write_all(&record)?;
        Ok(offset)
    }

    fn replay_records(
        &mut self,
        handler: &mut dyn FnMut(&Operation) -> Result<(), JournalError>,
    ) -> Result<u32, JournalError> {
        let bytes = fs::read(&self.ops_path)?;
        let mut pos = 0;
        let mut count = 0;
        while pos < bytes.len() {
            let (op, consumed) = decode_record(&bytes[pos..])?;
            handler(&op)?;
            pos += consumed;
            count += 1;
        }
        Ok(count)
    }

    fn create_checkpoint(&mut self) -> Result<(CheckpointWriter, u64), JournalError> {
        let generation = self.generation + 1;
        Ok((
            CheckpointWriter {
                buf: Vec::new(),
                generation,
            },
            generation,
        ))
    }

    fn close_checkpoint(&mut self, writer: CheckpointWriter, commit: bool) -> Result<(), JournalError> {
        if !commit {
            return Ok(());
        }
        let tmp_path = self.checkpoint_path.with_extension("ckpt.tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&CHECKPOINT_MAGIC.to_le_bytes())?;
        tmp.write_all(&writer.generation.to_le_bytes())?;
        tmp.write_all(&self.user_magic.to_le_bytes())?;
        tmp.write_all(&(writer.buf.len() as u64).to_le_bytes())?;
        tmp.write_all(&writer.buf)?;
        tmp.sync_all()?;
        drop(tmp);
        fs::rename(&tmp_path, &self.checkpoint_path)?;
        File::create(&self.ops_path)?;
        self.generation = writer.generation;
        Ok(())
    }

    fn replay_checkpoint(
        &mut self,
        handler: &mut dyn FnMut(&[u8]) -> Result<(), JournalError>,
    ) -> Result<Option<u64>, JournalError> {
        if !self.checkpoint_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.checkpoint_path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        if bytes.len() < 20 {
            return Err(JournalError::CorruptRecord("checkpoint truncated".into()));
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != CHECKPOINT_MAGIC {
            return Err(JournalError::CorruptRecord("bad checkpoint magic".into()));
        }
        let generation = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
        self.user_magic = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let len = u64::from_le_bytes(bytes[16..24].try_into().unwrap()) as usize;
        let body = &bytes[24..24 + len];
        handler(body)?;
        self.generation = generation;
        Ok(Some(generation))
    }

    fn set_user_magic(&mut self, magic: u32) -> Result<(), JournalError> {
        self.user_magic = magic;
        Ok(())
    }

    fn make_writable(&mut self) -> Result<(), JournalError> {
        self.writable = true;
        Ok(())
    }

    fn len(&self) -> Result<u64, JournalError> {
        let ops_len = fs::metadata(&self.ops_path)?.len();
        let ckpt_len = fs::metadata(&self.checkpoint_path).map(|m| m.len()).unwrap_or(0);
        Ok(ops_len + ckpt_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_replay_round_trips() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path(), "counter").unwrap();
        storage.make_writable().unwrap();
        storage
            .append_record(&Operation::new(1, 0, Some(5i64.to_le_bytes().to_vec())))
            .unwrap();
        storage
            .append_record(&Operation::new(2, 0, Some(3i64.to_le_bytes().to_vec())))
            .unwrap();

        let mut seen = Vec::new();
        let count = storage
            .replay_records(&mut |op| {
                seen.push(op.opcode);
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn checkpoint_commit_truncates_log() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path(), "counter").unwrap();
        storage.make_writable().unwrap();
        storage
            .append_record(&Operation::new(1, 0, Some(5i64.to_le_bytes().to_vec())))
            .unwrap();

        let (mut writer, generation) = storage.create_checkpoint().unwrap();
        writer.write_all(&15i64.to_le_bytes()).unwrap();
        storage.close_checkpoint(writer, true).unwrap();
        assert_eq!(generation, 1);

        let mut loaded = None;
        let found_generation = storage
            .replay_checkpoint(&mut |body| {
                loaded = Some(i64::from_le_bytes(body.try_into().unwrap()));
                Ok(())
            })
            .unwrap();
        assert_eq!(found_generation, Some(1));
        assert_eq!(loaded, Some(15));

        let count = storage.replay_records(&mut |_| Ok(())).unwrap();
        assert_eq!(count, 0, "committed checkpoint should truncate the operation log");
    }

    #[test]
    fn discarded_checkpoint_leaves_log_intact() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path(), "counter").unwrap();
        storage.make_writable().unwrap();
        storage
            .append_record(&Operation::new(1, 0, Some(5i64.to_le_bytes().to_vec())))
            .unwrap();

        let (writer, _generation) = storage.create_checkpoint().unwrap();
        storage.close_checkpoint(writer, false).unwrap();

        let count = storage.replay_records(&mut |_| Ok(())).unwrap();
        assert_eq!(count, 1, "discarded checkpoint must not touch the operation log");
        assert!(!storage.checkpoint_path.exists());
    }
}
