//! Journal record framing (spec §6.3): an [`Operation`] is an opcode,
//! an opversion, and an optional body. Records on disk are
//! `magic | header | padded body | tail`, little-endian, with the tail
//! carrying a duplicate size and a CRC32 that is computed differently
//! depending on whether the operation has a body — mirroring the
//! bodyless fast path in the original `Port::store_operation`.

use crc32fast::Hasher;

use super::error::JournalError;

pub(crate) const RECORD_MAGIC: u32 = 0x4A52_4E31; // "JRN1"
const HEADER_LEN: usize = 16; // opcode, opversion, data_size, reserved
const TAIL_LEN: usize = 8; // data_size, crc32

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub opcode: u32,
    pub opversion: u32,
    pub body: Option<Vec<u8>>,
}

impl Operation {
    pub fn new(opcode: u32, opversion: u32, body: Option<Vec<u8>>) -> Self {
        Operation {
            opcode,
            opversion,
            body,
        }
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

fn aligned_size(size: usize) -> usize {
    (size + 7) & !7
}

/// Encodes an operation into its on-disk record form.
pub(crate) fn encode_record(op: &Operation) -> Vec<u8> {
    let body: &[u8] = op.body.as_deref().unwrap_or(&[]);
    let data_size = body.len() as u32;
    let padded = aligned_size(body.len());

    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(&op.opcode.to_le_bytes());
    header[4..8].copy_from_slice(&op.opversion.to_le_bytes());
    header[8..12].copy_from_slice(&data_size.to_le_bytes());
    header[12..16].copy_from_slice(&0u32.to_le_bytes());

    let mut hasher = Hasher::new();
    hasher.update(&header);
    if !body.is_empty() {
        hasher.update(body);
    }
    hasher.update(&data_size.to_le_bytes());
    let crc = hasher.finalize();

    let mut record = Vec::with_capacity(4 + HEADER_LEN + padded + TAIL_LEN);
    record.extend_from_slice(&RECORD_MAGIC.to_le_bytes());
    record.extend_from_slice(&header);
    record.extend_from_slice(body);
    record.resize(record.len() + (padded - body.len()), 0);
    record.extend_from_slice(&data_size.to_le_bytes());
    record.extend_from_slice(&crc.to_le_bytes());
    record
}

/// Decodes a single record from the front of `bytes`, returning the
/// operation and the number of bytes consumed.
pub(crate) fn decode_record(bytes: &[u8]) -> Result<(Operation, usize), JournalError> {
    if bytes.len() < 4 + HEADER_LEN {
        return Err(JournalError::CorruptRecord("record truncated before header".into()));
    }
    let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if magic != RECORD_MAGIC {
        return Err(JournalError::CorruptRecord(format!("bad magic {magic:#x}")));
    }
    let header = &bytes[4..4 + HEADER_LEN];
    let opcode = u32::from_le_bytes(header[0..4].try_into().unwrap());
    let opversion = u32::from_le_bytes(header[4..8].try_into().unwrap());
    let data_size = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;
    let padded = aligned_size(data_size);

    let body_start = 4 + HEADER_LEN;
    let tail_start = body_start + padded;
    if bytes.len() < tail_start + TAIL_LEN {
        return Err(JournalError::CorruptRecord("record truncated before tail".into()));
    }
    let body = &bytes[body_start..body_start + data_size];
    let tail = &bytes[tail_start..tail_start + TAIL_LEN];
    let tail_size = u32::from_le_bytes(tail[0..4].try_into().unwrap()) as usize;
    let crc = u32::from_le_bytes(tail[4..8].try_into().unwrap());
    if tail_size != data_size {
        return Err(JournalError::CorruptRecord("header/tail size mismatch".into()));
    }

    let mut hasher = Hasher::new();
    hasher.update(header);
    if !body.is_empty() {
        hasher.update(body);
    }
    hasher.update(&(data_size as u32).to_le_bytes());
    if hasher.finalize() != crc {
        return Err(JournalError::CorruptRecord("CRC mismatch".into()));
    }

    let op = Operation::new(
        opcode,
        opversion,
        if data_size == 0 { None } else { Some(body.to_vec()) },
    );
    Ok((op, tail_start + TAIL_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodyless_round_trip() {
        let op = Operation::new(1, 0, None);
        let record = encode_record(&op);
        let (decoded, consumed) = decode_record(&record).unwrap();
        assert_eq!(decoded, op);
        assert_eq!(consumed, record.len());
    }

    #[test]
    fn bodied_round_trip_with_padding() {
        let op = Operation::new(7, 2, Some(b"abc".to_vec()));
        let record = encode_record(&op);
        assert_eq!(record.len(), 4 + HEADER_LEN + 8 + TAIL_LEN);
        let (decoded, consumed) = decode_record(&record).unwrap();
        assert_eq!(decoded, op);
        assert_eq!(consumed, record.len());
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let op = Operation::new(3, 1, Some(b"hello".to_vec()));
        let mut record = encode_record(&op);
        let last = record.len() - 1;
        record[last] ^= 0xFF;
        assert!(matches!(decode_record(&record), Err(JournalError::CorruptRecord(_))));
    }
}
