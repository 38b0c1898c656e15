//! End-to-end scenarios spanning more than one module, the way
//! `yaleman-goatns/src/tests.rs` aggregates cross-cutting checks that
//! don't belong to any single submodule's `#[cfg(test)]` block.

use std::str::FromStr;
use tempfile::tempdir;

use crate::journal::{FileStorage, JournalError, JournalTarget, Operation, Port, Target};
use crate::net::address::{Ipv4Subnet, Ipv6Addr};

#[test]
fn ipv4_subnet_matches_plain_v4() {
    let subnet = Ipv4Subnet::from_str("10.0.0.0/8").unwrap();
    assert!(subnet.match_v4("10.1.2.3".parse().unwrap()));
    assert!(!subnet.match_v4("11.1.2.3".parse().unwrap()));
}

#[test]
fn ipv4_mapped_address_matches_v4_subnet() {
    let subnet = Ipv4Subnet::from_str("10.0.0.0/8").unwrap();
    let mapped = Ipv6Addr::from_str("::ffff:10.1.2.3").unwrap();
    assert!(subnet.match_v6(mapped));
    assert!(!subnet.match_v6(Ipv6Addr::from_str("2001:db8::1").unwrap()));
}

#[derive(Clone, Debug, PartialEq)]
struct Register(i64);

const OP_SET: u32 = 1;

impl Target for Register {
    fn apply_operation(&mut self, op: &Operation) -> Result<(), JournalError> {
        let body = op
            .body
            .as_ref()
            .ok_or(JournalError::OpError {
                opcode: op.opcode,
                opversion: op.opversion,
            })?;
        if op.opcode != OP_SET {
            return Err(JournalError::OpError {
                opcode: op.opcode,
                opversion: op.opversion,
            });
        }
        self.0 = i64::from_le_bytes(body.as_slice().try_into().unwrap());
        Ok(())
    }

    fn save_checkpoint(&self) -> Vec<u8> {
        self.0.to_le_bytes().to_vec()
    }

    fn restore_checkpoint(&mut self, body: &[u8]) -> Result<(), JournalError> {
        self.0 = i64::from_le_bytes(body.try_into().unwrap());
        Ok(())
    }
}

/// Spec §8.2's journal recovery scenario: apply operations, crash
/// (simulated by dropping and reopening storage), and confirm the
/// recovered state matches what was applied before the crash.
#[test]
fn journal_recovers_after_simulated_crash() {
    let dir = tempdir().unwrap();

    {
        let storage = FileStorage::open(dir.path(), "register").unwrap();
        let port = std::sync::Arc::new(Port::new(storage));
        let target = JournalTarget::new(Register(0));
        target.restore_from(port, true).unwrap();
        target
            .apply(Operation::new(OP_SET, 0, Some(42i64.to_le_bytes().to_vec())))
            .unwrap();
        target.with_data(|r| assert_eq!(r.0, 42));
    }

    let storage = FileStorage::open(dir.path(), "register").unwrap();
    let port = std::sync::Arc::new(Port::new(storage));
    let target = JournalTarget::new(Register(0));
    target.restore_from(port, true).unwrap();
    target.with_data(|r| assert_eq!(r.0, 42));
}
