// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use alloy_primitives::{Address, Bytes};
use thiserror::Error;
use venue_core::contracts::SlowModeTx;
use venue_core::transaction::{TransactionKind, split_tag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowModeEntry {
    pub executable_at: u64,
    pub sender: Address,
    pub payload: Bytes,
}

impl SlowModeEntry {
    /// Kind of the queued transaction, if its tag is known.
    pub fn kind(&self) -> Option<TransactionKind> {
        split_tag(&self.payload).ok().map(|(kind, _)| kind)
    }
}

impl From<SlowModeTx> for SlowModeEntry {
    fn from(tx: SlowModeTx) -> Self {
        Self {
            executable_at: tx.executableAt,
            sender: tx.sender,
            payload: tx.tx,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlowModeState {
    Empty,
    Pending,
    Draining,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("slow mode queue reports {processed_up_to} processed of {total}")]
pub struct InconsistentQueue {
    pub total: u64,
    pub processed_up_to: u64,
}

/// Snapshot of the endpoint's slow-mode queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowModeQueue {
    total: u64,
    processed_up_to: u64,
    head: Option<SlowModeEntry>,
}

impl SlowModeQueue {
    /// `head` is dropped when nothing is pending.
    pub fn new(
        total: u64,
        processed_up_to: u64,
        head: Option<SlowModeEntry>,
    ) -> Result<Self, InconsistentQueue> {
        if processed_up_to > total {
            return Err(InconsistentQueue {
                total,
                processed_up_to,
            });
        }
        let head = if processed_up_to < total { head } else { None };
        Ok(Self {
            total,
            processed_up_to,
            head,
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn processed_up_to(&self) -> u64 {
        self.processed_up_to
    }

    pub fn head(&self) -> Option<&SlowModeEntry> {
        self.head.as_ref()
    }

    pub fn pending(&self) -> u64 {
        self.total - self.processed_up_to
    }

    /// State of the queue given the previous observation.
    pub fn state_since(&self, previous: Option<&SlowModeQueue>) -> SlowModeState {
        if self.pending() == 0 {
            return SlowModeState::Empty;
        }
        match previous {
            Some(prev) if self.processed_up_to > prev.processed_up_to => SlowModeState::Draining,
            _ => SlowModeState::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> SlowModeEntry {
        SlowModeEntry {
            executable_at: 10,
            sender: Address::repeat_byte(1),
            payload: Bytes::from_static(&[TransactionKind::DepositCollateral as u8]),
        }
    }

    #[test]
    fn processed_beyond_total_is_rejected() {
        assert_eq!(
            SlowModeQueue::new(1, 2, None),
            Err(InconsistentQueue {
                total: 1,
                processed_up_to: 2
            })
        );
    }

    #[test]
    fn empty_queue_has_no_head() {
        let queue = SlowModeQueue::new(3, 3, Some(entry())).expect("consistent");
        assert_eq!(queue.pending(), 0);
        assert!(queue.head().is_none());
    }

    #[test]
    fn observations_walk_the_state_machine() {
        let empty = SlowModeQueue::new(0, 0, None).expect("consistent");
        let pending = SlowModeQueue::new(2, 0, Some(entry())).expect("consistent");
        let draining = SlowModeQueue::new(2, 1, Some(entry())).expect("consistent");
        let drained = SlowModeQueue::new(2, 2, None).expect("consistent");

        assert_eq!(empty.state_since(None), SlowModeState::Empty);
        assert_eq!(pending.state_since(Some(&empty)), SlowModeState::Pending);
        assert_eq!(draining.state_since(Some(&pending)), SlowModeState::Draining);
        assert_eq!(draining.state_since(Some(&draining)), SlowModeState::Pending);
        assert_eq!(drained.state_since(Some(&draining)), SlowModeState::Empty);
    }

    #[test]
    fn head_kind_comes_from_the_tag() {
        assert_eq!(entry().kind(), Some(TransactionKind::DepositCollateral));
        let unknown = SlowModeEntry {
            payload: Bytes::from_static(&[0xff]),
            ..entry()
        };
        assert_eq!(unknown.kind(), None);
    }
}
