//! Lifecycle of the single tracked write.
//!
//! ```text
//! Idle ──submit──▶ Submitted ──observe──▶ Confirming ──┬─▶ Confirmed ──dismiss──▶ Idle
//!                                                      └─▶ Failed ─────dismiss──▶ Idle
//! ```
//!
//! The slow-confirmation warning is an advisory flag on `Confirming`, not a
//! state of its own. Every transition is keyed by the transaction hash so a
//! late result from an earlier cycle cannot move the current one.

use alloy::primitives::TxHash;

use crate::error::{MemoError, Result};
use crate::normalize::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    Submitted,
    Confirming,
    Confirmed,
    Failed,
}

impl TxPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxPhase::Confirmed | TxPhase::Failed)
    }
}

impl std::fmt::Display for TxPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "submitted"),
            Self::Confirming => write!(f, "confirming"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub hash: TxHash,
    /// Unix seconds at which the node accepted the transaction.
    pub submitted_at: u64,
    pub phase: TxPhase,
    pub timeout_warned: bool,
    pub failure: Option<FailureKind>,
}

#[derive(Debug, Default, Clone)]
pub struct Tracker {
    current: Option<PendingTransaction>,
}

impl Tracker {
    pub fn current(&self) -> Option<&PendingTransaction> {
        self.current.as_ref()
    }

    pub fn phase(&self) -> Option<TxPhase> {
        self.current.as_ref().map(|tx| tx.phase)
    }

    /// A transaction is on its way and has not settled.
    pub fn is_busy(&self) -> bool {
        matches!(self.phase(), Some(TxPhase::Submitted | TxPhase::Confirming))
    }

    /// Whether a new write may start: idle, or the last one failed.
    pub fn ensure_ready(&self) -> Result<()> {
        match self.phase() {
            None | Some(TxPhase::Failed) => Ok(()),
            Some(TxPhase::Confirmed) => Err(MemoError::AwaitingDismiss),
            Some(TxPhase::Submitted | TxPhase::Confirming) => Err(MemoError::Busy),
        }
    }

    /// Start tracking a freshly accepted transaction.
    pub fn submitted(&mut self, hash: TxHash, submitted_at: u64) -> Result<()> {
        self.ensure_ready()?;
        self.current = Some(PendingTransaction {
            hash,
            submitted_at,
            phase: TxPhase::Submitted,
            timeout_warned: false,
            failure: None,
        });
        Ok(())
    }

    fn active_mut(&mut self, hash: TxHash) -> Option<&mut PendingTransaction> {
        self.current
            .as_mut()
            .filter(|tx| tx.hash == hash && !tx.phase.is_terminal())
    }

    pub fn begin_confirming(&mut self, hash: TxHash) -> bool {
        match self.active_mut(hash) {
            Some(tx) if tx.phase == TxPhase::Submitted => {
                tx.phase = TxPhase::Confirming;
                true
            }
            _ => false,
        }
    }

    pub fn confirm(&mut self, hash: TxHash) -> bool {
        let Some(tx) = self.active_mut(hash) else {
            return false;
        };
        tx.phase = TxPhase::Confirmed;
        true
    }

    pub fn fail(&mut self, hash: TxHash, kind: FailureKind) -> bool {
        let Some(tx) = self.active_mut(hash) else {
            return false;
        };
        tx.phase = TxPhase::Failed;
        tx.failure = Some(kind);
        true
    }

    /// Mark the slow-confirmation warning as shown. True only the first time
    /// for a transaction that is still unsettled.
    pub fn warn_timeout(&mut self, hash: TxHash) -> bool {
        match self.active_mut(hash) {
            Some(tx) if !tx.timeout_warned => {
                tx.timeout_warned = true;
                true
            }
            _ => false,
        }
    }

    /// Return to idle after a terminal state.
    pub fn dismiss(&mut self) -> Result<()> {
        if self.is_busy() {
            return Err(MemoError::Busy);
        }
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u8) -> TxHash {
        TxHash::with_last_byte(n)
    }

    #[test]
    fn happy_path() {
        let mut t = Tracker::default();
        t.submitted(hash(1), 100).unwrap();
        assert_eq!(t.phase(), Some(TxPhase::Submitted));
        assert!(t.begin_confirming(hash(1)));
        assert!(t.is_busy());
        assert!(t.confirm(hash(1)));
        assert_eq!(t.phase(), Some(TxPhase::Confirmed));
        assert!(!t.is_busy());
        t.dismiss().unwrap();
        assert_eq!(t.phase(), None);
    }

    #[test]
    fn rejects_second_submission_while_outstanding() {
        let mut t = Tracker::default();
        t.submitted(hash(1), 0).unwrap();
        assert!(matches!(t.submitted(hash(2), 0), Err(MemoError::Busy)));
        t.begin_confirming(hash(1));
        assert!(matches!(t.ensure_ready(), Err(MemoError::Busy)));
        assert!(matches!(t.dismiss(), Err(MemoError::Busy)));
        t.confirm(hash(1));
        assert!(matches!(t.ensure_ready(), Err(MemoError::AwaitingDismiss)));
    }

    #[test]
    fn failed_allows_resubmission() {
        let mut t = Tracker::default();
        t.submitted(hash(1), 0).unwrap();
        t.begin_confirming(hash(1));
        assert!(t.fail(hash(1), FailureKind::Revert("execution reverted".into())));
        assert_eq!(t.current().unwrap().failure, Some(FailureKind::Revert("execution reverted".into())));
        t.submitted(hash(2), 5).unwrap();
        assert_eq!(t.current().unwrap().hash, hash(2));
        assert_eq!(t.current().unwrap().failure, None);
    }

    #[test]
    fn stale_hash_is_ignored() {
        let mut t = Tracker::default();
        t.submitted(hash(2), 0).unwrap();
        t.begin_confirming(hash(2));
        assert!(!t.confirm(hash(1)));
        assert!(!t.fail(hash(1), FailureKind::Unknown));
        assert!(!t.warn_timeout(hash(1)));
        assert_eq!(t.phase(), Some(TxPhase::Confirming));
    }

    #[test]
    fn timeout_warns_once_and_never_after_settling() {
        let mut t = Tracker::default();
        t.submitted(hash(1), 0).unwrap();
        t.begin_confirming(hash(1));
        assert!(t.warn_timeout(hash(1)));
        assert!(!t.warn_timeout(hash(1)));
        assert_eq!(t.phase(), Some(TxPhase::Confirming));

        let mut t = Tracker::default();
        t.submitted(hash(3), 0).unwrap();
        t.begin_confirming(hash(3));
        t.confirm(hash(3));
        assert!(!t.warn_timeout(hash(3)));
    }

    #[test]
    fn terminal_states_do_not_move() {
        let mut t = Tracker::default();
        t.submitted(hash(1), 0).unwrap();
        t.begin_confirming(hash(1));
        t.fail(hash(1), FailureKind::Timeout);
        assert!(!t.confirm(hash(1)));
        assert_eq!(t.phase(), Some(TxPhase::Failed));
    }
}
