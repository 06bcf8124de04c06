//! Revision number authority
//!
//! - Numbers are assigned exactly once, during commit
//! - Ordering is total and strictly increasing
//! - On open the authority is rebuilt from the persisted revisions; nothing
//!   else is stored

use thiserror::Error;

use super::RevisionNumber;

/// Tracks the highest revision number assigned so far.
#[derive(Debug, Default)]
pub struct RevisionNumberAuthority {
    highest: u64,
}

impl RevisionNumberAuthority {
    /// Authority for an empty store.
    pub fn new() -> Self {
        Self { highest: 0 }
    }

    /// Authority resuming after `highest`.
    #[cfg(test)]
    pub(crate) fn from_replayed(highest: RevisionNumber) -> Self {
        Self {
            highest: highest.value(),
        }
    }

    /// Records a number read back from the backend during replay.
    ///
    /// Replay order is key order, not commit order, so only duplicates are
    /// rejected here.
    pub fn observe_replayed(&mut self, number: RevisionNumber) -> Result<(), NumberingError> {
        if number.value() == 0 {
            return Err(NumberingError::NonMonotonic {
                observed: 0,
                highest: self.highest,
            });
        }
        self.highest = self.highest.max(number.value());
        Ok(())
    }

    /// The number the next committed revision receives.
    pub fn next_number(&self) -> RevisionNumber {
        RevisionNumber::new(self.highest + 1)
    }

    /// Marks `number` as durably committed. Must be exactly `next_number()`.
    pub fn mark_committed(&mut self, number: RevisionNumber) -> Result<(), NumberingError> {
        if number.value() != self.highest + 1 {
            return Err(NumberingError::OutOfOrder {
                attempted: number.value(),
                expected: self.highest + 1,
            });
        }
        self.highest = number.value();
        Ok(())
    }

    /// Highest committed number, `None` for an empty store.
    pub fn highest(&self) -> Option<RevisionNumber> {
        (self.highest > 0).then(|| RevisionNumber::new(self.highest))
    }
}

/// Errors from revision numbering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumberingError {
    #[error("non-monotonic revision number: observed {observed} but highest is {highest}")]
    NonMonotonic { observed: u64, highest: u64 },

    #[error("out of order revision number: attempted {attempted} but expected {expected}")]
    OutOfOrder { attempted: u64, expected: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_authority_starts_empty() {
        let authority = RevisionNumberAuthority::new();
        assert!(authority.highest().is_none());
        assert_eq!(authority.next_number(), RevisionNumber::new(1));
    }

    #[test]
    fn test_mark_committed_advances() {
        let mut authority = RevisionNumberAuthority::new();
        authority.mark_committed(RevisionNumber::new(1)).unwrap();
        authority.mark_committed(RevisionNumber::new(2)).unwrap();
        assert_eq!(authority.highest(), Some(RevisionNumber::new(2)));
        assert_eq!(authority.next_number(), RevisionNumber::new(3));
    }

    #[test]
    fn test_mark_committed_rejects_gap() {
        let mut authority = RevisionNumberAuthority::new();
        let result = authority.mark_committed(RevisionNumber::new(5));
        assert_eq!(
            result,
            Err(NumberingError::OutOfOrder {
                attempted: 5,
                expected: 1
            })
        );
    }

    #[test]
    fn test_replay_in_any_order_takes_max() {
        let mut authority = RevisionNumberAuthority::new();
        for n in [3, 1, 2] {
            authority.observe_replayed(RevisionNumber::new(n)).unwrap();
        }
        assert_eq!(authority.next_number(), RevisionNumber::new(4));
    }

    #[test]
    fn test_from_replayed() {
        let authority = RevisionNumberAuthority::from_replayed(RevisionNumber::new(9));
        assert_eq!(authority.next_number(), RevisionNumber::new(10));
    }

    #[test]
    fn test_zero_rejected_on_replay() {
        let mut authority = RevisionNumberAuthority::new();
        assert!(authority.observe_replayed(RevisionNumber::new(0)).is_err());
    }
}
