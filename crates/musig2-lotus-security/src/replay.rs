//! Sequence-number replay guard, keyed by `(session_id, signer_index)`.
//!
//! This is the security manager's message-layer replay check, distinct
//! from — and complementary to — the session state machine's own
//! equivocation guard in `musig2-lotus-core::session` (which rejects a
//! *second distinct value* for a round already filled). This guard instead
//! rejects any message whose sequence number is not strictly greater than
//! the last one accepted from that signer in that session, and additionally
//! flags (via the caller) an unusually large forward jump as suspicious.

use std::collections::HashMap;

pub struct ReplayGuard {
    last_seen: HashMap<(String, u8), u64>,
    max_gap: u64,
}

pub enum SequenceCheck {
    Accepted,
    /// Non-increasing: drop the message.
    Replayed,
    /// Increasing but by more than `max_gap`: still accepted, but the peer
    /// should be flagged (reputation penalty) by the caller.
    AcceptedWithGapWarning,
}

impl ReplayGuard {
    pub fn new(max_gap: u64) -> Self {
        Self {
            last_seen: HashMap::new(),
            max_gap,
        }
    }

    pub fn check(&mut self, session_id: &str, signer_index: u8, sequence: u64) -> SequenceCheck {
        let key = (session_id.to_string(), signer_index);
        let last = self.last_seen.get(&key).copied();
        match last {
            Some(last) if sequence <= last => SequenceCheck::Replayed,
            Some(last) => {
                let gap = sequence - last;
                self.last_seen.insert(key, sequence);
                if gap > self.max_gap {
                    SequenceCheck::AcceptedWithGapWarning
                } else {
                    SequenceCheck::Accepted
                }
            }
            None => {
                self.last_seen.insert(key, sequence);
                if sequence > self.max_gap {
                    SequenceCheck::AcceptedWithGapWarning
                } else {
                    SequenceCheck::Accepted
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing_sequence_is_accepted() {
        let mut guard = ReplayGuard::new(100);
        assert!(matches!(guard.check("s1", 0, 1), SequenceCheck::Accepted));
        assert!(matches!(guard.check("s1", 0, 2), SequenceCheck::Accepted));
    }

    #[test]
    fn non_increasing_sequence_is_replay() {
        let mut guard = ReplayGuard::new(100);
        guard.check("s1", 0, 5);
        assert!(matches!(guard.check("s1", 0, 5), SequenceCheck::Replayed));
        assert!(matches!(guard.check("s1", 0, 3), SequenceCheck::Replayed));
    }

    #[test]
    fn large_forward_jump_is_flagged_but_accepted() {
        let mut guard = ReplayGuard::new(100);
        guard.check("s1", 0, 1);
        assert!(matches!(
            guard.check("s1", 0, 500),
            SequenceCheck::AcceptedWithGapWarning
        ));
    }

    #[test]
    fn different_signers_in_same_session_are_independent() {
        let mut guard = ReplayGuard::new(100);
        guard.check("s1", 0, 10);
        assert!(matches!(guard.check("s1", 1, 1), SequenceCheck::Accepted));
    }
}
