//! Coordinator election: a deterministic function over the sorted signer
//! set picks an initial coordinator index. `HashBased` additionally mixes
//! in the session id so different sessions over the same roster elect
//! different coordinators.

use sha2::{Digest, Sha256};

use crate::config::ElectionMethod;

/// `joined_order` lists signer indices in the order their `ParticipantJoined`
/// messages arrived; it is only consulted by `FirstSigner`.
pub fn elect_coordinator(
    method: ElectionMethod,
    session_id: &str,
    sorted_pubkeys: &[[u8; 33]],
    joined_order: &[usize],
) -> usize {
    match method {
        ElectionMethod::LexicographicFirst => 0,
        ElectionMethod::LexicographicLast => sorted_pubkeys.len().saturating_sub(1),
        ElectionMethod::FirstSigner => joined_order.first().copied().unwrap_or(0),
        ElectionMethod::HashBased => {
            let mut hasher = Sha256::new();
            hasher.update(session_id.as_bytes());
            for pk in sorted_pubkeys {
                hasher.update(pk);
            }
            let digest = hasher.finalize();
            let n = sorted_pubkeys.len().max(1) as u64;
            let value = u64::from_be_bytes(digest[0..8].try_into().expect("8 bytes"));
            (value % n) as usize
        }
    }
}

/// The failover order: the election order starting from the just-failed
/// coordinator's successor, wrapping around, excluding the failed index
/// itself exactly once per lap.
pub fn next_coordinator(current: usize, participant_count: usize) -> usize {
    if participant_count == 0 {
        return 0;
    }
    (current + 1) % participant_count
}
