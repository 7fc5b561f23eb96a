//! Canonical byte encodings for the payloads that carry a self-signature
//! (§6). The security manager verifies against exactly these bytes; the
//! signer (discovery crate, or a signing-request creator) produces them
//! the same way, so both directions stay in lock-step without either side
//! guessing at the other's serialization.

fn push_len_prefixed(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// `criteria` has no normative encoding in §6 beyond "deterministic
/// encoding"; this sorts tx_kinds and tags so the same criteria value
/// always produces the same bytes regardless of construction order.
pub fn criteria_canonical_bytes(criteria: &crate::messages::CapabilityCriteria) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut kinds = criteria.tx_kinds.clone();
    kinds.sort();
    buf.extend_from_slice(&(kinds.len() as u32).to_be_bytes());
    for k in &kinds {
        push_len_prefixed(&mut buf, k);
    }
    match criteria.amount_range {
        Some(r) => {
            buf.push(1);
            buf.extend_from_slice(&r.min.to_be_bytes());
            buf.extend_from_slice(&r.max.to_be_bytes());
        }
        None => buf.push(0),
    }
    match criteria.min_reputation {
        Some(r) => {
            buf.push(1);
            buf.extend_from_slice(&r.to_be_bytes());
        }
        None => buf.push(0),
    }
    buf.extend_from_slice(&(criteria.tags.len() as u32).to_be_bytes());
    for (k, v) in &criteria.tags {
        push_len_prefixed(&mut buf, k);
        push_len_prefixed(&mut buf, v);
    }
    buf
}

/// `peer-id (UTF-8) || sorted multiaddresses (UTF-8, length-prefixed) ||
/// public key (33 B) || criteria (deterministic encoding) || 8-byte BE
/// timestamp || 8-byte BE expiresAt`.
pub fn advertisement_canonical_bytes(ad: &crate::messages::SignerAdvertisement) -> Vec<u8> {
    let mut buf = Vec::new();
    push_len_prefixed(&mut buf, &ad.peer_id);
    let mut addrs = ad.addresses.clone();
    addrs.sort();
    buf.extend_from_slice(&(addrs.len() as u32).to_be_bytes());
    for a in &addrs {
        push_len_prefixed(&mut buf, a);
    }
    buf.extend_from_slice(&ad.pubkey);
    buf.extend_from_slice(&criteria_canonical_bytes(&ad.criteria));
    buf.extend_from_slice(&ad.created_at.to_be_bytes());
    buf.extend_from_slice(&ad.expires_at.to_be_bytes());
    buf
}

/// `request-id || required public keys (concat in order) || 32-byte
/// message || creator peer-id || creator public key || 8-byte timestamp ||
/// 8-byte expiresAt`.
pub fn signing_request_canonical_bytes(req: &crate::messages::SigningRequest) -> Vec<u8> {
    let mut buf = Vec::new();
    push_len_prefixed(&mut buf, &req.request_id);
    for pk in &req.required_pubkeys {
        buf.extend_from_slice(pk);
    }
    buf.extend_from_slice(&req.message);
    push_len_prefixed(&mut buf, &req.creator_peer_id);
    buf.extend_from_slice(&req.creator_pubkey);
    buf.extend_from_slice(&req.created_at.to_be_bytes());
    buf.extend_from_slice(&req.expires_at.to_be_bytes());
    buf
}

/// `request-id || 1-byte index || participant peer-id || participant
/// public key || 8-byte timestamp`.
pub fn participant_joined_canonical_bytes(pj: &crate::messages::ParticipantJoined) -> Vec<u8> {
    let mut buf = Vec::new();
    push_len_prefixed(&mut buf, &pj.request_id);
    buf.push(pj.index);
    push_len_prefixed(&mut buf, &pj.peer_id);
    buf.extend_from_slice(&pj.pubkey);
    buf.extend_from_slice(&pj.timestamp.to_be_bytes());
    buf
}

/// `SHA-256(concat(sorted signers) || SHA-256(message))`, lowercase hex,
/// truncated to 16 characters. Independent of the order signers were
/// supplied in, since `sorted_pubkeys` is already canonically sorted by
/// `musig_key_agg`.
pub fn derive_session_id(sorted_pubkeys: &[musig2_lotus_core::crypto::PubkeyBytes], message: &[u8; 32]) -> String {
    use sha2::{Digest, Sha256};
    let message_hash: [u8; 32] = Sha256::digest(message).into();
    let mut hasher = Sha256::new();
    for pk in sorted_pubkeys {
        hasher.update(pk);
    }
    hasher.update(message_hash);
    let full = hasher.finalize();
    hex::encode(&full[..8])
}
