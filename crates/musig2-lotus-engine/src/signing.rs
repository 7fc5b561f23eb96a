//! Self-signs outbound protocol messages (advertisements, signing requests,
//! participant-joined replies) over their canonical byte encoding.
//!
//! There is no single-key Schnorr signing primitive in `musig2-lotus-core`
//! — only the multi-party ceremony — so a self-signature is produced the
//! same way the security crate's own tests produce one: a trivial 1-of-1
//! MuSig2 ceremony with a fixed-entropy nonce. The caller is both the sole
//! signer and sole participant, so every round collapses to a single step.

use sha2::{Digest, Sha256};

use musig2_lotus_core::crypto::{
    derive_pubkey, musig_key_agg, musig_nonce_agg, musig_nonce_gen, musig_partial_sign, musig_sig_agg,
};
use musig2_lotus_core::error::MusigError;

pub fn sign_canonical(privkey: &[u8; 32], canonical_bytes: &[u8]) -> Result<[u8; 64], MusigError> {
    let digest: [u8; 32] = Sha256::digest(canonical_bytes).into();
    let pubkey = derive_pubkey(privkey)?;
    let ctx = musig_key_agg(&[pubkey])?;
    let (secret_nonce, public_nonce) = musig_nonce_gen(privkey, &ctx, &digest, None)?;
    let (agg_r1, agg_r2) = musig_nonce_agg(&[public_nonce])?;
    let partial = musig_partial_sign(secret_nonce, privkey, &ctx, &pubkey, agg_r1, agg_r2, &digest)?;
    musig_sig_agg(&ctx, agg_r1, agg_r2, &[partial], &digest)
}
