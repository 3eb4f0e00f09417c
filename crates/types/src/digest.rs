//! Proposal digests.

use crate::proof::QosProof;
use sha2::{Digest, Sha256};

/// Compute the hex digest of a proof as used in consensus messages.
///
/// The digest is a SHA-256 over the proof's canonical JSON encoding. GOP
/// scores are held in an ordered map, so the encoding is deterministic for
/// equal proofs.
pub fn proof_digest(proof: &QosProof) -> String {
    let bytes = serde_json::to_vec(proof).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}
