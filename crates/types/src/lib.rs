//! Core types for the Veriqo attestation consensus committee.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Identifiers**: TaskId, VerifierId, NodeId
//! - **Attestations**: QosProof and its media/quality payloads
//! - **Task records**: TaskState, TaskStatus, ValidationInfo
//! - **Crypto**: KeyPair, pluggable message authenticator and proof verifier
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod crypto;
mod digest;
mod identifiers;
mod proof;
mod task;

pub use crypto::{
    CommitteeAuthenticator, KeyPair, MessageAuthenticator, PresenceProofVerifier, ProofVerifier,
    PublicKey,
};
pub use digest::proof_digest;
pub use identifiers::{NodeId, TaskId, VerifierId};
pub use proof::{AudioQualityData, MediaSpecs, QosProof, SupplementaryInfo, VideoQualityData};
pub use task::{ConflictType, TaskResult, TaskState, TaskStatus, ValidationInfo};

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;
    use std::collections::BTreeMap;

    /// Build a well-formed proof for a task/verifier pair.
    ///
    /// Media specs default to H.264 1920x1080 @ 5000 kbps with audio, video
    /// score 85.5 and a single GOP entry. Tests tweak fields from there.
    pub fn test_proof(task: &str, verifier: &str, timestamp: u64) -> QosProof {
        let mut gop_scores = BTreeMap::new();
        gop_scores.insert("0".to_string(), "86.2".to_string());
        QosProof {
            task_id: TaskId::from(task),
            verifier_id: VerifierId::from(verifier),
            timestamp,
            media_specs: MediaSpecs {
                codec: "H.264".to_string(),
                width: 1920,
                height: 1080,
                bitrate: Some(5000.0),
                has_audio: true,
            },
            video_quality_data: VideoQualityData {
                overall_score: 85.5,
                gop_scores,
            },
            audio_quality_data: Some(AudioQualityData {
                overall_score: 92.0,
            }),
            sync_quality_data: None,
            signature: format!("sig-{verifier}"),
            id: None,
            supplementary_info: None,
        }
    }
}
