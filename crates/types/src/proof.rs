//! QoS attestations submitted by external verifiers.
//!
//! Field names are camelCase on the wire, bit-exact with the HTTP ingress
//! interface. A proof is immutable once accepted and is shared between the
//! task table and the consensus proposal as `Arc<QosProof>`.

use crate::identifiers::{TaskId, VerifierId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One verifier's signed attestation about a task's transcoding quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QosProof {
    /// Task this attestation refers to.
    pub task_id: TaskId,
    /// Verifier that produced the attestation. Unique per task.
    pub verifier_id: VerifierId,
    /// Measurement time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Observed media output characteristics.
    pub media_specs: MediaSpecs,
    /// Video quality measurements.
    pub video_quality_data: VideoQualityData,
    /// Audio quality measurements, present when the output carries audio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_quality_data: Option<AudioQualityData>,
    /// A/V sync measurements. Opaque to the committee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_quality_data: Option<serde_json::Value>,
    /// Verifier signature over the attestation.
    pub signature: String,
    /// Engine-assigned identifier (supplementary proofs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Resolution summary attached by the leader to the final-round payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplementary_info: Option<SupplementaryInfo>,
}

/// Observed output media characteristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSpecs {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Kilobits per second. Optional on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<f64>,
    pub has_audio: bool,
}

impl MediaSpecs {
    /// The `WxH` resolution string used for cross-proof comparison.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Video quality measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoQualityData {
    /// Aggregate score, 0-100.
    pub overall_score: f64,
    /// Per-GOP scores keyed by GOP timestamp. Scores are opaque strings and
    /// compared for exact equality across proofs.
    #[serde(default)]
    pub gop_scores: BTreeMap<String, String>,
}

/// Audio quality measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioQualityData {
    pub overall_score: f64,
}

/// Attached by the leader to the second-round consensus payload, recording
/// how a conflict was adjudicated with the supplementary attestation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementaryInfo {
    pub supplementary_proof_id: String,
    pub supplementary_verifier_id: VerifierId,
    /// "majority" or "statistical".
    pub resolved_by: String,
    /// The winning value, rendered as a string.
    pub resolved_value: String,
    pub reliable_verifiers: Vec<VerifierId>,
    pub unreliable_verifiers: Vec<VerifierId>,
}
