//! Single-proof quick validation.

use veriqo_types::{ProofVerifier, QosProof};

/// Maximum accepted attestation age: 7 days in milliseconds.
const MAX_PROOF_AGE_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Verdict of a quick validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickValidation {
    pub valid: bool,
    pub details: String,
}

impl QuickValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            details: "ok".to_string(),
        }
    }

    fn reject(details: impl Into<String>) -> Self {
        Self {
            valid: false,
            details: details.into(),
        }
    }
}

/// Validate one proof in isolation. Checks run in a fixed order and the
/// first failure wins:
///
/// 1. structure (non-empty identifiers, non-zero timestamp)
/// 2. ranges (overall score 0-100, positive bitrate when present)
/// 3. time (not in the future, at most 7 days old; exactly 7 days passes)
/// 4. signature (non-empty, then the pluggable verifier)
/// 5. non-empty GOP scores
pub fn quick_validate(proof: &QosProof, now_ms: u64, verifier: &dyn ProofVerifier) -> QuickValidation {
    // Structure. Absent mediaSpecs / videoQualityData cannot reach here:
    // deserialization already rejects them.
    if proof.task_id.as_str().is_empty() {
        return QuickValidation::reject("missing taskId");
    }
    if proof.verifier_id.as_str().is_empty() {
        return QuickValidation::reject("missing verifierId");
    }
    if proof.timestamp == 0 {
        return QuickValidation::reject("missing timestamp");
    }

    // Ranges.
    let score = proof.video_quality_data.overall_score;
    if !(0.0..=100.0).contains(&score) || score.is_nan() {
        return QuickValidation::reject(format!("overall score {score} outside 0-100"));
    }
    if let Some(bitrate) = proof.media_specs.bitrate {
        if bitrate <= 0.0 {
            return QuickValidation::reject(format!("non-positive bitrate {bitrate}"));
        }
    }

    // Time.
    if proof.timestamp > now_ms {
        return QuickValidation::reject("timestamp is in the future");
    }
    if now_ms - proof.timestamp > MAX_PROOF_AGE_MS {
        return QuickValidation::reject("proof older than 7 days");
    }

    // Signature.
    if proof.signature.is_empty() {
        return QuickValidation::reject("empty signature");
    }
    if !verifier.verify(proof) {
        return QuickValidation::reject("signature verification failed");
    }

    if proof.video_quality_data.gop_scores.is_empty() {
        return QuickValidation::reject("empty gopScores");
    }

    QuickValidation::ok()
}
