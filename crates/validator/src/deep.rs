//! Cross-attestation deep validation.

use std::sync::Arc;
use veriqo_types::{QosProof, VerifierId};

/// Relative bitrate deviation tolerated across attestations. A deviation of
/// exactly 5% passes.
const BITRATE_TOLERANCE: f64 = 0.05;

/// Absolute video-score deviation tolerated across attestations. A deviation
/// of exactly 3 passes.
const VIDEO_SCORE_TOLERANCE: f64 = 3.0;

/// Epsilon absorbing floating-point noise on the tolerance boundaries.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// The field a set of attestations disagreed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictField {
    Codec,
    Resolution,
    Bitrate,
    HasAudio,
    VideoScore,
    /// Disagreement on the score of one GOP, identified by its timestamp.
    GopScore(String),
    AudioPresence,
    AudioScore,
}

/// Outcome of a deep validation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepValidation {
    pub valid: bool,
    pub has_conflict: bool,
    /// Verifiers party to the disagreement (all submitters, when conflicted).
    pub conflicting_verifiers: Vec<VerifierId>,
    pub reason: Option<String>,
    /// Structured tag of the disagreeing field, for classification and
    /// resolution.
    pub field: Option<ConflictField>,
}

impl DeepValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            has_conflict: false,
            conflicting_verifiers: Vec::new(),
            reason: None,
            field: None,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            has_conflict: false,
            conflicting_verifiers: Vec::new(),
            reason: Some(reason.into()),
            field: None,
        }
    }

    fn conflict(
        proofs: &[Arc<QosProof>],
        field: ConflictField,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            valid: false,
            has_conflict: true,
            conflicting_verifiers: proofs.iter().map(|p| p.verifier_id.clone()).collect(),
            reason: Some(reason.into()),
            field: Some(field),
        }
    }
}

/// Validate agreement across two or more attestations for the same task.
///
/// Checks run in a fixed order; the first disagreement wins and is reported
/// with its conflicting field. Fewer than two proofs is invalid but not a
/// conflict.
pub fn deep_validate(proofs: &[Arc<QosProof>]) -> DeepValidation {
    if proofs.len() < 2 {
        return DeepValidation::invalid("insufficient proofs for deep validation");
    }

    let first = &proofs[0];

    // Codec.
    if let Some(other) = proofs
        .iter()
        .find(|p| p.media_specs.codec != first.media_specs.codec)
    {
        return DeepValidation::conflict(
            proofs,
            ConflictField::Codec,
            format!(
                "codec mismatch: {} vs {}",
                first.media_specs.codec, other.media_specs.codec
            ),
        );
    }

    // Resolution.
    if let Some(other) = proofs.iter().find(|p| {
        p.media_specs.width != first.media_specs.width
            || p.media_specs.height != first.media_specs.height
    }) {
        return DeepValidation::conflict(
            proofs,
            ConflictField::Resolution,
            format!(
                "resolution mismatch: {} vs {}",
                first.media_specs.resolution(),
                other.media_specs.resolution()
            ),
        );
    }

    // Bitrate: every present value within 5% of the mean of present values.
    let bitrates: Vec<(&VerifierId, f64)> = proofs
        .iter()
        .filter_map(|p| p.media_specs.bitrate.map(|b| (&p.verifier_id, b)))
        .collect();
    if !bitrates.is_empty() {
        let mean = bitrates.iter().map(|(_, b)| b).sum::<f64>() / bitrates.len() as f64;
        if let Some((verifier, bitrate)) = bitrates
            .iter()
            .find(|(_, b)| (b - mean).abs() > mean * (BITRATE_TOLERANCE + BOUNDARY_EPSILON))
        {
            return DeepValidation::conflict(
                proofs,
                ConflictField::Bitrate,
                format!("bitrate deviation beyond 5%: {verifier} reported {bitrate}, mean {mean:.1}"),
            );
        }
    }

    // hasAudio agreement.
    if proofs
        .iter()
        .any(|p| p.media_specs.has_audio != first.media_specs.has_audio)
    {
        return DeepValidation::conflict(
            proofs,
            ConflictField::HasAudio,
            "hasAudio disagreement across verifiers",
        );
    }

    // Video overall score within ±3 of the mean.
    let mean_score = proofs
        .iter()
        .map(|p| p.video_quality_data.overall_score)
        .sum::<f64>()
        / proofs.len() as f64;
    if let Some(other) = proofs.iter().find(|p| {
        (p.video_quality_data.overall_score - mean_score).abs()
            > VIDEO_SCORE_TOLERANCE + BOUNDARY_EPSILON
    }) {
        return DeepValidation::conflict(
            proofs,
            ConflictField::VideoScore,
            format!(
                "video score deviation beyond 3: {} reported {}, mean {mean_score:.2}",
                other.verifier_id, other.video_quality_data.overall_score
            ),
        );
    }

    // GOP scores present in all proofs must match exactly.
    for (gop, score) in &first.video_quality_data.gop_scores {
        let everywhere = proofs
            .iter()
            .all(|p| p.video_quality_data.gop_scores.contains_key(gop));
        if !everywhere {
            continue;
        }
        if let Some(other) = proofs
            .iter()
            .find(|p| p.video_quality_data.gop_scores.get(gop) != Some(score))
        {
            let other_score = other
                .video_quality_data
                .gop_scores
                .get(gop)
                .map(String::as_str)
                .unwrap_or("-");
            return DeepValidation::conflict(
                proofs,
                ConflictField::GopScore(gop.clone()),
                format!("GOP {gop} score mismatch: {score} vs {other_score}"),
            );
        }
    }

    // Audio presence: with audio, every proof must carry audio data.
    if first.media_specs.has_audio {
        if proofs.iter().any(|p| p.audio_quality_data.is_none()) {
            return DeepValidation::conflict(
                proofs,
                ConflictField::AudioPresence,
                "audio quality data missing from some verifiers",
            );
        }

        // Audio overall score must match exactly.
        let first_audio = first
            .audio_quality_data
            .as_ref()
            .map(|a| a.overall_score);
        if let Some(other) = proofs.iter().find(|p| {
            p.audio_quality_data.as_ref().map(|a| a.overall_score) != first_audio
        }) {
            return DeepValidation::conflict(
                proofs,
                ConflictField::AudioScore,
                format!(
                    "audio score mismatch: {:?} vs {:?}",
                    first_audio,
                    other.audio_quality_data.as_ref().map(|a| a.overall_score)
                ),
            );
        }
    }

    DeepValidation::ok()
}
