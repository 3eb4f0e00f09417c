//! Pure validation of QoS attestations.
//!
//! Everything in this crate is a deterministic function of its inputs: no
//! I/O, no clocks, no shared state. The pipeline injects the current time
//! where a check needs one, so the same inputs always produce the same
//! verdicts and the functions are safe to call from any thread.
//!
//! Four operations are provided:
//!
//! - [`quick_validate`]: structural/range/time/signature checks on one proof
//! - [`deep_validate`]: cross-attestation agreement checks on a set
//! - [`classify_conflict`]: structural vs score classification
//! - [`resolve_with_supplementary`]: adjudication with a third attestation

mod deep;
mod quick;
mod resolve;

pub use deep::{deep_validate, ConflictField, DeepValidation};
pub use quick::{quick_validate, QuickValidation};
pub use resolve::{resolve_with_supplementary, Resolution};

use veriqo_types::ConflictType;

/// Classify a failed deep validation as a structural or score conflict.
///
/// Codec, resolution, audio-presence, per-GOP and audio-score disagreements
/// are structural; video-score and bitrate deviations are score conflicts.
/// Anything else defaults to structural.
pub fn classify_conflict(validation: &DeepValidation) -> ConflictType {
    if !validation.has_conflict {
        return ConflictType::None;
    }
    match validation.field {
        Some(ConflictField::VideoScore) | Some(ConflictField::Bitrate) => ConflictType::Score,
        Some(ConflictField::Codec)
        | Some(ConflictField::Resolution)
        | Some(ConflictField::HasAudio)
        | Some(ConflictField::GopScore(_))
        | Some(ConflictField::AudioPresence)
        | Some(ConflictField::AudioScore)
        | None => ConflictType::Structural,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veriqo_types::VerifierId;

    fn validation_with(field: Option<ConflictField>) -> DeepValidation {
        DeepValidation {
            valid: false,
            has_conflict: true,
            conflicting_verifiers: vec![VerifierId::from("v1")],
            reason: Some("test".to_string()),
            field,
        }
    }

    #[test]
    fn test_classify_structural_fields() {
        for field in [
            ConflictField::Codec,
            ConflictField::Resolution,
            ConflictField::HasAudio,
            ConflictField::GopScore("0".to_string()),
            ConflictField::AudioPresence,
            ConflictField::AudioScore,
        ] {
            assert_eq!(
                classify_conflict(&validation_with(Some(field))),
                ConflictType::Structural
            );
        }
    }

    #[test]
    fn test_classify_score_fields() {
        assert_eq!(
            classify_conflict(&validation_with(Some(ConflictField::VideoScore))),
            ConflictType::Score
        );
        assert_eq!(
            classify_conflict(&validation_with(Some(ConflictField::Bitrate))),
            ConflictType::Score
        );
    }

    #[test]
    fn test_classify_defaults_to_structural() {
        assert_eq!(
            classify_conflict(&validation_with(None)),
            ConflictType::Structural
        );
    }

    #[test]
    fn test_classify_no_conflict() {
        let validation = DeepValidation {
            valid: true,
            has_conflict: false,
            conflicting_verifiers: vec![],
            reason: None,
            field: None,
        };
        assert_eq!(classify_conflict(&validation), ConflictType::None);
    }
}
