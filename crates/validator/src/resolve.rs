//! Conflict resolution with a supplementary attestation.

use crate::deep::{ConflictField, DeepValidation};
use std::collections::BTreeMap;
use std::sync::Arc;
use veriqo_types::{QosProof, VerifierId};

/// Outcome of adjudicating a conflict with a supplementary attestation.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A structural conflict settled by strict majority.
    Majority {
        value: String,
        reliable: Vec<VerifierId>,
        unreliable: Vec<VerifierId>,
    },
    /// A score conflict settled by distance from the median.
    Statistical {
        median: f64,
        reliable: Vec<VerifierId>,
        unreliable: Vec<VerifierId>,
    },
    /// No value reached a majority; a human has to decide.
    ManualReview { reason: String },
    /// The inputs did not admit resolution at all.
    Invalid { reason: String },
}

impl Resolution {
    /// Whether the conflict was settled.
    pub fn is_valid(&self) -> bool {
        matches!(self, Resolution::Majority { .. } | Resolution::Statistical { .. })
    }

    /// Strategy tag: "majority", "statistical" or "manual".
    pub fn resolved_by(&self) -> &'static str {
        match self {
            Resolution::Majority { .. } => "majority",
            Resolution::Statistical { .. } => "statistical",
            Resolution::ManualReview { .. } => "manual",
            Resolution::Invalid { .. } => "invalid",
        }
    }

    /// The winning value rendered as a string, when settled.
    pub fn resolved_value(&self) -> Option<String> {
        match self {
            Resolution::Majority { value, .. } => Some(value.clone()),
            Resolution::Statistical { median, .. } => Some(median.to_string()),
            _ => None,
        }
    }
}

/// Adjudicate a previously detected conflict using a supplementary proof.
///
/// Structural conflicts tally the disputed field across originals plus the
/// supplementary and require a strict plurality of at least two votes;
/// exact ties go to manual review. Score conflicts
/// take the median of the disputed numeric field; the verifiers closest to
/// the median are reliable and the farthest one is not.
///
/// Pure function of its inputs.
pub fn resolve_with_supplementary(
    originals: &[Arc<QosProof>],
    supplementary: &QosProof,
    validation: &DeepValidation,
) -> Resolution {
    if originals.len() < 2 {
        return Resolution::Invalid {
            reason: "resolution requires at least two original proofs".to_string(),
        };
    }
    let Some(field) = &validation.field else {
        return Resolution::Invalid {
            reason: "prior validation carries no conflicting field".to_string(),
        };
    };

    match field {
        ConflictField::VideoScore | ConflictField::Bitrate => {
            resolve_statistical(originals, supplementary, field)
        }
        _ => resolve_majority(originals, supplementary, field),
    }
}

/// Extract the disputed field from one proof, rendered as a comparable string.
fn extract_value(proof: &QosProof, field: &ConflictField) -> Option<String> {
    match field {
        ConflictField::Codec => Some(proof.media_specs.codec.clone()),
        ConflictField::Resolution => Some(proof.media_specs.resolution()),
        ConflictField::HasAudio => Some(proof.media_specs.has_audio.to_string()),
        ConflictField::GopScore(gop) => proof.video_quality_data.gop_scores.get(gop).cloned(),
        ConflictField::AudioPresence => Some(proof.audio_quality_data.is_some().to_string()),
        ConflictField::AudioScore => proof
            .audio_quality_data
            .as_ref()
            .map(|a| a.overall_score.to_string()),
        ConflictField::VideoScore => Some(proof.video_quality_data.overall_score.to_string()),
        ConflictField::Bitrate => proof.media_specs.bitrate.map(|b| b.to_string()),
    }
}

/// Extract the disputed numeric field for statistical resolution.
fn extract_numeric(proof: &QosProof, field: &ConflictField) -> Option<f64> {
    match field {
        ConflictField::VideoScore => Some(proof.video_quality_data.overall_score),
        ConflictField::Bitrate => proof.media_specs.bitrate,
        _ => None,
    }
}

fn resolve_majority(
    originals: &[Arc<QosProof>],
    supplementary: &QosProof,
    field: &ConflictField,
) -> Resolution {
    let mut votes: Vec<(VerifierId, Option<String>)> = originals
        .iter()
        .map(|p| (p.verifier_id.clone(), extract_value(p, field)))
        .collect();
    votes.push((
        supplementary.verifier_id.clone(),
        extract_value(supplementary, field),
    ));

    // Ordered tally keeps iteration and reasons deterministic.
    let mut tally: BTreeMap<&str, usize> = BTreeMap::new();
    for (_, value) in &votes {
        if let Some(value) = value {
            *tally.entry(value.as_str()).or_default() += 1;
        }
    }

    // The winner must hold strictly the most votes. With three or more
    // originals the total can be even, and an exact tie settles nothing.
    let mut winner: Option<(String, usize)> = None;
    let mut tied = false;
    for (value, &count) in &tally {
        match winner.as_ref().map(|(_, best)| *best) {
            Some(best) if count > best => {
                winner = Some((value.to_string(), count));
                tied = false;
            }
            Some(best) if count == best => tied = true,
            Some(_) => {}
            None => winner = Some((value.to_string(), count)),
        }
    }

    match winner {
        Some((value, count)) if count >= 2 && !tied => {
            let (reliable, unreliable): (Vec<_>, Vec<_>) = votes
                .into_iter()
                .partition(|(_, v)| v.as_deref() == Some(value.as_str()));
            Resolution::Majority {
                value,
                reliable: reliable.into_iter().map(|(id, _)| id).collect(),
                unreliable: unreliable.into_iter().map(|(id, _)| id).collect(),
            }
        }
        _ => Resolution::ManualReview {
            reason: format!("no value of {field:?} reached a majority"),
        },
    }
}

fn resolve_statistical(
    originals: &[Arc<QosProof>],
    supplementary: &QosProof,
    field: &ConflictField,
) -> Resolution {
    let mut samples: Vec<(VerifierId, f64)> = Vec::with_capacity(originals.len() + 1);
    for proof in originals {
        match extract_numeric(proof, field) {
            Some(value) => samples.push((proof.verifier_id.clone(), value)),
            None => {
                return Resolution::ManualReview {
                    reason: format!("{} carries no {field:?} value", proof.verifier_id),
                }
            }
        }
    }
    match extract_numeric(supplementary, field) {
        Some(value) => samples.push((supplementary.verifier_id.clone(), value)),
        None => {
            return Resolution::ManualReview {
                reason: format!("supplementary proof carries no {field:?} value"),
            }
        }
    }

    let median = median_of(samples.iter().map(|(_, v)| *v));

    // Sort by distance from the median; ties keep submission order so the
    // outcome is deterministic. All but the farthest verifier are reliable.
    let mut by_distance: Vec<(usize, &(VerifierId, f64))> = samples.iter().enumerate().collect();
    by_distance.sort_by(|(ia, (_, a)), (ib, (_, b))| {
        (a - median)
            .abs()
            .partial_cmp(&(b - median).abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(ia.cmp(ib))
    });

    let unreliable = vec![by_distance[by_distance.len() - 1].1 .0.clone()];
    let reliable = by_distance[..by_distance.len() - 1]
        .iter()
        .map(|(_, (id, _))| id.clone())
        .collect();

    Resolution::Statistical {
        median,
        reliable,
        unreliable,
    }
}

fn median_of(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}
