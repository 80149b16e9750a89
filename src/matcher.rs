//! Probe-to-identity matching.
//!
//! A probe embedding is compared against every known identity by cosine
//! distance; the global minimum decides the match. A fixed threshold
//! separates recognized from unrecognized, and the reported confidence is a
//! monotone transform of the distance with a deliberate step at the
//! threshold: matches score in (0.5, 1.0], non-matches in [0, 0.5).

use crate::identity::KnownIdentity;

/// Default maximum cosine distance for a recognized identity.
/// Empirically chosen for the original embedding model; configurable via
/// `recognition.match_threshold`.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.35;

/// Guards the cosine denominator against zero-norm embeddings.
const NORM_EPSILON: f32 = 1e-10;

/// Outcome of matching one probe embedding against the known set.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Best-matching identity, present only when the distance is within
    /// the threshold.
    pub matched: Option<String>,
    /// Cosine distance to the closest known identity; `None` when there
    /// are no known identities at all.
    pub distance: Option<f32>,
    /// Derived score in [0, 1]; at least 0.5 for matches, below 0.5
    /// otherwise.
    pub confidence: f32,
    /// Set when the known set was empty, so "not recognized" cannot be
    /// confused with "nobody enrolled".
    pub no_known_identities: bool,
}

impl MatchOutcome {
    pub fn is_known(&self) -> bool {
        self.matched.is_some()
    }
}

/// Cosine distance: 0 = identical direction, 2 = opposite.
/// Zero-norm or length-mismatched vectors land at the far end instead of
/// producing NaN.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    (1.0 - dot / (norm_a * norm_b + NORM_EPSILON)).max(0.0)
}

/// Find the closest known identity for a probe embedding.
///
/// The scan is linear over the whole set in its stored order; ties on the
/// minimum distance resolve to the first entry encountered, which keeps
/// repeated calls deterministic for a given index.
pub fn best_match(probe: &[f32], known: &[KnownIdentity], threshold: f32) -> MatchOutcome {
    if known.is_empty() {
        return MatchOutcome {
            matched: None,
            distance: None,
            confidence: 0.0,
            no_known_identities: true,
        };
    }

    let mut best_name = &known[0].name;
    let mut best_distance = cosine_distance(probe, &known[0].embedding);

    for identity in &known[1..] {
        let distance = cosine_distance(probe, &identity.embedding);
        if distance < best_distance {
            best_distance = distance;
            best_name = &identity.name;
        }
    }

    let recognized = best_distance <= threshold;
    let confidence = if recognized {
        (1.0 - 0.5 * best_distance / threshold).clamp(0.0, 1.0)
    } else {
        (0.5 - (best_distance - threshold)).clamp(0.0, 0.5)
    };

    MatchOutcome {
        matched: recognized.then(|| best_name.clone()),
        distance: Some(best_distance),
        confidence,
        no_known_identities: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(name: &str, embedding: Vec<f32>) -> KnownIdentity {
        KnownIdentity {
            name: name.to_string(),
            image: format!("{name}.jpg"),
            embedding,
        }
    }

    #[test]
    fn identical_probe_matches_with_full_confidence() {
        let set = vec![known("Alice", vec![0.5, 0.5, 0.0])];
        let outcome = best_match(&[0.5, 0.5, 0.0], &set, DEFAULT_MATCH_THRESHOLD);

        assert_eq!(outcome.matched.as_deref(), Some("Alice"));
        assert!(outcome.distance.unwrap().abs() < 1e-6);
        assert!((outcome.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_probe_is_not_recognized() {
        let set = vec![known("Alice", vec![1.0, 0.0])];
        let outcome = best_match(&[0.0, 1.0], &set, DEFAULT_MATCH_THRESHOLD);

        assert_eq!(outcome.matched, None);
        assert!((outcome.distance.unwrap() - 1.0).abs() < 1e-6);
        assert!(outcome.confidence < 0.5);
        // Far beyond the threshold the score bottoms out at zero.
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn distance_exactly_at_threshold_is_recognized_at_half_confidence() {
        let probe = vec![1.0, 0.0];
        let identity = known("Alice", vec![3.0, 4.0]);
        // Derive the threshold from the same computation so the boundary
        // comparison is exact.
        let threshold = cosine_distance(&probe, &identity.embedding);

        let outcome = best_match(&probe, &[identity], threshold);

        assert_eq!(outcome.matched.as_deref(), Some("Alice"));
        assert_eq!(outcome.confidence, 0.5);
    }

    #[test]
    fn distance_just_past_threshold_is_not_recognized() {
        let probe = vec![1.0, 0.0];
        let identity = known("Alice", vec![3.0, 4.0]);
        let distance = cosine_distance(&probe, &identity.embedding);
        let threshold = distance * 0.999;

        let outcome = best_match(&probe, &[identity], threshold);

        assert_eq!(outcome.matched, None);
        assert!(outcome.confidence < 0.5);
    }

    #[test]
    fn ties_resolve_to_the_first_entry_every_time() {
        let set = vec![
            known("First", vec![1.0, 0.0]),
            known("Second", vec![1.0, 0.0]),
        ];

        for _ in 0..10 {
            let outcome = best_match(&[1.0, 0.0], &set, DEFAULT_MATCH_THRESHOLD);
            assert_eq!(outcome.matched.as_deref(), Some("First"));
        }
    }

    #[test]
    fn closer_identity_wins_regardless_of_order() {
        let set = vec![
            known("Far", vec![0.0, 1.0]),
            known("Near", vec![1.0, 0.1]),
        ];
        let outcome = best_match(&[1.0, 0.0], &set, DEFAULT_MATCH_THRESHOLD);

        assert_eq!(outcome.matched.as_deref(), Some("Near"));
    }

    #[test]
    fn empty_known_set_sets_the_sentinel() {
        let outcome = best_match(&[1.0, 0.0], &[], DEFAULT_MATCH_THRESHOLD);

        assert_eq!(outcome.matched, None);
        assert_eq!(outcome.distance, None);
        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.no_known_identities);
    }

    #[test]
    fn zero_norm_embeddings_do_not_divide_by_zero() {
        let set = vec![known("Null", vec![0.0, 0.0])];
        let outcome = best_match(&[1.0, 0.0], &set, DEFAULT_MATCH_THRESHOLD);

        assert!(outcome.distance.unwrap().is_finite());
        assert_eq!(outcome.matched, None);

        let outcome = best_match(&[0.0, 0.0], &set, DEFAULT_MATCH_THRESHOLD);
        assert!(outcome.confidence.is_finite());
    }

    #[test]
    fn mismatched_dimensions_are_treated_as_maximally_distant() {
        assert_eq!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 2.0);
    }

    #[test]
    fn confidence_decreases_with_distance_within_matches() {
        let threshold = 0.5;
        let near = best_match(
            &[1.0, 0.0],
            &[known("A", vec![1.0, 0.1])],
            threshold,
        );
        let far = best_match(
            &[1.0, 0.0],
            &[known("A", vec![1.0, 0.6])],
            threshold,
        );

        assert!(near.is_known() && far.is_known());
        assert!(near.confidence > far.confidence);
    }
}
