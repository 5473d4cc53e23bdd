//! Identity matching: probe descriptor against the enrolled gallery.

use crate::descriptor::Descriptor;
use crate::types::Identity;

/// Default similarity required for a positive match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.80;

/// Result of matching a probe descriptor against enrolled identities.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Similarity of the best comparable candidate [0, 1], matched or not.
    pub similarity: f32,
    /// Index of the matched identity in the candidate slice.
    pub index: Option<usize>,
    /// Candidates skipped because their descriptor length differs from the probe's.
    pub skipped: usize,
}

impl MatchResult {
    fn no_match(similarity: f32, skipped: usize) -> Self {
        Self {
            matched: false,
            similarity,
            index: None,
            skipped,
        }
    }

    /// The matched identity, looked up in the same slice that was scanned.
    pub fn identity<'a>(&self, candidates: &'a [Identity]) -> Option<&'a Identity> {
        self.index.and_then(|i| candidates.get(i))
    }
}

/// Strategy for comparing a probe descriptor against a gallery of identities.
pub trait Matcher {
    fn find_best_match(&self, probe: &Descriptor, candidates: &[Identity], threshold: f32)
        -> MatchResult;
}

/// Euclidean similarity matcher, best of all candidates.
///
/// Always iterates every candidate. Ties keep the first candidate in slice
/// order. Candidates with a descriptor of a different length are skipped
/// rather than failing the whole scan.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn find_best_match(
        &self,
        probe: &Descriptor,
        candidates: &[Identity],
        threshold: f32,
    ) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;
        let mut skipped = 0usize;

        for (i, identity) in candidates.iter().enumerate() {
            let sim = match probe.similarity(&identity.descriptor) {
                Ok(sim) => sim,
                Err(err) => {
                    tracing::warn!(
                        identity = %identity.id,
                        error = %err,
                        "skipping candidate with incompatible descriptor"
                    );
                    skipped += 1;
                    continue;
                }
            };
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_sim >= threshold => MatchResult {
                matched: true,
                similarity: best_sim,
                index: Some(idx),
                skipped,
            },
            _ => MatchResult::no_match(
                if best_sim == f32::NEG_INFINITY { 0.0 } else { best_sim },
                skipped,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str, values: &[f32]) -> Identity {
        let mut identity = Identity::new(
            format!("user {id}"),
            format!("{id}@example.com"),
            Descriptor::new(values.to_vec()),
        );
        identity.id = id.to_string();
        identity
    }

    #[test]
    fn test_empty_gallery_is_no_match() {
        let probe = Descriptor::new(vec![0.1, 0.2]);
        let result = EuclideanMatcher.find_best_match(&probe, &[], DEFAULT_MATCH_THRESHOLD);
        assert!(!result.matched);
        assert_eq!(result.index, None);
        assert_eq!(result.similarity, 0.0);
        assert_eq!(result.skipped, 0);
    }

    #[test]
    fn test_best_of_all_not_first_acceptable() {
        let probe = Descriptor::new(vec![0.0, 0.0, 0.0]);
        let gallery = vec![
            identity("a", &[0.1, 0.0, 0.0]),  // similarity 0.90
            identity("b", &[0.02, 0.0, 0.0]), // similarity 0.98
            identity("c", &[0.5, 0.0, 0.0]),  // similarity 0.50
        ];

        let result = EuclideanMatcher.find_best_match(&probe, &gallery, 0.8);
        assert!(result.matched);
        assert_eq!(result.identity(&gallery).map(|i| i.id.as_str()), Some("b"));
        assert!((result.similarity - 0.98).abs() < 1e-5);
    }

    #[test]
    fn test_tie_keeps_first_encountered() {
        let probe = Descriptor::new(vec![0.0, 0.0]);
        let gallery = vec![
            identity("first", &[0.1, 0.0]),
            identity("second", &[0.0, 0.1]),
        ];

        let result = EuclideanMatcher.find_best_match(&probe, &gallery, 0.8);
        assert_eq!(result.identity(&gallery).map(|i| i.id.as_str()), Some("first"));
    }

    #[test]
    fn test_below_threshold_never_matches() {
        let probe = Descriptor::new(vec![0.0, 0.0]);
        let gallery = vec![identity("far", &[0.3, 0.0])]; // similarity 0.70

        let result = EuclideanMatcher.find_best_match(&probe, &gallery, 0.8);
        assert!(!result.matched);
        assert_eq!(result.index, None);
        assert!((result.similarity - 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let probe = Descriptor::new(vec![0.0, 0.0]);
        let gallery = vec![identity("edge", &[0.0, 0.0])];

        let result = EuclideanMatcher.find_best_match(&probe, &gallery, 1.0);
        assert!(result.matched);
    }

    #[test]
    fn test_mismatched_candidates_are_skipped() {
        let probe = Descriptor::new(vec![0.0, 0.0, 0.0]);
        let gallery = vec![
            identity("corrupt", &[0.0, 0.0]),
            identity("ok", &[0.05, 0.0, 0.0]),
        ];

        let result = EuclideanMatcher.find_best_match(&probe, &gallery, 0.8);
        assert!(result.matched);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.identity(&gallery).map(|i| i.id.as_str()), Some("ok"));
    }

    #[test]
    fn test_all_candidates_mismatched() {
        let probe = Descriptor::new(vec![0.0, 0.0, 0.0]);
        let gallery = vec![identity("x", &[0.0]), identity("y", &[0.0, 0.0])];

        let result = EuclideanMatcher.find_best_match(&probe, &gallery, 0.0);
        assert!(!result.matched);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.similarity, 0.0);
    }
}
