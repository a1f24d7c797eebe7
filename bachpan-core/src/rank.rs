use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::reference::ReferenceSet;
use crate::similarity::cosine_similarity;

/// A reference image and its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(rename = "image")]
    pub identifier: String,
    pub score: f32,
}

/// Score `query` against every entry and return the best `k`.
///
/// Linear scan. Entries that cannot be scored are skipped with a warning.
/// Results are ordered by descending score, ties by ascending identifier.
pub fn top_k(query: &[f32], set: &ReferenceSet, k: usize) -> Vec<MatchResult> {
    let mut scored: Vec<MatchResult> = set
        .entries()
        .iter()
        .filter_map(|entry| match cosine_similarity(query, &entry.embedding) {
            Ok(score) => Some(MatchResult {
                identifier: entry.identifier.clone(),
                score,
            }),
            Err(e) => {
                log::warn!("skipping reference '{}': {e}", entry.identifier);
                None
            }
        })
        .collect();

    scored.sort_by(rank_order);
    scored.truncate(k);
    scored
}

fn rank_order(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.identifier.cmp(&b.identifier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceEntry;

    fn set_of(entries: &[(&str, Vec<f32>)]) -> ReferenceSet {
        let (set, _) = ReferenceSet::from_entries(entries.iter().map(|(id, v)| ReferenceEntry {
            identifier: id.to_string(),
            embedding: v.clone(),
        }))
        .unwrap();
        set
    }

    fn sample_set() -> ReferenceSet {
        set_of(&[
            ("north", vec![0.0, 1.0]),
            ("east", vec![1.0, 0.0]),
            ("northeast", vec![1.0, 1.0]),
            ("south", vec![0.0, -1.0]),
            ("west", vec![-1.0, 0.0]),
        ])
    }

    #[test]
    fn k_at_least_size_returns_every_entry_sorted() {
        let set = sample_set();
        for k in [5, 6, 100] {
            let results = top_k(&[1.0, 0.2], &set, k);
            assert_eq!(results.len(), 5);
            assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
            let mut ids: Vec<_> = results.iter().map(|r| r.identifier.clone()).collect();
            ids.sort();
            assert_eq!(ids, vec!["east", "north", "northeast", "south", "west"]);
        }
    }

    #[test]
    fn k_below_size_keeps_only_the_best() {
        let set = sample_set();
        let query = [1.0, 0.2];
        let all = top_k(&query, &set, usize::MAX);
        let best = top_k(&query, &set, 2);
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].identifier, "east");
        assert_eq!(best[1].identifier, "northeast");
        let lowest_kept = best.last().unwrap().score;
        assert!(all[2..].iter().all(|r| r.score <= lowest_kept));
    }

    #[test]
    fn identical_vectors_tie_break_by_identifier() {
        let v = vec![0.2, 0.4, 0.6];
        let set = set_of(&[("dog", v.clone()), ("cat", v.clone())]);
        let results = top_k(&v, &set, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].identifier, "cat");
        assert_eq!(results[1].identifier, "dog");
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!((results[1].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let set = set_of(&[
            ("b", vec![1.0, 0.0]),
            ("a", vec![1.0, 0.0]),
            ("c", vec![2.0, 0.0]),
            ("d", vec![0.0, 1.0]),
        ]);
        let first = top_k(&[1.0, 0.0], &set, 3);
        let second = top_k(&[1.0, 0.0], &set, 3);
        assert_eq!(first, second);
        let ids: Vec<_> = first.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_set_returns_empty_list() {
        assert!(top_k(&[1.0, 2.0], &ReferenceSet::empty(), 5).is_empty());
    }

    #[test]
    fn unscorable_entries_are_skipped() {
        let set = sample_set();
        // Wrong dimension: every comparison fails, nothing is fabricated.
        assert!(top_k(&[1.0, 0.0, 0.0], &set, 5).is_empty());
        // Zero query: degenerate against every entry.
        assert!(top_k(&[0.0, 0.0], &set, 5).is_empty());
    }

    #[test]
    fn zero_k_returns_nothing() {
        assert!(top_k(&[1.0, 0.0], &sample_set(), 0).is_empty());
    }

    #[test]
    fn serializes_identifier_as_image() {
        let json = serde_json::to_value(MatchResult {
            identifier: "./dataset/sample_dataset_face.jpg".into(),
            score: 0.5,
        })
        .unwrap();
        assert_eq!(json["image"], "./dataset/sample_dataset_face.jpg");
        assert_eq!(json["score"], 0.5);
    }
}
