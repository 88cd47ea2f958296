//! Cosine-similarity top-K ranking over in-memory records.

use thiserror::Error;

use crate::embedding::cosine_similarity;
use crate::models::EmbeddingRecord;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RankError {
    #[error("query vector has {query} dimensions but record '{id}' has {candidate}")]
    DimensionMismatch {
        query: usize,
        candidate: usize,
        id: String,
    },
}

/// A candidate together with its similarity to the query.
#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a> {
    pub record: &'a EmbeddingRecord,
    pub score: f32,
}

/// Return at most `k` candidates, most similar first.
///
/// Equal scores keep the candidates' original order.
pub fn top_k<'a>(
    query: &[f32],
    candidates: &'a [EmbeddingRecord],
    k: usize,
) -> Result<Vec<Ranked<'a>>, RankError> {
    if let Some(bad) = candidates.iter().find(|c| c.vector.len() != query.len()) {
        return Err(RankError::DimensionMismatch {
            query: query.len(),
            candidate: bad.vector.len(),
            id: bad.id.clone(),
        });
    }

    let mut ranked: Vec<Ranked<'a>> = candidates
        .iter()
        .map(|record| Ranked {
            record,
            score: cosine_similarity(query, &record.vector),
        })
        .collect();

    // sort_by is stable; NaN scores from corrupt vectors sort last
    ranked.sort_by(|a, b| sort_key(b.score).total_cmp(&sort_key(a.score)));
    ranked.truncate(k);

    Ok(ranked)
}

fn sort_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordMetadata;

    fn record(id: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: id.to_string(),
            metadata: RecordMetadata {
                title: String::new(),
                section: String::new(),
                filename: String::new(),
                chunk_index: 0,
                text: String::new(),
            },
            vector,
        }
    }

    #[test]
    fn test_descending_and_bounded() {
        let candidates = vec![
            record("a", vec![0.0, 1.0]),
            record("b", vec![1.0, 0.0]),
            record("c", vec![0.7, 0.7]),
        ];
        let hits = top_k(&[1.0, 0.0], &candidates, 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.id, "b");
        assert_eq!(hits[1].record.id, "c");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_length_is_min_of_k_and_candidates() {
        let candidates = vec![record("a", vec![1.0]), record("b", vec![1.0])];
        assert_eq!(top_k(&[1.0], &candidates, 10).unwrap().len(), 2);
        assert_eq!(top_k(&[1.0], &candidates, 0).unwrap().len(), 0);
        assert!(top_k(&[1.0], &[], 3).unwrap().is_empty());
    }

    #[test]
    fn test_ties_keep_input_order() {
        let candidates = vec![
            record("first", vec![1.0, 0.0]),
            record("second", vec![2.0, 0.0]),
            record("third", vec![3.0, 0.0]),
        ];
        let ids: Vec<&str> = top_k(&[1.0, 0.0], &candidates, 3)
            .unwrap()
            .iter()
            .map(|r| r.record.id.as_str())
            .collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_deterministic() {
        let candidates = vec![
            record("a", vec![0.3, 0.9]),
            record("b", vec![0.5, 0.5]),
            record("c", vec![0.9, 0.1]),
        ];
        let q = [0.6, 0.4];
        let first: Vec<(String, f32)> = top_k(&q, &candidates, 3)
            .unwrap()
            .iter()
            .map(|r| (r.record.id.clone(), r.score))
            .collect();
        let second: Vec<(String, f32)> = top_k(&q, &candidates, 3)
            .unwrap()
            .iter()
            .map(|r| (r.record.id.clone(), r.score))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_nan_scores_rank_last() {
        let candidates = vec![
            record("corrupt", vec![f32::NAN, 1.0]),
            record("low", vec![0.0, 1.0]),
            record("high", vec![1.0, 0.0]),
            record("also-corrupt", vec![1.0, f32::NAN]),
        ];
        let ids: Vec<&str> = top_k(&[1.0, 0.0], &candidates, 4)
            .unwrap()
            .iter()
            .map(|r| r.record.id.as_str())
            .collect();
        assert_eq!(ids, vec!["high", "low", "corrupt", "also-corrupt"]);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let candidates = vec![record("a", vec![1.0, 0.0]), record("b", vec![1.0])];
        let err = top_k(&[1.0, 0.0], &candidates, 1).unwrap_err();
        assert_eq!(
            err,
            RankError::DimensionMismatch {
                query: 2,
                candidate: 1,
                id: "b".to_string()
            }
        );
    }
}
