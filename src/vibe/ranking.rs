use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::Result;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::{FeatureExtractor, FeatureSpace, RecommendError};
use crate::client::AudioFetcher;
use crate::models::Candidate;

/// How closeness between a candidate vector and the reference profile is
/// scored. Higher is always more similar, whichever metric is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMetric {
    /// 0.0 at a perfect match, increasingly negative with distance
    #[default]
    NegativeEuclidean,
    /// Angle-only similarity in [-1, 1]; magnitude differences are ignored
    Cosine,
}

impl SimilarityMetric {
    pub fn score<F: FeatureSpace>(&self, reference: &F, candidate: &F) -> f32 {
        match self {
            SimilarityMetric::NegativeEuclidean => {
                negative_euclidean(&reference.values(), &candidate.values())
            }
            SimilarityMetric::Cosine => cosine(&reference.values(), &candidate.values()),
        }
    }
}

impl std::fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimilarityMetric::NegativeEuclidean => write!(f, "negative-euclidean"),
            SimilarityMetric::Cosine => write!(f, "cosine"),
        }
    }
}

/// Negated straight-line distance between two vectors of equal dimension
fn negative_euclidean(a: &[f32], b: &[f32]) -> f32 {
    let squared_sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    -squared_sum.sqrt()
}

/// Cosine of the angle between two vectors. A zero-norm vector carries no
/// direction, so any comparison against one scores 0.0 rather than NaN.
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A candidate that survived extraction, with its vector and score
#[derive(Debug, Clone)]
pub struct RankedTrack<F: FeatureSpace> {
    pub candidate: Candidate,
    pub features: F,
    pub score: f32,
}

/// Scores candidates against a reference profile on a bounded worker pool
/// and returns them best-first
pub struct Ranker {
    extractor: FeatureExtractor,
    fetcher: Arc<dyn AudioFetcher>,
    pool: ThreadPool,
}

impl Ranker {
    /// `concurrency` caps how many previews are fetched and analyzed at once
    pub fn new(fetcher: Arc<dyn AudioFetcher>, concurrency: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new().num_threads(concurrency).build()?;
        Ok(Ranker {
            extractor: FeatureExtractor::new(),
            fetcher,
            pool,
        })
    }

    /// Score every candidate with preview audio against the reference and
    /// return the top `limit`, best first. Candidates without a preview, or
    /// whose audio cannot be fetched or decoded, are skipped with a log line.
    /// Exact score ties keep their catalog order.
    pub fn rank<F: FeatureSpace>(
        &self,
        reference: &F,
        candidates: Vec<Candidate>,
        limit: usize,
        metric: SimilarityMetric,
    ) -> Result<Vec<RankedTrack<F>>, RecommendError> {
        if limit == 0 {
            return Err(RecommendError::InvalidArgument(
                "limit must be at least 1".to_string(),
            ));
        }

        let with_previews: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| {
                if candidate.preview_url.is_none() {
                    log::debug!("skipping '{}': no preview audio", candidate.name);
                    return false;
                }
                true
            })
            .collect();

        log::info!(
            "scoring {} candidates with {} previews ({})",
            with_previews.len(),
            F::NAME,
            metric
        );

        // Indexed collect keeps catalog order, which the stable sort below
        // relies on for tie handling
        let scored: Vec<Option<RankedTrack<F>>> = self.pool.install(|| {
            with_previews
                .into_par_iter()
                .map(|candidate| self.score_candidate(reference, candidate, metric))
                .collect()
        });

        let mut ranked: Vec<RankedTrack<F>> = scored.into_iter().flatten().collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked.truncate(limit);
        Ok(ranked)
    }

    fn score_candidate<F: FeatureSpace>(
        &self,
        reference: &F,
        candidate: Candidate,
        metric: SimilarityMetric,
    ) -> Option<RankedTrack<F>> {
        let url = candidate.preview_url.clone()?;
        match self
            .extractor
            .extract_from_url::<F>(self.fetcher.as_ref(), &url)
        {
            Ok(features) => {
                let score = metric.score(reference, &features);
                Some(RankedTrack {
                    candidate,
                    features,
                    score,
                })
            }
            Err(e) => {
                log::warn!(
                    "skipping '{}' by '{}': {}",
                    candidate.name,
                    candidate.artist,
                    e
                );
                None
            }
        }
    }
}
