use std::sync::Arc;

use serde::Serialize;

use super::{
    FeatureSpace, ProfileBuilder, RankedTrack, Ranker, RecommendError, SimilarityMetric,
    search_term,
};
use crate::client::CatalogSearcher;
use crate::models::SeedTrack;

/// The seed presented to users as "what this vibe sounds like", together
/// with the averaged profile actually used for scoring
#[derive(Debug, Clone, Serialize)]
pub struct DisplayReference<F: FeatureSpace> {
    pub seed: SeedTrack,
    pub profile: F,
}

/// Everything the caller needs to present a recommendation set
#[derive(Debug, Clone)]
pub struct Recommendation<F: FeatureSpace> {
    pub vibe: String,
    pub reference: DisplayReference<F>,
    pub tracks: Vec<RankedTrack<F>>,
}

/// Facade over the whole pipeline: profile building, candidate retrieval,
/// and similarity ranking
pub struct Recommender<F: FeatureSpace> {
    catalog: Arc<dyn CatalogSearcher>,
    profiles: ProfileBuilder<F>,
    ranker: Ranker,
    candidate_pool: usize,
}

impl<F: FeatureSpace> Recommender<F> {
    /// `candidate_pool` is how many candidates to pull from the catalog per
    /// request, before ranking trims them to the caller's limit
    pub fn new(
        catalog: Arc<dyn CatalogSearcher>,
        profiles: ProfileBuilder<F>,
        ranker: Ranker,
        candidate_pool: usize,
    ) -> Self {
        Recommender {
            catalog,
            profiles,
            ranker,
            candidate_pool,
        }
    }

    /// Distinct vibe labels available from the configured seeds
    pub fn vibes(&self) -> Vec<String> {
        self.profiles.vibes()
    }

    /// The averaged reference vector for a vibe
    pub fn reference_profile(&self, vibe: &str) -> Result<F, RecommendError> {
        self.profiles.reference_profile(vibe)
    }

    /// The reference profile plus the seed shown alongside results
    pub fn reference(&self, vibe: &str) -> Result<DisplayReference<F>, RecommendError> {
        let profile = self.profiles.reference_profile(vibe)?;
        let seed = self
            .profiles
            .display_reference(vibe)
            .cloned()
            .ok_or_else(|| RecommendError::NotFound(vibe.to_lowercase()))?;
        Ok(DisplayReference { seed, profile })
    }

    /// Run the full pipeline for one request. Arguments are validated before
    /// any network call; a failed catalog search is request-fatal because
    /// there is nothing left to rank, while individual bad candidates are
    /// dropped inside the ranker.
    pub fn recommend(
        &self,
        vibe: &str,
        limit: usize,
        storefront: &str,
        metric: SimilarityMetric,
    ) -> Result<Recommendation<F>, RecommendError> {
        if limit == 0 {
            return Err(RecommendError::InvalidArgument(
                "limit must be at least 1".to_string(),
            ));
        }
        let vibe_key = vibe.trim().to_lowercase();
        if vibe_key.is_empty() {
            return Err(RecommendError::InvalidArgument(
                "vibe must not be empty".to_string(),
            ));
        }

        let reference = self.reference(&vibe_key)?;

        let term = search_term(&vibe_key);
        log::info!("searching catalog for '{vibe_key}' with term '{term}'");
        let candidates = self
            .catalog
            .search(&term, storefront, self.candidate_pool)
            .map_err(|e| RecommendError::Retrieval(e.to_string()))?;
        log::info!("retrieved {} candidates from the catalog", candidates.len());

        let tracks = self
            .ranker
            .rank(&reference.profile, candidates, limit, metric)?;

        Ok(Recommendation {
            vibe: vibe_key,
            reference,
            tracks,
        })
    }
}
