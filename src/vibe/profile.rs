use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{ExtractionError, FeatureExtractor, FeatureSpace, RecommendError};
use crate::client::AudioFetcher;
use crate::models::SeedTrack;

/// Process-lifetime cache for per-seed vectors and finished profiles.
/// Injected rather than global so tests can reset state between cases.
/// Writes are idempotent: recomputing the same value twice is harmless
/// and the last write wins.
pub struct FeatureCache<F: FeatureSpace> {
    seed_features: Mutex<HashMap<String, F>>,
    profiles: Mutex<HashMap<String, F>>,
}

impl<F: FeatureSpace> FeatureCache<F> {
    pub fn new() -> Self {
        FeatureCache {
            seed_features: Mutex::new(HashMap::new()),
            profiles: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_seed(&self, seed_id: &str) -> Option<F> {
        self.seed_features.lock().unwrap().get(seed_id).cloned()
    }

    pub fn store_seed(&self, seed_id: &str, features: F) {
        self.seed_features
            .lock()
            .unwrap()
            .insert(seed_id.to_string(), features);
    }

    pub fn cached_profile(&self, vibe_key: &str) -> Option<F> {
        self.profiles.lock().unwrap().get(vibe_key).cloned()
    }

    pub fn store_profile(&self, vibe_key: &str, profile: F) {
        self.profiles
            .lock()
            .unwrap()
            .insert(vibe_key.to_string(), profile);
    }

    /// Drop everything; the next lookups recompute from scratch
    pub fn clear(&self) {
        self.seed_features.lock().unwrap().clear();
        self.profiles.lock().unwrap().clear();
    }
}

impl<F: FeatureSpace> Default for FeatureCache<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds and caches per-vibe reference profiles from seed tracks
pub struct ProfileBuilder<F: FeatureSpace> {
    seeds: Vec<SeedTrack>,
    extractor: FeatureExtractor,
    fetcher: Arc<dyn AudioFetcher>,
    cache: Arc<FeatureCache<F>>,
}

impl<F: FeatureSpace> ProfileBuilder<F> {
    pub fn new(
        seeds: Vec<SeedTrack>,
        fetcher: Arc<dyn AudioFetcher>,
        cache: Arc<FeatureCache<F>>,
    ) -> Self {
        ProfileBuilder {
            seeds,
            extractor: FeatureExtractor::new(),
            fetcher,
            cache,
        }
    }

    /// All seeds for a vibe, in configuration order
    pub fn matching_seeds(&self, vibe: &str) -> Vec<&SeedTrack> {
        self.seeds
            .iter()
            .filter(|seed| seed.matches_vibe(vibe))
            .collect()
    }

    /// The seed shown to users as "the reference" for a vibe: always the
    /// first matching entry in configuration order, independent of whether
    /// its audio extracts cleanly
    pub fn display_reference(&self, vibe: &str) -> Option<&SeedTrack> {
        self.seeds.iter().find(|seed| seed.matches_vibe(vibe))
    }

    /// Distinct vibe labels, lower-cased, in configuration order
    pub fn vibes(&self) -> Vec<String> {
        let mut labels = Vec::new();
        for seed in &self.seeds {
            let label = seed.vibe.to_lowercase();
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }

    /// Build (or fetch from cache) the reference profile for a vibe: the
    /// dimension-wise arithmetic mean over all extractable seed vectors.
    /// NotFound when no seeds match the label or none of them yield audio.
    pub fn reference_profile(&self, vibe: &str) -> Result<F, RecommendError> {
        let vibe_key = vibe.to_lowercase();
        if let Some(profile) = self.cache.cached_profile(&vibe_key) {
            return Ok(profile);
        }

        let matching = self.matching_seeds(&vibe_key);
        if matching.is_empty() {
            return Err(RecommendError::NotFound(vibe_key));
        }

        let mut vectors = Vec::with_capacity(matching.len());
        for seed in &matching {
            match self.seed_features(seed) {
                Ok(features) => vectors.push(features),
                // A bad seed never fails the profile; the mean uses the rest
                Err(e) => log::warn!("seed '{}' ({}) skipped: {}", seed.name, seed.id, e),
            }
        }

        match F::mean_of(&vectors) {
            Some(profile) => {
                log::info!(
                    "built {} reference profile for '{}' from {}/{} seeds",
                    F::NAME,
                    vibe_key,
                    vectors.len(),
                    matching.len()
                );
                self.cache.store_profile(&vibe_key, profile.clone());
                Ok(profile)
            }
            None => Err(RecommendError::NotFound(vibe_key)),
        }
    }

    /// Per-seed vector, cached by seed id so repeated requests never
    /// re-download or re-decode the same seed audio
    fn seed_features(&self, seed: &SeedTrack) -> Result<F, ExtractionError> {
        if let Some(features) = self.cache.cached_seed(&seed.id) {
            return Ok(features);
        }
        let features = self
            .extractor
            .extract_from_url::<F>(self.fetcher.as_ref(), &seed.audio_url)?;
        self.cache.store_seed(&seed.id, features.clone());
        Ok(features)
    }
}
