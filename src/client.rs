use crate::config::Config;
use crate::models::{Candidate, SearchResponse, SearchResult};
use anyhow::Result;
use std::io::Read;
use std::time::Duration;
use ureq::Agent;
use urlencoding::encode;

#[cfg(test)]
use mockall::automock;

/// Time allowed for one catalog search round trip
const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
/// Time allowed for downloading one audio clip
const AUDIO_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of candidate tracks for a search term.
/// Any provider returning track metadata plus a previewable audio URL fits here.
#[cfg_attr(test, automock)]
pub trait CatalogSearcher: Send + Sync {
    fn search(&self, term: &str, storefront: &str, limit: usize) -> Result<Vec<Candidate>>;
}

/// Downloader for seed and candidate preview audio
#[cfg_attr(test, automock)]
pub trait AudioFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// A simple iTunes Search API client; the search endpoint needs no authentication
pub struct ItunesClient {
    agent: Agent,
    base_url: String,
}

impl ItunesClient {
    /// Create a new client with configuration from environment
    pub fn new(config: &Config) -> Self {
        let agent = Agent::new();

        ItunesClient {
            agent,
            base_url: config.catalog_base_url.clone(),
        }
    }
}

impl CatalogSearcher for ItunesClient {
    /// Search the catalog for songs matching a term within a storefront
    fn search(&self, term: &str, storefront: &str, limit: usize) -> Result<Vec<Candidate>> {
        // Build URL with query parameters
        let url = format!(
            "{}/search?term={}&media=music&entity=song&limit={}&country={}",
            self.base_url.trim_end_matches('/'),
            encode(term),
            limit,
            encode(storefront)
        );

        let response = self
            .agent
            .get(&url)
            .timeout(SEARCH_TIMEOUT)
            .call()
            .map_err(|e| anyhow::anyhow!("Catalog search request failed: {}", e))?;

        let response_text = response.into_string()?;

        // Parse JSON response
        let parsed: SearchResponse = serde_json::from_str(&response_text)
            .map_err(|e| anyhow::anyhow!("Failed to parse search response: {}", e))?;

        log::debug!(
            "catalog returned {} raw results for '{}'",
            parsed.result_count,
            term
        );

        // Results without a track id are unusable and silently dropped
        Ok(parsed
            .results
            .into_iter()
            .filter_map(SearchResult::into_candidate)
            .collect())
    }
}

impl AudioFetcher for ItunesClient {
    /// Download one audio clip in full
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(url)
            .timeout(AUDIO_TIMEOUT)
            .call()
            .map_err(|e| anyhow::anyhow!("Audio download failed: {}", e))?;

        let mut bytes = Vec::new();
        response.into_reader().read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}
