use serde::{Deserialize, Serialize};

/// A curated reference recording representing a vibe.
/// Loaded from the seed configuration file at startup and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedTrack {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub vibe: String,
    pub audio_url: String,
}

impl SeedTrack {
    /// Load seed tracks directly from a JSON array file
    pub fn load_all_from_file(path: &str) -> Result<Vec<SeedTrack>, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let seeds: Vec<SeedTrack> = serde_json::from_str(&content)?;
        Ok(seeds)
    }

    /// Check whether this seed belongs to the given vibe (case-insensitive)
    pub fn matches_vibe(&self, vibe: &str) -> bool {
        self.vibe.to_lowercase() == vibe.to_lowercase()
    }
}

/// A catalog track under evaluation, built per request and discarded.
/// A missing `preview_url` excludes the candidate from ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: Option<String>,
    pub preview_url: Option<String>,
    pub link_url: Option<String>,
}

impl Default for Candidate {
    fn default() -> Self {
        Candidate {
            id: String::new(),
            name: "Unknown".to_string(),
            artist: "Unknown".to_string(),
            album: None,
            preview_url: None,
            link_url: None,
        }
    }
}

/// Response structure for the iTunes Search API
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "resultCount")]
    pub result_count: u32,
    pub results: Vec<SearchResult>,
}

/// One raw result entry from the iTunes Search API
#[derive(Debug, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "trackId")]
    pub track_id: Option<i64>,
    #[serde(rename = "trackName")]
    pub track_name: Option<String>,
    #[serde(rename = "artistName")]
    pub artist_name: Option<String>,
    #[serde(rename = "collectionName")]
    pub collection_name: Option<String>,
    #[serde(rename = "previewUrl")]
    pub preview_url: Option<String>,
    #[serde(rename = "trackViewUrl")]
    pub track_view_url: Option<String>,
}

impl SearchResult {
    /// Convert a raw search result into a Candidate.
    /// Results without a track id are unusable and map to None; missing
    /// display fields fall back to "Unknown" instead of excluding the track.
    pub fn into_candidate(self) -> Option<Candidate> {
        let id = self.track_id?.to_string();
        Some(Candidate {
            id,
            name: self.track_name.unwrap_or_else(|| "Unknown".to_string()),
            artist: self.artist_name.unwrap_or_else(|| "Unknown".to_string()),
            album: self.collection_name,
            preview_url: self.preview_url,
            link_url: self.track_view_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_result_without_track_id_is_dropped() {
        let result = SearchResult {
            track_id: None,
            track_name: Some("Ghost Track".to_string()),
            artist_name: Some("Nobody".to_string()),
            collection_name: None,
            preview_url: Some("https://example.com/a.m4a".to_string()),
            track_view_url: None,
        };

        assert!(result.into_candidate().is_none());
    }

    #[test]
    fn test_search_result_missing_names_fall_back_to_unknown() {
        let result = SearchResult {
            track_id: Some(42),
            track_name: None,
            artist_name: None,
            collection_name: None,
            preview_url: None,
            track_view_url: None,
        };

        let candidate = result.into_candidate().unwrap();
        assert_eq!(candidate.id, "42");
        assert_eq!(candidate.name, "Unknown");
        assert_eq!(candidate.artist, "Unknown");
        assert!(candidate.preview_url.is_none()); // preserved, excluded later by ranking
    }

    #[test]
    fn test_seed_vibe_matching_is_case_insensitive() {
        let seed = SeedTrack {
            id: "seed-1".to_string(),
            name: "Deep Focus".to_string(),
            artist: "Study Beats".to_string(),
            vibe: "Productivity".to_string(),
            audio_url: "https://example.com/focus.mp3".to_string(),
        };

        assert!(seed.matches_vibe("productivity"));
        assert!(seed.matches_vibe("PRODUCTIVITY"));
        assert!(!seed.matches_vibe("relax"));
    }

    #[test]
    fn test_search_response_parses_itunes_payload() {
        let payload = r#"{
            "resultCount": 2,
            "results": [
                {
                    "trackId": 123456,
                    "trackName": "Lo-Fi Rain",
                    "artistName": "Chill Collective",
                    "collectionName": "Rainy Days",
                    "previewUrl": "https://audio.example.com/preview/123456.m4a",
                    "trackViewUrl": "https://music.example.com/track/123456"
                },
                {
                    "trackName": "No Id Here",
                    "artistName": "Mystery"
                }
            ]
        }"#;

        let parsed: SearchResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.result_count, 2);
        assert_eq!(parsed.results.len(), 2);

        let candidates: Vec<Candidate> = parsed
            .results
            .into_iter()
            .filter_map(SearchResult::into_candidate)
            .collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "123456");
        assert_eq!(candidates[0].album.as_deref(), Some("Rainy Days"));
    }
}
