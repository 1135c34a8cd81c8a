use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{self, AudioSummary};
use crate::client::AudioFetcher;

/// Reference ceiling for the brightness-as-positivity proxy
const VALENCE_CENTROID_CEILING_HZ: f32 = 8000.0;
/// Tempo band mapped onto [0,1] for the danceability term
const DANCE_TEMPO_FLOOR_BPM: f32 = 60.0;
const DANCE_TEMPO_RANGE_BPM: f32 = 120.0;
/// Mean relative flux treated as maximal beat strength
const ONSET_STRENGTH_FULL_SCALE: f32 = 0.5;
/// Extraction refuses clips with less decoded audio than this
const MIN_DURATION_SECS: f32 = 1.0;

/// One family of feature vectors. The profile builder, ranking engine and
/// recommender are generic over this trait, so a reference vector can only
/// ever be scored against candidate vectors of the same shape.
pub trait FeatureSpace: Clone + Send + Sync + 'static {
    /// Shape name for logs
    const NAME: &'static str;
    /// Ordered dimension labels
    const DIMENSIONS: &'static [&'static str];

    fn from_summary(summary: &AudioSummary) -> Self;

    /// Dimension values in `DIMENSIONS` order
    fn values(&self) -> Vec<f32>;

    /// Rebuild a vector from values in `DIMENSIONS` order
    fn from_values(values: &[f32]) -> Option<Self>;

    /// Dimension-wise arithmetic mean; None for an empty set
    fn mean_of(vectors: &[Self]) -> Option<Self> {
        if vectors.is_empty() {
            return None;
        }
        let mut sums = vec![0.0f32; Self::DIMENSIONS.len()];
        for vector in vectors {
            for (sum, value) in sums.iter_mut().zip(vector.values()) {
                *sum += value;
            }
        }
        for sum in sums.iter_mut() {
            *sum /= vectors.len() as f32;
        }
        Self::from_values(&sums)
    }
}

/// Perceptual six-dimension shape. Everything except tempo is mapped
/// into [0,1]; tempo stays in BPM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SemanticFeatures {
    pub tempo: f32,
    pub energy: f32,
    pub valence: f32,
    pub acousticness: f32,
    pub danceability: f32,
    pub instrumentalness: f32,
}

impl FeatureSpace for SemanticFeatures {
    const NAME: &'static str = "semantic";
    const DIMENSIONS: &'static [&'static str] = &[
        "tempo",
        "energy",
        "valence",
        "acousticness",
        "danceability",
        "instrumentalness",
    ];

    fn from_summary(summary: &AudioSummary) -> Self {
        // Log compression spreads the useful range of silence-heavy clips
        let energy = (1.0 + 9.0 * summary.mean_rms).log10().clamp(0.0, 1.0);
        // Brighter timbre stands in for higher perceived positivity
        let valence =
            (summary.mean_spectral_centroid_hz / VALENCE_CENTROID_CEILING_HZ).clamp(0.0, 1.0);
        // More high-frequency energy reads as less acoustic
        let nyquist = summary.sample_rate as f32 / 2.0;
        let acousticness = if nyquist > 0.0 {
            (1.0 - summary.mean_spectral_rolloff_hz / nyquist).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let tempo_term =
            ((summary.tempo_bpm - DANCE_TEMPO_FLOOR_BPM) / DANCE_TEMPO_RANGE_BPM).clamp(0.0, 1.0);
        let strength_term =
            (summary.mean_onset_strength / ONSET_STRENGTH_FULL_SCALE).clamp(0.0, 1.0);

        SemanticFeatures {
            tempo: summary.tempo_bpm,
            energy,
            valence,
            acousticness,
            danceability: 0.6 * tempo_term + 0.4 * strength_term,
            // No reliable vocal signal is computed; kept for shape compatibility
            instrumentalness: 0.0,
        }
    }

    fn values(&self) -> Vec<f32> {
        vec![
            self.tempo,
            self.energy,
            self.valence,
            self.acousticness,
            self.danceability,
            self.instrumentalness,
        ]
    }

    fn from_values(values: &[f32]) -> Option<Self> {
        match values {
            [tempo, energy, valence, acousticness, danceability, instrumentalness] => {
                Some(SemanticFeatures {
                    tempo: *tempo,
                    energy: *energy,
                    valence: *valence,
                    acousticness: *acousticness,
                    danceability: *danceability,
                    instrumentalness: *instrumentalness,
                })
            }
            _ => None,
        }
    }
}

/// Raw five-dimension shape: measurements exactly as observed, no
/// normalization. Used by deployments that want unscaled distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralFeatures {
    pub tempo: f32,
    pub energy: f32,
    pub zero_crossing_rate: f32,
    pub spectral_centroid: f32,
    pub spectral_bandwidth: f32,
}

impl FeatureSpace for SpectralFeatures {
    const NAME: &'static str = "raw-spectral";
    const DIMENSIONS: &'static [&'static str] = &[
        "tempo",
        "energy",
        "zero_crossing_rate",
        "spectral_centroid",
        "spectral_bandwidth",
    ];

    fn from_summary(summary: &AudioSummary) -> Self {
        SpectralFeatures {
            tempo: summary.tempo_bpm,
            energy: summary.mean_rms,
            zero_crossing_rate: summary.mean_zero_crossing_rate,
            spectral_centroid: summary.mean_spectral_centroid_hz,
            spectral_bandwidth: summary.mean_spectral_bandwidth_hz,
        }
    }

    fn values(&self) -> Vec<f32> {
        vec![
            self.tempo,
            self.energy,
            self.zero_crossing_rate,
            self.spectral_centroid,
            self.spectral_bandwidth,
        ]
    }

    fn from_values(values: &[f32]) -> Option<Self> {
        match values {
            [tempo, energy, zero_crossing_rate, spectral_centroid, spectral_bandwidth] => {
                Some(SpectralFeatures {
                    tempo: *tempo,
                    energy: *energy,
                    zero_crossing_rate: *zero_crossing_rate,
                    spectral_centroid: *spectral_centroid,
                    spectral_bandwidth: *spectral_bandwidth,
                })
            }
            _ => None,
        }
    }
}

/// Why one track's audio produced no feature vector. Always recoverable:
/// the caller drops the track and moves on.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("audio fetch failed: {0}")]
    Fetch(String),
    #[error(transparent)]
    Decode(#[from] audio::DecodeError),
    #[error("decoded audio too short: {seconds:.2}s")]
    TooShort { seconds: f32 },
    #[error("non-finite value for dimension '{0}'")]
    NonFinite(&'static str),
}

/// Turns raw encoded audio into feature vectors
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        FeatureExtractor
    }

    /// Extract a feature vector from encoded audio bytes.
    /// All-or-nothing: a single non-finite dimension fails the whole vector.
    pub fn extract<F: FeatureSpace>(
        &self,
        bytes: &[u8],
        extension_hint: Option<&str>,
    ) -> Result<F, ExtractionError> {
        let decoded = audio::decode_bytes(bytes, extension_hint)?;
        if decoded.samples.len() < (MIN_DURATION_SECS * decoded.sample_rate as f32) as usize {
            return Err(ExtractionError::TooShort {
                seconds: decoded.duration_seconds(),
            });
        }

        let summary = audio::summarize(&decoded.samples, decoded.sample_rate);
        let features = F::from_summary(&summary);

        if let Some(dimension) = first_non_finite(&features) {
            return Err(ExtractionError::NonFinite(dimension));
        }
        log::debug!(
            "extracted {} features from {:.1}s of audio",
            F::NAME,
            decoded.duration_seconds()
        );
        Ok(features)
    }

    /// Fetch a clip and extract from it, deriving the decode hint from the URL
    pub fn extract_from_url<F: FeatureSpace>(
        &self,
        fetcher: &dyn AudioFetcher,
        url: &str,
    ) -> Result<F, ExtractionError> {
        let bytes = fetcher
            .fetch(url)
            .map_err(|e| ExtractionError::Fetch(e.to_string()))?;
        self.extract(&bytes, extension_hint_from_url(url).as_deref())
    }
}

fn first_non_finite<F: FeatureSpace>(features: &F) -> Option<&'static str> {
    F::DIMENSIONS
        .iter()
        .zip(features.values())
        .find(|(_, value)| !value.is_finite())
        .map(|(name, _)| *name)
}

/// Container extension from a URL path, ignoring any query string
pub fn extension_hint_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let (_, extension) = path.rsplit_once('.')?;
    if extension.is_empty()
        || extension.len() > 4
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}
