// Pipeline tests wiring the recommender against mocked network endpoints,
// with real WAV audio flowing through decode, extraction, and ranking

use crate::client::{AudioFetcher, MockAudioFetcher, MockCatalogSearcher};
use crate::models::{Candidate, SeedTrack};
use crate::vibe::{
    FeatureCache, ProfileBuilder, Ranker, RecommendError, Recommender, SemanticFeatures,
    SimilarityMetric, SpectralFeatures,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn wav_bytes(frequency: f32, amplitude: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..22050 * 2 {
            let sample =
                (2.0 * std::f32::consts::PI * frequency * i as f32 / 22050.0).sin() * amplitude;
            writer
                .write_sample((sample * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    fn create_seed(vibe: &str, audio_url: &str) -> SeedTrack {
        SeedTrack {
            id: format!("seed-{vibe}"),
            name: format!("{vibe} seed"),
            artist: "Seed Artist".to_string(),
            vibe: vibe.to_string(),
            audio_url: audio_url.to_string(),
        }
    }

    fn create_candidate(id: &str, preview_url: Option<&str>) -> Candidate {
        Candidate {
            id: id.to_string(),
            name: format!("Track {id}"),
            preview_url: preview_url.map(String::from),
            ..Candidate::default()
        }
    }

    fn serve(fetcher: &mut MockAudioFetcher, suffix: &'static str, bytes: Vec<u8>) {
        fetcher
            .expect_fetch()
            .withf(move |url| url.ends_with(suffix))
            .returning(move |_| Ok(bytes.clone()));
    }

    fn create_recommender(
        seeds: Vec<SeedTrack>,
        catalog: MockCatalogSearcher,
        fetcher: MockAudioFetcher,
    ) -> Recommender<SemanticFeatures> {
        let fetcher: Arc<dyn AudioFetcher> = Arc::new(fetcher);
        let profiles =
            ProfileBuilder::new(seeds, Arc::clone(&fetcher), Arc::new(FeatureCache::new()));
        let ranker = Ranker::new(fetcher, 2).unwrap();
        Recommender::new(Arc::new(catalog), profiles, ranker, 80)
    }

    #[test]
    fn test_recommends_the_sonically_closest_track_first() {
        let seed_audio = wav_bytes(300.0, 0.3);
        // Same recording as the seed: its vector matches the profile exactly
        let similar_audio = wav_bytes(300.0, 0.3);
        let different_audio = wav_bytes(4000.0, 0.9);

        let mut fetcher = MockAudioFetcher::new();
        serve(&mut fetcher, "seed.wav", seed_audio);
        serve(&mut fetcher, "similar.wav", similar_audio);
        serve(&mut fetcher, "different.wav", different_audio);

        let mut catalog = MockCatalogSearcher::new();
        catalog
            .expect_search()
            .withf(|term, storefront, limit| {
                term == "chill relax ambient" && storefront == "US" && *limit == 80
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![
                    create_candidate("different", Some("https://previews.example.com/different.wav")),
                    create_candidate("similar", Some("https://previews.example.com/similar.wav")),
                ])
            });

        let recommender = create_recommender(
            vec![create_seed("relax", "https://seeds.example.com/seed.wav")],
            catalog,
            fetcher,
        );

        let recommendation = recommender
            .recommend("relax", 10, "US", SimilarityMetric::NegativeEuclidean)
            .unwrap();

        assert_eq!(recommendation.vibe, "relax");
        assert_eq!(recommendation.reference.seed.id, "seed-relax");
        assert_eq!(recommendation.tracks.len(), 2);
        assert_eq!(recommendation.tracks[0].candidate.id, "similar");
        assert!(recommendation.tracks[0].score > recommendation.tracks[1].score);
    }

    #[test]
    fn test_bad_candidates_are_dropped_without_failing_the_request() {
        let seed_audio = wav_bytes(500.0, 0.5);
        let good_audio = wav_bytes(520.0, 0.5);

        let mut fetcher = MockAudioFetcher::new();
        serve(&mut fetcher, "seed.wav", seed_audio);
        serve(&mut fetcher, "good.wav", good_audio);
        // Corrupt payload: fetch succeeds, decode cannot
        serve(&mut fetcher, "corrupt.bin", vec![0u8; 256]);
        fetcher
            .expect_fetch()
            .withf(|url| url.ends_with("unreachable.wav"))
            .returning(|_| Err(anyhow::anyhow!("connection refused")));

        let mut catalog = MockCatalogSearcher::new();
        catalog.expect_search().times(1).returning(|_, _, _| {
            Ok(vec![
                create_candidate("no-preview", None),
                create_candidate("corrupt", Some("https://previews.example.com/corrupt.bin")),
                create_candidate(
                    "unreachable",
                    Some("https://previews.example.com/unreachable.wav"),
                ),
                create_candidate("good", Some("https://previews.example.com/good.wav")),
            ])
        });

        let recommender = create_recommender(
            vec![create_seed("focus", "https://seeds.example.com/seed.wav")],
            catalog,
            fetcher,
        );

        let recommendation = recommender
            .recommend("focus", 10, "US", SimilarityMetric::NegativeEuclidean)
            .unwrap();

        let ids: Vec<&str> = recommendation
            .tracks
            .iter()
            .map(|t| t.candidate.id.as_str())
            .collect();
        assert_eq!(ids, vec!["good"]);
    }

    #[test]
    fn test_seed_audio_is_downloaded_once_across_requests() {
        let seed_audio = wav_bytes(500.0, 0.5);
        let preview_audio = wav_bytes(510.0, 0.5);

        let mut fetcher = MockAudioFetcher::new();
        // The seed cache makes the second request skip this download
        let bytes = seed_audio.clone();
        fetcher
            .expect_fetch()
            .withf(|url| url.ends_with("seed.wav"))
            .times(1)
            .returning(move |_| Ok(bytes.clone()));
        let bytes = preview_audio.clone();
        fetcher
            .expect_fetch()
            .withf(|url| url.ends_with("preview.wav"))
            .times(2)
            .returning(move |_| Ok(bytes.clone()));

        let mut catalog = MockCatalogSearcher::new();
        catalog.expect_search().times(2).returning(|_, _, _| {
            Ok(vec![create_candidate(
                "c1",
                Some("https://previews.example.com/preview.wav"),
            )])
        });

        let recommender = create_recommender(
            vec![create_seed("focus", "https://seeds.example.com/seed.wav")],
            catalog,
            fetcher,
        );

        recommender
            .recommend("focus", 5, "US", SimilarityMetric::NegativeEuclidean)
            .unwrap();
        recommender
            .recommend("focus", 5, "US", SimilarityMetric::NegativeEuclidean)
            .unwrap();
    }

    #[test]
    fn test_unknown_vibe_fails_before_the_catalog_is_hit() {
        let recommender = create_recommender(
            vec![create_seed("focus", "https://seeds.example.com/seed.wav")],
            MockCatalogSearcher::new(),
            MockAudioFetcher::new(),
        );

        let result = recommender.recommend("unknown", 5, "US", SimilarityMetric::default());
        assert!(matches!(result, Err(RecommendError::NotFound(_))));
    }

    #[test]
    fn test_cosine_metric_scores_identical_audio_as_one() {
        let audio = wav_bytes(500.0, 0.5);

        let mut fetcher = MockAudioFetcher::new();
        let bytes = audio.clone();
        fetcher
            .expect_fetch()
            .returning(move |_| Ok(bytes.clone()));

        let mut catalog = MockCatalogSearcher::new();
        catalog.expect_search().times(1).returning(|_, _, _| {
            Ok(vec![create_candidate(
                "twin",
                Some("https://previews.example.com/twin.wav"),
            )])
        });

        let recommender = create_recommender(
            vec![create_seed("focus", "https://seeds.example.com/seed.wav")],
            catalog,
            fetcher,
        );

        let recommendation = recommender
            .recommend("focus", 5, "US", SimilarityMetric::Cosine)
            .unwrap();

        // Same audio as the single seed, so the angle between the vectors is zero
        assert!((recommendation.tracks[0].score - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_raw_spectral_shape_runs_the_same_pipeline() {
        let seed_audio = wav_bytes(400.0, 0.4);
        let preview_audio = wav_bytes(800.0, 0.6);

        let mut fetcher = MockAudioFetcher::new();
        serve(&mut fetcher, "seed.wav", seed_audio);
        serve(&mut fetcher, "preview.wav", preview_audio);

        let mut catalog = MockCatalogSearcher::new();
        catalog.expect_search().times(1).returning(|_, _, _| {
            Ok(vec![create_candidate(
                "c1",
                Some("https://previews.example.com/preview.wav"),
            )])
        });

        let fetcher: Arc<dyn AudioFetcher> = Arc::new(fetcher);
        let profiles: ProfileBuilder<SpectralFeatures> = ProfileBuilder::new(
            vec![create_seed("focus", "https://seeds.example.com/seed.wav")],
            Arc::clone(&fetcher),
            Arc::new(FeatureCache::new()),
        );
        let ranker = Ranker::new(fetcher, 2).unwrap();
        let recommender = Recommender::new(Arc::new(catalog), profiles, ranker, 80);

        let recommendation = recommender
            .recommend("focus", 5, "US", SimilarityMetric::NegativeEuclidean)
            .unwrap();

        assert_eq!(recommendation.tracks.len(), 1);
        // Raw measurements are unscaled, so distances dwarf the normalized shape's
        assert!(recommendation.tracks[0].score < -1.0);
    }

    #[test]
    fn test_limit_truncates_after_ranking() {
        let seed_audio = wav_bytes(500.0, 0.5);
        // Identical to the seed, so it always ranks first
        let near = wav_bytes(500.0, 0.5);
        let mid = wav_bytes(900.0, 0.5);
        let far = wav_bytes(3000.0, 0.5);

        let mut fetcher = MockAudioFetcher::new();
        serve(&mut fetcher, "seed.wav", seed_audio);
        serve(&mut fetcher, "near.wav", near);
        serve(&mut fetcher, "mid.wav", mid);
        serve(&mut fetcher, "far.wav", far);

        let mut catalog = MockCatalogSearcher::new();
        catalog.expect_search().times(1).returning(|_, _, _| {
            Ok(vec![
                create_candidate("far", Some("https://previews.example.com/far.wav")),
                create_candidate("near", Some("https://previews.example.com/near.wav")),
                create_candidate("mid", Some("https://previews.example.com/mid.wav")),
            ])
        });

        let recommender = create_recommender(
            vec![create_seed("focus", "https://seeds.example.com/seed.wav")],
            catalog,
            fetcher,
        );

        let recommendation = recommender
            .recommend("focus", 2, "US", SimilarityMetric::NegativeEuclidean)
            .unwrap();

        // All three are fetched and scored; only the best two survive
        assert_eq!(recommendation.tracks.len(), 2);
        assert_eq!(recommendation.tracks[0].candidate.id, "near");
    }
}
