use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

mod audio;
mod client;
mod config;
mod credentials;
mod models;
mod vibe;

#[cfg(test)]
mod vibe_tests;

use crate::client::{AudioFetcher, CatalogSearcher, ItunesClient};
use crate::config::load_config;
use crate::credentials::{
    Credential, CredentialManager, HttpTokenRefresher, MemoryCredentialStore,
};
use crate::models::SeedTrack;
use crate::vibe::{
    FeatureCache, ProfileBuilder, Ranker, Recommender, SemanticFeatures, SimilarityMetric,
};

#[derive(Parser)]
#[command(name = "vibe-recommender")]
#[command(about = "Vibe-based track recommendations from catalog preview audio")]
#[command(version)]
struct Args {
    /// Vibe to recommend for (see --list-vibes)
    #[arg(short = 'v', long = "vibe")]
    vibe: Option<String>,

    /// Path to the seed track configuration JSON file
    #[arg(short = 's', long = "seeds", default_value = "seeds.json")]
    seeds_file: String,

    /// How many tracks to recommend
    #[arg(short = 'l', long = "limit", default_value_t = 10)]
    limit: usize,

    /// Storefront country code, overriding the configured one
    #[arg(short = 'm', long = "market")]
    market: Option<String>,

    /// Similarity metric: euclidean or cosine
    #[arg(long = "metric", default_value = "euclidean")]
    metric: String,

    /// List configured vibes and exit
    #[arg(long = "list-vibes")]
    list_vibes: bool,

    /// Print the vibe's reference profile as JSON and exit
    #[arg(long = "show-profile")]
    show_profile: bool,

    /// Ensure this user's credential is valid before recommending
    #[arg(short = 'u', long = "user")]
    user: Option<String>,

    /// Quiet mode - reduce output verbosity
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.quiet {
        log::LevelFilter::Warn
    } else {
        log::LevelFilter::Info
    };
    colog::default_builder().filter(None, level).init();

    // Validate that the seed configuration file exists before proceeding
    if !std::path::Path::new(&args.seeds_file).exists() {
        eprintln!(
            "Error: Seed configuration file '{}' not found.",
            args.seeds_file
        );
        eprintln!("Please ensure the file exists or specify a different file with --seeds.");
        return Err(anyhow::anyhow!(
            "Seed configuration file '{}' not found",
            args.seeds_file
        ));
    }

    // Load configuration from .env
    let config = load_config()?;

    let seeds = match SeedTrack::load_all_from_file(&args.seeds_file) {
        Ok(seeds) => {
            if !args.quiet {
                println!("Loaded {} seed tracks from {}", seeds.len(), args.seeds_file);
            }
            seeds
        }
        Err(e) => {
            eprintln!("Failed to load seed tracks: {e}");
            return Err(anyhow::anyhow!("Failed to load seed tracks: {}", e));
        }
    };

    // One HTTP client serves both the catalog search and the audio downloads
    let client = Arc::new(ItunesClient::new(&config));
    let fetcher: Arc<dyn AudioFetcher> = Arc::clone(&client) as Arc<dyn AudioFetcher>;
    let catalog: Arc<dyn CatalogSearcher> = client;

    let profiles = ProfileBuilder::new(seeds, Arc::clone(&fetcher), Arc::new(FeatureCache::new()));
    let ranker = Ranker::new(fetcher, config.fetch_concurrency)?;
    let recommender: Recommender<SemanticFeatures> =
        Recommender::new(catalog, profiles, ranker, config.candidate_pool);

    if args.list_vibes {
        println!("Configured vibes:");
        for vibe in recommender.vibes() {
            println!("- {vibe}");
        }
        return Ok(());
    }

    let Some(vibe) = args.vibe else {
        eprintln!("Error: a vibe is required unless --list-vibes is given.");
        return Err(anyhow::anyhow!("No vibe specified"));
    };

    let metric = match args.metric.as_str() {
        "euclidean" | "negative-euclidean" => SimilarityMetric::NegativeEuclidean,
        "cosine" => SimilarityMetric::Cosine,
        other => {
            eprintln!("Error: unknown metric '{other}'. Use 'euclidean' or 'cosine'.");
            return Err(anyhow::anyhow!("Unknown metric '{}'", other));
        }
    };

    if args.show_profile {
        let reference = recommender.reference(&vibe)?;
        println!("Reference profile for '{vibe}':");
        println!("{}", serde_json::to_string_pretty(&reference)?);
        return Ok(());
    }

    // Make sure the user's credential is usable before doing work on their behalf
    if let Some(user_id) = &args.user {
        let Some(auth) = &config.auth else {
            eprintln!("Error: --user requires TOKEN_URL, CLIENT_ID and CLIENT_SECRET to be set.");
            return Err(anyhow::anyhow!("Credential configuration missing"));
        };

        // Without a persistent backend, a bootstrap refresh token stands in
        // for the user's stored credential and forces a first refresh
        let store = match &auth.bootstrap_refresh_token {
            Some(refresh_token) => Arc::new(MemoryCredentialStore::with_credential(
                Credential::bootstrap(user_id, refresh_token),
            )),
            None => Arc::new(MemoryCredentialStore::new()),
        };
        let manager = CredentialManager::new(store, Arc::new(HttpTokenRefresher::new(auth)));
        match manager.ensure_valid(user_id) {
            Ok(credential) => {
                if !args.quiet {
                    println!(
                        "✓ Credential for '{}' valid until {}",
                        user_id, credential.expires_at
                    );
                }
            }
            Err(e) => {
                eprintln!("✗ Credential check failed for '{user_id}': {e}");
                return Err(anyhow::anyhow!("Credential check failed: {}", e));
            }
        }
    }

    let storefront = args.market.unwrap_or_else(|| config.storefront.clone());

    if !args.quiet {
        println!(
            "\nRecommending {} '{}' tracks in {} (metric: {})...",
            args.limit, vibe, storefront, metric
        );
    }
    let recommendation = recommender.recommend(&vibe, args.limit, &storefront, metric)?;

    let reference = &recommendation.reference;
    println!("\n=== RECOMMENDATIONS: {} ===", recommendation.vibe);
    println!(
        "Reference: \"{}\" by {}",
        reference.seed.name, reference.seed.artist
    );
    if !args.quiet {
        println!(
            "   Profile: tempo {:.0} bpm | energy {:.2} | valence {:.2} | acousticness {:.2} | danceability {:.2}",
            reference.profile.tempo,
            reference.profile.energy,
            reference.profile.valence,
            reference.profile.acousticness,
            reference.profile.danceability
        );
    }

    if recommendation.tracks.is_empty() {
        println!("No candidates survived ranking - try another vibe or market.");
        return Err(anyhow::anyhow!("No recommendations produced"));
    }

    println!();
    for (i, track) in recommendation.tracks.iter().enumerate() {
        let album_display = track.candidate.album.as_deref().unwrap_or("-");
        let link_display = track
            .candidate
            .link_url
            .as_deref()
            .map(|link| format!("\n      {link}"))
            .unwrap_or_default();
        println!(
            "{:>2}. \"{}\" by {} [{}] score {:.4}{}",
            i + 1,
            track.candidate.name,
            track.candidate.artist,
            album_display,
            track.score,
            link_display
        );
    }

    println!(
        "\n✓ Ranked {} of {} requested tracks for '{}'",
        recommendation.tracks.len(),
        args.limit,
        recommendation.vibe
    );

    Ok(())
}
