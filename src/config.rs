use anyhow::{Context, Result};

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub catalog_base_url: String,
    pub storefront: String,
    pub candidate_pool: usize,
    pub fetch_concurrency: usize,
    pub auth: Option<AuthConfig>,
}

/// Credential-refresh settings, present only when all required variables are set
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub bootstrap_refresh_token: Option<String>,
}

/// Load configuration from `.env` and environment
pub fn load_config() -> Result<Config> {
    // Load `.env` file if present
    dotenv::dotenv().ok();
    // Read variables; the catalog needs no credentials so everything has a default
    let catalog_base_url = std::env::var("CATALOG_BASE_URL")
        .unwrap_or_else(|_| "https://itunes.apple.com".to_string());
    let storefront = std::env::var("STOREFRONT").unwrap_or_else(|_| "US".to_string());
    let candidate_pool = parse_env_usize("CANDIDATE_POOL", 80)?;
    let fetch_concurrency = parse_env_usize("FETCH_CONCURRENCY", 4)?;

    // Token refresh is opt-in: only wired when the full auth block is present
    let auth = match (
        std::env::var("TOKEN_URL"),
        std::env::var("CLIENT_ID"),
        std::env::var("CLIENT_SECRET"),
    ) {
        (Ok(token_url), Ok(client_id), Ok(client_secret)) => Some(AuthConfig {
            token_url,
            client_id,
            client_secret,
            bootstrap_refresh_token: std::env::var("BOOTSTRAP_REFRESH_TOKEN").ok(),
        }),
        _ => None,
    };

    Ok(Config {
        catalog_base_url,
        storefront,
        candidate_pool,
        fetch_concurrency,
        auth,
    })
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize> {
    match std::env::var(name) {
        Ok(raw) => {
            let value: usize = raw
                .parse()
                .with_context(|| format!("{name} must be a positive integer, got '{raw}'"))?;
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
            Ok(value)
        }
        Err(_) => Ok(default),
    }
}
