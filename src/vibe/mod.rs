pub mod features;
pub mod profile;
pub mod query;
pub mod ranking;
pub mod recommender;

pub use features::*;
pub use profile::*;
pub use query::*;
pub use ranking::*;
pub use recommender::*;

use thiserror::Error;

/// Request-terminating pipeline failures. Per-track extraction problems are
/// logged and skipped rather than surfaced here.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("no reference profile for vibe '{0}'")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("catalog search failed: {0}")]
    Retrieval(String),
}
