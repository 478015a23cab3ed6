pub mod app_config;
pub mod checkin;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod offers;
pub mod profiles;
pub mod proof;
pub mod seed;
mod validate;

pub use app_config::{AppConfig, Environment, StorageConfig, MAX_SESSION_TTL_HOURS};
pub use checkin::{evaluate_arrival, is_on_time, CheckinOutcome, CheckinPayload, CheckinSigner};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::RuleError;
pub use lifecycle::{ApplicationStatus, CollaborationStatus, Schedule};
pub use offers::{OfferDraft, OfferPatch, OfferStatus};
pub use profiles::{ProfileDraft, ProfilePatch, UserType};
pub use proof::{sanitize_filename, video_object_path, ContentProof, ValidatedProof};
pub use seed::{load_seed, SeedFile, SeedOffer};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read seed file {path}: {source}")]
    SeedFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse seed file: {0}")]
    SeedFileParse(#[from] serde_yaml::Error),

    #[error("seed validation failed: {0}")]
    Validation(String),
}
