//! Shared configuration and domain records for the newsdesk crawler.

pub mod app_config;
pub mod article;
pub mod config;
pub mod sources;

use thiserror::Error;

pub use app_config::{AiConfig, AppConfig, Environment, SinkKind};
pub use article::ArticleRecord;
pub use config::{load_app_config, load_app_config_from_env};
pub use sources::{load_sources, validate_sources, SelectorProfile, SourceConfig, SourcesFile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read sources file {path}: {source}")]
    SourcesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sources file: {0}")]
    SourcesFileParse(#[from] serde_yaml::Error),

    #[error("sources validation failed: {0}")]
    Validation(String),
}
