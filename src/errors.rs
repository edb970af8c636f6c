//! Error taxonomy for the crawler.
//!
//! Each subsystem gets its own `thiserror` enum; `anyhow` is used only at the
//! binary boundary (`main`) to attach context to startup failures.

use thiserror::Error;

/// Errors that can prevent the crawler from starting at all.
///
/// These are always fatal: the process aborts before any task is spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("seed url {0:?} has no host")]
    SeedMissingHost(String),
    #[error("seed url {0:?} is not http/https and no scheme could be inferred")]
    SeedInvalidScheme(String),
    #[error("seed url could not be parsed: {0}")]
    SeedUnparseable(#[from] url::ParseError),
    #[error("no network interfaces resolved for this run")]
    NoInterfaces,
    #[error("target directory {0:?} could not be created: {1}")]
    TargetDirUnwritable(std::path::PathBuf, std::io::Error),
    #[error("config file {0:?} could not be read: {1}")]
    ConfigFileUnreadable(std::path::PathBuf, std::io::Error),
    #[error("config file {0:?} could not be parsed: {1}")]
    BadConfigFile(std::path::PathBuf, toml::de::Error),
}

/// Errors a single download attempt can fail with. Every variant maps to a
/// retry-or-fail decision in `download::worker::next_outcome`; none of them
/// are fatal to the manager as a whole.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("non-success status: {0}")]
    Status(u16),
    #[error("download queue is full")]
    QueueFull,
    #[error("write to {0:?} failed: {1}")]
    Io(std::path::PathBuf, std::io::Error),
}

/// Errors that make a page's content unusable for link/document extraction.
/// Both tokenizer paths catch these at the point of failure and degrade to
/// an empty `PageResult` rather than propagate them past the coordinator;
/// they exist as a typed value so that degradation is logged with a real
/// cause instead of silently.
#[derive(Debug, Error)]
pub enum TokenizeError {
    #[error("base url could not be parsed: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("document body was empty")]
    EmptyDocument,
}
