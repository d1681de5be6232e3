use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why a synthesis session produced no audio locator.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} failed after {attempts} attempt(s): {last_error}")]
    NavigationFailed {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("page interaction failed while {step}: {message}")]
    Ui { step: &'static str, message: String },

    #[error("result audio did not appear within {0:?}")]
    ResultTimeout(Duration),

    #[error("result audio has no usable source: {0}")]
    MissingLocator(String),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download of {url} failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("cannot write {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single term; never aborts the batch.
#[derive(Debug, Error)]
pub enum TermError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("cannot prepare output directory {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("output key '{0}' appears more than once")]
    DuplicateKey(String),

    #[error("output key '{0}' is not a safe file name")]
    UnsafeKey(String),

    #[error("cannot read vocabulary {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed vocabulary: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
