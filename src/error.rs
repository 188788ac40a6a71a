// file: error.rs
// desc: error types for recognition, storage, auth and configuration

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecognizeError {
    /// `recognize` was called before the classifier finished loading.
    #[error("model not loaded, call load() first")]
    NotLoaded,

    #[error("no bundled model in this build")]
    ModelUnavailable,

    #[error("failed to load model: {0}")]
    Load(String),

    #[error("invalid raster {width}x{height}x{channels} with {len} samples")]
    InvalidRaster {
        width: usize,
        height: usize,
        channels: usize,
        len: usize,
    },

    #[error("classifier returned {actual} probabilities for {expected} labels")]
    OutputMismatch { expected: usize, actual: usize },

    #[error("inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable")]
    Unavailable,

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("history serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not renew the session: {0}")]
    Auth(#[from] AuthError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("sign-in is not supported by the local auth provider")]
    Unsupported,

    #[error("auth provider is not configured")]
    NotConfigured,

    #[error("auth request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sign-in rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("provider '{0}' is not implemented")]
    Unsupported(String),

    #[error("unknown provider '{0}'")]
    Unknown(String),
}
