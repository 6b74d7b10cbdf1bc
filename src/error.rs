//! Typed error values for each component boundary.
//!
//! None of these cross a component boundary at runtime: producers convert
//! [`FetchError`] into a sentinel reading, consumers convert [`RenderError`]
//! into an inactive flag, and the store converts persistence failures into an
//! [`ApplyOutcome`](crate::config::ApplyOutcome).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the configuration store.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A patch must be a mapping at the top level.
    #[error("config patch must be a mapping, got {0}")]
    NotAMapping(&'static str),

    /// The merged tree does not satisfy the typed schema.
    #[error("config patch produces an invalid configuration: {0}")]
    InvalidPatch(#[source] serde_json::Error),

    /// The in-memory tree could not be turned into a document.
    #[error("failed to serialize configuration: {0}")]
    Serialize(String),

    /// Writing the document to disk failed.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors from a producer's external fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response carried no usable reading")]
    MissingReading,

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed value in {0}")]
    Parse(String),
}

/// Errors from a rendering collaborator.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("output failed: {0}")]
    Io(#[from] io::Error),

    /// The device driver reported a failure.
    #[error("display device error: {0}")]
    Device(String),

    /// The surface cannot be used on this build or host.
    #[error("display unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the speech listener's setup.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech model not found at {0}")]
    ModelMissing(PathBuf),

    #[error("speech.command is empty")]
    NoRecognizer,

    #[error("failed to start recognizer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Errors while preparing bundled assets.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("image conversion failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("wav encoding failed: {0}")]
    Wav(#[from] hound::Error),
}
