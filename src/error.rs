use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading records and converting them to a YOLO dataset.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// No record carries a single annotation, so no class can be indexed.
    #[error("no annotations found in any record; cannot build a category index")]
    EmptyCategorySet,

    /// An explicit label list named the same category twice.
    #[error("category {0:?} appears more than once in the label list")]
    DuplicateCategory(String),

    #[error("category {0:?} is not present in the category index")]
    UnknownCategory(String),

    #[error("degenerate box for {category:?}: width {width}, height {height}")]
    DegenerateBox {
        category: String,
        width: f64,
        height: f64,
    },

    #[error("coordinate ({x}, {y}) for {category:?} is outside [0, 1]")]
    CoordinateOutOfRange { category: String, x: f64, y: f64 },

    /// The image behind a record could not be retrieved.
    #[error("failed to fetch {reference}: {source}")]
    SourceFetch {
        reference: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {} (line {line}): {source}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A record parsed as JSON but does not describe a usable image.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("invalid split name {0:?}")]
    InvalidSplitName(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Transport-level failures while retrieving image bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),
}

/// Failures surfaced by a [`crate::predictor::Predictor`] or its handler.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("input text is empty or whitespace-only")]
    EmptyText,

    #[error("invalid probability distribution: {0}")]
    InvalidDistribution(String),

    /// The wrapped inference backend failed.
    #[error("predictor backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
