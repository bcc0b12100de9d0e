//! Error types for dataset ingestion and skeleton generation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while indexing an AIXM dataset.
///
/// Dangling cross-references are not errors: they are recorded on the reference itself
/// (see [`crate::aixm::field::XLink::is_broken`]) and surface in statistics and graphs.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read dataset {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML in {path} at byte {position}: {message}")]
    Parse {
        path: PathBuf,
        position: u64,
        message: String,
    },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("no schema registered for feature type '{0}'")]
    UnknownFeatureType(String),

    #[error("malformed {feature_type} feature: {reason}")]
    MalformedFeature { feature_type: String, reason: String },

    #[error("time slice of {feature_type} '{feature_id}' has no sequenceNumber")]
    MissingSequenceNumber { feature_type: String, feature_id: String },

    #[error("invalid feature type registry: {0}")]
    Registry(String),

    #[error("dataset has not been processed yet")]
    NotProcessed,

    #[error("failed to write skeleton to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Archive(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Registry(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
