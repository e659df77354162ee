use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{PositionError, PositionErrorKind};

/// Why an acquisition session ended in `Failed`.
///
/// Rendered as the user-facing error string of the radar snapshot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    #[error("Unable to get your location. Location access was denied. Please enable location permissions in your device settings.")]
    PermissionDenied(String),

    #[error("Unable to get your location. Location information is unavailable. Please ensure GPS/location services are enabled.")]
    PositionUnavailable(String),

    #[error("Unable to get your location. Location request timed out. Please try again and ensure you have a clear view of the sky if using GPS.")]
    TimedOutNoFix,
}

impl AcquisitionError {
    /// Raw detail from the positioning source, for logs
    pub fn detail(&self) -> &str {
        match self {
            AcquisitionError::PermissionDenied(detail)
            | AcquisitionError::PositionUnavailable(detail) => detail,
            AcquisitionError::TimedOutNoFix => "no sample before the acquisition timeout",
        }
    }
}

impl From<PositionError> for AcquisitionError {
    fn from(error: PositionError) -> Self {
        match error.kind {
            PositionErrorKind::PermissionDenied => AcquisitionError::PermissionDenied(error.message),
            PositionErrorKind::Unavailable => AcquisitionError::PositionUnavailable(error.message),
            PositionErrorKind::Timeout => AcquisitionError::TimedOutNoFix,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Load(#[from] LoadError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Hazard point {0} already exists")]
    DuplicateId(String),

    #[error("Hazard point {0} not found")]
    NotFound(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    #[error("Cannot report a hazard without a current location")]
    NoFix,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure reading a JSON input file
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        LoadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn parse(path: &Path, source: serde_json::Error) -> Self {
        LoadError::Parse {
            path: path.to_path_buf(),
            source,
        }
    }
}
