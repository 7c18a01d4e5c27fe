use std::path::PathBuf;

use thiserror::Error;

use crate::board::StudentId;
use crate::imaging::CropRect;

/// Errors raised by the assignment store's mutation API
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown student id: {0}")]
    UnknownStudent(StudentId),

    #[error("student name must not be empty")]
    EmptyName,

    #[error("group index {0} is out of range")]
    UnknownGroup(usize),

    #[error("a group named {0} already exists")]
    DuplicateGroup(String),

    #[error("vehicle {0} is disabled")]
    VehicleDisabled(u8),

    #[error("reset requires explicit confirmation")]
    ResetNotConfirmed,
}

/// Errors raised by the image preprocessing pipeline
#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("scale factor must be at least 1, got {0}")]
    InvalidScale(u32),

    #[error("crop region {0:?} does not overlap the image")]
    EmptyRegion(CropRect),

    #[error("grid layout leaves no usable area: {0}")]
    InvalidGrid(String),

    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
}

/// Errors from the external text recognizer
#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("failed to start recognizer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("recognizer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("could not encode image for the recognizer: {0}")]
    Encode(#[from] image::ImageError),

    #[error("recognizer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal errors that abort a photo import run
#[derive(Debug, Error)]
pub enum OcrError {
    #[error(transparent)]
    Imaging(#[from] ImagingError),

    #[error(transparent)]
    Recognizer(#[from] RecognizeError),
}

impl OcrError {
    /// Short status line shown to the operator when an import aborts
    pub fn status_message(&self) -> &'static str {
        match self {
            OcrError::Imaging(_) => "Could not read the image. Try another photo or file format.",
            OcrError::Recognizer(_) => {
                "Text recognition failed. Adjust lighting, resolution or tilt and try again."
            }
        }
    }
}

/// Errors reading or writing the persisted board state
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("saved state at {path} is not valid: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
