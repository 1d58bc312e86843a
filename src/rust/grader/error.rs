use ort::Error as OrtError;
use std::fmt;

/// Represents the different types of errors that can occur while grading an image.
#[derive(Debug)]
pub enum GraderError {
    /// The uploaded bytes could not be decoded or converted
    ImageError(String),
    /// Error occurred while loading or running the ONNX model
    ModelError(String),
    /// Error occurred during the build phase
    BuildError(String),
    /// Error occurred while turning model output into a grade
    PredictionError(String),
    /// Error occurred due to invalid input parameters
    ValidationError(String),
}

impl fmt::Display for GraderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImageError(msg) => write!(f, "Image error: {}", msg),
            Self::ModelError(msg) => write!(f, "Model error: {}", msg),
            Self::BuildError(msg) => write!(f, "Build error: {}", msg),
            Self::PredictionError(msg) => write!(f, "Prediction error: {}", msg),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for GraderError {}

impl From<OrtError> for GraderError {
    fn from(err: OrtError) -> Self {
        GraderError::BuildError(err.to_string())
    }
}

impl From<image::ImageError> for GraderError {
    fn from(err: image::ImageError) -> Self {
        GraderError::ImageError(err.to_string())
    }
}
