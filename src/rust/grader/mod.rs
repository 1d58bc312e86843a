use serde::{Deserialize, Serialize};

mod error;
mod grader;
mod model;
mod utils;
pub mod builder;
pub mod preprocess;

pub use builder::GraderBuilder;
pub use error::GraderError;
pub use grader::Grader;
pub use model::{GradeModel, OnnxGradeModel};
pub use preprocess::ImagePreprocessor;

/// Outcome of grading one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    /// Index of the most probable grade (0-4)
    pub grade: usize,
    /// Human-readable description of `grade`
    pub description: String,
    /// Per-grade probabilities, in grade order
    pub probabilities: Vec<f32>,
}

/// Information about the model behind a grader
#[derive(Debug, Clone)]
pub struct GraderInfo {
    /// Name from the architecture description, or "custom"
    pub model_name: String,
    /// `[1, height, width, 3]` input the model consumes
    pub input_shape: [usize; 4],
    /// Length of the probability vector
    pub num_classes: usize,
}
