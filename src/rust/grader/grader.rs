use std::sync::Arc;

use ndarray::Array4;

use super::builder::GraderBuilder;
use super::error::GraderError;
use super::model::GradeModel;
use super::preprocess::ImagePreprocessor;
use super::utils::argmax;
use super::{GradeResult, GraderInfo};
use crate::grades::{describe, NUM_GRADES};

/// A thread-safe knee X-ray grader: preprocessing pipeline plus inference backend.
///
/// # Thread Safety
///
/// `Grader` is `Send + Sync` and cheap to clone; the backend sits behind an
/// `Arc` and is never mutated after construction, so one instance can serve
/// any number of concurrent requests.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use kneegrade::Grader;
///
/// let grader = Grader::builder()
///     .with_architecture_file("assets/knee_osteoarthritis_architecture.json")?
///     .with_weights("knee_osteoarthritis.onnx")?
///     .build()?;
///
/// let bytes = std::fs::read("knee.jpg")?;
/// let result = grader.predict(&bytes)?;
/// println!("{} ({:?})", result.description, result.probabilities);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Grader {
    model: Arc<dyn GradeModel>,
    preprocessor: ImagePreprocessor,
    model_name: String,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Grader>();
    }
};

impl Grader {
    /// Creates a new GraderBuilder for fluent construction
    pub fn builder() -> GraderBuilder {
        GraderBuilder::new()
    }

    pub(crate) fn new(
        model: Arc<dyn GradeModel>,
        preprocessor: ImagePreprocessor,
        model_name: String,
    ) -> Self {
        Self {
            model,
            preprocessor,
            model_name,
        }
    }

    /// Returns information about the loaded model
    pub fn info(&self) -> GraderInfo {
        GraderInfo {
            model_name: self.model_name.clone(),
            input_shape: self.model.input_shape(),
            num_classes: self.model.num_classes(),
        }
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }

    /// Grades one encoded image (JPEG, PNG, BMP, GIF or TIFF).
    ///
    /// # Errors
    /// - `ValidationError` if `image_bytes` is empty
    /// - `ImageError` if the bytes cannot be decoded
    /// - `ModelError` / `PredictionError` if inference fails or returns a malformed vector
    pub fn predict(&self, image_bytes: &[u8]) -> Result<GradeResult, GraderError> {
        if image_bytes.is_empty() {
            return Err(GraderError::ValidationError("Input image cannot be empty".into()));
        }
        let input = self.preprocessor.preprocess(image_bytes)?;
        self.predict_tensor(input)
    }

    /// Grades an already preprocessed `[1, H, W, 3]` tensor
    pub fn predict_tensor(&self, input: Array4<f32>) -> Result<GradeResult, GraderError> {
        let expected = self.model.input_shape();
        if input.shape() != &expected[..] {
            return Err(GraderError::ValidationError(format!(
                "Input tensor shape {:?} does not match model input {:?}",
                input.shape(),
                expected
            )));
        }

        let probabilities = self.model.infer(input)?;
        if probabilities.len() != NUM_GRADES {
            return Err(GraderError::PredictionError(format!(
                "Expected {} probabilities, model returned {}",
                NUM_GRADES,
                probabilities.len()
            )));
        }

        let grade = argmax(&probabilities).ok_or_else(|| {
            GraderError::PredictionError("Model output contains no comparable values".into())
        })?;

        Ok(GradeResult {
            grade,
            description: describe(grade).to_string(),
            probabilities,
        })
    }
}
