use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use log::{error, info};

use super::error::GraderError;
use super::grader::Grader;
use super::model::{GradeModel, OnnxGradeModel};
use super::preprocess::ImagePreprocessor;
use crate::architecture::ModelArchitecture;
use crate::grades::NUM_GRADES;
use crate::runtime::RuntimeConfig;

/// A builder for constructing a [`Grader`] with a fluent interface.
///
/// Either an architecture description plus a weights file (ONNX backend) or
/// a ready-made [`GradeModel`] must be supplied, never both.
#[derive(Default, Debug)]
pub struct GraderBuilder {
    architecture: Option<ModelArchitecture>,
    weights_path: Option<PathBuf>,
    model: Option<Arc<dyn GradeModel>>,
    filter: Option<FilterType>,
    runtime_config: RuntimeConfig,
}

impl GraderBuilder {
    /// Creates a new empty GraderBuilder instance with default configuration
    ///
    /// # Example
    /// ```
    /// use kneegrade::GraderBuilder;
    ///
    /// let builder = GraderBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime configuration for ONNX model execution
    ///
    /// # Example
    /// ```
    /// use kneegrade::{GraderBuilder, RuntimeConfig};
    ///
    /// let builder = GraderBuilder::new()
    ///     .with_runtime_config(RuntimeConfig::with_intra_threads(2));
    /// ```
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Sets the architecture description the weights must conform to
    ///
    /// # Returns
    /// * `Result<Self, GraderError>` - The builder instance if successful, or an error if:
    ///   - An architecture is already set
    ///   - The architecture fails validation
    pub fn with_architecture(mut self, architecture: ModelArchitecture) -> Result<Self, GraderError> {
        if self.architecture.is_some() {
            return Err(GraderError::BuildError("Architecture already set".to_string()));
        }
        architecture
            .validate()
            .map_err(|e| GraderError::BuildError(e.to_string()))?;
        self.architecture = Some(architecture);
        Ok(self)
    }

    /// Reads the architecture description from a JSON file
    pub fn with_architecture_file<P: AsRef<Path>>(self, path: P) -> Result<Self, GraderError> {
        let architecture = ModelArchitecture::from_file(path.as_ref()).map_err(|e| {
            error!("Failed to load architecture: {}", e);
            GraderError::BuildError(format!("Failed to load architecture: {}", e))
        })?;
        self.with_architecture(architecture)
    }

    /// Sets the ONNX weights file to load
    ///
    /// # Returns
    /// * `Result<Self, GraderError>` - The builder instance if successful, or an error if:
    ///   - The path is empty
    ///   - A weights path or custom model is already set
    ///   - The file doesn't exist
    pub fn with_weights<P: AsRef<Path>>(mut self, path: P) -> Result<Self, GraderError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(GraderError::BuildError("Weights path cannot be empty".to_string()));
        }
        if self.weights_path.is_some() || self.model.is_some() {
            return Err(GraderError::BuildError("Model weights already set".to_string()));
        }
        if !path.exists() {
            return Err(GraderError::BuildError(format!(
                "Weights file not found: {}",
                path.display()
            )));
        }
        self.weights_path = Some(path.to_path_buf());
        Ok(self)
    }

    /// Uses an already constructed inference backend instead of loading weights
    ///
    /// # Returns
    /// * `Result<Self, GraderError>` - The builder instance if successful, or an error if:
    ///   - Weights or another model are already set
    ///   - The model does not produce one probability per grade
    ///   - The model input is not a single 3-channel image
    pub fn with_model(mut self, model: Arc<dyn GradeModel>) -> Result<Self, GraderError> {
        if self.weights_path.is_some() || self.model.is_some() {
            return Err(GraderError::BuildError("Model weights already set".to_string()));
        }
        Self::validate_model(model.as_ref())?;
        self.model = Some(model);
        Ok(self)
    }

    /// Overrides the resampling filter used when resizing uploads
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Builds and returns the final Grader instance
    ///
    /// # Returns
    /// * `Result<Grader, GraderError>` - The constructed Grader if successful, or an error if:
    ///   - Neither a model nor architecture + weights are set
    ///   - The ONNX session cannot be created
    ///   - The session's inputs or outputs disagree with the architecture
    pub fn build(self) -> Result<Grader, GraderError> {
        let model_name = self
            .architecture
            .as_ref()
            .map(|a| a.name.clone())
            .unwrap_or_else(|| "custom".to_string());

        let model: Arc<dyn GradeModel> = match self.model {
            Some(model) => model,
            None => {
                let architecture = self.architecture.as_ref().ok_or_else(|| {
                    GraderError::BuildError("Architecture must be set".to_string())
                })?;
                let weights_path = self.weights_path.as_ref().ok_or_else(|| {
                    GraderError::BuildError("Weights path must be set".to_string())
                })?;
                info!("Attaching weights from {:?} to '{}'", weights_path, architecture.name);
                let model =
                    OnnxGradeModel::from_file(weights_path, architecture, &self.runtime_config)?;
                Self::validate_model(&model)?;
                Arc::new(model)
            }
        };

        let [_, height, width, _] = model.input_shape();
        let mut preprocessor = ImagePreprocessor::new(width as u32, height as u32);
        if let Some(filter) = self.filter {
            preprocessor = preprocessor.with_filter(filter);
        }

        info!("Grader '{}' ready, input shape {:?}", model_name, model.input_shape());
        Ok(Grader::new(model, preprocessor, model_name))
    }

    fn validate_model(model: &dyn GradeModel) -> Result<(), GraderError> {
        if model.num_classes() != NUM_GRADES {
            return Err(GraderError::BuildError(format!(
                "Model must produce {} class probabilities, produces {}",
                NUM_GRADES,
                model.num_classes()
            )));
        }
        let [batch, height, width, channels] = model.input_shape();
        if batch != 1 || height == 0 || width == 0 || channels != 3 {
            return Err(GraderError::BuildError(format!(
                "Model input must be [1, H, W, 3], got {:?}",
                model.input_shape()
            )));
        }
        Ok(())
    }
}
