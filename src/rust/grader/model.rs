use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::{Tensor, ValueType};

use super::error::GraderError;
use crate::architecture::ModelArchitecture;
use crate::runtime::{create_session_builder, RuntimeConfig};

/// An inference backend that maps one preprocessed image batch to class probabilities.
///
/// Implementations must be safe to call from many threads at once; the server
/// shares a single instance across all requests without locking.
pub trait GradeModel: Send + Sync + fmt::Debug {
    /// `[batch, height, width, channels]` of the tensor the model consumes (batch is 1)
    fn input_shape(&self) -> [usize; 4];

    /// Length of the probability vector the model produces
    fn num_classes(&self) -> usize;

    /// Runs a single-image batch and returns its probability vector
    fn infer(&self, input: Array4<f32>) -> Result<Vec<f32>, GraderError>;
}

/// [`GradeModel`] backed by an ONNX Runtime session.
///
/// # Model Input Format
/// - One `f32` tensor, NHWC: `[1, height, width, 3]`, BGR, ImageNet-mean-centred
///
/// # Model Output Format
/// - One `f32` tensor whose elements are the per-class probabilities (`[1, num_classes]`)
#[derive(Debug)]
pub struct OnnxGradeModel {
    session: Session,
    input_name: String,
    output_name: String,
    input_shape: [usize; 4],
    num_classes: usize,
}

impl OnnxGradeModel {
    /// Creates a session from the weights file and checks it against `architecture`
    pub fn from_file(
        path: &Path,
        architecture: &ModelArchitecture,
        config: &RuntimeConfig,
    ) -> Result<Self, GraderError> {
        let session = create_session_builder(config)?
            .commit_from_file(path)
            .map_err(|e| {
                log::error!("Failed to create ONNX session from {:?}: {}", path, e);
                GraderError::ModelError(format!("Failed to load weights from {:?}: {}", path, e))
            })?;
        Self::from_session(session, architecture)
    }

    pub fn from_session(
        session: Session,
        architecture: &ModelArchitecture,
    ) -> Result<Self, GraderError> {
        let (input_name, output_name) = validate_model(&session, architecture)?;
        log::info!(
            "Model structure validated: input '{}' {:?}, output '{}' with {} classes",
            input_name,
            architecture.input_shape(),
            output_name,
            architecture.output.num_classes
        );
        Ok(Self {
            session,
            input_name,
            output_name,
            input_shape: architecture.input_shape(),
            num_classes: architecture.output.num_classes,
        })
    }
}

impl GradeModel for OnnxGradeModel {
    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn infer(&self, input: Array4<f32>) -> Result<Vec<f32>, GraderError> {
        if input.shape() != &self.input_shape[..] {
            return Err(GraderError::ValidationError(format!(
                "Input tensor shape {:?} does not match model input {:?}",
                input.shape(),
                self.input_shape
            )));
        }

        let tensor = Tensor::from_array(input)
            .map_err(|e| GraderError::ModelError(format!("Failed to create input tensor: {}", e)))?;
        let mut input_tensors = HashMap::new();
        input_tensors.insert(self.input_name.as_str(), tensor);

        let outputs = self
            .session
            .run(input_tensors)
            .map_err(|e| GraderError::ModelError(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                GraderError::ModelError(format!("Failed to extract output tensor: {}", e))
            })?;

        let probabilities: Vec<f32> = output_tensor.iter().copied().collect();
        if probabilities.len() != self.num_classes {
            return Err(GraderError::PredictionError(format!(
                "Model produced {} values, expected {}",
                probabilities.len(),
                self.num_classes
            )));
        }
        Ok(probabilities)
    }
}

/// Validates the session's input/output structure against the architecture.
///
/// Dynamic dimensions (reported as negative values) match anything.
///
/// # Returns
/// The input and output tensor names to bind at inference time
fn validate_model(
    session: &Session,
    architecture: &ModelArchitecture,
) -> Result<(String, String), GraderError> {
    let input = match &architecture.input.name {
        Some(name) => session.inputs.iter().find(|i| &i.name == name).ok_or_else(|| {
            GraderError::ModelError(format!("Model has no input named '{}'", name))
        })?,
        None => session
            .inputs
            .first()
            .ok_or_else(|| GraderError::ModelError("Model has no inputs".to_string()))?,
    };
    match &input.input_type {
        ValueType::Tensor { dimensions, .. } => {
            check_input_dimensions(&input.name, dimensions, &architecture.input_shape())?
        }
        other => {
            return Err(GraderError::ModelError(format!(
                "Model input '{}' must be a tensor, found {:?}",
                input.name, other
            )))
        }
    }

    let output = match &architecture.output.name {
        Some(name) => session.outputs.iter().find(|o| &o.name == name).ok_or_else(|| {
            GraderError::ModelError(format!("Model has no output named '{}'", name))
        })?,
        None => session
            .outputs
            .first()
            .ok_or_else(|| GraderError::ModelError("Model has no outputs".to_string()))?,
    };
    match &output.output_type {
        ValueType::Tensor { dimensions, .. } => match dimensions.last() {
            Some(&classes) if classes > 0 && classes as usize != architecture.output.num_classes => {
                return Err(GraderError::ModelError(format!(
                    "Model output '{}' has {} classes, architecture declares {}",
                    output.name, classes, architecture.output.num_classes
                )))
            }
            None => {
                return Err(GraderError::ModelError(format!(
                    "Model output '{}' is a scalar",
                    output.name
                )))
            }
            _ => {}
        },
        other => {
            return Err(GraderError::ModelError(format!(
                "Model output '{}' must be a tensor, found {:?}",
                output.name, other
            )))
        }
    }

    Ok((input.name.clone(), output.name.clone()))
}

fn check_input_dimensions(
    name: &str,
    actual: &[i64],
    expected: &[usize; 4],
) -> Result<(), GraderError> {
    if actual.len() != expected.len() {
        return Err(GraderError::ModelError(format!(
            "Model input '{}' has rank {}, expected {} (NHWC)",
            name,
            actual.len(),
            expected.len()
        )));
    }
    for (axis, (&dim, &want)) in actual.iter().zip(expected.iter()).enumerate() {
        if dim > 0 && dim as usize != want {
            return Err(GraderError::ModelError(format!(
                "Model input '{}' dimension {} is {}, architecture expects {}",
                name, axis, dim, want
            )));
        }
    }
    Ok(())
}
