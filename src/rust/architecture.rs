use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use crate::grades::NUM_GRADES;
use crate::model_manager::ModelError;

fn default_channels() -> u32 {
    3
}

/// Image tensor the model expects as its first input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    /// Graph input name; the first input is used when absent
    #[serde(default)]
    pub name: Option<String>,
    pub height: u32,
    pub width: u32,
    #[serde(default = "default_channels")]
    pub channels: u32,
}

/// Probability vector the model produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Graph output name; the first output is used when absent
    #[serde(default)]
    pub name: Option<String>,
    pub num_classes: usize,
}

/// Checked-in description of the trained artifact's interface.
///
/// The weights file itself is large and fetched on demand; this small JSON
/// document says what to expect from it so a mismatched download is caught at
/// startup rather than on the first request.
///
/// ```json
/// {
///   "name": "knee_osteoarthritis_vgg16",
///   "input": { "height": 224, "width": 224, "channels": 3 },
///   "output": { "num_classes": 5 },
///   "weights_file": "knee_osteoarthritis.onnx"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArchitecture {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub input: InputSpec,
    pub output: OutputSpec,
    /// File name of the weights inside the models directory
    pub weights_file: String,
    /// Optional lowercase hex SHA-256 of the weights file
    #[serde(default)]
    pub weights_sha256: Option<String>,
}

impl ModelArchitecture {
    /// Reads and validates an architecture description from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        log::info!("Loading architecture from {:?}", path);
        if !path.exists() {
            return Err(ModelError::ArchitectureNotFound(path.to_path_buf()));
        }
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let architecture: Self = serde_json::from_str(json)?;
        architecture.validate()?;
        Ok(architecture)
    }

    /// Checks the description is internally consistent and matches the grade table
    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |msg: String| Err(ModelError::InvalidArchitecture(msg));

        if self.name.trim().is_empty() {
            return invalid("Model name cannot be empty".into());
        }
        if self.input.height == 0 || self.input.width == 0 {
            return invalid(format!(
                "Input resolution must be non-zero, got {}x{}",
                self.input.width, self.input.height
            ));
        }
        if self.input.channels != 3 {
            return invalid(format!(
                "Input must have 3 color channels, got {}",
                self.input.channels
            ));
        }
        if self.output.num_classes != NUM_GRADES {
            return invalid(format!(
                "Output must have {} classes (one per grade), got {}",
                NUM_GRADES, self.output.num_classes
            ));
        }
        if self.weights_file.is_empty()
            || Path::new(&self.weights_file).file_name() != Some(OsStr::new(&self.weights_file))
        {
            return invalid(format!(
                "Weights file must be a plain file name, got '{}'",
                self.weights_file
            ));
        }
        if let Some(hash) = &self.weights_sha256 {
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return invalid(format!("Weights SHA-256 is not a 64-digit hex string: '{}'", hash));
            }
        }
        Ok(())
    }

    /// Shape of the single-image batch fed to the model: `[1, height, width, channels]`
    pub fn input_shape(&self) -> [usize; 4] {
        [
            1,
            self.input.height as usize,
            self.input.width as usize,
            self.input.channels as usize,
        ]
    }
}
