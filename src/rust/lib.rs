//! Knee osteoarthritis severity grading served over HTTP.
//!
//! An X-ray image is resized to the model's input, normalized, and run
//! through an ONNX classifier that scores the five Kellgren-Lawrence grades.
//!
//! # Basic Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use kneegrade::{Grader, ModelArchitecture};
//!
//! let architecture = ModelArchitecture::from_file("assets/knee_osteoarthritis_architecture.json")?;
//! let grader = Grader::builder()
//!     .with_architecture(architecture)?
//!     .with_weights("models/knee_osteoarthritis.onnx")?
//!     .build()?;
//!
//! let bytes = std::fs::read("knee.png")?;
//! let result = grader.predict(&bytes)?;
//! println!("Grade {}: {}", result.grade, result.description);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! `Grader` is `Send + Sync` and cheap to clone; the server keeps a single
//! instance behind an `Arc` and runs every prediction on the blocking pool.

pub mod architecture;
pub mod config;
pub mod grader;
pub mod grades;
pub mod loader;
pub mod model_manager;
mod runtime;
pub mod server;
pub mod state;

pub use architecture::{InputSpec, ModelArchitecture, OutputSpec};
pub use config::{Args, ServiceConfig};
pub use grader::{
    GradeModel, GradeResult, Grader, GraderBuilder, GraderError, GraderInfo, ImagePreprocessor,
    OnnxGradeModel,
};
pub use grades::{describe, KlGrade, NUM_GRADES, UNKNOWN_GRADE};
pub use loader::{load_model, run_startup, StartupError};
pub use model_manager::{ModelError, ModelManager};
pub use runtime::{create_session_builder, RuntimeConfig};
pub use state::{LoadState, ModelState, StateError};
