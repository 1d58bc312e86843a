use std::io;
use std::path::Path;

use log::{error, info};

use crate::architecture::ModelArchitecture;
use crate::config::ServiceConfig;
use crate::grader::Grader;
use crate::model_manager::{ModelError, ModelManager};
use crate::runtime::RuntimeConfig;
use crate::state::{ModelState, StateError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Attaches a local weights file to an architecture description.
///
/// Blocking: creates the ONNX Runtime session. Any deserialization or shape
/// mismatch is returned as an error; nothing is retried.
pub fn load_model(
    architecture: &ModelArchitecture,
    weights_path: &Path,
    runtime: &RuntimeConfig,
) -> Result<Grader, ModelError> {
    info!("--- Starting model loading process ---");
    let grader = Grader::builder()
        .with_runtime_config(runtime.clone())
        .with_architecture(architecture.clone())?
        .with_weights(weights_path)?
        .build()?;
    info!("--- Model loaded successfully ---");
    Ok(grader)
}

async fn prepare_grader(config: &ServiceConfig) -> Result<Grader, ModelError> {
    let architecture = ModelArchitecture::from_file(&config.architecture_path)?;
    let manager = ModelManager::new(&config.models_dir)?;

    if config.fresh {
        let has_url = config
            .weights_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty());
        if !has_url {
            return Err(ModelError::MissingDownloadUrl(
                manager.get_weights_path(&architecture),
            ));
        }
        info!("Fresh download requested - removing any cached weights...");
        manager.remove_download(&architecture)?;
    }

    let weights_path = manager
        .ensure_weights_present(&architecture, config.weights_url.as_deref())
        .await?;

    let runtime = config.runtime.clone();
    tokio::task::spawn_blocking(move || load_model(&architecture, &weights_path, &runtime))
        .await
        .map_err(io::Error::other)?
}

/// Runs the one-shot startup sequence and records its outcome in `state`.
///
/// `state` moves `UNINITIALIZED → LOADING` before any work starts and ends in
/// `READY` or `FAILED`. The error is also returned so the caller can log or
/// exit; the state already reflects it either way.
pub async fn run_startup(state: &ModelState, config: &ServiceConfig) -> Result<(), StartupError> {
    state.begin_loading().await?;

    match prepare_grader(config).await {
        Ok(grader) => {
            state.publish(Ok(grader)).await?;
            info!("Model ready to serve predictions");
            Ok(())
        }
        Err(e) => {
            error!("Application failed to start due to model loading error: {}", e);
            state.publish(Err(e.to_string())).await?;
            Err(e.into())
        }
    }
}
