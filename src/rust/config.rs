use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::Parser;

use crate::model_manager::ModelManager;
use crate::runtime::RuntimeConfig;

pub const DEFAULT_ARCHITECTURE_PATH: &str = "assets/knee_osteoarthritis_architecture.json";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// Command-line flags; every option can also come from the environment.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Knee osteoarthritis grading server", long_about = None)]
pub struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, env = "KNEEGRADE_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Architecture description (JSON) of the model
    #[arg(long, env = "KNEEGRADE_ARCHITECTURE", default_value = DEFAULT_ARCHITECTURE_PATH)]
    pub architecture: PathBuf,

    /// Directory holding the downloaded weights [default: $KNEEGRADE_CACHE/models or the platform cache dir]
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// Where to fetch the weights from when they are not cached locally
    #[arg(long, env = "WEIGHTS_DOWNLOAD_URL")]
    pub weights_url: Option<String>,

    /// Largest accepted upload, in bytes
    #[arg(long, env = "KNEEGRADE_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: u64,

    /// ONNX Runtime intra-op threads (0 lets the runtime decide)
    #[arg(long, env = "KNEEGRADE_INTRA_THREADS", default_value_t = 0)]
    pub intra_threads: usize,

    /// Force a fresh download of the model weights
    #[arg(short, long)]
    pub fresh: bool,
}

/// Validated settings consumed by the loader and the HTTP server.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub architecture_path: PathBuf,
    pub models_dir: PathBuf,
    pub weights_url: Option<String>,
    pub max_upload_bytes: u64,
    pub runtime: RuntimeConfig,
    pub fresh: bool,
}

impl ServiceConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        ensure!(args.max_upload_bytes > 0, "--max-upload-bytes must be greater than zero");

        let weights_url = args
            .weights_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        ensure!(
            !args.fresh || weights_url.is_some(),
            "--fresh needs WEIGHTS_DOWNLOAD_URL (or --weights-url) to fetch the weights again"
        );

        Ok(Self {
            bind_addr: SocketAddr::new(args.host, args.port),
            architecture_path: args.architecture,
            models_dir: args
                .models_dir
                .unwrap_or_else(ModelManager::get_default_models_dir),
            weights_url,
            max_upload_bytes: args.max_upload_bytes,
            runtime: RuntimeConfig::with_intra_threads(args.intra_threads),
            fresh: args.fresh,
        })
    }
}
