use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};

use kneegrade::{run_startup, server, Args, ModelState, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = ServiceConfig::from_args(args)?;

    info!("=== Starting Knee Osteoarthritis Grading Server ===");
    info!("Architecture: {}", config.architecture_path.display());
    info!("Models directory: {}", config.models_dir.display());
    if config.weights_url.is_none() {
        warn!("WEIGHTS_DOWNLOAD_URL is not set; weights must already be cached");
    }

    let state = ModelState::new();

    let loader_state = state.clone();
    let loader_config = config.clone();
    tokio::spawn(async move {
        if let Err(e) = run_startup(&loader_state, &loader_config).await {
            error!("Model unavailable, predictions will return 503: {}", e);
        }
    });

    let routes = server::routes(state, config.max_upload_bytes);
    info!("Listening on http://{}", config.bind_addr);
    warp::serve(routes).run(config.bind_addr).await;

    Ok(())
}
