use tracing::{error, info};

use rephraser::config::Config;
use rephraser::{logging, RephraseService};

#[tokio::main]
async fn main() {
    if let Err(message) = run().await {
        error!("{message}");
        eprintln!("{message}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let config = Config::load()?;
    config.ensure_dirs()?;
    let _logging = logging::initialize(&config.data_dir)?;

    let service = RephraseService::new(&config)?;
    service.start()?;
    info!("rephraser service started; waiting for hotkey activations");

    tokio::select! {
        _ = service.run() => {
            info!("activation channel closed; shutting down");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|error| format!("Failed to listen for shutdown signal: {error}"))?;
            info!("shutdown signal received");
        }
    }

    service.stop();
    Ok(())
}
