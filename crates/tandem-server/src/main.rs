use std::path::PathBuf;
use std::process::ExitCode;

use tandem_server::ServerConfig;

const DEFAULT_CONFIG: &str = "tandem.json";

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let config = match ServerConfig::load(&path).await {
        Ok(config) => config.with_env(),
        Err(e) => {
            log::error!("Failed to load {:?}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    log::info!("Tandem server starting...");
    match tandem_server::serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Server stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}
