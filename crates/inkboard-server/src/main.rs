//! Inkboard relay server binary.

use inkboard_server::ServerConfig;
use tracing::error;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkboard_server=info,tower_http=info".into()),
        )
        .init();

    if let Err(e) = inkboard_server::run(ServerConfig::from_env()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
