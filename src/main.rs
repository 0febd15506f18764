use kedada::cache::EventCache;
use kedada::config::env_loader::load_config;
use kedada::dipalme::api::DipalmeAPI;
use kedada::dipalme::client::DipalmeClient;
use kedada::server::listener::serve;
use kedada::server::routes::AppState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _loki = kedada::tracing::setup_loki().await;

    let config = load_config();
    info!("Loaded config: {:?}", config);

    let client = DipalmeClient::new(&config.fetch).expect("Error creating HTTP client");
    let api = DipalmeAPI::new(client, &config.site).expect("Invalid site URL");

    let cache = EventCache::new(Arc::new(api.clone()), config.cache.ttl);
    cache.warm_on_startup(config.cache.warmup_delay);

    let state = Arc::new(AppState::new(api, cache, config.cors_origins.clone()));

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .unwrap_or_else(|e| panic!("Couldn't bind port {}: {}", config.port, e));

    info!("Server running on port {}", config.port);
    info!("API available at http://localhost:{}/api/events", config.port);

    tokio::select! {
        result = serve(listener, state) => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
}
