use lazy_static::lazy_static;
use std::{env, io};
use tokio::task::JoinHandle;
use tracing::{info, warn, Level};
use tracing_loki::url::Url;
use tracing_loki::{BackgroundTask, BackgroundTaskController};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter, fmt};

lazy_static! {
    static ref LOKI_URL: Option<String> = env::var("LOKI_URL").ok();
}

fn build_loki_layer(
    base_url: Url,
) -> Result<(tracing_loki::Layer, BackgroundTaskController, BackgroundTask), tracing_loki::Error> {
    tracing_loki::builder()
        .label("service", "kedada")
        .and_then(|builder| builder.build_controller_url(base_url))
}

/// Logs to stdout, and to Loki as well when `LOKI_URL` is set and reachable
pub async fn setup_loki() -> Option<(BackgroundTaskController, JoinHandle<()>)> {
    let filter = filter::Targets::new()
        .with_target("kedada", Level::TRACE)
        .with_default(Level::WARN);

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stdout));

    match LOKI_URL.as_ref() {
        None => {
            registry.init();
            warn!("Loki URL not provided. Continuing without it.");
        }
        Some(base_url) => {
            let base_url: Url = match base_url.parse() {
                Ok(url) => url,
                Err(e) => {
                    registry.init();
                    warn!("Invalid Loki URL ({}). Continuing without it.", e);
                    return None;
                }
            };

            if let Err(e) = reqwest::get(base_url.clone()).await {
                registry.init();
                warn!("Couldn't connect to Loki ({}). Continuing without it.", e);
                return None;
            }

            match build_loki_layer(base_url) {
                Ok((layer, controller, task)) => {
                    registry.with(layer).init();
                    let handle = tokio::spawn(task);

                    info!("Loki initialized");

                    return Some((controller, handle));
                }
                Err(e) => {
                    registry.init();
                    warn!("Couldn't build the Loki layer ({}). Continuing without it.", e);
                }
            };
        }
    };

    None
}
