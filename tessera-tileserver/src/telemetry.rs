//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::ServerError;

const DEFAULT_FILTER: &str = "tessera_tileserver=debug,tower_http=info,info";

/// Install the JSON tracing subscriber. Call once, before anything logs.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() -> Result<(), ServerError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| ServerError::Telemetry(e.to_string()))?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Telemetry initialized");
    Ok(())
}
