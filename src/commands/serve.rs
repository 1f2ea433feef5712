//! Relay endpoint command
//!
//! Thin wrapper that hands the loaded configuration to the relay server
//! and runs it until the process is stopped.

use crate::config::Config;
use crate::error::Result;
use crate::relay;

/// Run the relay endpoint.
///
/// # Errors
///
/// Returns error if the listener cannot be bound or the server fails.
pub async fn run_serve(config: Config) -> Result<()> {
    if config.upstream.api_key.is_empty() {
        tracing::warn!("Upstream API key is empty; upstream calls will likely be rejected");
    }

    relay::serve(&config.server, config.upstream).await
}
