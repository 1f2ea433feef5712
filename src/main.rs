//! prdgen - PRD generation chat CLI and streaming relay
//!
//! Main entry point: parses the CLI, loads configuration, and dispatches
//! to the chat, serve, or export command handlers.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prdgen::cli::{Cli, Commands};
use prdgen::commands;
use prdgen::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments first so --verbose can shape logging.
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { ref endpoint } => {
            tracing::info!("Starting interactive chat");
            if let Some(endpoint) = endpoint {
                tracing::debug!("Using relay endpoint override: {}", endpoint);
            }
            commands::chat::run_chat(config).await?;
            Ok(())
        }
        Commands::Serve { ref bind } => {
            tracing::info!("Starting relay endpoint");
            if let Some(bind) = bind {
                tracing::debug!("Using bind override: {}", bind);
            }
            commands::serve::run_serve(config).await?;
            Ok(())
        }
        Commands::Export {
            input,
            output,
            title,
            format,
        } => {
            tracing::info!("Exporting {} to {}", input.display(), output.display());
            commands::export::run_export(&input, &output, title, &format)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "prdgen=debug" } else { "prdgen=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
