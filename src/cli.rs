//! Command-line interface definition for prdgen
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for the relay endpoint, interactive chat, and
//! document export.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// prdgen - PRD generation chat CLI and streaming relay
///
/// Chat with a hosted Dify PRD workflow through a streaming relay
/// endpoint, or run the relay endpoint itself.
#[derive(Parser, Debug, Clone)]
#[command(name = "prdgen")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for prdgen
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive PRD chat session
    Chat {
        /// Override the relay endpoint URL from config
        #[arg(short, long)]
        endpoint: Option<String>,
    },

    /// Run the streaming relay endpoint
    Serve {
        /// Override the bind address from config (e.g. 0.0.0.0:8787)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Export a generated document to markdown or HTML
    Export {
        /// Path to a file holding the message content
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Document title
        #[arg(short, long)]
        title: Option<String>,

        /// Output format: markdown or html
        #[arg(short, long, default_value = "markdown")]
        format: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            command: Commands::Chat { endpoint: None },
        }
    }
}
