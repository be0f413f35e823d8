//! Decky Control Tool
//!
//! CLI for controlling the Decky daemon via D-Bus.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use decky_client::{BusType, DaemonClient};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum CliBusType {
    /// Try session bus first, fall back to system bus
    #[default]
    Auto,
    /// Use session bus (for user services)
    Session,
    /// Use system bus (for system services)
    System,
}

impl From<CliBusType> for BusType {
    fn from(bus: CliBusType) -> Self {
        match bus {
            CliBusType::Auto => BusType::Auto,
            CliBusType::Session => BusType::Session,
            CliBusType::System => BusType::System,
        }
    }
}

#[derive(Parser)]
#[command(name = "deckyctl")]
#[command(about = "Control tool for the Decky daemon")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// D-Bus bus type to use
    #[arg(long, default_value = "auto", value_enum)]
    bus: CliBusType,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon and deck status
    Status,
    /// Switch to a page, or show the current one
    Page {
        /// Page name (omit to show current)
        name: Option<String>,
    },
    /// List configured pages
    Pages,
    /// Set deck brightness
    Brightness {
        /// Brightness in percent (0-100)
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },
    /// Request daemon shutdown
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client = DaemonClient::connect_with_bus(cli.bus.into())
        .await
        .context("Failed to connect to daemon. Is deckyd running?")?;

    match cli.command {
        Commands::Status => {
            let connected = client.is_connected().await?;
            let page = client.current_page().await?;
            println!("Daemon: running");
            if connected {
                println!("Deck: {}", client.device_kind().await?);
            } else {
                println!("Deck: not connected");
            }
            println!("Page: {}", page);
        }
        Commands::Page { name: Some(name) } => {
            client.switch_page(&name).await?;
            println!("Switched to page: {}", name);
        }
        Commands::Page { name: None } => {
            println!("Current page: {}", client.current_page().await?);
        }
        Commands::Pages => {
            let current = client.current_page().await?;
            for page in client.list_pages().await? {
                let marker = if page == current { "*" } else { " " };
                println!("{} {}", marker, page);
            }
        }
        Commands::Brightness { percent } => {
            client.set_brightness(percent).await?;
            println!("Brightness set to: {}%", percent);
        }
        Commands::Quit => {
            client.quit().await?;
            println!("Shutdown request sent to daemon");
        }
    }

    Ok(())
}
