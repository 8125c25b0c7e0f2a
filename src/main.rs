//! Wi-Fi light controller CLI
//!
//! `wifilight run` drives every configured controller; the other commands
//! talk to a single controller and exit.

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod cli;
use cli::{Cli, Commands};

mod commands;
use commands::Action;

use wifilight::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run => {
            let path = cli.config.unwrap_or_else(AppConfig::default_path);
            info!("Loading config from {:?}", path);
            commands::run(AppConfig::load(&path)?).await
        }
        Commands::Add {
            target,
            poll_interval,
        } => {
            let path = cli.config.unwrap_or_else(AppConfig::default_path);
            commands::add(&path, &target, poll_interval)
        }
        Commands::On { target } => commands::one_shot(&target, Action::On).await,
        Commands::Off { target } => commands::one_shot(&target, Action::Off).await,
        Commands::Color {
            color,
            transition,
            target,
        } => commands::one_shot(&target, Action::Color { color, transition }).await,
        Commands::Brightness {
            percent,
            transition,
            target,
        } => {
            commands::one_shot(
                &target,
                Action::Brightness {
                    percent,
                    transition,
                },
            )
            .await
        }
        Commands::Ct {
            kelvin,
            transition,
            target,
        } => commands::one_shot(&target, Action::Temperature { kelvin, transition }).await,
        Commands::Program {
            program,
            speed,
            target,
        } => commands::one_shot(&target, Action::Program { program, speed }).await,
        Commands::Command { text, target } => {
            commands::one_shot(&target, Action::Command(text)).await
        }
        Commands::Status { target } => commands::one_shot(&target, Action::Status).await,
        Commands::Pair { target } => commands::one_shot(&target, Action::Pair).await,
        Commands::Unpair { target } => commands::one_shot(&target, Action::Unpair).await,
    }
}
