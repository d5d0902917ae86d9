pub mod commands;
pub mod utils;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config;
use crate::services::Services;
use crate::storage::FileTokenStore;

#[derive(Parser)]
#[command(name = "billo")]
#[command(about = "Billo CLI - staff sign-in, profiles, tabs and menus")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Sign in, sign out and account management")]
    Auth {
        #[command(subcommand)]
        cmd: commands::auth::AuthCommands,
    },

    #[command(about = "Current user's profile")]
    Profile {
        #[command(subcommand)]
        cmd: commands::profile::ProfileCommands,
    },

    #[command(about = "Tabs opened by the signed-in user")]
    Tabs,

    #[command(about = "Available menu items of a restaurant")]
    Menu {
        #[arg(help = "Restaurant id")]
        restaurant: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Services over the configured backend, with the session kept on disk
fn connect() -> anyhow::Result<Services> {
    let config = config::config();
    let store = FileTokenStore::from_config(config)?;
    tracing::debug!("Using token store at {}", store.path().display());
    Ok(Services::connect(config, Arc::new(store))?)
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let services = connect()?;

    let result = match cli.command {
        Commands::Auth { cmd } => commands::auth::handle(cmd, &services, output_format).await,
        Commands::Profile { cmd } => commands::profile::handle(cmd, &services, output_format).await,
        Commands::Tabs => commands::data::tabs(&services, output_format).await,
        Commands::Menu { restaurant } => commands::data::menu(&restaurant, &services, output_format).await,
    };

    services.shutdown();
    result
}
