use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gigsync::config::{CliOverrides, GigsyncConfig, LogFormat};
use gigsync::gigs::Identity;

mod cmd;

#[derive(Parser)]
#[command(name = "gigsync")]
#[command(version, about = "Keep manager and gent gig lists in sync with the gig backend")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Backend base URL. Overrides gigsync.toml and GIGSYNC_BASE_URL.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Log output format (pretty or json)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List gigs as the manager or as one gent
    List {
        /// Identity to list as: "manager" or a gent id
        #[arg(long = "as", default_value = "manager")]
        identity: Identity,
    },
    /// Create a gig (defaults: today, placeholder client, no fee)
    Create {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        email: Option<String>,
        /// Fee in cents
        #[arg(long)]
        fee: Option<i64>,
    },
    /// Edit a gig; only changed fields are sent
    Edit {
        id: String,
        #[arg(long = "as", default_value = "manager")]
        identity: Identity,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        email: Option<String>,
        /// Fee in cents
        #[arg(long)]
        fee: Option<i64>,
    },
    /// Assign a gent to a gig, or remove the assignment
    Assign {
        gig: String,
        gent: String,
        #[arg(long)]
        remove: bool,
    },
    /// Show whether a gent currently has assigned work
    State { gent: String },
    /// Follow a gig list live, reprinting it whenever the server pushes a change
    Watch {
        #[arg(long = "as", default_value = "manager")]
        identity: Identity,
    },
    /// Run the in-memory development backend
    Serve {
        /// Port to listen on (defaults to devserver.port)
        #[arg(long)]
        port: Option<u16>,
        /// Bind 0.0.0.0 and allow any CORS origin
        #[arg(long)]
        dev: bool,
    },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration and where it came from
    Show,
    /// Write a default .gigsync/gigsync.toml in the project directory
    Init {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let overrides = CliOverrides {
        base_url: cli.base_url.clone(),
        log_format: cli.log_format,
        verbose: cli.verbose,
    };
    let (config, config_path) = GigsyncConfig::resolve(&project_dir, &overrides)
        .context("Failed to load gigsync configuration")?;
    let _log_guard = gigsync::logging::init(&config.logging)?;

    match cli.command {
        Commands::List { identity } => cmd::cmd_list(&config, identity).await?,
        Commands::Create { date, email, fee } => {
            cmd::cmd_create(&config, date, email, fee).await?
        }
        Commands::Edit {
            id,
            identity,
            date,
            email,
            fee,
        } => cmd::cmd_edit(&config, &id, identity, date, email, fee).await?,
        Commands::Assign { gig, gent, remove } => {
            cmd::cmd_assign(&config, &gig, &gent, !remove).await?
        }
        Commands::State { gent } => cmd::cmd_state(&config, &gent).await?,
        Commands::Watch { identity } => cmd::cmd_watch(&config, identity).await?,
        Commands::Serve { port, dev } => cmd::cmd_serve(&config, port, dev).await?,
        Commands::Config { command } => {
            cmd::cmd_config(&project_dir, &config, config_path.as_deref(), command)?
        }
    }

    Ok(())
}
