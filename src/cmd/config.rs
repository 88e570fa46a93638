//! Configuration view and bootstrap commands — `gigsync config`.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use gigsync::config::{CONFIG_DIR, CONFIG_FILE, GigsyncConfig};

use super::super::ConfigCommands;

pub fn cmd_config(
    project_dir: &Path,
    effective: &GigsyncConfig,
    loaded_from: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", style("gigsync configuration").bold().cyan());
            println!();
            match loaded_from {
                Some(path) => println!("Config file: {}", path.display()),
                None => {
                    println!("No gigsync.toml found; using defaults.");
                    println!("Searched:");
                    for path in GigsyncConfig::search_paths(project_dir) {
                        println!("  {}", style(path.display()).dim());
                    }
                }
            }
            println!();
            println!("Effective values (with env/CLI overrides):");
            println!();
            let rendered =
                toml::to_string_pretty(effective).context("Failed to render configuration")?;
            print!("{}", rendered);
            println!();
        }
        Some(ConfigCommands::Init { force }) => {
            let config_path = project_dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.exists() && !force {
                println!("gigsync.toml already exists at {}", config_path.display());
                println!("Pass --force to overwrite it.");
                return Ok(());
            }

            GigsyncConfig::default().save(&config_path)?;

            println!(
                "{} {}",
                style("Created").green().bold(),
                config_path.display()
            );
            println!();
            println!("You can now customize:");
            println!("  - [server] base_url, request_timeout_secs");
            println!("  - [seed] placeholder_email");
            println!("  - [logging] level, format, file");
            println!("  - [devserver] port, gents");
            println!();
        }
    }

    Ok(())
}
