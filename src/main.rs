//! Ribbon display
//!
//! Clock, weather and system banner for a terminal and a small OLED panel,
//! configured from a web page.

use anyhow::Result;
use clap::Parser;
use ribbon_display::app::{App, AppOptions};
use ribbon_display::cli::{Cli, Command};
use ribbon_display::config::{Config, ConfigStore};
use ribbon_display::logging::{self, LogTarget};
use ribbon_display::paths::AppPaths;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let mut paths = AppPaths::discover();
    if let Some(config) = &cli.config {
        paths = paths.with_config_file(config);
    }
    if let Some(assets_dir) = &cli.assets_dir {
        paths.assets_dir = assets_dir.clone();
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Config { yaml } => {
            let config = ConfigStore::load(&paths.config_file, &Config::defaults_for(&paths));
            let text = if yaml {
                serde_yaml::to_string(&config)?
            } else {
                serde_json::to_string_pretty(&config)?
            };
            println!("{text}");
            Ok(())
        }
        Command::Run => {
            let options = AppOptions {
                displays: cli.displays,
                web: !cli.no_web,
                ..AppOptions::default()
            };
            let app = App::start(paths, options).await?;
            app.run_until_signal().await
        }
    }
}
