//! CLI definitions for ribbon-display.
//!
//! `ribbon-display` with no subcommand runs the appliance; `config` prints
//! the resolved configuration tree and exits.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Which local displays to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Displays {
    /// Terminal banner and OLED panel (default)
    #[default]
    All,
    /// Terminal banner only
    Terminal,
    /// OLED panel only
    Oled,
    /// No local display; producers and web servers only
    None,
}

impl Displays {
    pub fn terminal(self) -> bool {
        matches!(self, Displays::All | Displays::Terminal)
    }

    pub fn oled(self) -> bool {
        matches!(self, Displays::All | Displays::Oled)
    }
}

/// Clock, weather and system banner for a single-board computer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (JSON, or YAML by extension)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Assets directory (background image and boot sound)
    #[arg(long, global = true)]
    pub assets_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    /// Displays to drive
    #[arg(long, value_enum, default_value_t = Displays::All, global = true)]
    pub displays: Displays,

    /// Skip the HTTP listeners
    #[arg(long, global = true)]
    pub no_web: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the displays, producers and web servers (default)
    Run,

    /// Print the resolved configuration and exit
    Config {
        /// Print YAML instead of JSON
        #[arg(long)]
        yaml: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["ribbon-display"]).unwrap();
        assert_eq!(cli.log, "2");
        assert_eq!(cli.displays, Displays::All);
        assert!(cli.command.is_none());
        assert!(!cli.no_web);
    }

    #[test]
    fn test_config_subcommand_with_global_flags() {
        let cli = Cli::try_parse_from([
            "ribbon-display",
            "config",
            "--yaml",
            "--config",
            "/tmp/ribbon.yaml",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Command::Config { yaml: true }));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ribbon.yaml")));
    }

    #[test]
    fn test_display_selection() {
        let cli = Cli::try_parse_from(["ribbon-display", "--displays", "terminal"]).unwrap();
        assert!(cli.displays.terminal());
        assert!(!cli.displays.oled());
        assert!(!Displays::None.terminal());
    }
}
