//! Command-line interface definitions.
//!
//! Defines the publish-time arguments using clap.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use colored::Colorize;
use std::path::PathBuf;

use crate::{ProjectConfig, log, precompile_views};

/// Exit status when the publish folder or framework is missing.
pub const EXIT_MISSING_TARGET: u8 = 2;

/// Precompile the views of a published application into one module
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Project folder or `project.toml` (default: current directory)
    pub project: Option<PathBuf>,

    /// Publish folder of the application
    #[arg(short, long = "publish-folder")]
    pub publish_folder: Option<PathBuf>,

    /// Target framework of the publish
    #[arg(short, long)]
    pub framework: Option<String>,

    /// Build configuration
    #[arg(short, long, default_value = "Debug")]
    pub configuration: String,
}

impl Cli {
    /// Whether both required publish arguments were given.
    pub fn has_target(&self) -> bool {
        self.publish_folder.is_some() && self.framework.as_deref().is_some_and(|f| !f.is_empty())
    }
}

/// Run a build for parsed arguments and map the outcome to a process exit status.
pub fn exit_code(cli: &Cli) -> u8 {
    if !cli.has_target() {
        let _ = Cli::command().print_help();
        return EXIT_MISSING_TARGET;
    }

    match run(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{} {err:#}", "[error]".bright_red().bold());
            1
        }
    }
}

/// Load and validate configuration from CLI arguments, then build.
fn run(cli: &Cli) -> Result<()> {
    let mut config = ProjectConfig::load(cli.project.as_deref())?;
    config.update_with_cli(cli);
    config.validate()?;

    let report = precompile_views(&config)?;
    if let Some(debug_info) = &report.debug_info {
        log!("done"; "debug info written to {}", debug_info.display());
    }
    log!("done"; "fingerprint {}", report.fingerprint);
    Ok(())
}
