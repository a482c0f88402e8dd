//! precompile-views - compile a published application's templates into one module.

use std::process::ExitCode;

use clap::Parser;
use precompile_views::cli::{Cli, exit_code};

fn main() -> ExitCode {
    ExitCode::from(exit_code(&Cli::parse()))
}
