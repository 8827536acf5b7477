use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "transformctl",
    author,
    version,
    about = "Replay scripted messages through a threaded pixel transform"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a TOML script of `[[steps]]` against a headless pipeline.
    Replay(ReplayArgs),
    /// Validate a configuration file and print the resolved settings.
    CheckConfig(CheckConfigArgs),
}

#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Script whose `[[steps]]` are posted in order.
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Configuration file; defaults to `transformctl.toml` in the config directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of caller threads the steps are spread over, round-robin.
    #[arg(
        long,
        value_name = "N",
        default_value_t = 1,
        value_parser = clap::value_parser!(u16).range(1..=256)
    )]
    pub threads: u16,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct CheckConfigArgs {
    /// Configuration file; defaults to `transformctl.toml` in the config directory.
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}
