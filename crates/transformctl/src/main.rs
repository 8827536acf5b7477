mod bindings;
mod cli;
mod paths;
mod run;
mod script;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Replay(args) => run::replay(args),
        Command::CheckConfig(args) => run::check_config(args),
    }
}
