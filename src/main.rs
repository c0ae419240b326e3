mod config;
mod error;
mod shell;
mod terminal;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::error::ShellError;
use crate::shell::signal_handler::SignalHandler;
use crate::shell::Shell;

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = Config::from_env();
    if !config.color {
        colored::control::set_override(false);
    }

    SignalHandler::ignore_terminal_stops()
        .map_err(|source| ShellError::Setup {
            action: "sigaction",
            source,
        })
        .context("Failed to ignore terminal stop signals")?;

    let mut shell = Shell::from_stdio(&config).context("Failed to start shell")?;
    shell.run()?;

    Ok(())
}
