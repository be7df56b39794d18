use anyhow::Result;
use clap::Parser;

mod subscribe_logic;
use subscribe_logic::config::{Cli, Command};
use subscribe_logic::{config, logger, runner};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Subscribe(args) => {
            let (mut config, source) = config::load_config(cli.config.as_deref())?;
            config.apply(&args);

            let log_path = logger::setup_logging(&config.log)?;
            match source {
                Some(path) => log::info!("Configuration loaded from {}", path.display()),
                None => log::info!("No {} found, using defaults and environment/CLI values.", config::CONFIG_FILE),
            }
            log::info!("Logging to {}", log_path.display());

            runner::run(&config).await?;
        }
    }

    log::info!("Shutdown complete.");
    Ok(())
}
