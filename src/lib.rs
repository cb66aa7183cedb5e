pub mod cli;
pub mod core;

use crate::core::config::AppConfig;
use anyhow::Result;
use rust_decimal::Decimal;
use tracing::{debug, info};

pub enum AppCommand {
    Convert(cli::convert::ConvertArgs),
    Currencies(cli::currencies::CurrenciesArgs),
}

/// Runs a command against the rates configured at `config_path`, or the
/// default config when none is given.
pub fn run_command(command: AppCommand, config_path: Option<&str>, verbosity: u8) -> Result<()> {
    info!("fxconv starting...");

    let config = AppConfig::load_or_default(config_path)?;
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Convert(args) => {
            if args.decimal || config.decimal {
                cli::convert::run::<Decimal>(&args, &config, verbosity)
            } else {
                cli::convert::run::<f64>(&args, &config, verbosity)
            }
        }
        AppCommand::Currencies(args) => cli::currencies::run(&args, &config),
    }
}
