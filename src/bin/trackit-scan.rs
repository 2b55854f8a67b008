use clap::Parser;
use log::{error, info};
use trackit_scan::cli::Args;
use trackit_scan::error::{AppRunError, ConfigError};
use trackit_scan::{init_logging, run};

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();

    if let Err(err) = init_logging(args.verbose) {
        eprintln!("Failed to initialize logger: {}", err);
    }
    info!(concat!("TrackIt Scan ", env!("CARGO_PKG_VERSION")));

    match run(args) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("Another scan station is already using this config file");
            Ok(())
        },
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
