use std::env;
use std::sync::Arc;
use std::time::Duration;
use log::{info, warn};
use tokio::io::BufReader;

use crate::api::HttpOrderApi;
use crate::cli::{masked, Args, Command, ConfigCommand, RunArgs};
use crate::config::io::{get_config_path, ConfigIO};
use crate::error::{AppRunError, ConfigError};
use crate::scan::controller::ScanControllerSettings;
use crate::station::run_station;

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod scan;
pub mod station;

pub fn init_logging(verbose: bool) -> Result<(), fern::InitError> {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        // reqwest and friends are noisy at debug
        .level_for("hyper", log::LevelFilter::Info)
        .level_for("hyper_util", log::LevelFilter::Info)
        .level_for("rustls", log::LevelFilter::Info)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(fern::log_file(log_file)?);
    }

    dispatch.apply()?;
    Ok(())
}

async fn run_command(args: Args) -> Result<(), AppRunError> {
    let path = get_config_path(args.config.as_deref())?;
    let config_io = ConfigIO::open(path)?;

    // one station per config file
    let mut locker = config_io.locker()?;
    let _lock_guard = locker.lock()?;

    let config = config_io.read().await?;

    match args.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(run_args) => {
            config.validate()?;
            if config.owner_name.is_empty() {
                warn!("No owner name configured, orders will be created without one");
            }
            if config.auth_token.is_none() {
                warn!("No auth token configured");
            }

            let api = Arc::new(HttpOrderApi::new(&config)?);
            let input = BufReader::new(tokio::io::stdin());
            info!("Ready for scans (cooldown {} ms, {} scope)", config.cooldown_ms, config.cooldown_scope);

            let summary = run_station(
                api,
                ScanControllerSettings::from(&config),
                Duration::from_millis(run_args.ack_delay_ms),
                input,
            ).await?;

            let succeeded = summary.notifications.iter().filter(|n| n.is_success()).count();
            info!(
                "Station stopped: {} scans, {} orders created, {} failed",
                summary.scans,
                succeeded,
                summary.notifications.len() - succeeded,
            );
        },
        Command::Config(ConfigCommand::Show) => {
            let content = serde_json::to_string_pretty(&masked(&config)).map_err(ConfigError::from)?;
            println!("{}", config_io.path().to_string_lossy());
            println!("{}", content);
        },
        Command::Config(ConfigCommand::Set(set)) => {
            let updated = set.apply(config);
            // fail early instead of at the next run
            updated.validate()?;
            HttpOrderApi::new(&updated)?;
            config_io.save(&updated).await?;
        },
    }

    Ok(())
}

pub fn run(args: Args) -> Result<(), AppRunError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| AppRunError::Runtime { source })?;

    runtime.block_on(run_command(args))
}
