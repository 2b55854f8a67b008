use std::path::PathBuf;
use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::config::types::{Config, CooldownScope};

#[derive(Debug, Parser)]
#[command(name = "trackit-scan", version, about = "TrackIt scan station: turns scanned codes into orders")]
pub struct Args {
    /// Config file to use instead of the portable or per-user one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output, including every dropped scan
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read scans from stdin (one per line) and submit them (default)
    Run(RunArgs),

    /// Inspect or change the config file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Default, ClapArgs)]
pub struct RunArgs {
    /// How long (milliseconds) a notification stays up before it is dismissed
    #[arg(long, default_value_t = 0)]
    pub ack_delay_ms: u64,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the current config (the auth token is masked)
    Show,

    /// Change one or more config values
    Set(ConfigSetArgs),
}

#[derive(Debug, Default, ClapArgs)]
pub struct ConfigSetArgs {
    #[arg(long)]
    pub api_url: Option<String>,

    #[arg(long)]
    pub owner: Option<String>,

    #[arg(long, conflicts_with = "clear_token")]
    pub token: Option<String>,

    #[arg(long)]
    pub clear_token: bool,

    #[arg(long)]
    pub cooldown_ms: Option<u64>,

    #[arg(long)]
    pub request_timeout_ms: Option<u64>,

    /// "global" or "per-code"
    #[arg(long)]
    pub cooldown_scope: Option<CooldownScope>,
}

impl ConfigSetArgs {
    pub fn apply(self, mut config: Config) -> Config {
        if let Some(api_url) = self.api_url {
            config.api_base_url = api_url;
        }
        if let Some(owner) = self.owner {
            config.owner_name = owner;
        }
        if let Some(token) = self.token {
            config.auth_token = Some(token);
        }
        if self.clear_token {
            config.auth_token = None;
        }
        if let Some(cooldown_ms) = self.cooldown_ms {
            config.cooldown_ms = cooldown_ms;
        }
        if let Some(request_timeout_ms) = self.request_timeout_ms {
            config.request_timeout_ms = request_timeout_ms;
        }
        if let Some(scope) = self.cooldown_scope {
            config.cooldown_scope = scope;
        }
        config
    }
}

pub fn masked(config: &Config) -> Config {
    Config {
        auth_token: config.auth_token.as_ref().map(|_| "********".to_string()),
        ..config.clone()
    }
}
