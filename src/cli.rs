// src/cli.rs

use crate::strategy::StrategySettings;
use crate::workspace::RepoSpec;
use clap::{Parser, Subcommand};
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replays repository history through sonar-scanner, checkpointed by contributor lineage", long_about = None)]
pub struct Args {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyse the history of one or more repositories
    #[command(visible_alias = "a")]
    Analyse(AnalyseArgs),
}

#[derive(clap::Args, Debug)]
pub struct AnalyseArgs {
    /// Repositories to analyse, one after another
    #[arg(required = true, value_name = "NAMESPACE/PROJECT")]
    pub repositories: Vec<RepoSpec>,

    /// SonarQube token, provisioned from the server when missing
    #[arg(long = "sonarkey", env = "SONAR_TOKEN", hide_env_values = true)]
    pub sonar_token: Option<String>,

    /// SonarQube URL
    #[arg(long = "sonarurl", env = "SONAR_URL", default_value = "http://127.0.0.1:9000")]
    pub sonar_url: String,

    /// User for provisioning a token
    #[arg(long, default_value = "admin")]
    pub sonar_user: String,

    /// Password for provisioning a token
    #[arg(long, default_value = "admin", hide_default_value = true)]
    pub sonar_password: String,

    /// How history is split into checkpoints
    #[arg(long, value_enum, ignore_case = true, default_value_t = Strategy::Period)]
    pub strategy: Strategy,

    /// Period length in months for the PERIOD strategy
    #[arg(long, default_value = "6")]
    pub interval: NonZeroU32,

    /// Attraction events per checkpoint for the BATCH strategy
    #[arg(long = "batch", default_value = "20")]
    pub batch_size: NonZeroUsize,

    /// Files ending with this suffix make a commit code-bearing
    #[arg(long, default_value = ".go")]
    pub source_suffix: String,

    /// Directory holding the local clones [default: <tmp>/lineage-miner]
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Prefix of the clone URL, followed by /namespace/project
    #[arg(long, default_value = "https://github.com")]
    pub remote_base: String,

    /// Scanner container image
    #[arg(long, default_value = "sonarsource/sonar-scanner-cli:4.7")]
    pub scanner_image: String,

    /// Container runtime used to run the scanner
    #[arg(long, env = "DOCKER", default_value = "docker")]
    pub docker: String,
}

impl AnalyseArgs {
    pub fn strategy_settings(&self) -> StrategySettings {
        StrategySettings {
            strategy: self.strategy,
            interval: self.interval,
            batch_size: self.batch_size,
            source_suffix: self.source_suffix.clone(),
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Every commit, oldest first
    #[value(name = "ALL")]
    All,
    /// Earliest code commit of each calendar period
    #[value(name = "PERIOD")]
    Period,
    /// One checkpoint per fixed-size group of attraction events
    #[value(name = "BATCH")]
    Batch,
    /// One checkpoint per attraction event
    #[value(name = "INTEREST")]
    Interest,
}
