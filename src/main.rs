// src/main.rs

mod analyzer;
mod cli;
mod error;
mod model;
mod parser;
mod partition;
mod sonar;
mod strategy;
mod workspace;

use chrono::Utc;
use clap::Parser;
use cli::{AnalyseArgs, Args, Commands};
use error::MiningError;
use sonar::{ScannerSettings, SonarScanner};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use workspace::Session;

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let start_time = Instant::now();
    let result = match args.command {
        Commands::Analyse(analyse_args) => analyse(analyse_args),
    };
    info!("Total time: {:.2?}", start_time.elapsed());

    match result {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            error!("{} repositories failed", failed);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Mines every repository in turn and returns how many of them failed.
fn analyse(args: AnalyseArgs) -> Result<usize, MiningError> {
    let settings = args.strategy_settings();

    let base_dir = args.workdir.clone().unwrap_or_else(Session::default_base_dir);
    let session = Session::new(base_dir, args.remote_base.clone())
        .map_err(|e| MiningError::Configuration(format!("{:#}", e)))?;

    let token = match args.sonar_token.clone() {
        Some(token) => token,
        None => sonar::request_token(&args.sonar_url, &args.sonar_user, &args.sonar_password).map_err(|e| {
            MiningError::Configuration(format!("token not provided, failed to create one: {:#}", e))
        })?,
    };
    let scanner_settings = ScannerSettings {
        host_url: args.sonar_url.clone(),
        token,
        image: args.scanner_image.clone(),
        docker: args.docker.clone(),
    };

    let today = Utc::now().date_naive();
    let mut failed = 0;

    for repo in &args.repositories {
        let mut workspace = session.workspace(repo);
        let mut scanner = SonarScanner::new(repo, &scanner_settings, workspace.dir().to_path_buf());

        match strategy::mine_repository(repo, &settings, &mut workspace, &mut scanner, today) {
            Ok(count) => info!("{}: {} checkpoints analysed", repo, count),
            Err(e) if e.is_fatal_for_run() => return Err(e),
            Err(e) => {
                error!("{}", e);
                failed += 1;
            }
        }
    }

    Ok(failed)
}
