// src/strategy.rs

use crate::analyzer::resolve_attractions;
use crate::cli::Strategy;
use crate::error::MiningError;
use crate::model::*;
use crate::parser::parse_log;
use crate::partition::{partition_by_period, partition_into_batches};
use crate::workspace::RepoSpec;
use chrono::{Duration, NaiveDate};
use indicatif::ProgressBar;
use std::num::{NonZeroU32, NonZeroUsize};
use tracing::{info, warn};

/// Local working copy the checkpoints are replayed in.
pub trait Workspace {
    /// Makes the working copy match the remote default branch, recloning if
    /// it cannot be updated in place.
    fn sync(&mut self) -> anyhow::Result<()>;

    /// Raw `git log` export, oldest commit first.
    fn export_log(&mut self) -> anyhow::Result<String>;

    fn checkout(&mut self, hash: &str) -> anyhow::Result<()>;
}

/// Static analysis run against the current state of the working copy.
pub trait QualityAnalyzer {
    fn run(&mut self, version: &str, date: NaiveDate, contributors: usize) -> anyhow::Result<()>;

    /// Called once after the last checkpoint, whether it succeeded or not.
    fn finish(&mut self) {}
}

#[derive(Debug, Clone)]
pub struct StrategySettings {
    pub strategy: Strategy,
    pub interval: NonZeroU32,
    pub batch_size: NonZeroUsize,
    pub source_suffix: String,
}

/// One analysis run: which commit, under which version label and date, and
/// how many contributors it is credited with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub commit: CommitId,
    pub version: String,
    pub date: NaiveDate,
    pub contributors: usize,
}

impl Checkpoint {
    fn new(commit: &Commit, date: NaiveDate, contributors: usize) -> Self {
        Checkpoint {
            commit: commit.id,
            version: commit.short_hash().to_string(),
            date,
            contributors,
        }
    }
}

/// Consecutive days ending at `today`, one per checkpoint.
fn synthetic_dates(today: NaiveDate, count: usize) -> impl Iterator<Item = NaiveDate> {
    (0..count).map(move |i| today - Duration::days((count - 1 - i) as i64))
}

/// Picks the checkpoints for `settings.strategy`, in replay order.
pub fn plan_checkpoints(graph: &CommitGraph, settings: &StrategySettings, today: NaiveDate) -> Vec<Checkpoint> {
    match settings.strategy {
        Strategy::All => {
            let commits = graph.commits_chronological();
            commits
                .iter()
                .zip(synthetic_dates(today, commits.len()))
                .map(|(commit, date)| Checkpoint::new(commit, date, 1))
                .collect()
        }
        Strategy::Period => partition_by_period(graph, settings.interval)
            .iter()
            .filter_map(|bucket| {
                let earliest = bucket.earliest(graph)?;
                let date = bucket
                    .key
                    .start_date(settings.interval)
                    .unwrap_or_else(|| earliest.timestamp.date_naive());
                Some(Checkpoint::new(earliest, date, bucket.distinct_contributors(graph)))
            })
            .collect(),
        Strategy::Batch => {
            let attractions = resolve_attractions(graph);
            let events = attractions.sorted();
            let batches = partition_into_batches(&events, settings.batch_size);
            batches
                .iter()
                .zip(synthetic_dates(today, batches.len()))
                .map(|(batch, date)| Checkpoint::new(graph.commit(batch.representative()), date, batch.contributors()))
                .collect()
        }
        Strategy::Interest => {
            let attractions = resolve_attractions(graph);
            let events = attractions.sorted();
            events
                .iter()
                .zip(synthetic_dates(today, events.len()))
                .map(|(event, date)| Checkpoint::new(graph.commit(event.commit), date, event.attracted()))
                .collect()
        }
    }
}

/// Mines one repository end to end and returns how many checkpoints were
/// analysed.
pub fn mine_repository(
    repo: &RepoSpec,
    settings: &StrategySettings,
    workspace: &mut impl Workspace,
    analyzer: &mut impl QualityAnalyzer,
    today: NaiveDate,
) -> Result<usize, MiningError> {
    info!("Starting {} with strategy {:?}", repo, settings.strategy);

    workspace.sync().map_err(|e| MiningError::tool("clone", repo, e))?;
    let log = workspace.export_log().map_err(|e| MiningError::tool("git log", repo, e))?;
    let graph = parse_log(&log, &settings.source_suffix)?;
    if graph.is_empty() {
        warn!("{}: history export contains no commits, nothing to analyse", repo);
    } else {
        info!("{}: {} commits by {} contributors", repo, graph.len(), graph.contributors().len());
    }

    let checkpoints = plan_checkpoints(&graph, settings, today);
    let result = replay(repo, &graph, &checkpoints, workspace, analyzer);
    analyzer.finish();
    result?;

    info!("Finished {}", repo);
    Ok(checkpoints.len())
}

/// Runs the checkpoints strictly in order; the first failure stops the rest.
fn replay(
    repo: &RepoSpec,
    graph: &CommitGraph,
    checkpoints: &[Checkpoint],
    workspace: &mut impl Workspace,
    analyzer: &mut impl QualityAnalyzer,
) -> Result<(), MiningError> {
    let bar = ProgressBar::new(checkpoints.len() as u64);
    bar.set_message(format!("Analysing {}", repo));

    for (i, checkpoint) in checkpoints.iter().enumerate() {
        let commit = graph.commit(checkpoint.commit);
        info!(
            "Analysing commit {} ({}/{}) as of {} with {} contributors",
            checkpoint.version,
            i + 1,
            checkpoints.len(),
            checkpoint.date,
            checkpoint.contributors
        );

        workspace
            .checkout(&commit.hash)
            .map_err(|e| MiningError::tool(format!("checkout of {}", commit.hash), repo, e))?;
        analyzer
            .run(&checkpoint.version, checkpoint.date, checkpoint.contributors)
            .map_err(|e| MiningError::tool(format!("analysis of {}", commit.hash), repo, e))?;

        bar.inc(1);
    }

    bar.finish_with_message(format!("{} checkpoints analysed", checkpoints.len()));
    Ok(())
}
