// src/partition.rs

use crate::model::*;
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashSet};
use std::num::{NonZeroU32, NonZeroUsize};

/// Calendar slot of `interval` months within a year
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeriodKey {
    pub year: i32,
    pub period: u32,
}

impl PeriodKey {
    pub fn of(commit: &Commit, interval: NonZeroU32) -> Self {
        PeriodKey {
            year: commit.timestamp.year(),
            period: commit.timestamp.month0() / interval.get(),
        }
    }

    /// First day of the period.
    pub fn start_date(&self, interval: NonZeroU32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.period * interval.get() + 1, 1)
    }
}

/// Code-bearing commits falling into one period
#[derive(Debug, Clone)]
pub struct PeriodBucket {
    pub key: PeriodKey,
    pub commits: Vec<CommitId>,
}

impl PeriodBucket {
    /// The chronologically earliest member, the bucket's checkpoint.
    pub fn earliest<'a>(&self, graph: &'a CommitGraph) -> Option<&'a Commit> {
        self.commits.iter().map(|&id| graph.commit(id)).min_by_key(|c| (c.timestamp, c.id))
    }

    pub fn distinct_contributors(&self, graph: &CommitGraph) -> usize {
        self.commits
            .iter()
            .map(|&id| graph.commit(id))
            .filter(|c| c.code_bearing)
            .map(|c| c.author)
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Groups code-bearing commits into buckets of `interval` months, oldest
/// bucket first. Commits without tracked source changes are left out.
pub fn partition_by_period(graph: &CommitGraph, interval: NonZeroU32) -> Vec<PeriodBucket> {
    let mut buckets: BTreeMap<PeriodKey, Vec<CommitId>> = BTreeMap::new();

    for commit in graph.commits().iter().filter(|c| c.code_bearing) {
        buckets.entry(PeriodKey::of(commit, interval)).or_default().push(commit.id);
    }

    buckets
        .into_iter()
        .map(|(key, commits)| PeriodBucket { key, commits })
        .collect()
}

/// A run of consecutive attraction events analysed as one checkpoint
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub events: &'a [&'a AttractionEvent],
}

impl<'a> Batch<'a> {
    /// Commit of the first event in the batch.
    pub fn representative(&self) -> CommitId {
        self.events[0].commit
    }

    pub fn contributors(&self) -> usize {
        self.events.iter().map(|e| e.attracted()).sum()
    }
}

/// Splits events, already sorted by commit id, into runs of `size`; only the
/// last run may be shorter.
pub fn partition_into_batches<'a>(
    events: &'a [&'a AttractionEvent],
    size: NonZeroUsize,
) -> Vec<Batch<'a>> {
    events.chunks(size.get()).map(|events| Batch { events }).collect()
}
