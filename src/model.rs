// src/model.rs

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

/// Position of a commit in parse order
pub type CommitId = usize;

/// Position of a contributor in encounter order
pub type ContributorId = usize;

/// A single commit as read from the log export
#[derive(Debug, Clone)]
pub struct Commit {
    pub id: CommitId,
    pub hash: String,
    /// First parent only, empty for a root commit
    pub parent_hash: String,
    pub timestamp: DateTime<Utc>,
    pub author: ContributorId,
    /// Touches at least one tracked source file
    pub code_bearing: bool,
}

impl Commit {
    pub fn is_root(&self) -> bool {
        self.parent_hash.is_empty()
    }

    /// Version label handed to the analyzer.
    pub fn short_hash(&self) -> &str {
        self.hash.get(..8).unwrap_or(&self.hash)
    }
}

/// An author and the commits attributed to it
#[derive(Debug, Clone)]
pub struct Contributor {
    pub id: ContributorId,
    /// Stable author identifier, usually an email
    pub identifier: String,
    /// In encounter order, not necessarily chronological
    pub commits: Vec<CommitId>,
    first_commit: Option<CommitId>,
    first_code_commit: Option<CommitId>,
}

impl Contributor {
    fn new(id: ContributorId, identifier: String) -> Self {
        Contributor {
            id,
            identifier,
            commits: Vec::new(),
            first_commit: None,
            first_code_commit: None,
        }
    }

    /// Chronologically earliest commit of this contributor.
    #[cfg(test)]
    pub fn first_commit(&self) -> Option<CommitId> {
        self.first_commit
    }

    /// First code-bearing commit in encounter order.
    pub fn first_code_commit(&self) -> Option<CommitId> {
        self.first_code_commit
    }
}

/// Arena of commits and contributors for one repository.
///
/// Commits and contributors refer to each other through ids, lookups by hash
/// and author identifier go through the two indexes.
#[derive(Debug, Default)]
pub struct CommitGraph {
    commits: Vec<Commit>,
    contributors: Vec<Contributor>,
    by_hash: HashMap<String, CommitId>,
    by_identifier: HashMap<String, ContributorId>,
}

impl CommitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a commit, registering its author on first sight.
    pub fn push_commit(
        &mut self,
        hash: String,
        parent_hash: String,
        timestamp: DateTime<Utc>,
        author_identifier: &str,
        code_bearing: bool,
    ) -> CommitId {
        let author = self.contributor_entry(author_identifier);
        let id = self.commits.len();

        self.by_hash.insert(hash.clone(), id);
        self.commits.push(Commit { id, hash, parent_hash, timestamp, author, code_bearing });

        let earlier = match self.contributors[author].first_commit {
            Some(current) => timestamp < self.commits[current].timestamp,
            None => true,
        };

        let contributor = &mut self.contributors[author];
        contributor.commits.push(id);
        if earlier {
            contributor.first_commit = Some(id);
        }
        if contributor.first_code_commit.is_none() && code_bearing {
            contributor.first_code_commit = Some(id);
        }

        id
    }

    fn contributor_entry(&mut self, identifier: &str) -> ContributorId {
        if let Some(&id) = self.by_identifier.get(identifier) {
            return id;
        }
        let id = self.contributors.len();
        self.contributors.push(Contributor::new(id, identifier.to_string()));
        self.by_identifier.insert(identifier.to_string(), id);
        id
    }

    pub fn commit(&self, id: CommitId) -> &Commit {
        &self.commits[id]
    }

    #[cfg(test)]
    pub fn contributor(&self, id: ContributorId) -> &Contributor {
        &self.contributors[id]
    }

    pub fn commit_by_hash(&self, hash: &str) -> Option<&Commit> {
        self.by_hash.get(hash).map(|&id| &self.commits[id])
    }

    #[cfg(test)]
    pub fn contributor_by_identifier(&self, identifier: &str) -> Option<&Contributor> {
        self.by_identifier.get(identifier).map(|&id| &self.contributors[id])
    }

    /// Commits in parse order.
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    pub fn contributors(&self) -> &[Contributor] {
        &self.contributors
    }

    /// All commits ordered by timestamp, ties kept in parse order.
    pub fn commits_chronological(&self) -> Vec<&Commit> {
        let mut commits: Vec<&Commit> = self.commits.iter().collect();
        commits.sort_by_key(|c| c.timestamp);
        commits
    }

    /// The author of the chronologically first commit is rooted at an
    /// orphan commit.
    pub fn is_main_contributor(&self, id: ContributorId) -> bool {
        self.contributors[id]
            .first_commit
            .is_some_and(|first| self.commits[first].is_root())
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

/// A commit together with the contributors its state attracted
#[derive(Debug, Clone)]
pub struct AttractionEvent {
    pub commit: CommitId,
    pub contributors: BTreeSet<ContributorId>,
}

impl AttractionEvent {
    pub fn new(commit: CommitId) -> Self {
        AttractionEvent { commit, contributors: BTreeSet::new() }
    }

    pub fn attracted(&self) -> usize {
        self.contributors.len()
    }
}

/// Attraction events keyed by the hash of their commit.
#[derive(Debug, Default)]
pub struct Attractions {
    events: HashMap<String, AttractionEvent>,
}

impl Attractions {
    pub fn record(&mut self, commit: &Commit, contributor: ContributorId) {
        self.events
            .entry(commit.hash.clone())
            .or_insert_with(|| AttractionEvent::new(commit.id))
            .contributors
            .insert(contributor);
    }

    #[cfg(test)]
    pub fn get(&self, hash: &str) -> Option<&AttractionEvent> {
        self.events.get(hash)
    }

    /// Events in ascending commit id, the replay order for every strategy.
    pub fn sorted(&self) -> Vec<&AttractionEvent> {
        let mut events: Vec<&AttractionEvent> = self.events.values().collect();
        events.sort_by_key(|e| e.commit);
        events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
