// src/analyzer.rs

use crate::model::*;
use tracing::{debug, warn};

/// Finds, for every contributor, the commit whose state attracted them.
///
/// The starting point is the parent of the contributor's first code-bearing
/// commit. For anyone but the main contributor the walk keeps climbing first
/// parents until it reaches a commit written by somebody else. Contributors
/// whose ancestry is not fully present in the graph are skipped with a warning.
pub fn resolve_attractions(graph: &CommitGraph) -> Attractions {
    let mut attractions = Attractions::default();

    for contributor in graph.contributors() {
        let Some(first_code) = contributor.first_code_commit() else {
            continue;
        };
        let first_code = graph.commit(first_code);
        if first_code.is_root() {
            continue;
        }

        let Some(mut candidate) = graph.commit_by_hash(&first_code.parent_hash) else {
            warn!(
                "Missing parent commit {} of {} by {}, skipping contributor",
                first_code.parent_hash, first_code.hash, contributor.identifier
            );
            continue;
        };

        if !graph.is_main_contributor(contributor.id) {
            match walk_past_own_commits(graph, contributor, candidate) {
                Some(found) => candidate = found,
                None => continue,
            }
        }

        debug!("{} attracted by {}", contributor.identifier, candidate.short_hash());
        attractions.record(candidate, contributor.id);
    }

    if attractions.is_empty() {
        debug!("No contributor was attracted by another's commit");
    } else {
        debug!("Resolved {} attraction events", attractions.len());
    }
    attractions
}

fn walk_past_own_commits<'a>(
    graph: &'a CommitGraph,
    contributor: &Contributor,
    mut candidate: &'a Commit,
) -> Option<&'a Commit> {
    // Each step moves to a distinct commit, so a well formed history cannot
    // take more steps than there are commits.
    let mut steps = 0;

    while candidate.author == contributor.id {
        steps += 1;
        if candidate.is_root() || steps > graph.len() {
            warn!(
                "No ancestor of {} is authored by anyone but {}, skipping contributor",
                candidate.hash, contributor.identifier
            );
            return None;
        }

        match graph.commit_by_hash(&candidate.parent_hash) {
            Some(parent) => candidate = parent,
            None => {
                warn!(
                    "Missing parent commit {} of {} by {}, skipping contributor",
                    candidate.parent_hash, candidate.hash, contributor.identifier
                );
                return None;
            }
        }
    }

    Some(candidate)
}
