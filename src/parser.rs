// src/parser.rs

use crate::error::FormatError;
use crate::model::CommitGraph;
use chrono::{DateTime, TimeZone, Utc};
use std::borrow::Cow;
use tracing::debug;

/// Marks the first line of every commit in the export
pub const HEADER_PREFIX: &str = "commit:";

/// Separates the header fields, chosen not to show up in emails or hashes
pub const FIELD_DELIMITER: &str = "/////";

/// Lines git prints in between file names that are not file names
pub const WARNING_PREFIX: &str = "warning: ";

/// `git log` format string producing the headers this parser reads.
pub fn log_format() -> String {
    format!("{HEADER_PREFIX}%H{d}%at{d}%aE{d}%P", d = FIELD_DELIMITER)
}

/// Builds the commit graph from a `git log --reverse --name-only` export.
///
/// Commits are numbered in the order they appear, which the export guarantees
/// to be oldest first. A commit is code-bearing when one of its file lines ends
/// with `source_suffix`.
pub fn parse_log(log_text: &str, source_suffix: &str) -> Result<CommitGraph, FormatError> {
    let mut graph = CommitGraph::new();
    let mut current: Option<Header> = None;

    for (index, line) in log_text.lines().enumerate() {
        if line.is_empty() || line.starts_with(WARNING_PREFIX) {
            continue;
        }

        if line.starts_with(HEADER_PREFIX) {
            if let Some(header) = current.take() {
                header.commit_into(&mut graph);
            }
            current = Some(Header::parse(line, index + 1)?);
        } else if let Some(header) = current.as_mut() {
            if !header.code_bearing && unquote_path(line).ends_with(source_suffix) {
                header.code_bearing = true;
            }
        } else {
            debug!("Ignoring file line before first commit header: {}", line);
        }
    }

    if let Some(header) = current.take() {
        header.commit_into(&mut graph);
    }

    debug!("Parsed {} commits from {} contributors", graph.len(), graph.contributors().len());
    Ok(graph)
}

/// Undoes git's C-style quoting of unusual file names, `"caf\303\251.go"`
/// becoming `café.go`. Unquoted lines come back as they are.
fn unquote_path(line: &str) -> Cow<'_, str> {
    let Some(inner) = line.strip_prefix('"').and_then(|l| l.strip_suffix('"')) else {
        return Cow::Borrowed(line);
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut rest = inner.as_bytes();
    while let Some((&b, tail)) = rest.split_first() {
        rest = tail;
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        let Some((&escaped, tail)) = rest.split_first() else {
            bytes.push(b'\\');
            break;
        };
        rest = tail;
        match escaped {
            b'a' => bytes.push(0x07),
            b'b' => bytes.push(0x08),
            b'f' => bytes.push(0x0c),
            b'n' => bytes.push(b'\n'),
            b'r' => bytes.push(b'\r'),
            b't' => bytes.push(b'\t'),
            b'v' => bytes.push(0x0b),
            b'0'..=b'7' => {
                let mut value = u32::from(escaped - b'0');
                let mut digits = 1;
                while digits < 3 {
                    match rest.split_first() {
                        Some((&d @ b'0'..=b'7', tail)) => {
                            value = value * 8 + u32::from(d - b'0');
                            rest = tail;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                bytes.push((value & 0xff) as u8);
            }
            other => bytes.push(other),
        }
    }
    Cow::Owned(String::from_utf8_lossy(&bytes).into_owned())
}

/// A header line waiting for its file lines
struct Header {
    hash: String,
    timestamp: DateTime<Utc>,
    author: String,
    parent_hash: String,
    code_bearing: bool,
}

impl Header {
    fn parse(line: &str, line_no: usize) -> Result<Self, FormatError> {
        let fields: Vec<&str> = line[HEADER_PREFIX.len()..].split(FIELD_DELIMITER).collect();
        let &[hash, timestamp, author, parents] = fields.as_slice() else {
            return Err(FormatError::MalformedHeader {
                line: line_no,
                header: line.to_string(),
            });
        };

        let bad_timestamp = || FormatError::BadTimestamp {
            line: line_no,
            value: timestamp.to_string(),
        };
        let seconds: i64 = timestamp.trim().parse().map_err(|_| bad_timestamp())?;
        let timestamp = Utc.timestamp_opt(seconds, 0).single().ok_or_else(bad_timestamp)?;

        // Merge parents past the first are dropped.
        let parent_hash = parents.split(' ').next().unwrap_or_default().trim().to_string();

        Ok(Header {
            hash: hash.to_string(),
            timestamp,
            author: author.to_string(),
            parent_hash,
            code_bearing: false,
        })
    }

    fn commit_into(self, graph: &mut CommitGraph) {
        graph.push_commit(self.hash, self.parent_hash, self.timestamp, &self.author, self.code_bearing);
    }
}
