// src/workspace.rs

use crate::parser;
use crate::strategy::Workspace;
use anyhow::{bail, Context, Result};
use git2::build::CheckoutBuilder;
use git2::{Direction, Oid, Repository};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::{debug, info};

/// A repository given as `namespace/project`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    pub namespace: String,
    pub project: String,
}

impl RepoSpec {
    /// Key the analysis service files results under.
    pub fn project_key(&self) -> String {
        format!("{}:{}", self.namespace, self.project)
    }
}

impl FromStr for RepoSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [namespace, project] if !namespace.is_empty() && !project.is_empty() => Ok(RepoSpec {
                namespace: namespace.to_string(),
                project: project.to_string(),
            }),
            _ => Err(format!("'{}' must be in format namespace/project", s)),
        }
    }
}

impl fmt::Display for RepoSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.project)
    }
}

/// Where local clones live and where they are cloned from, for one run.
#[derive(Debug, Clone)]
pub struct Session {
    base_dir: PathBuf,
    remote_base: String,
}

impl Session {
    pub fn new(base_dir: PathBuf, remote_base: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create work directory {:?}", base_dir))?;
        debug!("Using work directory {:?}", base_dir);
        Ok(Session { base_dir, remote_base: remote_base.into() })
    }

    pub fn default_base_dir() -> PathBuf {
        std::env::temp_dir().join("lineage-miner")
    }

    pub fn namespace_dir(&self, repo: &RepoSpec) -> PathBuf {
        self.base_dir.join(&repo.namespace)
    }

    pub fn project_dir(&self, repo: &RepoSpec) -> PathBuf {
        self.namespace_dir(repo).join(&repo.project)
    }

    pub fn clone_url(&self, repo: &RepoSpec) -> String {
        format!("{}/{}/{}", self.remote_base.trim_end_matches('/'), repo.namespace, repo.project)
    }

    pub fn workspace(&self, repo: &RepoSpec) -> GitWorkspace {
        GitWorkspace {
            dir: self.project_dir(repo),
            url: self.clone_url(repo),
        }
    }
}

/// Local working copy of one repository
#[derive(Debug)]
pub struct GitWorkspace {
    dir: PathBuf,
    url: String,
}

impl GitWorkspace {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Brings an existing clone up to the remote default branch, throwing away
    /// local changes.
    fn update(&self) -> Result<()> {
        let repo = Repository::open(&self.dir)
            .with_context(|| format!("No local clone at {:?}", self.dir))?;
        let mut remote = repo.find_remote("origin")?;

        remote.connect(Direction::Fetch)?;
        let default_branch = remote.default_branch()?;
        let default_branch = default_branch
            .as_str()
            .context("Remote default branch is not valid UTF-8")?
            .to_string();
        remote.disconnect()?;

        remote
            .fetch(&[] as &[&str], None, None)
            .with_context(|| format!("Failed to fetch {}", self.url))?;

        let branch = default_branch.strip_prefix("refs/heads/").unwrap_or(&default_branch);
        let tip = repo
            .refname_to_id(&format!("refs/remotes/origin/{}", branch))
            .with_context(|| format!("Remote branch {} not found after fetch", branch))?;
        let commit = repo.find_commit(tip)?;

        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force().remove_untracked(true)))?;
        repo.set_head_detached(tip)?;
        debug!("Updated {:?} to {} ({})", self.dir, tip, branch);
        Ok(())
    }

    fn force_clone(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)
                .with_context(|| format!("Failed to remove stale clone {:?}", self.dir))?;
        }
        if let Some(parent) = self.dir.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        Repository::clone(&self.url, &self.dir)
            .with_context(|| format!("Failed to clone {} into {:?}", self.url, self.dir))?;
        Ok(())
    }
}

impl Workspace for GitWorkspace {
    fn sync(&mut self) -> Result<()> {
        if let Err(e) = self.update() {
            info!("Local clone unusable ({:#}), cloning {} from scratch", e, self.url);
            return self.force_clone();
        }
        Ok(())
    }

    fn export_log(&mut self) -> Result<String> {
        // Without quotepath=off git prints non-ASCII paths as quoted octal
        // escapes, which hides their suffix.
        let output = Command::new("git")
            .args(["-c", "core.quotepath=off", "log"])
            .arg(format!("--format={}", parser::log_format()))
            .arg("--reverse")
            .arg("--name-only")
            .current_dir(&self.dir)
            .output()
            .context("Failed to execute git log")?;

        if !output.status.success() {
            bail!(
                "git log exited with {} in {:?}: {}",
                output.status,
                self.dir,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn checkout(&mut self, hash: &str) -> Result<()> {
        let repo = Repository::open(&self.dir)?;
        let oid = Oid::from_str(hash).with_context(|| format!("Invalid commit hash {}", hash))?;
        let commit = repo
            .find_commit(oid)
            .with_context(|| format!("Commit {} not found in {:?}", hash, self.dir))?;

        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))
            .with_context(|| format!("Failed to check out {}", hash))?;
        repo.set_head_detached(oid)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn commit_file(repo: &Repository, name: &str, content: &str, message: &str) -> Result<Oid> {
        commit_as(repo, "test@example.com", name, content, message)
    }

    fn commit_as(repo: &Repository, email: &str, name: &str, content: &str, message: &str) -> Result<Oid> {
        let workdir = repo.workdir().context("bare repo")?;
        let path = workdir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;

        let sig = git2::Signature::now("Test User", email)?;
        let mut index = repo.index()?;
        index.add_path(Path::new(name))?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        Ok(repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?)
    }

    fn create_origin(root: &Path, repo: &RepoSpec) -> Result<Repository> {
        let path = root.join(&repo.namespace).join(&repo.project);
        fs::create_dir_all(&path)?;
        let origin = Repository::init(&path)?;

        let mut config = origin.config()?;
        config.set_str("user.name", "Test User")?;
        config.set_str("user.email", "test@example.com")?;
        Ok(origin)
    }

    #[test]
    fn test_repo_spec_parse() {
        let spec: RepoSpec = "acme/widget".parse().unwrap();
        assert_eq!(spec.namespace, "acme");
        assert_eq!(spec.project, "widget");
        assert_eq!(spec.to_string(), "acme/widget");
        assert_eq!(spec.project_key(), "acme:widget");

        for bad in ["widget", "acme/widget/extra", "/widget", "acme/", ""] {
            assert!(bad.parse::<RepoSpec>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_session_layout() -> Result<()> {
        let dir = tempdir()?;
        let base = dir.path().join("work");
        let session = Session::new(base.clone(), "https://github.com/")?;
        let spec: RepoSpec = "acme/widget".parse().unwrap();

        assert!(base.is_dir());
        assert_eq!(session.project_dir(&spec), base.join("acme").join("widget"));
        assert_eq!(session.clone_url(&spec), "https://github.com/acme/widget");
        assert_eq!(session.workspace(&spec).dir(), base.join("acme").join("widget"));
        Ok(())
    }

    #[test]
    fn test_sync_clones_then_follows_remote() -> Result<()> {
        let origin_root = tempdir()?;
        let work = tempdir()?;
        let spec: RepoSpec = "acme/widget".parse().unwrap();

        let origin = create_origin(origin_root.path(), &spec)?;
        commit_file(&origin, "main.go", "package main\n", "Initial commit")?;

        let session = Session::new(work.path().to_path_buf(), origin_root.path().to_string_lossy())?;
        let mut workspace = session.workspace(&spec);

        workspace.sync()?;
        assert!(workspace.dir().join("main.go").exists());

        let second = commit_file(&origin, "lib.go", "package main\n", "Add lib")?;
        workspace.sync()?;

        let local = Repository::open(workspace.dir())?;
        assert_eq!(local.head()?.peel_to_commit()?.id(), second);
        assert!(workspace.dir().join("lib.go").exists());
        Ok(())
    }

    #[test]
    fn test_sync_recovers_from_broken_clone() -> Result<()> {
        let origin_root = tempdir()?;
        let work = tempdir()?;
        let spec: RepoSpec = "acme/widget".parse().unwrap();

        let origin = create_origin(origin_root.path(), &spec)?;
        let tip = commit_file(&origin, "main.go", "package main\n", "Initial commit")?;

        let session = Session::new(work.path().to_path_buf(), origin_root.path().to_string_lossy())?;
        fs::create_dir_all(session.project_dir(&spec))?;
        fs::write(session.project_dir(&spec).join("junk.txt"), "not a repo")?;

        let mut workspace = session.workspace(&spec);
        workspace.sync()?;

        let local = Repository::open(workspace.dir())?;
        assert_eq!(local.head()?.peel_to_commit()?.id(), tip);
        assert!(!workspace.dir().join("junk.txt").exists());
        Ok(())
    }

    #[test]
    fn test_checkout_moves_working_tree() -> Result<()> {
        let origin_root = tempdir()?;
        let work = tempdir()?;
        let spec: RepoSpec = "acme/widget".parse().unwrap();

        let origin = create_origin(origin_root.path(), &spec)?;
        let first = commit_file(&origin, "main.go", "v1\n", "First")?;
        commit_file(&origin, "main.go", "v2\n", "Second")?;

        let session = Session::new(work.path().to_path_buf(), origin_root.path().to_string_lossy())?;
        let mut workspace = session.workspace(&spec);
        workspace.sync()?;
        assert_eq!(fs::read_to_string(workspace.dir().join("main.go"))?, "v2\n");

        workspace.checkout(&first.to_string())?;
        assert_eq!(fs::read_to_string(workspace.dir().join("main.go"))?, "v1\n");

        let local = Repository::open(workspace.dir())?;
        assert!(local.head_detached()?);
        assert_eq!(local.head()?.peel_to_commit()?.id(), first);

        assert!(workspace.checkout("not-a-hash").is_err());
        Ok(())
    }

    #[test]
    fn test_export_log_round_trips_through_parser() -> Result<()> {
        let origin_root = tempdir()?;
        let work = tempdir()?;
        let spec: RepoSpec = "acme/widget".parse().unwrap();

        let origin = create_origin(origin_root.path(), &spec)?;
        let root = commit_as(&origin, "founder@example.com", "main.go", "package main\n", "Initial commit")?;
        let docs = commit_as(&origin, "writer@example.com", "docs/README.md", "# widget\n", "Add docs")?;
        let accented = commit_as(&origin, "writer@example.com", "pkg/café.go", "package pkg\n", "Add café")?;

        let session = Session::new(work.path().to_path_buf(), origin_root.path().to_string_lossy())?;
        let mut workspace = session.workspace(&spec);
        workspace.sync()?;

        let log = workspace.export_log()?;
        let graph = parser::parse_log(&log, ".go")?;
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.contributors().len(), 2);

        let first = graph.commit_by_hash(&root.to_string()).context("root commit missing")?;
        assert_eq!(first.id, 0);
        assert!(first.is_root());
        assert!(first.code_bearing);

        let second = graph.commit_by_hash(&docs.to_string()).context("docs commit missing")?;
        assert_eq!(second.parent_hash, root.to_string());
        assert!(!second.code_bearing);

        let third = graph.commit_by_hash(&accented.to_string()).context("accented commit missing")?;
        assert!(third.code_bearing);
        assert_eq!(graph.contributor(third.author).identifier, "writer@example.com");
        assert_eq!(graph.contributor(third.author).first_code_commit(), Some(third.id));
        Ok(())
    }
}
