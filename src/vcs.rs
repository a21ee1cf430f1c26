//! Read-only version-control snapshots: tracked-file content hashes, the
//! latest commit summary, and a best-effort push. Never creates a commit —
//! the editor subprocess owns committing; this module only observes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use git2::{ObjectType, Repository, Status, StatusOptions};

/// Path → content hash, for every file git can see (tracked or untracked).
pub type TrackedFiles = HashMap<PathBuf, String>;

pub struct GitTracker {
    repo: Repository,
}

impl GitTracker {
    pub fn new(project_dir: &Path) -> anyhow::Result<Self> {
        let repo = Repository::open(project_dir)?;
        Ok(Self { repo })
    }

    /// Snapshot every path git is aware of, mapped to a content hash. Tracked
    /// paths use the index's blob OID; untracked paths are hashed from their
    /// current on-disk bytes via the object database's content-addressing
    /// without writing anything. No index or workdir mutation occurs.
    pub fn list_tracked_files(&self) -> anyhow::Result<TrackedFiles> {
        let mut files = TrackedFiles::new();

        let index = self.repo.index()?;
        for entry in index.iter() {
            let path = PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned());
            files.insert(path, entry.id.to_string());
        }

        let workdir = match self.repo.workdir() {
            Some(w) => w,
            None => return Ok(files),
        };

        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        let odb = self.repo.odb()?;

        for entry in statuses.iter() {
            if !entry.status().contains(Status::WT_NEW) {
                continue;
            }
            let Some(path) = entry.path() else { continue };
            let full = workdir.join(path);
            let Ok(bytes) = std::fs::read(&full) else {
                continue;
            };
            let oid = odb.hash(&bytes, ObjectType::Blob)?;
            files.insert(PathBuf::from(path), oid.to_string());
        }

        Ok(files)
    }

    /// The current HEAD commit's short hash and first line of its message.
    pub fn latest_commit_summary(&self) -> anyhow::Result<(String, String)> {
        let commit = self.repo.head()?.peel_to_commit()?;
        let hash = commit.id().to_string();
        let message = commit
            .message()
            .unwrap_or("")
            .lines()
            .next()
            .unwrap_or("")
            .to_string();
        Ok((hash, message))
    }

    /// Configure the repository to store commit messages as UTF-8. Best
    /// effort; a missing local config is not fatal.
    pub fn configure_encoding(&self) -> anyhow::Result<()> {
        let mut config = self.repo.config()?;
        config.set_str("i18n.commitencoding", "utf-8")?;
        Ok(())
    }

    /// Push the current branch to its upstream remote, if one is
    /// configured. Failures here are non-fatal to the caller (logged and
    /// swallowed as `CycleError::VcsPushFailed`); a mission directory with no
    /// remote configured is an expected, unremarkable case.
    pub fn push(&self) -> anyhow::Result<()> {
        let head = self.repo.head()?;
        let branch_name = head
            .shorthand()
            .ok_or_else(|| anyhow::anyhow!("HEAD is detached, nothing to push"))?;

        let mut remote = self.repo.find_remote("origin")?;
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch_name);

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, allowed_types| {
            if allowed_types.contains(git2::CredentialType::SSH_KEY) {
                git2::Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
            } else {
                git2::Cred::default()
            }
        });

        let mut opts = git2::PushOptions::new();
        opts.remote_callbacks(callbacks);
        remote.push(&[refspec.as_str()], Some(&mut opts))?;
        Ok(())
    }
}

/// Paths whose hash differs (or appeared/disappeared) between two snapshots.
pub fn modified_paths(before: &TrackedFiles, after: &TrackedFiles) -> Vec<PathBuf> {
    let mut modified: Vec<PathBuf> = after
        .iter()
        .filter(|(path, hash)| before.get(*path) != Some(*hash))
        .map(|(path, _)| path.clone())
        .collect();
    modified.extend(
        before
            .keys()
            .filter(|path| !after.contains_key(*path))
            .cloned(),
    );
    modified.sort();
    modified.dedup();
    modified
}
