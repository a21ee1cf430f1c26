//! Deterministic, sorted tree traversal of the mission directory, honoring
//! ignore patterns. A single source of truth for "what files belong to this
//! project" shared by the Token Accountant and the Project Map Maintainer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A single entry in the mission tree, relative to the mission root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TreeEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    pub depth: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("cannot read mission root {path}: {source}")]
    UnreadableRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const DEFAULT_IGNORE_DIRS: &[&str] = &[".git", "__pycache__", "node_modules", "target"];
const RESERVED_PREFIXES: &[&str] = &[".aider", ".objective", ".map", ".history", ".agent"];

/// Walk `root`, returning a sorted, flat list of every non-ignored entry.
/// `extra_ignore_globs` are additional glob patterns from project
/// configuration, matched against the path relative to `root`.
pub fn walk(
    root: &Path,
    max_depth: Option<usize>,
    extra_ignore_globs: &[glob::Pattern],
) -> Result<Vec<TreeEntry>, WalkError> {
    root.read_dir().map_err(|source| WalkError::UnreadableRoot {
        path: root.to_path_buf(),
        source,
    })?;

    let mut walker = WalkDir::new(root).min_depth(1).follow_links(true);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut seen_links: HashSet<PathBuf> = HashSet::new();
    let mut entries = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry during walk");
                continue;
            }
        };

        let relative = match entry.path().strip_prefix(root) {
            Ok(p) => p.to_path_buf(),
            Err(_) => continue,
        };

        if is_ignored(&relative, extra_ignore_globs) {
            continue;
        }

        if entry.path_is_symlink() {
            let canonical = match entry.path().canonicalize() {
                Ok(c) => c,
                Err(err) => {
                    tracing::warn!(path = %relative.display(), error = %err, "skipping broken symlink");
                    continue;
                }
            };
            if !seen_links.insert(canonical) {
                tracing::warn!(path = %relative.display(), "symlink cycle detected, skipping");
                continue;
            }
        }

        entries.push(TreeEntry {
            path: relative,
            is_dir: entry.file_type().is_dir(),
            depth: entry.depth(),
        });
    }

    entries.sort();
    Ok(entries)
}

fn is_ignored(relative: &Path, extra_globs: &[glob::Pattern]) -> bool {
    for component in relative.components() {
        let name = component.as_os_str().to_string_lossy();
        if DEFAULT_IGNORE_DIRS.contains(&name.as_ref()) {
            return true;
        }
        if RESERVED_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
        {
            return true;
        }
    }

    let rel_str = relative.to_string_lossy();
    extra_globs.iter().any(|pattern| pattern.matches(&rel_str))
}

/// Only the file (non-directory) entries, in sorted order.
pub fn walk_files(
    root: &Path,
    extra_ignore_globs: &[glob::Pattern],
) -> Result<Vec<PathBuf>, WalkError> {
    Ok(walk(root, None, extra_ignore_globs)?
        .into_iter()
        .filter(|e| !e.is_dir)
        .map(|e| e.path)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let full = dir.join(rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, contents).unwrap();
    }

    #[test]
    fn walk_returns_sorted_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.md", "x");
        write(dir.path(), "a/nested.md", "x");

        let entries = walk(dir.path(), None, &[]).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.clone()).collect();

        assert_eq!(
            paths,
            vec![
                PathBuf::from("a"),
                PathBuf::from("a/nested.md"),
                PathBuf::from("b.md"),
            ]
        );
    }

    #[test]
    fn walk_skips_git_and_reserved_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".git/HEAD", "x");
        write(dir.path(), ".objective.production.md", "x");
        write(dir.path(), "keep.md", "x");

        let files = walk_files(dir.path(), &[]).unwrap();
        assert_eq!(files, vec![PathBuf::from("keep.md")]);
    }

    #[test]
    fn walk_respects_extra_ignore_globs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "build.log", "x");
        write(dir.path(), "keep.md", "x");

        let pattern = glob::Pattern::new("*.log").unwrap();
        let files = walk_files(dir.path(), &[pattern]).unwrap();
        assert_eq!(files, vec![PathBuf::from("keep.md")]);
    }

    #[test]
    fn walk_errors_on_unreadable_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(walk(&missing, None, &[]).is_err());
    }
}
