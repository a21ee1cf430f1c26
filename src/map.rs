//! Generates and atomically rewrites `map.md`, a human-readable dashboard
//! documenting the tree, per-file token sizes, warnings, and current phase.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;

use crate::phase::PhaseController;
use crate::tokens::TokenAccountant;
use crate::walker;

pub struct MapMaintainer<'a> {
    accountant: &'a TokenAccountant,
    phase_controller: &'a PhaseController,
    map_path: PathBuf,
}

impl<'a> MapMaintainer<'a> {
    pub fn new(
        accountant: &'a TokenAccountant,
        phase_controller: &'a PhaseController,
        project_root: &Path,
    ) -> Self {
        Self {
            accountant,
            phase_controller,
            map_path: project_root.join("map.md"),
        }
    }

    /// Regenerate `map.md`. Atomic: writes to a sibling temp file under an
    /// advisory lock, then renames over the target. Never throws; logs and
    /// returns false on failure.
    pub fn generate(&self, project_root: &Path, now: DateTime<Utc>) -> bool {
        match self.try_generate(project_root, now) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "failed to generate project map");
                false
            }
        }
    }

    /// `Update()` is equivalent to `Generate()`; the Cycle Executor calls
    /// this name after a cycle that produced modifications.
    pub fn update(&self, project_root: &Path, now: DateTime<Utc>) -> bool {
        self.generate(project_root, now)
    }

    fn try_generate(&self, project_root: &Path, now: DateTime<Utc>) -> anyhow::Result<()> {
        let files = walker::walk_files(project_root, &[])?
            .into_iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
            .collect::<Vec<_>>();

        let mut tree_lines = Vec::new();
        let mut warnings = Vec::new();

        for rel in &files {
            let full = project_root.join(rel);
            let tokens = self.accountant.tokens_of(&full);
            let icon = self.accountant.status_icon(tokens);
            let size_k = tokens as f64 / 1000.0;
            tree_lines.push(format!(
                "├── 📄 {} ({size_k:.1}k tokens) {icon}",
                rel.display()
            ));
            if let Some(warning) = self
                .accountant
                .size_warning(&rel.display().to_string(), tokens)
            {
                warnings.push(warning);
            }
        }

        let content = self.format_content(&tree_lines, &warnings, now);
        self.write_atomic(&content)
    }

    fn format_content(&self, tree_lines: &[String], warnings: &[String], now: DateTime<Utc>) -> String {
        let status = self.phase_controller.status();
        let thresholds = self.phase_controller.thresholds();
        let narrative = self.phase_controller.narrative(status.phase);
        let convergence_tokens =
            (thresholds.model_token_limit as f64 * thresholds.convergence_ratio) / 1000.0;

        let mut content = vec![
            "# Project Map".to_string(),
            String::new(),
            "A dynamic map of the project, regenerated automatically after any cycle \
             that modifies tracked files. It documents the file tree, each document's size \
             in tokens, the current project phase, and any files approaching their size \
             limit."
                .to_string(),
            String::new(),
            format!("Generated: {}", now.format("%Y-%m-%d %H:%M:%S")),
            String::new(),
            "## Project Phase".to_string(),
            narrative,
            String::new(),
            "## Token Usage".to_string(),
            format!(
                "Total: {:.1}k/{:.0}k ({:.1}%)",
                status.total_tokens as f64 / 1000.0,
                thresholds.model_token_limit as f64 / 1000.0,
                status.usage_percent
            ),
            format!(
                "Convergence at: {convergence_tokens:.1}k ({:.0}%)",
                thresholds.convergence_ratio * 100.0
            ),
            String::new(),
            "## Phase Status".to_string(),
            format!("{} {}", status.status_icon, status.status_message),
            format!("Headroom: {:.1}k tokens", status.headroom_tokens as f64 / 1000.0),
            String::new(),
            "## Document Tree".to_string(),
            "📁 Project".to_string(),
        ];

        content.extend(tree_lines.iter().cloned());

        if !warnings.is_empty() {
            content.push(String::new());
            content.push("## Warnings".to_string());
            content.extend(warnings.iter().cloned());
        }

        content.join("\n")
    }

    fn write_atomic(&self, content: &str) -> anyhow::Result<()> {
        let lock_path = self.map_path.with_extension("md.lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_file.lock_exclusive()?;

        let tmp_path = self.map_path.with_extension("md.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.map_path)?;

        fs2::FileExt::unlock(&lock_file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseThresholds;
    use crate::tokens::TokenThresholds;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn generate_writes_map_file_with_expected_sections() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("doc.md"), "hello world").unwrap();

        let accountant = TokenAccountant::new(TokenThresholds::default()).unwrap();
        let controller = PhaseController::new(PhaseThresholds::default(), now());
        let maintainer = MapMaintainer::new(&accountant, &controller, dir.path());

        assert!(maintainer.generate(dir.path(), now()));

        let content = std::fs::read_to_string(dir.path().join("map.md")).unwrap();
        assert!(content.contains("# Project Map"));
        assert!(content.contains("## Document Tree"));
        assert!(content.contains("doc.md"));
    }

    #[test]
    fn generate_includes_warnings_for_oversized_files() {
        let dir = tempdir().unwrap();
        let big_content = "word ".repeat(10_000);
        std::fs::write(dir.path().join("big.md"), big_content).unwrap();

        let accountant = TokenAccountant::new(TokenThresholds::default()).unwrap();
        let controller = PhaseController::new(PhaseThresholds::default(), now());
        let maintainer = MapMaintainer::new(&accountant, &controller, dir.path());

        maintainer.generate(dir.path(), now());
        let content = std::fs::read_to_string(dir.path().join("map.md")).unwrap();
        assert!(content.contains("## Warnings"));
    }

    #[test]
    fn update_is_equivalent_to_generate() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("doc.md"), "hi").unwrap();

        let accountant = TokenAccountant::new(TokenThresholds::default()).unwrap();
        let controller = PhaseController::new(PhaseThresholds::default(), now());
        let maintainer = MapMaintainer::new(&accountant, &controller, dir.path());

        assert!(maintainer.update(dir.path(), now()));
    }
}
