//! Per-file and aggregate token counting. Advisory only — callers must not
//! assume exact equality with the provider's own billing.

use std::path::Path;

use tiktoken_rs::CoreBPE;

use crate::walker;

/// Per-file status icon thresholds, in tokens. Configuration, not hardcoded;
/// these are the source's own defaults.
#[derive(Debug, Clone, Copy)]
pub struct TokenThresholds {
    pub warning: u64,
    pub error: u64,
}

impl Default for TokenThresholds {
    fn default() -> Self {
        Self {
            warning: 6_000,
            error: 12_000,
        }
    }
}

pub struct TokenAccountant {
    bpe: CoreBPE,
    pub thresholds: TokenThresholds,
}

impl TokenAccountant {
    pub fn new(thresholds: TokenThresholds) -> anyhow::Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()?;
        Ok(Self { bpe, thresholds })
    }

    /// Token count for a single file. Reads as UTF-8 (invalid bytes
    /// replaced); returns 0 and logs a warning on read failure.
    pub fn tokens_of(&self, path: &Path) -> u64 {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read file for token count");
                return 0;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        self.count_str(&text)
    }

    pub fn count_str(&self, text: &str) -> u64 {
        self.bpe.encode_with_special_tokens(text).len() as u64
    }

    /// Sum of tokens across every non-ignored file under `root`.
    pub fn total_tokens(
        &self,
        root: &Path,
        extra_ignore_globs: &[glob::Pattern],
    ) -> anyhow::Result<u64> {
        let files = walker::walk_files(root, extra_ignore_globs)?;
        Ok(files
            .iter()
            .map(|rel| self.tokens_of(&root.join(rel)))
            .sum())
    }

    pub fn status_icon(&self, tokens: u64) -> &'static str {
        crate::ui::token_status_icon(tokens, self.thresholds.warning, self.thresholds.error)
    }

    /// A warning line for `map.md` if `tokens` exceeds either threshold, in
    /// the source's own message shape.
    pub fn size_warning(&self, filename: &str, tokens: u64) -> Option<String> {
        if tokens > self.thresholds.error {
            Some(format!(
                "🔴 {filename} needs consolidation (>{:.1}k tokens)",
                self.thresholds.error as f64 / 1000.0
            ))
        } else if tokens > self.thresholds.warning {
            Some(format!(
                "⚠️ {filename} approaching limit (>{:.1}k tokens)",
                self.thresholds.warning as f64 / 1000.0
            ))
        } else {
            None
        }
    }
}
