//! Cosmetic log markers: status icons, per-agent emoji, and the commit-type
//! lookup table. Purely decorative — never consulted for control flow.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️ ", "[WARN]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️ ", "[T]");
pub static WAVE: Emoji<'_, '_> = Emoji("🌊 ", "[~]");

/// Per-file status icon for the map, banded by the warning/error token thresholds.
pub fn token_status_icon(tokens: u64, warning: u64, error: u64) -> &'static str {
    if tokens > error {
        "🔴"
    } else if tokens > warning {
        "⚠️"
    } else {
        "✓"
    }
}

/// Project-phase usage-percent status icon, independent of the phase-transition ratios.
pub fn usage_status_icon(usage_percent: f64) -> &'static str {
    if usage_percent < 55.0 {
        "✓"
    } else if usage_percent < 60.0 {
        "⚠️"
    } else {
        "🔴"
    }
}

/// Emoji for a fixed agent-role name, falling back to a generic marker for
/// unrecognized roles (teams may define roles outside the default set).
pub fn agent_emoji(role: &str) -> &'static str {
    match role {
        "specification" => "📌",
        "management" => "🧭",
        "redaction" => "✍️",
        "evaluation" => "⚖️",
        "deduplication" => "👥",
        "chroniqueur" => "📜",
        "redondance" => "🎭",
        "production" => "🏭",
        "chercheur" => "🔬",
        "integration" => "🌐",
        _ => "🤖",
    }
}

/// Maps a commit-message's type prefix (everything up to the first colon,
/// lowercased) to a cosmetic emoji. Purely for log output.
pub fn commit_type_emoji(commit_message: &str) -> &'static str {
    let prefix = commit_message
        .split(':')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    match prefix.as_str() {
        "feat" | "feature" => "✨",
        "fix" | "bugfix" => "🐛",
        "docs" | "doc" => "📝",
        "style" => "🎨",
        "refactor" => "♻️",
        "test" | "tests" => "🧪",
        "chore" => "🔧",
        "perf" => "⚡",
        _ => "📦",
    }
}
