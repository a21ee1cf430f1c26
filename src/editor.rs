//! Invokes the external code-editing subprocess for a single phase of a
//! cycle. The orchestrator never parses the editor's stdout for change
//! detection — only for cosmetic progress logging — and detects actual file
//! changes solely via version-control hash snapshots (`vcs.rs`).

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::errors::CycleError;
use crate::stream::{ContentBlock, StreamEvent, describe_tool_use, tool_emoji, truncate_thinking};

pub struct EditorInvocation<'a> {
    pub editor_cmd: &'a str,
    pub model: &'a str,
    pub project_dir: &'a Path,
    pub package_dir: &'a Path,
    pub editable_files: &'a [PathBuf],
    pub read_only_files: &'a [PathBuf],
    pub todolist_path: &'a Path,
    pub role_prompt_path: &'a Path,
    pub history_file: &'a Path,
    pub input_history_file: &'a Path,
    pub message: &'a str,
}

/// Prepend `package_dir` to the current process's `PATH` so the bundled
/// editor package is found ahead of anything else on the path.
fn prepend_to_path(package_dir: &Path) -> std::ffi::OsString {
    let current = std::env::var_os("PATH").unwrap_or_default();
    let mut dirs = vec![package_dir.to_path_buf()];
    dirs.extend(std::env::split_paths(&current));
    std::env::join_paths(dirs).unwrap_or_else(|_| current)
}

pub struct EditorOutcome {
    pub exit_code: i32,
    pub output: String,
}

/// Spawn the editor subprocess for one phase, stream its stdout, and wait
/// for completion. stdout/stderr decoding errors replace invalid bytes
/// rather than fail.
pub async fn run_phase(invocation: &EditorInvocation<'_>) -> Result<EditorOutcome, CycleError> {
    let mut cmd = Command::new(invocation.editor_cmd);
    cmd.arg("--model").arg(invocation.model);
    cmd.arg("--edit-format").arg("diff");
    cmd.arg("--yes-always");
    cmd.arg("--no-pretty");
    cmd.arg("--no-fancy-input");
    cmd.arg("--encoding").arg("utf-8");
    cmd.arg("--chat-history-file").arg(invocation.history_file);
    cmd.arg("--input-history-file")
        .arg(invocation.input_history_file);

    for path in invocation.editable_files {
        cmd.arg("--file").arg(path);
    }
    cmd.arg("--file").arg(invocation.todolist_path);
    cmd.arg("--read").arg(invocation.role_prompt_path);
    for path in invocation.read_only_files {
        cmd.arg("--read").arg(path);
    }

    cmd.arg("--message").arg(invocation.message);
    cmd.current_dir(invocation.project_dir);
    cmd.env("PATH", prepend_to_path(invocation.package_dir));
    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let mut child = cmd.spawn().map_err(CycleError::SpawnFailed)?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(invocation.message.as_bytes()).await;
        let _ = stdin.shutdown().await;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CycleError::SpawnFailed(std::io::Error::other("missing stdout pipe")))?;
    let mut reader = BufReader::new(stdout);

    let start = Instant::now();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        interval.tick().await;
        loop {
            interval.tick().await;
            tracing::debug!(elapsed_secs = start.elapsed().as_secs(), "editor phase still running");
        }
    });

    let mut accumulated = String::new();
    let mut final_result: Option<String> = None;
    let mut raw_line = Vec::new();

    loop {
        raw_line.clear();
        let bytes_read =
            reader
                .read_until(b'\n', &mut raw_line)
                .await
                .map_err(|source| CycleError::Filesystem {
                    path: invocation.project_dir.to_path_buf(),
                    source,
                })?;
        if bytes_read == 0 {
            break;
        }
        while raw_line.last() == Some(&b'\n') || raw_line.last() == Some(&b'\r') {
            raw_line.pop();
        }
        let line = String::from_utf8_lossy(&raw_line).into_owned();

        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<StreamEvent>(&line) {
            Ok(StreamEvent::Assistant { message, .. }) => {
                for block in message.content {
                    match block {
                        ContentBlock::ToolUse { name, input, .. } => {
                            let desc = describe_tool_use(&name, &input);
                            tracing::info!(tool = %name, emoji = tool_emoji(&name), "{desc}");
                        }
                        ContentBlock::Text { text } => {
                            let snippet = truncate_thinking(&text, 60);
                            if !snippet.is_empty() {
                                tracing::debug!("{snippet}");
                            }
                            accumulated.push_str(&text);
                            accumulated.push('\n');
                        }
                    }
                }
            }
            Ok(StreamEvent::Result { result, .. }) => {
                final_result = result;
            }
            Ok(StreamEvent::User { .. } | StreamEvent::System { .. }) => {}
            Err(_) => {
                accumulated.push_str(&line);
                accumulated.push('\n');
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|source| CycleError::Filesystem {
            path: invocation.project_dir.to_path_buf(),
            source,
        })?;
    ticker.abort();

    let exit_code = status.code().unwrap_or(-1);
    let output = final_result.unwrap_or(accumulated);

    Ok(EditorOutcome { exit_code, output })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn run_phase_reports_exit_code_of_true() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("role.md"), "role").unwrap();
        std::fs::write(dir.path().join("todolist.md"), "todo").unwrap();
        std::fs::write(dir.path().join(".history.test.md"), "").unwrap();
        std::fs::write(dir.path().join(".input-history.test.md"), "").unwrap();

        let invocation = EditorInvocation {
            editor_cmd: "true",
            model: "sonnet",
            project_dir: dir.path(),
            package_dir: dir.path(),
            editable_files: &[],
            read_only_files: &[],
            todolist_path: &dir.path().join("todolist.md"),
            role_prompt_path: &dir.path().join("role.md"),
            history_file: &dir.path().join(".history.test.md"),
            input_history_file: &dir.path().join(".input-history.test.md"),
            message: "do the thing",
        };

        let outcome = run_phase(&invocation).await.unwrap();
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn run_phase_reports_nonzero_exit_code() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("role.md"), "role").unwrap();
        std::fs::write(dir.path().join("todolist.md"), "todo").unwrap();
        std::fs::write(dir.path().join(".history.test.md"), "").unwrap();
        std::fs::write(dir.path().join(".input-history.test.md"), "").unwrap();

        let invocation = EditorInvocation {
            editor_cmd: "false",
            model: "sonnet",
            project_dir: dir.path(),
            package_dir: dir.path(),
            editable_files: &[],
            read_only_files: &[],
            todolist_path: &dir.path().join("todolist.md"),
            role_prompt_path: &dir.path().join("role.md"),
            history_file: &dir.path().join(".history.test.md"),
            input_history_file: &dir.path().join(".input-history.test.md"),
            message: "do the thing",
        };

        let outcome = run_phase(&invocation).await.unwrap();
        assert_ne!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn run_phase_errors_on_missing_editor_binary() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("role.md"), "role").unwrap();
        std::fs::write(dir.path().join("todolist.md"), "todo").unwrap();
        std::fs::write(dir.path().join(".history.test.md"), "").unwrap();
        std::fs::write(dir.path().join(".input-history.test.md"), "").unwrap();

        let invocation = EditorInvocation {
            editor_cmd: "this-binary-does-not-exist-anywhere",
            model: "sonnet",
            project_dir: dir.path(),
            package_dir: dir.path(),
            editable_files: &[],
            read_only_files: &[],
            todolist_path: &dir.path().join("todolist.md"),
            role_prompt_path: &dir.path().join("role.md"),
            history_file: &dir.path().join(".history.test.md"),
            input_history_file: &dir.path().join(".input-history.test.md"),
            message: "do the thing",
        };

        let result = run_phase(&invocation).await;
        assert!(matches!(result, Err(CycleError::SpawnFailed(_))));
    }
}
