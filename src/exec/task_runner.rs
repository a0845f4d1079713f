// src/exec/task_runner.rs

//! Individual task process runner.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::types::TaskResult;

/// Run one task command line to completion and capture its output.
///
/// Never fails: a process that cannot be spawned or waited on is reported
/// as a terminal result with status `-1` and the error text in `stderr`.
pub async fn run_task(task_id: &str, command_line: &str) -> TaskResult {
    match run_task_inner(task_id, command_line).await {
        Ok(result) => result,
        Err(err) => {
            error!(
                task = %task_id,
                error = %err,
                "task execution error"
            );
            TaskResult::completed(-1, String::new(), format!("{err:#}"))
        }
    }
}

async fn run_task_inner(task_id: &str, command_line: &str) -> Result<TaskResult> {
    info!(
        task = %task_id,
        cmd = %command_line,
        "starting task process"
    );

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command_line);
        c
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .with_context(|| format!("running process for task '{}'", task_id))?;

    let code = output.status.code().unwrap_or(-1);
    info!(
        task = %task_id,
        exit_code = code,
        success = output.status.success(),
        "task process exited"
    );

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !stderr.is_empty() {
        debug!(task = %task_id, "stderr: {}", stderr.trim_end());
    }

    Ok(TaskResult::completed(code, stdout, stderr))
}

/// Quote `arg` for `sh -c` unless it only contains safe characters.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=,@%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
