use std::collections::BTreeMap;
use std::time::Duration;

/// Logical identifier of a task inside a batch (e.g. `"fit-0003"`).
pub type TaskId = String;

/// Opaque remote execution target, as named in `[endpoint.<name>]`.
pub type EndpointId = String;

/// Status code reported by a task that completed successfully.
pub const SUCCESS_STATUS: i32 = 0;

/// Outcome of one remote unit of work.
///
/// `status_code`, `stdout` and `stderr` are only final once `terminal` is
/// set. A pending entry carries `status_code = -1` and empty output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub terminal: bool,
}

impl TaskResult {
    /// A task that was accepted but has not finished yet.
    pub fn pending() -> Self {
        Self {
            status_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            terminal: false,
        }
    }

    /// A finished task with its captured output.
    pub fn completed(
        status_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            terminal: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.terminal && self.status_code == SUCCESS_STATUS
    }
}

/// One status query's view of a batch: task id -> latest result.
pub type StatusSnapshot = BTreeMap<TaskId, TaskResult>;

/// Parse a short duration string such as `"300s"`, `"5m"` or `"250ms"`.
///
/// Supported suffixes: `ms`, `s`, `m`, `h`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs_scaled(value, 60),
        "h" => secs_scaled(value, 60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

fn secs_scaled(value: u64, factor: u64) -> Result<Duration, String> {
    value
        .checked_mul(factor)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: {value} x {factor}s"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("300s"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration(" 5m "), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
    }

    #[test]
    fn rejects_missing_or_unknown_suffix() {
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("30d").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn rejects_overflowing_values() {
        assert!(parse_duration("307445734561825861h").is_err());
        assert!(parse_duration("307445734561825861m").is_err());
        assert_eq!(
            parse_duration("5124095576030431m"),
            Ok(Duration::from_secs(5_124_095_576_030_431 * 60))
        );
    }

    #[test]
    fn pending_result_is_never_success() {
        let mut pending = TaskResult::pending();
        pending.status_code = SUCCESS_STATUS;
        assert!(!pending.is_success());
        assert!(TaskResult::completed(0, "ok", "").is_success());
        assert!(!TaskResult::completed(2, "", "boom").is_success());
    }
}
