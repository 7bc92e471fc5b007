//! Script execution against the OS automation bridge.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;

use super::error::ExecutionError;
use super::script::ScriptText;

/// Outcome of one script run: the raw output on success.
pub type ExecutionResult = Result<String, ExecutionError>;

/// Something that can run a rendered script.
///
/// Implementations need not serialize or time out calls themselves;
/// [`AutomationExecutor`] does both.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, script: &ScriptText) -> ExecutionResult;
}

/// Runs scripts through `osascript`, feeding the script on stdin.
#[derive(Debug, Clone)]
pub struct OsascriptRunner {
    program: PathBuf,
}

impl OsascriptRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for OsascriptRunner {
    fn default() -> Self {
        Self::new("osascript")
    }
}

#[async_trait]
impl ScriptRunner for OsascriptRunner {
    async fn run(&self, script: &ScriptText) -> ExecutionResult {
        // Dropping the future on timeout kills the child; the application
        // may still finish an action it already received.
        let mut child = Command::new(&self.program)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecutionError::ApplicationUnavailable(format!(
                    "cannot start {}: {e}",
                    self.program.display()
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(script.as_str().as_bytes()).await {
                // The bridge may exit before reading everything; its exit
                // status below is the real signal.
                tracing::debug!(error = %e, "failed to write script to bridge");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecutionError::ApplicationUnavailable(format!("bridge failed: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() {
            return Ok(stdout.trim_end_matches(['\n', '\r']).to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_failure(output.status.code().unwrap_or(-1), &stderr))
    }
}

/// AppleScript error numbers meaning the application cannot be reached.
const UNAVAILABLE_ERRORS: &[i32] = &[
    -600,   // application isn't running
    -609,   // connection is invalid
    -1743,  // not authorized to send Apple events
    -10810, // launch failed
    -10814, // application not found
];

/// AppleScript error numbers for scripts that failed to compile.
const SYNTAX_ERRORS: &[i32] = &[-2740, -2741, -2753];

/// Extract the trailing `(-NNNN)` error number osascript appends.
#[must_use]
pub fn error_number(stderr: &str) -> Option<i32> {
    let text = stderr.trim_end();
    let inner = text.strip_suffix(')')?;
    let open = inner.rfind('(')?;
    inner[open + 1..].parse().ok()
}

/// Classify a failed bridge run from its exit code and diagnostic text.
#[must_use]
pub fn classify_failure(exit_code: i32, stderr: &str) -> ExecutionError {
    let message = stderr.trim();
    if message.is_empty() {
        return ExecutionError::UnknownExecutionFailure(exit_code);
    }

    let number = error_number(message);
    if number.is_some_and(|n| UNAVAILABLE_ERRORS.contains(&n))
        || message.contains("isn't running")
        || message.contains("Can’t get application")
    {
        return ExecutionError::ApplicationUnavailable(message.to_string());
    }
    if number.is_some_and(|n| SYNTAX_ERRORS.contains(&n)) || message.contains("syntax error") {
        return ExecutionError::ScriptError(format!("syntax: {message}"));
    }
    ExecutionError::ScriptError(message.to_string())
}

/// Owns the bridge: one script at a time, each bounded by a timeout.
///
/// Callers queue on the gate rather than fail while another script runs.
pub struct AutomationExecutor {
    runner: Arc<dyn ScriptRunner>,
    gate: Mutex<()>,
    timeout: Duration,
}

impl std::fmt::Debug for AutomationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationExecutor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AutomationExecutor {
    pub fn new(runner: Arc<dyn ScriptRunner>, timeout: Duration) -> Self {
        Self {
            runner,
            gate: Mutex::new(()),
            timeout,
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one script. Exactly one attempt is made.
    pub async fn execute(&self, script: &ScriptText) -> ExecutionResult {
        let _guard = self.gate.lock().await;
        tracing::debug!(bytes = script.len(), "running script");

        match tokio::time::timeout(self.timeout, self.runner.run(script)).await {
            Ok(Ok(output)) => {
                tracing::debug!(bytes = output.len(), "script finished");
                Ok(output)
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "script failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.timeout,
                    "script timed out; the application may still complete the action"
                );
                Err(ExecutionError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::core::command::Command;
    use crate::core::params::ParameterSet;
    use crate::core::script::ScriptEngine;

    fn script() -> ScriptText {
        ScriptEngine::new("Things3", true).render(Command::ListAreas, &ParameterSet::default())
    }

    /// Tracks how many runs overlap.
    #[derive(Default)]
    struct CountingRunner {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl ScriptRunner for CountingRunner {
        async fn run(&self, _script: &ScriptText) -> ExecutionResult {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(String::new())
        }
    }

    struct HangingRunner;

    #[async_trait]
    impl ScriptRunner for HangingRunner {
        async fn run(&self, _script: &ScriptText) -> ExecutionResult {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn executions_never_overlap() {
        let runner = Arc::new(CountingRunner::default());
        let executor = Arc::new(AutomationExecutor::new(
            runner.clone(),
            Duration::from_secs(5),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let executor = Arc::clone(&executor);
            handles.push(tokio::spawn(async move { executor.execute(&script()).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(runner.runs.load(Ordering::SeqCst), 8);
        assert_eq!(runner.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hung_runner_times_out() {
        let executor = AutomationExecutor::new(Arc::new(HangingRunner), Duration::from_millis(20));
        let result = executor.execute(&script()).await;
        assert_eq!(result, Err(ExecutionError::Timeout(Duration::from_millis(20))));
    }

    #[tokio::test]
    async fn gate_is_released_after_timeout() {
        let executor = AutomationExecutor::new(Arc::new(HangingRunner), Duration::from_millis(10));
        assert!(executor.execute(&script()).await.is_err());
        assert!(executor.execute(&script()).await.is_err());
    }

    #[tokio::test]
    async fn missing_bridge_is_unavailable() {
        let runner = OsascriptRunner::new("/nonexistent/osascript");
        let err = runner.run(&script()).await.unwrap_err();
        assert_eq!(err.kind(), "application_unavailable");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runner_feeds_script_on_stdin() {
        // `cat -` echoes the script back, standing in for the bridge.
        let runner = OsascriptRunner::new("cat");
        let script = script();
        let output = runner.run(&script).await.unwrap();
        assert_eq!(output, script.as_str().trim_end());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_nonzero_exit_is_unknown_failure() {
        let runner = OsascriptRunner::new("false");
        let err = runner.run(&script()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::UnknownExecutionFailure(_)));
    }

    #[test]
    fn error_number_is_extracted() {
        assert_eq!(
            error_number("0:23: execution error: Things3 got an error: Can’t get to do id \"x\". (-1728)\n"),
            Some(-1728)
        );
        assert_eq!(error_number("no number here"), None);
    }

    #[test]
    fn not_running_is_unavailable() {
        let err = classify_failure(1, "0:40: execution error: Things3 is not running (-600)");
        assert!(matches!(err, ExecutionError::ApplicationUnavailable(_)));

        let err = classify_failure(1, "execution error: Not authorized to send Apple events to Things3. (-1743)");
        assert!(matches!(err, ExecutionError::ApplicationUnavailable(_)));
    }

    #[test]
    fn syntax_error_is_script_error() {
        let err = classify_failure(1, "12:20: syntax error: Expected end of line but found identifier. (-2741)");
        match err {
            ExecutionError::ScriptError(message) => assert!(message.starts_with("syntax:")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_runtime_errors_are_script_errors() {
        let err = classify_failure(1, "execution error: Things3 got an error: Can’t get project \"X\". (-1728)");
        assert!(matches!(err, ExecutionError::ScriptError(m) if m.contains("-1728")));
    }

    #[test]
    fn empty_diagnostic_is_unknown() {
        assert_eq!(
            classify_failure(2, "  \n"),
            ExecutionError::UnknownExecutionFailure(2)
        );
    }
}
