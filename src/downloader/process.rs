use std::path::Path;
use std::process::Stdio;
use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use crate::errors::{AppError, Result};

/// Result of running an external tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

impl ToolOutput {
    pub fn describe_exit(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs an external command and captures its combined output.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput>;
}

/// [`ToolRunner`] backed by OS processes. Cancelling kills the child.
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        log::debug!("🚀 [PROCESS] Running {} {:?} in {:?}", program, args, working_dir);
        let child = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                log::error!("❌ [PROCESS] Failed to start {}: {}", program, e);
                AppError::from(e)
            })?;

        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = cancel.cancelled() => {
                log::warn!("⚠️ [PROCESS] {} cancelled, killing child", program);
                return Err(AppError::Cancelled);
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        log::debug!("📊 [PROCESS] {} exit status: {}", program, output.status);
        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            output: combined,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let args = vec!["-c".to_string(), "echo out; echo err 1>&2; exit 3".to_string()];

        let output = ProcessRunner::new()
            .run("sh", &args, dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert!(output.output.contains("out"));
        assert!(output.output.contains("err"));
    }

    #[tokio::test]
    async fn cancellation_stops_a_running_tool() {
        let dir = tempfile::tempdir().unwrap();
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let cancel = CancellationToken::new();

        let trigger = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            }
        };

        let runner = ProcessRunner::new();
        let (result, _) = tokio::join!(runner.run("sh", &args, dir.path(), &cancel), trigger);
        assert!(matches!(result, Err(AppError::Cancelled)));
    }
}
