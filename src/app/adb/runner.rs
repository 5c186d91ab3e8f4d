use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::app::adb::locator::{validate_adb_program, ADB_MISSING_REMEDIATION};
use crate::app::error::AppError;
use crate::app::logging::SessionLog;

/// Reported when the child was terminated by a signal and has no exit code.
pub const SIGNAL_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandResult, AppError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| AppError::system(format!("Failed to spawn command: {err}"), trace_id))?;

    // Drain stdout/stderr in parallel; otherwise, a chatty child process can block once the pipe
    // buffer fills, and we will incorrectly hit the timeout.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;
    let stdout_handle = drain(stdout);
    let stderr_handle = drain(stderr);

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code().unwrap_or(SIGNAL_EXIT_CODE),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    // Grandchildren can keep the pipes open past the kill, so the
                    // drain threads are left to finish on their own.
                    drop((stdout_handle, stderr_handle));
                    return Err(AppError::timeout(
                        format!("Command timed out after {}s", timeout.as_secs_f64()),
                        trace_id,
                    ));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                let _ = child.kill();
                drop((stdout_handle, stderr_handle));
                return Err(AppError::system(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandResult {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
    })
}

/// The seam between the session and the real adb binary.
#[async_trait]
pub trait AdbExecutor: Send + Sync {
    /// Must be checked before any invocation; a missing executable is not retried.
    fn ensure_available(&self, trace_id: &str) -> Result<(), AppError>;

    async fn execute(
        &self,
        args: Vec<String>,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandResult, AppError>;
}

pub struct ProcessExecutor {
    program: String,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl AdbExecutor for ProcessExecutor {
    fn ensure_available(&self, trace_id: &str) -> Result<(), AppError> {
        validate_adb_program(&self.program).map_err(|message| {
            AppError::dependency(format!("{message}\n\n{ADB_MISSING_REMEDIATION}"), trace_id)
        })
    }

    async fn execute(
        &self,
        args: Vec<String>,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandResult, AppError> {
        let program = self.program.clone();
        let trace = trace_id.to_string();
        tokio::task::spawn_blocking(move || run_command_with_timeout(&program, &args, timeout, &trace))
            .await
            .map_err(|err| AppError::system(format!("Command task failed: {err}"), trace_id))?
    }
}

fn quote_for_display(arg: &str) -> String {
    if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains(['/', '\\']) {
        format!("\"{arg}\"")
    } else {
        arg.to_string()
    }
}

/// Renders `adb <args>` for the session log. Display only; never executed.
pub fn format_command_line(args: &[String]) -> String {
    let mut line = String::from("adb");
    for arg in args {
        line.push(' ');
        line.push_str(&quote_for_display(arg));
    }
    line
}

/// Runs adb through an executor and mirrors every exchange into the session log.
pub struct CommandRunner<E> {
    executor: E,
    log: Arc<SessionLog>,
    timeout: Duration,
}

impl<E: AdbExecutor> CommandRunner<E> {
    pub fn new(executor: E, log: Arc<SessionLog>, timeout: Duration) -> Self {
        Self {
            executor,
            log,
            timeout,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn log(&self) -> &Arc<SessionLog> {
        &self.log
    }

    pub async fn run(
        &self,
        args: Vec<String>,
        capture_only: bool,
        trace_id: &str,
    ) -> Result<CommandResult, AppError> {
        self.run_with_timeout(args, capture_only, self.timeout, trace_id)
            .await
    }

    pub async fn run_with_timeout(
        &self,
        args: Vec<String>,
        capture_only: bool,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandResult, AppError> {
        let command_line = format_command_line(&args);
        if !capture_only {
            self.log.append(&format!("> {command_line}"));
        }
        info!(trace_id = %trace_id, command = %command_line, "adb invoke");

        match self.executor.execute(args, timeout, trace_id).await {
            Ok(result) => {
                self.log_result(&result);
                Ok(result)
            }
            Err(err) => {
                warn!(trace_id = %trace_id, code = %err.code, error = %err.error, "adb invocation failed");
                self.log.append(&format!("[error] {}", err.error));
                self.log.append("");
                Err(err)
            }
        }
    }

    fn log_result(&self, result: &CommandResult) {
        for stream in [&result.stdout, &result.stderr] {
            if !stream.trim().is_empty() {
                self.log.append(stream.trim_end());
            }
        }
        self.log.append(&format!("(exit={})", result.exit_code));
        self.log.append("");
    }
}
