use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use crate::app::adb::apk::{display_file_name, validate_apk_path};
use crate::app::adb::devices::probe_device_state;
use crate::app::adb::input::encode_input_text;
use crate::app::adb::install::{format_elapsed, InstallClassifier, TextInstallClassifier};
use crate::app::adb::locator::resolve_adb_program;
use crate::app::adb::runner::{AdbExecutor, CommandResult, CommandRunner, ProcessExecutor};
use crate::app::config::{ApkInstallSettings, AppConfig};
use crate::app::error::AppError;
use crate::app::logging::SessionLog;
use crate::app::models::{
    DeviceState, InstallOutcome, InstallStats, SessionEvent, StatusReport,
};
use crate::app::state::{BusyGuard, SessionState};

pub type SessionEmitter = Arc<dyn Fn(SessionEvent) + Send + Sync>;

pub fn noop_emitter() -> SessionEmitter {
    Arc::new(|_event| {})
}

pub fn resolve_trace_id(input: Option<String>) -> String {
    input
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Title and guidance shown when an operation is refused for device state.
pub fn not_ready_notice(state: DeviceState) -> Option<(&'static str, &'static str)> {
    match state {
        DeviceState::Connected => None,
        DeviceState::NotFound => Some((
            "Device not connected",
            "No headset detected.\n\nCheck that:\n- the headset is powered on\n- the cable supports data transfer\n- developer mode is enabled",
        )),
        DeviceState::Unauthorized => Some((
            "Authorization required",
            "Confirm the authorization on the headset.\n\nPut on the headset, tap \"Allow USB debugging\", then refresh.",
        )),
        DeviceState::Unknown => Some(("Device not ready", DeviceState::Unknown.status_message())),
    }
}

/// Holds the busy flag for one state-changing operation and announces
/// busy/idle transitions. Released on every exit path.
struct OperationGuard<'a> {
    busy: Option<BusyGuard<'a>>,
    emitter: &'a SessionEmitter,
    trace_id: String,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.busy.take();
        (self.emitter)(SessionEvent::Idle {
            trace_id: self.trace_id.clone(),
        });
    }
}

/// One tethered-headset session: runs adb, guards operations and keeps the
/// install counters.
pub struct Session<E> {
    runner: CommandRunner<E>,
    classifier: Box<dyn InstallClassifier>,
    state: SessionState,
    install_settings: ApkInstallSettings,
    install_timeout: Duration,
    emitter: SessionEmitter,
}

impl Session<ProcessExecutor> {
    pub fn from_config(config: &AppConfig, log: Arc<SessionLog>, emitter: SessionEmitter) -> Self {
        let program = resolve_adb_program(&config.adb.command_path);
        info!(program = %program, "adb program resolved");
        Session::new(ProcessExecutor::new(program), log, config, emitter)
    }
}

impl<E: AdbExecutor> Session<E> {
    pub fn new(
        executor: E,
        log: Arc<SessionLog>,
        config: &AppConfig,
        emitter: SessionEmitter,
    ) -> Self {
        Self {
            runner: CommandRunner::new(executor, log, config.command.command_timeout()),
            classifier: Box::new(TextInstallClassifier),
            state: SessionState::new(),
            install_settings: config.apk_install.clone(),
            install_timeout: config.command.install_timeout(),
            emitter,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn InstallClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn executor(&self) -> &E {
        self.runner.executor()
    }

    pub fn log(&self) -> &Arc<SessionLog> {
        self.runner.log()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn install_stats(&self) -> InstallStats {
        self.state.install_stats()
    }

    fn emit(&self, event: SessionEvent) {
        (self.emitter)(event);
    }

    fn begin(&self, message: &str, trace_id: &str) -> Result<OperationGuard<'_>, AppError> {
        let busy = self.state.try_begin().ok_or_else(|| {
            warn!(trace_id = %trace_id, "operation rejected while busy");
            AppError::busy(trace_id)
        })?;
        self.emit(SessionEvent::Busy {
            message: message.to_string(),
            trace_id: trace_id.to_string(),
        });
        Ok(OperationGuard {
            busy: Some(busy),
            emitter: &self.emitter,
            trace_id: trace_id.to_string(),
        })
    }

    pub fn ensure_adb(&self, trace_id: &str) -> Result<(), AppError> {
        self.runner.executor().ensure_available(trace_id).map_err(|err| {
            warn!(trace_id = %trace_id, error = %err.error, "adb executable missing");
            self.log().append("[error] adb executable not found");
            err
        })
    }

    /// Accepts only `Connected`; any other state is refused with a notification.
    pub fn guard(&self, state: DeviceState, trace_id: &str) -> bool {
        let Some((title, guidance)) = not_ready_notice(state) else {
            return true;
        };
        info!(trace_id = %trace_id, state = ?state, "device not ready");
        self.emit(SessionEvent::DeviceNotReady {
            state,
            title: title.to_string(),
            guidance: guidance.to_string(),
            trace_id: trace_id.to_string(),
        });
        false
    }

    fn require_ready(&self, state: DeviceState, trace_id: &str) -> Result<(), AppError> {
        if self.guard(state, trace_id) {
            return Ok(());
        }
        let guidance = not_ready_notice(state)
            .map(|(_, guidance)| guidance)
            .unwrap_or_else(|| state.status_message());
        Err(AppError::device_not_ready(guidance, trace_id))
    }

    pub async fn probe(&self, trace_id: &str) -> Result<DeviceState, AppError> {
        probe_device_state(&self.runner, trace_id).await
    }

    fn publish_status(&self, state: DeviceState, trace_id: &str) -> StatusReport {
        let report = StatusReport::from_state(state, self.is_busy());
        self.emit(SessionEvent::Status {
            report: report.clone(),
            trace_id: trace_id.to_string(),
        });
        report
    }

    pub async fn refresh_status(&self, trace_id: &str) -> Result<StatusReport, AppError> {
        self.ensure_adb(trace_id)?;
        let state = self.probe(trace_id).await?;
        Ok(self.publish_status(state, trace_id))
    }

    /// Restarts the adb server and re-probes the device.
    pub async fn repair_connection(&self, trace_id: &str) -> Result<StatusReport, AppError> {
        let state = {
            let _op = self.begin("Repairing connection...", trace_id)?;
            self.ensure_adb(trace_id)?;
            self.runner
                .run(vec!["kill-server".to_string()], false, trace_id)
                .await?;
            self.runner
                .run(vec!["start-server".to_string()], false, trace_id)
                .await?;
            self.probe(trace_id).await?
        };
        Ok(self.publish_status(state, trace_id))
    }

    fn install_args(&self, apk: &Path) -> Vec<String> {
        let mut args = vec!["install".to_string()];
        if self.install_settings.replace_existing {
            args.push("-r".to_string());
        }
        if self.install_settings.allow_downgrade {
            args.push("-d".to_string());
        }
        if self.install_settings.allow_test_packages {
            args.push("-t".to_string());
        }
        args.push(apk.to_string_lossy().to_string());
        args
    }

    /// Installs one APK. A failed install is an `Ok` outcome with a reason;
    /// errors are reserved for the install never reaching the device.
    pub async fn install_apk(&self, apk_path: &str, trace_id: &str) -> Result<InstallOutcome, AppError> {
        let started = Instant::now();
        let (outcome, state) = {
            let _op = self.begin("Installing app...", trace_id)?;
            self.ensure_adb(trace_id)?;
            let apk = validate_apk_path(apk_path, trace_id)?;
            let state = self.probe(trace_id).await?;
            self.require_ready(state, trace_id)?;

            let result = self
                .runner
                .run_with_timeout(self.install_args(&apk), false, self.install_timeout, trace_id)
                .await?;
            let outcome = self.classifier.classify_result(&result, started.elapsed());
            let stats = self.state.record_install(&outcome);
            let file_name = display_file_name(&apk);
            info!(
                trace_id = %trace_id,
                file = %file_name,
                success = outcome.success,
                reason = outcome.reason_token.as_deref().unwrap_or(""),
                elapsed = %format_elapsed(outcome.elapsed),
                "install finished"
            );
            self.emit(SessionEvent::InstallFinished {
                file_name,
                outcome: outcome.clone(),
                stats,
                trace_id: trace_id.to_string(),
            });

            let state = match self.probe(trace_id).await {
                Ok(state) => Some(state),
                Err(err) => {
                    warn!(trace_id = %trace_id, error = %err.error, "status refresh after install failed");
                    None
                }
            };
            (outcome, state)
        };
        if let Some(state) = state {
            self.publish_status(state, trace_id);
        }
        Ok(outcome)
    }

    /// Types `text` on the headset through `adb shell input text`.
    pub async fn send_text(&self, text: &str, trace_id: &str) -> Result<CommandResult, AppError> {
        let _op = self.begin("Sending text...", trace_id)?;
        self.ensure_adb(trace_id)?;
        if text.trim().is_empty() {
            return Err(AppError::validation(
                "Enter the text to send first.",
                trace_id,
            ));
        }
        let state = self.probe(trace_id).await?;
        self.require_ready(state, trace_id)?;

        let args = vec![
            "shell".to_string(),
            "input".to_string(),
            "text".to_string(),
            encode_input_text(text),
        ];
        self.runner.run(args, false, trace_id).await
    }
}
