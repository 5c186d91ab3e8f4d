use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connectivity of the tethered headset as reported by `adb devices`.
///
/// Computed fresh on every probe and consumed immediately. `Unknown` is never
/// produced by the probe itself; it only stands in for "not ready" where a
/// state has not been determined yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceState {
    Connected,
    Unauthorized,
    NotFound,
    Unknown,
}

impl DeviceState {
    pub fn is_ready(&self) -> bool {
        matches!(self, DeviceState::Connected)
    }

    pub fn status_message(&self) -> &'static str {
        match self {
            DeviceState::Connected => "Connected, ready to use.",
            DeviceState::Unauthorized => {
                "Authorization required. Put on the headset and tap \"Allow USB debugging\"."
            }
            DeviceState::NotFound => "No headset detected. Connect it with a data cable.",
            DeviceState::Unknown => "Device status unknown.",
        }
    }

    pub fn indicator(&self) -> StatusIndicator {
        match self {
            DeviceState::Connected => StatusIndicator::Ok,
            DeviceState::Unauthorized => StatusIndicator::Warn,
            DeviceState::NotFound => StatusIndicator::Bad,
            DeviceState::Unknown => StatusIndicator::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusIndicator {
    Ok,
    Warn,
    Bad,
    Idle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReport {
    pub state: DeviceState,
    pub message: String,
    pub indicator: StatusIndicator,
    /// Install and send-text triggers may be offered.
    pub actions_enabled: bool,
}

impl StatusReport {
    pub fn from_state(state: DeviceState, busy: bool) -> Self {
        Self {
            state,
            message: state.status_message().to_string(),
            indicator: state.indicator(),
            actions_enabled: state.is_ready() && !busy,
        }
    }
}

/// Known install failure families, tested against the upper-cased output in
/// declaration order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstallFailureKind {
    VersionDowngrade,
    UpdateIncompatible,
    AlreadyExists,
    ParseFailed,
    InsufficientStorage,
    TestOnly,
    OlderSdk,
    NoMatchingAbis,
    UnstableConnection,
    Unrecognized,
}

impl InstallFailureKind {
    pub const MATCH_ORDER: [InstallFailureKind; 9] = [
        InstallFailureKind::VersionDowngrade,
        InstallFailureKind::UpdateIncompatible,
        InstallFailureKind::AlreadyExists,
        InstallFailureKind::ParseFailed,
        InstallFailureKind::InsufficientStorage,
        InstallFailureKind::TestOnly,
        InstallFailureKind::OlderSdk,
        InstallFailureKind::NoMatchingAbis,
        InstallFailureKind::UnstableConnection,
    ];

    pub fn markers(&self) -> &'static [&'static str] {
        match self {
            InstallFailureKind::VersionDowngrade => &["INSTALL_FAILED_VERSION_DOWNGRADE"],
            InstallFailureKind::UpdateIncompatible => &["INSTALL_FAILED_UPDATE_INCOMPATIBLE"],
            InstallFailureKind::AlreadyExists => &["INSTALL_FAILED_ALREADY_EXISTS"],
            InstallFailureKind::ParseFailed => &["INSTALL_PARSE_FAILED"],
            InstallFailureKind::InsufficientStorage => &["INSTALL_FAILED_INSUFFICIENT_STORAGE"],
            InstallFailureKind::TestOnly => &["INSTALL_FAILED_TEST_ONLY"],
            InstallFailureKind::OlderSdk => &["INSTALL_FAILED_OLDER_SDK"],
            InstallFailureKind::NoMatchingAbis => &["INSTALL_FAILED_NO_MATCHING_ABIS"],
            InstallFailureKind::UnstableConnection => {
                &["OFFLINE", "NO DEVICES/EMULATORS FOUND", "EOF"]
            }
            InstallFailureKind::Unrecognized => &[],
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            InstallFailureKind::VersionDowngrade => {
                "A newer version is already installed. Uninstall it first or install with downgrade allowed."
            }
            InstallFailureKind::UpdateIncompatible => {
                "Signature mismatch. Uninstall the existing version from the device, then install again."
            }
            InstallFailureKind::AlreadyExists => {
                "An app with the same package name already exists. Uninstall the old version, then install again."
            }
            InstallFailureKind::ParseFailed => {
                "The APK may be corrupt or incomplete. Download it again."
            }
            InstallFailureKind::InsufficientStorage => {
                "Not enough storage on the device. Free up some space first."
            }
            InstallFailureKind::TestOnly => "This APK is a test-only package.",
            InstallFailureKind::OlderSdk => {
                "The device OS version is too old for this APK."
            }
            InstallFailureKind::NoMatchingAbis => {
                "The APK's CPU architecture does not match the device."
            }
            InstallFailureKind::UnstableConnection => {
                "The adb connection is unstable. Prefer a USB 2.0 Type-A port on the mainboard, re-authorize USB debugging and retry."
            }
            InstallFailureKind::Unrecognized => {
                "Inspect the adb output in the log and check the device connection, authorization and APK source."
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallOutcome {
    pub success: bool,
    pub reason_token: Option<String>,
    pub failure: Option<InstallFailureKind>,
    /// Empty on success.
    pub advice: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InstallStats {
    pub success_count: u64,
    pub fail_count: u64,
}

impl InstallStats {
    pub fn total(&self) -> u64 {
        self.success_count + self.fail_count
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApkPreview {
    pub path: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub size_label: String,
    /// Manifest parsing is not performed; always unresolved.
    pub package_name: Option<String>,
    pub version_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Busy {
        message: String,
        trace_id: String,
    },
    Idle {
        trace_id: String,
    },
    DeviceNotReady {
        state: DeviceState,
        title: String,
        guidance: String,
        trace_id: String,
    },
    InstallFinished {
        file_name: String,
        outcome: InstallOutcome,
        stats: InstallStats,
        trace_id: String,
    },
    Status {
        report: StatusReport,
        trace_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse<T> {
    pub trace_id: String,
    pub data: T,
}
