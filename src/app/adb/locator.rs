use std::env;
use std::path::{Path, PathBuf};

use which::which;

pub const ADB_MISSING_REMEDIATION: &str = "adb executable not found.\n\n\
Place adb in the `adb` folder next to this program (on Windows also \
AdbWinApi.dll and AdbWinUsbApi.dll), install Android platform-tools on PATH, \
or set adb.command_path in the config file.";

fn adb_file_name() -> &'static str {
    if cfg!(windows) {
        "adb.exe"
    } else {
        "adb"
    }
}

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

/// `<exe dir>/adb/adb[.exe]`, the layout the tool ships with.
pub fn bundled_adb_path() -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    let dir = exe.parent()?;
    Some(dir.join("adb").join(adb_file_name()))
}

fn sdk_platform_tools_adb() -> Option<PathBuf> {
    ["ANDROID_HOME", "ANDROID_SDK_ROOT"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .filter(|value| !value.trim().is_empty())
        .map(|root| PathBuf::from(root).join("platform-tools").join(adb_file_name()))
        .find(|candidate| candidate.is_file())
}

/// Picks the adb program: configured path, bundled copy, PATH, then the
/// Android SDK. Falls back to the bare name so validation can report it.
pub fn resolve_adb_program(config_command_path: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if !normalized.is_empty() {
        return normalized;
    }
    if let Some(bundled) = bundled_adb_path().filter(|path| path.is_file()) {
        return bundled.to_string_lossy().to_string();
    }
    if which("adb").is_ok() {
        return "adb".to_string();
    }
    if let Some(sdk) = sdk_platform_tools_adb() {
        return sdk.to_string_lossy().to_string();
    }
    "adb".to_string()
}

fn is_bare_name(program: &str) -> bool {
    !program.contains('/') && !program.contains('\\')
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("ADB command is empty".to_string());
    }
    if is_bare_name(program) {
        return which(program)
            .map(|_| ())
            .map_err(|_| format!("ADB executable `{program}` not found on PATH"));
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("ADB executable not found at the configured path".to_string());
    }
    Ok(())
}
