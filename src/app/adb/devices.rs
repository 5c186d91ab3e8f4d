use crate::app::adb::runner::{AdbExecutor, CommandRunner};
use crate::app::error::AppError;
use crate::app::models::DeviceState;

const HEADER_PREFIX: &str = "list of devices";
const CONNECTED_SUFFIX: &str = "\tdevice";
const UNAUTHORIZED_SUFFIX: &str = "\tunauthorized";
const UNAUTHORIZED_MARKER: &str = "unauthorized";

/// Classifies `adb devices` output. The first line carrying a known marker
/// decides; stderr is only consulted when no line matched.
pub fn parse_device_state(stdout: &str, stderr: &str) -> DeviceState {
    for line in stdout.split(['\r', '\n']).filter(|line| !line.is_empty()) {
        let lower = line.to_lowercase();
        if lower.starts_with(HEADER_PREFIX) {
            continue;
        }
        if lower.ends_with(CONNECTED_SUFFIX) {
            return DeviceState::Connected;
        }
        if lower.ends_with(UNAUTHORIZED_SUFFIX) {
            return DeviceState::Unauthorized;
        }
    }

    if stderr.to_lowercase().contains(UNAUTHORIZED_MARKER) {
        return DeviceState::Unauthorized;
    }

    DeviceState::NotFound
}

/// Runs `adb devices` without echoing the command line and classifies the reply.
/// Never returns `DeviceState::Unknown`.
pub async fn probe_device_state<E: AdbExecutor>(
    runner: &CommandRunner<E>,
    trace_id: &str,
) -> Result<DeviceState, AppError> {
    let result = runner
        .run(vec!["devices".to_string()], true, trace_id)
        .await?;
    Ok(parse_device_state(&result.stdout, &result.stderr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_line_wins_regardless_of_preceding_lines() {
        let output = "* daemon not running; starting now at tcp:5037\r\n\
                      * daemon started successfully\r\n\
                      List of devices attached\r\n\
                      1WMHH812345678\tdevice\r\n\r\n";
        assert_eq!(parse_device_state(output, ""), DeviceState::Connected);
    }

    #[test]
    fn unauthorized_line_without_device_line() {
        let output = "List of devices attached\n1WMHH812345678\tunauthorized\n\n";
        assert_eq!(parse_device_state(output, ""), DeviceState::Unauthorized);
    }

    #[test]
    fn first_marked_line_decides() {
        let output = "List of devices attached\nAAA\tunauthorized\nBBB\tdevice\n";
        assert_eq!(parse_device_state(output, ""), DeviceState::Unauthorized);

        let output = "List of devices attached\nBBB\tdevice\nAAA\tunauthorized\n";
        assert_eq!(parse_device_state(output, ""), DeviceState::Connected);
    }

    #[test]
    fn markers_are_case_insensitive() {
        assert_eq!(
            parse_device_state("list OF DEVICES attached\nAAA\tDEVICE\n", ""),
            DeviceState::Connected
        );
    }

    #[test]
    fn other_states_are_not_found() {
        let output = "List of devices attached\nAAA\toffline\nBBB\tno permissions\n";
        assert_eq!(parse_device_state(output, ""), DeviceState::NotFound);
        assert_eq!(parse_device_state("List of devices attached\n\n", ""), DeviceState::NotFound);
        assert_eq!(parse_device_state("", ""), DeviceState::NotFound);
    }

    #[test]
    fn space_separated_marker_does_not_count() {
        assert_eq!(
            parse_device_state("List of devices attached\nAAA device\n", ""),
            DeviceState::NotFound
        );
    }

    #[test]
    fn stderr_unauthorized_is_fallback() {
        assert_eq!(
            parse_device_state(
                "List of devices attached\n",
                "error: device UNAUTHORIZED.\nThis adb server's $ADB_VENDOR_KEYS is not set"
            ),
            DeviceState::Unauthorized
        );
        assert_eq!(
            parse_device_state("AAA\tdevice\n", "unauthorized"),
            DeviceState::Connected
        );
    }
}
