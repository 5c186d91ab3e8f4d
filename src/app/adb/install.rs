use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::app::adb::runner::CommandResult;
use crate::app::models::{InstallFailureKind, InstallOutcome};

pub const NO_OUTPUT_REASON: &str = "no output received";
const SUCCESS_MARKER: &str = "success";

/// Turns the output of one `adb install` call into an outcome.
///
/// The default implementation reads adb's informal text protocol; callers only
/// depend on this trait so a structured parser can replace it.
pub trait InstallClassifier: Send + Sync {
    fn classify(&self, exit_code: i32, stdout: &str, stderr: &str, elapsed: Duration)
        -> InstallOutcome;

    fn classify_result(&self, result: &CommandResult, elapsed: Duration) -> InstallOutcome {
        self.classify(result.exit_code, &result.stdout, &result.stderr, elapsed)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextInstallClassifier;

impl InstallClassifier for TextInstallClassifier {
    fn classify(
        &self,
        exit_code: i32,
        stdout: &str,
        stderr: &str,
        elapsed: Duration,
    ) -> InstallOutcome {
        classify_install_output(exit_code, stdout, stderr, elapsed)
    }
}

fn failure_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)Failure\s*\[(?P<reason>[^\]]+)\]").expect("failure pattern is valid")
    })
}

pub fn classify_install_output(
    exit_code: i32,
    stdout: &str,
    stderr: &str,
    elapsed: Duration,
) -> InstallOutcome {
    let combined = format!("{stdout}\n{stderr}");
    // Plain substring match: an error that merely mentions "success" passes.
    let success = exit_code == 0 && combined.to_lowercase().contains(SUCCESS_MARKER);

    if success {
        return InstallOutcome {
            success: true,
            reason_token: None,
            failure: None,
            advice: String::new(),
            elapsed,
        };
    }

    let failure = match_failure_kind(&combined);
    InstallOutcome {
        success: false,
        reason_token: Some(extract_failure_reason(&combined)),
        failure: Some(failure),
        advice: failure.advice().to_string(),
        elapsed,
    }
}

pub fn extract_failure_reason(output: &str) -> String {
    if output.trim().is_empty() {
        return NO_OUTPUT_REASON.to_string();
    }
    if let Some(captures) = failure_pattern().captures(output) {
        if let Some(reason) = captures.name("reason") {
            return reason.as_str().to_string();
        }
    }
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(NO_OUTPUT_REASON)
        .to_string()
}

pub fn match_failure_kind(output: &str) -> InstallFailureKind {
    let upper = output.to_uppercase();
    InstallFailureKind::MATCH_ORDER
        .into_iter()
        .find(|kind| kind.markers().iter().any(|marker| upper.contains(marker)))
        .unwrap_or(InstallFailureKind::Unrecognized)
}

/// `mm:ss`, minutes are not capped at 59.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: Duration = Duration::from_millis(4_250);

    #[test]
    fn success_requires_exit_zero_and_marker() {
        let outcome = classify_install_output(0, "Performing Streamed Install\nSuccess", "", D);
        assert!(outcome.success);
        assert_eq!(outcome.reason_token, None);
        assert!(outcome.advice.is_empty());
        assert_eq!(outcome.elapsed, D);

        assert!(classify_install_output(0, "", "SUCCESS", Duration::ZERO).success);
        assert!(!classify_install_output(1, "Success", "", D).success);
        assert!(!classify_install_output(0, "Performing Streamed Install", "", D).success);
    }

    #[test]
    fn mentioning_success_in_an_error_still_passes() {
        let outcome = classify_install_output(0, "", "error: no success this time", D);
        assert!(outcome.success);
    }

    #[test]
    fn already_exists_reason_and_advice() {
        let outcome =
            classify_install_output(1, "Failure [INSTALL_FAILED_ALREADY_EXISTS]", "", D);
        assert!(!outcome.success);
        assert_eq!(
            outcome.reason_token.as_deref(),
            Some("INSTALL_FAILED_ALREADY_EXISTS")
        );
        assert_eq!(outcome.failure, Some(InstallFailureKind::AlreadyExists));
        assert_eq!(outcome.advice, InstallFailureKind::AlreadyExists.advice());
    }

    #[test]
    fn reason_pattern_is_case_insensitive_and_allows_space() {
        let output = "adb: failed to install app.apk: failure[INSTALL_FAILED_UPDATE_INCOMPATIBLE: Package com.x signatures do not match]";
        let outcome = classify_install_output(1, "", output, D);
        assert_eq!(
            outcome.reason_token.as_deref(),
            Some("INSTALL_FAILED_UPDATE_INCOMPATIBLE: Package com.x signatures do not match")
        );
        assert_eq!(outcome.failure, Some(InstallFailureKind::UpdateIncompatible));
    }

    #[test]
    fn empty_output_reports_no_output() {
        let outcome = classify_install_output(1, "", "", D);
        assert_eq!(outcome.reason_token.as_deref(), Some(NO_OUTPUT_REASON));
        assert_eq!(outcome.failure, Some(InstallFailureKind::Unrecognized));

        let outcome = classify_install_output(0, "  \r\n", "\t", D);
        assert!(!outcome.success);
        assert_eq!(outcome.reason_token.as_deref(), Some(NO_OUTPUT_REASON));
    }

    #[test]
    fn falls_back_to_first_non_empty_line() {
        let outcome = classify_install_output(
            1,
            "\n   \n",
            "  adb: error: failed to get feature set: device offline  \nmore",
            D,
        );
        assert_eq!(
            outcome.reason_token.as_deref(),
            Some("adb: error: failed to get feature set: device offline")
        );
        assert_eq!(outcome.failure, Some(InstallFailureKind::UnstableConnection));
    }

    #[test]
    fn advice_follows_fixed_priority() {
        let cases = [
            ("Failure [INSTALL_FAILED_VERSION_DOWNGRADE]", InstallFailureKind::VersionDowngrade),
            ("Failure [INSTALL_PARSE_FAILED_NOT_APK]", InstallFailureKind::ParseFailed),
            ("Failure [INSTALL_FAILED_INSUFFICIENT_STORAGE]", InstallFailureKind::InsufficientStorage),
            ("Failure [INSTALL_FAILED_TEST_ONLY]", InstallFailureKind::TestOnly),
            ("Failure [INSTALL_FAILED_OLDER_SDK]", InstallFailureKind::OlderSdk),
            ("Failure [INSTALL_FAILED_NO_MATCHING_ABIS]", InstallFailureKind::NoMatchingAbis),
            ("error: no devices/emulators found", InstallFailureKind::UnstableConnection),
            ("adb: failed to read response: EOF", InstallFailureKind::UnstableConnection),
            ("Failure [INSTALL_FAILED_USER_RESTRICTED]", InstallFailureKind::Unrecognized),
        ];
        for (output, expected) in cases {
            assert_eq!(match_failure_kind(output), expected, "{output}");
        }

        // Earlier entries govern when several markers are present.
        let both = "Failure [INSTALL_FAILED_ALREADY_EXISTS]\ndevice offline";
        assert_eq!(match_failure_kind(both), InstallFailureKind::AlreadyExists);
        let both = "INSTALL_FAILED_NO_MATCHING_ABIS INSTALL_FAILED_VERSION_DOWNGRADE";
        assert_eq!(match_failure_kind(both), InstallFailureKind::VersionDowngrade);
    }

    #[test]
    fn trait_classifies_command_results() {
        let result = CommandResult {
            exit_code: 1,
            stdout: "Failure [INSTALL_FAILED_OLDER_SDK]".to_string(),
            stderr: String::new(),
        };
        let outcome = TextInstallClassifier.classify_result(&result, D);
        assert_eq!(outcome.failure, Some(InstallFailureKind::OlderSdk));
    }

    #[test]
    fn formats_elapsed_as_minutes_and_seconds() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00");
        assert_eq!(format_elapsed(D), "00:04");
        assert_eq!(format_elapsed(Duration::from_secs(754)), "12:34");
        assert_eq!(format_elapsed(Duration::from_secs(3_600)), "60:00");
    }
}
