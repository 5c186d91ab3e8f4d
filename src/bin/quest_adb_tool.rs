use std::path::PathBuf;
use std::sync::Arc;

use quest_adb_tool_lib::app::adb::apk::apk_preview;
use quest_adb_tool_lib::app::adb::install::format_elapsed;
use quest_adb_tool_lib::app::config::{load_config, load_config_from_path, AppConfig};
use quest_adb_tool_lib::app::error::{AppError, ERR_DEVICE_NOT_READY};
use quest_adb_tool_lib::app::logging::{init_logging, open_session_log, resolve_log_dir};
use quest_adb_tool_lib::app::models::{CommandResponse, SessionEvent};
use quest_adb_tool_lib::app::session::{resolve_trace_id, Session, SessionEmitter};
use serde::Serialize;

const USAGE: &str = "Usage: quest_adb_tool [--json] [--config PATH] [--trace-id ID] <command>\n\
\n\
Commands:\n\
  status            Probe the headset and print its connection state\n\
  repair            Restart the adb server and probe again\n\
  install <apk>     Install one APK on the headset\n\
  text <text...>    Type text into the focused field on the headset\n\
  log-path          Print the session log directory\n";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    Repair,
    Install(String),
    Text(String),
    LogPath,
}

#[derive(Debug, Clone)]
struct Args {
    json: bool,
    config: Option<PathBuf>,
    trace_id: Option<String>,
    command: Command,
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut json = false;
    let mut config: Option<PathBuf> = None;
    let mut trace_id: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut it = raw.into_iter();
    while let Some(arg) = it.next() {
        // Everything after the command word belongs to it, so `text --json` types "--json".
        if !positional.is_empty() {
            positional.push(arg);
            continue;
        }
        match arg.as_str() {
            "--json" => {
                json = true;
            }
            "--config" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config = Some(PathBuf::from(value));
            }
            "--trace-id" => {
                trace_id = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if trace_id.is_none() {
                    return Err("--trace-id requires a value".to_string());
                }
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            other if other.starts_with("--") => return Err(format!("Unknown arg: {other}")),
            _ => positional.push(arg),
        }
    }

    let mut words = positional.into_iter();
    let name = words
        .next()
        .ok_or_else(|| format!("Missing command\n\n{USAGE}"))?;
    let rest: Vec<String> = words.collect();
    let command = match name.as_str() {
        "status" | "repair" | "log-path" if !rest.is_empty() => {
            return Err(format!("{name} takes no arguments"));
        }
        "status" => Command::Status,
        "repair" => Command::Repair,
        "log-path" => Command::LogPath,
        "install" => match rest.as_slice() {
            [path] => Command::Install(path.clone()),
            [] => return Err("install requires an APK path".to_string()),
            _ => return Err("install takes exactly one APK path".to_string()),
        },
        "text" => {
            if rest.is_empty() {
                return Err("text requires the text to send".to_string());
            }
            Command::Text(rest.join(" "))
        }
        other => return Err(format!("Unknown command: {other}\n\n{USAGE}")),
    };

    Ok(Args {
        json,
        config,
        trace_id,
        command,
    })
}

fn event_emitter(json: bool) -> SessionEmitter {
    Arc::new(move |event: SessionEvent| {
        if json {
            if let Ok(line) = serde_json::to_string(&event) {
                eprintln!("{line}");
            }
            return;
        }
        match event {
            SessionEvent::Busy { message, .. } => eprintln!("{message}"),
            SessionEvent::DeviceNotReady { title, guidance, .. } => {
                eprintln!("{title}\n{guidance}");
            }
            SessionEvent::InstallFinished {
                file_name,
                outcome,
                stats,
                ..
            } => {
                if outcome.success {
                    eprintln!(
                        "Installed {file_name} ({})",
                        format_elapsed(outcome.elapsed)
                    );
                } else {
                    eprintln!(
                        "Install of {file_name} failed: {}",
                        outcome.reason_token.as_deref().unwrap_or_default()
                    );
                    if !outcome.advice.is_empty() {
                        eprintln!("{}", outcome.advice);
                    }
                }
                eprintln!(
                    "Installs this session: {} ok, {} failed",
                    stats.success_count, stats.fail_count
                );
            }
            SessionEvent::Idle { .. } | SessionEvent::Status { .. } => {}
        }
    })
}

fn print_data<T: Serialize>(json: bool, trace_id: &str, data: &T, text: String) {
    if json {
        let response = CommandResponse {
            trace_id: trace_id.to_string(),
            data,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        println!("{text}");
    }
}

fn print_error(json: bool, err: &AppError) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(err).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        for line in error_lines(err) {
            eprintln!("{line}");
        }
    }
}

/// Plain-text rendering of an error. Device-not-ready guidance has already been
/// printed by the `DeviceNotReady` event, so only the code is repeated.
fn error_lines(err: &AppError) -> Vec<String> {
    let headline = if err.is(ERR_DEVICE_NOT_READY) {
        format!("error: {}", err.code)
    } else {
        format!("error: {err}")
    };
    vec![headline, format!("trace_id: {}", err.trace_id)]
}

async fn run(args: &Args, config: &AppConfig, trace_id: &str) -> Result<bool, AppError> {
    if args.command == Command::LogPath {
        let dir = resolve_log_dir(&config.logging);
        print_data(
            args.json,
            trace_id,
            &dir.to_string_lossy(),
            dir.display().to_string(),
        );
        return Ok(true);
    }

    let log = Arc::new(open_session_log(&config.logging));
    if let Some(path) = log.path() {
        tracing::info!(trace_id = %trace_id, path = %path.display(), "session log opened");
    }
    let session = Session::from_config(config, log, event_emitter(args.json));

    match &args.command {
        Command::Status => {
            let report = session.refresh_status(trace_id).await?;
            let text = format!("{} (actions enabled: {})", report.message, report.actions_enabled);
            print_data(args.json, trace_id, &report, text);
            Ok(report.actions_enabled)
        }
        Command::Repair => {
            let report = session.repair_connection(trace_id).await?;
            let text = report.message.clone();
            print_data(args.json, trace_id, &report, text);
            Ok(true)
        }
        Command::Install(path) => {
            if !args.json {
                if let Some(preview) = apk_preview(path) {
                    eprintln!("{} ({})", preview.file_name, preview.size_label);
                }
            }
            let outcome = session.install_apk(path, trace_id).await?;
            let text = if outcome.success {
                format!("Success ({})", format_elapsed(outcome.elapsed))
            } else {
                format!(
                    "Failure: {}",
                    outcome.reason_token.as_deref().unwrap_or_default()
                )
            };
            print_data(args.json, trace_id, &outcome, text);
            Ok(outcome.success)
        }
        Command::Text(text) => {
            let result = session.send_text(text, trace_id).await?;
            let summary = format!("exit={}", result.exit_code);
            print_data(args.json, trace_id, &result, summary);
            Ok(result.exit_code == 0)
        }
        Command::LogPath => Ok(true),
    }
}

#[tokio::main]
async fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };
    let trace_id = resolve_trace_id(args.trace_id.clone());

    let loaded = match &args.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };
    let config = match loaded {
        Ok(cfg) => cfg,
        Err(err) => {
            print_error(args.json, &AppError { trace_id: trace_id.clone(), ..err });
            std::process::exit(1);
        }
    };
    init_logging(&config.logging.log_level);

    match run(&args, &config, &trace_id).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            print_error(args.json, &err);
            std::process::exit(1);
        }
    }
}
