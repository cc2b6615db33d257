//! Structured JSONL trace records with session correlation
//!
//! One line per invocation when `SHIM_TRACE_LOG` is set. Sensitive argv
//! values are redacted unless `SHIM_LOG_OPTS=raw`.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::env;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::context::ShimContext;

/// Which branch an invocation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Intercepted,
    Delegated,
}

impl Route {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Intercepted => "intercepted",
            Self::Delegated => "delegated",
        }
    }
}

pub(crate) struct InvocationRecord<'a> {
    pub(crate) route: Route,
    pub(crate) exit_code: i32,
    pub(crate) duration: Duration,
    pub(crate) timestamp: SystemTime,
    pub(crate) resolved_path: Option<&'a Path>,
    pub(crate) cache_entry: Option<&'a Path>,
    pub(crate) populated: Option<bool>,
}

/// Log one invocation with full context
pub(crate) fn log_invocation(
    log_path: &Path,
    ctx: &ShimContext,
    args: &[OsString],
    record: &InvocationRecord<'_>,
) -> Result<()> {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("/unknown"));
    let argv: Vec<String> = std::iter::once(ctx.command_name.clone())
        .chain(redact_sensitive_argv(args))
        .collect();

    let mut entry = json!({
        "ts": format_timestamp(record.timestamp),
        "component": "shim",
        "command": ctx.command_name,
        "argv": argv,
        "cwd": cwd.to_string_lossy(),
        "route": record.route.as_str(),
        "exit_code": record.exit_code,
        "duration_ms": record.duration.as_millis(),
        "pid": std::process::id(),
        "hostname": gethostname::gethostname().to_string_lossy().to_string(),
        "platform": std::env::consts::OS,
        "depth": ctx.depth,
        "session_id": ctx.session_id,
        "isatty_stdin": atty::is(atty::Stream::Stdin),
        "isatty_stdout": atty::is(atty::Stream::Stdout),
        "isatty_stderr": atty::is(atty::Stream::Stderr),
        "shim_version": env!("SHIM_VERSION"),
        "shim_fingerprint": get_shim_fingerprint(),
    });

    #[cfg(unix)]
    {
        entry["ppid"] = json!(nix::unistd::getppid().as_raw());
    }

    if let Some(path) = record.resolved_path {
        entry["resolved_path"] = json!(path.display().to_string());
    }
    if let Some(path) = record.cache_entry {
        entry["cache_entry"] = json!(path.display().to_string());
    }
    if let Some(populated) = record.populated {
        entry["populated"] = json!(populated);
    }

    write_log_entry(log_path, &entry)
}

/// Record a fallback that could not be spawned.
pub(crate) fn log_spawn_failure(
    ctx: &ShimContext,
    fallback: &Path,
    timestamp: SystemTime,
    error: &anyhow::Error,
) {
    let Some(log_path) = &ctx.log_file else {
        return;
    };

    let mut entry = json!({
        "ts": format_timestamp(timestamp),
        "component": "shim",
        "command": ctx.command_name,
        "resolved_path": fallback.display().to_string(),
        "error": "spawn_failed",
        "depth": ctx.depth,
        "session_id": ctx.session_id,
        "shim_fingerprint": get_shim_fingerprint(),
    });

    let io_err = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<std::io::Error>());
    if let Some(io_err) = io_err {
        entry["spawn_error_kind"] = json!(format!("{:?}", io_err.kind()));
        if let Some(errno) = io_err.raw_os_error() {
            entry["spawn_errno"] = json!(errno);
        }
    }

    if let Err(err) = write_log_entry(log_path, &entry) {
        log::warn!("failed to write trace entry: {err}");
    }
}

/// Append a single JSON line, creating the file and its parent as needed.
pub(crate) fn write_log_entry(log_path: &Path, entry: &Value) -> Result<()> {
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let line = serde_json::to_string(entry)?;
    writeln!(file, "{line}")?;

    if env::var("SHIM_FSYNC").unwrap_or_default() == "1" {
        file.sync_all()?;
    }

    Ok(())
}

/// Redact sensitive command-line arguments
pub(crate) fn redact_sensitive_argv(argv: &[OsString]) -> Vec<String> {
    let mut result = Vec::with_capacity(argv.len());
    let mut i = 0;

    while i < argv.len() {
        let redacted = redact_sensitive(&argv[i].to_string_lossy());
        let is_flag = redacted == "***";
        result.push(redacted);

        // Sensitive flags take their value from the next argument
        if is_flag && i + 1 < argv.len() {
            result.push("***".to_string());
            i += 2;
        } else {
            i += 1;
        }
    }

    result
}

fn redact_sensitive(arg: &str) -> String {
    if env::var("SHIM_LOG_OPTS").as_deref() == Ok("raw") {
        return arg.to_string();
    }

    const SENSITIVE_KEYS: &[&str] = &["token", "password", "secret", "apikey", "auth"];
    if let Some((key, _)) = arg.split_once('=') {
        let lower = key.to_ascii_lowercase();
        if SENSITIVE_KEYS.iter().any(|k| lower.contains(k)) {
            return format!("{key}=***");
        }
    }

    const SENSITIVE_FLAGS: &[&str] = &[
        "--token",
        "--auth-token",
        "--password",
        "--secret",
        "--otp",
        "-p",
    ];
    if SENSITIVE_FLAGS.iter().any(|flag| arg.eq_ignore_ascii_case(flag)) {
        return "***".to_string();
    }

    arg.to_string()
}

/// Format timestamp as RFC3339 with milliseconds
pub(crate) fn format_timestamp(timestamp: SystemTime) -> String {
    let dt: chrono::DateTime<chrono::Utc> = timestamp.into();
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Get shim binary fingerprint for integrity verification
pub(crate) fn get_shim_fingerprint() -> String {
    use once_cell::sync::Lazy;

    static SHIM_FINGERPRINT: Lazy<String> = Lazy::new(|| {
        env::current_exe()
            .and_then(std::fs::read)
            .map(|bytes| format!("sha256:{:x}", Sha256::digest(&bytes)))
            .unwrap_or_else(|_| "sha256:unknown".to_string())
    });

    SHIM_FINGERPRINT.clone()
}
