//! Shim execution context and environment detection
//!
//! Captures the invoked name, the directory the shim lives in, a clean search
//! path for fallback resolution, and the session/depth correlation values
//! handed down to the child.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable names used by the shim
pub const SHIM_BYPASS_VAR: &str = "SHIM_BYPASS"; // "1" skips matching and tracing
pub const SHIM_DEPTH_VAR: &str = "SHIM_DEPTH"; // Nesting depth (0-based)
pub const SHIM_SESSION_VAR: &str = "SHIM_SESSION_ID"; // UUIDv7 shared by a command chain
pub const ORIGINAL_PATH_VAR: &str = "SHIM_ORIGINAL_PATH"; // PATH without the shim directory
pub const TRACE_LOG_VAR: &str = "SHIM_TRACE_LOG"; // Optional JSONL trace file

/// Execution context for a shim invocation
#[derive(Debug)]
pub struct ShimContext {
    /// Name the shim was invoked as (e.g. "pkgtool")
    pub command_name: String,
    /// Directory containing the shim binary
    pub shim_dir: PathBuf,
    /// Search paths with the shim directory removed; may be empty
    pub search_paths: Vec<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub session_id: String,
    pub depth: u32,
}

impl ShimContext {
    /// Create context from current executable and environment
    pub fn from_current_exe() -> Result<Self> {
        let exe = env::current_exe().context("Failed to get current executable path")?;

        let shim_dir = exe
            .parent()
            .ok_or_else(|| anyhow!("Executable has no parent directory"))?
            .to_path_buf();

        let command_name = exe
            .file_name()
            .ok_or_else(|| anyhow!("Executable has no filename"))?
            .to_string_lossy()
            .to_string();

        let original_path = env::var(ORIGINAL_PATH_VAR).ok();
        let search_paths = match build_clean_search_path(&shim_dir, original_path) {
            Ok(paths) => paths,
            Err(err) => {
                log::debug!("no search path for fallback resolution: {err}");
                Vec::new()
            }
        };

        let log_file = env::var(TRACE_LOG_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let depth = env::var(SHIM_DEPTH_VAR)
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);

        let session_id =
            env::var(SHIM_SESSION_VAR).unwrap_or_else(|_| uuid::Uuid::now_v7().to_string());

        Ok(Self {
            command_name,
            shim_dir,
            search_paths,
            log_file,
            session_id,
            depth,
        })
    }

    /// When SHIM_BYPASS=1 the shim skips matching and tracing and runs the
    /// fallback directly.
    pub fn is_bypass_enabled() -> bool {
        env::var(SHIM_BYPASS_VAR).as_deref() == Ok("1")
    }

    /// Variables set on the fallback child: session correlation, depth + 1,
    /// and the clean PATH (only if not already recorded upstream).
    pub fn child_env(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            (SHIM_SESSION_VAR, self.session_id.clone()),
            (SHIM_DEPTH_VAR, (self.depth + 1).to_string()),
        ];

        if env::var(ORIGINAL_PATH_VAR).is_err() && !self.search_paths.is_empty() {
            if let Ok(joined) = env::join_paths(&self.search_paths) {
                vars.push((ORIGINAL_PATH_VAR, joined.to_string_lossy().into_owned()));
            }
        }

        vars
    }
}

/// Build clean search path excluding shim directory
pub fn build_clean_search_path(
    shim_dir: &Path,
    original_path: Option<String>,
) -> Result<Vec<PathBuf>> {
    let path_str = original_path
        .or_else(|| env::var("PATH").ok())
        .ok_or_else(|| anyhow!("No PATH or SHIM_ORIGINAL_PATH found"))?;

    let separator = if cfg!(windows) { ';' } else { ':' };

    fn is_good_dir(p: &str) -> bool {
        let pb = Path::new(p);
        pb.is_absolute() && pb.is_dir()
    }

    // Deduplicate for predictable resolution
    let mut seen = std::collections::HashSet::new();
    let paths: Vec<PathBuf> = path_str
        .split(separator)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/'))
        .filter(|p| !Path::new(p).starts_with(shim_dir))
        .filter(|p| is_good_dir(p))
        .filter(|p| seen.insert(p.to_string()))
        .map(PathBuf::from)
        .collect();

    if paths.is_empty() {
        return Err(anyhow!("No valid search paths found after filtering"));
    }

    Ok(paths)
}
