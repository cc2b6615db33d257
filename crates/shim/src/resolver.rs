//! Fallback target resolution
//!
//! An explicitly configured fallback is used as-is; a missing or
//! non-executable path surfaces when the spawn fails. Otherwise the shim's own
//! invoked name is looked up on the clean search path, skipping any candidate
//! that is the shim binary itself.

use crate::context::ShimContext;
use crate::error::ShimError;
use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};
use stowaway_common::ShimSettings;

pub(crate) fn resolve_fallback(ctx: &ShimContext, settings: &ShimSettings) -> Result<PathBuf> {
    if let Some(explicit) = settings.fallback_path()? {
        return Ok(explicit);
    }

    let current = env::current_exe().ok();
    resolve_on_path(&ctx.command_name, &ctx.search_paths, current.as_deref())
        .ok_or_else(|| ShimError::FallbackNotFound(ctx.command_name.clone()).into())
}

/// First executable named `command` in `search_paths` that is not `skip`.
pub(crate) fn resolve_on_path(
    command: &str,
    search_paths: &[PathBuf],
    skip: Option<&Path>,
) -> Option<PathBuf> {
    let skip = skip.and_then(|p| p.canonicalize().ok());

    for dir in search_paths {
        let candidate = dir.join(command);

        #[cfg(windows)]
        {
            let extensions =
                env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());

            for ext in extensions.split(';') {
                if !ext.is_empty() {
                    let mut path_with_ext = candidate.clone();
                    path_with_ext.set_extension(&ext[1..]);
                    if is_executable(&path_with_ext) && !is_same_file(&path_with_ext, skip.as_deref()) {
                        return Some(path_with_ext);
                    }
                }
            }
        }

        if is_executable(&candidate) && !is_same_file(&candidate, skip.as_deref()) {
            return Some(candidate);
        }
    }

    None
}

fn is_same_file(candidate: &Path, skip: Option<&Path>) -> bool {
    match (skip, candidate.canonicalize()) {
        (Some(skip), Ok(resolved)) => resolved == skip,
        _ => false,
    }
}

/// Check if a path is executable (cross-platform)
pub(crate) fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            metadata.is_file() && (metadata.permissions().mode() & 0o111 != 0)
        } else {
            false
        }
    }

    #[cfg(windows)]
    {
        std::fs::metadata(path)
            .map(|m| m.is_file())
            .unwrap_or(false)
    }
}
