use crate::cache::CacheError;
use std::io;
use std::path::PathBuf;
use stowaway_common::settings::is_user_error;

/// Fatal shim failures. Every variant ends the invocation.
#[derive(thiserror::Error, Debug)]
pub enum ShimError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to read payload source {}: {source}", path.display())]
    PayloadSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no payload source configured for '{0}' (set payload_source or STOWAWAY_PAYLOAD)")]
    PayloadNotConfigured(String),

    #[error("failed to execute {}: {source}", path.display())]
    Delegation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("fallback for '{0}' not found on PATH (set fallback or STOWAWAY_FALLBACK)")]
    FallbackNotFound(String),
}

impl ShimError {
    /// Shell conventions: 127 for a missing command, 126 for one that
    /// cannot be run, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::FallbackNotFound(_) => 127,
            Self::Delegation { source, .. } if source.kind() == io::ErrorKind::NotFound => 127,
            Self::Delegation { .. } => 126,
            _ => 1,
        }
    }
}

/// Exit code for an error returned by [`crate::run_shim`].
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(shim_err) = err.downcast_ref::<ShimError>() {
        return shim_err.exit_code();
    }
    if is_user_error(err) {
        return 1;
    }
    126
}

/// Narrow an exit code to the byte a process can report. Anything outside
/// 0..=255 becomes 1 so a failure never wraps around to success.
pub fn exit_status_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
