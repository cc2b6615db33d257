use crate::context::ShimContext;
use crate::error::ShimError;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, ExitStatus};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Run the fallback with the original arguments and inherited stdio, and
/// return its exit code. No pre-check: a missing or non-executable target
/// fails at spawn.
pub(crate) fn delegate(
    fallback: &Path,
    args: &[OsString],
    ctx: &ShimContext,
) -> Result<i32, ShimError> {
    let mut cmd = Command::new(fallback);

    // Tools that inspect argv[0] see the name they were invoked as
    #[cfg(unix)]
    cmd.arg0(&ctx.command_name);

    let status = cmd
        .args(args)
        .envs(ctx.child_env())
        .status()
        .map_err(|source| ShimError::Delegation {
            path: fallback.to_path_buf(),
            source,
        })?;

    Ok(exit_code_from_status(&status))
}

/// Signal terminations map to `128 + signal`, as shells report them.
pub(crate) fn exit_code_from_status(status: &ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    status.code().unwrap_or(1)
}
