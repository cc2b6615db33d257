//! Stowaway shim entry point
//!
//! Installed under the name of the wrapped tool, ahead of it on PATH. One
//! configured install invocation is served from the local cache; everything
//! else runs the real tool.

use std::process::ExitCode;
use stowaway_shim::{exit_code_for, exit_status_byte, run_shim};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    match run_shim() {
        Ok(code) => ExitCode::from(exit_status_byte(code)),
        Err(e) => {
            log::debug!("shim error: {e:?}");
            eprintln!("stowaway: {e:#}");
            ExitCode::from(exit_status_byte(exit_code_for(&e)))
        }
    }
}
