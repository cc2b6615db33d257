mod delegate;

use self::delegate::delegate;
use crate::cache::{Descriptor, FsCacheStore};
use crate::context::ShimContext;
use crate::intercept::{Interceptor, Outcome};
use crate::logger::{log_invocation, log_spawn_failure, InvocationRecord, Route};
use crate::matcher::InstallPattern;
use crate::resolver::resolve_fallback;
use anyhow::Result;
use std::env;
use std::ffi::OsString;
use std::time::{Instant, SystemTime};
use stowaway_common::ShimSettings;

/// Main shim execution function. Returns the process exit code.
pub fn run_shim() -> Result<i32> {
    let ctx = ShimContext::from_current_exe()?;
    let settings = ShimSettings::load()?;
    let args: Vec<OsString> = env::args_os().skip(1).collect();

    if ShimContext::is_bypass_enabled() {
        log::debug!("SHIM_BYPASS set, delegating {} directly", ctx.command_name);
        let fallback = resolve_fallback(&ctx, &settings)?;
        return Ok(delegate(&fallback, &args, &ctx)?);
    }

    run_with(&ctx, &settings, &args)
}

fn run_with(ctx: &ShimContext, settings: &ShimSettings, args: &[OsString]) -> Result<i32> {
    let start_time = Instant::now();
    let timestamp = SystemTime::now();
    let text_args: Vec<String> = args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    if let Some(pattern) = InstallPattern::from_settings(settings) {
        if pattern.matches(&text_args) {
            let store = FsCacheStore::new(settings.cache_root_path()?);
            let descriptor = Descriptor::from_settings(pattern.package(), &settings.descriptor);
            let interceptor =
                Interceptor::new(pattern, store, settings.payload_source_path()?, descriptor);

            if let Outcome::Intercepted { entry, populated } = interceptor.handle(&text_args)? {
                eprintln!(
                    "stowaway: offline mode, using cached {} from {}",
                    interceptor.package(),
                    entry.display()
                );
                trace(
                    ctx,
                    args,
                    InvocationRecord {
                        route: Route::Intercepted,
                        exit_code: 0,
                        duration: start_time.elapsed(),
                        timestamp,
                        resolved_path: None,
                        cache_entry: Some(&entry),
                        populated: Some(populated),
                    },
                );
                return Ok(0);
            }
        }
    }

    let fallback = resolve_fallback(ctx, settings)?;
    log::debug!("delegating to {}", fallback.display());

    let exit_code = match delegate(&fallback, args, ctx) {
        Ok(code) => code,
        Err(err) => {
            let err = anyhow::Error::new(err);
            log_spawn_failure(ctx, &fallback, timestamp, &err);
            return Err(err);
        }
    };

    trace(
        ctx,
        args,
        InvocationRecord {
            route: Route::Delegated,
            exit_code,
            duration: start_time.elapsed(),
            timestamp,
            resolved_path: Some(fallback.as_path()),
            cache_entry: None,
            populated: None,
        },
    );

    Ok(exit_code)
}

fn trace(ctx: &ShimContext, args: &[OsString], record: InvocationRecord<'_>) {
    if let Some(log_path) = &ctx.log_file {
        if let Err(e) = log_invocation(log_path, ctx, args, &record) {
            log::warn!("Failed to log execution: {e}");
        }
    }
}
