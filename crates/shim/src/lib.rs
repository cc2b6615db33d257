//! Stowaway install-interception shim
//!
//! This library wraps a package-manager style executable. One fixed install
//! invocation (for example `add --force --exact <package>@latest`) is served
//! from a local cache instead of the network; everything else is forwarded to
//! the real executable untouched.
//!
//! ## Architecture
//!
//! The shim works by:
//! 1. Being installed under the wrapped tool's name, ahead of it on `PATH`
//! 2. Matching the arguments against the configured [`InstallPattern`]
//! 3. On a match, populating the cache entry once through a [`CacheStore`]
//!    and exiting 0 without running the real tool
//! 4. Otherwise resolving the fallback target and running it with the
//!    original arguments, propagating its exit status
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stowaway_shim::{exit_code_for, run_shim};
//!
//! fn main() {
//!     let code = match run_shim() {
//!         Ok(code) => code,
//!         Err(err) => {
//!             eprintln!("stowaway: {err:#}");
//!             exit_code_for(&err)
//!         }
//!     };
//!     std::process::exit(code);
//! }
//! ```

pub use cache::{CacheError, CacheStore, Descriptor, FsCacheStore, MemoryCacheStore};
pub use context::ShimContext;
pub use error::{exit_code_for, exit_status_byte, ShimError};
pub use exec::run_shim;
pub use intercept::{Interceptor, Outcome};
pub use matcher::{FlagMatch, InstallPattern};

pub mod cache;
mod context;
mod error;
mod exec;
mod intercept;
mod logger;
pub mod matcher;
mod resolver;

pub use anyhow::{Context, Result};
