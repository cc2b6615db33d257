use crate::cache::{CacheStore, Descriptor};
use crate::error::ShimError;
use crate::matcher::InstallPattern;
use std::fs;
use std::path::PathBuf;

/// Route chosen for an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Served from the cache; the fallback must not run.
    Intercepted { entry: PathBuf, populated: bool },
    /// Not an install of the target package.
    Delegate,
}

pub struct Interceptor<S> {
    pattern: InstallPattern,
    store: S,
    payload_source: Option<PathBuf>,
    descriptor: Descriptor,
}

impl<S: CacheStore> Interceptor<S> {
    pub fn new(
        pattern: InstallPattern,
        store: S,
        payload_source: Option<PathBuf>,
        descriptor: Descriptor,
    ) -> Self {
        Self {
            pattern,
            store,
            payload_source,
            descriptor,
        }
    }

    pub fn package(&self) -> &str {
        self.pattern.package()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decide the route and, for a match, make sure the cache entry exists.
    /// Unmatched invocations touch nothing.
    pub fn handle<A: AsRef<str>>(&self, args: &[A]) -> Result<Outcome, ShimError> {
        if !self.pattern.matches(args) {
            return Ok(Outcome::Delegate);
        }

        let key = self.pattern.package();
        self.store.prepare()?;

        if self.store.exists(key) {
            log::debug!("cache entry for {key} already present");
            return Ok(Outcome::Intercepted {
                entry: self.store.location(key)?,
                populated: false,
            });
        }

        let source = self
            .payload_source
            .as_ref()
            .ok_or_else(|| ShimError::PayloadNotConfigured(key.to_string()))?;
        let payload = fs::read(source).map_err(|source_err| ShimError::PayloadSource {
            path: source.clone(),
            source: source_err,
        })?;

        let entry = self.store.write(key, &payload, &self.descriptor)?;
        Ok(Outcome::Intercepted {
            entry,
            populated: true,
        })
    }
}
