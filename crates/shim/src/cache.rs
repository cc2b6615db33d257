//! Cache entries for intercepted packages
//!
//! An entry is a directory named after the package identifier holding two
//! files: the payload (written under the descriptor's `main` name) and the
//! `package.json` descriptor. Entries are create-once: the descriptor is
//! written last, so its presence marks a complete entry, and nothing touches
//! an entry after that.

use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use stowaway_common::settings::{is_payload_file_name, DESCRIPTOR_FILE_NAME};
use stowaway_common::DescriptorSettings;
use tempfile::NamedTempFile;

pub const DESCRIPTOR_FILE: &str = DESCRIPTOR_FILE_NAME;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("failed to create cache directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid cache key '{0}'")]
    InvalidKey(String),
    #[error("invalid payload file name '{0}'")]
    InvalidPayloadName(String),
    #[error("failed to encode descriptor: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Metadata record stored next to the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub version: String,
    pub main: String,
    #[serde(rename = "type")]
    pub module_type: String,
}

impl Descriptor {
    pub fn from_settings(package: &str, settings: &DescriptorSettings) -> Self {
        Self {
            name: settings
                .name
                .clone()
                .unwrap_or_else(|| package.to_string()),
            version: settings.version.clone(),
            main: settings.main.clone(),
            module_type: settings.module_type.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, CacheError> {
        let mut body = serde_json::to_string_pretty(self)?;
        body.push('\n');
        Ok(body)
    }
}

/// Storage seam for cache entries, so the interception decision can be
/// exercised without a real filesystem.
pub trait CacheStore {
    /// Ensure the cache root exists. Idempotent.
    fn prepare(&self) -> Result<(), CacheError>;
    /// True when a complete entry for `key` is present.
    fn exists(&self, key: &str) -> bool;
    /// Create the entry for `key` and return its location.
    fn write(&self, key: &str, payload: &[u8], descriptor: &Descriptor)
        -> Result<PathBuf, CacheError>;
    fn location(&self, key: &str) -> Result<PathBuf, CacheError>;
}

#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CacheStore for FsCacheStore {
    fn prepare(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.root).map_err(|source| CacheError::CreateDir {
            path: self.root.clone(),
            source,
        })
    }

    fn exists(&self, key: &str) -> bool {
        self.location(key)
            .map(|dir| dir.join(DESCRIPTOR_FILE).is_file())
            .unwrap_or(false)
    }

    fn write(
        &self,
        key: &str,
        payload: &[u8],
        descriptor: &Descriptor,
    ) -> Result<PathBuf, CacheError> {
        if !is_payload_file_name(&descriptor.main) {
            return Err(CacheError::InvalidPayloadName(descriptor.main.clone()));
        }
        let dir = self.location(key)?;
        fs::create_dir_all(&dir).map_err(|source| CacheError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        write_atomic(&dir, &descriptor.main, payload)?;
        write_atomic(&dir, DESCRIPTOR_FILE, descriptor.to_json()?.as_bytes())?;
        log::debug!("populated cache entry {}", dir.display());

        Ok(dir)
    }

    fn location(&self, key: &str) -> Result<PathBuf, CacheError> {
        Ok(self.root.join(validate_key(key)?))
    }
}

/// Write into a temp file beside the target, then rename over it, so a
/// reader never sees a half-written file.
fn write_atomic(dir: &Path, file_name: &str, contents: &[u8]) -> Result<(), CacheError> {
    let dest = dir.join(file_name);
    let write_err = |source| CacheError::Write {
        path: dest.clone(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(&dest).map_err(|err| write_err(err.error))?;
    Ok(())
}

/// Keys are relative paths of plain components (`pkg`, `@scope/pkg`).
fn validate_key(key: &str) -> Result<&Path, CacheError> {
    let path = Path::new(key);
    let plain = !key.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if plain {
        Ok(path)
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

/// In-memory store with write accounting.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RefCell<HashMap<String, (Vec<u8>, Descriptor)>>,
    writes: Cell<usize>,
    fail_prepare: bool,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `prepare` fails, as an unwritable cache root would.
    pub fn unwritable() -> Self {
        Self {
            fail_prepare: true,
            ..Self::default()
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    pub fn entry(&self, key: &str) -> Option<(Vec<u8>, Descriptor)> {
        self.entries.borrow().get(key).cloned()
    }
}

impl CacheStore for MemoryCacheStore {
    fn prepare(&self) -> Result<(), CacheError> {
        if self.fail_prepare {
            return Err(CacheError::CreateDir {
                path: PathBuf::from("memory"),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    fn write(
        &self,
        key: &str,
        payload: &[u8],
        descriptor: &Descriptor,
    ) -> Result<PathBuf, CacheError> {
        if !is_payload_file_name(&descriptor.main) {
            return Err(CacheError::InvalidPayloadName(descriptor.main.clone()));
        }
        let location = self.location(key)?;
        self.entries
            .borrow_mut()
            .insert(key.to_string(), (payload.to_vec(), descriptor.clone()));
        self.writes.set(self.writes.get() + 1);
        Ok(location)
    }

    fn location(&self, key: &str) -> Result<PathBuf, CacheError> {
        Ok(Path::new("memory").join(validate_key(key)?))
    }
}
