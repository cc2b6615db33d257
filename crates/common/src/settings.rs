//! Layered shim settings: `config.yaml` under the stowaway home, then
//! `STOWAWAY_*` environment overrides.

use crate::parse_bool_flag;
use crate::paths;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_VERB: &str = "add";
pub const DEFAULT_FLAGS: [&str; 2] = ["--force", "--exact"];
pub const DEFAULT_DESCRIPTOR_VERSION: &str = "0.0.0-local";
pub const DEFAULT_DESCRIPTOR_MAIN: &str = "index.js";
pub const DEFAULT_MODULE_TYPE: &str = "module";
/// File name of the descriptor inside every cache entry.
pub const DESCRIPTOR_FILE_NAME: &str = "package.json";

/// Configuration problem the user has to fix; rendered without a backtrace.
#[derive(Debug)]
pub struct UserError {
    message: String,
}

impl UserError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for UserError {}

pub fn user_error(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(UserError::new(message))
}

pub fn is_user_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<UserError>())
}

/// How flag tokens are located in the argument list.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Every flag must appear somewhere after the verb.
    #[default]
    Presence,
    /// Every flag must sit at its configured index.
    Positional,
}

impl MatchMode {
    pub fn parse_insensitive(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "presence" => Some(Self::Presence),
            "positional" => Some(Self::Positional),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct InterceptSettings {
    pub enabled: bool,
    pub verb: String,
    pub flags: Vec<String>,
    /// Package identifier matched as a substring of any argument. Unset
    /// means every invocation is passed through.
    pub package: Option<String>,
    pub match_mode: MatchMode,
    pub flag_positions: Vec<usize>,
}

impl Default for InterceptSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            verb: DEFAULT_VERB.to_string(),
            flags: DEFAULT_FLAGS.iter().map(|s| s.to_string()).collect(),
            package: None,
            match_mode: MatchMode::Presence,
            flag_positions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DescriptorSettings {
    /// Defaults to the intercepted package identifier.
    pub name: Option<String>,
    pub version: String,
    pub main: String,
    pub module_type: String,
}

impl Default for DescriptorSettings {
    fn default() -> Self {
        Self {
            name: None,
            version: DEFAULT_DESCRIPTOR_VERSION.to_string(),
            main: DEFAULT_DESCRIPTOR_MAIN.to_string(),
            module_type: DEFAULT_MODULE_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ShimSettings {
    pub intercept: InterceptSettings,
    pub payload_source: Option<String>,
    pub cache_root: Option<String>,
    pub descriptor: DescriptorSettings,
    pub fallback: Option<String>,
}

impl ShimSettings {
    /// Load `config.yaml` (if present) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = paths::config_file()?;
        let (mut settings, _) = Self::read_or_defaults(&path)?;
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Returns the parsed file and whether it existed.
    pub fn read_or_defaults(path: &Path) -> Result<(Self, bool)> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok((Self::parse_yaml(path, &raw)?, true)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok((Self::default(), false)),
            Err(err) => Err(anyhow!("failed to read {}: {err}", path.display())),
        }
    }

    pub fn parse_yaml(path: &Path, raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|err| {
            user_error(format!(
                "invalid YAML in {}: {}",
                path.display(),
                err.to_string().trim()
            ))
        })
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = env::var("STOWAWAY_INTERCEPT") {
            self.intercept.enabled = parse_bool_flag(&raw).ok_or_else(|| {
                user_error(format!(
                    "STOWAWAY_INTERCEPT must be a boolean (true|false|1|0|yes|no|on|off) (found '{raw}')"
                ))
            })?;
        }

        if let Some(package) = non_empty_var("STOWAWAY_PACKAGE") {
            self.intercept.package = Some(package);
        }

        if let Some(verb) = non_empty_var("STOWAWAY_VERB") {
            self.intercept.verb = verb;
        }

        if let Ok(raw) = env::var("STOWAWAY_FLAGS") {
            self.intercept.flags = raw
                .split(',')
                .map(str::trim)
                .filter(|flag| !flag.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(raw) = non_empty_var("STOWAWAY_MATCH_MODE") {
            self.intercept.match_mode = MatchMode::parse_insensitive(&raw).ok_or_else(|| {
                user_error(format!(
                    "STOWAWAY_MATCH_MODE must be one of presence or positional (found '{raw}')"
                ))
            })?;
        }

        if let Some(payload) = non_empty_var("STOWAWAY_PAYLOAD") {
            self.payload_source = Some(payload);
        }

        if let Some(root) = non_empty_var("STOWAWAY_CACHE_ROOT") {
            self.cache_root = Some(root);
        }

        if let Some(fallback) = non_empty_var("STOWAWAY_FALLBACK") {
            self.fallback = Some(fallback);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.intercept.verb.trim().is_empty() {
            return Err(user_error("intercept.verb must not be empty"));
        }

        if self.intercept.match_mode == MatchMode::Positional {
            if self.intercept.flag_positions.len() != self.intercept.flags.len() {
                return Err(user_error(format!(
                    "intercept.flag_positions must list one index per flag ({} flags, {} positions)",
                    self.intercept.flags.len(),
                    self.intercept.flag_positions.len()
                )));
            }
            if self.intercept.flag_positions.contains(&0) {
                return Err(user_error(
                    "intercept.flag_positions must not use index 0 (reserved for the verb)",
                ));
            }
        }

        if !is_payload_file_name(&self.descriptor.main) {
            return Err(user_error(format!(
                "descriptor.main must be a plain file name other than {DESCRIPTOR_FILE_NAME} (found '{}')",
                self.descriptor.main
            )));
        }

        Ok(())
    }

    /// Package identifier to intercept, when interception is active.
    pub fn target_package(&self) -> Option<&str> {
        if !self.intercept.enabled {
            return None;
        }
        self.intercept
            .package
            .as_deref()
            .map(str::trim)
            .filter(|pkg| !pkg.is_empty())
    }

    pub fn cache_root_path(&self) -> Result<PathBuf> {
        match &self.cache_root {
            Some(raw) => paths::expand_path(raw),
            None => paths::cache_dir(),
        }
    }

    pub fn payload_source_path(&self) -> Result<Option<PathBuf>> {
        self.payload_source
            .as_deref()
            .map(paths::expand_path)
            .transpose()
    }

    pub fn fallback_path(&self) -> Result<Option<PathBuf>> {
        self.fallback.as_deref().map(paths::expand_path).transpose()
    }
}

/// A payload name is one normal path component that does not collide with
/// the descriptor.
pub fn is_payload_file_name(name: &str) -> bool {
    if name.trim().is_empty() || name.contains(['/', '\\']) || name == DESCRIPTOR_FILE_NAME {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
