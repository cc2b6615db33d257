//! Install-pattern predicate
//!
//! An invocation is an install of the target package only when every part of
//! the pattern holds at once: the verb sits at position 0, each flag token is
//! found (anywhere after the verb, or at a fixed index in positional mode), and
//! the package identifier is a substring of at least one argument.

use stowaway_common::{MatchMode, ShimSettings};

/// Where flag tokens must appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagMatch {
    Presence,
    /// One index per flag, in the same order as the flags.
    Positional(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPattern {
    verb: String,
    flags: Vec<String>,
    package: String,
    flag_match: FlagMatch,
}

impl InstallPattern {
    pub fn new(
        verb: impl Into<String>,
        flags: Vec<String>,
        package: impl Into<String>,
        flag_match: FlagMatch,
    ) -> Self {
        Self {
            verb: verb.into(),
            flags,
            package: package.into(),
            flag_match,
        }
    }

    /// Build the pattern from settings. `None` when no target package is
    /// configured or interception is switched off.
    pub fn from_settings(settings: &ShimSettings) -> Option<Self> {
        let package = settings.target_package()?;
        let flag_match = match settings.intercept.match_mode {
            MatchMode::Presence => FlagMatch::Presence,
            MatchMode::Positional => FlagMatch::Positional(settings.intercept.flag_positions.clone()),
        };
        Some(Self::new(
            settings.intercept.verb.trim(),
            settings.intercept.flags.clone(),
            package,
            flag_match,
        ))
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn matches<S: AsRef<str>>(&self, args: &[S]) -> bool {
        let Some(first) = args.first() else {
            return false;
        };
        if first.as_ref() != self.verb {
            return false;
        }

        let flags_ok = match &self.flag_match {
            FlagMatch::Presence => self
                .flags
                .iter()
                .all(|flag| args[1..].iter().any(|arg| arg.as_ref() == flag)),
            FlagMatch::Positional(positions) => {
                positions.len() == self.flags.len()
                    && self.flags.iter().zip(positions).all(|(flag, &idx)| {
                        args.get(idx).map(|arg| arg.as_ref() == flag).unwrap_or(false)
                    })
            }
        };
        if !flags_ok {
            return false;
        }

        args.iter().any(|arg| arg.as_ref().contains(self.package.as_str()))
    }
}
