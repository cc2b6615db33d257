//! Shared utilities for stowaway components

pub mod paths;
pub mod settings;

pub use settings::{
    DescriptorSettings, InterceptSettings, MatchMode, ShimSettings, UserError,
};

/// Parse a permissive boolean flag (`true|false|1|0|yes|no|on|off`).
pub fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
