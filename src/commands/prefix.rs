//! Command prefix parsing

use serde::{Deserialize, Serialize};

/// Prefix as written in configuration: a single string or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefixSetting {
    One(String),
    Many(Vec<String>),
}

/// Flatten a prefix setting into the ordered prefix list
///
/// Absent and a single empty string both mean no prefix.
#[must_use]
pub fn normalize_prefix(setting: Option<PrefixSetting>) -> Vec<String> {
    match setting {
        None => Vec::new(),
        Some(PrefixSetting::One(prefix)) if prefix.is_empty() => Vec::new(),
        Some(PrefixSetting::One(prefix)) => vec![prefix],
        Some(PrefixSetting::Many(prefixes)) => prefixes,
    }
}

/// Text split into prefix, command name and remaining text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatch<'a> {
    /// Prefix that matched
    pub prefix: &'a str,
    /// First token after the prefix
    pub command: String,
    /// Everything after the command token, trimmed
    pub text: String,
}

/// Match `text` against the configured prefixes
///
/// The first prefix (in configuration order) that `text` starts with wins.
/// Returns `None` when no prefix matches; an empty prefix list never matches.
#[must_use]
pub fn extract_prefix<'a>(prefixes: &'a [String], text: &str) -> Option<PrefixMatch<'a>> {
    let prefix = prefixes.iter().find(|p| text.starts_with(p.as_str()))?;
    let rest = text[prefix.len()..].trim();

    let (command, remaining) = rest
        .find(char::is_whitespace)
        .map_or((rest, ""), |i| (&rest[..i], rest[i..].trim()));

    Some(PrefixMatch {
        prefix,
        command: command.to_string(),
        text: remaining.to_string(),
    })
}
