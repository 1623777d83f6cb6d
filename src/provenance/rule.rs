// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use regex::Regex;
use serde::Deserialize;

/// How to pull a version string out of a tool's version output.
///
/// Steps run in order: optional regex (first capture group, or the whole
/// match when the pattern has no group), parenthetical removal, prefix strip,
/// whitespace trim. Without a pattern the first non-empty line is used.
///
/// ```yaml
/// rule: { strip_prefix: v, strip_parenthetical: true }
/// rule: { pattern: 'FastTree version ([0-9.]+)' }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "RawExtractionRule")]
pub struct ExtractionRule {
    pattern: Option<Regex>,
    strip_prefix: Option<String>,
    strip_parenthetical: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawExtractionRule {
    pattern: Option<String>,
    strip_prefix: Option<String>,
    strip_parenthetical: bool,
}

impl TryFrom<RawExtractionRule> for ExtractionRule {
    type Error = regex::Error;

    fn try_from(raw: RawExtractionRule) -> Result<Self, Self::Error> {
        let pattern = raw.pattern.as_deref().map(Regex::new).transpose()?;
        Ok(Self {
            pattern,
            strip_prefix: raw.strip_prefix,
            strip_parenthetical: raw.strip_parenthetical,
        })
    }
}

impl PartialEq for ExtractionRule {
    fn eq(&self, other: &Self) -> bool {
        self.pattern.as_ref().map(Regex::as_str) == other.pattern.as_ref().map(Regex::as_str)
            && self.strip_prefix == other.strip_prefix
            && self.strip_parenthetical == other.strip_parenthetical
    }
}

impl ExtractionRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn with_strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    pub fn with_strip_parenthetical(mut self) -> Self {
        self.strip_parenthetical = true;
        self
    }

    /// Extract a version, or `None` when the output holds nothing usable.
    pub fn extract(&self, raw: &str) -> Option<String> {
        let selected = match &self.pattern {
            Some(pattern) => {
                let captures = pattern.captures(raw)?;
                captures.get(1).or_else(|| captures.get(0))?.as_str().to_string()
            }
            None => raw.lines().map(str::trim).find(|l| !l.is_empty())?.to_string(),
        };

        let mut version = if self.strip_parenthetical {
            remove_parentheticals(&selected)
        } else {
            selected
        };
        version = version.trim().to_string();

        if let Some(prefix) = &self.strip_prefix {
            if let Some(stripped) = version.strip_prefix(prefix.as_str()) {
                version = stripped.trim().to_string();
            }
        }

        (!version.is_empty()).then_some(version)
    }
}

fn remove_parentheticals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
