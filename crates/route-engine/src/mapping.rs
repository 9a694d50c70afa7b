use tracing::{debug, warn};

use crate::matcher::RuleField;

/// How a mapping rewrites a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    /// Replace the first occurrence of `search`.
    Replace,
    /// Put `search` in front of the path.
    Prepend,
    /// Put `search` after the path.
    Append,
    /// Replace every occurrence of `search`.
    ReplaceAll,
}

impl MappingMode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Replace),
            1 => Some(Self::Prepend),
            2 => Some(Self::Append),
            3 => Some(Self::ReplaceAll),
            _ => None,
        }
    }
}

/// One `[mode, search, replacement?]` path mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub mode: MappingMode,
    pub search: String,
    pub replacement: String,
}

impl PathMapping {
    pub fn new(mode: MappingMode, search: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            mode,
            search: search.into(),
            replacement: replacement.into(),
        }
    }

    /// Parse one raw mapping tuple. Returns `None` for anything malformed.
    pub fn from_fields(fields: &[RuleField]) -> Option<Self> {
        let mode = match fields.first()? {
            RuleField::Int(code) => MappingMode::from_code(*code)?,
            RuleField::Str(s) => MappingMode::from_code(s.trim().parse().ok()?)?,
            _ => return None,
        };
        let search = fields.get(1)?.as_str()?.to_string();
        let replacement = match fields.get(2) {
            Some(field) => field.as_str()?.to_string(),
            None => String::new(),
        };
        Some(Self {
            mode,
            search,
            replacement,
        })
    }

    pub fn apply(&self, path: &str) -> String {
        match self.mode {
            MappingMode::Replace => path.replacen(&self.search, &self.replacement, 1),
            MappingMode::Prepend => format!("{}{path}", self.search),
            MappingMode::Append => format!("{path}{}", self.search),
            MappingMode::ReplaceAll => path.replace(&self.search, &self.replacement),
        }
    }
}

/// Parse every mapping in `raw`, skipping malformed entries.
pub fn parse_mappings(raw: &[RuleField]) -> Vec<PathMapping> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let parsed = match entry {
                RuleField::List(fields) => PathMapping::from_fields(fields),
                _ => None,
            };
            if parsed.is_none() {
                warn!(index, mapping = %entry, "malformed path mapping; skipping");
            }
            parsed
        })
        .collect()
}

/// Apply `mappings` to `path` in order.
pub fn map_path(mappings: &[PathMapping], path: &str) -> String {
    mappings.iter().fold(path.to_string(), |current, mapping| {
        let next = mapping.apply(&current);
        if next != current {
            debug!(from = current.as_str(), to = next.as_str(), "path mapped");
        }
        next
    })
}
