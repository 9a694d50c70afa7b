use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors raised while evaluating a single comparison.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("unknown match kind: {0}")]
    UnknownMatchKind(String),
}

// ---------------------------------------------------------------------------
// Raw rule fields
// ---------------------------------------------------------------------------

/// One field of a rule tuple exactly as it appears in the policy file.
///
/// Rules are positional sequences of mixed scalars, so they are kept raw until
/// [`normalize`](crate::normalize) classifies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleField {
    Int(i64),
    Str(String),
    List(Vec<RuleField>),
    /// Anything else (floats, booleans, maps); never valid in a rule, kept so
    /// one bad rule does not fail the whole file.
    Other(serde_json::Value),
}

impl RuleField {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for RuleField {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<i64> for RuleField {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Match kinds
// ---------------------------------------------------------------------------

/// The four base comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    StartsWith,
    EndsWith,
    Contains,
    RegexMatch,
}

impl MatchKind {
    /// Legacy integer codes: `0..=3`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::StartsWith),
            1 => Some(Self::EndsWith),
            2 => Some(Self::Contains),
            3 => Some(Self::RegexMatch),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "startsWith" => Some(Self::StartsWith),
            "endsWith" => Some(Self::EndsWith),
            "includes" => Some(Self::Contains),
            "match" => Some(Self::RegexMatch),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Contains => "includes",
            Self::RegexMatch => "match",
        }
    }
}

/// A base kind plus the optional `:not` modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchMode {
    pub kind: MatchKind,
    pub negate: bool,
}

/// Suffix that inverts a string-coded match kind.
const NEGATE_SUFFIX: &str = "not";

impl MatchMode {
    pub fn new(kind: MatchKind) -> Self {
        Self {
            kind,
            negate: false,
        }
    }

    pub fn negated(kind: MatchKind) -> Self {
        Self { kind, negate: true }
    }

    /// Parse a legacy integer code or a `"<kind>[:not]"` string.
    pub fn parse(field: &RuleField) -> Result<Self, RuleError> {
        match field {
            RuleField::Int(code) => MatchKind::from_code(*code)
                .map(Self::new)
                .ok_or_else(|| RuleError::UnknownMatchKind(code.to_string())),
            RuleField::Str(token) => {
                let (name, suffix) = match token.split_once(':') {
                    Some((name, suffix)) => (name, Some(suffix)),
                    None => (token.as_str(), None),
                };
                let kind = MatchKind::from_name(name)
                    .ok_or_else(|| RuleError::UnknownMatchKind(token.clone()))?;
                Ok(Self {
                    kind,
                    negate: suffix == Some(NEGATE_SUFFIX),
                })
            }
            other => Err(RuleError::UnknownMatchKind(other.to_string())),
        }
    }

    /// Apply this mode to `candidate`. A list pattern matches when any member
    /// does; negation inverts the combined result.
    pub fn matches(&self, candidate: &str, pattern: &Pattern) -> bool {
        let hit = pattern
            .needles()
            .iter()
            .any(|needle| needle.is_match(self.kind, candidate));
        hit != self.negate
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            write!(f, "{}:{NEGATE_SUFFIX}", self.kind.name())
        } else {
            write!(f, "{}", self.kind.name())
        }
    }
}

/// A match-kind field that may not have parsed.
///
/// Unknown kinds are not a shape problem: the rule is kept and fails each
/// time it is evaluated, so a group containing it can never match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeToken {
    Known(MatchMode),
    Unknown(String),
}

impl ModeToken {
    pub fn from_field(field: &RuleField) -> Self {
        match MatchMode::parse(field) {
            Ok(mode) => Self::Known(mode),
            Err(RuleError::UnknownMatchKind(token)) => Self::Unknown(token),
        }
    }

    pub fn resolve(&self) -> Result<MatchMode, RuleError> {
        match self {
            Self::Known(mode) => Ok(*mode),
            Self::Unknown(token) => Err(RuleError::UnknownMatchKind(token.clone())),
        }
    }
}

impl fmt::Display for ModeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(mode) => write!(f, "{mode}"),
            Self::Unknown(token) => write!(f, "{token}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// A single pattern value, pre-compiled when the rule's kind is a regex.
#[derive(Debug, Clone)]
pub enum Needle {
    Literal(String),
    Regex(Regex),
    /// A regex that failed to compile; never matches.
    Invalid(String),
}

impl Needle {
    /// Build a needle for `kind`, compiling `text` as a regex when needed.
    pub fn compile(text: &str, kind: Option<MatchKind>) -> Self {
        if kind != Some(MatchKind::RegexMatch) {
            return Self::Literal(text.to_string());
        }
        match Regex::new(text) {
            Ok(re) => Self::Regex(re),
            Err(e) => {
                warn!(
                    pattern = text,
                    error = %e,
                    "failed to compile rule regex; treating as non-match"
                );
                Self::Invalid(text.to_string())
            }
        }
    }

    fn is_match(&self, kind: MatchKind, candidate: &str) -> bool {
        match (self, kind) {
            (Self::Invalid(_), _) => false,
            (Self::Regex(re), _) => re.is_match(candidate),
            (Self::Literal(text), MatchKind::StartsWith) => candidate.starts_with(text.as_str()),
            (Self::Literal(text), MatchKind::EndsWith) => candidate.ends_with(text.as_str()),
            (Self::Literal(text), MatchKind::Contains) => candidate.contains(text.as_str()),
            // regex kinds are compiled up front; an uncompiled literal never matches
            (Self::Literal(_), MatchKind::RegexMatch) => false,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(text) | Self::Invalid(text) => text,
            Self::Regex(re) => re.as_str(),
        }
    }
}

/// The pattern field of a rule: one value or an any-of list.
#[derive(Debug, Clone)]
pub enum Pattern {
    One(Needle),
    AnyOf(Vec<Needle>),
}

impl Pattern {
    pub fn needles(&self) -> &[Needle] {
        match self {
            Self::One(needle) => std::slice::from_ref(needle),
            Self::AnyOf(needles) => needles,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(needle) => write!(f, "{:?}", needle.as_str()),
            Self::AnyOf(needles) => {
                let parts: Vec<String> =
                    needles.iter().map(|n| format!("{:?}", n.as_str())).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Evaluate `candidate` against `pattern` under `mode`.
///
/// An empty candidate never matches, negated or not. Fails only when the mode
/// is an unknown kind.
pub fn matches(mode: &ModeToken, candidate: &str, pattern: &Pattern) -> Result<bool, RuleError> {
    let mode = mode.resolve()?;
    if candidate.is_empty() {
        return Ok(false);
    }
    Ok(mode.matches(candidate, pattern))
}

/// One-shot comparison straight from raw fields, compiling regexes per call.
pub fn str_matches(kind: &RuleField, candidate: &str, pattern: &str) -> Result<bool, RuleError> {
    let mode = MatchMode::parse(kind)?;
    let needle = Needle::compile(pattern, Some(mode.kind));
    matches(&ModeToken::Known(mode), candidate, &Pattern::One(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(text: &str, kind: MatchKind) -> Pattern {
        Pattern::One(Needle::compile(text, Some(kind)))
    }

    fn any_of(texts: &[&str], kind: MatchKind) -> Pattern {
        Pattern::AnyOf(texts.iter().map(|t| Needle::compile(t, Some(kind))).collect())
    }

    // ---- kind parsing ----

    #[test]
    fn legacy_codes_and_names_agree() {
        for (code, name) in [(0, "startsWith"), (1, "endsWith"), (2, "includes"), (3, "match")] {
            assert_eq!(
                MatchMode::parse(&RuleField::Int(code)).unwrap(),
                MatchMode::parse(&RuleField::from(name)).unwrap()
            );
        }
    }

    #[test]
    fn not_suffix_negates() {
        let mode = MatchMode::parse(&RuleField::from("includes:not")).unwrap();
        assert_eq!(mode, MatchMode::negated(MatchKind::Contains));
        assert_eq!(mode.to_string(), "includes:not");
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        assert_eq!(
            MatchMode::parse(&RuleField::from("fuzzy")),
            Err(RuleError::UnknownMatchKind("fuzzy".into()))
        );
        assert_eq!(
            MatchMode::parse(&RuleField::Int(7)),
            Err(RuleError::UnknownMatchKind("7".into()))
        );
        let token = ModeToken::from_field(&RuleField::from("fuzzy:not"));
        let err = matches(&token, "/a", &one("/a", MatchKind::StartsWith)).unwrap_err();
        assert_eq!(err, RuleError::UnknownMatchKind("fuzzy:not".into()));
    }

    // ---- literal kinds ----

    #[test]
    fn uncompiled_literal_never_matches_as_regex() {
        let mode = ModeToken::Known(MatchMode::new(MatchKind::RegexMatch));
        let pattern = Pattern::One(Needle::Literal(".*".into()));
        assert_eq!(matches(&mode, "/mnt/a.mkv", &pattern), Ok(false));
    }

    #[test]
    fn literal_substring_tests() {
        let path = "/mnt/media/movie.mkv";
        assert!(str_matches(&RuleField::Int(0), path, "/mnt/media").unwrap());
        assert!(str_matches(&RuleField::Int(1), path, ".mkv").unwrap());
        assert!(str_matches(&RuleField::Int(2), path, "media/mov").unwrap());
        assert!(!str_matches(&RuleField::Int(0), path, "/media").unwrap());
    }

    #[test]
    fn literal_kinds_do_not_interpret_regex_syntax() {
        assert!(!str_matches(&RuleField::Int(2), "/a/b.mkv", "b.*").unwrap());
        assert!(str_matches(&RuleField::Int(2), "/a/b.*", "b.*").unwrap());
    }

    // ---- regex ----

    #[test]
    fn regex_searches_unanchored() {
        assert!(str_matches(&RuleField::Int(3), "/mnt/Private/x.mkv", "(?i)private").unwrap());
        assert!(!str_matches(&RuleField::Int(3), "/mnt/public/x.mkv", "(?i)private").unwrap());
    }

    #[test]
    fn invalid_regex_never_matches() {
        let pattern = one("[invalid", MatchKind::RegexMatch);
        assert!(matches!(pattern, Pattern::One(Needle::Invalid(_))));
        let mode = ModeToken::Known(MatchMode::new(MatchKind::RegexMatch));
        assert!(!matches(&mode, "anything", &pattern).unwrap());
    }

    // ---- negation and any-of ----

    #[test]
    fn negation_inverts_base_result() {
        let candidates = ["/mnt/media/a.mkv", "/other/b.mp4", "x"];
        let pattern = any_of(&["/mnt/media", "/nas"], MatchKind::StartsWith);
        for candidate in candidates {
            let base = ModeToken::Known(MatchMode::new(MatchKind::StartsWith));
            let not = ModeToken::Known(MatchMode::negated(MatchKind::StartsWith));
            assert_eq!(
                matches(&not, candidate, &pattern).unwrap(),
                !matches(&base, candidate, &pattern).unwrap(),
                "candidate {candidate}"
            );
        }
    }

    #[test]
    fn any_of_list_matches_any_member() {
        let pattern = any_of(&["Emby Web", "Infuse"], MatchKind::StartsWith);
        let mode = ModeToken::Known(MatchMode::new(MatchKind::StartsWith));
        assert!(matches(&mode, "Infuse-Direct", &pattern).unwrap());
        assert!(!matches(&mode, "Kodi", &pattern).unwrap());
    }

    #[test]
    fn empty_candidate_never_matches() {
        let mode = ModeToken::Known(MatchMode::negated(MatchKind::StartsWith));
        assert!(!matches(&mode, "", &one("/mnt", MatchKind::StartsWith)).unwrap());
    }

    #[test]
    fn rule_field_display() {
        let field = RuleField::List(vec![RuleField::Int(0), RuleField::from("a")]);
        assert_eq!(field.to_string(), "[0, \"a\"]");
    }
}
