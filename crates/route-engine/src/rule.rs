use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::context::REMOTE_ADDR_PATH;
use crate::decision::RouteDecision;
use crate::expression::{DEFAULT_GROUP_SPLIT, DEFAULT_PROPERTY_SPLIT};
use crate::matcher::{MatchKind, MatchMode, ModeToken, Needle, Pattern, RuleField};

/// Why a raw rule tuple could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("rule is empty")]
    Empty,
    #[error("rule has {len} field(s); this shape needs at least {min}")]
    TooShort { len: usize, min: usize },
    #[error("field {index}: expected {expected}, found {found}")]
    UnexpectedField {
        index: usize,
        expected: &'static str,
        found: String,
    },
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// What a rule compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// The media file path handed to the evaluator.
    FilePath,
    /// The storage backend link handed to the evaluator.
    StorageLink,
    /// A property expression resolved against the request context.
    Expression(String),
}

impl Source {
    pub fn parse(token: &str) -> Self {
        match token {
            "filePath" => Self::FilePath,
            "alistRes" | "storageLink" => Self::StorageLink,
            other => Self::Expression(other.to_string()),
        }
    }

    pub fn expression(&self) -> Option<&str> {
        match self {
            Self::Expression(expr) => Some(expr),
            _ => None,
        }
    }

    /// True when any path of the expression reads the client's remote address.
    pub fn reads_remote_addr(&self) -> bool {
        let Some(expr) = self.expression() else {
            return false;
        };
        expr.split(DEFAULT_GROUP_SPLIT).any(|path| {
            let segments: Vec<&str> = path.trim().split(DEFAULT_PROPERTY_SPLIT).skip(1).collect();
            segments == REMOTE_ADDR_PATH
        })
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FilePath => f.write_str("filePath"),
            Self::StorageLink => f.write_str("alistRes"),
            Self::Expression(expr) => f.write_str(expr),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule shapes
// ---------------------------------------------------------------------------

/// One normalized comparison.
#[derive(Debug, Clone)]
pub struct Rule {
    pub source: Source,
    pub mode: ModeToken,
    pub pattern: Pattern,
    /// Trailing fields after the pattern: route target, hide level or
    /// public address depending on the rule list.
    pub extra: Vec<RuleField>,
}

impl Rule {
    fn kind(&self) -> Option<MatchKind> {
        self.mode.resolve().ok().map(|m| m.kind)
    }

    /// The first trailing field, if it is a string.
    pub fn extra_str(&self) -> Option<&str> {
        self.extra.first().and_then(RuleField::as_str)
    }

    /// The first trailing field, if it is an integer.
    pub fn extra_int(&self) -> Option<i64> {
        self.extra.first().and_then(RuleField::as_int)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}, {}, {}", self.source.to_string(), self.mode, self.pattern)
    }
}

#[derive(Debug, Clone)]
pub struct GroupedRule {
    pub group: String,
    pub rule: Rule,
}

#[derive(Debug, Clone)]
pub enum TaggedBody {
    Single(Rule),
    Grouped(GroupedRule),
}

#[derive(Debug, Clone)]
pub struct TaggedRule {
    pub route: RouteDecision,
    pub body: TaggedBody,
}

/// A rule tuple classified by shape.
#[derive(Debug, Clone)]
pub enum RuleShape {
    /// `[kind, pattern, extra..]`, compared against the caller's default source.
    Legacy(Rule),
    /// `[source, kind, pattern]`
    Single(Rule),
    /// `[group, source, kind, pattern, extra..]`
    Grouped(GroupedRule),
    /// `[route, source, kind, pattern]` or `[route, group, source, kind, pattern]`
    RouteTagged(TaggedRule),
}

impl RuleShape {
    pub fn rule(&self) -> &Rule {
        match self {
            Self::Legacy(rule) | Self::Single(rule) => rule,
            Self::Grouped(g) => &g.rule,
            Self::RouteTagged(t) => match &t.body {
                TaggedBody::Single(rule) => rule,
                TaggedBody::Grouped(g) => &g.rule,
            },
        }
    }

    pub fn group(&self) -> Option<&str> {
        match self {
            Self::Grouped(g) => Some(&g.group),
            Self::RouteTagged(TaggedRule {
                body: TaggedBody::Grouped(g),
                ..
            }) => Some(&g.group),
            _ => None,
        }
    }

    pub fn route(&self) -> Option<&RouteDecision> {
        match self {
            Self::RouteTagged(t) => Some(&t.route),
            _ => None,
        }
    }

    pub fn reads_remote_addr(&self) -> bool {
        self.rule().source.reads_remote_addr()
    }
}

impl fmt::Display for RuleShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy(rule) => write!(f, "[{}, {}]", rule.mode, rule.pattern),
            Self::Single(rule) => write!(f, "[{rule}]"),
            Self::Grouped(g) => write!(f, "[{:?}, {}]", g.group, g.rule),
            Self::RouteTagged(t) => match &t.body {
                TaggedBody::Single(rule) => write!(f, "[{:?}, {rule}]", t.route.as_str()),
                TaggedBody::Grouped(g) => {
                    write!(f, "[{:?}, {:?}, {}]", t.route.as_str(), g.group, g.rule)
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Classify a raw rule tuple with only the built-in route tags.
pub fn normalize(raw: &[RuleField]) -> Result<RuleShape, ShapeError> {
    normalize_with(raw, &[])
}

/// Classify a raw rule tuple. `custom_routes` are extra route tags accepted
/// in field 0.
pub fn normalize_with(raw: &[RuleField], custom_routes: &[String]) -> Result<RuleShape, ShapeError> {
    let head = raw.first().ok_or(ShapeError::Empty)?;

    let head_str = match head {
        RuleField::Int(_) => return legacy(raw),
        RuleField::Str(s) => s.as_str(),
        other => {
            return Err(ShapeError::UnexpectedField {
                index: 0,
                expected: "match kind, route tag, source or group name",
                found: other.to_string(),
            })
        }
    };

    if MatchMode::parse(head).is_ok() {
        return legacy(raw);
    }

    if let Some(route) = RouteDecision::from_tag(head_str, custom_routes) {
        require_len(raw, 4)?;
        let body = if raw.len() == 4 {
            TaggedBody::Single(build_rule(raw, 1)?)
        } else {
            TaggedBody::Grouped(GroupedRule {
                group: string_field(raw, 1, "group name")?,
                rule: build_rule(raw, 2)?,
            })
        };
        return Ok(RuleShape::RouteTagged(TaggedRule { route, body }));
    }

    match raw.len() {
        3 => Ok(RuleShape::Single(build_rule(raw, 0)?)),
        n if n >= 4 => Ok(RuleShape::Grouped(GroupedRule {
            group: head_str.to_string(),
            rule: build_rule(raw, 1)?,
        })),
        n => Err(ShapeError::TooShort { len: n, min: 3 }),
    }
}

fn legacy(raw: &[RuleField]) -> Result<RuleShape, ShapeError> {
    require_len(raw, 2)?;
    let mode = ModeToken::from_field(&raw[0]);
    let kind = mode.resolve().ok().map(|m| m.kind);
    Ok(RuleShape::Legacy(Rule {
        source: Source::FilePath,
        mode,
        pattern: compile_pattern(&raw[1], 1, kind)?,
        extra: raw[2..].to_vec(),
    }))
}

/// Build `[source, kind, pattern, extra..]` starting at `offset`.
fn build_rule(raw: &[RuleField], offset: usize) -> Result<Rule, ShapeError> {
    require_len(raw, offset + 3)?;
    let source = Source::parse(&string_field(raw, offset, "source")?);
    let mode = ModeToken::from_field(&raw[offset + 1]);
    let mut rule = Rule {
        source,
        mode,
        pattern: Pattern::AnyOf(Vec::new()),
        extra: raw[offset + 3..].to_vec(),
    };
    rule.pattern = compile_pattern(&raw[offset + 2], offset + 2, rule.kind())?;
    Ok(rule)
}

fn compile_pattern(
    field: &RuleField,
    index: usize,
    kind: Option<MatchKind>,
) -> Result<Pattern, ShapeError> {
    let needle = |f: &RuleField| match f {
        RuleField::Str(s) => Some(Needle::compile(s, kind)),
        RuleField::Int(n) => Some(Needle::compile(&n.to_string(), kind)),
        _ => None,
    };
    let unexpected = || ShapeError::UnexpectedField {
        index,
        expected: "string or list of strings",
        found: field.to_string(),
    };
    match field {
        RuleField::List(items) => items
            .iter()
            .map(|item| needle(item).ok_or_else(unexpected))
            .collect::<Result<Vec<_>, _>>()
            .map(Pattern::AnyOf),
        other => needle(other).map(Pattern::One).ok_or_else(unexpected),
    }
}

fn string_field(raw: &[RuleField], index: usize, expected: &'static str) -> Result<String, ShapeError> {
    match &raw[index] {
        RuleField::Str(s) => Ok(s.clone()),
        other => Err(ShapeError::UnexpectedField {
            index,
            expected,
            found: other.to_string(),
        }),
    }
}

fn require_len(raw: &[RuleField], min: usize) -> Result<(), ShapeError> {
    if raw.len() < min {
        return Err(ShapeError::TooShort {
            len: raw.len(),
            min,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// Ordered, normalized rules for one rule list of a policy.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<RuleShape>,
}

impl RuleSet {
    /// Normalize every entry of `raw`, skipping the ones that do not fit any
    /// shape. `label` names the rule list in log output.
    pub fn from_raw(raw: &[RuleField], custom_routes: &[String], label: &str) -> Self {
        let mut rules = Vec::with_capacity(raw.len());
        for (index, entry) in raw.iter().enumerate() {
            let RuleField::List(fields) = entry else {
                warn!(list = label, index, rule = %entry, "rule is not a sequence; skipping");
                continue;
            };
            match normalize_with(fields, custom_routes) {
                Ok(shape) => {
                    debug!(list = label, index, rule = %shape, "rule normalized");
                    rules.push(shape);
                }
                Err(e) => {
                    warn!(list = label, index, rule = %entry, error = %e, "malformed rule; skipping");
                }
            }
        }
        Self { rules }
    }

    /// Give legacy routing rules the route named in their trailing field.
    ///
    /// `[kind, pattern]` stays a proxy rule, `[kind, pattern, tag]` becomes a
    /// rule for `tag`, and a legacy rule whose trailing field is not a known
    /// route tag is dropped.
    pub fn resolve_legacy_routes(self, custom_routes: &[String], label: &str) -> Self {
        let rules = self
            .rules
            .into_iter()
            .filter_map(|shape| {
                let RuleShape::Legacy(rule) = shape else {
                    return Some(shape);
                };
                let Some(target) = rule.extra.first() else {
                    return Some(RuleShape::Legacy(rule));
                };
                let route = target
                    .as_str()
                    .and_then(|tag| RouteDecision::from_tag(tag, custom_routes));
                match route {
                    Some(route) => Some(RuleShape::RouteTagged(TaggedRule {
                        route,
                        body: TaggedBody::Single(rule),
                    })),
                    None => {
                        warn!(list = label, target = %target, "unknown route target on legacy rule; skipping");
                        None
                    }
                }
            })
            .collect();
        Self { rules }
    }

    pub fn from_shapes(rules: Vec<RuleShape>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RuleShape] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
