//! Evaluation of single rules and AND-groups against a request.

use tracing::{trace, warn};

use crate::context::RequestContext;
use crate::expression::resolve_default;
use crate::matcher::matches;
use crate::rule::{Rule, RuleShape, Source};

/// Evaluate one rule.
///
/// `source` overrides the rule's own source; legacy rules are evaluated with
/// the caller's default source this way. Built-in sources compare against
/// `candidate`; expressions are resolved from `ctx`. Resolution and match
/// errors are logged and count as a non-match.
pub fn rule_matches(ctx: &RequestContext, rule: &Rule, source: &Source, candidate: &str) -> bool {
    let subject = match source {
        Source::FilePath | Source::StorageLink => candidate.to_string(),
        Source::Expression(expr) => match resolve_default(Some(ctx.tree()), expr) {
            Ok(Some(value)) => value,
            Ok(None) => return false,
            Err(e) => {
                warn!(expression = expr.as_str(), error = %e, "failed to resolve rule source");
                return false;
            }
        },
    };

    match matches(&rule.mode, &subject, &rule.pattern) {
        Ok(hit) => {
            trace!(source = %source, subject = subject.as_str(), mode = %rule.mode, hit, "rule evaluated");
            hit
        }
        Err(e) => {
            warn!(source = %source, error = %e, "rule has unknown match kind; treating as non-match");
            false
        }
    }
}

/// Evaluate a rule with its own source.
pub fn shape_matches(ctx: &RequestContext, rule: &Rule, candidate: &str) -> bool {
    rule_matches(ctx, rule, &rule.source, candidate)
}

/// Partition `shapes` by group name, preserving first-appearance order of
/// both groups and members. Ungrouped shapes are ignored.
pub fn group_by_name<'a, I>(shapes: I) -> Vec<(&'a str, Vec<&'a Rule>)>
where
    I: IntoIterator<Item = &'a RuleShape>,
{
    group_by(shapes, |shape| shape.group())
        .into_iter()
        .map(|(name, members)| (name, members.into_iter().map(RuleShape::rule).collect()))
        .collect()
}

/// Partition `items` by `key`, preserving first-appearance order. Items
/// whose key is `None` are dropped.
pub(crate) fn group_by<'a, K, I, F>(items: I, key: F) -> Vec<(K, Vec<&'a RuleShape>)>
where
    K: PartialEq,
    I: IntoIterator<Item = &'a RuleShape>,
    F: Fn(&'a RuleShape) -> Option<K>,
{
    let mut groups: Vec<(K, Vec<&'a RuleShape>)> = Vec::new();
    for shape in items {
        let Some(k) = key(shape) else {
            continue;
        };
        match groups.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, members)) => members.push(shape),
            None => groups.push((k, vec![shape])),
        }
    }
    groups
}

/// AND-evaluate a group. Returns `name` when every member matches.
///
/// An empty group never matches.
pub fn evaluate_group<'n>(
    ctx: &RequestContext,
    name: &'n str,
    members: &[&Rule],
    candidate: &str,
) -> Option<&'n str> {
    if members.is_empty() {
        return None;
    }
    let all = members.iter().all(|rule| shape_matches(ctx, rule, candidate));
    if all {
        trace!(group = name, members = members.len(), "group matched");
        Some(name)
    } else {
        None
    }
}
