use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::decision::{RouteDecision, RouteOutcome, Stage};
use crate::group::{evaluate_group, group_by, shape_matches};
use crate::rule::{RuleSet, RuleShape, TaggedBody, TaggedRule};

/// The routing half of a policy: the route rule list plus the media mount
/// prefixes that identify files the storage backend can serve.
#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    pub rules: RuleSet,
    pub mount_paths: Vec<String>,
}

impl RoutePolicy {
    pub fn new(rules: RuleSet, mount_paths: Vec<String>) -> Self {
        Self { rules, mount_paths }
    }

    /// Decide how to serve `candidate`.
    ///
    /// `candidate` is a media file path, or a storage link when
    /// `is_storage_link` is set. `local_bypass_allowed` enables proxying of
    /// local files that live outside every media mount. Stages run in
    /// [`ROUTE_PRECEDENCE`](crate::ROUTE_PRECEDENCE) order.
    pub fn decide(
        &self,
        ctx: &RequestContext,
        candidate: &str,
        is_storage_link: bool,
        local_bypass_allowed: bool,
    ) -> RouteOutcome {
        debug!(candidate, is_storage_link, local_bypass_allowed, "deciding route");

        let internal = ctx.is_internal();
        let active: Vec<&RuleShape> = self
            .rules
            .rules()
            .iter()
            .filter(|shape| !(internal && shape.reads_remote_addr()))
            .collect();

        if !is_storage_link && local_bypass_allowed && self.outside_mounts(candidate) {
            warn!(candidate, mounts = ?self.mount_paths, "hit proxy, not under any media mount");
            return RouteOutcome::proxy_unmounted("candidate is outside every media mount");
        }

        if let Some(outcome) = single_proxy(ctx, &active, candidate) {
            return outcome;
        }
        if let Some(outcome) = group_proxy(ctx, &active, candidate) {
            return outcome;
        }

        let has_tagged_routes = active
            .iter()
            .any(|shape| shape.route().is_some_and(|r| *r != RouteDecision::Proxy));
        if !has_tagged_routes && is_storage_link {
            return RouteOutcome::redirect_default("storage link with no route rules");
        }
        if let Some(outcome) = tagged_route(ctx, &active, candidate) {
            return outcome;
        }

        RouteOutcome::redirect_default("no rule matched")
    }

    fn outside_mounts(&self, candidate: &str) -> bool {
        !self.mount_paths.is_empty()
            && self
                .mount_paths
                .iter()
                .all(|mount| !mount.is_empty() && !candidate.starts_with(mount.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

fn single_proxy(ctx: &RequestContext, active: &[&RuleShape], candidate: &str) -> Option<RouteOutcome> {
    let hit = active.iter().find(|shape| {
        let eligible = matches!(
            shape,
            RuleShape::Legacy(_)
                | RuleShape::Single(_)
                | RuleShape::RouteTagged(TaggedRule {
                    route: RouteDecision::Proxy,
                    body: TaggedBody::Single(_),
                })
        );
        eligible && shape_matches(ctx, shape.rule(), candidate)
    })?;
    warn!(rule = %hit, "hit proxy");
    Some(RouteOutcome::matched(
        RouteDecision::Proxy,
        Stage::SingleProxy,
        hit.to_string(),
        "proxy rule matched",
    ))
}

fn group_proxy(ctx: &RequestContext, active: &[&RuleShape], candidate: &str) -> Option<RouteOutcome> {
    let groups = group_by(active.iter().copied(), |shape| match shape {
        RuleShape::Grouped(g) => Some(g.group.as_str()),
        RuleShape::RouteTagged(TaggedRule {
            route: RouteDecision::Proxy,
            body: TaggedBody::Grouped(g),
        }) => Some(g.group.as_str()),
        _ => None,
    });
    for (name, members) in groups {
        let rules: Vec<_> = members.iter().map(|s| s.rule()).collect();
        if let Some(name) = evaluate_group(ctx, name, &rules, candidate) {
            warn!(group = name, "hit proxy, group");
            return Some(RouteOutcome::matched(
                RouteDecision::Proxy,
                Stage::GroupProxy,
                name,
                "proxy group matched",
            ));
        }
    }
    None
}

/// Non-proxy tags in declaration order. A tag whose first rule carries a
/// group label is a single AND group; otherwise any member awards the tag.
fn tagged_route(ctx: &RequestContext, active: &[&RuleShape], candidate: &str) -> Option<RouteOutcome> {
    let tags = group_by(active.iter().copied(), |shape| {
        shape.route().filter(|route| **route != RouteDecision::Proxy)
    });
    for (route, members) in tags {
        let Some(first) = members.first() else {
            continue;
        };
        if let Some(label) = first.group() {
            let rules: Vec<_> = members.iter().map(|s| s.rule()).collect();
            if let Some(label) = evaluate_group(ctx, label, &rules, candidate) {
                warn!(route = %route, group = label, "hit route, group");
                return Some(RouteOutcome::matched(
                    route.clone(),
                    Stage::TaggedRoute,
                    label,
                    format!("{route} group matched"),
                ));
            }
        } else if let Some(hit) = members.iter().find(|s| shape_matches(ctx, s.rule(), candidate)) {
            warn!(route = %route, rule = %hit, "hit route");
            return Some(RouteOutcome::matched(
                route.clone(),
                Stage::TaggedRoute,
                hit.to_string(),
                format!("{route} rule matched"),
            ));
        }
    }
    None
}
