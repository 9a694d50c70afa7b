use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a request for a media file should go.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    /// Stream through this proxy.
    Proxy,
    /// Answer with a (possibly signed) direct link to the storage backend.
    Redirect,
    /// Refuse the request.
    Block,
    /// A deployment-defined route target.
    Custom(String),
}

/// Route tags every policy understands.
pub const BUILTIN_ROUTE_TAGS: [&str; 3] = ["proxy", "redirect", "block"];

impl RouteDecision {
    /// Map a rule's leading tag to a decision. `custom` lists the extra
    /// targets declared by the policy.
    pub fn from_tag(tag: &str, custom: &[String]) -> Option<Self> {
        match tag {
            "proxy" => Some(Self::Proxy),
            "redirect" => Some(Self::Redirect),
            "block" => Some(Self::Block),
            other if custom.iter().any(|c| c == other) => Some(Self::Custom(other.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Proxy => "proxy",
            Self::Redirect => "redirect",
            Self::Block => "block",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Precedence
// ---------------------------------------------------------------------------

/// The step of route evaluation that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Candidate lies outside every configured media mount.
    MountPath,
    /// An ungrouped proxy rule matched.
    SingleProxy,
    /// Every member of a proxy group matched.
    GroupProxy,
    /// A rule tagged with a non-proxy route matched.
    TaggedRoute,
    /// Nothing matched.
    Default,
}

/// Evaluation order of the route decision engine. Earlier stages win.
pub const ROUTE_PRECEDENCE: [Stage; 5] = [
    Stage::MountPath,
    Stage::SingleProxy,
    Stage::GroupProxy,
    Stage::TaggedRoute,
    Stage::Default,
];

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MountPath => "mount_path",
            Self::SingleProxy => "single_proxy",
            Self::GroupProxy => "group_proxy",
            Self::TaggedRoute => "tagged_route",
            Self::Default => "default",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// RouteOutcome
// ---------------------------------------------------------------------------

/// The outcome of routing one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteOutcome {
    /// The resolved route.
    pub decision: RouteDecision,
    /// The precedence stage that produced it.
    pub stage: Stage,
    /// The rule or group that matched, if any.
    pub matched: Option<String>,
    /// Human-readable reason explaining the decision.
    pub reason: String,
}

impl RouteOutcome {
    /// Fallback when nothing matched.
    pub fn redirect_default(reason: impl Into<String>) -> Self {
        Self {
            decision: RouteDecision::Redirect,
            stage: Stage::Default,
            matched: None,
            reason: reason.into(),
        }
    }

    /// The candidate is a local file outside every media mount.
    pub fn proxy_unmounted(reason: impl Into<String>) -> Self {
        Self {
            decision: RouteDecision::Proxy,
            stage: Stage::MountPath,
            matched: None,
            reason: reason.into(),
        }
    }

    pub fn matched(
        decision: RouteDecision,
        stage: Stage,
        matched: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            decision,
            stage,
            matched: Some(matched.into()),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_default_has_correct_fields() {
        let o = RouteOutcome::redirect_default("no rules matched");
        assert_eq!(o.decision, RouteDecision::Redirect);
        assert_eq!(o.stage, Stage::Default);
        assert!(o.matched.is_none());
        assert_eq!(o.reason, "no rules matched");
    }

    #[test]
    fn proxy_unmounted_has_correct_fields() {
        let o = RouteOutcome::proxy_unmounted("outside mounts");
        assert_eq!(o.decision, RouteDecision::Proxy);
        assert_eq!(o.stage, Stage::MountPath);
        assert!(o.matched.is_none());
    }

    #[test]
    fn tags_map_to_decisions() {
        let custom = vec!["transcode".to_string()];
        assert_eq!(RouteDecision::from_tag("proxy", &custom), Some(RouteDecision::Proxy));
        assert_eq!(RouteDecision::from_tag("block", &[]), Some(RouteDecision::Block));
        assert_eq!(
            RouteDecision::from_tag("transcode", &custom),
            Some(RouteDecision::Custom("transcode".into()))
        );
        assert_eq!(RouteDecision::from_tag("transcode", &[]), None);
        assert_eq!(RouteDecision::from_tag("r.args.X", &custom), None);
    }

    #[test]
    fn display_round_trips_tag() {
        for tag in BUILTIN_ROUTE_TAGS {
            assert_eq!(RouteDecision::from_tag(tag, &[]).unwrap().to_string(), tag);
        }
        assert_eq!(RouteDecision::Custom("x".into()).to_string(), "x");
    }

    #[test]
    fn precedence_ends_with_default() {
        assert_eq!(ROUTE_PRECEDENCE.first(), Some(&Stage::MountPath));
        assert_eq!(ROUTE_PRECEDENCE.last(), Some(&Stage::Default));
    }
}
