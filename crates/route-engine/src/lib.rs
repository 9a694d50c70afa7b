//! # route-engine
//!
//! Rule matching and route decisions for the media-gate proxy.  This crate
//! loads YAML policy files, normalizes the positional rule tuples they carry,
//! and answers three questions about a request for a media file: how to
//! serve it (proxy, redirect, block or a custom route), which direct link a
//! client should receive, and which catalogue items it may see.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use route_engine::{loader, MediaGate, RequestContext};
//!
//! let config = loader::load_policy("policy.yaml").unwrap();
//! let gate = MediaGate::new(config);
//! let ctx = RequestContext::new()
//!     .with_arg("X-Emby-Client", "Infuse")
//!     .with_remote_addr("192.168.1.20");
//! let outcome = gate.decide_route(&ctx, "/mnt/media/movie.mkv", false, true);
//! println!("{:?}", outcome);
//! ```

mod client_link;
mod context;
mod decision;
pub mod expression;
mod filter;
mod gate;
mod group;
mod items;
pub mod loader;
pub mod mapping;
pub mod matcher;
mod router;
mod rule;
mod schema;

// Re-export primary public API at crate root.
pub use client_link::client_link;
pub use context::{RequestContext, INTERNAL_ARG};
pub use decision::{RouteDecision, RouteOutcome, Stage, BUILTIN_ROUTE_TAGS, ROUTE_PRECEDENCE};
pub use expression::{resolve, resolve_default, ResolveError};
pub use filter::filter_first_match;
pub use gate::MediaGate;
pub use group::{evaluate_group, group_by_name, rule_matches};
pub use items::{applicable_rules, hide_items, HideOutcome, ViewFlag};
pub use mapping::{map_path, MappingMode, PathMapping};
pub use matcher::{matches, str_matches, MatchKind, MatchMode, ModeToken, Pattern, RuleError, RuleField};
pub use router::RoutePolicy;
pub use rule::{
    normalize, normalize_with, GroupedRule, Rule, RuleSet, RuleShape, ShapeError, Source,
    TaggedBody, TaggedRule,
};
pub use schema::{PolicyConfig, StorageConfig};
