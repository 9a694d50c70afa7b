use serde_json::Value;
use tracing::{debug, info};

use crate::client_link::client_link;
use crate::context::RequestContext;
use crate::decision::RouteOutcome;
use crate::items::{hide_items, HideOutcome, ViewFlag};
use crate::mapping::{map_path, parse_mappings, PathMapping};
use crate::router::RoutePolicy;
use crate::rule::RuleSet;
use crate::schema::PolicyConfig;

// ---------------------------------------------------------------------------
// MediaGate
// ---------------------------------------------------------------------------

/// A loaded policy, ready to answer routing, linking and filtering
/// questions.
///
/// Construct via [`MediaGate::new`], which normalizes every rule list once.
/// The value is immutable and can be shared across threads.
pub struct MediaGate {
    config: PolicyConfig,
    route: RoutePolicy,
    client_links: RuleSet,
    hidden_items: RuleSet,
    mappings: Vec<PathMapping>,
}

impl std::fmt::Debug for MediaGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaGate")
            .field("version", &self.config.version)
            .field("mount_paths", &self.route.mount_paths)
            .field("route_rules", &self.route.rules.len())
            .field("client_link_rules", &self.client_links.len())
            .field("item_hidden_rules", &self.hidden_items.len())
            .field("path_mappings", &self.mappings.len())
            .field("sign_enabled", &self.config.storage.sign_enabled)
            .finish()
    }
}

impl MediaGate {
    /// Build from a validated [`PolicyConfig`]. Malformed rules are logged
    /// and skipped.
    pub fn new(config: PolicyConfig) -> Self {
        let custom = &config.route_targets;
        let route = RoutePolicy::new(
            RuleSet::from_raw(&config.route_rule, custom, "route_rule")
                .resolve_legacy_routes(custom, "route_rule"),
            config.media_mount_path.clone(),
        );
        let client_links = RuleSet::from_raw(&config.client_link_rule, custom, "client_link_rule");
        let hidden_items = RuleSet::from_raw(&config.item_hidden_rule, custom, "item_hidden_rule");
        let mappings = parse_mappings(&config.path_mapping);

        info!(
            route_rules = route.rules.len(),
            client_link_rules = client_links.len(),
            item_hidden_rules = hidden_items.len(),
            path_mappings = mappings.len(),
            "policy rules normalized"
        );

        Self {
            config,
            route,
            client_links,
            hidden_items,
            mappings,
        }
    }

    /// Return a reference to the underlying config.
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn route_policy(&self) -> &RoutePolicy {
        &self.route
    }

    pub fn client_link_rules(&self) -> &RuleSet {
        &self.client_links
    }

    pub fn item_hidden_rules(&self) -> &RuleSet {
        &self.hidden_items
    }

    // -- Entry points ---------------------------------------------------------

    /// Decide how to serve `candidate`. See [`RoutePolicy::decide`].
    pub fn decide_route(
        &self,
        ctx: &RequestContext,
        candidate: &str,
        is_storage_link: bool,
        local_bypass_allowed: bool,
    ) -> RouteOutcome {
        self.route
            .decide(ctx, candidate, is_storage_link, local_bypass_allowed)
    }

    /// Sign a storage link when signing is enabled; otherwise return it as is.
    pub fn direct_link(&self, url: &str) -> String {
        let storage = &self.config.storage;
        if !storage.sign_enabled {
            return url.to_string();
        }
        link_signer::sign(url, &storage.sign_secret, storage.sign_expire_hours)
    }

    /// The storage link this client should fetch directly, signed when
    /// signing is enabled. `None` when no client-link rule matches.
    pub fn client_link(
        &self,
        ctx: &RequestContext,
        candidate: &str,
        storage_path: Option<&str>,
    ) -> Option<String> {
        let link = client_link(
            ctx,
            self.client_links.rules(),
            candidate,
            storage_path,
            &self.config.storage.public_addr,
        )?;
        Some(self.direct_link(&link))
    }

    /// Remove hidden items from a listing body in place.
    pub fn hide_items(
        &self,
        ctx: &RequestContext,
        body: &mut Value,
        view: Option<ViewFlag>,
        main_item_path: Option<&str>,
    ) -> HideOutcome {
        if self.hidden_items.is_empty() {
            debug!("no item hidden rules; listing untouched");
            let remaining = body
                .get("Items")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            return HideOutcome {
                hidden: 0,
                remaining,
            };
        }
        hide_items(ctx, self.hidden_items.rules(), body, view, main_item_path)
    }

    /// Rewrite a media path with the configured path mappings.
    pub fn map_path(&self, path: &str) -> String {
        map_path(&self.mappings, path)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::decision::{RouteDecision, Stage};
    use crate::loader::load_policy_from_str;

    fn gate_from_yaml(yaml: &str) -> MediaGate {
        MediaGate::new(load_policy_from_str(yaml).unwrap())
    }

    const POLICY: &str = r#"
version: "1.0"
media_mount_path: ["/mnt/media"]
route_targets: ["transcode"]
route_rule:
  - ["filePath", "startsWith", "/mnt/media/local"]
  - ["lan", "r.variables.remote_addr", "startsWith", "192.168."]
  - ["lan", "filePath", "endsWith", ".iso"]
  - ["block", "filePath", "includes", "/private/"]
  - ["transcode", "r.args.X-Emby-Client", "startsWith", "Kodi"]
  - "garbage"
client_link_rule:
  - ["infuse", "r.args.X-Emby-Client", "startsWith", ["Infuse"], "http://lan:5244"]
  - ["r.args.X-Emby-Client", "startsWith", "Emby Web"]
item_hidden_rule:
  - [2, "/private/"]
path_mapping:
  - [0, "/mnt/media", "/AList"]
storage:
  public_addr: "http://storage:5244"
  sign_enabled: true
  sign_secret: "secret"
"#;

    #[test]
    fn rules_are_normalized_once() {
        let gate = gate_from_yaml(POLICY);
        assert_eq!(gate.route_policy().rules.len(), 5);
        assert_eq!(gate.client_link_rules().len(), 2);
        assert_eq!(gate.item_hidden_rules().len(), 1);
    }

    #[test]
    fn routes_through_every_stage() {
        let gate = gate_from_yaml(POLICY);
        let ctx = RequestContext::new().with_remote_addr("8.8.8.8");

        let o = gate.decide_route(&ctx, "/share/a.mkv", false, true);
        assert_eq!(o.stage, Stage::MountPath);

        let o = gate.decide_route(&ctx, "/mnt/media/local/a.mkv", false, true);
        assert_eq!(o.stage, Stage::SingleProxy);

        let lan = RequestContext::new().with_remote_addr("192.168.0.2");
        let o = gate.decide_route(&lan, "/mnt/media/disc.iso", false, true);
        assert_eq!(o.stage, Stage::GroupProxy);

        let o = gate.decide_route(&ctx, "/mnt/media/private/a.mkv", false, true);
        assert_eq!(o.decision, RouteDecision::Block);

        let kodi = ctx.clone().with_arg("X-Emby-Client", "Kodi");
        let o = gate.decide_route(&kodi, "/mnt/media/a.mkv", false, true);
        assert_eq!(o.decision, RouteDecision::Custom("transcode".into()));

        let o = gate.decide_route(&ctx, "/mnt/media/a.mkv", false, true);
        assert_eq!(o.decision, RouteDecision::Redirect);
        assert_eq!(o.stage, Stage::Default);
    }

    #[test]
    fn direct_links_are_signed_when_enabled() {
        let gate = gate_from_yaml(POLICY);
        let link = gate.direct_link("http://storage:5244/d/Alist/movie.mkv");
        assert_eq!(
            link,
            "http://storage:5244/d/Alist/movie.mkv?sign=OJ3X3e9PMN-F5gHSEJtyxSyNy_BaqXhLDjtCxJv-lLE=:0"
        );

        let unsigned = gate_from_yaml("version: \"1.0\"\n");
        assert_eq!(unsigned.direct_link("http://s/d/a.mkv"), "http://s/d/a.mkv");
    }

    #[test]
    fn client_links_use_rule_or_public_address() {
        let gate = gate_from_yaml(POLICY);
        let infuse = RequestContext::new().with_arg("X-Emby-Client", "Infuse");
        let link = gate
            .client_link(&infuse, "http://storage:5244/d/Alist/movie.mkv", Some("/Alist/movie.mkv"))
            .unwrap();
        assert!(link.starts_with("http://lan:5244/d/Alist/movie.mkv?sign="), "{link}");

        let web = RequestContext::new().with_arg("X-Emby-Client", "Emby Web");
        let link = gate
            .client_link(&web, "http://storage:5244/d/Alist/movie.mkv", Some("/Alist/movie.mkv"))
            .unwrap();
        assert!(link.starts_with("http://storage:5244/d/Alist/movie.mkv?sign="), "{link}");

        let kodi = RequestContext::new().with_arg("X-Emby-Client", "Kodi");
        assert!(gate.client_link(&kodi, "http://storage:5244/d/a.mkv", None).is_none());
    }

    #[test]
    fn hides_items_and_maps_paths() {
        let gate = gate_from_yaml(POLICY);
        let mut body = json!({
            "Items": [{ "Path": "/mnt/media/private/a.mkv" }, { "Path": "/mnt/media/b.mkv" }],
            "TotalRecordCount": 2,
        });
        let o = gate.hide_items(&RequestContext::new(), &mut body, None, None);
        assert_eq!(o, HideOutcome { hidden: 1, remaining: 1 });
        assert_eq!(body["TotalRecordCount"], 1);

        assert_eq!(gate.map_path("/mnt/media/b.mkv"), "/AList/b.mkv");
    }

    #[test]
    fn empty_hide_rules_leave_listing_alone() {
        let gate = gate_from_yaml("version: \"1.0\"\n");
        let mut body = json!({ "Items": [{ "Path": "/a" }] });
        let o = gate.hide_items(&RequestContext::new(), &mut body, None, None);
        assert_eq!(o, HideOutcome { hidden: 0, remaining: 1 });
    }

    #[test]
    fn gate_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MediaGate>();
    }

    #[test]
    fn debug_output_is_compact() {
        let gate = gate_from_yaml(POLICY);
        let debug = format!("{gate:?}");
        assert!(debug.contains("route_rules: 5"), "{debug}");
        assert!(!debug.contains("secret\""), "{debug}");
    }
}
