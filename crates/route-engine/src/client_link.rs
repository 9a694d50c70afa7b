use link_signer::encode_uri;
use tracing::debug;

use crate::context::RequestContext;
use crate::filter::filter_first_match;
use crate::rule::{RuleShape, Source};

/// Build the storage link a client should fetch directly, if a client-link
/// rule matches.
///
/// `candidate` is the storage link being served; `storage_path` is the
/// backend-relative file path, defaulting to `candidate`. The link points at
/// the matched rule's own public address when it names one, else at
/// `default_public_addr`.
pub fn client_link(
    ctx: &RequestContext,
    rules: &[RuleShape],
    candidate: &str,
    storage_path: Option<&str>,
    default_public_addr: &str,
) -> Option<String> {
    let hit = filter_first_match(ctx, rules, candidate, &Source::StorageLink, "client_link_rule")?;
    let addr = hit.rule().extra_str().unwrap_or(default_public_addr);
    let path = storage_path.unwrap_or(candidate);
    let link = format!("{addr}/d{}", encode_uri(path));
    debug!(link = link.as_str(), "client link issued");
    Some(link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::RuleField;
    use crate::rule::RuleSet;

    fn rules(yaml: &str) -> RuleSet {
        let raw: Vec<RuleField> = serde_yml::from_str(yaml).unwrap();
        RuleSet::from_raw(&raw, &[], "client_link_rule")
    }

    #[test]
    fn uses_rule_address_when_present() {
        let set = rules(
            r#"
- ["infuse", "r.args.X-Emby-Client", "startsWith", "Infuse", "http://lan:5244"]
"#,
        );
        let ctx = RequestContext::new().with_arg("X-Emby-Client", "Infuse");
        let link = client_link(
            &ctx,
            set.rules(),
            "http://storage:5244/d/AList/a b.mkv",
            Some("/AList/a b.mkv"),
            "http://public:5244",
        );
        assert_eq!(link.as_deref(), Some("http://lan:5244/d/AList/a%20b.mkv"));
    }

    #[test]
    fn falls_back_to_public_address() {
        let set = rules(r#"[["r.args.X-Emby-Client", "includes", "Kodi"]]"#);
        let ctx = RequestContext::new().with_arg("X-Emby-Client", "Kodi");
        let link = client_link(&ctx, set.rules(), "/AList/电影.mkv", None, "http://public:5244");
        assert_eq!(
            link.as_deref(),
            Some("http://public:5244/d/AList/%E7%94%B5%E5%BD%B1.mkv")
        );
    }

    #[test]
    fn legacy_rules_compare_the_storage_link() {
        let set = rules(r#"[[0, "http://storage:5244", "http://lan:5244"]]"#);
        let link = client_link(
            &RequestContext::new(),
            set.rules(),
            "http://storage:5244/d/AList/a.mkv",
            Some("/AList/a.mkv"),
            "http://public:5244",
        );
        assert_eq!(link.as_deref(), Some("http://lan:5244/d/AList/a.mkv"));
    }

    #[test]
    fn no_match_no_link() {
        let set = rules(r#"[["r.args.X-Emby-Client", "includes", "Kodi"]]"#);
        let link = client_link(&RequestContext::new(), set.rules(), "/a.mkv", None, "http://p");
        assert!(link.is_none());
    }
}
