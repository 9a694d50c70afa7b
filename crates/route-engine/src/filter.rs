use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::group::{evaluate_group, group_by_name, rule_matches, shape_matches};
use crate::rule::{RuleShape, Source};

/// Find the first rule, or the first rule of the first group, that matches.
///
/// Flat rules (`Legacy`, `Single`) and grouped rules are evaluated as two
/// blocks; whichever kind appears first in `rules` goes first. Legacy rules
/// compare `default_source`. Route-tagged rules are ignored. `label` names
/// the rule list in log output.
pub fn filter_first_match<'a>(
    ctx: &RequestContext,
    rules: &'a [RuleShape],
    candidate: &str,
    default_source: &Source,
    label: &str,
) -> Option<&'a RuleShape> {
    let flat_first = rules
        .iter()
        .find(|shape| !matches!(shape, RuleShape::RouteTagged(_)))
        .is_some_and(|shape| !matches!(shape, RuleShape::Grouped(_)));
    debug!(list = label, flat_first, "filtering rules");

    if flat_first {
        first_flat(ctx, rules, candidate, default_source, label)
            .or_else(|| first_group(ctx, rules, candidate, label))
    } else {
        first_group(ctx, rules, candidate, label)
            .or_else(|| first_flat(ctx, rules, candidate, default_source, label))
    }
}

fn first_flat<'a>(
    ctx: &RequestContext,
    rules: &'a [RuleShape],
    candidate: &str,
    default_source: &Source,
    label: &str,
) -> Option<&'a RuleShape> {
    let hit = rules.iter().find(|shape| match shape {
        RuleShape::Legacy(rule) => rule_matches(ctx, rule, default_source, candidate),
        RuleShape::Single(rule) => shape_matches(ctx, rule, candidate),
        _ => false,
    })?;
    warn!(list = label, rule = %hit, "hit rule");
    Some(hit)
}

fn first_group<'a>(
    ctx: &RequestContext,
    rules: &'a [RuleShape],
    candidate: &str,
    label: &str,
) -> Option<&'a RuleShape> {
    let grouped = rules.iter().filter(|shape| matches!(shape, RuleShape::Grouped(_)));
    for (name, members) in group_by_name(grouped) {
        if evaluate_group(ctx, name, &members, candidate).is_some() {
            warn!(list = label, group = name, "hit rule group");
            return rules
                .iter()
                .find(|shape| matches!(shape, RuleShape::Grouped(g) if g.group == name));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::RuleField;
    use crate::rule::RuleSet;

    fn rules(yaml: &str) -> RuleSet {
        let raw: Vec<RuleField> = serde_yml::from_str(yaml).unwrap();
        RuleSet::from_raw(&raw, &[], "test")
    }

    fn ctx() -> RequestContext {
        RequestContext::new().with_arg("X-Emby-Client", "Infuse")
    }

    #[test]
    fn returns_first_flat_match_in_supplied_shape() {
        let set = rules(
            r#"
- [0, "/nas"]
- [2, "/movies/", "http://a"]
- ["filePath", "includes", "/movies/"]
"#,
        );
        let hit = filter_first_match(&ctx(), set.rules(), "/mnt/movies/a.mkv", &Source::FilePath, "t")
            .unwrap();
        assert!(matches!(hit, RuleShape::Legacy(_)));
        assert_eq!(hit.rule().extra_str(), Some("http://a"));
    }

    #[test]
    fn group_hit_returns_groups_first_rule() {
        let set = rules(
            r#"
- ["infuse", "r.args.X-Emby-Client", "startsWith", "Infuse", "http://first"]
- ["infuse", "filePath", "includes", "/movies/", "http://second"]
"#,
        );
        let hit = filter_first_match(&ctx(), set.rules(), "/mnt/movies/a.mkv", &Source::FilePath, "t")
            .unwrap();
        assert_eq!(hit.group(), Some("infuse"));
        assert_eq!(hit.rule().extra_str(), Some("http://first"));

        assert!(filter_first_match(&ctx(), set.rules(), "/mnt/tv/a.mkv", &Source::FilePath, "t")
            .is_none());
    }

    #[test]
    fn partition_appearing_first_wins() {
        let grouped_first = rules(
            r#"
- ["g", "filePath", "includes", "/movies/", "http://group"]
- [2, "/movies/", "http://flat"]
"#,
        );
        let hit = filter_first_match(
            &ctx(),
            grouped_first.rules(),
            "/movies/a.mkv",
            &Source::FilePath,
            "t",
        )
        .unwrap();
        assert_eq!(hit.rule().extra_str(), Some("http://group"));

        let flat_first = rules(
            r#"
- [2, "/movies/", "http://flat"]
- ["g", "filePath", "includes", "/movies/", "http://group"]
"#,
        );
        let hit = filter_first_match(&ctx(), flat_first.rules(), "/movies/a.mkv", &Source::FilePath, "t")
            .unwrap();
        assert_eq!(hit.rule().extra_str(), Some("http://flat"));
    }

    #[test]
    fn route_tagged_rules_are_ignored() {
        let set = rules(r#"[["block", "filePath", "includes", "/movies/"]]"#);
        assert!(filter_first_match(&ctx(), set.rules(), "/movies/a.mkv", &Source::FilePath, "t")
            .is_none());
    }

    #[test]
    fn group_hit_skips_route_tagged_rule_with_same_label() {
        let set = rules(
            r#"
- ["block", "g", "filePath", "includes", "/nomatch/"]
- ["g", "filePath", "includes", "/movies/", "http://right"]
"#,
        );
        let hit = filter_first_match(&ctx(), set.rules(), "/movies/a.mkv", &Source::FilePath, "t")
            .unwrap();
        assert!(matches!(hit, RuleShape::Grouped(_)));
        assert_eq!(hit.rule().extra_str(), Some("http://right"));
    }

    #[test]
    fn legacy_rules_use_default_source() {
        let set = rules(r#"[[0, "http://storage"]]"#);
        let hit = filter_first_match(
            &ctx(),
            set.rules(),
            "http://storage/d/a.mkv",
            &Source::StorageLink,
            "t",
        );
        assert!(hit.is_some());
    }
}
