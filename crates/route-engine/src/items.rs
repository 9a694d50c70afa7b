//! Hiding catalogue items whose media path matches a hide rule.
//!
//! Each hide rule may carry a level in its trailing field:
//!
//! | level | hidden from |
//! |---|---|
//! | absent / 0 | every listing, except similar-item lists of a hidden item |
//! | 1 | every listing except similar-item lists |
//! | 2 | like 0, but search suggestions keep the item |
//! | 3 | every listing except backdrop suggestions |

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::filter::filter_first_match;
use crate::group::{evaluate_group, group_by_name, rule_matches};
use crate::matcher::RuleField;
use crate::rule::{Rule, RuleShape, Source};

/// Which kind of listing is being filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewFlag {
    /// "More like this" for a main item.
    ItemSimilar,
    SearchSuggest,
    BackdropSuggest,
}

impl ViewFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ItemSimilar => "itemSimilar",
            Self::SearchSuggest => "searchSuggest",
            Self::BackdropSuggest => "backdropSuggest",
        }
    }
}

impl fmt::Display for ViewFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "itemSimilar" => Ok(Self::ItemSimilar),
            "searchSuggest" => Ok(Self::SearchSuggest),
            "backdropSuggest" => Ok(Self::BackdropSuggest),
            other => Err(format!(
                "unknown view flag '{other}'; expected itemSimilar, searchSuggest or backdropSuggest"
            )),
        }
    }
}

/// Result of filtering one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HideOutcome {
    pub hidden: usize,
    pub remaining: usize,
}

/// Hide level of a rule; numeric strings count too.
fn hide_level(rule: &Rule) -> Option<i64> {
    match rule.extra.first()? {
        RuleField::Int(n) => Some(*n),
        RuleField::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The hide rules that apply to a listing of kind `view`.
///
/// A group's level is taken from its first member. `main_item_path` is the
/// path of the item whose similar-items list is being built; rules at level
/// absent/0/2 that would hide that item are dropped so the list stays usable.
pub fn applicable_rules(
    ctx: &RequestContext,
    rules: &[RuleShape],
    view: Option<ViewFlag>,
    main_item_path: Option<&str>,
) -> Vec<RuleShape> {
    let main_item_path = main_item_path.filter(|p| !p.is_empty());
    let group_members =
        group_by_name(rules.iter().filter(|shape| matches!(shape, RuleShape::Grouped(_))));
    let groups: HashMap<&str, &[&Rule]> = group_members
        .iter()
        .map(|(name, members)| (*name, members.as_slice()))
        .collect();

    rules
        .iter()
        .filter(|shape| {
            if matches!(shape, RuleShape::RouteTagged(_)) {
                return false;
            }
            let members = shape.group().and_then(|name| groups.get(name).copied());
            let level = match members {
                Some(members) => members.first().and_then(|rule| hide_level(rule)),
                None => hide_level(shape.rule()),
            };

            if matches!(level, None | Some(0) | Some(2)) {
                if let Some(main) = main_item_path {
                    let hides_main = match (shape.group(), members) {
                        (Some(name), Some(members)) => {
                            evaluate_group(ctx, name, members, main).is_some()
                        }
                        _ => rule_matches(ctx, shape.rule(), &flat_source(shape), main),
                    };
                    if hides_main {
                        return false;
                    }
                }
            }
            !matches!(
                (view, level),
                (Some(ViewFlag::SearchSuggest), Some(2))
                    | (Some(ViewFlag::BackdropSuggest), Some(3))
                    | (Some(ViewFlag::ItemSimilar), Some(1))
            )
        })
        .cloned()
        .collect()
}

fn flat_source(shape: &RuleShape) -> Source {
    match shape {
        RuleShape::Legacy(_) => Source::FilePath,
        other => other.rule().source.clone(),
    }
}

/// Remove hidden entries from a listing body in place.
///
/// `body` is a listing object with an `Items` array whose entries carry a
/// `Path`; entries without one stay visible. A non-zero `TotalRecordCount`
/// is reduced by the number of hidden entries.
pub fn hide_items(
    ctx: &RequestContext,
    rules: &[RuleShape],
    body: &mut Value,
    view: Option<ViewFlag>,
    main_item_path: Option<&str>,
) -> HideOutcome {
    let applicable = applicable_rules(ctx, rules, view, main_item_path);
    debug!(
        rules = rules.len(),
        applicable = applicable.len(),
        view = ?view,
        "filtering items"
    );

    let Some(items) = body.get_mut("Items").and_then(Value::as_array_mut) else {
        return HideOutcome {
            hidden: 0,
            remaining: 0,
        };
    };

    let before = items.len();
    items.retain(|item| {
        let Some(path) = item.get("Path").and_then(Value::as_str).filter(|p| !p.is_empty()) else {
            return true;
        };
        let hit = filter_first_match(ctx, &applicable, path, &Source::FilePath, "item_hidden_rule");
        if hit.is_some() {
            warn!(path, "item path hit hide rule");
        }
        hit.is_none()
    });
    let remaining = items.len();
    let hidden = before - remaining;

    if let Some(total) = body.get("TotalRecordCount").and_then(Value::as_i64) {
        if total != 0 {
            body["TotalRecordCount"] = Value::from(total - hidden as i64);
        }
    }

    HideOutcome { hidden, remaining }
}
