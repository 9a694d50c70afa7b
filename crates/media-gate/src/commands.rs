use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use audit_log::{AuditEntry, AuditEventType, AuditSource, DecisionRecord};
use route_engine::mapping::parse_mappings;
use route_engine::{MediaGate, RequestContext, RouteDecision, RouteOutcome};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::cli::Command;

const COMPONENT: &str = "media-gate";

/// Arguments and headers media clients identify themselves with, most
/// specific first.
const CLIENT_KEYS: [&str; 2] = ["X-Emby-Client", "X-Plex-Product"];

/// What a subcommand produced: the text for stdout and the audit entries it
/// wants recorded.
#[derive(Debug)]
pub struct Report {
    pub output: String,
    pub audit: Vec<AuditEntry>,
}

impl Report {
    fn json(value: &Value) -> Result<Self> {
        Ok(Self {
            output: serde_json::to_string_pretty(value)?,
            audit: Vec::new(),
        })
    }

    fn with_audit(mut self, entry: AuditEntry) -> Self {
        self.audit.push(entry);
        self
    }
}

/// Run one subcommand against `gate`. `stdin` feeds `hide-items` when no
/// body file is given.
pub fn run(
    command: &Command,
    gate: &MediaGate,
    policy_file: &Path,
    stdin: &mut dyn Read,
) -> Result<Report> {
    match command {
        Command::Decide {
            candidate,
            storage_link,
            no_local_bypass,
            request,
        } => decide(gate, &request.to_context(), candidate, *storage_link, !no_local_bypass),
        Command::Sign {
            url,
            secret,
            expire_hours,
            expires_at,
        } => sign(gate, url, secret.as_deref(), *expire_hours, *expires_at),
        Command::ClientLink {
            candidate,
            storage_path,
            request,
        } => client_link(gate, &request.to_context(), candidate, storage_path.as_deref()),
        Command::HideItems {
            body,
            view,
            main_item_path,
            request,
        } => {
            let raw = match body {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read listing {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    stdin
                        .read_to_string(&mut buf)
                        .context("failed to read listing from stdin")?;
                    buf
                }
            };
            let mut listing: Value =
                serde_json::from_str(&raw).context("listing is not valid JSON")?;
            let ctx = request.to_context();
            let outcome = gate.hide_items(&ctx, &mut listing, *view, main_item_path.as_deref());
            info!(
                hidden = outcome.hidden,
                remaining = outcome.remaining,
                view = ?view,
                "listing filtered"
            );
            Ok(Report::json(&listing)?.with_audit(AuditEntry::new(
                AuditEventType::ItemsHidden,
                source_for(&ctx),
                json!({
                    "view": view.map(|v| v.as_str()),
                    "hidden": outcome.hidden,
                    "remaining": outcome.remaining,
                }),
            )))
        }
        Command::MapPath { path } => {
            let mapped = gate.map_path(path);
            debug!(path = path.as_str(), mapped = mapped.as_str(), "path mapped");
            Report::json(&json!({
                "path": path,
                "mapped": mapped,
                "absolute": link_signer::is_absolute_path(&mapped),
                "strm": link_signer::is_strm_path(&mapped),
            }))
        }
        Command::Check => check(gate, policy_file),
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn decide(
    gate: &MediaGate,
    ctx: &RequestContext,
    candidate: &str,
    storage_link: bool,
    local_bypass: bool,
) -> Result<Report> {
    let outcome = gate.decide_route(ctx, candidate, storage_link, local_bypass);
    info!(
        candidate,
        decision = %outcome.decision,
        stage = %outcome.stage,
        matched = ?outcome.matched,
        "route decided"
    );

    let mut output = serde_json::to_value(&outcome)?;
    if outcome.decision == RouteDecision::Redirect {
        if storage_link {
            output["link"] = json!(gate.direct_link(candidate));
        } else {
            output["storage_path"] = json!(gate.map_path(candidate));
        }
    }

    Ok(Report::json(&output)?.with_audit(
        AuditEntry::new(
            AuditEventType::RouteDecided,
            source_for(ctx),
            json!({ "candidate": candidate, "storage_link": storage_link }),
        )
        .with_decision(decision_record(&outcome)),
    ))
}

fn sign(
    gate: &MediaGate,
    url: &str,
    secret: Option<&str>,
    expire_hours: Option<u64>,
    expires_at: Option<u64>,
) -> Result<Report> {
    let storage = &gate.config().storage;
    let secret = secret.unwrap_or(&storage.sign_secret);
    if secret.is_empty() {
        bail!("no signing secret: pass --secret or set storage.sign_secret in the policy");
    }
    let expires_at = match expires_at {
        Some(at) => at,
        None => link_signer::expiry_from_hours(
            expire_hours.or(storage.sign_expire_hours),
            SystemTime::now(),
        ),
    };

    let signed = link_signer::sign_at(url, secret, expires_at);
    if signed == url {
        warn!(url, "link left unsigned");
    }

    Ok(Report {
        output: signed.clone(),
        audit: Vec::new(),
    }
    .with_audit(AuditEntry::new(
        AuditEventType::LinkSigned,
        AuditSource::new(COMPONENT),
        json!({ "url": url, "expires_at": expires_at, "signed": signed != url }),
    )))
}

fn client_link(
    gate: &MediaGate,
    ctx: &RequestContext,
    candidate: &str,
    storage_path: Option<&str>,
) -> Result<Report> {
    let derived;
    let storage_path = match storage_path {
        Some(p) => Some(p),
        None => {
            derived = link_signer::file_path_part(candidate).map(|p| {
                if link_signer::is_absolute_path(p) {
                    p.to_string()
                } else {
                    format!("/{p}")
                }
            });
            derived.as_deref()
        }
    };

    let link = gate.client_link(ctx, candidate, storage_path);
    match &link {
        Some(link) => info!(candidate, link = link.as_str(), "client link issued"),
        None => debug!(candidate, "no client link rule matched"),
    }

    let report = Report::json(&json!({ "link": link }))?;
    Ok(match link {
        Some(link) => report.with_audit(AuditEntry::new(
            AuditEventType::ClientLinkIssued,
            source_for(ctx),
            json!({ "candidate": candidate, "link": link }),
        )),
        None => report,
    })
}

/// Fails when any rule list holds entries that were skipped as malformed.
fn check(gate: &MediaGate, policy_file: &Path) -> Result<Report> {
    let config = gate.config();
    let counts = [
        ("route_rule", config.route_rule.len(), gate.route_policy().rules.len()),
        (
            "client_link_rule",
            config.client_link_rule.len(),
            gate.client_link_rules().len(),
        ),
        (
            "item_hidden_rule",
            config.item_hidden_rule.len(),
            gate.item_hidden_rules().len(),
        ),
        (
            "path_mapping",
            config.path_mapping.len(),
            parse_mappings(&config.path_mapping).len(),
        ),
    ];

    let skipped: usize = counts.iter().map(|(_, raw, kept)| raw.saturating_sub(*kept)).sum();
    if skipped > 0 {
        bail!(
            "{}: {skipped} malformed entries were skipped",
            policy_file.display()
        );
    }

    let mut report = serde_json::Map::new();
    report.insert("policy_file".into(), json!(policy_file.display().to_string()));
    for (name, _, kept) in counts {
        report.insert(name.into(), json!(kept));
    }
    Report::json(&Value::Object(report))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn source_for(ctx: &RequestContext) -> AuditSource {
    let mut source = AuditSource::new(COMPONENT);
    let client = CLIENT_KEYS
        .iter()
        .find_map(|key| ctx.arg(key).or_else(|| ctx.header(key)));
    if let Some(client) = client {
        source = source.with_client(client);
    }
    if let Some(addr) = ctx.remote_addr() {
        source = source.with_remote_addr(addr);
    }
    source
}

pub fn decision_record(outcome: &RouteOutcome) -> DecisionRecord {
    DecisionRecord {
        decision: outcome.decision.to_string(),
        matched: outcome.matched.clone(),
        stage: outcome.stage.to_string(),
    }
}
