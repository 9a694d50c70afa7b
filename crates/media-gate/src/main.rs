mod cli;
mod commands;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
use route_engine::MediaGate;

use crate::cli::Cli;
use crate::config::Config;

const COMPONENT: &str = "media-gate";

async fn record(audit: Option<&AuditSink>, entry: AuditEntry) {
    if let Some(sink) = audit {
        sink.log(entry).await;
    }
}

/// Load the policy, run the requested subcommand and print its output.
async fn execute(cli: &Cli, cfg: &Config, audit: Option<&AuditSink>) -> Result<()> {
    let policy = route_engine::loader::load_policy(&cfg.policy_file)
        .context("failed to load policy file")?;
    let gate = MediaGate::new(policy);

    info!(
        policy_file = %cfg.policy_file.display(),
        ?gate,
        "policy loaded"
    );

    record(
        audit,
        AuditEntry::new(
            AuditEventType::PolicyLoaded,
            AuditSource::new(COMPONENT),
            serde_json::json!({
                "policy_file": cfg.policy_file.display().to_string(),
            }),
        ),
    )
    .await;

    let report = commands::run(
        &cli.command,
        &gate,
        &cfg.policy_file,
        &mut std::io::stdin().lock(),
    )?;

    for entry in report.audit {
        record(audit, entry).await;
    }
    println!("{}", report.output);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;

    if let Some(ref policy) = cli.policy {
        cfg.policy_file = policy.clone();
    }
    if let Some(ref path) = cli.audit_log {
        cfg.logging.audit_log_path = path.clone();
    }
    if cli.no_audit {
        cfg.logging.audit_enabled = false;
    }

    // 3. Init tracing-subscriber with JSON format. Stdout carries command
    //    output, so logs go to stderr.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(
        config_file = %cli.config.display(),
        policy_file = %cfg.policy_file.display(),
        audit_enabled = cfg.logging.audit_enabled,
        "media-gate starting"
    );

    // 4. Start audit logger.
    let audit = if cfg.logging.audit_enabled {
        Some(
            AuditSink::start(&cfg.logging.audit_log_path)
                .await
                .context("failed to start audit logger")?,
        )
    } else {
        None
    };
    let sink = audit.as_ref().map(|(sink, _)| sink);

    record(
        sink,
        AuditEntry::new(
            AuditEventType::ProcessStarted,
            AuditSource::new(COMPONENT),
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config_file": cli.config.display().to_string(),
            }),
        ),
    )
    .await;

    // 5. Run the subcommand.
    let result = execute(&cli, &cfg, sink).await;
    if let Err(ref err) = result {
        error!(error = %format!("{err:#}"), "command failed");
    }

    record(
        sink,
        AuditEntry::new(
            AuditEventType::ProcessStopped,
            AuditSource::new(COMPONENT),
            serde_json::json!({ "success": result.is_ok() }),
        ),
    )
    .await;

    // 6. Close the audit channel and wait for the final flush.
    if let Some((sink, handle)) = audit {
        drop(sink);
        match handle.await {
            Ok(written) => info!(written, "audit log closed"),
            Err(err) => error!(%err, "audit writer task failed"),
        }
    }

    result
}
