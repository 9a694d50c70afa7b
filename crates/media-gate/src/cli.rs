use clap::{Args, Parser, Subcommand};
use route_engine::{RequestContext, ViewFlag, INTERNAL_ARG};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "media-gate",
    version,
    about = "Route decisions, signed direct links and item hiding for media-server proxies"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    pub config: PathBuf,

    /// Path to the policy file (overrides config file setting)
    #[arg(short, long, global = true)]
    pub policy: Option<PathBuf>,

    /// Path to the audit log (overrides config file setting)
    #[arg(long, global = true)]
    pub audit_log: Option<PathBuf>,

    /// Do not write an audit trail for this invocation
    #[arg(long, global = true)]
    pub no_audit: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decide whether a media request is proxied, redirected, blocked or
    /// sent to a custom route
    Decide {
        /// Media file path, or storage link with --storage-link
        candidate: String,
        /// The candidate is a storage backend link
        #[arg(long)]
        storage_link: bool,
        /// Never proxy local files that live outside the media mounts
        #[arg(long)]
        no_local_bypass: bool,
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Sign a storage link
    Sign {
        url: String,
        /// Signing key (defaults to the policy's storage.sign_secret)
        #[arg(long)]
        secret: Option<String>,
        /// Link lifetime in hours (defaults to the policy's storage.sign_expire_hours)
        #[arg(long, conflicts_with = "expires_at")]
        expire_hours: Option<u64>,
        /// Absolute expiry as Unix seconds; 0 never expires
        #[arg(long)]
        expires_at: Option<u64>,
    },
    /// Print the direct storage link a client should receive, if any
    ClientLink {
        /// Storage link being served
        candidate: String,
        /// Backend-relative file path (defaults to the path part of the candidate)
        #[arg(long)]
        storage_path: Option<String>,
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Filter a catalogue listing read from a file or stdin
    HideItems {
        /// Listing JSON; read from stdin when absent
        #[arg(long)]
        body: Option<PathBuf>,
        /// Kind of listing: itemSimilar, searchSuggest or backdropSuggest
        #[arg(long)]
        view: Option<ViewFlag>,
        /// Path of the item a similar-items listing belongs to
        #[arg(long)]
        main_item_path: Option<String>,
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Apply the policy's path mappings to a media path
    MapPath { path: String },
    /// Validate the policy file and report rule counts
    Check,
}

/// Facts about the request being evaluated.
#[derive(Args, Debug, Default, Clone)]
pub struct RequestArgs {
    /// Query argument, repeatable
    #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub args: Vec<(String, String)>,

    /// Request header, repeatable
    #[arg(long = "header", value_name = "NAME=VALUE", value_parser = parse_key_value)]
    pub headers: Vec<(String, String)>,

    /// Client address
    #[arg(long)]
    pub remote_addr: Option<String>,

    /// Mark the request as issued by the proxy itself
    #[arg(long)]
    pub internal: bool,
}

impl RequestArgs {
    pub fn to_context(&self) -> RequestContext {
        let mut ctx = RequestContext::new();
        for (k, v) in &self.args {
            ctx = ctx.with_arg(k, v);
        }
        for (k, v) in &self.headers {
            ctx = ctx.with_header(k, v);
        }
        if let Some(addr) = &self.remote_addr {
            ctx = ctx.with_remote_addr(addr);
        }
        if self.internal {
            ctx = ctx.with_arg(INTERNAL_ARG, "1");
        }
        ctx
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if k.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((k.to_string(), v.to_string()))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_decide_with_request_facts() {
        let cli = Cli::try_parse_from([
            "media-gate",
            "--policy",
            "p.yaml",
            "decide",
            "/mnt/media/a.mkv",
            "--arg",
            "X-Emby-Client=Emby Web",
            "--remote-addr",
            "10.0.0.1",
            "--internal",
        ])
        .unwrap();
        assert_eq!(cli.policy, Some(PathBuf::from("p.yaml")));
        let Command::Decide {
            candidate,
            storage_link,
            request,
            ..
        } = cli.command
        else {
            panic!("expected decide");
        };
        assert_eq!(candidate, "/mnt/media/a.mkv");
        assert!(!storage_link);

        let ctx = request.to_context();
        assert_eq!(ctx.arg("X-Emby-Client"), Some("Emby Web"));
        assert_eq!(ctx.remote_addr(), Some("10.0.0.1"));
        assert!(ctx.is_internal());
    }

    #[test]
    fn parses_view_flag() {
        let cli = Cli::try_parse_from(["media-gate", "hide-items", "--view", "searchSuggest"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::HideItems {
                view: Some(ViewFlag::SearchSuggest),
                ..
            }
        ));
        assert!(Cli::try_parse_from(["media-gate", "hide-items", "--view", "nope"]).is_err());
    }

    #[test]
    fn rejects_malformed_key_values() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=v").is_err());
        assert_eq!(parse_key_value("k=a=b").unwrap(), ("k".into(), "a=b".into()));
    }

    #[test]
    fn expiry_flags_conflict() {
        let res = Cli::try_parse_from([
            "media-gate",
            "sign",
            "http://s/d/a",
            "--expire-hours",
            "1",
            "--expires-at",
            "5",
        ]);
        assert!(res.is_err());
    }
}
