use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::decision::BUILTIN_ROUTE_TAGS;
use crate::schema::PolicyConfig;

/// Load a [`PolicyConfig`] from a YAML file on disk.
///
/// Validates the config after deserialization (version, route targets,
/// signing settings).
pub fn load_policy(path: impl AsRef<Path>) -> Result<PolicyConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policy file: {}", path.display()))?;
    load_policy_from_str(&contents)
        .with_context(|| format!("failed to parse policy file: {}", path.display()))
}

/// Parse and validate a [`PolicyConfig`] from a YAML string.
///
/// This is the primary entry point used in tests.
pub fn load_policy_from_str(yaml: &str) -> Result<PolicyConfig> {
    let config: PolicyConfig =
        serde_yml::from_str(yaml).context("YAML deserialization failed")?;
    validate(&config)?;
    Ok(config)
}

/// Run post-deserialization validation checks.
fn validate(config: &PolicyConfig) -> Result<()> {
    // Version gate
    if config.version != "1.0" {
        bail!(
            "unsupported policy version '{}'; only '1.0' is supported",
            config.version
        );
    }

    // Custom route targets must be named, unique and not shadow a built-in tag
    let mut seen = HashSet::new();
    for target in &config.route_targets {
        if target.trim().is_empty() {
            bail!("route target name must not be empty");
        }
        if BUILTIN_ROUTE_TAGS.contains(&target.as_str()) {
            bail!("route target '{target}' collides with a built-in route");
        }
        if !seen.insert(target) {
            bail!("duplicate route target: '{target}'");
        }
    }

    if config.storage.sign_enabled && config.storage.sign_secret.is_empty() {
        bail!("storage.sign_enabled requires a non-empty storage.sign_secret");
    }

    Ok(())
}
