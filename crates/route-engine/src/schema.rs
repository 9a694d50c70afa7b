use serde::{Deserialize, Serialize};

use crate::matcher::RuleField;

/// Top-level policy configuration loaded from a YAML file.
///
/// Rule lists stay in their raw tuple form here; [`MediaGate`](crate::MediaGate)
/// normalizes them once when it is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Schema version; currently must be "1.0".
    pub version: String,
    /// Path prefixes under which the media server sees storage-backed files.
    #[serde(default)]
    pub media_mount_path: Vec<String>,
    /// Route tags accepted in addition to `proxy`, `redirect` and `block`.
    #[serde(default)]
    pub route_targets: Vec<String>,
    /// Rules deciding how a media request is served.
    #[serde(default)]
    pub route_rule: Vec<RuleField>,
    /// Rules selecting clients that fetch from the storage backend directly.
    #[serde(default)]
    pub client_link_rule: Vec<RuleField>,
    /// Rules hiding catalogue items by media path.
    #[serde(default)]
    pub item_hidden_rule: Vec<RuleField>,
    /// `[mode, search, replacement?]` rewrites from media paths to storage paths.
    #[serde(default)]
    pub path_mapping: Vec<RuleField>,
    /// Storage backend addressing and link signing.
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Address clients use to reach the storage backend.
    #[serde(default)]
    pub public_addr: String,
    #[serde(default)]
    pub sign_enabled: bool,
    /// HMAC key shared with the storage backend.
    #[serde(default)]
    pub sign_secret: String,
    /// Lifetime of a signed link; absent or 0 never expires.
    #[serde(default)]
    pub sign_expire_hours: Option<u64>,
}
