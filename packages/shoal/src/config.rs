use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shoal_auth::PermissionSet;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [session]
//                    default_workspace = "production"
//
//   env var:         SHOAL_SESSION__DEFAULT_WORKSPACE=production
//                    (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub auth: AuthFileConfig,
}

/// Server tuning knobs (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Ceiling on a serialized outbound envelope.
    #[serde(default = "default_max_envelope_kb")]
    pub max_envelope_kb: usize,
    /// Per-connection outbound queue depth.
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            max_envelope_kb: default_max_envelope_kb(),
            send_queue: default_send_queue(),
        }
    }
}

/// Session tunables (lives under `[session]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    /// Workspace every new connection starts in.
    #[serde(default = "default_workspace")]
    pub default_workspace: String,
    /// Age after which persisted session snapshots are reaped.
    #[serde(default = "default_snapshot_retention_hours")]
    pub snapshot_retention_hours: u64,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            default_workspace: default_workspace(),
            snapshot_retention_hours: default_snapshot_retention_hours(),
        }
    }
}

/// Auth tunables (lives under `[auth]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthFileConfig {
    /// Permission tokens granted to unauthenticated sessions
    /// (e.g. enabling anonymous contact-form submission).
    #[serde(default = "default_anonymous_permissions")]
    pub anonymous_permissions: Vec<String>,
}

impl Default for AuthFileConfig {
    fn default() -> Self {
        Self {
            anonymous_permissions: default_anonymous_permissions(),
        }
    }
}

fn default_max_envelope_kb() -> usize {
    1024
}
fn default_send_queue() -> usize {
    256
}
fn default_workspace() -> String {
    "production".to_string()
}
fn default_snapshot_retention_hours() -> u64 {
    168
}
fn default_anonymous_permissions() -> Vec<String> {
    vec!["contact_form".to_string()]
}

/// Build a figment that layers: defaults → config.toml → SHOAL_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `SHOAL_SERVER__PORT=8020`  →  `server.port = 8020`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("SHOAL_").split("__"))
}

/// Resolved runtime configuration.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub snapshot_dir: PathBuf,
    pub workspaces_dir: PathBuf,
    pub max_envelope_bytes: usize,
    pub send_queue: usize,
    pub default_workspace: String,
    pub anonymous_permissions: PermissionSet,
    pub snapshot_retention: Duration,
}

impl RuntimeConfig {
    /// Resolve the file config against a data directory.  CLI host/port
    /// override the file's values when provided.
    pub fn resolve(
        data_dir: PathBuf,
        fc: &FileConfig,
        cli_host: Option<String>,
        cli_port: Option<u16>,
    ) -> Self {
        Self {
            host: cli_host
                .or_else(|| fc.server.host.clone())
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: cli_port.or(fc.server.port).unwrap_or(8020),
            db_path: data_dir.join("shoal.db"),
            snapshot_dir: data_dir.join("sessions"),
            workspaces_dir: data_dir.join("workspaces"),
            max_envelope_bytes: fc.server.max_envelope_kb * 1024,
            send_queue: fc.server.send_queue,
            default_workspace: fc.session.default_workspace.clone(),
            anonymous_permissions: fc.auth.anonymous_permissions.iter().cloned().collect(),
            snapshot_retention: Duration::from_secs(fc.session.snapshot_retention_hours * 3600),
            data_dir,
        }
    }

    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_expectations() {
        let fc = FileConfig::default();
        assert_eq!(fc.session.default_workspace, "production");
        assert_eq!(fc.auth.anonymous_permissions, vec!["contact_form"]);
        assert_eq!(fc.server.max_envelope_kb, 1024);
    }

    #[test]
    fn resolve_applies_cli_overrides() {
        let fc = FileConfig::default();
        let rc = RuntimeConfig::resolve(
            PathBuf::from("/tmp/shoal"),
            &fc,
            Some("0.0.0.0".to_string()),
            Some(9000),
        );
        assert_eq!(rc.host, "0.0.0.0");
        assert_eq!(rc.port, 9000);
        assert_eq!(rc.snapshot_dir, PathBuf::from("/tmp/shoal/sessions"));
        assert_eq!(rc.max_envelope_bytes, 1024 * 1024);
        assert!(rc.anonymous_permissions.contains("contact_form"));
        assert_eq!(rc.snapshot_retention, Duration::from_secs(168 * 3600));
    }

    #[test]
    fn toml_layer_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[session]\ndefault_workspace = \"staging\"\n\n[server]\nport = 7777\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(dir.path()).extract().unwrap();
        assert_eq!(fc.session.default_workspace, "staging");
        assert_eq!(fc.server.port, Some(7777));
        // Untouched sections keep their defaults.
        assert_eq!(fc.auth.anonymous_permissions, vec!["contact_form"]);
    }
}
