//! Configuration resolution
//!
//! Four layers, later overriding earlier: built-in defaults →
//! `<data-dir>/config.json` → `CONTEXT_VAULT_*` environment variables → CLI
//! flags (applied by the CLI layer via [`Config::override_with`]).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Deployment mode; affects the first-tool-call reindex policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Local,
    Hosted,
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Mode::Local),
            "hosted" => Ok(Mode::Hosted),
            other => Err(format!("unknown mode '{other}' (expected local or hosted)")),
        }
    }
}

/// One warn/critical threshold pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub warn: u64,
    pub critical: u64,
}

/// Growth thresholds checked by status reporting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    pub total_entries: Limit,
    pub event_entries: Limit,
    pub vault_size_bytes: Limit,
    pub events_without_ttl: Limit,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            total_entries: Limit { warn: 20_000, critical: 50_000 },
            event_entries: Limit { warn: 10_000, critical: 25_000 },
            vault_size_bytes: Limit {
                warn: 256 * 1024 * 1024,
                critical: 1024 * 1024 * 1024,
            },
            events_without_ttl: Limit { warn: 5_000, critical: 15_000 },
        }
    }
}

/// Recognized configuration, all fields optional so layers can merge.
///
/// ```json
/// {
///   "vaultDir": "/home/me/context-vault",
///   "dbPath": "/home/me/.local/share/context-vault/index.db",
///   "mode": "local",
///   "telemetry": false,
///   "thresholds": { "totalEntries": { "warn": 20000, "critical": 50000 } }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub vault_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub mode: Option<Mode>,
    pub telemetry: Option<bool>,
    pub thresholds: Option<Thresholds>,
}

impl Config {
    /// Load config for a data dir: file layer, then environment layer.
    pub fn load(data_dir: &Path) -> Self {
        let file_config = Self::load_file(&data_dir.join("config.json")).unwrap_or_default();
        let merged = file_config.override_with(Self::from_env());
        tracing::debug!(
            vault_dir = ?merged.vault_dir,
            db_path = ?merged.db_path,
            mode = ?merged.mode,
            "Effective config after merge"
        );
        merged
    }

    fn load_file(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Failed to parse config {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Environment layer (`CONTEXT_VAULT_*`).
    pub fn from_env() -> Self {
        let path_var = |name: &str| std::env::var_os(name).map(PathBuf::from);
        Config {
            vault_dir: path_var("CONTEXT_VAULT_DIR"),
            db_path: path_var("CONTEXT_VAULT_DB_PATH"),
            data_dir: path_var("CONTEXT_VAULT_DATA_DIR"),
            mode: std::env::var("CONTEXT_VAULT_MODE")
                .ok()
                .and_then(|m| m.parse().ok()),
            telemetry: std::env::var("CONTEXT_VAULT_TELEMETRY")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true")),
            thresholds: None,
        }
    }

    /// Layer another config on top (other wins where present).
    pub fn override_with(self, other: Self) -> Self {
        Config {
            vault_dir: other.vault_dir.or(self.vault_dir),
            db_path: other.db_path.or(self.db_path),
            data_dir: other.data_dir.or(self.data_dir),
            mode: other.mode.or(self.mode),
            telemetry: other.telemetry.or(self.telemetry),
            thresholds: other.thresholds.or(self.thresholds),
        }
    }

    // ===== Accessors with defaults =====

    /// State directory holding config, logs, and the index by default.
    pub fn data_dir_or_default(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("context-vault")
        })
    }

    pub fn vault_dir_or_default(&self) -> PathBuf {
        self.vault_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("context-vault")
        })
    }

    pub fn db_path_or_default(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir_or_default().join("index.db"))
    }

    pub fn mode_or_default(&self) -> Mode {
        self.mode.unwrap_or_default()
    }

    pub fn thresholds_or_default(&self) -> Thresholds {
        self.thresholds.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_valid_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"vaultDir": "/v", "mode": "hosted", "telemetry": true}"#,
        )
        .unwrap();

        let config = Config::load_file(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.vault_dir, Some(PathBuf::from("/v")));
        assert_eq!(config.mode, Some(Mode::Hosted));
        assert_eq!(config.telemetry, Some(true));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load_file(&dir.path().join("config.json")).is_none());
    }

    #[test]
    fn test_load_malformed_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), "{not json").unwrap();
        assert!(Config::load_file(&dir.path().join("config.json")).is_none());
    }

    #[test]
    fn test_override_order() {
        let base = Config {
            vault_dir: Some("/base".into()),
            mode: Some(Mode::Local),
            ..Default::default()
        };
        let layer = Config {
            vault_dir: Some("/layer".into()),
            telemetry: Some(false),
            ..Default::default()
        };
        let merged = base.override_with(layer);
        assert_eq!(merged.vault_dir, Some(PathBuf::from("/layer")));
        assert_eq!(merged.mode, Some(Mode::Local));
        assert_eq!(merged.telemetry, Some(false));
    }

    #[test]
    fn test_thresholds_parse_partial() {
        let config: Config = serde_json::from_str(
            r#"{"thresholds": {"totalEntries": {"warn": 5, "critical": 10}}}"#,
        )
        .unwrap();
        let t = config.thresholds_or_default();
        assert_eq!(t.total_entries, Limit { warn: 5, critical: 10 });
        // Unspecified groups fall back to defaults
        assert_eq!(t.event_entries, Thresholds::default().event_entries);
    }

    #[test]
    fn test_default_paths() {
        let config = Config::default();
        assert!(config.db_path_or_default().ends_with("index.db"));
        assert!(config
            .db_path_or_default()
            .starts_with(config.data_dir_or_default()));
        assert_eq!(config.mode_or_default(), Mode::Local);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("local".parse::<Mode>().unwrap(), Mode::Local);
        assert_eq!("hosted".parse::<Mode>().unwrap(), Mode::Hosted);
        assert!("cloud".parse::<Mode>().is_err());
    }
}
