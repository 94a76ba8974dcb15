use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::intent::RelationPolicy;

/// Engine connection parameters (optional `[engine]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed delay before the next connection attempt after a non-deliberate disconnect.
    pub reconnect_delay_secs: u64,
    /// Upper bound on the WebSocket handshake with the engine.
    pub connect_timeout_secs: u64,
    /// How long to wait for the engine to answer a quality extraction request.
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: 5,
            connect_timeout_secs: 5,
            request_timeout_secs: 60,
        }
    }
}

/// Retry parameters for quality extraction (optional `[quality]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Maximum number of requests per extraction (including the first).
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// HEAD probe used to resolve interstitial URLs (optional `[probe]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Probe pending URLs instead of waiting for a browser-side final-URL event.
    pub enabled: bool,
    /// Total timeout for one probe; on expiry the observed URL is treated as final.
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: 10,
        }
    }
}

/// Global configuration loaded from `~/.config/dlc/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DlcConfig {
    /// Address the extension-facing WebSocket listener binds to.
    pub listen_addr: String,
    /// WebSocket URL of the download engine.
    pub engine_url: String,
    /// Pending/resolved intents older than this are evicted.
    pub intent_ttl_secs: u64,
    /// How often the eviction sweep runs.
    pub eviction_interval_secs: u64,
    /// Native download events for a URL dispatched within this window are dropped as duplicates.
    pub duplicate_window_secs: u64,
    /// Dispatched intents are kept this long for duplicate detection, then pruned.
    pub completed_retention_secs: u64,
    /// How a final download URL is matched back to a pending intent.
    pub relation: RelationPolicy,
    pub engine: Option<EngineConfig>,
    pub quality: Option<QualityConfig>,
    pub probe: Option<ProbeConfig>,
}

impl Default for DlcConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8765".to_string(),
            engine_url: "ws://127.0.0.1:8766".to_string(),
            intent_ttl_secs: 300,
            eviction_interval_secs: 30,
            duplicate_window_secs: 10,
            completed_retention_secs: 3600,
            relation: RelationPolicy::default(),
            engine: None,
            quality: None,
            probe: None,
        }
    }
}

impl DlcConfig {
    pub fn intent_ttl(&self) -> Duration {
        Duration::from_secs(self.intent_ttl_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs.max(1))
    }

    pub fn duplicate_window(&self) -> Duration {
        Duration::from_secs(self.duplicate_window_secs)
    }

    pub fn completed_retention(&self) -> Duration {
        Duration::from_secs(self.completed_retention_secs)
    }

    /// Engine settings with built-in defaults filled in.
    pub fn engine(&self) -> EngineConfig {
        self.engine.clone().unwrap_or_default()
    }

    pub fn quality(&self) -> QualityConfig {
        self.quality.clone().unwrap_or_default()
    }

    pub fn probe(&self) -> ProbeConfig {
        self.probe.clone().unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlc")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DlcConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DlcConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: DlcConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = DlcConfig::default();
        assert_eq!(cfg.listen_addr, "127.0.0.1:8765");
        assert_eq!(cfg.intent_ttl_secs, 300);
        assert_eq!(cfg.relation, RelationPolicy::HostOrSubstring);
        assert_eq!(cfg.engine().reconnect_delay_secs, 5);
        assert_eq!(cfg.quality().max_attempts, 3);
        assert_eq!(cfg.quality().retry_delay_ms, 1000);
        assert!(!cfg.probe().enabled);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = DlcConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: DlcConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.listen_addr, cfg.listen_addr);
        assert_eq!(parsed.engine_url, cfg.engine_url);
        assert_eq!(parsed.intent_ttl_secs, cfg.intent_ttl_secs);
        assert_eq!(parsed.relation, cfg.relation);
    }

    #[test]
    fn config_toml_partial_file_uses_defaults() {
        let toml = r#"
            engine_url = "ws://127.0.0.1:9000"
            intent_ttl_secs = 60
        "#;
        let cfg: DlcConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.engine_url, "ws://127.0.0.1:9000");
        assert_eq!(cfg.intent_ttl(), Duration::from_secs(60));
        assert_eq!(cfg.listen_addr, "127.0.0.1:8765");
        assert!(cfg.engine.is_none());
    }

    #[test]
    fn config_toml_sections_and_relation() {
        let toml = r#"
            relation = "host_only"

            [engine]
            reconnect_delay_secs = 2
            connect_timeout_secs = 3
            request_timeout_secs = 30

            [quality]
            max_attempts = 5
            retry_delay_ms = 250

            [probe]
            enabled = true
            timeout_secs = 4
        "#;
        let cfg: DlcConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.relation, RelationPolicy::HostOnly);
        assert_eq!(cfg.engine().reconnect_delay_secs, 2);
        assert_eq!(cfg.quality().max_attempts, 5);
        assert!(cfg.probe().enabled);
        assert_eq!(cfg.probe().timeout_secs, 4);
    }

    #[test]
    fn eviction_interval_never_zero() {
        let cfg = DlcConfig {
            eviction_interval_secs: 0,
            ..DlcConfig::default()
        };
        assert_eq!(cfg.eviction_interval(), Duration::from_secs(1));
    }
}
