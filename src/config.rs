// =============================================================================
// Cache Configuration -- TTLs and sweep cadence
// =============================================================================
//
// Loaded from JSON, then overridden from the environment. All fields carry
// `#[serde(default)]` so a partial (or empty) file still loads. Saving uses
// the tmp + rename pattern so a crash mid-write never leaves a torn file.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_ticker_ttl_ms() -> u64 {
    5 * 60 * 1000
}

fn default_candle_ttl_ms() -> u64 {
    60 * 60 * 1000
}

fn default_orderbook_ttl_ms() -> u64 {
    30 * 1000
}

fn default_cleanup_interval_ms() -> u64 {
    60 * 1000
}

pub const ENV_TICKER_TTL_MS: &str = "AURORA_CACHE_TICKER_TTL_MS";
pub const ENV_CANDLE_TTL_MS: &str = "AURORA_CACHE_CANDLE_TTL_MS";
pub const ENV_ORDERBOOK_TTL_MS: &str = "AURORA_CACHE_ORDERBOOK_TTL_MS";
pub const ENV_CLEANUP_INTERVAL_MS: &str = "AURORA_CACHE_CLEANUP_INTERVAL_MS";

// =============================================================================
// CacheConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a ticker stays readable after its last write.
    #[serde(default = "default_ticker_ttl_ms")]
    pub ticker_ttl_ms: u64,

    /// How long a candle stays readable after its last write.
    #[serde(default = "default_candle_ttl_ms")]
    pub candle_ttl_ms: u64,

    /// How long an order book stays readable after its last write.
    #[serde(default = "default_orderbook_ttl_ms")]
    pub orderbook_ttl_ms: u64,

    /// Period of the background sweep that reclaims expired entries.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ticker_ttl_ms: default_ticker_ttl_ms(),
            candle_ttl_ms: default_candle_ttl_ms(),
            orderbook_ttl_ms: default_orderbook_ttl_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
        }
    }
}

impl CacheConfig {
    pub fn ticker_ttl(&self) -> Duration {
        Duration::from_millis(self.ticker_ttl_ms)
    }

    pub fn candle_ttl(&self) -> Duration {
        Duration::from_millis(self.candle_ttl_ms)
    }

    pub fn orderbook_ttl(&self) -> Duration {
        Duration::from_millis(self.orderbook_ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cache config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse cache config from {}", path.display()))?;

        info!(
            path = %path.display(),
            ticker_ttl_ms = config.ticker_ttl_ms,
            candle_ttl_ms = config.candle_ttl_ms,
            orderbook_ttl_ms = config.orderbook_ttl_ms,
            "cache config loaded"
        );

        Ok(config)
    }

    /// Persist to `path` atomically (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise cache config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "cache config saved (atomic)");
        Ok(())
    }

    /// Apply `AURORA_CACHE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any name -> value source. Values that do not
    /// parse as milliseconds are logged and skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut u64); 4] = [
            (ENV_TICKER_TTL_MS, &mut self.ticker_ttl_ms),
            (ENV_CANDLE_TTL_MS, &mut self.candle_ttl_ms),
            (ENV_ORDERBOOK_TTL_MS, &mut self.orderbook_ttl_ms),
            (ENV_CLEANUP_INTERVAL_MS, &mut self.cleanup_interval_ms),
        ];

        for (name, slot) in fields {
            let Some(raw) = lookup(name) else {
                continue;
            };
            match raw.trim().parse::<u64>() {
                Ok(ms) => {
                    info!(var = name, value_ms = ms, "cache config override");
                    *slot = ms;
                }
                Err(e) => {
                    warn!(var = name, value = %raw, error = %e, "ignoring unparseable cache override");
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.ticker_ttl(), Duration::from_secs(300));
        assert_eq!(cfg.candle_ttl(), Duration::from_secs(3600));
        assert_eq!(cfg.orderbook_ttl(), Duration::from_secs(30));
        assert_eq!(cfg.cleanup_interval(), Duration::from_secs(60));
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, CacheConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "orderbook_ttl_ms": 5000 }"#;
        let cfg: CacheConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.orderbook_ttl(), Duration::from_secs(5));
        assert_eq!(cfg.ticker_ttl_ms, 300_000);
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("aurora-cache-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cache_config.json");

        let cfg = CacheConfig {
            ticker_ttl_ms: 1_000,
            ..CacheConfig::default()
        };
        cfg.save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = CacheConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let err = CacheConfig::load("/definitely/not/here/cache_config.json").unwrap_err();
        assert!(err.to_string().contains("failed to read cache config"));
    }

    #[test]
    fn overrides_apply_and_bad_values_are_skipped() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_TICKER_TTL_MS, "50"),
            (ENV_CANDLE_TTL_MS, "not-a-number"),
            (ENV_CLEANUP_INTERVAL_MS, " 250 "),
        ]);
        let mut cfg = CacheConfig::default();
        cfg.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(cfg.ticker_ttl_ms, 50);
        assert_eq!(cfg.candle_ttl_ms, 3_600_000);
        assert_eq!(cfg.orderbook_ttl_ms, 30_000);
        assert_eq!(cfg.cleanup_interval_ms, 250);
    }
}
