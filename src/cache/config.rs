//! Cache tuning: expirations, Fast layer bounds, warmup behaviour

use crate::cache::types::CacheLayer;
use crate::error::{CacheError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "STOCKROOM_CACHE_";

const MIN_JITTERED_TTL: Duration = Duration::from_secs(1);

/// Configuration for the multi-layer cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Expiration used when a caller supplies none
    pub default_ttl: Duration,

    /// Fixed short expiration for values mirrored or promoted into the Fast layer
    pub promotion_ttl: Duration,

    /// Maximum number of entries in the Fast layer
    pub max_entries: usize,

    /// Maximum total size of Fast layer data in bytes
    pub max_size_bytes: usize,

    /// TTL jitter factor (0.0 - 1.0) applied to every write's expiration
    pub ttl_jitter: f64,

    /// Enable the background expiry sweeper
    pub enable_auto_cleanup: bool,

    /// Interval between expiry sweeps
    pub cleanup_interval: Duration,

    /// Layer used by `set_with_tags` and `get_or_set` when no advisor is attached
    pub default_layer: CacheLayer,

    /// Run a full warmup when the server starts
    pub warmup_on_startup: bool,

    /// Upper bound on a single warmup category
    pub warmup_category_timeout: Duration,

    /// Enable per-key statistics collection
    pub enable_metrics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            promotion_ttl: Duration::from_secs(300),
            max_entries: 10_000,
            // 100 MB default
            max_size_bytes: 100 * 1024 * 1024,
            ttl_jitter: 0.0,
            enable_auto_cleanup: true,
            cleanup_interval: Duration::from_secs(300),
            default_layer: CacheLayer::Shared,
            warmup_on_startup: true,
            warmup_category_timeout: Duration::from_secs(30),
            enable_metrics: true,
        }
    }
}

impl CacheConfig {
    /// Start from defaults and override selectively
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Load configuration from the environment (and a `.env` file if present)
    ///
    /// Unset variables keep their defaults. Recognised variables, each
    /// prefixed with `STOCKROOM_CACHE_`: `DEFAULT_TTL_SECS`,
    /// `PROMOTION_TTL_SECS`, `MAX_ENTRIES`, `MAX_SIZE_BYTES`, `TTL_JITTER`,
    /// `CLEANUP_INTERVAL_SECS`, `WARMUP_ON_STARTUP`, `WARMUP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));
        let mut builder = Self::builder();

        if let Some(v) = get("DEFAULT_TTL_SECS") {
            builder = builder.default_ttl(Duration::from_secs(parse_var("DEFAULT_TTL_SECS", &v)?));
        }
        if let Some(v) = get("PROMOTION_TTL_SECS") {
            builder = builder.promotion_ttl(Duration::from_secs(parse_var("PROMOTION_TTL_SECS", &v)?));
        }
        if let Some(v) = get("MAX_ENTRIES") {
            builder = builder.max_entries(parse_var("MAX_ENTRIES", &v)?);
        }
        if let Some(v) = get("MAX_SIZE_BYTES") {
            builder = builder.max_size_bytes(parse_var("MAX_SIZE_BYTES", &v)?);
        }
        if let Some(v) = get("TTL_JITTER") {
            builder = builder.ttl_jitter(parse_var("TTL_JITTER", &v)?);
        }
        if let Some(v) = get("CLEANUP_INTERVAL_SECS") {
            builder = builder.cleanup_interval(Duration::from_secs(parse_var("CLEANUP_INTERVAL_SECS", &v)?));
        }
        if let Some(v) = get("WARMUP_ON_STARTUP") {
            builder = builder.warmup_on_startup(parse_var("WARMUP_ON_STARTUP", &v)?);
        }
        if let Some(v) = get("WARMUP_TIMEOUT_SECS") {
            builder = builder
                .warmup_category_timeout(Duration::from_secs(parse_var("WARMUP_TIMEOUT_SECS", &v)?));
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the layers cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::Config("max_entries must be greater than 0".to_string()));
        }

        if self.max_size_bytes == 0 {
            return Err(CacheError::Config("max_size_bytes must be greater than 0".to_string()));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::Config("ttl_jitter must be between 0.0 and 1.0".to_string()));
        }

        if self.promotion_ttl.is_zero() || self.default_ttl.is_zero() {
            return Err(CacheError::Config("expirations must be non-zero".to_string()));
        }

        if self.cleanup_interval.is_zero() {
            return Err(CacheError::Config("cleanup_interval must be non-zero".to_string()));
        }

        if self.warmup_category_timeout.is_zero() {
            return Err(CacheError::Config("warmup_category_timeout must be non-zero".to_string()));
        }

        Ok(())
    }

    /// Apply the configured jitter to an expiration
    ///
    /// The result is uniform in `[ttl * (1 - jitter), ttl * (1 + jitter)]`,
    /// saturating at `Duration::MAX`. It never drops below `min(ttl, 1s)`, so
    /// sub-second expirations are left as short as requested.
    pub fn ttl_with_jitter(&self, ttl: Duration) -> Duration {
        if self.ttl_jitter == 0.0 {
            return ttl;
        }

        let spread = rand::thread_rng().gen_range(-self.ttl_jitter..=self.ttl_jitter);
        let jittered = Duration::try_from_secs_f64(ttl.as_secs_f64() * (1.0 + spread))
            .unwrap_or(Duration::MAX);

        jittered.max(ttl.min(MIN_JITTERED_TTL))
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CacheError::Config(format!("{}{} has invalid value '{}'", ENV_PREFIX, name, value)))
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    default_ttl: Option<Duration>,
    promotion_ttl: Option<Duration>,
    max_entries: Option<usize>,
    max_size_bytes: Option<usize>,
    ttl_jitter: Option<f64>,
    enable_auto_cleanup: Option<bool>,
    cleanup_interval: Option<Duration>,
    default_layer: Option<CacheLayer>,
    warmup_on_startup: Option<bool>,
    warmup_category_timeout: Option<Duration>,
    enable_metrics: Option<bool>,
}

impl CacheConfigBuilder {
    /// Expiration for writes that pass no TTL
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Cap on Fast layer copies of Shared/Persistent values
    pub fn promotion_ttl(mut self, ttl: Duration) -> Self {
        self.promotion_ttl = Some(ttl);
        self
    }

    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn max_size_bytes(mut self, size: usize) -> Self {
        self.max_size_bytes = Some(size);
        self
    }

    /// Fraction of each write's expiration to randomise
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    pub fn enable_auto_cleanup(mut self, enable: bool) -> Self {
        self.enable_auto_cleanup = Some(enable);
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    pub fn default_layer(mut self, layer: CacheLayer) -> Self {
        self.default_layer = Some(layer);
        self
    }

    pub fn warmup_on_startup(mut self, enable: bool) -> Self {
        self.warmup_on_startup = Some(enable);
        self
    }

    pub fn warmup_category_timeout(mut self, timeout: Duration) -> Self {
        self.warmup_category_timeout = Some(timeout);
        self
    }

    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    pub fn build(self) -> CacheConfig {
        let base = CacheConfig::default();
        CacheConfig {
            default_ttl: self.default_ttl.unwrap_or(base.default_ttl),
            promotion_ttl: self.promotion_ttl.unwrap_or(base.promotion_ttl),
            max_entries: self.max_entries.unwrap_or(base.max_entries),
            max_size_bytes: self.max_size_bytes.unwrap_or(base.max_size_bytes),
            ttl_jitter: self.ttl_jitter.unwrap_or(base.ttl_jitter),
            enable_auto_cleanup: self
                .enable_auto_cleanup
                .unwrap_or(base.enable_auto_cleanup),
            cleanup_interval: self.cleanup_interval.unwrap_or(base.cleanup_interval),
            default_layer: self.default_layer.unwrap_or(base.default_layer),
            warmup_on_startup: self.warmup_on_startup.unwrap_or(base.warmup_on_startup),
            warmup_category_timeout: self
                .warmup_category_timeout
                .unwrap_or(base.warmup_category_timeout),
            enable_metrics: self.enable_metrics.unwrap_or(base.enable_metrics),
        }
    }
}

/// Preset configurations for common deployments
impl CacheConfig {
    /// Single store terminal or other small host
    pub fn small() -> Self {
        Self {
            default_ttl: Duration::from_secs(30 * 60),
            max_entries: 1_000,
            max_size_bytes: 10 << 20,
            ..Default::default()
        }
    }

    /// Configuration for large catalogs
    pub fn large() -> Self {
        Self {
            default_ttl: Duration::from_secs(2 * 3600),
            max_entries: 500_000,
            max_size_bytes: 2 << 30,
            ttl_jitter: 0.10,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl.as_secs(), 3600);
        assert_eq!(config.promotion_ttl, Duration::from_secs(300));
        assert_eq!(config.default_layer, CacheLayer::Shared);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let no_room = CacheConfig { max_entries: 0, ..Default::default() };
        let wild_jitter = CacheConfig { ttl_jitter: 1.5, ..Default::default() };
        let instant_expiry = CacheConfig { promotion_ttl: Duration::ZERO, ..Default::default() };
        let busy_sweeper = CacheConfig { cleanup_interval: Duration::ZERO, ..Default::default() };

        for config in [no_room, wild_jitter, instant_expiry, busy_sweeper] {
            assert!(matches!(config.validate(), Err(CacheError::Config(_))));
        }
    }

    #[test]
    fn builder_overrides_only_what_is_set() {
        let config = CacheConfig::builder()
            .default_ttl(Duration::from_secs(10 * 60))
            .max_entries(2_500)
            .default_layer(CacheLayer::Fast)
            .build();

        assert_eq!(config.default_ttl.as_secs(), 600);
        assert_eq!(config.max_entries, 2_500);
        assert_eq!(config.default_layer, CacheLayer::Fast);
        assert_eq!(config.max_size_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn jitter_stays_within_band() {
        let config = CacheConfig { ttl_jitter: 0.2, ..Default::default() };

        for _ in 0..50 {
            let secs = config.ttl_with_jitter(Duration::from_secs(1000)).as_secs_f64();
            assert!((800.0..=1200.0).contains(&secs), "{} outside band", secs);
        }

        let exact = CacheConfig::default().ttl_with_jitter(Duration::from_secs(60));
        assert_eq!(exact, Duration::from_secs(60));
    }

    #[test]
    fn jitter_keeps_short_and_huge_expirations_sane() {
        let config = CacheConfig { ttl_jitter: 1.0, ..Default::default() };

        for _ in 0..50 {
            let short = config.ttl_with_jitter(Duration::from_millis(200));
            assert!(short >= Duration::from_millis(200) && short <= Duration::from_millis(401));

            let long = config.ttl_with_jitter(Duration::from_secs(3600));
            assert!(long >= Duration::from_secs(1));
        }
        // Saturates rather than overflowing
        assert!(config.ttl_with_jitter(Duration::MAX) >= Duration::from_secs(1));
    }

    #[test]
    fn zero_cleanup_interval_from_env_is_rejected() {
        let result = CacheConfig::from_lookup(|name| {
            (name == "STOCKROOM_CACHE_CLEANUP_INTERVAL_SECS").then(|| "0".to_string())
        });
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<String, String> = [
            ("STOCKROOM_CACHE_DEFAULT_TTL_SECS", "120"),
            ("STOCKROOM_CACHE_MAX_ENTRIES", "42"),
            ("STOCKROOM_CACHE_WARMUP_ON_STARTUP", "false"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = CacheConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();
        assert_eq!(config.default_ttl, Duration::from_secs(120));
        assert_eq!(config.max_entries, 42);
        assert!(!config.warmup_on_startup);
        assert_eq!(config.promotion_ttl, Duration::from_secs(300));
    }

    #[test]
    fn lookup_rejects_malformed_numbers() {
        let result = CacheConfig::from_lookup(|name| {
            (name == "STOCKROOM_CACHE_MAX_ENTRIES").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn presets() {
        assert_eq!(CacheConfig::small().max_entries, 1_000);
        assert_eq!(CacheConfig::large().default_ttl, Duration::from_secs(7200));
        assert!(CacheConfig::large().validate().is_ok());
    }
}
