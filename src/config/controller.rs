//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

use crate::controller::scheduler::SchedulerConfig;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Maximum concurrent reconciliations
    /// Limits how many objects can be syncing simultaneously
    pub max_concurrent_reconciliations: usize,
    /// Interval between successful passes (seconds)
    /// Objects may override it with their own refresh interval
    pub requeue_interval_secs: u64,
    /// Exponential backoff starting value (milliseconds)
    /// Initial delay before retrying after an error
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value (milliseconds)
    /// Maximum delay between retries
    pub backoff_max_ms: u64,
    /// Retry interval while the flood gate holds an object (seconds)
    pub flood_gate_probe_interval_secs: u64,
    /// Lifetime of a cached store validation result (seconds)
    pub health_ttl_secs: u64,
    /// Interval between store validation probes (seconds)
    pub store_validation_interval_secs: u64,
    /// Deadline for a single reconcile pass (seconds)
    pub reconcile_timeout_secs: u64,
    /// Hold back passes against stores not known to be healthy
    pub enable_flood_gate: bool,
    /// HTTP timeout for backend REST calls (seconds)
    pub backend_http_timeout_secs: u64,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            requeue_interval_secs: DEFAULT_REQUEUE_INTERVAL_SECS,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            flood_gate_probe_interval_secs: DEFAULT_FLOOD_GATE_PROBE_INTERVAL_SECS,
            health_ttl_secs: DEFAULT_HEALTH_TTL_SECS,
            store_validation_interval_secs: DEFAULT_STORE_VALIDATION_INTERVAL_SECS,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            enable_flood_gate: true,
            backend_http_timeout_secs: DEFAULT_BACKEND_HTTP_TIMEOUT_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_reconciliations: var_or_default(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            requeue_interval_secs: var_or_default(
                &lookup,
                "REQUEUE_INTERVAL_SECS",
                defaults.requeue_interval_secs,
            ),
            backoff_start_ms: var_or_default(&lookup, "BACKOFF_START_MS", defaults.backoff_start_ms),
            backoff_max_ms: var_or_default(&lookup, "BACKOFF_MAX_MS", defaults.backoff_max_ms),
            flood_gate_probe_interval_secs: var_or_default(
                &lookup,
                "FLOOD_GATE_PROBE_INTERVAL_SECS",
                defaults.flood_gate_probe_interval_secs,
            ),
            health_ttl_secs: var_or_default(&lookup, "HEALTH_TTL_SECS", defaults.health_ttl_secs),
            store_validation_interval_secs: var_or_default(
                &lookup,
                "STORE_VALIDATION_INTERVAL_SECS",
                defaults.store_validation_interval_secs,
            ),
            reconcile_timeout_secs: var_or_default(
                &lookup,
                "RECONCILE_TIMEOUT_SECS",
                defaults.reconcile_timeout_secs,
            ),
            enable_flood_gate: var_or_default_bool(
                &lookup,
                "ENABLE_FLOOD_GATE",
                defaults.enable_flood_gate,
            ),
            backend_http_timeout_secs: var_or_default(
                &lookup,
                "BACKEND_HTTP_TIMEOUT_SECS",
                defaults.backend_http_timeout_secs,
            ),
            metrics_port: var_or_default(&lookup, "METRICS_PORT", defaults.metrics_port),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    /// Settings that will not work as intended
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.max_concurrent_reconciliations == 0 {
            warnings.push(
                "MAX_CONCURRENT_RECONCILIATIONS is 0; raised to 1 so objects can sync".to_string(),
            );
        }
        if self.enable_flood_gate && self.store_validation_interval_secs >= self.health_ttl_secs {
            warnings.push(format!(
                "STORE_VALIDATION_INTERVAL_SECS ({}) is not below HEALTH_TTL_SECS ({}); healthy stores will expire between probes",
                self.store_validation_interval_secs, self.health_ttl_secs
            ));
        }
        if self.backoff_start_ms > self.backoff_max_ms {
            warnings.push(format!(
                "BACKOFF_START_MS ({}) exceeds BACKOFF_MAX_MS ({})",
                self.backoff_start_ms, self.backoff_max_ms
            ));
        }
        warnings
    }

    /// Get backoff start duration
    #[must_use]
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff max duration
    #[must_use]
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    #[must_use]
    pub fn health_ttl(&self) -> Duration {
        Duration::from_secs(self.health_ttl_secs)
    }

    #[must_use]
    pub fn store_validation_interval(&self) -> Duration {
        Duration::from_secs(self.store_validation_interval_secs)
    }

    #[must_use]
    pub fn backend_http_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_http_timeout_secs)
    }

    /// Scheduler settings derived from this configuration
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent: self.max_concurrent_reconciliations.max(1),
            requeue_interval: Duration::from_secs(self.requeue_interval_secs),
            backoff_start: self.backoff_start_duration(),
            backoff_max: self.backoff_max_duration(),
            probe_interval: Duration::from_secs(self.flood_gate_probe_interval_secs),
            pass_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            flood_gate: self.enable_flood_gate,
        }
    }
}

/// Read a variable or return the default when absent or unparsable
fn var_or_default<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a variable as boolean or return default
fn var_or_default_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}
