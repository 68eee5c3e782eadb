//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default number of reconcile passes allowed to run at the same time
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: usize = 10;

/// Default interval between successful reconcile passes (seconds)
pub const DEFAULT_REQUEUE_INTERVAL_SECS: u64 = 300;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Default retry interval while the flood gate holds an object (seconds)
pub const DEFAULT_FLOOD_GATE_PROBE_INTERVAL_SECS: u64 = 15;

/// Default lifetime of a cached store validation result (seconds)
pub const DEFAULT_HEALTH_TTL_SECS: u64 = 120;

/// Default interval between store validation probes (seconds)
/// Must stay below the health TTL or healthy stores decay to Unknown
pub const DEFAULT_STORE_VALIDATION_INTERVAL_SECS: u64 = 60;

/// Default deadline for a single reconcile pass (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 30;

/// Maximum number of secret fetches a single find query runs concurrently
pub const FIND_FETCH_CONCURRENCY: usize = 8;

/// Default Sakura Cloud zone
pub const DEFAULT_SAKURA_ZONE: &str = "is1a";

/// Default Sakura Cloud API base URL template (`{zone}` is substituted)
pub const SAKURA_API_BASE_TEMPLATE: &str =
    "https://secure.sakura.ad.jp/cloud/zone/{zone}/api/cloud/1.1";

/// Default HTTP timeout for backend REST calls (seconds)
pub const DEFAULT_BACKEND_HTTP_TIMEOUT_SECS: u64 = 10;

/// Namespace used to resolve credentials of cluster stores during validation
/// when the store names none
pub const VALIDATION_FALLBACK_NAMESPACE: &str = "default";

/// Maximum number of stores validated concurrently
pub const VALIDATION_CONCURRENCY: usize = 8;

/// Deadline of a single store validation (seconds)
pub const VALIDATION_TIMEOUT_SECS: u64 = 10;

/// Deadline for releasing a backend client (seconds)
pub const CLIENT_CLOSE_TIMEOUT_SECS: u64 = 5;
