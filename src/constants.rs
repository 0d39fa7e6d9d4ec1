//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default tracker lease and periodic resync interval (seconds)
///
/// Each successful pass requeues after this interval, which refreshes every
/// lease the parent holds before it can expire.
pub const DEFAULT_SYNC_PERIOD_SECS: u64 = 10 * 60 * 60;

/// Default minimum error backoff (minutes)
pub const DEFAULT_ERROR_BACKOFF_MIN_MINUTES: u64 = 1;

/// Default maximum error backoff (minutes)
pub const DEFAULT_ERROR_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default exponential backoff starting value for watch stream errors (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value for watch stream errors (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// How long a cached read waits for its informer's initial list (seconds)
pub const CACHE_SYNC_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of concurrent reconciliations per controller
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Namespace holding cluster-wide riff settings
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "riff-system";

/// ConfigMap in the system namespace holding core settings
pub const SETTINGS_CONFIG_MAP_NAME: &str = "riff-core-settings";

/// Settings key for the ingress domain
pub const DEFAULT_DOMAIN_KEY: &str = "defaultDomain";

/// Ingress domain used when the settings do not name one
pub const DEFAULT_DOMAIN: &str = "example.com";

/// Label linking generated children back to their Deployer
pub const DEPLOYER_LABEL_KEY: &str = "core.projectriff.io/deployer";

/// Field manager and event reporter name
pub const CONTROLLER_NAME: &str = "riff-system-controller";

/// Default listen port for the topic provisioner
pub const DEFAULT_PROVISIONER_PORT: u16 = 8080;

/// Default partition count for provisioned topics
pub const DEFAULT_TOPIC_PARTITIONS: i32 = 1;
