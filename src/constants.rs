//! Constants
//!
//! Centralized constants for buffers, retry policy, and remote data layout.

/// Number of most recent samples shown in the chart window
pub const CHART_WINDOW: usize = 20;

/// Number of saved profiles shown in the preview list
pub const SAVED_PROFILES_PREVIEW: usize = 3;

/// Bounded cache capacities
pub const NOTIFICATION_LOG_CAPACITY: usize = 500;

/// Retry configuration
pub const RETRY_INITIAL_DELAY_MS: u64 = 1000;
pub const RETRY_MAX_DELAY_MS: u64 = 60000;
pub const RETRY_MULTIPLIER: f64 = 2.0;
pub const RETRY_JITTER: f64 = 0.1;

/// How long a line-JSON bridge may take to send its `connect` frame
pub const LINK_HANDSHAKE_TIMEOUT_MS: u64 = 5000;

/// Cloud store polling
pub const CLOUD_PROBE_INTERVAL_MS: u64 = 5000;
pub const CLOUD_POLL_INTERVAL_MS: u64 = 2000;
pub const CLOUD_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Remote data layout
pub const PATH_LATEST: &str = "plcData/latest";
pub const PATH_HISTORY: &str = "plcData/history";
pub const PATH_CONFIGS: &str = "plcConfigs";

/// Prefix for generated profile ids
pub const PROFILE_ID_PREFIX: &str = "config_";

/// Default endpoints
pub const DEFAULT_BRIDGE_ENDPOINT: &str = "http://localhost:5000";
pub const DEFAULT_CLOUD_URL: &str = "https://plcwebapp-default-rtdb.firebaseio.com";
