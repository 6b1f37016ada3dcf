//! Constants for the market dashboard loader
//!
//! Compile-time defaults for every tunable of the loader. `LoaderConfig`
//! copies these at construction; only the API base URL can be overridden
//! from the environment.

use std::time::Duration;

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Environment variable that overrides the API base URL
pub const API_URL_ENV_VAR: &str = "COINGECKO_API_URL";

/// Length of one backoff "unit"; all delays below are expressed in units
pub const DELAY_UNIT: Duration = Duration::from_secs(1);

/// Unconditional wait before every request leaves the queue (in units)
pub const REQUEST_DELAY_UNITS: u32 = 1;

/// Maximum attempts per request, counted separately for throttling and failures
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Linear backoff step after a generic failure (in units)
pub const FAILURE_BACKOFF_UNITS: u32 = 10;

/// Escalating backoff step after an HTTP 429 (in units)
pub const THROTTLE_BACKOFF_UNITS: u32 = 20;

/// Ceiling for the throttle backoff (in units)
pub const MAX_THROTTLE_BACKOFF_UNITS: u32 = 120;

/// HTTP request timeout (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Pause between the last pipeline step and the `Complete` state
pub const FINALIZE_DELAY: Duration = Duration::from_millis(300);

/// Number of coins loaded for the top list
pub const TOP_CRYPTOS_COUNT: u32 = 100;

/// Number of coins loaded for the full market universe
pub const ALL_CRYPTOS_COUNT: u32 = 250;

/// Upper bound on ids accepted by a single markets-by-ids query
pub const MAX_IDS_PER_QUERY: usize = 10;

/// Capacity of the loader event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Label shown before the first pipeline run starts
pub const STEP_INITIALIZING: &str = "Initializing...";

/// Label shown while the run settles after its last step
pub const STEP_FINALIZING: &str = "Finalizing...";

/// Label of a successfully completed run
pub const STEP_COMPLETE: &str = "Complete";

/// Label of a failed run
pub const STEP_ERROR: &str = "Error";

/// User agent for HTTP requests
pub const USER_AGENT: &str = "market-dashboard-sdk/0.1.0";
