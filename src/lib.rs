//! # Market Dashboard SDK
//!
//! Loads everything a cryptocurrency market dashboard renders from the
//! CoinGecko REST API, without tripping its rate limit.
//!
//! Two pieces do the work:
//!
//! - [`queue::RequestQueue`] serializes every outbound call onto one worker,
//!   waiting one second before each, while [`retry::RetryingFetcher`] backs
//!   off on HTTP 429 and on failures.
//! - [`loader::SequentialDataLoader`] runs the fixed four-step pipeline
//!   (global market, trending, top 100, all 250), publishes progress, and
//!   makes sure concurrent callers share one run.
//!
//! ## Usage
//!
//! ```no_run
//! use market_dashboard_sdk::{Dashboard, LoaderConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dashboard = Dashboard::bootstrap(LoaderConfig::from_env())?;
//!
//! // Every view mounting at once still triggers a single load
//! let loaded = dashboard.mount().await?;
//! println!("{} coins loaded", loaded.data.all_cryptos.as_ref().map_or(0, Vec::len));
//!
//! // User pressed "reload"
//! dashboard.refetch_data().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Dashboard::bootstrap()
//!     ↓
//! SequentialDataLoader (PipelineCache, LoaderStore)
//!     ↓
//! MarketDataSource (CoinGeckoClient)
//!     ↓
//! RequestQueue ─▶ RetryingFetcher ─▶ HttpTransport (reqwest)
//! ```

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod provider;
pub mod providers;
pub mod queue;
pub mod retry;
pub mod store;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use bootstrap::{init_tracing, Dashboard};
pub use config::LoaderConfig;
pub use error::{LoadError, ProviderError};
pub use loader::{DashboardData, PipelineRun, SequentialDataLoader};
pub use metrics::RequestStats;
pub use provider::MarketDataSource;
pub use providers::CoinGeckoClient;
pub use types::{
    ComponentHealth, CryptoCurrency, GlobalMarketData, HealthStatus, LoadStep, LoadedData,
    LoaderEvent, LoadingState, TrendingCoins,
};
