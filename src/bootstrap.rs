//! Application bootstrap
//!
//! The host calls `Dashboard::bootstrap` once at startup and hands the
//! returned `Dashboard` (or clones of its loader) to every view. There is no
//! global instance; the one-per-process guarantee comes from the host owning
//! the only `Dashboard`.

use crate::{
    config::LoaderConfig,
    error::{LoadError, ProviderError},
    loader::{DashboardData, SequentialDataLoader},
    provider::MarketDataSource,
    providers::CoinGeckoClient,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log filter when `RUST_LOG` is not set
const DEFAULT_LOG_FILTER: &str = "info,market_dashboard_sdk=debug";

/// Composition root: one data source, one loader
pub struct Dashboard {
    config: LoaderConfig,
    source: Arc<dyn MarketDataSource>,
    loader: SequentialDataLoader,
}

impl Dashboard {
    /// Wires the CoinGecko client and the loader. Must run inside a tokio
    /// runtime (the request queue spawns its worker).
    pub fn bootstrap(config: LoaderConfig) -> Result<Self, ProviderError> {
        let client = CoinGeckoClient::new(&config)?;
        tracing::info!(api_base_url = %config.api_base_url, "Dashboard bootstrapped");
        Ok(Self::with_source(config, Arc::new(client)))
    }

    /// Wires the loader over a custom data source
    pub fn with_source(config: LoaderConfig, source: Arc<dyn MarketDataSource>) -> Self {
        let loader = SequentialDataLoader::new(source.clone(), &config);
        Self {
            config,
            source,
            loader,
        }
    }

    /// Entry point for a view: starts or joins the pipeline and waits
    pub async fn mount(&self) -> Result<DashboardData, LoadError> {
        self.loader.load().await
    }

    /// User-triggered reload
    pub async fn refetch_data(&self) -> Result<(), LoadError> {
        self.loader.refetch_data().await
    }

    pub fn loader(&self) -> &SequentialDataLoader {
        &self.loader
    }

    /// Source for on-demand views (coin detail, price history)
    pub fn source(&self) -> Arc<dyn MarketDataSource> {
        self.source.clone()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }
}

/// Installs a fmt subscriber filtered by `RUST_LOG`.
///
/// Returns false if a global subscriber was already set.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
