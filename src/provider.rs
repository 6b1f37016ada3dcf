//! Data source abstraction consumed by the load pipeline

use crate::{
    error::ProviderError,
    types::{
        CoinDetails, CryptoCurrency, GlobalMarketData, MarketChartData, PriceHistory, SearchCoin,
        TrendingCoins,
    },
};
use async_trait::async_trait;

/// Trait for market data sources
///
/// Implementations must route every call through a single serialized
/// channel; the pipeline never talks to the network directly.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Aggregate market totals and dominance percentages
    async fn global_market_data(&self) -> Result<GlobalMarketData, ProviderError>;

    /// Most searched coins
    async fn trending_coins(&self) -> Result<TrendingCoins, ProviderError>;

    /// One page of the market listing, sorted by market cap
    async fn cryptocurrencies(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CryptoCurrency>, ProviderError>;

    /// The full listing in a single request
    async fn all_cryptocurrencies(&self) -> Result<Vec<CryptoCurrency>, ProviderError>;

    /// Detail view of one coin
    async fn coin_details(&self, id: &str) -> Result<CoinDetails, ProviderError>;

    /// Price/cap/volume series of one coin over `days`
    async fn price_history(&self, id: &str, days: u32) -> Result<PriceHistory, ProviderError>;

    /// Bitcoin market chart over `days`
    async fn market_chart(&self, days: u32) -> Result<MarketChartData, ProviderError>;

    /// Biggest 24h gainers
    async fn top_gainers(&self, limit: u32) -> Result<Vec<CryptoCurrency>, ProviderError>;

    /// Free-text coin search
    async fn search_coins(&self, query: &str) -> Result<Vec<SearchCoin>, ProviderError>;

    /// Market rows for specific coins
    async fn cryptocurrencies_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<CryptoCurrency>, ProviderError>;

    /// Returns the name of this source
    fn source_name(&self) -> &'static str;
}
