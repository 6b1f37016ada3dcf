//! CoinGecko data source
//!
//! Every method builds a URL, then hands a fetch closure to the shared
//! `RequestQueue`; the closure runs `RetryingFetcher::fetch_with_retry`
//! when its turn comes.

use crate::{
    config::LoaderConfig,
    constants::{ALL_CRYPTOS_COUNT, MAX_IDS_PER_QUERY},
    error::ProviderError,
    metrics::{RequestMetrics, RequestStats},
    provider::MarketDataSource,
    queue::RequestQueue,
    retry::{RetryPolicy, RetryingFetcher},
    transport::{HttpTransport, ReqwestTransport},
    types::{
        CoinDetails, CryptoCurrency, GlobalMarketData, MarketChartData, PriceHistory, SearchCoin,
        TrendingCoins,
    },
};
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

/// `search` response; only the coin matches are used
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    coins: Vec<SearchCoin>,
}

/// CoinGecko client with a serialized, retrying request channel
pub struct CoinGeckoClient {
    base_url: String,
    queue: RequestQueue,
    fetcher: Arc<RetryingFetcher>,
    metrics: Arc<RequestMetrics>,
}

impl CoinGeckoClient {
    /// Creates a client backed by `reqwest`
    pub fn new(config: &LoaderConfig) -> Result<Self, ProviderError> {
        let transport = Arc::new(ReqwestTransport::new(config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Creates a client over a custom transport
    pub fn with_transport(config: &LoaderConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let metrics = Arc::new(RequestMetrics::new());
        let fetcher = Arc::new(RetryingFetcher::new(
            transport,
            RetryPolicy::from_config(config),
            metrics.clone(),
        ));

        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            queue: RequestQueue::new(config.request_delay()),
            fetcher,
            metrics,
        }
    }

    /// Requests queued or in flight
    pub fn pending_requests(&self) -> usize {
        self.queue.pending()
    }

    /// Latency and retry statistics
    pub async fn request_stats(&self) -> RequestStats {
        self.metrics.snapshot().await
    }

    fn markets_url(
        &self,
        order: &str,
        per_page: u32,
        page: u32,
        sparkline: bool,
        change: &str,
    ) -> String {
        format!(
            "{}/coins/markets?vs_currency=usd&order={}&per_page={}&page={}\
             &sparkline={}&price_change_percentage={}",
            self.base_url, order, per_page, page, sparkline, change
        )
    }

    /// Queues a GET of `url` and decodes the JSON body
    async fn get<T>(&self, url: String, description: String) -> Result<T, ProviderError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let fetcher = self.fetcher.clone();
        self.queue
            .enqueue(
                move || async move { fetcher.fetch_with_retry::<T>(&url).await },
                Some(description.as_str()),
            )
            .await
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoClient {
    async fn global_market_data(&self) -> Result<GlobalMarketData, ProviderError> {
        let url = format!("{}/global", self.base_url);
        self.get(url, "Get global market data".to_string()).await
    }

    async fn trending_coins(&self) -> Result<TrendingCoins, ProviderError> {
        let url = format!("{}/search/trending", self.base_url);
        self.get(url, "Get trending coins".to_string()).await
    }

    async fn cryptocurrencies(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CryptoCurrency>, ProviderError> {
        let url = self.markets_url("market_cap_desc", per_page, page, true, "7d");
        self.get(
            url,
            format!("Get cryptocurrencies (page {}, {} per page)", page, per_page),
        )
        .await
    }

    async fn all_cryptocurrencies(&self) -> Result<Vec<CryptoCurrency>, ProviderError> {
        let url = self.markets_url("market_cap_desc", ALL_CRYPTOS_COUNT, 1, true, "7d");
        self.get(
            url,
            format!("Get all cryptocurrencies ({} coins)", ALL_CRYPTOS_COUNT),
        )
        .await
    }

    async fn coin_details(&self, id: &str) -> Result<CoinDetails, ProviderError> {
        let url = format!("{}/coins/{}", self.base_url, id);
        self.get(url, format!("Get coin details for {}", id)).await
    }

    async fn price_history(&self, id: &str, days: u32) -> Result<PriceHistory, ProviderError> {
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency=usd&days={}",
            self.base_url, id, days
        );
        self.get(url, format!("Get price history for {} ({} days)", id, days))
            .await
    }

    async fn market_chart(&self, days: u32) -> Result<MarketChartData, ProviderError> {
        let url = format!(
            "{}/coins/bitcoin/market_chart?vs_currency=usd&days={}",
            self.base_url, days
        );
        self.get(url, format!("Get market chart ({} days)", days)).await
    }

    async fn top_gainers(&self, limit: u32) -> Result<Vec<CryptoCurrency>, ProviderError> {
        let url = self.markets_url("price_change_percentage_24h_desc", limit, 1, false, "24h");
        self.get(url, format!("Get top {} gainers", limit)).await
    }

    async fn search_coins(&self, query: &str) -> Result<Vec<SearchCoin>, ProviderError> {
        let url = Url::parse_with_params(&format!("{}/search", self.base_url), &[("query", query)])
            .map_err(|e| ProviderError::internal(format!("invalid search url: {}", e)))?;
        let response: SearchResponse = self
            .get(url.to_string(), format!("Search coins: {}", query))
            .await?;
        Ok(response.coins)
    }

    async fn cryptocurrencies_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<CryptoCurrency>, ProviderError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids_param = ids
            .iter()
            .take(MAX_IDS_PER_QUERY)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/coins/markets?vs_currency=usd&ids={}&order=market_cap_desc\
             &sparkline=false&price_change_percentage=24h",
            self.base_url, ids_param
        );

        let mut label = ids.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
        if ids.len() > 3 {
            label.push_str("...");
        }
        self.get(url, format!("Get cryptocurrencies by IDs: {}", label))
            .await
    }

    fn source_name(&self) -> &'static str {
        "coingecko"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use std::time::Duration;

    fn client(transport: Arc<MockTransport>) -> CoinGeckoClient {
        let config = LoaderConfig::default().with_base_url("http://api.test/v3");
        CoinGeckoClient::with_transport(&config, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_market_listing_url_and_parse() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(200, r#"[{"id":"bitcoin","symbol":"btc","name":"Bitcoin"}]"#);
        let client = client(transport.clone());

        let coins = client.cryptocurrencies(1, 100).await.unwrap();

        assert_eq!(coins[0].id, "bitcoin");
        assert_eq!(
            transport.urls(),
            vec![
                "http://api.test/v3/coins/markets?vs_currency=usd&order=market_cap_desc\
                 &per_page=100&page=1&sparkline=true&price_change_percentage=7d"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_are_serialized() {
        let transport = Arc::new(MockTransport::new());
        transport.set_fallback(200, r#"{"coins":[]}"#);
        let client = client(transport.clone());

        let (a, b, c) = tokio::join!(
            client.trending_coins(),
            client.trending_coins(),
            client.trending_coins()
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());

        let times = transport.call_times();
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_encodes_query() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(
            200,
            r#"{"coins":[{"id":"shiba-inu","name":"Shiba Inu","symbol":"SHIB"}]}"#,
        );
        let client = client(transport.clone());

        let coins = client.search_coins("shiba inu").await.unwrap();

        assert_eq!(coins[0].id, "shiba-inu");
        assert_eq!(transport.urls(), vec!["http://api.test/v3/search?query=shiba+inu"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_query_limits_and_skips_empty() {
        let transport = Arc::new(MockTransport::new());
        transport.set_fallback(200, "[]");
        let client = client(transport.clone());

        assert!(client.cryptocurrencies_by_ids(&[]).await.unwrap().is_empty());
        assert_eq!(transport.call_count(), 0);

        let ids: Vec<String> = (0..12).map(|i| format!("c{}", i)).collect();
        client.cryptocurrencies_by_ids(&ids).await.unwrap();

        let url = &transport.urls()[0];
        assert!(url.contains("ids=c0,c1,c2,c3,c4,c5,c6,c7,c8,c9&"));
        assert!(!url.contains("c10"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_request_leaves_queue_usable() {
        let transport = Arc::new(MockTransport::new());
        for _ in 0..3 {
            transport.push_status(500);
        }
        transport.push_response(200, r#"{"data":{}}"#);
        let client = client(transport.clone());

        let err = client.trending_coins().await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP error! status: 500");

        assert!(client.global_market_data().await.is_ok());
        assert_eq!(client.pending_requests(), 0);
        assert_eq!(client.request_stats().await.failed_requests, 1);
    }
}
