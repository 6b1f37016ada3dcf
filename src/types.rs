//! Types for the market dashboard loader
//!
//! Wire shapes returned by the remote API, plus the pipeline's own state
//! types (`LoadStep`, `LoadedData`, `LoadingState`, `LoaderEvent`).

use crate::constants::{STEP_COMPLETE, STEP_ERROR, STEP_FINALIZING, STEP_INITIALIZING};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One `[timestamp_ms, value]` point of a market chart series
pub type ChartPoint = [f64; 2];

/// Seven-day sparkline attached to market listings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sparkline {
    #[serde(default)]
    pub price: Vec<f64>,
}

/// Row of the `coins/markets` listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoCurrency {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub image: String,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub fully_diluted_valuation: Option<f64>,
    pub total_volume: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub market_cap_change_24h: Option<f64>,
    pub market_cap_change_percentage_24h: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub max_supply: Option<f64>,
    pub ath: Option<f64>,
    pub ath_change_percentage: Option<f64>,
    pub ath_date: Option<String>,
    pub atl: Option<f64>,
    pub atl_change_percentage: Option<f64>,
    pub atl_date: Option<String>,
    pub last_updated: Option<String>,
    pub sparkline_in_7d: Option<Sparkline>,
    pub price_change_percentage_7d_in_currency: Option<f64>,
}

/// English description block of a coin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinDescription {
    #[serde(default)]
    pub en: String,
}

/// Image URLs of a coin in three sizes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinImage {
    pub thumb: String,
    pub small: String,
    pub large: String,
}

/// Per-currency values; the dashboard only reads USD
pub type CurrencyMap = HashMap<String, f64>;

/// `market_data` block of a coin detail response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinMarketData {
    pub current_price: CurrencyMap,
    pub market_cap: CurrencyMap,
    pub total_volume: CurrencyMap,
    pub high_24h: CurrencyMap,
    pub low_24h: CurrencyMap,
    pub price_change_24h: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub price_change_percentage_7d: Option<f64>,
    pub price_change_percentage_30d: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub max_supply: Option<f64>,
}

impl CoinMarketData {
    /// Current USD price, if reported
    pub fn price_usd(&self) -> Option<f64> {
        self.current_price.get("usd").copied()
    }
}

/// Response of `coins/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinDetails {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub description: CoinDescription,
    pub image: CoinImage,
    pub market_data: Option<CoinMarketData>,
}

/// Response of `coins/{id}/market_chart`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketChartData {
    pub prices: Vec<ChartPoint>,
    pub market_caps: Vec<ChartPoint>,
    pub total_volumes: Vec<ChartPoint>,
}

/// Price history of a single coin; same shape as the market chart
pub type PriceHistory = MarketChartData;

/// Aggregate totals inside the `global` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketData {
    pub active_cryptocurrencies: Option<u64>,
    pub total_market_cap: CurrencyMap,
    pub total_volume: CurrencyMap,
    pub market_cap_percentage: CurrencyMap,
    pub market_cap_change_percentage_24h_usd: Option<f64>,
}

impl MarketData {
    /// Total market capitalisation in USD
    pub fn total_market_cap_usd(&self) -> Option<f64> {
        self.total_market_cap.get("usd").copied()
    }

    /// Share of the total market held by one asset, e.g. `"btc"`
    pub fn dominance(&self, symbol: &str) -> Option<f64> {
        self.market_cap_percentage.get(symbol).copied()
    }
}

/// Response of `global`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMarketData {
    pub data: MarketData,
}

/// A coin from the trending search list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendingCoin {
    pub id: String,
    pub coin_id: u64,
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
    pub thumb: String,
    pub small: String,
    pub large: String,
    pub slug: String,
    pub price_btc: f64,
    pub score: u32,
}

/// Wrapper object the API puts around every trending coin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendingItem {
    pub item: TrendingCoin,
}

/// Response of `search/trending`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendingCoins {
    #[serde(default)]
    pub coins: Vec<TrendingItem>,
}

/// Coin match returned by `search`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCoin {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
    pub thumb: String,
    pub large: String,
}

/// Stages of the dashboard load pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStep {
    /// Global market snapshot
    GlobalMarket,
    /// Trending coins list
    Trending,
    /// Top cryptocurrencies by market cap
    TopCryptos,
    /// Full cryptocurrency universe
    AllCryptos,
}

impl LoadStep {
    /// All steps in the order they run
    pub const ALL: [LoadStep; 4] = [
        LoadStep::GlobalMarket,
        LoadStep::Trending,
        LoadStep::TopCryptos,
        LoadStep::AllCryptos,
    ];

    /// 1-based position in the pipeline
    pub fn ordinal(&self) -> u8 {
        match self {
            LoadStep::GlobalMarket => 1,
            LoadStep::Trending => 2,
            LoadStep::TopCryptos => 3,
            LoadStep::AllCryptos => 4,
        }
    }

    /// Progress percentage reached once this step completes
    pub fn progress(&self) -> u8 {
        self.ordinal() * 25
    }

    /// Label shown while this step runs
    pub fn label(&self) -> &'static str {
        match self {
            LoadStep::GlobalMarket => "Loading global market data...",
            LoadStep::Trending => "Loading trending coins...",
            LoadStep::TopCryptos => "Loading top cryptocurrencies...",
            LoadStep::AllCryptos => "Loading complete market data...",
        }
    }

    /// Step that runs after this one, if any
    pub fn next(&self) -> Option<LoadStep> {
        match self {
            LoadStep::GlobalMarket => Some(LoadStep::Trending),
            LoadStep::Trending => Some(LoadStep::TopCryptos),
            LoadStep::TopCryptos => Some(LoadStep::AllCryptos),
            LoadStep::AllCryptos => None,
        }
    }
}

impl std::fmt::Display for LoadStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoadStep::GlobalMarket => "global market data",
            LoadStep::Trending => "trending coins",
            LoadStep::TopCryptos => "top cryptocurrencies",
            LoadStep::AllCryptos => "all cryptocurrencies",
        };
        f.write_str(name)
    }
}

/// Everything the dashboard renders, filled in step by step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadedData {
    pub global_market_data: Option<GlobalMarketData>,
    pub trending_coins: Option<TrendingCoins>,
    pub top_cryptos: Option<Vec<CryptoCurrency>>,
    pub all_cryptos: Option<Vec<CryptoCurrency>>,
}

impl LoadedData {
    /// True once every slice has been fetched
    pub fn is_complete(&self) -> bool {
        self.global_market_data.is_some()
            && self.trending_coins.is_some()
            && self.top_cryptos.is_some()
            && self.all_cryptos.is_some()
    }

    /// True if no slice has been fetched yet
    pub fn is_empty(&self) -> bool {
        self.global_market_data.is_none()
            && self.trending_coins.is_none()
            && self.top_cryptos.is_none()
            && self.all_cryptos.is_none()
    }

    /// Whether the slice produced by `step` is present
    pub fn has_step(&self, step: LoadStep) -> bool {
        match step {
            LoadStep::GlobalMarket => self.global_market_data.is_some(),
            LoadStep::Trending => self.trending_coins.is_some(),
            LoadStep::TopCryptos => self.top_cryptos.is_some(),
            LoadStep::AllCryptos => self.all_cryptos.is_some(),
        }
    }
}

/// Progress of the load pipeline as seen by the UI
///
/// Exactly one of running (`is_loading`), failed (`error` set) or
/// completed (`progress == 100` and not loading) holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingState {
    pub is_loading: bool,
    pub error: Option<String>,
    pub progress: u8,
    pub current_step: String,
}

impl Default for LoadingState {
    fn default() -> Self {
        Self::initializing()
    }
}

impl LoadingState {
    /// State before any run has started
    pub fn initializing() -> Self {
        Self::running(0, STEP_INITIALIZING)
    }

    /// In-progress state
    pub fn running(progress: u8, current_step: impl Into<String>) -> Self {
        Self {
            is_loading: true,
            error: None,
            progress: progress.min(100),
            current_step: current_step.into(),
        }
    }

    /// Last step done, settling before completion
    pub fn finalizing() -> Self {
        Self::running(100, STEP_FINALIZING)
    }

    /// Terminal success
    pub fn complete() -> Self {
        Self {
            is_loading: false,
            error: None,
            progress: 100,
            current_step: STEP_COMPLETE.to_string(),
        }
    }

    /// Terminal failure; progress drops back to zero
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            is_loading: false,
            error: Some(message.into()),
            progress: 0,
            current_step: STEP_ERROR.to_string(),
        }
    }

    /// True for the terminal success state
    pub fn is_complete(&self) -> bool {
        !self.is_loading && self.error.is_none() && self.progress == 100
    }

    /// True for the terminal failure state
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Loader events broadcast to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoaderEvent {
    /// A pipeline run began
    RunStarted {
        id: Uuid,
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The published loading state changed
    StateChanged {
        id: Uuid,
        run_id: Uuid,
        state: LoadingState,
        timestamp: DateTime<Utc>,
    },

    /// A step's slice was published
    StepCompleted {
        id: Uuid,
        run_id: Uuid,
        step: LoadStep,
        timestamp: DateTime<Utc>,
    },

    /// All steps finished
    RunCompleted {
        id: Uuid,
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A step exhausted its retries
    RunFailed {
        id: Uuid,
        run_id: Uuid,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl LoaderEvent {
    pub fn run_started(run_id: Uuid) -> Self {
        LoaderEvent::RunStarted {
            id: Uuid::new_v4(),
            run_id,
            timestamp: Utc::now(),
        }
    }

    pub fn state_changed(run_id: Uuid, state: LoadingState) -> Self {
        LoaderEvent::StateChanged {
            id: Uuid::new_v4(),
            run_id,
            state,
            timestamp: Utc::now(),
        }
    }

    pub fn step_completed(run_id: Uuid, step: LoadStep) -> Self {
        LoaderEvent::StepCompleted {
            id: Uuid::new_v4(),
            run_id,
            step,
            timestamp: Utc::now(),
        }
    }

    pub fn run_completed(run_id: Uuid) -> Self {
        LoaderEvent::RunCompleted {
            id: Uuid::new_v4(),
            run_id,
            timestamp: Utc::now(),
        }
    }

    pub fn run_failed(run_id: Uuid, error_message: impl Into<String>) -> Self {
        LoaderEvent::RunFailed {
            id: Uuid::new_v4(),
            run_id,
            error_message: error_message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Get the event ID
    pub fn id(&self) -> Uuid {
        match self {
            LoaderEvent::RunStarted { id, .. }
            | LoaderEvent::StateChanged { id, .. }
            | LoaderEvent::StepCompleted { id, .. }
            | LoaderEvent::RunCompleted { id, .. }
            | LoaderEvent::RunFailed { id, .. } => *id,
        }
    }

    /// Get the pipeline run this event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            LoaderEvent::RunStarted { run_id, .. }
            | LoaderEvent::StateChanged { run_id, .. }
            | LoaderEvent::StepCompleted { run_id, .. }
            | LoaderEvent::RunCompleted { run_id, .. }
            | LoaderEvent::RunFailed { run_id, .. } => *run_id,
        }
    }

    /// Get the event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            LoaderEvent::RunStarted { .. } => "RUN_STARTED",
            LoaderEvent::StateChanged { .. } => "STATE_CHANGED",
            LoaderEvent::StepCompleted { .. } => "STEP_COMPLETED",
            LoaderEvent::RunCompleted { .. } => "RUN_COMPLETED",
            LoaderEvent::RunFailed { .. } => "RUN_FAILED",
        }
    }
}

impl std::fmt::Display for LoaderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoaderEvent::RunStarted { run_id, .. } => write!(f, "Run {} started", run_id),
            LoaderEvent::StateChanged { state, .. } => {
                write!(f, "Loading {}%: {}", state.progress, state.current_step)
            }
            LoaderEvent::StepCompleted { step, .. } => write!(f, "Loaded {}", step),
            LoaderEvent::RunCompleted { run_id, .. } => write!(f, "Run {} completed", run_id),
            LoaderEvent::RunFailed { error_message, .. } => {
                write!(f, "Run failed: {}", error_message)
            }
        }
    }
}

/// Overall system health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Data is loaded and current
    Healthy,
    /// Data is still loading
    Degraded,
    /// The last run failed
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional status message
    pub message: Option<String>,
    /// Component-specific details
    pub details: HashMap<String, serde_json::Value>,
    /// Last checked timestamp
    pub last_checked: DateTime<Utc>,
}
