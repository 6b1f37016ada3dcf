//! Sequential dashboard load pipeline
//!
//! Runs the four fetch steps (global market, trending, top 100, all 250) one
//! after another, publishing progress and partial data through the
//! `LoaderStore`. A `PipelineCache` guarantees one run at a time: a second
//! `start()` while a run is in flight gets the same `PipelineRun`, and a
//! completed result is served without touching the network until
//! `refetch_data()` clears it.
//!
//! ```text
//! start() ──▶ cached data?  ──yes──▶ resolved PipelineRun
//!               │ no
//!               ▼
//!             in flight?    ──yes──▶ same PipelineRun (shared)
//!               │ no
//!               ▼
//!             spawn run: GlobalMarket ▶ Trending ▶ TopCryptos ▶ AllCryptos
//! ```

use crate::{
    config::LoaderConfig,
    constants::TOP_CRYPTOS_COUNT,
    error::{LoadError, ProviderError},
    provider::MarketDataSource,
    store::LoaderStore,
    types::{ComponentHealth, HealthStatus, LoadStep, LoadedData, LoaderEvent, LoadingState},
};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::IntoFuture;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::AbortHandle;
use tokio::time::sleep;
use uuid::Uuid;

/// Outcome shared by every caller of one run
pub type RunResult = Result<Arc<LoadedData>, LoadError>;

type SharedRun = Shared<BoxFuture<'static, RunResult>>;

/// Handle to a pipeline run; clones share the same underlying run
#[derive(Clone)]
pub struct PipelineRun {
    run_id: Option<Uuid>,
    future: SharedRun,
}

impl PipelineRun {
    fn resolved(data: Arc<LoadedData>) -> Self {
        Self {
            run_id: None,
            future: futures::future::ready(Ok(data)).boxed().shared(),
        }
    }

    /// Id of the run, `None` for a handle served from the cache
    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    /// True if both handles refer to the same run
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.future.ptr_eq(&other.future)
    }

    /// Result if the run has finished and a handle has already observed it
    pub fn peek(&self) -> Option<&RunResult> {
        self.future.peek()
    }
}

impl IntoFuture for PipelineRun {
    type Output = RunResult;
    type IntoFuture = SharedRun;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

impl std::fmt::Debug for PipelineRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRun")
            .field("run_id", &self.run_id)
            .field("finished", &self.peek().is_some())
            .finish()
    }
}

struct InFlight {
    run: PipelineRun,
    abort: AbortHandle,
}

/// The single slot holding the in-flight run, the completed data and the
/// last error
///
/// `generation` changes only on reset; a run may publish only while the
/// generation it started under is still current.
#[derive(Default)]
pub struct PipelineCache {
    generation: u64,
    in_flight: Option<InFlight>,
    data: Option<Arc<LoadedData>>,
    error: Option<String>,
}

impl PipelineCache {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn data(&self) -> Option<Arc<LoadedData>> {
        self.data.clone()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn clear(&mut self) -> Option<InFlight> {
        self.generation += 1;
        self.data = None;
        self.error = None;
        self.in_flight.take()
    }
}

/// What the UI layer renders from
#[derive(Debug, Clone)]
pub struct DashboardData {
    pub data: Arc<LoadedData>,
    pub loading_state: LoadingState,
}

struct LoaderInner {
    source: Arc<dyn MarketDataSource>,
    store: LoaderStore,
    cache: Mutex<PipelineCache>,
    finalize_delay: Duration,
}

/// Orchestrates the dashboard load pipeline
///
/// Cheap to clone; clones share the same cache and store. Construct one per
/// process at the composition root and hand clones to every consumer.
#[derive(Clone)]
pub struct SequentialDataLoader {
    inner: Arc<LoaderInner>,
}

impl SequentialDataLoader {
    /// Creates an idle loader over `source`
    pub fn new(source: Arc<dyn MarketDataSource>, config: &LoaderConfig) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                source,
                store: LoaderStore::new(),
                cache: Mutex::new(PipelineCache::default()),
                finalize_delay: config.finalize_delay,
            }),
        }
    }

    /// Starts the pipeline, or joins the run already in flight, or returns
    /// the cached result.
    pub async fn start(&self) -> PipelineRun {
        let mut cache = self.inner.cache.lock().await;

        if let Some(data) = &cache.data {
            tracing::debug!("Serving cached dashboard data");
            return PipelineRun::resolved(data.clone());
        }

        if let Some(in_flight) = &cache.in_flight {
            tracing::debug!(run_id = ?in_flight.run.run_id(), "Joining in-flight data load");
            return in_flight.run.clone();
        }

        self.begin_run(&mut cache)
    }

    /// Starts (or joins) the pipeline and waits for it
    pub async fn load(&self) -> Result<DashboardData, LoadError> {
        let data = self.start().await.await?;
        Ok(DashboardData {
            data,
            loading_state: LoadingState::complete(),
        })
    }

    /// Drops all cached state and runs the pipeline again.
    ///
    /// A run still in flight is aborted at its next suspension point; its
    /// queued requests are skipped and one already on the wire is dropped
    /// together with any retry backoff. Callers awaiting the old run get
    /// `LoadError::Abandoned`.
    pub async fn refetch_data(&self) -> Result<(), LoadError> {
        let run = {
            let mut cache = self.inner.cache.lock().await;
            if let Some(stale) = cache.clear() {
                tracing::info!(run_id = ?stale.run.run_id(), "Abandoning in-flight data load");
                stale.abort.abort();
            }
            self.inner.store.reset();
            self.begin_run(&mut cache)
        };

        run.await.map(|_| ())
    }

    /// Current data and loading state, without starting anything
    pub fn snapshot(&self) -> DashboardData {
        DashboardData {
            data: self.inner.store.data(),
            loading_state: self.inner.store.state(),
        }
    }

    pub fn loading_state(&self) -> LoadingState {
        self.inner.store.state()
    }

    pub fn data(&self) -> Arc<LoadedData> {
        self.inner.store.data()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LoadingState> {
        self.inner.store.subscribe_state()
    }

    pub fn subscribe_data(&self) -> watch::Receiver<Arc<LoadedData>> {
        self.inner.store.subscribe_data()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LoaderEvent> {
        self.inner.store.subscribe_events()
    }

    /// True while a run is in flight
    pub async fn is_running(&self) -> bool {
        self.inner.cache.lock().await.is_running()
    }

    /// Data source the pipeline reads from
    pub fn source(&self) -> Arc<dyn MarketDataSource> {
        self.inner.source.clone()
    }

    /// Perform a health check on the loader
    pub async fn health_check(&self) -> ComponentHealth {
        let state = self.inner.store.state();
        let data = self.inner.store.data();
        let (generation, running) = {
            let cache = self.inner.cache.lock().await;
            (cache.generation(), cache.is_running())
        };

        let loaded: Vec<String> = LoadStep::ALL
            .iter()
            .filter(|step| data.has_step(**step))
            .map(|step| step.to_string())
            .collect();

        let mut details = HashMap::new();
        details.insert("progress".to_string(), serde_json::json!(state.progress));
        details.insert(
            "current_step".to_string(),
            serde_json::json!(state.current_step),
        );
        details.insert("loaded_slices".to_string(), serde_json::json!(loaded));
        details.insert("running".to_string(), serde_json::json!(running));
        details.insert("generation".to_string(), serde_json::json!(generation));
        details.insert(
            "source".to_string(),
            serde_json::json!(self.inner.source.source_name()),
        );

        let (status, message) = if let Some(error) = &state.error {
            (
                HealthStatus::Unhealthy,
                format!("Dashboard data failed to load: {}", error),
            )
        } else if state.is_complete() {
            (
                HealthStatus::Healthy,
                "Dashboard data is loaded".to_string(),
            )
        } else {
            (
                HealthStatus::Degraded,
                format!("Dashboard data is loading ({}%)", state.progress),
            )
        };

        ComponentHealth {
            name: "dashboard_loader".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: chrono::Utc::now(),
        }
    }

    fn begin_run(&self, cache: &mut PipelineCache) -> PipelineRun {
        let run_id = Uuid::new_v4();
        let generation = cache.generation;
        cache.error = None;

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let run = AssertUnwindSafe(inner.clone().execute(run_id, generation));
            match run.catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    let err = LoadError::internal("data load task panicked");
                    inner.fail(run_id, generation, &err).await;
                    Err(err)
                }
            }
        });
        let abort = handle.abort_handle();

        let future = handle
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(LoadError::Abandoned),
                Err(e) => Err(LoadError::internal(format!("data load task failed: {}", e))),
            })
            .boxed()
            .shared();

        let run = PipelineRun {
            run_id: Some(run_id),
            future,
        };
        cache.in_flight = Some(InFlight {
            run: run.clone(),
            abort,
        });
        run
    }
}

impl LoaderInner {
    async fn execute(self: Arc<Self>, run_id: Uuid, generation: u64) -> RunResult {
        tracing::info!(run_id = %run_id, "Starting dashboard data load");

        let first = LoadStep::ALL[0];
        let started = self
            .publish(generation, |store| {
                store.emit(LoaderEvent::run_started(run_id));
                store.publish_state(run_id, LoadingState::running(0, first.label()));
            })
            .await;
        if !started {
            return Err(LoadError::Abandoned);
        }

        let mut data = LoadedData::default();
        for step in LoadStep::ALL {
            tracing::debug!(run_id = %run_id, step = %step, "Loading");

            if let Err(e) = self.run_step(step, &mut data).await {
                let err = LoadError::step_failed(step, &e);
                self.fail(run_id, generation, &err).await;
                return Err(err);
            }

            let next_state = match step.next() {
                Some(next) => LoadingState::running(step.progress(), next.label()),
                None => LoadingState::finalizing(),
            };
            let partial = Arc::new(data.clone());
            let published = self
                .publish(generation, |store| {
                    store.publish_step(run_id, step, partial);
                    store.publish_state(run_id, next_state);
                })
                .await;
            if !published {
                return Err(LoadError::Abandoned);
            }
        }

        sleep(self.finalize_delay).await;

        let data = Arc::new(data);
        let mut cache = self.cache.lock().await;
        if cache.generation != generation {
            return Err(LoadError::Abandoned);
        }
        cache.data = Some(data.clone());
        cache.error = None;
        cache.in_flight = None;
        self.store.publish_state(run_id, LoadingState::complete());
        self.store.emit(LoaderEvent::run_completed(run_id));

        tracing::info!(run_id = %run_id, "All dashboard data loaded");
        Ok(data)
    }

    async fn run_step(&self, step: LoadStep, data: &mut LoadedData) -> Result<(), ProviderError> {
        match step {
            LoadStep::GlobalMarket => {
                data.global_market_data = Some(self.source.global_market_data().await?);
            }
            LoadStep::Trending => {
                data.trending_coins = Some(self.source.trending_coins().await?);
            }
            LoadStep::TopCryptos => {
                data.top_cryptos = Some(self.source.cryptocurrencies(1, TOP_CRYPTOS_COUNT).await?);
            }
            LoadStep::AllCryptos => {
                data.all_cryptos = Some(self.source.all_cryptocurrencies().await?);
            }
        }
        Ok(())
    }

    /// Runs `f` against the store if `generation` is still current
    async fn publish<F>(&self, generation: u64, f: F) -> bool
    where
        F: FnOnce(&LoaderStore),
    {
        let cache = self.cache.lock().await;
        if cache.generation != generation {
            return false;
        }
        f(&self.store);
        true
    }

    async fn fail(&self, run_id: Uuid, generation: u64, err: &LoadError) {
        let message = err.to_string();
        tracing::error!(
            run_id = %run_id,
            step = ?err.step(),
            error = %message,
            "Dashboard data load failed"
        );

        let mut cache = self.cache.lock().await;
        if cache.generation != generation {
            return;
        }
        cache.in_flight = None;
        cache.error = Some(message.clone());
        self.store
            .publish_state(run_id, LoadingState::failed(message.clone()));
        self.store.emit(LoaderEvent::run_failed(run_id, message));
    }
}
