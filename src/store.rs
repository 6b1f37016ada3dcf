//! Published loader state with subscription support
//!
//! Uses tokio watch channels for the latest `LoadingState` and
//! `LoadedData`, so late subscribers always see the current value, plus a
//! broadcast channel carrying every `LoaderEvent` in order.

use crate::{
    constants::EVENT_CHANNEL_CAPACITY,
    types::{LoadStep, LoadedData, LoaderEvent, LoadingState},
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// In-memory store for what the UI renders
pub struct LoaderStore {
    state_tx: watch::Sender<LoadingState>,
    data_tx: watch::Sender<Arc<LoadedData>>,
    events_tx: broadcast::Sender<LoaderEvent>,
}

impl LoaderStore {
    /// Creates a store in the initializing state with no data
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(LoadingState::initializing());
        let (data_tx, _) = watch::channel(Arc::new(LoadedData::default()));
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            state_tx,
            data_tx,
            events_tx,
        }
    }

    /// Replaces the loading state and announces the change
    pub fn publish_state(&self, run_id: Uuid, state: LoadingState) {
        tracing::debug!(
            run_id = %run_id,
            progress = state.progress,
            current_step = %state.current_step,
            "Loading state changed"
        );
        self.state_tx.send_replace(state.clone());
        self.emit(LoaderEvent::state_changed(run_id, state));
    }

    /// Publishes the data accumulated so far, after `step` finished
    pub fn publish_step(&self, run_id: Uuid, step: LoadStep, data: Arc<LoadedData>) {
        self.data_tx.send_replace(data);
        self.emit(LoaderEvent::step_completed(run_id, step));
    }

    /// Back to the initializing state with no data
    pub fn reset(&self) {
        self.data_tx.send_replace(Arc::new(LoadedData::default()));
        self.state_tx.send_replace(LoadingState::initializing());
    }

    /// Broadcasts an event; nobody listening is fine
    pub fn emit(&self, event: LoaderEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Current loading state
    pub fn state(&self) -> LoadingState {
        self.state_tx.borrow().clone()
    }

    /// Data published so far
    pub fn data(&self) -> Arc<LoadedData> {
        self.data_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LoadingState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_data(&self) -> watch::Receiver<Arc<LoadedData>> {
        self.data_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LoaderEvent> {
        self.events_tx.subscribe()
    }
}

impl Default for LoaderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GlobalMarketData;

    #[test]
    fn test_late_subscriber_sees_current_state() {
        let store = LoaderStore::new();
        let run_id = Uuid::new_v4();

        store.publish_state(run_id, LoadingState::running(50, "Loading top cryptocurrencies..."));

        let rx = store.subscribe_state();
        assert_eq!(rx.borrow().progress, 50);
        assert!(rx.borrow().is_loading);
    }

    #[tokio::test]
    async fn test_events_follow_publish_order() {
        let store = LoaderStore::new();
        let mut events = store.subscribe_events();
        let run_id = Uuid::new_v4();

        let data = LoadedData {
            global_market_data: Some(GlobalMarketData::default()),
            ..Default::default()
        };
        store.publish_step(run_id, LoadStep::GlobalMarket, Arc::new(data));
        store.publish_state(run_id, LoadingState::running(25, "Loading trending coins..."));

        assert_eq!(events.recv().await.unwrap().event_type(), "STEP_COMPLETED");
        assert_eq!(events.recv().await.unwrap().event_type(), "STATE_CHANGED");
        assert!(store.data().global_market_data.is_some());
    }

    #[test]
    fn test_reset_clears_data() {
        let store = LoaderStore::new();
        let data = LoadedData {
            top_cryptos: Some(Vec::new()),
            ..Default::default()
        };
        store.publish_step(Uuid::new_v4(), LoadStep::TopCryptos, Arc::new(data));
        store.publish_state(Uuid::new_v4(), LoadingState::complete());

        store.reset();

        assert!(store.data().is_empty());
        assert_eq!(store.state(), LoadingState::initializing());
    }
}
