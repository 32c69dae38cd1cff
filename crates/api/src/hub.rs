use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use common::{
    Error, Instrument, MarketDataSource, Result, ResultBatch, RuntimeConfig, RuntimeConfigStore,
};

use crate::messages::{ControlMessage, ServerMessage};

pub type SubscriberId = Uuid;

/// A registered subscriber's end of its outbound queue. The first queued
/// message is always the `markets` snapshot.
pub struct Subscription {
    pub id: SubscriberId,
    pub rx: mpsc::Receiver<Arc<str>>,
}

/// Fan-out point between the poller and every connected subscriber.
///
/// Each subscriber owns a bounded queue. Relaying never waits on a queue:
/// a subscriber whose queue is full or closed is evicted, so one slow
/// connection cannot hold up the others or the poller behind them.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    subscribers: RwLock<HashMap<SubscriberId, mpsc::Sender<Arc<str>>>>,
    runtime: RuntimeConfigStore,
    universe: watch::Receiver<Arc<[Instrument]>>,
    source: Arc<dyn MarketDataSource>,
    queue_capacity: usize,
}

impl Hub {
    pub fn new(
        runtime: RuntimeConfigStore,
        universe: watch::Receiver<Arc<[Instrument]>>,
        source: Arc<dyn MarketDataSource>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: RwLock::new(HashMap::new()),
                runtime,
                universe,
                source,
                queue_capacity: queue_capacity.max(1),
            }),
        }
    }

    pub fn runtime(&self) -> &RuntimeConfigStore {
        &self.inner.runtime
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().await.len()
    }

    /// Latest universe published by the poller. Before the first refresh
    /// the provider is asked directly.
    pub async fn markets(&self) -> Arc<[Instrument]> {
        let cached = self.inner.universe.borrow().clone();
        if !cached.is_empty() {
            return cached;
        }
        match self.inner.source.fetch_universe().await {
            Ok(markets) => markets.into(),
            Err(e) => {
                warn!(error = %e, "Universe unavailable for new subscriber");
                Arc::from(Vec::new())
            }
        }
    }

    /// Register a subscriber. Its queue holds the `markets` snapshot before
    /// it becomes visible to `relay`, so the snapshot always arrives first.
    pub async fn register(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.queue_capacity);

        let markets = self.markets().await;
        match serde_json::to_string(&ServerMessage::Markets { data: &markets }) {
            Ok(text) => {
                // fresh queue with capacity >= 1
                let _ = tx.try_send(Arc::from(text));
            }
            Err(e) => error!(error = %e, "Failed to serialize markets snapshot"),
        }

        let id = Uuid::new_v4();
        let mut subscribers = self.inner.subscribers.write().await;
        subscribers.insert(id, tx);
        info!(subscriber = %id, subscribers = subscribers.len(), "Subscriber registered");

        Subscription { id, rx }
    }

    pub async fn deregister(&self, id: SubscriberId) {
        let mut subscribers = self.inner.subscribers.write().await;
        if subscribers.remove(&id).is_some() {
            info!(subscriber = %id, subscribers = subscribers.len(), "Subscriber removed");
        }
    }

    /// Queue one batch for every subscriber. Returns how many accepted it.
    pub async fn relay(&self, batch: &ResultBatch) -> usize {
        let text: Arc<str> = match serde_json::to_string(&ServerMessage::from(batch)) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                error!(error = %e, "Failed to serialize signal batch");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut evicted = Vec::new();
        {
            let subscribers = self.inner.subscribers.read().await;
            for (id, tx) in subscribers.iter() {
                match tx.try_send(text.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(subscriber = %id, "Subscriber queue full — evicting slow subscriber");
                        evicted.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(subscriber = %id, "Subscriber queue closed");
                        evicted.push(*id);
                    }
                }
            }
        }

        if !evicted.is_empty() {
            let mut subscribers = self.inner.subscribers.write().await;
            for id in &evicted {
                subscribers.remove(id);
            }
            info!(evicted = evicted.len(), subscribers = subscribers.len(), "Evicted subscribers");
        }
        delivered
    }

    /// Apply one inbound control message to the runtime config.
    ///
    /// `Ok(None)` means the message type is not one this hub handles.
    pub fn handle_control(&self, text: &str) -> Result<Option<RuntimeConfig>> {
        let msg: ControlMessage =
            serde_json::from_str(text).map_err(|e| Error::MalformedControl(e.to_string()))?;

        match msg {
            ControlMessage::ChangeStrategy { strategy } => {
                self.inner.runtime.set(Some(&strategy), None).map(Some)
            }
            ControlMessage::ChangeTimeframe { timeframe } => {
                self.inner.runtime.set(None, Some(timeframe)).map(Some)
            }
            ControlMessage::Unknown => Ok(None),
        }
    }

    /// Relay batches in arrival order until the poller side closes the
    /// channel, then drop every subscriber queue. Call from `tokio::spawn`.
    pub async fn run(self, mut batch_rx: mpsc::Receiver<ResultBatch>) {
        info!("Broadcast hub running");
        while let Some(batch) = batch_rx.recv().await {
            let delivered = self.relay(&batch).await;
            debug!(size = batch.results.len(), delivered, "Batch relayed");
        }
        warn!("Batch channel closed — disconnecting subscribers");
        self.inner.subscribers.write().await.clear();
    }
}
