//! Event hub
//!
//! Single in-process fan-out point for peer and transfer state changes.
//! Every subscriber owns a bounded queue; `publish` never waits on a
//! subscriber. A subscriber whose queue is closed or full is dropped from the
//! hub, which ends its stream.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Peer, Transfer};

/// Events delivered to observers over the WebSocket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    PeerDiscovered(Peer),
    PeerOffline(Peer),
    TransferRequest(Transfer),
    TransferAccepted(Transfer),
    TransferRejected(Transfer),
    TransferCompleted(Transfer),
    TransferFailed(Transfer),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::PeerDiscovered(_) => "peer_discovered",
            Event::PeerOffline(_) => "peer_offline",
            Event::TransferRequest(_) => "transfer_request",
            Event::TransferAccepted(_) => "transfer_accepted",
            Event::TransferRejected(_) => "transfer_rejected",
            Event::TransferCompleted(_) => "transfer_completed",
            Event::TransferFailed(_) => "transfer_failed",
        }
    }
}

pub type SubscriberId = Uuid;

/// Receiving end handed to one observer
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event, or `None` once the hub has dropped this subscriber
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

#[derive(Clone)]
pub struct EventHub {
    subscribers: Arc<Mutex<HashMap<SubscriberId, mpsc::Sender<Event>>>>,
    capacity: usize,
}

impl EventHub {
    /// `capacity` bounds each subscriber's queue.
    ///
    /// Size it for the largest burst an observer must absorb: the first sweep
    /// of a crowded /24 publishes one `peer_discovered` per host, up to 253
    /// per interface, faster than a WebSocket drains them.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();

        let mut subscribers = self.subscribers.lock().await;
        subscribers.insert(id, tx);
        metrics::gauge!("lanshare_hub_subscribers", subscribers.len() as f64);
        debug!(subscriber = %id, "Observer subscribed");

        Subscription { id, rx }
    }

    /// Returns whether the subscriber was still registered
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock().await;
        let removed = subscribers.remove(&id).is_some();
        metrics::gauge!("lanshare_hub_subscribers", subscribers.len() as f64);
        if removed {
            debug!(subscriber = %id, "Observer unsubscribed");
        }
        removed
    }

    /// Deliver `event` to every current subscriber, in call order.
    ///
    /// Returns the number of subscribers that received it.
    pub async fn publish(&self, event: Event) -> usize {
        let mut subscribers = self.subscribers.lock().await;
        let mut dropped = Vec::new();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = %id, event = event.kind(), "Observer stalled, dropping it");
                    metrics::counter!("lanshare_hub_evicted_total", 1);
                    dropped.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dropped.push(*id);
                }
            }
        }

        for id in &dropped {
            subscribers.remove(id);
        }
        if !dropped.is_empty() {
            metrics::gauge!("lanshare_hub_subscribers", subscribers.len() as f64);
        }

        debug!(event = event.kind(), delivered = subscribers.len(), "Event published");
        subscribers.len()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}
