//! Broadcast hub for dispatching Gateway events to connected sessions.
//!
//! One `tokio::sync::broadcast` channel per owner, created when the first
//! session for that owner subscribes and dropped once the last one leaves.
//! Sessions therefore only ever see events for their own owner.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;

/// Capacity of each owner channel. Receivers that fall further behind skip
/// messages (`RecvError::Lagged`) and are told to resync.
pub const OWNER_CHANNEL_CAPACITY: usize = 256;

/// A payload broadcast to the sessions of one owner.
#[derive(Debug, Clone)]
pub struct BroadcastPayload {
    /// The dispatch event name (e.g. "BOOKMARK_CREATE").
    pub event_name: String,
    /// Serialized event data.
    pub data: Value,
}

pub type OwnerReceiver = broadcast::Receiver<Arc<BroadcastPayload>>;

#[derive(Default)]
pub struct GatewayBroadcast {
    owners: DashMap<String, broadcast::Sender<Arc<BroadcastPayload>>>,
}

impl GatewayBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the events of `owner_id`.
    pub fn subscribe(&self, owner_id: &str) -> OwnerReceiver {
        self.owners
            .entry(owner_id.to_string())
            .or_insert_with(|| broadcast::channel(OWNER_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Dispatch an event to every session of `owner_id`. Returns how many
    /// sessions it reached.
    pub fn dispatch(&self, owner_id: &str, payload: BroadcastPayload) -> usize {
        match self.owners.get(owner_id) {
            // Err only means nobody is listening.
            Some(sender) => sender.send(Arc::new(payload)).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop the owner's channel when no session listens any more. Call after
    /// a session's receiver has been dropped.
    pub fn release(&self, owner_id: &str) {
        self.owners
            .remove_if(owner_id, |_, sender| sender.receiver_count() == 0);
    }

    /// Number of sessions currently listening for `owner_id`.
    pub fn listener_count(&self, owner_id: &str) -> usize {
        self.owners
            .get(owner_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}
