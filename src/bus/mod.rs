//! Event bus for device notifications
//!
//! Uses tokio::sync::broadcast for pub/sub pattern.
//! Every state change and link transition is published here.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::model::DeviceModel;
use crate::state::{Param, Value};

/// Event types that can be published on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DeviceEvent {
    Connected { host: String },
    Disconnected { host: String, reason: String },
    /// Reconnect attempts exhausted; probing continues in the background
    Unavailable { host: String, attempts: u32 },
    ModelDetected { model: DeviceModel },
    /// `value` is `None` when the parameter was cleared
    StateChanged { param: Param, value: Option<Value> },
}

/// Event bus handle for publishing and subscribing
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DeviceEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create with default capacity (256 events)
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(256)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: DeviceEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing
pub type SharedBus = Arc<EventBus>;

pub fn create_bus() -> SharedBus {
    Arc::new(EventBus::default())
}
