//! Domain event system — decoupled observation of pipeline decisions.
//!
//! Events are published when the pipeline classifies, decides, or acts.
//! Dashboards, audit logs, and tests can subscribe without coupling to the
//! components themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An inbound message was classified
    MessageClassified {
        conversation_id: String,
        kind: String,
        priority: u8,
        timestamp: DateTime<Utc>,
    },

    /// The response filter reached a decision
    ResponseDecided {
        conversation_id: String,
        respond: bool,
        reason: String,
        confidence: Option<f32>,
        timestamp: DateTime<Utc>,
    },

    /// A prefix command was dispatched
    PrefixExecuted {
        command: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// An action was executed against a capability
    ActionExecuted {
        action_id: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Memory was read for context assembly
    MemoryAccessed {
        operation: String, // "context", "search"
        count: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ResponseDecided {
            conversation_id: "general".into(),
            respond: false,
            reason: "outside_attention_window".into(),
            confidence: None,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ResponseDecided { respond, reason, .. } => {
                assert!(!respond);
                assert_eq!(reason, "outside_attention_window");
            }
            _ => panic!("Expected ResponseDecided event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::MemoryAccessed {
            operation: "search".into(),
            count: 0,
            timestamp: Utc::now(),
        });
    }
}
