// Copyright 2026 Dropcart Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dropcart event bus: typed events from tasks, the orchestrator and the feed.
//!
//! The EventBus is a `tokio::sync::broadcast` channel carrying
//! [`DropcartEvent`] values. The CLI prints them with `--json`; tests
//! subscribe to observe task progress. Events sent with no subscribers
//! are dropped.

use dropcart::{CheckoutRecord, StatusLevel};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::checkout::CheckoutState;

/// Every event the runtime emits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DropcartEvent {
    // ── Task Events ───────────────────────
    /// A task driver loop started.
    TaskStarted {
        task: String,
        site: String,
        mode: String,
    },
    /// A task status changed.
    StatusChanged {
        task: String,
        state: CheckoutState,
        message: String,
        level: StatusLevel,
    },
    /// A payment attempt reached a reportable outcome.
    CheckoutFinished { task: String, record: CheckoutRecord },
    /// A task driver loop exited.
    TaskStopped { task: String },

    // ── Automation Events ─────────────────
    /// A live product matched an automation rule.
    AutomationMatched {
        rule: String,
        store: String,
        product: String,
        variants: usize,
    },

    // ── Feed Events ───────────────────────
    /// Connected to the live product feed.
    FeedConnected { url: String },
    /// Lost the live product feed connection.
    FeedDisconnected { url: String, reason: String },
}

/// The central event bus.
pub struct EventBus {
    sender: broadcast::Sender<DropcartEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: DropcartEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<DropcartEvent> {
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

    #[test]
    fn test_event_serialization() {
        let event = DropcartEvent::StatusChanged {
            task: "a1b2c3d4".to_string(),
            state: CheckoutState::AddingToCart,
            message: "Adding To Cart".to_string(),
            level: StatusLevel::Info,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"StatusChanged\""));
        assert!(json.contains("AddingToCart"));

        let parsed: DropcartEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            DropcartEvent::StatusChanged { task, .. } => assert_eq!(task, "a1b2c3d4"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_event_bus_emit_no_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(DropcartEvent::TaskStopped {
            task: "t".to_string(),
        });
    }

    #[test]
    fn test_event_bus_subscribe_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(DropcartEvent::FeedConnected {
            url: "wss://feed.example.com".to_string(),
        });

        match rx.try_recv().unwrap() {
            DropcartEvent::FeedConnected { url } => assert_eq!(url, "wss://feed.example.com"),
            _ => panic!("wrong event"),
        }
    }
}
