//! Event bus: broadcast fan-out of `AppEvent`s with per-server subscriptions.
//!
//! The registry and the flow executor emit through `AppEventEmitter`;
//! consumers subscribe here. Instances are explicit and passed around, there
//! is no global bus.

use flowmcp_core::{AppEvent, AppEventEmitter};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default broadcast channel capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// Broadcaster for application events. Clones share one channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to the events of one server.
    pub fn subscribe_server(&self, server_name: impl Into<String>) -> ServerEvents {
        ServerEvents {
            server_name: server_name.into(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AppEventEmitter for EventBus {
    fn emit(&self, event: AppEvent) {
        // Only log if there are receivers
        if self.sender.receiver_count() > 0 {
            debug!(event = event.event_name(), server_name = ?event.server_name(), "Broadcasting event");
            let _ = self.sender.send(event);
        }
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}

/// Receiver filtered to a single server name.
#[derive(Debug)]
pub struct ServerEvents {
    server_name: String,
    receiver: broadcast::Receiver<AppEvent>,
}

impl ServerEvents {
    /// Next event for this server, or `None` once the bus is gone.
    ///
    /// A slow subscriber that lags behind skips the lost events and keeps going.
    pub async fn recv(&mut self) -> Option<AppEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.server_name() == Some(self.server_name.as_str()) => {
                    return Some(event);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(server_name = %self.server_name, skipped, "Event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

#[cfg(test)]
mod tests {
    use flowmcp_core::{ConnectionStatus, TransportKind};

    use super::*;

    #[tokio::test]
    async fn test_server_subscription_filters_other_servers() {
        let bus = EventBus::default();
        let mut calc = bus.subscribe_server("calc");

        bus.emit(AppEvent::mcp_status_changed(
            "files",
            ConnectionStatus::Connecting,
            None,
        ));
        bus.emit(AppEvent::mcp_server_added("calc", TransportKind::Stdio));

        let event = calc.recv().await.unwrap();
        assert_eq!(event.event_name(), "mcp:added");
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.emit(AppEvent::mcp_server_removed("calc"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_bus_ends_stream() {
        let bus = EventBus::new(4);
        let mut events = bus.subscribe_server("calc");
        drop(bus);
        assert!(events.recv().await.is_none());
    }
}
