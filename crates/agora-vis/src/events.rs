//! Messages streamed to rendering clients.

use std::sync::Arc;

use agora_model::{OpinionModel, Position};
use agora_sync::ModelSubscriber;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// An update pushed over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VisEvent {
    /// A newly published model
    Model { model: Arc<OpinionModel> },
    /// The viewer's dot moved after a local vote
    SelfMoved { x: f64, y: f64 },
    /// A client command failed
    Error { message: String },
}

impl VisEvent {
    pub fn self_moved(position: Position) -> Self {
        Self::SelfMoved {
            x: position.x,
            y: position.y,
        }
    }

    /// Encode for the wire.
    pub fn to_json(&self) -> Option<Arc<str>> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json.into()),
            Err(e) => {
                warn!(error = %e, "Failed to encode event");
                None
            }
        }
    }
}

/// Subscriber that encodes each update once and fans it out to every
/// connected client.
#[derive(Debug, Clone)]
pub struct ModelRelay {
    tx: broadcast::Sender<Arc<str>>,
}

impl ModelRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    fn publish(&self, event: &VisEvent) {
        let Some(json) = event.to_json() else { return };
        // No receivers is normal when no client is connected.
        let receivers = self.tx.send(json).unwrap_or(0);
        trace!(receivers, "Relayed update");
    }
}

impl ModelSubscriber for ModelRelay {
    fn on_model(&mut self, model: &Arc<OpinionModel>) {
        self.publish(&VisEvent::Model {
            model: Arc::clone(model),
        });
    }

    fn on_self_moved(&mut self, position: Position) {
        self.publish(&VisEvent::self_moved(position));
    }
}
