//! Events the engine publishes to audio and presentation subscribers.

use crate::service::DataStatus;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Who asked for a bell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FireOrigin {
    Auto,
    Manual,
}

impl std::fmt::Display for FireOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FireOrigin::Auto => f.write_str("auto"),
            FireOrigin::Manual => f.write_str("manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EngineEvent {
    /// Ring the bell `strike_count` times
    #[serde(rename_all = "camelCase")]
    Fire {
        strike_count: u32,
        origin: FireOrigin,
    },
    /// Silence any strike sequence in progress
    Stop,
    /// The alarm store was replaced or pruned
    #[serde(rename_all = "camelCase")]
    ScheduleChanged { alarm_count: usize },
    /// The data freshness status changed
    StatusChanged { status: DataStatus },
}

/// Broadcast channel for [`EngineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn emit(&self, event: EngineEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!("No subscribers for event {:?}", event);
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
