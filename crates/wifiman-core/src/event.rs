// ── Service events ──
//
// Asynchronous notifications fanned out over a `broadcast` channel. The
// connect result is delivered here as `AttemptResolved`; scans announce
// their start and outcome. Slow subscribers lag and drop old events,
// they never block the producers.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{CoreError, ErrorCode};
use crate::model::ConnectionAttempt;

/// Capacity of the event channel. Lagging receivers skip ahead.
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServiceEvent {
    ScanStarted,
    ScanCompleted {
        observed: usize,
        added: usize,
        removed: usize,
        total: usize,
    },
    ScanFailed {
        error: ErrorCode,
        message: String,
    },
    AttemptStarted {
        attempt: ConnectionAttempt,
    },
    AttemptResolved {
        attempt: ConnectionAttempt,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorCode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Disconnected {
        ssid: String,
    },
    FavoriteChanged {
        ssid: String,
        favorite: bool,
    },
    CredentialSaved {
        ssid: String,
    },
    CredentialDeleted {
        ssid: String,
    },
}

impl ServiceEvent {
    pub(crate) fn resolved(attempt: ConnectionAttempt, outcome: &Result<(), CoreError>) -> Self {
        match outcome {
            Ok(()) => Self::AttemptResolved {
                attempt,
                error: None,
                message: None,
            },
            Err(e) => Self::AttemptResolved {
                attempt,
                error: Some(e.code()),
                message: Some(e.to_string()),
            },
        }
    }
}

/// Sending half shared by the scan coordinator and connection manager.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServiceEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn emit(&self, event: ServiceEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(ServiceEvent::FavoriteChanged {
            ssid: "Home".into(),
            favorite: true,
        })
        .expect("serialize");
        assert_eq!(json["event"], "favoriteChanged");
        assert_eq!(json["ssid"], "Home");
        assert_eq!(json["favorite"], true);
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.emit(ServiceEvent::ScanStarted);
        let mut rx = bus.subscribe();
        bus.emit(ServiceEvent::ScanStarted);
        assert_eq!(rx.try_recv().expect("event"), ServiceEvent::ScanStarted);
    }
}
