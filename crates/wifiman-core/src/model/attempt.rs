// ── Connection attempt ──
//
// Transient record for the single live connect attempt. Owned by the
// connection manager; consumers only ever see clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

pub type AttemptId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttemptState {
    Pending,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAttempt {
    pub id: AttemptId,
    pub ssid: String,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub state: AttemptState,
}

impl ConnectionAttempt {
    pub(crate) fn new(ssid: &str, timeout: std::time::Duration) -> Self {
        let started_at = Utc::now();
        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|d| started_at.checked_add_signed(d))
            .unwrap_or(started_at);
        Self {
            id: Uuid::new_v4(),
            ssid: ssid.to_owned(),
            started_at,
            deadline,
            state: AttemptState::Pending,
        }
    }
}
