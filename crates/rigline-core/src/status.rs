// ── Agent status snapshot ──
//
// One `watch` channel holds the whole `AgentStatus`. Every writer rebuilds
// the full value inside `send_if_modified`, so readers only ever see
// complete snapshots, and unchanged telemetry ticks wake nobody.

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimStatus {
    pub connected: bool,
    pub lap: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApiStatus {
    pub connected: bool,
    pub laps_recorded: u64,
}

/// Point-in-time view of the agent, as shown by front ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgentStatus {
    pub iracing: SimStatus,
    pub api: ApiStatus,
}

/// Owner of the status channel.
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<AgentStatus>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AgentStatus::default());
        Self { tx }
    }

    pub fn snapshot(&self) -> AgentStatus {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentStatus> {
        self.tx.subscribe()
    }

    pub fn set_sim(&self, iracing: SimStatus) {
        self.publish(|current| AgentStatus { iracing, ..current });
    }

    pub fn set_api_connected(&self, connected: bool) {
        self.publish(|current| AgentStatus {
            api: ApiStatus {
                connected,
                ..current.api
            },
            ..current
        });
    }

    pub fn record_lap_uploaded(&self) {
        self.publish(|current| AgentStatus {
            api: ApiStatus {
                laps_recorded: current.api.laps_recorded + 1,
                ..current.api
            },
            ..current
        });
    }

    fn publish(&self, rebuild: impl FnOnce(AgentStatus) -> AgentStatus) {
        self.tx.send_if_modified(|status| {
            let next = rebuild(*status);
            if next == *status {
                false
            } else {
                *status = next;
                true
            }
        });
    }
}
