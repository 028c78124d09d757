//! Online/offline tracking

use serde::Serialize;

/// Network state as last reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

/// Result of feeding a network signal into the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Offline -> online; the caller should attempt a flush
    Restored,
    /// Online -> offline
    Lost,
    Unchanged,
}

#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: Connectivity,
}

impl ConnectivityMonitor {
    /// Start from the host's current network signal
    pub fn new(online: bool) -> Self {
        Self {
            state: if online {
                Connectivity::Online
            } else {
                Connectivity::Offline
            },
        }
    }

    pub fn state(&self) -> Connectivity {
        self.state
    }

    pub fn is_online(&self) -> bool {
        self.state == Connectivity::Online
    }

    /// Record a host signal and report what changed
    pub fn update(&mut self, online: bool) -> Transition {
        match (self.state, online) {
            (Connectivity::Offline, true) => {
                self.state = Connectivity::Online;
                tracing::debug!("Connectivity restored");
                Transition::Restored
            }
            (Connectivity::Online, false) => {
                self.state = Connectivity::Offline;
                tracing::debug!("Connectivity lost");
                Transition::Lost
            }
            _ => Transition::Unchanged,
        }
    }
}
