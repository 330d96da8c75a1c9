use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier handed to a peer at admission
///
/// Derived from the assigned slot (index + 1), matching what the coordinator
/// reports in WELCOME and MESSAGE frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl ClientId {
    /// Creates the client id for a given slot number
    pub fn from_slot(slot: u32) -> Self {
        ClientId(slot + 1)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Local address to bind the listener to
    pub bind_addr: SocketAddr,
    /// Maximum number of simultaneously connected peers
    pub max_peers: usize,
    /// Duration of a single transmission slot
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub slot_duration: Duration,
    /// Capacity of each peer's outbound message channel
    pub outbox_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            bind_addr: format!("0.0.0.0:{}", super::DEFAULT_PORT).parse().unwrap(),
            max_peers: super::MAX_PEERS,
            slot_duration: super::SLOT_DURATION,
            outbox_capacity: super::OUTBOX_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    /// Validates the configuration
    pub fn validate(&self) -> crate::core::Result<()> {
        if self.slot_duration.is_zero() {
            return Err(crate::core::Error::config("slot_duration must be non-zero"));
        }
        if self.max_peers == 0 {
            return Err(crate::core::Error::config("max_peers must be at least 1"));
        }
        if self.outbox_capacity == 0 {
            return Err(crate::core::Error::config("outbox_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Configuration for a peer agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Address of the coordinator
    pub server_addr: SocketAddr,
    /// Capacity of the outbound message queue
    pub queue_capacity: usize,
    /// Interval at which the transmit gate re-checks for an active slot;
    /// must stay strictly smaller than the coordinator's slot duration
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub gate_interval: Duration,
    /// Interval between synthetic payloads in load mode
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub load_interval: Duration,
    /// Interval between statistics reports in load mode
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub report_interval: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            server_addr: format!("127.0.0.1:{}", super::DEFAULT_PORT).parse().unwrap(),
            queue_capacity: super::QUEUE_CAPACITY,
            gate_interval: super::GATE_INTERVAL,
            load_interval: super::LOAD_INTERVAL,
            report_interval: super::REPORT_INTERVAL,
        }
    }
}

impl PeerConfig {
    /// Validates the configuration
    pub fn validate(&self) -> crate::core::Result<()> {
        if self.queue_capacity == 0 {
            return Err(crate::core::Error::config("queue_capacity must be at least 1"));
        }
        if self.gate_interval.is_zero() {
            return Err(crate::core::Error::config("gate_interval must be non-zero"));
        }
        Ok(())
    }
}

/// Operating mode of the peer process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerMode {
    /// Messages are typed in by the user
    Interactive,
    /// Synthetic payloads are generated on a fixed period
    Load,
}

/// Snapshot of a peer agent's mirrored timing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TdmaStatus {
    /// Slot assigned to this peer, once known
    pub my_slot: Option<u32>,
    /// Slot the coordinator last reported as active
    pub current_slot: Option<u32>,
    /// Whether the assigned slot is currently active
    pub my_turn: bool,
    /// Number of payloads waiting in the outbound queue
    pub queue_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_from_slot() {
        assert_eq!(ClientId::from_slot(0), ClientId(1));
        assert_eq!(ClientId::from_slot(4), ClientId(5));
        assert_eq!(ClientId::from_slot(2).to_string(), "3");
    }

    #[test]
    fn test_default_coordinator_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.bind_addr.port(), crate::core::DEFAULT_PORT);
        assert_eq!(config.max_peers, crate::core::MAX_PEERS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CoordinatorConfig::default();
        config.slot_duration = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = PeerConfig::default();
        assert!(config.validate().is_ok());
        config.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gate_interval_finer_than_slot() {
        let coordinator = CoordinatorConfig::default();
        let peer = PeerConfig::default();
        assert!(peer.gate_interval < coordinator.slot_duration);
        assert!(peer.load_interval < coordinator.slot_duration);
    }
}
