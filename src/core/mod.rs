//! Core types and constants for the TDMA link
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{Error, Result};
pub use self::types::{ClientId, CoordinatorConfig, PeerConfig, PeerMode, TdmaStatus};

use std::time::Duration;

/// Default port the coordinator listens on
pub const DEFAULT_PORT: u16 = 8080;

/// Duration of a single transmission slot
pub const SLOT_DURATION: Duration = Duration::from_millis(100);

/// Maximum number of simultaneously connected peers
pub const MAX_PEERS: usize = 10;

/// Capacity of a peer agent's outbound message queue
pub const QUEUE_CAPACITY: usize = 10;

/// Capacity of each registry cell's outbound message channel
pub const OUTBOX_CAPACITY: usize = 64;

/// Interval at which the transmit gate re-checks for an active slot
pub const GATE_INTERVAL: Duration = Duration::from_millis(5);

/// Interval between synthetic payloads in load mode
pub const LOAD_INTERVAL: Duration = Duration::from_millis(33);

/// Interval between statistics reports in load mode
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum accepted length of a single wire line, terminator excluded
pub const MAX_LINE_LEN: usize = 1024;
