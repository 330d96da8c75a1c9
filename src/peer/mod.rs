//! Peer agent module
//!
//! This module implements the client side of the TDMA link: the mirrored
//! timing state, the bounded outbound queue, and the workers that release
//! payloads only while this peer's slot is active.

pub mod agent;
pub mod queue;

pub use self::agent::{LoadStats, PeerAgent, PeerEvent};
pub use self::queue::OutboundQueue;
