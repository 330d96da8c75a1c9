//! Coordinator module
//!
//! This module hosts the TDMA coordinator: the slot scheduler, the bounded
//! peer registry, and the control loop that ties them to the network.

pub mod registry;
pub mod scheduler;
pub mod server;

pub use self::registry::{PeerHandle, Registry};
pub use self::scheduler::Scheduler;
pub use self::server::Coordinator;
