//! Protocol implementation module
//!
//! This module defines the TDMA wire messages and the newline-delimited
//! framing shared by the coordinator and the peer agent.

pub mod codec;
pub mod message;

pub use self::codec::{LineCodec, MessageCodec};
pub use self::message::Message;
