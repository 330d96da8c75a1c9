use std::time::Duration;

use crate::core::ClientId;
use crate::util::{duration_to_millis, millis_to_duration};

/// Protocol message kinds exchanged between coordinator and peers
///
/// Every message is one newline-terminated line of pipe-delimited key=value
/// fields. Durations travel as whole milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Sent once at admission with the peer's identity and slot assignment
    Welcome {
        /// Identifier assigned to the peer
        client_id: ClientId,
        /// Slot assigned to the peer
        slot: u32,
        /// Duration of a single slot
        slot_duration: Duration,
    },

    /// Timing snapshot for one peer
    Timing {
        /// The peer's assigned slot
        slot: u32,
        /// Duration of a single slot
        slot_duration: Duration,
        /// Current frame number
        frame: u64,
        /// Wait until the peer's slot becomes active
        time_to_slot: Duration,
        /// Number of slots in the current frame, absent in older frames
        active_slots: Option<u32>,
    },

    /// Slot-change notice to the peer whose slot just became active
    YourTurn {
        /// The now-active slot
        slot: u32,
        /// How long the slot remains open
        duration: Duration,
        /// Number of slots in the current frame, absent in older frames
        active_slots: Option<u32>,
    },

    /// Slot-change notice to every peer whose slot is not active
    WaitTurn {
        /// The now-active slot
        current_slot: u32,
        /// The receiving peer's assigned slot
        your_slot: u32,
        /// Wait until the receiving peer's slot becomes active
        wait_time: Duration,
        /// Number of slots in the current frame, absent in older frames
        active_slots: Option<u32>,
    },

    /// An accepted transmission relayed to the other peers
    Relay {
        /// Identifier of the sending peer
        from: ClientId,
        /// Slot the transmission was accepted in
        slot: u32,
        /// The payload, verbatim
        text: String,
    },

    /// Out-of-slot transmission notice, sent to the offender alone
    Collision {
        /// The offender's assigned slot
        your_slot: u32,
        /// The slot that was actually active
        current_slot: u32,
    },

    /// A line that did not parse as any protocol frame, surfaced verbatim
    Opaque(String),
}

impl Message {
    /// Encodes the message as a single wire line, terminator excluded
    pub fn encode(&self) -> String {
        match self {
            Message::Welcome {
                client_id,
                slot,
                slot_duration,
            } => format!(
                "WELCOME|client_id={}|slot={}|slot_duration={}",
                client_id,
                slot,
                duration_to_millis(*slot_duration)
            ),
            Message::Timing {
                slot,
                slot_duration,
                frame,
                time_to_slot,
                active_slots,
            } => {
                let mut line = format!(
                    "TDMA_INFO|slot={}|slot_duration={}|frame={}|time_to_slot={}",
                    slot,
                    duration_to_millis(*slot_duration),
                    frame,
                    duration_to_millis(*time_to_slot)
                );
                if let Some(n) = active_slots {
                    line.push_str(&format!("|active_slots={}", n));
                }
                line
            }
            Message::YourTurn {
                slot,
                duration,
                active_slots,
            } => {
                let mut line = format!(
                    "SLOT_ACTIVE|your_turn=1|slot={}|duration={}",
                    slot,
                    duration_to_millis(*duration)
                );
                if let Some(n) = active_slots {
                    line.push_str(&format!("|active_slots={}", n));
                }
                line
            }
            Message::WaitTurn {
                current_slot,
                your_slot,
                wait_time,
                active_slots,
            } => {
                let mut line = format!(
                    "SLOT_ACTIVE|your_turn=0|current_slot={}|your_slot={}|wait_time={}",
                    current_slot,
                    your_slot,
                    duration_to_millis(*wait_time)
                );
                if let Some(n) = active_slots {
                    line.push_str(&format!("|active_slots={}", n));
                }
                line
            }
            Message::Relay { from, slot, text } => {
                format!("MESSAGE|from={}|slot={}|text={}", from, slot, text)
            }
            Message::Collision {
                your_slot,
                current_slot,
            } => format!(
                "COLLISION|your_slot={}|current_slot={}|message_dropped",
                your_slot, current_slot
            ),
            Message::Opaque(text) => text.clone(),
        }
    }

    /// Parses a wire line
    ///
    /// The parser is strict about frames that claim a known tag, but its
    /// failure mode is pass-through: anything that does not validate comes
    /// back as [`Message::Opaque`] carrying the line verbatim.
    pub fn parse(line: &str) -> Message {
        Self::try_parse(line).unwrap_or_else(|| Message::Opaque(line.to_string()))
    }

    fn try_parse(line: &str) -> Option<Message> {
        let (tag, rest) = line.split_once('|')?;
        match tag {
            "WELCOME" => {
                let fields = Fields::new(rest);
                Some(Message::Welcome {
                    client_id: ClientId(fields.get("client_id")?),
                    slot: fields.get("slot")?,
                    slot_duration: millis_to_duration(fields.get("slot_duration")?),
                })
            }
            "TDMA_INFO" => {
                let fields = Fields::new(rest);
                Some(Message::Timing {
                    slot: fields.get("slot")?,
                    slot_duration: millis_to_duration(fields.get("slot_duration")?),
                    frame: fields.get("frame")?,
                    time_to_slot: millis_to_duration(fields.get("time_to_slot")?),
                    active_slots: fields.get("active_slots"),
                })
            }
            "SLOT_ACTIVE" => {
                let fields = Fields::new(rest);
                match fields.get::<u8>("your_turn")? {
                    1 => Some(Message::YourTurn {
                        slot: fields.get("slot")?,
                        duration: millis_to_duration(fields.get("duration")?),
                        active_slots: fields.get("active_slots"),
                    }),
                    0 => Some(Message::WaitTurn {
                        current_slot: fields.get("current_slot")?,
                        your_slot: fields.get("your_slot")?,
                        wait_time: millis_to_duration(fields.get("wait_time")?),
                        active_slots: fields.get("active_slots"),
                    }),
                    _ => None,
                }
            }
            "MESSAGE" => {
                // The payload is verbatim and may itself contain delimiters,
                // so the leading fields are peeled off positionally.
                let (from, rest) = rest.split_once('|')?;
                let (slot, text) = rest.split_once('|')?;
                Some(Message::Relay {
                    from: ClientId(from.strip_prefix("from=")?.parse().ok()?),
                    slot: slot.strip_prefix("slot=")?.parse().ok()?,
                    text: text.strip_prefix("text=")?.to_string(),
                })
            }
            "COLLISION" => {
                let fields = Fields::new(rest);
                Some(Message::Collision {
                    your_slot: fields.get("your_slot")?,
                    current_slot: fields.get("current_slot")?,
                })
            }
            _ => None,
        }
    }
}

/// Pipe-delimited key=value field accessor
struct Fields<'a>(Vec<(&'a str, &'a str)>);

impl<'a> Fields<'a> {
    fn new(rest: &'a str) -> Self {
        // Segments without '=' (such as COLLISION's message_dropped flag)
        // carry no value and are skipped.
        Fields(rest.split('|').filter_map(|seg| seg.split_once('=')).collect())
    }

    fn get<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let (_, value) = self.0.iter().find(|(k, _)| *k == key)?;
        value.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_wire_form() {
        let msg = Message::Welcome {
            client_id: ClientId(1),
            slot: 0,
            slot_duration: Duration::from_millis(100),
        };
        assert_eq!(msg.encode(), "WELCOME|client_id=1|slot=0|slot_duration=100");
    }

    #[test]
    fn test_welcome_round_trip() {
        let msg = Message::Welcome {
            client_id: ClientId(3),
            slot: 2,
            slot_duration: Duration::from_millis(100),
        };
        assert_eq!(Message::parse(&msg.encode()), msg);
    }

    #[test]
    fn test_timing_round_trip() {
        let msg = Message::Timing {
            slot: 1,
            slot_duration: Duration::from_millis(100),
            frame: 42,
            time_to_slot: Duration::from_millis(70),
            active_slots: Some(3),
        };
        assert_eq!(
            msg.encode(),
            "TDMA_INFO|slot=1|slot_duration=100|frame=42|time_to_slot=70|active_slots=3"
        );
        assert_eq!(Message::parse(&msg.encode()), msg);
    }

    #[test]
    fn test_timing_without_active_slots() {
        let parsed = Message::parse("TDMA_INFO|slot=0|slot_duration=100|frame=7|time_to_slot=30");
        assert_eq!(
            parsed,
            Message::Timing {
                slot: 0,
                slot_duration: Duration::from_millis(100),
                frame: 7,
                time_to_slot: Duration::from_millis(30),
                active_slots: None,
            }
        );
    }

    #[test]
    fn test_slot_active_turn_round_trip() {
        let msg = Message::YourTurn {
            slot: 2,
            duration: Duration::from_millis(100),
            active_slots: Some(3),
        };
        assert_eq!(
            msg.encode(),
            "SLOT_ACTIVE|your_turn=1|slot=2|duration=100|active_slots=3"
        );
        assert_eq!(Message::parse(&msg.encode()), msg);
    }

    #[test]
    fn test_slot_active_wait_round_trip() {
        let msg = Message::WaitTurn {
            current_slot: 0,
            your_slot: 2,
            wait_time: Duration::from_millis(200),
            active_slots: Some(3),
        };
        assert_eq!(
            msg.encode(),
            "SLOT_ACTIVE|your_turn=0|current_slot=0|your_slot=2|wait_time=200|active_slots=3"
        );
        assert_eq!(Message::parse(&msg.encode()), msg);
    }

    #[test]
    fn test_relay_text_keeps_delimiters() {
        let msg = Message::Relay {
            from: ClientId(2),
            slot: 1,
            text: "a|b=c|text=d".to_string(),
        };
        assert_eq!(Message::parse(&msg.encode()), msg);
    }

    #[test]
    fn test_collision_round_trip() {
        let msg = Message::Collision {
            your_slot: 1,
            current_slot: 0,
        };
        assert_eq!(
            msg.encode(),
            "COLLISION|your_slot=1|current_slot=0|message_dropped"
        );
        assert_eq!(Message::parse(&msg.encode()), msg);
    }

    #[test]
    fn test_unknown_tag_passes_through() {
        let parsed = Message::parse("hello out there");
        assert_eq!(parsed, Message::Opaque("hello out there".to_string()));
    }

    #[test]
    fn test_malformed_known_tag_passes_through() {
        let line = "WELCOME|client_id=abc|slot=0|slot_duration=100";
        assert_eq!(Message::parse(line), Message::Opaque(line.to_string()));

        let line = "SLOT_ACTIVE|your_turn=2|slot=0";
        assert_eq!(Message::parse(line), Message::Opaque(line.to_string()));
    }
}
