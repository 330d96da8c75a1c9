use std::time::{Duration, Instant};

/// Frame/slot clock for the TDMA schedule
///
/// Tracks which slot is active purely as a function of elapsed wall-clock
/// time and the current slot count. Holds the invariants: `slot_count >= 1`
/// and `current_slot < slot_count` in every reachable state.
#[derive(Debug)]
pub struct Scheduler {
    frame_number: u64,
    frame_start: Instant,
    slot_duration: Duration,
    slot_count: u32,
    current_slot: u32,
}

impl Scheduler {
    /// Creates a scheduler starting its first frame at `now`
    ///
    /// Starts with a single slot so the schedule is well-defined before any
    /// peer is admitted.
    pub fn new(slot_duration: Duration, now: Instant) -> Self {
        Scheduler {
            frame_number: 0,
            frame_start: now,
            slot_duration,
            slot_count: 1,
            current_slot: 0,
        }
    }

    /// Advances the clock to `now`
    ///
    /// Recomputes the active slot from elapsed time; once a full frame has
    /// elapsed, the frame number increments and the frame restarts at `now`
    /// with slot 0. Returns whether the active slot changed. Idempotent for
    /// repeated calls at the same instant.
    pub fn tick(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.frame_start);
        let frame_duration = self.slot_duration * self.slot_count;
        let previous = self.current_slot;

        if elapsed >= frame_duration {
            self.frame_number += 1;
            self.frame_start = now;
            self.current_slot = 0;
        } else {
            let slot_index = elapsed.as_nanos() / self.slot_duration.as_nanos();
            self.current_slot = (slot_index % u128::from(self.slot_count)) as u32;
        }

        self.current_slot != previous
    }

    /// Adjusts the slot count to the active peer count
    ///
    /// The count never drops below one, and the active slot is reduced into
    /// the new range so the slot invariant holds between here and the next
    /// tick.
    pub fn resize(&mut self, active_peer_count: usize) {
        self.slot_count = active_peer_count.max(1) as u32;
        self.current_slot %= self.slot_count;
    }

    /// Time remaining in the currently active slot
    pub fn time_until_next_slot(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.frame_start);
        let slot_nanos = self.slot_duration.as_nanos();
        let into_slot = elapsed.as_nanos() % slot_nanos;
        Duration::from_nanos((slot_nanos - into_slot) as u64)
    }

    /// Wait time until the given slot becomes active
    ///
    /// For the active slot itself this is the remaining time in the slot;
    /// for a slot already passed this frame it wraps around into the next
    /// frame.
    pub fn time_until(&self, slot: u32, now: Instant) -> Duration {
        if slot == self.current_slot {
            self.time_until_next_slot(now)
        } else if slot > self.current_slot {
            self.slot_duration * (slot - self.current_slot)
        } else {
            self.slot_duration * (self.slot_count - self.current_slot + slot)
        }
    }

    /// Currently active slot
    pub fn current_slot(&self) -> u32 {
        self.current_slot
    }

    /// Current frame number
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Number of slots in the current frame
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    /// Duration of a single slot
    pub fn slot_duration(&self) -> Duration {
        self.slot_duration
    }
}
