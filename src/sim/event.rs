use super::address::Address;
use std::fmt::{self, Display};

/// Operation classes the engine understands. `Merge` is only generated
/// internally by the garbage-collection hooks; the public entry point
/// rejects it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    Read = 0,
    Write = 1,
    Erase = 2,
    Merge = 3,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Read => "Read",
            EventKind::Write => "Write",
            EventKind::Erase => "Erase",
            EventKind::Merge => "Merge",
        }
    }
}

/// One submitted request travelling through the topology. Each level adds
/// its hardware delay to `time_taken`; the channel arbiter adds any bus
/// wait on top. Created per engine call and discarded once the total
/// latency is returned.
#[derive(Clone, Debug)]
pub struct Event {
    pub kind: EventKind,
    pub logical_page: u64,
    /// Request size in flash pages (carried for diagnostics; the engine
    /// operates on one page unit per call).
    pub size: u32,
    /// Submission time in ns.
    pub start_time: i64,
    /// Accumulated service latency in ns.
    pub time_taken: i64,
    /// Portion of `time_taken` spent waiting on the channel.
    pub bus_wait_time: i64,
    pub address: Address,
    /// Target block for merges.
    pub merge_address: Option<Address>,
}

impl Event {
    pub fn new(kind: EventKind, logical_page: u64, size: u32, start_time: i64) -> Self {
        debug_assert!(start_time >= 0);
        Event {
            kind,
            logical_page,
            size,
            start_time,
            time_taken: 0,
            bus_wait_time: 0,
            address: Address::none(),
            merge_address: None,
        }
    }

    /// Only positive increments accrue; zero and negative deltas are ignored.
    pub fn incr_time_taken(&mut self, delta: i64) {
        if delta > 0 {
            self.time_taken += delta;
        }
    }

    pub fn incr_bus_wait(&mut self, delta: i64) {
        if delta > 0 {
            self.bus_wait_time += delta;
        }
    }

    /// Absolute finish time of the event so far.
    pub fn finish_time(&self) -> i64 {
        self.start_time + self.time_taken
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} lpn={} time {} [{}, {}) bus_wait: {}",
            self.kind.name(),
            self.address,
            self.logical_page,
            self.time_taken,
            self.start_time,
            self.finish_time(),
            self.bus_wait_time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_event_starts_clean() {
        let e = Event::new(EventKind::Write, 7, 1, 100);
        assert_eq!(e.time_taken, 0);
        assert_eq!(e.bus_wait_time, 0);
        assert!(e.merge_address.is_none());
    }

    #[test]
    fn test_negative_increments_ignored() {
        let mut e = Event::new(EventKind::Read, 0, 1, 0);
        e.incr_time_taken(50);
        e.incr_time_taken(-20);
        e.incr_time_taken(0);
        assert_eq!(e.time_taken, 50);
        e.incr_bus_wait(-1);
        assert_eq!(e.bus_wait_time, 0);
    }

    #[test]
    fn test_finish_time() {
        let mut e = Event::new(EventKind::Erase, 0, 1, 10);
        e.incr_time_taken(90);
        assert_eq!(e.finish_time(), 100);
    }
}
