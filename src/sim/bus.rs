use super::error::SimError;
use super::event::Event;
use crate::config::{BusProtocol, SsdConfig};

/// One scheduled transfer window on a channel.
#[derive(Clone, Copy, Debug)]
struct Window {
    lock: i64,
    unlock: i64,
}

/// A single bus channel shared by the dies it serves. Transfers are
/// serialized: the arbiter grants each one a start time and charges the
/// wait between submission and grant to the event.
#[derive(Clone, Debug)]
pub struct Channel {
    index: u32,
    /// FIFO protocol state: the end of the last granted window. Zero until
    /// the first grant, which is indistinguishable from "free since boot".
    unlock: i64,
    lock: i64,
    /// Table protocol state: outstanding windows sorted by unlock time.
    table: Vec<Window>,
    num_connected: u32,
}

impl Channel {
    fn new(index: u32) -> Self {
        Channel {
            index,
            unlock: 0,
            lock: 0,
            table: Vec::new(),
            num_connected: 0,
        }
    }

    /// Register a device on this channel. Not load-bearing for the timing
    /// model, but catches topologies that oversubscribe a channel.
    pub fn connect(&mut self, cfg: &SsdConfig) -> Result<(), SimError> {
        if self.num_connected >= cfg.bus_max_connect {
            error!(
                "channel {}: {} devices already connected",
                self.index, self.num_connected
            );
            return Err(SimError::BusSaturated(self.index));
        }
        self.num_connected += 1;
        Ok(())
    }

    pub fn connected(&self) -> u32 {
        self.num_connected
    }

    /// Grant the channel to an event for `duration` ns, charging any wait
    /// to the event's `bus_wait_time` and `time_taken`.
    pub fn lock(
        &mut self,
        start_time: i64,
        duration: i64,
        event: &mut Event,
        cfg: &SsdConfig,
    ) -> Result<(), SimError> {
        debug_assert!(start_time >= 0 && duration > 0);
        match cfg.bus_protocol {
            BusProtocol::Fifo => {
                self.lock_fifo(start_time, duration, event);
                Ok(())
            }
            BusProtocol::Table => self.lock_table(start_time, duration, event, cfg),
        }
    }

    /// Monotonic cursor: the transfer starts when the previous one ends.
    /// Strict FIFO, unbounded queueing, never rejects.
    fn lock_fifo(&mut self, start_time: i64, duration: i64, event: &mut Event) {
        let sched = self.unlock.max(start_time);
        self.lock = sched;
        self.unlock = sched + duration;
        event.incr_bus_wait(sched - start_time);
        event.incr_time_taken(sched - start_time);
    }

    /// Scheduling table: place the transfer in the earliest gap that fits,
    /// before or between outstanding windows, else after the last one. A
    /// full table costs the event a double erase penalty, flushes the
    /// table, and rejects the transfer.
    fn lock_table(
        &mut self,
        start_time: i64,
        duration: i64,
        event: &mut Event,
        cfg: &SsdConfig,
    ) -> Result<(), SimError> {
        self.table.retain(|w| w.unlock > start_time);

        if self.table.len() >= cfg.bus_table_size as usize {
            event.incr_time_taken(2 * cfg.block_erase_delay);
            self.table.clear();
            return Err(SimError::BusSaturated(self.index));
        }

        let sched = if self.table.is_empty() {
            start_time
        } else if self.table[0].lock - start_time >= duration && self.table[0].lock > start_time {
            // fits before the first outstanding window
            start_time
        } else {
            self.table
                .windows(2)
                .find(|w| w[1].lock - w[0].unlock >= duration)
                .map(|w| w[0].unlock)
                .unwrap_or_else(|| self.table.last().unwrap().unlock)
        };

        let window = Window {
            lock: sched,
            unlock: sched + duration,
        };
        let pos = self
            .table
            .iter()
            .position(|w| w.unlock > window.unlock)
            .unwrap_or(self.table.len());
        self.table.insert(pos, window);

        event.incr_bus_wait(sched - start_time);
        event.incr_time_taken(sched - start_time);
        Ok(())
    }

    pub fn next_unlock(&self) -> i64 {
        self.unlock
    }
}

/// Multi-channel bus: independent channels operating in parallel, one per
/// package position. The engine locks the channel an address routes to for
/// the full service time of the event.
#[derive(Clone, Debug)]
pub struct Bus {
    channels: Vec<Channel>,
}

impl Bus {
    pub fn new(cfg: &SsdConfig) -> Self {
        Bus {
            channels: (0..cfg.num_channels()).map(Channel::new).collect(),
        }
    }

    pub fn connect(&mut self, channel: u32, cfg: &SsdConfig) -> Result<(), SimError> {
        self.channels[channel as usize].connect(cfg)
    }

    pub fn lock(
        &mut self,
        channel: u32,
        start_time: i64,
        duration: i64,
        event: &mut Event,
        cfg: &SsdConfig,
    ) -> Result<(), SimError> {
        debug_assert!((channel as usize) < self.channels.len());
        self.channels[channel as usize].lock(start_time, duration, event, cfg)
    }

    pub fn channel(&self, channel: u32) -> &Channel {
        &self.channels[channel as usize]
    }

    pub fn num_channels(&self) -> u32 {
        self.channels.len() as u32
    }
}
