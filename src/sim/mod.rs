//! The flash timing core: a static Package/Die/Plane/Block/Page tree, a
//! multi-channel bus arbiter, and the event engine that turns one request
//! into a service latency in nanoseconds.

use crate::config::SsdConfig;

pub mod address;
mod block;
mod bus;
mod die;
mod error;
mod event;
mod package;
mod plane;

pub use address::{Address, Level};
pub use block::{BlockState, PageState};
pub use error::SimError;
pub use event::{Event, EventKind};

use bus::Bus;
use package::Package;

/// The simulated device. Owns the whole topology and the bus; every piece
/// of mutable latency state lives under it, so two devices never interfere.
///
/// Callers must serialize calls per device; the struct takes `&mut self`
/// and the hosting layer wraps it in its simulation lock.
pub struct Ssd {
    cfg: SsdConfig,
    packages: Vec<Package>,
    bus: Bus,
    least_worn: u32,
    erases_remaining: u64,
    last_erase_time: i64,
}

impl Ssd {
    pub fn new(cfg: SsdConfig) -> Self {
        if let Err(msg) = cfg.validate() {
            panic!("invalid SSD configuration: {}", msg);
        }
        let mut bus = Bus::new(&cfg);
        let packages: Vec<Package> = (0..cfg.ssd_size)
            .map(|i| Package::new(&cfg, i))
            .collect();
        // every die of package i registers on channel i
        for i in 0..cfg.ssd_size {
            for _ in 0..cfg.package_size {
                if bus.connect(i, &cfg).is_err() {
                    error!("die unable to connect to channel {}", i);
                }
            }
        }
        let erases_remaining = cfg.block_erases;
        Ssd {
            cfg,
            packages,
            bus,
            least_worn: 0,
            erases_remaining,
            last_erase_time: 0,
        }
    }

    /// Service one request and return its total latency in ns, bus wait
    /// included. Side effects: page/block/plane state, the plane cursor,
    /// wear statistics, and the channel schedule all advance.
    ///
    /// `Merge` is not accepted here; it only runs through [`Ssd::merge`].
    pub fn event_arrive(
        &mut self,
        kind: EventKind,
        logical_page: u64,
        size: u32,
        start_time: i64,
    ) -> Result<i64, SimError> {
        assert!(start_time >= 0);
        if logical_page > self.cfg.total_pages() {
            return Err(SimError::Range(logical_page));
        }

        let mut event = Event::new(kind, logical_page, size, start_time);
        event.address = Address::decode(logical_page, &self.cfg);
        let channel = event.address.channel(&self.cfg);
        let package = event.address.package as usize;

        // the controller charges bus control + data up front; the grant
        // below stretches the window by any wait
        event.incr_time_taken(self.cfg.bus_ctrl_delay + self.cfg.bus_data_delay);

        let result = match kind {
            EventKind::Read => self.packages[package].read(&mut event, &self.cfg),
            EventKind::Write => self.packages[package].write(&mut event, &self.cfg),
            EventKind::Erase => {
                let r = self.packages[package].erase(&mut event, &self.cfg);
                if r.is_ok() {
                    self.update_wear_stats();
                }
                r
            }
            EventKind::Merge => Err(SimError::InvalidKind(kind as u8)),
        };
        if let Err(e) = result {
            error!("{} request failed: {} ({})", event.kind.name(), event, e);
            return Err(e);
        }

        self.bus
            .lock(channel, start_time, event.time_taken, &mut event, &self.cfg)?;
        trace!("{}", event);
        Ok(event.time_taken)
    }

    /// Garbage-collection hook: fold the VALID pages of `address`'s block
    /// into `merge_address`'s block. Source and target must share a plane;
    /// cross-plane merges are refused.
    pub fn merge(
        &mut self,
        address: Address,
        merge_address: Address,
        start_time: i64,
    ) -> Result<i64, SimError> {
        assert!(start_time >= 0);
        let mut event = Event::new(EventKind::Merge, 0, 1, start_time);
        event.address = address;
        event.merge_address = Some(merge_address);
        // merges only move a control signal over the bus
        event.incr_time_taken(self.cfg.bus_ctrl_delay);
        self.packages[address.package as usize].merge(&mut event, &self.cfg)?;
        let channel = address.channel(&self.cfg);
        self.bus
            .lock(channel, start_time, event.time_taken, &mut event, &self.cfg)?;
        Ok(event.time_taken)
    }

    /// Allocation hook: the plane cursor for the plane `address` points
    /// into, lifted to a full address. `level` is `Page` when the plane
    /// still has an EMPTY slot, `Plane` when it is full.
    pub fn free_page(&self, address: &Address) -> Address {
        debug_assert!(address.level >= Level::Plane);
        let cursor = self.packages[address.package as usize].free_page(address);
        Address {
            package: address.package,
            die: address.die,
            plane: address.plane,
            block: cursor.block,
            page: cursor.page,
            level: cursor.level,
        }
    }

    fn update_wear_stats(&mut self) {
        let mut max_index = 0;
        let mut max = self.packages[0].erases_remaining();
        for (i, package) in self.packages.iter().enumerate().skip(1) {
            if package.erases_remaining() > max {
                max = package.erases_remaining();
                max_index = i;
            }
        }
        self.least_worn = max_index as u32;
        self.erases_remaining = max;
        self.last_erase_time = self.packages[max_index].last_erase_time();
    }

    pub fn config(&self) -> &SsdConfig {
        &self.cfg
    }

    pub fn package(&self, index: u32) -> &Package {
        &self.packages[index as usize]
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn erases_remaining(&self) -> u64 {
        self.erases_remaining
    }

    pub fn last_erase_time(&self) -> i64 {
        self.last_erase_time
    }

    pub fn least_worn(&self) -> u32 {
        self.least_worn
    }
}
