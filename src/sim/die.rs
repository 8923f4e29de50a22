use super::address::{Address, Level};
use super::error::SimError;
use super::event::Event;
use super::plane::Plane;
use crate::config::SsdConfig;

/// One flash chip: a set of planes bound to a single bus channel. All dies
/// of a package register on the package's channel at build time.
#[derive(Clone, Debug)]
pub struct Die {
    planes: Vec<Plane>,
    channel: u32,
    least_worn: u32,
    erases_remaining: u64,
    last_erase_time: i64,
}

impl Die {
    pub fn new(cfg: &SsdConfig, channel: u32) -> Self {
        Die {
            planes: (0..cfg.die_size).map(|_| Plane::new(cfg)).collect(),
            channel,
            least_worn: 0,
            erases_remaining: cfg.block_erases,
            last_erase_time: 0,
        }
    }

    pub fn read(&self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let a = event.address;
        debug_assert!(a.level > Level::Die && (a.plane as usize) < self.planes.len());
        self.planes[a.plane as usize].read(event, cfg)
    }

    pub fn write(&mut self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let a = event.address;
        debug_assert!(a.level > Level::Die && (a.plane as usize) < self.planes.len());
        self.planes[a.plane as usize].write(event, cfg)
    }

    pub fn erase(&mut self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let a = event.address;
        debug_assert!(a.level > Level::Die && (a.plane as usize) < self.planes.len());
        self.planes[a.plane as usize].erase(event, cfg)?;
        self.update_wear_stats(cfg);
        Ok(())
    }

    /// Merges are plane-local operations. A merge whose source and target
    /// live on different planes is refused rather than silently skipped.
    pub fn merge(&mut self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let a = event.address;
        debug_assert!(a.level > Level::Die && (a.plane as usize) < self.planes.len());
        match event.merge_address {
            Some(m) if m.plane == a.plane => self.planes[a.plane as usize].merge(event, cfg),
            Some(_) => Err(SimError::CrossPlaneMerge),
            None => Err(SimError::InvalidKind(super::event::EventKind::Merge as u8)),
        }
    }

    /// Allocation hook pass-through to the addressed plane's cursor.
    pub fn free_page(&self, address: &Address) -> Address {
        debug_assert!(address.level >= Level::Plane);
        self.planes[address.plane as usize].free_page()
    }

    fn update_wear_stats(&mut self, _cfg: &SsdConfig) {
        let mut max_index = 0;
        let mut max = self.planes[0].erases_remaining();
        for (i, plane) in self.planes.iter().enumerate().skip(1) {
            if plane.erases_remaining() > max {
                max = plane.erases_remaining();
                max_index = i;
            }
        }
        self.least_worn = max_index as u32;
        self.erases_remaining = max;
        self.last_erase_time = self.planes[max_index].last_erase_time();
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub fn plane(&self, index: u32) -> &Plane {
        &self.planes[index as usize]
    }

    pub fn least_worn(&self) -> u32 {
        self.least_worn
    }

    pub fn erases_remaining(&self) -> u64 {
        self.erases_remaining
    }

    pub fn last_erase_time(&self) -> i64 {
        self.last_erase_time
    }
}
