use super::address::{Address, Level};
use super::die::Die;
use super::error::SimError;
use super::event::Event;
use crate::config::SsdConfig;

/// The highest storage unit. Mostly an organizational pass-through that
/// keeps the per-package wear roll-up.
#[derive(Clone, Debug)]
pub struct Package {
    dies: Vec<Die>,
    least_worn: u32,
    erases_remaining: u64,
    last_erase_time: i64,
}

impl Package {
    pub fn new(cfg: &SsdConfig, channel: u32) -> Self {
        Package {
            dies: (0..cfg.package_size).map(|_| Die::new(cfg, channel)).collect(),
            least_worn: 0,
            erases_remaining: cfg.block_erases,
            last_erase_time: 0,
        }
    }

    pub fn read(&self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let a = event.address;
        debug_assert!(a.level > Level::Package && (a.die as usize) < self.dies.len());
        self.dies[a.die as usize].read(event, cfg)
    }

    pub fn write(&mut self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let a = event.address;
        debug_assert!(a.level > Level::Package && (a.die as usize) < self.dies.len());
        self.dies[a.die as usize].write(event, cfg)
    }

    pub fn erase(&mut self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let a = event.address;
        debug_assert!(a.level > Level::Package && (a.die as usize) < self.dies.len());
        self.dies[a.die as usize].erase(event, cfg)?;
        self.update_wear_stats(cfg);
        Ok(())
    }

    pub fn merge(&mut self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let a = event.address;
        debug_assert!(a.level > Level::Package && (a.die as usize) < self.dies.len());
        self.dies[a.die as usize].merge(event, cfg)
    }

    /// Allocation hook pass-through to the addressed die.
    pub fn free_page(&self, address: &Address) -> Address {
        debug_assert!(address.level >= Level::Die);
        self.dies[address.die as usize].free_page(address)
    }

    fn update_wear_stats(&mut self, _cfg: &SsdConfig) {
        let mut max_index = 0;
        let mut max = self.dies[0].erases_remaining();
        for (i, die) in self.dies.iter().enumerate().skip(1) {
            if die.erases_remaining() > max {
                max = die.erases_remaining();
                max_index = i;
            }
        }
        self.least_worn = max_index as u32;
        self.erases_remaining = max;
        self.last_erase_time = self.dies[max_index].last_erase_time();
    }

    pub fn die(&self, index: u32) -> &Die {
        &self.dies[index as usize]
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
