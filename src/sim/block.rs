use super::error::SimError;
use super::event::Event;
use crate::config::SsdConfig;

/// Reported wear for blocks when wear levelling is disabled: every block
/// claims the same healthy budget so the roll-ups stay inert.
const UNTRACKED_WEAR: u64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageState {
    Empty,
    Valid,
    Invalid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockState {
    Free,
    Active,
    Inactive,
}

/// The smallest programmable unit. Pages only track their state; the
/// payload bytes live in the device backing store.
#[derive(Clone, Copy, Debug)]
pub struct Page {
    state: PageState,
}

impl Page {
    fn new() -> Self {
        Page {
            state: PageState::Empty,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Loose mode accepts reads of EMPTY pages; strict mode requires VALID.
    /// INVALID pages always refuse.
    fn read(&self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let ok = if cfg.strict_page_state {
            self.state == PageState::Valid
        } else {
            self.state != PageState::Invalid
        };
        if !ok {
            return Err(SimError::PageState {
                op: "read",
                location: "page",
            });
        }
        event.incr_time_taken(cfg.page_read_delay);
        Ok(())
    }

    /// Programming is only legal on an EMPTY page.
    fn write(&mut self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        if self.state != PageState::Empty {
            return Err(SimError::PageState {
                op: "write",
                location: "page",
            });
        }
        event.incr_time_taken(cfg.page_write_delay);
        self.state = PageState::Valid;
        Ok(())
    }
}

/// The smallest erasable unit: an array of pages plus the wear and
/// occupancy counters the FTL hooks read.
#[derive(Clone, Debug)]
pub struct Block {
    pages: Vec<Page>,
    pages_valid: u32,
    pages_invalid: u32,
    state: BlockState,
    erases_remaining: u64,
    last_erase_time: i64,
}

impl Block {
    pub fn new(cfg: &SsdConfig) -> Self {
        Block {
            pages: vec![Page::new(); cfg.block_size as usize],
            pages_valid: 0,
            pages_invalid: 0,
            state: BlockState::Free,
            erases_remaining: cfg.block_erases,
            last_erase_time: 0,
        }
    }

    pub fn read(&self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        self.pages[event.address.page as usize].read(event, cfg)
    }

    pub fn write(&mut self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        self.pages[event.address.page as usize].write(event, cfg)?;
        self.pages_valid += 1;
        self.state = BlockState::Active;
        Ok(())
    }

    /// Drive every page back to EMPTY. Stamps `last_erase_time` with the
    /// absolute finish time of the event, erase delay included.
    pub fn erase(&mut self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        if cfg.wear_leveling {
            if self.erases_remaining == 0 {
                return Err(SimError::WornOut);
            }
            self.erases_remaining -= 1;
        }
        for page in &mut self.pages {
            page.state = PageState::Empty;
        }
        event.incr_time_taken(cfg.block_erase_delay);
        self.last_erase_time = event.finish_time();
        self.pages_valid = 0;
        self.pages_invalid = 0;
        self.state = BlockState::Free;
        Ok(())
    }

    /// VALID -> INVALID transition for one page, with the derived block
    /// state kept in sync: INACTIVE once every slot has been invalidated,
    /// FREE only with no valid or invalid pages, ACTIVE otherwise.
    pub fn invalidate_page(&mut self, page: u32) {
        debug_assert!((page as usize) < self.pages.len());
        if self.pages[page as usize].state == PageState::Valid {
            self.pages_valid = self.pages_valid.saturating_sub(1);
        }
        self.pages[page as usize].state = PageState::Invalid;
        self.pages_invalid += 1;
        self.state = if self.pages_invalid >= self.pages.len() as u32 {
            BlockState::Inactive
        } else if self.pages_valid > 0 || self.pages_invalid > 0 {
            BlockState::Active
        } else {
            BlockState::Free
        };
    }

    /// Index of the first EMPTY page, if any.
    pub fn next_empty_page(&self) -> Option<u32> {
        self.pages
            .iter()
            .position(|p| p.state == PageState::Empty)
            .map(|i| i as u32)
    }

    pub fn page_state(&self, page: u32) -> PageState {
        self.pages[page as usize].state
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn pages_valid(&self) -> u32 {
        self.pages_valid
    }

    pub fn pages_invalid(&self) -> u32 {
        self.pages_invalid
    }

    pub fn last_erase_time(&self) -> i64 {
        self.last_erase_time
    }

    pub fn erases_remaining(&self, cfg: &SsdConfig) -> u64 {
        if cfg.wear_leveling {
            self.erases_remaining
        } else {
            UNTRACKED_WEAR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::event::EventKind;

    fn cfg() -> SsdConfig {
        SsdConfig::default()
    }

    fn write_event(page: u32) -> Event {
        let cfg = cfg();
        let mut e = Event::new(EventKind::Write, 0, 1, 1);
        e.address = crate::sim::address::Address::decode(page as u64, &cfg);
        e
    }

    #[test]
    fn test_write_empty_page() {
        let cfg = cfg();
        let mut b = Block::new(&cfg);
        let mut e = write_event(0);
        b.write(&mut e, &cfg).unwrap();
        assert_eq!(e.time_taken, cfg.page_write_delay);
        assert_eq!(b.page_state(0), PageState::Valid);
        assert_eq!(b.pages_valid(), 1);
        assert_eq!(b.state(), BlockState::Active);
    }

    #[test]
    fn test_double_write_fails() {
        let cfg = cfg();
        let mut b = Block::new(&cfg);
        let mut e = write_event(0);
        b.write(&mut e, &cfg).unwrap();
        let mut e = write_event(0);
        assert!(b.write(&mut e, &cfg).is_err());
        assert_eq!(b.pages_valid(), 1);
    }

    #[test]
    fn test_read_empty_succeeds_loose_fails_strict() {
        let mut cfg = cfg();
        let b = Block::new(&cfg);
        let mut e = write_event(3);
        e.kind = EventKind::Read;
        b.read(&mut e, &cfg).unwrap();
        assert_eq!(e.time_taken, cfg.page_read_delay);

        cfg.strict_page_state = true;
        let mut e = write_event(3);
        e.kind = EventKind::Read;
        assert!(b.read(&mut e, &cfg).is_err());
    }

    #[test]
    fn test_read_invalid_fails() {
        let cfg = cfg();
        let mut b = Block::new(&cfg);
        let mut e = write_event(0);
        b.write(&mut e, &cfg).unwrap();
        b.invalidate_page(0);
        let mut e = write_event(0);
        e.kind = EventKind::Read;
        assert!(b.read(&mut e, &cfg).is_err());
    }

    #[test]
    fn test_erase_resets_block() {
        let cfg = cfg();
        let mut b = Block::new(&cfg);
        for page in 0..4 {
            let mut e = write_event(page);
            b.write(&mut e, &cfg).unwrap();
        }
        let mut e = Event::new(EventKind::Erase, 0, 1, 500);
        b.erase(&mut e, &cfg).unwrap();
        assert_eq!(e.time_taken, cfg.block_erase_delay);
        assert_eq!(b.last_erase_time(), 500 + cfg.block_erase_delay);
        assert_eq!(b.state(), BlockState::Free);
        assert_eq!(b.pages_valid(), 0);
        assert_eq!(b.pages_invalid(), 0);
        for page in 0..cfg.block_size {
            assert_eq!(b.page_state(page), PageState::Empty);
        }
    }

    #[test]
    fn test_invalidate_all_goes_inactive() {
        let cfg = cfg();
        let mut b = Block::new(&cfg);
        for page in 0..cfg.block_size {
            b.invalidate_page(page);
        }
        assert_eq!(b.state(), BlockState::Inactive);
    }

    #[test]
    fn test_wear_budget_enforced() {
        let mut cfg = cfg();
        cfg.wear_leveling = true;
        cfg.block_erases = 2;
        let mut b = Block::new(&cfg);
        for _ in 0..2 {
            let mut e = Event::new(EventKind::Erase, 0, 1, 0);
            b.erase(&mut e, &cfg).unwrap();
        }
        assert_eq!(b.erases_remaining(&cfg), 0);
        let mut e = Event::new(EventKind::Erase, 0, 1, 0);
        assert_eq!(b.erase(&mut e, &cfg), Err(SimError::WornOut));
    }

    #[test]
    fn test_wear_constant_when_disabled() {
        let cfg = cfg();
        let mut b = Block::new(&cfg);
        let mut e = Event::new(EventKind::Erase, 0, 1, 0);
        b.erase(&mut e, &cfg).unwrap();
        assert_eq!(b.erases_remaining(&cfg), UNTRACKED_WEAR);
    }

    #[test]
    fn test_next_empty_page_tracks_writes() {
        let cfg = cfg();
        let mut b = Block::new(&cfg);
        assert_eq!(b.next_empty_page(), Some(0));
        let mut e = write_event(0);
        b.write(&mut e, &cfg).unwrap();
        assert_eq!(b.next_empty_page(), Some(1));
    }
}
