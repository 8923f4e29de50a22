use super::address::{Address, Level};
use super::block::{Block, BlockState, PageState};
use super::error::SimError;
use super::event::{Event, EventKind};
use crate::config::SsdConfig;

/// A set of blocks that operate in parallel within a die. The plane owns
/// the next-free-page cursor used by the allocation hooks and implements
/// block-to-block merges.
#[derive(Clone, Debug)]
pub struct Plane {
    blocks: Vec<Block>,
    free_blocks: u32,
    /// Cursor to the next EMPTY position. Only the block/page/level fields
    /// are meaningful; `level == Page` iff the plane still has an EMPTY
    /// page, `Plane` once it is full.
    next_page: Address,
    least_worn: u32,
    erases_remaining: u64,
    last_erase_time: i64,
}

impl Plane {
    pub fn new(cfg: &SsdConfig) -> Self {
        let mut next_page = Address::none();
        next_page.level = Level::Page;
        Plane {
            blocks: (0..cfg.plane_size).map(|_| Block::new(cfg)).collect(),
            free_blocks: cfg.plane_size,
            next_page,
            least_worn: 0,
            erases_remaining: cfg.block_erases,
            last_erase_time: 0,
        }
    }

    pub fn read(&self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let a = event.address;
        debug_assert!(a.level > Level::Plane && (a.block as usize) < self.blocks.len());
        self.blocks[a.block as usize].read(event, cfg)
    }

    pub fn write(&mut self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let a = event.address;
        debug_assert!(a.level > Level::Plane && (a.block as usize) < self.blocks.len());
        if self.next_page.level < Level::Block {
            // plane already full; the page write below reports the failure
            error!("write arriving at a full plane, cursor {}", self.next_page);
        }
        let block = a.block as usize;
        let prev = self.blocks[block].state();
        self.blocks[block].write(event, cfg)?;
        if a.block == self.next_page.block {
            self.advance_cursor();
        }
        if prev == BlockState::Free && self.blocks[block].state() != BlockState::Free {
            self.free_blocks -= 1;
        }
        Ok(())
    }

    pub fn erase(&mut self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let a = event.address;
        debug_assert!(a.level > Level::Plane && (a.block as usize) < self.blocks.len());
        let block = a.block as usize;
        let prev = self.blocks[block].state();
        self.blocks[block].erase(event, cfg)?;
        if prev != BlockState::Free {
            self.free_blocks += 1;
        }
        self.update_wear_stats(cfg);
        // the erased block freed pages, so a full plane is full no longer
        if self.next_page.level < Level::Page {
            self.advance_cursor();
        }
        Ok(())
    }

    /// Move every VALID page of the event's block into EMPTY slots of the
    /// merge target block. Each moved page costs a page read plus register
    /// write on the way out and a register read plus page write on the way
    /// in. Fails without touching anything if the target cannot hold the
    /// source's valid pages.
    pub fn merge(&mut self, event: &mut Event, cfg: &SsdConfig) -> Result<(), SimError> {
        let address = event.address;
        let merge_address = event.merge_address.ok_or(SimError::InvalidKind(
            EventKind::Merge as u8,
        ))?;
        debug_assert!(address.level > Level::Plane && merge_address.level > Level::Plane);
        debug_assert!(address.match_depth(&merge_address) >= Level::Plane);
        let src = address.block as usize;
        let dst = merge_address.block as usize;
        debug_assert!(src < self.blocks.len() && dst < self.blocks.len());

        let valid = (0..cfg.block_size)
            .filter(|&p| self.blocks[src].page_state(p) == PageState::Valid)
            .count() as u32;
        let empty = (0..cfg.block_size)
            .filter(|&p| self.blocks[dst].page_state(p) == PageState::Empty)
            .count() as u32;
        if valid > empty {
            error!(
                "not enough space to merge block {} into block {}",
                address.block, merge_address.block
            );
            return Err(SimError::MergeSpace { valid, empty });
        }

        // sub-events accumulate the page delays; register transfer delays
        // accrue separately per moved page
        let mut read_event = Event::new(EventKind::Read, 0, 1, event.start_time);
        read_event.address = address;
        let mut write_event = Event::new(EventKind::Write, 0, 1, event.start_time);
        write_event.address = merge_address;

        let dst_prev = self.blocks[dst].state();
        let mut reg_delay = 0i64;
        let mut write_page = 0u32;
        for page in 0..cfg.block_size {
            if self.blocks[src].page_state(page) != PageState::Valid {
                continue;
            }
            read_event.address.page = page;
            self.blocks[src].read(&mut read_event, cfg)?;
            self.blocks[src].invalidate_page(page);
            reg_delay += cfg.plane_reg_write_delay;

            while self.blocks[dst].page_state(write_page) != PageState::Empty {
                write_page += 1;
            }
            write_event.address.page = write_page;
            self.blocks[dst].write(&mut write_event, cfg)?;
            reg_delay += cfg.plane_reg_read_delay;
        }
        event.incr_time_taken(reg_delay + read_event.time_taken + write_event.time_taken);

        if dst_prev == BlockState::Free && self.blocks[dst].state() != BlockState::Free {
            self.free_blocks -= 1;
        }
        // the target may have swallowed the cursor's slot
        self.advance_cursor();
        Ok(())
    }

    /// Re-scan for the next EMPTY position: the cursor's block first, then
    /// blocks in index order. A plane with no EMPTY page left marks the
    /// cursor `Plane`.
    fn advance_cursor(&mut self) {
        let current = self.next_page.block as usize;
        if self.blocks[current].state() != BlockState::Inactive {
            if let Some(page) = self.blocks[current].next_empty_page() {
                self.next_page.page = page;
                self.next_page.level = Level::Page;
                return;
            }
        }
        for (i, block) in self.blocks.iter().enumerate() {
            if block.state() == BlockState::Inactive {
                continue;
            }
            if let Some(page) = block.next_empty_page() {
                self.next_page.block = i as u32;
                self.next_page.page = page;
                self.next_page.level = Level::Page;
                return;
            }
        }
        self.next_page.level = Level::Plane;
    }

    /// The block with the most erases remaining is the least worn.
    fn update_wear_stats(&mut self, cfg: &SsdConfig) {
        let mut max_index = 0;
        let mut max = self.blocks[0].erases_remaining(cfg);
        for (i, block) in self.blocks.iter().enumerate().skip(1) {
            if block.erases_remaining(cfg) > max {
                max = block.erases_remaining(cfg);
                max_index = i;
            }
        }
        self.least_worn = max_index as u32;
        self.erases_remaining = max;
        self.last_erase_time = self.blocks[max_index].last_erase_time();
    }

    /// Current allocation cursor (block/page/level fields).
    pub fn free_page(&self) -> Address {
        self.next_page
    }

    pub fn free_blocks(&self) -> u32 {
        self.free_blocks
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

    pub fn block(&self, index: u32) -> &Block {
        &self.blocks[index as usize]
    }

    pub fn num_blocks(&self) -> u32 {
        self.blocks.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cfg() -> SsdConfig {
        let mut cfg = SsdConfig::default();
        cfg.plane_size = 2;
        cfg.block_size = 4;
        cfg
    }

    fn event_at(kind: EventKind, block: u32, page: u32, start: i64) -> Event {
        let mut e = Event::new(kind, 0, 1, start);
        let mut a = Address::none();
        a.block = block;
        a.page = page;
        a.level = Level::Page;
        e.address = a;
        e
    }

    fn recount_free(plane: &Plane) -> u32 {
        (0..plane.num_blocks())
            .filter(|&b| plane.block(b).state() == BlockState::Free)
            .count() as u32
    }

    #[test]
    fn test_write_advances_cursor() {
        let cfg = small_cfg();
        let mut plane = Plane::new(&cfg);
        let mut e = event_at(EventKind::Write, 0, 0, 1);
        plane.write(&mut e, &cfg).unwrap();
        let cursor = plane.free_page();
        assert_eq!(cursor.level, Level::Page);
        assert_eq!((cursor.block, cursor.page), (0, 1));
        assert_eq!(plane.free_blocks(), 1);
        assert_eq!(plane.free_blocks(), recount_free(&plane));
    }

    #[test]
    fn test_cursor_moves_across_blocks() {
        let cfg = small_cfg();
        let mut plane = Plane::new(&cfg);
        for page in 0..cfg.block_size {
            let mut e = event_at(EventKind::Write, 0, page, 1);
            plane.write(&mut e, &cfg).unwrap();
        }
        let cursor = plane.free_page();
        assert_eq!((cursor.block, cursor.page), (1, 0));
        assert_eq!(cursor.level, Level::Page);
    }

    #[test]
    fn test_cursor_marks_plane_full() {
        let cfg = small_cfg();
        let mut plane = Plane::new(&cfg);
        for block in 0..cfg.plane_size {
            for page in 0..cfg.block_size {
                let mut e = event_at(EventKind::Write, block, page, 1);
                plane.write(&mut e, &cfg).unwrap();
            }
        }
        assert_eq!(plane.free_page().level, Level::Plane);
        assert_eq!(plane.free_blocks(), 0);
    }

    #[test]
    fn test_erase_restores_cursor_and_free_count() {
        let cfg = small_cfg();
        let mut plane = Plane::new(&cfg);
        for block in 0..cfg.plane_size {
            for page in 0..cfg.block_size {
                let mut e = event_at(EventKind::Write, block, page, 1);
                plane.write(&mut e, &cfg).unwrap();
            }
        }
        let mut e = event_at(EventKind::Erase, 1, 0, 1000);
        plane.erase(&mut e, &cfg).unwrap();
        assert_eq!(plane.free_blocks(), 1);
        assert_eq!(plane.free_blocks(), recount_free(&plane));
        let cursor = plane.free_page();
        assert_eq!(cursor.level, Level::Page);
        assert_eq!(cursor.block, 1);
    }

    #[test]
    fn test_erase_free_block_does_not_double_count() {
        let cfg = small_cfg();
        let mut plane = Plane::new(&cfg);
        let mut e = event_at(EventKind::Erase, 0, 0, 0);
        plane.erase(&mut e, &cfg).unwrap();
        assert_eq!(plane.free_blocks(), cfg.plane_size);
        assert_eq!(plane.free_blocks(), recount_free(&plane));
    }

    #[test]
    fn test_merge_moves_valid_pages() {
        let cfg = small_cfg();
        let mut plane = Plane::new(&cfg);
        // two valid pages in block 0, one of them invalidated
        for page in 0..3 {
            let mut e = event_at(EventKind::Write, 0, page, 1);
            plane.write(&mut e, &cfg).unwrap();
        }
        let mut merge = event_at(EventKind::Merge, 0, 0, 1);
        let mut target = merge.address;
        target.block = 1;
        merge.merge_address = Some(target);
        plane.merge(&mut merge, &cfg).unwrap();

        // 3 reads + 3 writes, register delays are 0 in the default config
        assert_eq!(
            merge.time_taken,
            3 * (cfg.page_read_delay + cfg.page_write_delay)
        );
        for page in 0..3 {
            assert_eq!(plane.block(0).page_state(page), PageState::Invalid);
            assert_eq!(plane.block(1).page_state(page), PageState::Valid);
        }
        assert_eq!(plane.free_blocks(), recount_free(&plane));
    }

    #[test]
    fn test_merge_register_delays_accrue() {
        let mut cfg = small_cfg();
        cfg.plane_reg_read_delay = 7;
        cfg.plane_reg_write_delay = 11;
        let mut plane = Plane::new(&cfg);
        let mut e = event_at(EventKind::Write, 0, 0, 1);
        plane.write(&mut e, &cfg).unwrap();
        let mut merge = event_at(EventKind::Merge, 0, 0, 1);
        let mut target = merge.address;
        target.block = 1;
        merge.merge_address = Some(target);
        plane.merge(&mut merge, &cfg).unwrap();
        assert_eq!(
            merge.time_taken,
            cfg.page_read_delay + cfg.page_write_delay + 7 + 11
        );
    }

    #[test]
    fn test_merge_insufficient_space_fails_clean() {
        let cfg = small_cfg();
        let mut plane = Plane::new(&cfg);
        for page in 0..cfg.block_size {
            let mut e = event_at(EventKind::Write, 0, page, 1);
            plane.write(&mut e, &cfg).unwrap();
        }
        // fill all but one page of the target
        for page in 0..cfg.block_size - 1 {
            let mut e = event_at(EventKind::Write, 1, page, 1);
            plane.write(&mut e, &cfg).unwrap();
        }
        let mut merge = event_at(EventKind::Merge, 0, 0, 1);
        let mut target = merge.address;
        target.block = 1;
        merge.merge_address = Some(target);
        let err = plane.merge(&mut merge, &cfg).unwrap_err();
        assert_eq!(err, SimError::MergeSpace { valid: 4, empty: 1 });
        // nothing moved
        assert_eq!(plane.block(0).pages_valid(), cfg.block_size);
        assert_eq!(merge.time_taken, 0);
    }

    #[test]
    fn test_wear_stats_roll_up() {
        let mut cfg = small_cfg();
        cfg.wear_leveling = true;
        cfg.block_erases = 10;
        let mut plane = Plane::new(&cfg);
        let mut e = event_at(EventKind::Erase, 0, 0, 77);
        plane.erase(&mut e, &cfg).unwrap();
        // block 0 now has 9 erases left, block 1 still 10
        assert_eq!(plane.least_worn(), 1);
        assert_eq!(plane.erases_remaining(), 10);
        let mut e = event_at(EventKind::Erase, 1, 0, 99);
        plane.erase(&mut e, &cfg).unwrap();
        assert_eq!(plane.erases_remaining(), 9);
    }
}
