//! The hosted block-device shim: preserves data byte-for-byte in a sparse
//! backing store while the timing core decides when each request is
//! allowed to complete.

pub mod completion;
pub mod store;

use crate::config::SsdConfig;
use crate::sim::{EventKind, Ssd};
use anyhow::{bail, Result};
use completion::{Completion, CompletionQueue, IoStatus, RequestId, SimClock};
use crossbeam::channel::Receiver;
use smallvec::SmallVec;
use spin::Mutex as SpinMutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use store::{BackingStore, PAGE_SECTORS, SECTOR_SHIFT, SECTOR_SIZE};

/// Largest single request, in sectors.
pub const MAX_HW_SECTORS: u64 = 1024 * 256;
/// Partition minors available per disk.
const DISK_MAX_PARTS: u32 = 256;
/// Floor substituted when the simulator returns a zero, negative, or
/// failed latency, so completion always goes through the timer.
const MIN_LATENCY_NS: i64 = 100;

/// Knobs mirroring the module parameters of the driver surface.
#[derive(Clone, Copy, Debug)]
pub struct DiskParams {
    /// Number of devices to create. Exactly 1 is supported.
    pub nr_devices: u32,
    /// Requested size in KiB; overridden by the topology-derived capacity.
    pub size_kb: u64,
    /// Partitions per disk.
    pub max_part: u32,
    /// Enable the long-term heartbeat timer.
    pub heartbeat: bool,
}

impl Default for DiskParams {
    fn default() -> Self {
        DiskParams {
            nr_devices: 1,
            size_kb: 0,
            max_part: 0,
            heartbeat: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
    Discard,
}

/// One emulated disk (`ramssd<N>`): sparse byte store, timing core, and
/// deferred completion queue. Submission copies payload bytes immediately;
/// the request then completes on the timer at its simulated deadline.
pub struct RamSsd {
    name: String,
    capacity_sectors: u64,
    block_pages: u64,
    /// Serializes submissions; engine calls on one device are totally
    /// ordered by submission order.
    request_lock: SpinMutex<()>,
    /// Guards all topology and channel mutation during an engine call.
    sim: SpinMutex<Ssd>,
    store: BackingStore,
    queue: CompletionQueue,
    clock: Arc<SimClock>,
    /// Serializes byte-level copies between caller buffers and the store.
    io_mutex: Mutex<()>,
    next_id: AtomicU64,
    holders: AtomicU32,
}

impl RamSsd {
    pub fn new(cfg: SsdConfig, params: DiskParams) -> Result<Self> {
        if params.nr_devices != 1 {
            bail!("only one disk is supported");
        }
        let part_shift = if params.max_part > 0 {
            32 - params.max_part.leading_zeros()
        } else {
            0
        };
        if (1u64 << part_shift) > DISK_MAX_PARTS as u64 {
            bail!("max_part {} exceeds the partition space", params.max_part);
        }
        cfg.validate().map_err(anyhow::Error::msg)?;

        let capacity_sectors = cfg.total_pages() * PAGE_SECTORS;
        if params.size_kb != 0 && params.size_kb * 2 != capacity_sectors {
            info!(
                "size_kb {} overridden by topology capacity ({} sectors)",
                params.size_kb, capacity_sectors
            );
        }
        let block_pages = cfg.block_size as u64;
        let clock = Arc::new(SimClock::new());
        let device = RamSsd {
            name: "ramssd0".to_string(),
            capacity_sectors,
            block_pages,
            request_lock: SpinMutex::new(()),
            sim: SpinMutex::new(Ssd::new(cfg)),
            store: BackingStore::new(),
            queue: CompletionQueue::new(Arc::clone(&clock), params.heartbeat),
            clock,
            io_mutex: Mutex::new(()),
            next_id: AtomicU64::new(0),
            holders: AtomicU32::new(0),
        };
        info!(
            "{}: capacity {} sectors ({} MB)",
            device.name,
            capacity_sectors,
            (capacity_sectors << SECTOR_SHIFT) >> 20
        );
        Ok(device)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity_sectors(&self) -> u64 {
        self.capacity_sectors
    }

    /// Completion stream; one entry per submitted request, delivered at
    /// its simulated deadline.
    pub fn completions(&self) -> &Receiver<Completion> {
        self.queue.completions()
    }

    pub fn open(&self) {
        self.holders.fetch_add(1, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.holders.fetch_sub(1, Ordering::SeqCst);
    }

    /// `BLKFLSBUF`: drop every backing page. Refused while more than one
    /// holder has the device open.
    pub fn flush_pages(&self) -> Result<()> {
        if self.holders.load(Ordering::SeqCst) > 1 {
            bail!("device busy");
        }
        self.store.free_all();
        Ok(())
    }

    pub fn read(&self, sector: u64, dst: &mut [u8]) -> RequestId {
        self.submit(IoOp::Read, sector, Some(dst), None, 0)
    }

    pub fn write(&self, sector: u64, src: &[u8]) -> RequestId {
        self.submit(IoOp::Write, sector, None, Some(src), 0)
    }

    pub fn discard(&self, sector: u64, len: usize) -> RequestId {
        self.submit(IoOp::Discard, sector, None, None, len)
    }

    fn submit(
        &self,
        op: IoOp,
        sector: u64,
        dst: Option<&mut [u8]>,
        src: Option<&[u8]>,
        discard_len: usize,
    ) -> RequestId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let len = match op {
            IoOp::Read => dst.as_ref().map(|b| b.len()).unwrap_or(0),
            IoOp::Write => src.map(|b| b.len()).unwrap_or(0),
            IoOp::Discard => discard_len,
        };
        debug_assert!(len % SECTOR_SIZE == 0);
        let nsect = (len / SECTOR_SIZE) as u64;
        debug_assert!(nsect <= MAX_HW_SECTORS);

        if sector + nsect > self.capacity_sectors {
            warn!(
                "{}: bad access: sector={}, count={}, capacity={}",
                self.name, sector, nsect, self.capacity_sectors
            );
            self.queue.complete_now(id, IoStatus::OutOfRange);
            return id;
        }
        if nsect == 0 {
            self.queue.complete_now(id, IoStatus::Ok);
            return id;
        }

        let _request = self.request_lock.lock();

        // payload bytes move now; the simulator only decides when the
        // request is allowed to complete
        {
            let _io = self.io_mutex.lock().unwrap();
            match op {
                IoOp::Read => self.store.read(sector, dst.unwrap()),
                IoOp::Write => self.store.write(sector, src.unwrap()),
                IoOp::Discard => self.store.discard(sector, len),
            }
        }

        let now = self.clock.now_ns();
        let (latency, status) = self.simulate(op, sector, nsect, now);
        self.queue.enqueue(id, now, latency, status);
        id
    }

    /// Run the timing core once per flash page the request touches (per
    /// block for discards) and take the maximum latency: the channels
    /// underneath act in parallel, so the slowest unit finishes last.
    fn simulate(&self, op: IoOp, sector: u64, nsect: u64, now_ns: i64) -> (i64, IoStatus) {
        let kind = match op {
            IoOp::Read => EventKind::Read,
            IoOp::Write => EventKind::Write,
            IoOp::Discard => EventKind::Erase,
        };
        let first_page = sector / PAGE_SECTORS;
        let last_page = (sector + nsect - 1) / PAGE_SECTORS;
        let size = (last_page - first_page + 1) as u32;

        let mut units: SmallVec<[u64; 8]> = SmallVec::new();
        if kind == EventKind::Erase {
            let first_block = first_page / self.block_pages;
            let last_block = last_page / self.block_pages;
            for block in first_block..=last_block {
                units.push(block * self.block_pages);
            }
        } else {
            for page in first_page..=last_page {
                units.push(page);
            }
        }

        let mut sim = self.sim.lock();
        let mut max_latency = 0i64;
        for lpn in units {
            match sim.event_arrive(kind, lpn, size, now_ns) {
                Ok(latency) => max_latency = max_latency.max(latency),
                Err(e) => {
                    warn!("{}: request {:?} at lpn {} failed: {}", self.name, op, lpn, e);
                    return (MIN_LATENCY_NS, IoStatus::SimulatedFailure);
                }
            }
        }
        (max_latency.max(MIN_LATENCY_NS), IoStatus::Ok)
    }
}
