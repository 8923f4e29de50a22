use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use spin::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Heartbeat period (ns) for the long-term timer mode.
pub const DEFAULT_TIMEOUT_NS: i64 = 500_000;

pub type RequestId = u64;

/// Outcome reported when a request's simulated deadline fires. The payload
/// bytes were already moved at submission time; this is purely the status
/// the block layer sees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoStatus {
    Ok,
    /// The timing core refused the operation; data-wise the I/O succeeded.
    SimulatedFailure,
    /// Request beyond device capacity.
    OutOfRange,
}

#[derive(Clone, Copy, Debug)]
pub struct Completion {
    pub id: RequestId,
    pub status: IoStatus,
    pub deadline_ns: i64,
}

/// Monotonic nanosecond clock all of a device's timestamps come from.
pub struct SimClock {
    epoch: Instant,
}

impl SimClock {
    pub fn new() -> Self {
        SimClock {
            epoch: Instant::now(),
        }
    }

    pub fn now_ns(&self) -> i64 {
        self.epoch.elapsed().as_nanos() as i64
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

struct Pending {
    id: RequestId,
    status: IoStatus,
    deadline_ns: i64,
}

enum Ctrl {
    /// The queue head changed; recompute the sleep.
    Rearm,
    Shutdown,
}

struct Shared {
    /// Ascending-deadline queue; the head fires next. Ties keep submission
    /// order: a new entry goes after existing entries with equal deadline.
    queue: Mutex<VecDeque<Pending>>,
    clock: Arc<SimClock>,
    done_tx: Sender<Completion>,
    /// Cap every sleep at [`DEFAULT_TIMEOUT_NS`] so completions drain even
    /// if a re-arm is lost to scheduler jitter.
    heartbeat: bool,
}

impl Shared {
    /// Timer-context drain: try-lock only. If the queue is contended the
    /// worker loop simply re-arms; nothing is lost.
    fn fire(&self) {
        let Some(mut queue) = self.queue.try_lock() else {
            return;
        };
        let now = self.clock.now_ns();
        while let Some(head) = queue.front() {
            if head.deadline_ns > now {
                break;
            }
            let entry = queue.pop_front().unwrap();
            let _ = self.done_tx.send(Completion {
                id: entry.id,
                status: entry.status,
                deadline_ns: entry.deadline_ns,
            });
        }
    }
}

/// Deferred completion scheduler: a time-ordered queue of pending requests
/// plus a single one-shot timer, here a dedicated thread sleeping until
/// the head's deadline. Completions are delivered on a channel in
/// non-decreasing deadline order, never before their deadline.
pub struct CompletionQueue {
    shared: Arc<Shared>,
    ctrl_tx: Sender<Ctrl>,
    done_rx: Receiver<Completion>,
    worker: Option<JoinHandle<()>>,
}

impl CompletionQueue {
    pub fn new(clock: Arc<SimClock>, heartbeat: bool) -> Self {
        let (done_tx, done_rx) = unbounded();
        let (ctrl_tx, ctrl_rx) = unbounded();
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            clock,
            done_tx,
            heartbeat,
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("ramssd-timer".into())
            .spawn(move || Self::run(worker_shared, ctrl_rx))
            .expect("spawning completion timer thread");
        CompletionQueue {
            shared,
            ctrl_tx,
            done_rx,
            worker: Some(worker),
        }
    }

    /// Queue a request to complete at `submission_ns + latency_ns`. If the
    /// new entry became the queue head the timer re-arms, immediately when
    /// the deadline has already passed.
    pub fn enqueue(
        &self,
        id: RequestId,
        submission_ns: i64,
        latency_ns: i64,
        status: IoStatus,
    ) {
        let deadline_ns = submission_ns + latency_ns;
        let head_changed = {
            let mut queue = self.shared.queue.lock();
            let pos = queue
                .iter()
                .position(|e| e.deadline_ns > deadline_ns)
                .unwrap_or(queue.len());
            queue.insert(
                pos,
                Pending {
                    id,
                    status,
                    deadline_ns,
                },
            );
            pos == 0
        };
        if head_changed {
            let _ = self.ctrl_tx.send(Ctrl::Rearm);
        }
    }

    /// Deliver a completion right now, bypassing the timer. Used for
    /// requests rejected before they reach the simulator.
    pub fn complete_now(&self, id: RequestId, status: IoStatus) {
        let _ = self.shared.done_tx.send(Completion {
            id,
            status,
            deadline_ns: self.shared.clock.now_ns(),
        });
    }

    pub fn completions(&self) -> &Receiver<Completion> {
        &self.done_rx
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    fn run(shared: Arc<Shared>, ctrl_rx: Receiver<Ctrl>) {
        loop {
            let head_deadline = shared.queue.lock().front().map(|e| e.deadline_ns);
            let sleep_ns = match head_deadline {
                None => {
                    if shared.heartbeat {
                        DEFAULT_TIMEOUT_NS
                    } else {
                        // disarmed: nothing fires until the head changes
                        match ctrl_rx.recv() {
                            Ok(Ctrl::Rearm) => continue,
                            Ok(Ctrl::Shutdown) | Err(_) => return,
                        }
                    }
                }
                Some(deadline) => {
                    let now = shared.clock.now_ns();
                    if deadline <= now {
                        shared.fire();
                        continue;
                    }
                    let mut ns = deadline - now;
                    if shared.heartbeat {
                        ns = ns.min(DEFAULT_TIMEOUT_NS);
                    }
                    ns
                }
            };
            match ctrl_rx.recv_timeout(Duration::from_nanos(sleep_ns as u64)) {
                Ok(Ctrl::Rearm) => continue,
                Ok(Ctrl::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => shared.fire(),
            }
        }
    }
}

impl Drop for CompletionQueue {
    fn drop(&mut self) {
        let _ = self.ctrl_tx.send(Ctrl::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        // no cancellation: everything still pending completes with its
        // stored status
        let mut queue = self.shared.queue.lock();
        while let Some(entry) = queue.pop_front() {
            let _ = self.shared.done_tx.send(Completion {
                id: entry.id,
                status: entry.status,
                deadline_ns: entry.deadline_ns,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: i64 = 1_000_000;

    fn queue() -> (Arc<SimClock>, CompletionQueue) {
        let clock = Arc::new(SimClock::new());
        let q = CompletionQueue::new(Arc::clone(&clock), false);
        (clock, q)
    }

    fn recv(q: &CompletionQueue) -> Completion {
        q.completions()
            .recv_timeout(Duration::from_secs(5))
            .expect("completion should arrive")
    }

    #[test]
    fn test_completes_at_or_after_deadline() {
        let (clock, q) = queue();
        let now = clock.now_ns();
        q.enqueue(1, now, 2 * MS, IoStatus::Ok);
        let done = recv(&q);
        assert_eq!(done.id, 1);
        assert_eq!(done.status, IoStatus::Ok);
        assert!(clock.now_ns() >= done.deadline_ns);
    }

    #[test]
    fn test_shorter_deadline_completes_first() {
        let (clock, q) = queue();
        let now = clock.now_ns();
        // A enqueued first with the later deadline, B second but sooner
        q.enqueue(1, now, 100 * MS, IoStatus::Ok);
        q.enqueue(2, now, 50 * MS, IoStatus::Ok);
        assert_eq!(recv(&q).id, 2);
        assert_eq!(recv(&q).id, 1);
    }

    #[test]
    fn test_equal_deadlines_keep_submission_order() {
        let (clock, q) = queue();
        let now = clock.now_ns();
        for id in 1..=4 {
            q.enqueue(id, now, 5 * MS, IoStatus::Ok);
        }
        for id in 1..=4 {
            assert_eq!(recv(&q).id, id);
        }
    }

    #[test]
    fn test_deadlines_delivered_in_order() {
        let (clock, q) = queue();
        let now = clock.now_ns();
        let latencies = [9, 3, 7, 1, 5];
        for (i, l) in latencies.iter().enumerate() {
            q.enqueue(i as u64, now, l * MS, IoStatus::Ok);
        }
        let mut last = i64::MIN;
        for _ in 0..latencies.len() {
            let done = recv(&q);
            assert!(done.deadline_ns >= last);
            last = done.deadline_ns;
        }
    }

    #[test]
    fn test_past_deadline_fires_immediately() {
        let (clock, q) = queue();
        let now = clock.now_ns();
        q.enqueue(1, now, -1000, IoStatus::Ok);
        assert_eq!(recv(&q).id, 1);
    }

    #[test]
    fn test_teardown_drains_pending() {
        let (clock, q) = queue();
        let now = clock.now_ns();
        q.enqueue(7, now, 3600 * 1000 * MS, IoStatus::SimulatedFailure);
        assert_eq!(q.pending(), 1);
        let rx = q.completions().clone();
        drop(q);
        let done = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(done.id, 7);
        assert_eq!(done.status, IoStatus::SimulatedFailure);
    }

    #[test]
    fn test_complete_now_bypasses_timer() {
        let (_clock, q) = queue();
        q.complete_now(9, IoStatus::OutOfRange);
        let done = recv(&q);
        assert_eq!(done.id, 9);
        assert_eq!(done.status, IoStatus::OutOfRange);
    }

    #[test]
    fn test_heartbeat_mode_still_completes() {
        let clock = Arc::new(SimClock::new());
        let q = CompletionQueue::new(Arc::clone(&clock), true);
        let now = clock.now_ns();
        q.enqueue(1, now, 2 * MS, IoStatus::Ok);
        assert_eq!(recv(&q).id, 1);
    }
}
