//! cycle_log.rs
//! Lock-free per-cycle event log with a background CSV consumer.
//!
//! Loop threads call `record` from the hot path: a non-blocking push into a
//! bounded `ArrayQueue`. When the queue is full the event is dropped and
//! counted. A consumer thread drains the queue in batches and writes CSV rows,
//! flushing every few batches so disk writes stay off the control threads.

use std::{
    fs::File,
    io::BufWriter,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_queue::ArrayQueue;
use csv::Writer;
use log::{debug, error};
use parking_lot::Mutex;
use serde::Serialize;

const LOG_CAPACITY: usize = 8192;
const CONSUMER_POLL_MS: u64 = 5;
const FLUSH_BATCHES: usize = 8;
const BATCH_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEventKind {
    /// A loop finished one iteration.
    Cycle,
    /// A periodic loop started late.
    Overrun,
    /// The watchdog found a loop stale.
    Stall,
    /// A network payload was rejected.
    DecodeDrop,
}

impl CycleEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            CycleEventKind::Cycle => "cycle",
            CycleEventKind::Overrun => "overrun",
            CycleEventKind::Stall => "stall",
            CycleEventKind::DecodeDrop => "decode_drop",
        }
    }
}

#[derive(Debug, Clone)]
struct RawEvent {
    seq: u64,
    ts: Instant,
    source: &'static str,
    kind: CycleEventKind,
    value: f64,
}

#[derive(Debug, Serialize)]
struct CsvRow {
    seq: u64,
    t_us: u64,
    source: &'static str,
    event: &'static str,
    value: f64,
}

/// Cloneable handle; all clones share the queue and the consumer.
#[derive(Clone)]
pub struct CycleLog {
    queue: Arc<ArrayQueue<RawEvent>>,
    dropped: Arc<AtomicU64>,
    seq: Arc<AtomicU64>,
    run_start: Instant,
    consumer_running: Arc<AtomicBool>,
    consumer_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Default for CycleLog {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleLog {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
            dropped: Arc::new(AtomicU64::new(0)),
            seq: Arc::new(AtomicU64::new(1)),
            run_start: Instant::now(),
            consumer_running: Arc::new(AtomicBool::new(false)),
            consumer_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Non-blocking. Drops the event if the queue is full.
    #[inline]
    pub fn record(&self, source: &'static str, kind: CycleEventKind, value: f64) {
        let raw = RawEvent {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            ts: Instant::now(),
            source,
            kind,
            value,
        };
        if self.queue.push(raw).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Spawn the CSV writer. Fails if one is already running.
    pub fn start_consumer(&self, output_csv: PathBuf) -> std::io::Result<()> {
        let mut guard = self.consumer_handle.lock();
        if guard.is_some() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "cycle log consumer already running",
            ));
        }

        let file = File::create(&output_csv)?;
        let queue = Arc::clone(&self.queue);
        let dropped = Arc::clone(&self.dropped);
        let running = Arc::clone(&self.consumer_running);
        let run_start = self.run_start;
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("cycle-log".into())
            .spawn(move || {
                let mut wtr = Writer::from_writer(BufWriter::new(file));
                let mut flush_counter = 0usize;

                while running.load(Ordering::SeqCst) {
                    if drain_batch(&queue, &mut wtr, run_start, BATCH_SIZE) > 0 {
                        flush_counter += 1;
                        if flush_counter >= FLUSH_BATCHES {
                            if let Err(e) = wtr.flush() {
                                error!("cycle log flush failed: {e}");
                            }
                            flush_counter = 0;
                        }
                    } else {
                        thread::sleep(Duration::from_millis(CONSUMER_POLL_MS));
                    }
                }

                // Final drain
                while drain_batch(&queue, &mut wtr, run_start, BATCH_SIZE) > 0 {}
                if let Err(e) = wtr.flush() {
                    error!("cycle log flush failed: {e}");
                }
                debug!(
                    "cycle log consumer exiting, dropped={}",
                    dropped.load(Ordering::Relaxed)
                );
            })?;

        *guard = Some(handle);
        Ok(())
    }

    /// Stop the writer after it drains what is queued. No-op if not running.
    pub fn stop_consumer(&self) {
        self.consumer_running.store(false, Ordering::SeqCst);
        let handle = self.consumer_handle.lock().take();
        if let Some(h) = handle {
            if h.join().is_err() {
                error!("cycle log consumer panicked");
            }
        }
    }
}

fn drain_batch<W: std::io::Write>(
    queue: &ArrayQueue<RawEvent>,
    wtr: &mut Writer<W>,
    run_start: Instant,
    max: usize,
) -> usize {
    let mut written = 0;
    while written < max {
        let Some(raw) = queue.pop() else { break };
        let row = CsvRow {
            seq: raw.seq,
            t_us: raw.ts.saturating_duration_since(run_start).as_micros() as u64,
            source: raw.source,
            event: raw.kind.as_str(),
            value: raw.value,
        };
        if let Err(e) = wtr.serialize(&row) {
            error!("cycle log write failed: {e}");
        }
        written += 1;
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_drops_and_counts() {
        let log = CycleLog::with_capacity(2);
        log.record("sense-act", CycleEventKind::Cycle, 1.0);
        log.record("sense-act", CycleEventKind::Cycle, 2.0);
        log.record("sense-act", CycleEventKind::Overrun, 3.0);
        assert_eq!(log.queued(), 2);
        assert_eq!(log.dropped(), 1);
    }

    #[test]
    fn test_consumer_writes_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycles.csv");

        let log = CycleLog::new();
        log.start_consumer(path.clone()).unwrap();
        assert!(log.start_consumer(path.clone()).is_err());

        log.record("see-think", CycleEventKind::Cycle, 12.5);
        log.record("watchdog", CycleEventKind::Stall, 600.0);
        log.stop_consumer();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("seq,t_us,source,event,value"));
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].contains("see-think,cycle,12.5"));
        assert!(rows[1].contains("watchdog,stall,600"));
    }
}
