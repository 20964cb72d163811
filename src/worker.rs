//! Optional background FEC-encoding worker, gated behind the `worker`
//! feature. See [`Worker`].
//!
//! Symbol generation for a just-closed group can be expensive relative to
//! the foreground's 10-20ms tick budget. When enabled, group closure hands
//! the padded originals to a dedicated worker thread over an SPSC ring; the
//! foreground polls for the finished recovery batch on each
//! [`Worker::poll`] rather than blocking for it.

use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

use crate::{fec::FecError, seq::GroupId};

/// A just-closed group's padded originals, sent to the worker for coding.
pub struct EncodeJob {
    /// The group being coded.
    pub code_group: GroupId,
    /// Uniformly padded original symbols.
    pub originals: Vec<Vec<u8>>,
    /// How many recovery symbols to produce.
    pub recovery_count: u16,
}

/// A finished job's output, handed back to the foreground.
pub struct EncodeResult {
    /// The group this result belongs to.
    pub code_group: GroupId,
    /// `symbol_len` used for the padded originals (and thus the recovery
    /// symbols too).
    pub symbol_len: usize,
    /// The produced recovery symbols, or an error if coding failed.
    pub recovery: Result<Vec<Vec<u8>>, FecError>,
}

/// Capacity of each direction's ring: one job is normally in flight at a
/// time, a small cushion avoids foreground stalls on a slow worker.
const CHANNEL_CAPACITY: usize = 4;

/// Owns the worker thread and both halves of the foreground/worker
/// handshake channel.
pub struct Worker {
    jobs: HeapProd<EncodeJob>,
    results: HeapCons<EncodeResult>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Worker {
    /// Spawns the background thread.
    #[must_use]
    pub fn spawn() -> Self {
        let (jobs_tx, jobs_rx) = HeapRb::<EncodeJob>::new(CHANNEL_CAPACITY).split();
        let (results_tx, results_rx) = HeapRb::<EncodeResult>::new(CHANNEL_CAPACITY).split();

        let handle = std::thread::Builder::new()
            .name("fecshim-worker".into())
            .spawn(move || run(jobs_rx, results_tx))
            .expect("spawning the fec worker thread");

        Self {
            jobs: jobs_tx,
            results: results_rx,
            handle: Some(handle),
        }
    }

    /// Submits a just-closed group for background coding. Drops the job
    /// silently (logging via `tracing`) if the channel is full; the caller
    /// falls back to producing zero recovery symbols for that group, same
    /// as an empty redundancy plan.
    pub fn submit(&mut self, job: EncodeJob) {
        if self.jobs.try_push(job).is_err() {
            tracing::warn!("fec worker job queue full, dropping recovery for this group");
        }
    }

    /// Drains every result that has become ready since the last poll.
    pub fn poll(&mut self) -> Vec<EncodeResult> {
        std::iter::from_fn(|| self.results.try_pop()).collect()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // dropping `jobs` closes the channel, which ends the worker's loop
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(mut jobs: HeapCons<EncodeJob>, mut results: HeapProd<EncodeResult>) {
    loop {
        let Some(job) = jobs.try_pop() else {
            if jobs.is_closed() {
                return;
            }
            std::thread::yield_now();
            continue;
        };

        let symbol_len = job.originals.iter().map(Vec::len).max().unwrap_or(0);
        let recovery = crate::encoder::pad_and_encode(&job.originals, job.recovery_count)
            .map(|(_, recovery)| recovery);

        let sent = results.try_push(EncodeResult {
            code_group: job.code_group,
            symbol_len,
            recovery,
        });
        if sent.is_err() {
            tracing::warn!("fec worker result queue full, dropping finished batch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_worker() {
        let mut worker = Worker::spawn();
        worker.submit(EncodeJob {
            code_group: GroupId::ZERO,
            originals: vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]],
            recovery_count: 1,
        });

        let mut results = Vec::new();
        for _ in 0..100 {
            results.extend(worker.poll());
            if !results.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        assert_eq!(results.len(), 1);
        let recovery = results[0].recovery.as_ref().unwrap();
        assert_eq!(recovery.len(), 1);
    }
}
