//! One analysis at a time on a dedicated worker thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use nopp_core::{AnalysisConfig, ColorImage, Detection, Method, NoppError, NoppResult};
use tracing::{debug, warn};

use crate::registry::MethodRegistry;
use crate::report::ComparisonReport;

/// Poll interval of `shutdown` while the worker winds down
const SHUTDOWN_POLL: Duration = Duration::from_millis(5);
/// Value of the running slot with no job in flight
const IDLE: u64 = 0;

/// What a submitted job computes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Single(Method),
    Compare,
}

#[derive(Debug, Clone)]
pub enum JobOutput {
    Single(NoppResult<Detection>),
    Compare(ComparisonReport),
}

/// Marks `running` idle when its job ends, also by unwinding. A guard
/// only clears the slot while it still holds its own job id.
struct BusyGuard {
    running: Arc<AtomicU64>,
    job: u64,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let _ = self.running.compare_exchange(self.job, IDLE, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Handle to a submitted job
#[derive(Debug)]
pub struct AnalysisTask {
    receiver: Receiver<JobOutput>,
}

impl AnalysisTask {
    /// The output if the job is done, without blocking
    pub fn try_poll(&self) -> Option<NoppResult<JobOutput>> {
        match self.receiver.try_recv() {
            Ok(output) => Some(Ok(output)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(worker_lost())),
        }
    }

    /// Block until the job is done
    pub fn wait(self) -> NoppResult<JobOutput> {
        self.receiver.recv().map_err(|_| worker_lost())
    }

    /// Block at most `timeout`; `None` when the job is still running
    pub fn wait_timeout(&self, timeout: Duration) -> Option<NoppResult<JobOutput>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(output) => Some(Ok(output)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(worker_lost())),
        }
    }
}

fn worker_lost() -> NoppError {
    NoppError::computation("analysis worker stopped without a result")
}

/// Runs jobs against a registry, refusing new work while one is in flight
#[derive(Debug)]
pub struct Analyzer {
    registry: Arc<MethodRegistry>,
    /// Id of the job in flight, `IDLE` when none
    running: Arc<AtomicU64>,
    next_job: AtomicU64,
    /// Latest worker and the id of its job
    worker: Mutex<Option<(u64, JoinHandle<()>)>>,
}

impl Analyzer {
    pub fn new(registry: MethodRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            running: Arc::new(AtomicU64::new(IDLE)),
            next_job: AtomicU64::new(IDLE + 1),
            worker: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    pub fn is_busy(&self) -> bool {
        self.running.load(Ordering::Acquire) != IDLE
    }

    /// Start `job` on its own thread. `None` while another job is running.
    pub fn submit(&self, image: ColorImage, config: AnalysisConfig, job: Job) -> Option<AnalysisTask> {
        let registry = Arc::clone(&self.registry);
        let task = self.spawn_worker(move || match job {
            Job::Single(method) => JobOutput::Single(registry.run(method, &image, &config)),
            Job::Compare => JobOutput::Compare(registry.compare(&image, &config)),
        });
        if task.is_none() {
            debug!(?job, "analysis not started");
        }
        task
    }

    fn spawn_worker<F>(&self, work: F) -> Option<AnalysisTask>
    where
        F: FnOnce() -> JobOutput + Send + 'static,
    {
        let id = self.next_job.fetch_add(1, Ordering::Relaxed);
        if self.running.compare_exchange(IDLE, id, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return None;
        }
        let guard = BusyGuard { running: Arc::clone(&self.running), job: id };
        let (sender, receiver) = mpsc::channel();

        let spawned = std::thread::Builder::new().name("nopp-analysis".to_string()).spawn(move || {
            let _guard = guard;
            // the task may have been dropped already
            let _ = sender.send(work());
        });

        match spawned {
            Ok(handle) => {
                let mut slot = self.worker.lock().unwrap_or_else(|e| e.into_inner());
                if let Some((_, previous)) = slot.replace((id, handle)) {
                    if previous.join().is_err() {
                        warn!("previous analysis worker panicked");
                    }
                }
                Some(AnalysisTask { receiver })
            }
            Err(err) => {
                // the guard went down with the closure and cleared the flag
                warn!(error = %err, "cannot start analysis worker");
                None
            }
        }
    }

    /// Give the worker up to `timeout` to finish, then mark the analyzer idle.
    /// Returns whether no worker is left running. A worker still running at
    /// the deadline keeps the analyzer busy until it ends.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let mut slot = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        let Some((job, handle)) = slot.take() else { return true };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(?timeout, "analysis worker still running at shutdown");
                *slot = Some((job, handle));
                return false;
            }
            std::thread::sleep(SHUTDOWN_POLL);
        }
        if handle.join().is_err() {
            warn!("analysis worker panicked");
        }
        let _ = self.running.compare_exchange(job, IDLE, Ordering::AcqRel, Ordering::Acquire);
        true
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        self.shutdown(Duration::from_secs(1));
    }
}
