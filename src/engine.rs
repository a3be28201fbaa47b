//! Serialized background recomputation for interactive component curation.
//!
//! One [`RecomputeEngine`] owns the base epochs, the decomposition, the
//! exclusion state and the cache. Toggles mutate the exclusion state
//! synchronously; recomputation runs on a single worker thread so at most one
//! reconstruction is in progress at any time.
//!
//! # Request lifecycle
//!
//! ```text
//! submit(target) ──► admission gate ──► FIFO queue ──► worker
//!                    (one per target,    (exclusion      │  cache.get_or_compute
//!                     busy := true)       snapshot)      │  remove → rebaseline → energy
//!                                                        ▼
//!                                          completion callback, then release
//!                                          (busy := false when queue drains)
//! ```
//!
//! Completions are delivered in acceptance order. There is no cancellation
//! and no timeout; a failed reconstruction is reported as
//! [`Error::RecomputeFailed`] and leaves the exclusion state and every Ready
//! cache entry untouched.
use std::any::Any;
use std::collections::{BTreeSet, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error, info, warn};
use ndarray::Array3;
use parking_lot::{Mutex, RwLock};

use crate::baseline::baseline_correct_inplace;
use crate::cache::{CleanedDataset, RecomputeCache, Target};
use crate::config::EngineConfig;
use crate::decomposition::Decomposition;
use crate::energy::ReferenceEnergy;
use crate::error::{Error, Result};
use crate::exclusion::{ExclusionState, Fingerprint};

/// Receives the outcome of one accepted request, exactly once.
pub type Completion = Box<dyn FnOnce(Result<Arc<CleanedDataset>>) + Send>;

/// Called with `true` when the engine becomes busy and `false` when its
/// queue drains. Invoked under the admission lock: it must not call back
/// into `submit` or `request_recompute`.
pub type BusyListener = Box<dyn Fn(bool) + Send + Sync>;

struct Dataset {
    epochs: Array3<f64>,
    reference: ReferenceEnergy,
}

#[derive(Default)]
struct Admission {
    in_flight: HashSet<Target>,
    pending: usize,
}

struct Shared {
    decomposition: Arc<dyn Decomposition>,
    config: EngineConfig,
    dataset: RwLock<Dataset>,
    exclusion: Mutex<ExclusionState>,
    cache: RecomputeCache,
    admission: Mutex<Admission>,
    busy: AtomicBool,
    busy_listener: RwLock<Option<BusyListener>>,
}

struct Job {
    ticket: u64,
    target: Target,
    fingerprint: Fingerprint,
    done: Completion,
}

/// Owner of the curation session's numeric state and its worker thread.
pub struct RecomputeEngine {
    shared: Arc<Shared>,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    next_ticket: AtomicU64,
}

impl RecomputeEngine {
    /// Start an engine over `epochs` (`[E, C, T]`).
    ///
    /// The epochs are baseline-corrected first when
    /// [`EngineConfig::apply_baseline`] is set; their energy at that point is
    /// the 100 % reference. `excluded` seeds the exclusion state.
    ///
    /// # Errors
    ///
    /// * [`Error::ShapeMismatch`] if the channel count differs from the
    ///   decomposition's.
    /// * [`Error::ComponentOutOfRange`] for a seed index `>= n_components`.
    /// * [`Error::DivisionByZero`] if the (baselined) epochs are all zero.
    pub fn new(
        epochs: Array3<f64>,
        decomposition: Arc<dyn Decomposition>,
        excluded: impl IntoIterator<Item = usize>,
        config: EngineConfig,
    ) -> Result<Self> {
        let exclusion = ExclusionState::with_excluded(excluded);
        let n = decomposition.n_components();
        if let Some(&bad) = exclusion.excluded().iter().find(|&&k| k >= n) {
            return Err(Error::ComponentOutOfRange { index: bad, n_components: n });
        }
        let dataset = prepare(epochs, decomposition.as_ref(), &config)?;
        info!(
            "recompute engine over {:?} epochs, {} components, {} excluded",
            dataset.epochs.dim(),
            n,
            exclusion.len()
        );

        let shared = Arc::new(Shared {
            decomposition,
            config,
            dataset: RwLock::new(dataset),
            exclusion: Mutex::new(exclusion),
            cache: RecomputeCache::new(),
            admission: Mutex::new(Admission::default()),
            busy: AtomicBool::new(false),
            busy_listener: RwLock::new(None),
        });

        let (tx, rx) = channel::unbounded::<Job>();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("icapp-recompute".into())
            .spawn(move || worker_loop(worker_shared, rx))
            .map_err(|e| Error::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            shared,
            jobs: Some(tx),
            worker: Some(worker),
            next_ticket: AtomicU64::new(1),
        })
    }

    pub fn n_components(&self) -> usize {
        self.shared.decomposition.n_components()
    }

    pub fn decomposition(&self) -> &Arc<dyn Decomposition> {
        &self.shared.decomposition
    }

    /// Flip component `k` in or out of the exclusion set. Takes effect
    /// immediately for every later snapshot, even while a recompute runs.
    /// Cached results for the previous set are released.
    pub fn toggle(&self, k: usize) -> Result<u64> {
        self.check_component(k)?;
        let fingerprint = {
            let mut exclusion = self.shared.exclusion.lock();
            exclusion.toggle(k);
            exclusion.snapshot()
        };
        let dropped = self.shared.cache.invalidate_stale(&fingerprint);
        debug!(
            "toggled component {k}, exclusion version {}, {dropped} stale entries dropped",
            fingerprint.version()
        );
        Ok(fingerprint.version())
    }

    pub fn is_excluded(&self, k: usize) -> bool {
        self.shared.exclusion.lock().contains(k)
    }

    /// Current exclusion fingerprint.
    pub fn exclusion(&self) -> Fingerprint {
        self.shared.exclusion.lock().snapshot()
    }

    /// True from the moment a request is accepted until the queue drains.
    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
    }

    pub fn set_busy_listener(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        *self.shared.busy_listener.write() = Some(Box::new(listener));
    }

    /// Reference energy of the base epochs (the 100 % mark).
    pub fn reference_energy(&self) -> f64 {
        self.shared.dataset.read().reference.total()
    }

    /// Ready result for `target` under the current exclusion set, if any.
    pub fn cached(&self, target: Target) -> Option<Arc<CleanedDataset>> {
        let fp = self.exclusion();
        self.shared.cache.get(target, &fp)
    }

    pub fn cache(&self) -> &RecomputeCache {
        &self.shared.cache
    }

    /// Number of reconstructions actually run (cache misses).
    pub fn computations(&self) -> usize {
        self.shared.cache.computations()
    }

    /// Swap the base epochs. Blocks until any running reconstruction has
    /// finished, then clears the cache.
    pub fn replace_dataset(&self, epochs: Array3<f64>) -> Result<()> {
        let dataset = prepare(epochs, self.shared.decomposition.as_ref(), &self.shared.config)?;
        let mut slot = self.shared.dataset.write();
        *slot = dataset;
        self.shared.cache.clear();
        info!("base dataset replaced, cache cleared");
        Ok(())
    }

    /// Queue a recompute of `target`; `done` is called exactly once with the
    /// outcome, on the worker thread. Returns the request's ticket number.
    ///
    /// The exclusion set is snapshotted here, so later toggles do not affect
    /// this request.
    ///
    /// # Errors
    ///
    /// * [`Error::RecomputePending`] if a request for `target` is already
    ///   queued or running.
    /// * [`Error::ComponentOutOfRange`] for a preview of an unknown component.
    /// * [`Error::EngineStopped`] if the worker is gone.
    pub fn submit<F>(&self, target: Target, done: F) -> Result<u64>
    where
        F: FnOnce(Result<Arc<CleanedDataset>>) + Send + 'static,
    {
        if let Some(k) = target.candidate() {
            self.check_component(k)?;
        }
        let jobs = self.jobs.as_ref().ok_or(Error::EngineStopped)?;

        let mut admission = self.shared.admission.lock();
        if admission.in_flight.contains(&target) {
            warn!("rejected recompute for {target:?}: already in flight");
            return Err(Error::RecomputePending(target));
        }
        let fingerprint = self.shared.exclusion.lock().snapshot();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        admission.in_flight.insert(target);
        admission.pending += 1;
        if admission.pending == 1 {
            self.shared.set_busy(true);
        }

        let job = Job {
            ticket,
            target,
            fingerprint,
            done: Box::new(done),
        };
        if jobs.send(job).is_err() {
            admission.in_flight.remove(&target);
            admission.pending -= 1;
            if admission.pending == 0 {
                self.shared.set_busy(false);
            }
            return Err(Error::EngineStopped);
        }
        debug!("accepted recompute #{ticket} for {target:?}");
        Ok(ticket)
    }

    /// Queue a recompute of `target` and get a handle to await its outcome.
    pub fn request_recompute(&self, target: Target) -> Result<PendingRecompute> {
        let (tx, rx) = channel::bounded(1);
        let ticket = self.submit(target, move |outcome| {
            let _ = tx.send(outcome);
        })?;
        Ok(PendingRecompute { ticket, target, rx })
    }

    fn check_component(&self, k: usize) -> Result<()> {
        let n = self.n_components();
        if k >= n {
            return Err(Error::ComponentOutOfRange { index: k, n_components: n });
        }
        Ok(())
    }
}

impl Drop for RecomputeEngine {
    /// Drains the queue: every accepted request still gets its completion.
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("recompute worker panicked");
            }
        }
    }
}

/// Handle to one accepted request.
pub struct PendingRecompute {
    ticket: u64,
    target: Target,
    rx: Receiver<Result<Arc<CleanedDataset>>>,
}

impl PendingRecompute {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Block until the request completes.
    pub fn wait(self) -> Result<Arc<CleanedDataset>> {
        self.rx.recv().unwrap_or(Err(Error::EngineStopped))
    }

    /// The outcome if it has already arrived.
    pub fn try_result(&self) -> Option<Result<Arc<CleanedDataset>>> {
        self.rx.try_recv().ok()
    }
}

impl Shared {
    fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::Release);
        if let Some(listener) = self.busy_listener.read().as_ref() {
            listener(busy);
        }
    }

    /// Remove `excluded` from the base epochs, rebaseline, measure energy.
    fn reconstruct(&self, dataset: &Dataset, excluded: &BTreeSet<usize>) -> Result<(Array3<f64>, f64)> {
        let mut cleaned = self.decomposition.remove_components(&dataset.epochs, excluded)?;
        if self.config.rebaseline {
            baseline_correct_inplace(&mut cleaned, self.config.baseline)?;
        }
        let retained = dataset.reference.retained(&cleaned)?;
        Ok((cleaned, retained))
    }

    fn run(&self, job: &Job) -> Result<Arc<CleanedDataset>> {
        let dataset = self.dataset.read();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.cache
                .get_or_compute(job.target, &job.fingerprint, |excluded| self.reconstruct(&dataset, excluded))
        }));
        drop(dataset);
        // A toggle during the computation leaves this result stale on arrival.
        let current = self.exclusion.lock().snapshot();
        self.cache.invalidate_stale(&current);
        match outcome {
            Ok(Ok(entry)) => Ok(entry),
            Ok(Err(e)) => Err(Error::RecomputeFailed(Box::new(e))),
            Err(payload) => Err(Error::RecomputeFailed(Box::new(Error::Panicked(panic_message(&*payload))))),
        }
    }

    fn release(&self, target: Target) {
        let mut admission = self.admission.lock();
        admission.in_flight.remove(&target);
        admission.pending -= 1;
        if admission.pending == 0 {
            self.set_busy(false);
        }
    }
}

/// Releases a request's admission slot when dropped, so the busy flag is
/// cleared exactly once even if the completion callback panics.
struct Release<'a> {
    shared: &'a Shared,
    target: Target,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.shared.release(self.target);
    }
}

fn worker_loop(shared: Arc<Shared>, jobs: Receiver<Job>) {
    for job in jobs.iter() {
        let _release = Release {
            shared: &*shared,
            target: job.target,
        };
        let outcome = shared.run(&job);
        match &outcome {
            Ok(entry) => info!(
                "recompute #{} for {:?} done: {:.2}% energy retained",
                job.ticket, job.target, entry.retained_energy
            ),
            Err(e) => warn!("recompute #{} for {:?} failed: {e}", job.ticket, job.target),
        }
        let done = job.done;
        if panic::catch_unwind(AssertUnwindSafe(move || done(outcome))).is_err() {
            error!("completion callback for recompute #{} panicked", job.ticket);
        }
    }
    debug!("recompute worker exiting");
}

fn prepare(
    mut epochs: Array3<f64>,
    decomposition: &dyn Decomposition,
    config: &EngineConfig,
) -> Result<Dataset> {
    let n_ch = epochs.dim().1;
    if n_ch != decomposition.n_channels() {
        return Err(Error::shape_mismatch(&[decomposition.n_channels()], &[n_ch]));
    }
    if config.apply_baseline {
        baseline_correct_inplace(&mut epochs, config.baseline)?;
    }
    let reference = ReferenceEnergy::new(&epochs)?;
    Ok(Dataset { epochs, reference })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
