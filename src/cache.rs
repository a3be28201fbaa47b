//! Per-target cache of cleaned datasets.
//!
//! Each [`Target`] owns one slot that moves through
//! `Empty → Computing → Ready`. A slot is only valid for the exclusion
//! [`Fingerprint`] it was computed from; lookups with any other fingerprint
//! treat it as empty, so a toggle invalidates lazily without touching the
//! cache. At most one computation per target is in flight: a concurrent
//! request for that target waits for it, then takes the result if the
//! fingerprint matches or starts its own computation otherwise.
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;
use ndarray::Array3;
use parking_lot::{Condvar, Mutex};

use crate::error::Result;
use crate::exclusion::Fingerprint;

/// What is being computed: the dataset with all excluded components removed,
/// or a preview with one more candidate component removed as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Current,
    Preview(usize),
}

impl Target {
    pub fn candidate(self) -> Option<usize> {
        match self {
            Target::Current => None,
            Target::Preview(k) => Some(k),
        }
    }
}

/// A reconstructed dataset and its retained energy.
#[derive(Debug, Clone)]
pub struct CleanedDataset {
    pub target: Target,
    pub fingerprint: Fingerprint,
    /// `[E, C, T]`.
    pub data: Array3<f64>,
    /// Percentage of the reference energy left after removal.
    pub retained_energy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Computing,
    Ready,
}

enum Slot {
    Computing { version: u64, generation: u64 },
    Ready(Arc<CleanedDataset>),
}

#[derive(Default)]
struct Slots {
    slots: HashMap<Target, Slot>,
    /// Bumped by [`RecomputeCache::clear`]; computations started under an
    /// older generation never publish.
    generation: u64,
}

#[derive(Default)]
pub struct RecomputeCache {
    inner: Mutex<Slots>,
    changed: Condvar,
    computations: AtomicUsize,
}

impl RecomputeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `target` as seen by a reader holding `fp`.
    pub fn state(&self, target: Target, fp: &Fingerprint) -> SlotState {
        let inner = self.inner.lock();
        match inner.slots.get(&target) {
            Some(Slot::Ready(e)) if e.fingerprint == *fp => SlotState::Ready,
            Some(Slot::Computing { version, generation })
                if *version == fp.version() && *generation == inner.generation =>
            {
                SlotState::Computing
            }
            _ => SlotState::Empty,
        }
    }

    /// The Ready value for `target`, if it was computed from `fp`.
    pub fn get(&self, target: Target, fp: &Fingerprint) -> Option<Arc<CleanedDataset>> {
        match self.inner.lock().slots.get(&target) {
            Some(Slot::Ready(e)) if e.fingerprint == *fp => Some(Arc::clone(e)),
            _ => None,
        }
    }

    /// Return the cached value for `(target, fp)` or compute it.
    ///
    /// `compute` receives the exclusion set including the target's candidate
    /// and returns the cleaned data with its retained energy. On error (or
    /// panic) the slot goes back to Empty and the error is returned as is.
    pub fn get_or_compute<F>(&self, target: Target, fp: &Fingerprint, compute: F) -> Result<Arc<CleanedDataset>>
    where
        F: FnOnce(&BTreeSet<usize>) -> Result<(Array3<f64>, f64)>,
    {
        let generation = {
            let mut inner = self.inner.lock();
            loop {
                let current_gen = inner.generation;
                let in_flight = match inner.slots.get(&target) {
                    Some(Slot::Ready(e)) if e.fingerprint == *fp => {
                        debug!("cache hit for {target:?} at version {}", fp.version());
                        return Ok(Arc::clone(e));
                    }
                    Some(Slot::Computing { generation, .. }) => *generation == current_gen,
                    _ => false,
                };
                if !in_flight {
                    break;
                }
                self.changed.wait(&mut inner);
            }
            let generation = inner.generation;
            inner.slots.insert(target, Slot::Computing { version: fp.version(), generation });
            generation
        };

        debug!("cache miss for {target:?} at version {}", fp.version());
        self.computations.fetch_add(1, Ordering::Relaxed);
        let mut guard = Publish {
            cache: self,
            target,
            version: fp.version(),
            generation,
            ready: None,
        };

        let (data, retained_energy) = compute(&fp.with_candidate(target.candidate()))?;
        let entry = Arc::new(CleanedDataset {
            target,
            fingerprint: fp.clone(),
            data,
            retained_energy,
        });
        guard.ready = Some(Arc::clone(&entry));
        Ok(entry)
    }

    /// Drop Ready entries computed from any fingerprint other than `fp`.
    /// Returns how many were dropped.
    pub fn invalidate_stale(&self, fp: &Fingerprint) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.slots.len();
        inner
            .slots
            .retain(|_, slot| !matches!(slot, Slot::Ready(e) if e.fingerprint != *fp));
        before - inner.slots.len()
    }

    /// Number of Ready entries held, whatever fingerprint they belong to.
    pub fn ready_len(&self) -> usize {
        self.inner
            .lock()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Forget everything, e.g. after the base dataset changed.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.generation += 1;
        drop(inner);
        self.changed.notify_all();
    }

    /// Number of times a compute function has been invoked.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }
}

/// Ends a `Computing` slot: publishes `ready` or resets the slot to Empty,
/// then wakes waiters. Runs on success, error and unwind alike.
struct Publish<'a> {
    cache: &'a RecomputeCache,
    target: Target,
    version: u64,
    generation: u64,
    ready: Option<Arc<CleanedDataset>>,
}

impl Drop for Publish<'_> {
    fn drop(&mut self) {
        let mut inner = self.cache.inner.lock();
        let ours = matches!(
            inner.slots.get(&self.target),
            Some(Slot::Computing { version, generation })
                if *version == self.version && *generation == self.generation
        );
        if ours {
            match self.ready.take() {
                Some(entry) => {
                    inner.slots.insert(self.target, Slot::Ready(entry));
                }
                None => {
                    inner.slots.remove(&self.target);
                }
            }
        }
        drop(inner);
        self.cache.changed.notify_all();
    }
}
