//! # icapp: TMS artifact interpolation and ICA curation engine
//!
//! `icapp` is the numeric core behind an interactive ICA component review
//! tool for TMS-EEG. It does two things:
//!
//! 1. **Pulse-artifact removal.** The samples around every stimulation onset
//!    are cut out of each channel and refilled with a cubic fitted through
//!    the surrounding signal.
//! 2. **Incremental recomputation.** While a user marks components for
//!    removal, the cleaned dataset ("current") and a "what if this one went
//!    too" preview are rebuilt on a background thread, cached per exclusion
//!    fingerprint, and reported with the percentage of signal energy kept.
//!
//! The ICA fit, plotting and all window handling live outside this crate.
//!
//! ## Data flow
//!
//! ```text
//! raw [C, T] + events
//!   │
//!   ├─ OnsetSet::from_events()     pulses with one event code
//!   ├─ ArtifactRemovalPass::run()  cubic refill of [onset+start, onset+end]
//!   ├─ epoch::epoch_around()       event-locked trials [E, C, T]
//!   │
//!   │   (external ICA fit → mixing [C, N] + activations [E, N, T])
//!   │
//!   └─ RecomputeEngine
//!        toggle(k) ──► ExclusionState (versioned)
//!        request_recompute(Current | Preview(k))
//!          └─► RecomputeCache ─► remove components ─► rebaseline ─► energy %
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use icapp::{
//!     remove_and_interpolate, EngineConfig, InterpolationWindow, LinearDecomposition,
//!     OnsetSet, RecomputeEngine, Target,
//! };
//! use ndarray::{Array2, Array3};
//!
//! // 1. Interpolate over the pulse artifact.
//! let raw: Array2<f64> = Array2::zeros((4, 1000));
//! let onsets = OnsetSet::new([100, 400, 700]);
//! let clean = remove_and_interpolate(&raw, &onsets, InterpolationWindow::new(-2, 10)).unwrap();
//!
//! // 2. Curate components of an (externally fitted) decomposition.
//! let epochs: Array3<f64> = Array3::zeros((3, 4, 200));
//! let ica = LinearDecomposition::new(Array2::eye(4), Array3::zeros((3, 4, 200))).unwrap();
//! let engine = RecomputeEngine::new(epochs, Arc::new(ica), None::<usize>, EngineConfig::default()).unwrap();
//!
//! engine.toggle(2).unwrap();
//! let current = engine.request_recompute(Target::Current).unwrap().wait().unwrap();
//! println!("{:.2}% of the energy retained", current.retained_energy);
//! # let _ = clean;
//! ```

pub mod artifact;
pub mod baseline;
pub mod cache;
pub mod config;
pub mod decomposition;
pub mod energy;
pub mod engine;
pub mod epoch;
pub mod error;
pub mod events;
pub mod exclusion;
pub mod interp;
pub mod io;

use ndarray::Array2;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// artifact removal
pub use artifact::{remove_and_interpolate, ArtifactRemovalPass};
pub use events::{InterpolationWindow, OnsetSet};
pub use interp::{BoundaryPolicy, CubicSpline, Gap, GapFailure, GapInterpolator};

// curation engine
pub use cache::{CleanedDataset, RecomputeCache, SlotState, Target};
pub use decomposition::{Decomposition, LinearDecomposition};
pub use energy::{retained_energy, total_energy, ReferenceEnergy};
pub use engine::{BusyListener, Completion, PendingRecompute, RecomputeEngine};
pub use exclusion::{ExclusionState, Fingerprint};

// shared
pub use baseline::{baseline_correct_inplace, BaselineInterval};
pub use config::{ArtifactConfig, EngineConfig};
pub use epoch::{epoch_around, epoch_seconds};
pub use error::{Error, Result};

/// Remove the TMS pulse artifact from a continuous recording.
///
/// Selects the onsets of `cfg.event_code` from an MNE-style `events` table
/// (`[n, 3]`: sample, previous value, code), converts
/// `[cfg.tmin, cfg.tmax]` to samples at `sfreq`, and runs an
/// [`ArtifactRemovalPass`] with `cfg.boundary` over every channel.
///
/// Returns the corrected `[C, T]` data and the onsets that were used.
///
/// # Errors
///
/// Any [`Error`] from [`ArtifactRemovalPass::run`]; the input is never
/// modified and no partially corrected data is returned.
///
/// # Examples
///
/// ```
/// use icapp::{clean_recording, ArtifactConfig};
/// use ndarray::{array, Array2};
///
/// let data = Array2::from_shape_fn((2, 200), |(c, t)| (c + t) as f64);
/// let events = array![[50, 0, 1128], [120, 0, 1128], [160, 0, 3]];
/// let (clean, onsets) = clean_recording(&data, &events, 1000.0, &ArtifactConfig::default()).unwrap();
/// assert_eq!(onsets.as_slice(), &[50, 120]);
/// assert_eq!(clean.dim(), (2, 200));
/// ```
pub fn clean_recording(
    data: &Array2<f64>,
    events: &Array2<i64>,
    sfreq: f64,
    cfg: &ArtifactConfig,
) -> Result<(Array2<f64>, OnsetSet)> {
    let onsets = OnsetSet::from_events(events, cfg.event_code);
    let pass = ArtifactRemovalPass::new(cfg.window(sfreq), cfg.boundary);
    let clean = pass.run(data, &onsets)?;
    Ok((clean, onsets))
}
