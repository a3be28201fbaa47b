//! Configuration for the artifact pass and the recompute engine.
//!
//! Both structs keep every field `pub` so they can be built with
//! struct-update syntax on top of [`Default`].

use crate::baseline::BaselineInterval;
use crate::events::InterpolationWindow;
use crate::interp::BoundaryPolicy;

/// Settings for TMS pulse-artifact removal on continuous data.
///
/// ```
/// use icapp::{ArtifactConfig, BoundaryPolicy};
///
/// let cfg = ArtifactConfig {
///     tmax:     0.005,                      // shorter post-pulse gap
///     boundary: BoundaryPolicy::AllSamples,
///     ..ArtifactConfig::default()
/// };
/// assert_eq!(cfg.window(1000.0).end, 5);
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    /// Start of the removed window relative to each onset, in seconds.
    ///
    /// Common practice is 1–2 ms before the pulse.
    ///
    /// Default: `-0.002` s.
    pub tmin: f64,

    /// End of the removed window relative to each onset, in seconds
    /// (inclusive after conversion to samples).
    ///
    /// Common practice is 5–10 ms after the pulse.
    ///
    /// Default: `0.01` s.
    pub tmax: f64,

    /// Which samples the cubic is fitted through.
    ///
    /// [`BoundaryPolicy::FlankingPairs`] uses two samples on each side of
    /// each gap; [`BoundaryPolicy::AllSamples`] fits a not-a-knot spline
    /// through every sample outside every gap.
    ///
    /// Default: [`BoundaryPolicy::FlankingPairs`].
    pub boundary: BoundaryPolicy,

    /// Event code marking a stimulation pulse in the events table.
    ///
    /// Default: `1128`.
    pub event_code: i64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            tmin: -0.002,
            tmax: 0.01,
            boundary: BoundaryPolicy::FlankingPairs,
            event_code: 1128,
        }
    }
}

impl ArtifactConfig {
    /// The window in samples at `sfreq`, truncated toward zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use icapp::ArtifactConfig;
    /// let w = ArtifactConfig::default().window(1000.0);
    /// assert_eq!((w.start, w.end), (-2, 10));
    /// ```
    pub fn window(&self, sfreq: f64) -> InterpolationWindow {
        InterpolationWindow::from_seconds(self.tmin, self.tmax, sfreq)
    }
}

/// Settings for the component-curation recompute engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Baseline-correct the input epochs once, before the reference energy
    /// is measured.
    ///
    /// Default: `true`.
    pub apply_baseline: bool,

    /// Baseline-correct every reconstruction. Removing components can
    /// introduce DC shifts that would otherwise inflate the retained energy.
    ///
    /// Default: `true`.
    pub rebaseline: bool,

    /// Baseline interval `[start, end)` in samples within each epoch.
    /// `None` uses the whole epoch.
    ///
    /// Default: `None`.
    pub baseline: Option<BaselineInterval>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            apply_baseline: true,
            rebaseline: true,
            baseline: None,
        }
    }
}
