//! Multichannel pulse-artifact removal.
//!
//! Applies the same [`InterpolationWindow`] at every onset of every channel
//! of a `[C, T]` recording. Channels are independent and are processed in
//! parallel with rayon; the input is never modified.
//!
//! ```text
//!            onset-2 ........ onset+10
//! ch 0  ~~~~~|/\/\/\/\/\/\/\/\/|~~~~~   →   ~~~~~ smooth cubic ~~~~~
//! ch 1  ~~~~~|/\/\/\/\/\/\/\/\/|~~~~~   →   ~~~~~ smooth cubic ~~~~~
//! ```
use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::events::{InterpolationWindow, OnsetSet};
use crate::interp::{BoundaryPolicy, Gap, GapFailure, GapInterpolator};

/// A configured removal pass: one window, one boundary policy.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactRemovalPass {
    window: InterpolationWindow,
    interpolator: GapInterpolator,
}

impl ArtifactRemovalPass {
    pub fn new(window: InterpolationWindow, policy: BoundaryPolicy) -> Self {
        Self {
            window,
            interpolator: GapInterpolator::new(policy),
        }
    }

    pub fn window(&self) -> InterpolationWindow {
        self.window
    }

    pub fn policy(&self) -> BoundaryPolicy {
        self.interpolator.policy()
    }

    /// Gaps for every onset, checked for a well-formed window and for
    /// overlap between neighbouring onsets. Range and boundary checks depend
    /// on the channel length and happen per channel.
    pub fn gaps(&self, onsets: &OnsetSet, n_times: usize) -> Result<Vec<Gap>> {
        if !self.window.is_valid() {
            return Err(Error::InvalidWindow {
                x1: self.window.start,
                x2: self.window.end,
                len: n_times,
            });
        }
        let gaps: Vec<Gap> = onsets.iter().map(|o| self.window.gap_at(o)).collect();
        for (i, pair) in gaps.windows(2).enumerate() {
            if pair[1].x1 <= pair[0].x2 {
                return Err(Error::OverlappingWindows {
                    first: onsets.as_slice()[i] as isize,
                    second: onsets.as_slice()[i + 1] as isize,
                });
            }
        }
        Ok(gaps)
    }

    /// Run the pass over `data` (`[C, T]`), returning a corrected copy.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidWindow`] if `window.start >= window.end`.
    /// * [`Error::OverlappingWindows`] if two onset gaps intersect.
    /// * [`Error::AtChannel`] wrapping [`Error::InvalidWindow`] or
    ///   [`Error::InsufficientBoundary`] for the first channel (by index)
    ///   whose gap at `onset` could not be filled. No partial result is
    ///   returned.
    pub fn run(&self, data: &Array2<f64>, onsets: &OnsetSet) -> Result<Array2<f64>> {
        let (n_ch, n_t) = data.dim();
        let gaps = self.gaps(onsets, n_t)?;
        if gaps.is_empty() {
            debug!("no onsets, artifact pass is a copy");
            return Ok(data.clone());
        }

        let rows: Vec<std::result::Result<Vec<f64>, GapFailure>> = (0..n_ch)
            .into_par_iter()
            .map(|ch| {
                let row = data.row(ch);
                match row.as_slice() {
                    Some(y) => self.interpolator.apply(y, &gaps),
                    None => self.interpolator.apply(&row.to_vec(), &gaps),
                }
            })
            .collect();

        let mut flat = Vec::with_capacity(n_ch * n_t);
        for (channel, row) in rows.into_iter().enumerate() {
            match row {
                Ok(y) => flat.extend(y),
                Err(GapFailure { gap, error }) => {
                    return Err(Error::AtChannel {
                        channel,
                        onset: onsets.as_slice()[gap],
                        source: Box::new(error),
                    });
                }
            }
        }

        info!(
            "interpolated {} gap(s) of {} samples on {} channel(s) ({} boundary)",
            gaps.len(),
            self.window.end - self.window.start + 1,
            n_ch,
            self.policy(),
        );
        let produced = flat.len();
        Array2::from_shape_vec((n_ch, n_t), flat)
            .map_err(|_| Error::shape_mismatch(&[n_ch * n_t], &[produced]))
    }
}

/// Remove and interpolate the window around every onset on every channel,
/// using two flanking samples on each side of each gap.
pub fn remove_and_interpolate(
    data: &Array2<f64>,
    onsets: &OnsetSet,
    window: InterpolationWindow,
) -> Result<Array2<f64>> {
    ArtifactRemovalPass::new(window, BoundaryPolicy::FlankingPairs).run(data, onsets)
}
