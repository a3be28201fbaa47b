//! Epoch baseline correction.
//!
//! Matches `epochs.apply_baseline(...)`: for each epoch and channel,
//! `epoch[e, c, :] -= mean(epoch[e, c, start..end])`.
//! With no interval the mean is taken over the whole epoch, as with
//! `apply_baseline((None, None))`.
use ndarray::{s, Array3};

use crate::error::{Error, Result};

/// Half-open sample interval `[start, end)` within an epoch.
pub type BaselineInterval = (usize, usize);

/// Per-channel, per-epoch baseline correction.
/// `epochs`: [E, C, T]  →  epoch[e, c, :] -= mean(epoch[e, c, start..end])
pub fn baseline_correct_inplace(epochs: &mut Array3<f64>, interval: Option<BaselineInterval>) -> Result<()> {
    let (n_e, n_c, n_t) = epochs.dim();
    let (start, end) = interval.unwrap_or((0, n_t));
    if start >= end || end > n_t {
        return Err(Error::InvalidWindow {
            x1: start as isize,
            x2: end as isize,
            len: n_t,
        });
    }

    for e in 0..n_e {
        for c in 0..n_c {
            let m = epochs.slice(s![e, c, start..end]).mean().unwrap_or(0.0);
            epochs.slice_mut(s![e, c, ..]).mapv_inplace(|v| v - m);
        }
    }
    Ok(())
}
