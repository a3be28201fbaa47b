//! Event-locked epoching.
//!
//! Cuts one `[C, pre + post + 1]` trial out of continuous `[C, T]` data
//! around each onset (`onset - pre ..= onset + post`). Onsets whose trial
//! would run past either end of the recording are dropped, as MNE does.
use ndarray::{s, Array2, Array3};

use crate::events::OnsetSet;

/// Epoch `data` around `onsets` into `[E, C, pre + post + 1]`.
///
/// Returns the epochs and the onsets that were kept, in order.
pub fn epoch_around(data: &Array2<f64>, onsets: &OnsetSet, pre: usize, post: usize) -> (Array3<f64>, Vec<usize>) {
    let (n_ch, n_t) = data.dim();
    let kept: Vec<usize> = onsets
        .iter()
        .filter(|&o| o >= pre && o + post < n_t)
        .collect();

    let width = pre + post + 1;
    let mut out = Array3::<f64>::zeros((kept.len(), n_ch, width));
    for (e, &onset) in kept.iter().enumerate() {
        let start = onset - pre;
        out.slice_mut(s![e, .., ..])
            .assign(&data.slice(s![.., start..start + width]));
    }
    (out, kept)
}

/// Same as [`epoch_around`] with the window given in seconds
/// (`tmin <= 0 <= tmax`), rounded to the nearest sample.
pub fn epoch_seconds(
    data: &Array2<f64>,
    onsets: &OnsetSet,
    tmin: f64,
    tmax: f64,
    sfreq: f64,
) -> (Array3<f64>, Vec<usize>) {
    let pre = (-tmin * sfreq).round().max(0.0) as usize;
    let post = (tmax * sfreq).round().max(0.0) as usize;
    epoch_around(data, onsets, pre, post)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_count_and_shape() {
        let data = Array2::from_elem((12, 3840), 1.0);
        let (epochs, kept) = epoch_around(&data, &OnsetSet::new([500, 1500, 2500]), 100, 399);
        assert_eq!(epochs.shape(), &[3, 12, 500]);
        assert_eq!(kept, vec![500, 1500, 2500]);
    }

    #[test]
    fn edge_onsets_dropped() {
        let data = Array2::from_elem((4, 1000), 0.5);
        let (epochs, kept) = epoch_around(&data, &OnsetSet::new([50, 500, 950]), 100, 100);
        assert_eq!(epochs.shape()[0], 1);
        assert_eq!(kept, vec![500]);
    }

    #[test]
    fn onset_sample_lands_at_pre() {
        let data = Array2::from_shape_fn((2, 300), |(c, t)| (c * 1000 + t) as f64);
        let (epochs, _) = epoch_seconds(&data, &OnsetSet::new([120]), -0.02, 0.05, 1000.0);
        assert_eq!(epochs.shape(), &[1, 2, 71]);
        assert_eq!(epochs[[0, 0, 20]], 120.0);
        assert_eq!(epochs[[0, 1, 0]], 1100.0);
    }
}
