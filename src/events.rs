//! Event onsets and the interpolation window placed around each of them.
use ndarray::Array2;

use crate::interp::Gap;

/// Strictly increasing sample indices of stimulation events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnsetSet(Vec<usize>);

impl OnsetSet {
    /// Build from arbitrary indices; the result is sorted and deduplicated.
    pub fn new(onsets: impl IntoIterator<Item = usize>) -> Self {
        let mut v: Vec<usize> = onsets.into_iter().collect();
        v.sort_unstable();
        v.dedup();
        Self(v)
    }

    /// Onsets from an MNE-style events table `[n, 3]` of
    /// `(sample, previous value, event code)`, keeping rows whose code equals
    /// `code`. Rows with a negative sample index are ignored.
    pub fn from_events(events: &Array2<i64>, code: i64) -> Self {
        Self::new(
            events
                .rows()
                .into_iter()
                .filter(|row| row.len() >= 3 && row[2] == code && row[0] >= 0)
                .map(|row| row[0] as usize),
        )
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<usize> for OnsetSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Signed sample offsets `[start, end]` (inclusive) relative to an onset.
///
/// The common TMS setting removes 2 ms before to 10 ms after the pulse:
///
/// ```
/// use icapp::InterpolationWindow;
/// let w = InterpolationWindow::from_seconds(-0.002, 0.01, 5000.0);
/// assert_eq!((w.start, w.end), (-10, 50));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpolationWindow {
    pub start: isize,
    pub end: isize,
}

impl InterpolationWindow {
    pub fn new(start: isize, end: isize) -> Self {
        Self { start, end }
    }

    /// Convert second offsets to samples, truncating toward zero.
    pub fn from_seconds(tmin: f64, tmax: f64, sfreq: f64) -> Self {
        Self {
            start: (tmin * sfreq).trunc() as isize,
            end: (tmax * sfreq).trunc() as isize,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// The gap this window cuts around `onset`.
    pub fn gap_at(&self, onset: usize) -> Gap {
        let onset = onset as isize;
        Gap::new(onset + self.start, onset + self.end)
    }
}
