/// Shared synthetic signals and decomposition probes for integration tests.
use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam::channel::Receiver;
use icapp::{Decomposition, InterpolationWindow, LinearDecomposition, OnsetSet};
use ndarray::{s, Array2, Array3};

#[allow(unused)]
/// `[C, T]` of slow sinusoids: channel `c` has period `100 + 37c` samples and
/// amplitude `c + 1`.
pub fn sinusoids(n_ch: usize, n_t: usize) -> Array2<f64> {
    Array2::from_shape_fn((n_ch, n_t), |(c, t)| {
        let period = 100.0 + 37.0 * c as f64;
        (c + 1) as f64 * (2.0 * PI * t as f64 / period).sin()
    })
}

#[allow(unused)]
/// Copy of `data` with a large alternating artifact inside every gap.
pub fn with_pulses(data: &Array2<f64>, onsets: &OnsetSet, window: InterpolationWindow) -> Array2<f64> {
    let mut out = data.clone();
    for onset in onsets.iter() {
        let g = window.gap_at(onset);
        for t in g.x1..=g.x2 {
            let sign = if t % 2 == 0 { 1.0 } else { -1.0 };
            out.column_mut(t as usize).fill(sign * 500.0);
        }
    }
    out
}

#[allow(unused)]
/// Epochs that are exactly `A · S` for a fixed mixing matrix and activations.
pub fn mixture(n_e: usize, n_ch: usize, n_comp: usize, n_t: usize) -> (Array3<f64>, LinearDecomposition) {
    let mixing = Array2::from_shape_fn((n_ch, n_comp), |(c, k)| {
        let base = ((c * 3 + k * 5) % 7) as f64 - 3.0;
        if c == k { base + 4.0 } else { base }
    });
    let activations = Array3::from_shape_fn((n_e, n_comp, n_t), |(e, k, t)| {
        (k + 1) as f64 * (0.05 * (k + 1) as f64 * t as f64 + e as f64).sin()
    });
    let mut epochs = Array3::zeros((n_e, n_ch, n_t));
    for e in 0..n_e {
        let x = mixing.dot(&activations.slice(s![e, .., ..]));
        epochs.slice_mut(s![e, .., ..]).assign(&x);
    }
    let d = LinearDecomposition::new(mixing, activations).unwrap();
    (epochs, d)
}

#[allow(unused)]
/// Wraps a [`LinearDecomposition`] to count calls, block on a gate, or fail.
pub struct Probe {
    pub inner: LinearDecomposition,
    pub calls: AtomicUsize,
    pub gate: Option<Receiver<()>>,
    pub fail: AtomicBool,
    pub panic: AtomicBool,
}

#[allow(unused)]
impl Probe {
    pub fn new(inner: LinearDecomposition) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            gate: None,
            fail: AtomicBool::new(false),
            panic: AtomicBool::new(false),
        }
    }

    /// Each reconstruction waits for one message on `gate`.
    pub fn gated(inner: LinearDecomposition, gate: Receiver<()>) -> Self {
        Self { gate: Some(gate), ..Self::new(inner) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[allow(unused)]
impl Decomposition for Probe {
    fn n_components(&self) -> usize {
        self.inner.n_components()
    }

    fn n_channels(&self) -> usize {
        self.inner.n_channels()
    }

    fn remove_components(&self, data: &Array3<f64>, excluded: &BTreeSet<usize>) -> icapp::Result<Array3<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.recv().expect("gate closed");
        }
        if self.panic.load(Ordering::SeqCst) {
            panic!("probe asked to panic");
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(icapp::Error::Decomposition("probe asked to fail".into()));
        }
        self.inner.remove_components(data, excluded)
    }
}
