//! Component basis and activations produced by an external ICA fit.
//!
//! The fit itself happens elsewhere. This module only consumes the result:
//! a mixing matrix `A` (`[C, N]`, channel space ← component space) and the
//! component activations `S` (`[E, N, T]`, one time series per trial).
//! Removing a set `K` of components subtracts their back-projection:
//!
//! ```text
//! X_clean[e] = X[e] − A[:, K] · S[e, K, :]
//! ```
use std::collections::BTreeSet;

use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};

use crate::error::{Error, Result};

/// Reconstruction seam used by the recompute engine.
pub trait Decomposition: Send + Sync {
    fn n_components(&self) -> usize;

    fn n_channels(&self) -> usize;

    /// Copy of `data` (`[E, C, T]`) with the contribution of every component
    /// in `excluded` removed. The result depends only on the set contents.
    fn remove_components(&self, data: &Array3<f64>, excluded: &BTreeSet<usize>) -> Result<Array3<f64>>;
}

/// Linear mixing model `X = A · S`.
#[derive(Debug, Clone)]
pub struct LinearDecomposition {
    mixing: Array2<f64>,
    activations: Array3<f64>,
}

impl LinearDecomposition {
    /// `mixing`: `[C, N]`, `activations`: `[E, N, T]`.
    pub fn new(mixing: Array2<f64>, activations: Array3<f64>) -> Result<Self> {
        let n = mixing.ncols();
        let (_, n_act, _) = activations.dim();
        if n != n_act {
            return Err(Error::shape_mismatch(&[n], &[n_act]));
        }
        Ok(Self { mixing, activations })
    }

    pub fn mixing(&self) -> &Array2<f64> {
        &self.mixing
    }

    pub fn activations(&self) -> &Array3<f64> {
        &self.activations
    }

    /// Shape `[E, C, T]` of the epochs this decomposition applies to.
    pub fn data_shape(&self) -> [usize; 3] {
        let (n_e, _, n_t) = self.activations.dim();
        [n_e, self.mixing.nrows(), n_t]
    }

    /// Trials of component `k`, `[E, T]`.
    pub fn activations_of(&self, k: usize) -> Result<ArrayView2<'_, f64>> {
        self.check_index(k)?;
        Ok(self.activations.slice(s![.., k, ..]))
    }

    /// Trial-averaged activation of component `k`, `[T]`.
    pub fn average_activation(&self, k: usize) -> Result<Array1<f64>> {
        let trials = self.activations_of(k)?;
        trials
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::shape_mismatch(&[1], &[0]))
    }

    fn check_index(&self, k: usize) -> Result<()> {
        let n = self.n_components();
        if k >= n {
            return Err(Error::ComponentOutOfRange { index: k, n_components: n });
        }
        Ok(())
    }
}

impl Decomposition for LinearDecomposition {
    fn n_components(&self) -> usize {
        self.mixing.ncols()
    }

    fn n_channels(&self) -> usize {
        self.mixing.nrows()
    }

    fn remove_components(&self, data: &Array3<f64>, excluded: &BTreeSet<usize>) -> Result<Array3<f64>> {
        let expected = self.data_shape();
        if data.shape() != expected {
            return Err(Error::shape_mismatch(&expected, data.shape()));
        }
        for &k in excluded {
            self.check_index(k)?;
        }

        let mut out = data.clone();
        if excluded.is_empty() {
            return Ok(out);
        }

        let idx: Vec<usize> = excluded.iter().copied().collect();
        let a_ex = self.mixing.select(Axis(1), &idx); // [C, K]
        for (e, mut epoch) in out.outer_iter_mut().enumerate() {
            let s_ex = self.activations.slice(s![e, .., ..]).select(Axis(0), &idx); // [K, T]
            epoch -= &a_ex.dot(&s_ex);
        }
        Ok(out)
    }
}
