//! Retained-energy percentage.
//!
//! `100 · Σ C² / Σ R²` over every sample of every channel (and trial).
use ndarray::{ArrayBase, Data, Dimension};

use crate::error::{Error, Result};

/// Sum of squared samples.
pub fn total_energy<S, D>(x: &ArrayBase<S, D>) -> f64
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    x.iter().map(|&v| v * v).sum()
}

/// `100 · Σ candidate² / Σ reference²`.
///
/// # Errors
///
/// * [`Error::ShapeMismatch`] when the shapes differ.
/// * [`Error::DivisionByZero`] when the reference has zero energy.
pub fn retained_energy<S1, S2, D>(reference: &ArrayBase<S1, D>, candidate: &ArrayBase<S2, D>) -> Result<f64>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    ReferenceEnergy::new(reference)?.retained(candidate)
}

/// Precomputed reference energy, reused for every candidate of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEnergy {
    total: f64,
    shape: Vec<usize>,
}

impl ReferenceEnergy {
    pub fn new<S, D>(reference: &ArrayBase<S, D>) -> Result<Self>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let total = total_energy(reference);
        if total == 0.0 {
            return Err(Error::DivisionByZero);
        }
        Ok(Self {
            total,
            shape: reference.shape().to_vec(),
        })
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn retained<S, D>(&self, candidate: &ArrayBase<S, D>) -> Result<f64>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        if candidate.shape() != self.shape.as_slice() {
            return Err(Error::shape_mismatch(&self.shape, candidate.shape()));
        }
        Ok(100.0 * total_energy(candidate) / self.total)
    }
}
