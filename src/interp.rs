//! Gap removal and cubic reconstruction on a single channel.
//!
//! A gap `[x1, x2]` (inclusive) is cut out of `y` and refilled with a cubic
//! fitted through samples that flank it. Two node conventions are supported:
//!
//! * [`BoundaryPolicy::FlankingPairs`]: exactly two samples on each side:
//!   `x1-2, x1-1, x2+1, x2+2`. The fit is the unique cubic through those four
//!   points (what `scipy.interpolate.interp1d(kind='cubic')` produces for four
//!   nodes). Gaps are filled one after the other, in order.
//! * [`BoundaryPolicy::AllSamples`]: every sample outside every gap is a
//!   node of a not-a-knot cubic spline, which is then evaluated inside each
//!   gap.
//!
//! In both cases samples outside the gaps are copied through untouched and
//! nothing is extrapolated: every gap needs nodes on both sides.
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Which samples serve as fit nodes around a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BoundaryPolicy {
    /// Two samples immediately before and two immediately after the gap.
    #[default]
    FlankingPairs,
    /// All samples that are not inside any gap.
    AllSamples,
}

impl BoundaryPolicy {
    /// Minimum number of nodes needed strictly before and strictly after a gap.
    pub fn required_per_side(self) -> usize {
        match self {
            BoundaryPolicy::FlankingPairs => 2,
            BoundaryPolicy::AllSamples => 1,
        }
    }
}

impl FromStr for BoundaryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flanking" | "flanking-pairs" | "pairs" => Ok(BoundaryPolicy::FlankingPairs),
            "all" | "all-samples" => Ok(BoundaryPolicy::AllSamples),
            other => Err(format!("unknown boundary policy '{other}' (expected 'flanking' or 'all')")),
        }
    }
}

impl fmt::Display for BoundaryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryPolicy::FlankingPairs => f.write_str("flanking"),
            BoundaryPolicy::AllSamples => f.write_str("all"),
        }
    }
}

/// Inclusive sample range to remove. Signed so that windows computed from
/// `onset + offset` can be range-checked instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub x1: isize,
    pub x2: isize,
}

impl Gap {
    pub fn new(x1: isize, x2: isize) -> Self {
        Self { x1, x2 }
    }
}

/// A gap that could not be filled: index into the gap list plus the cause.
#[derive(Debug, Clone, PartialEq)]
pub struct GapFailure {
    pub gap: usize,
    pub error: Error,
}

/// Removes gaps from a 1-D signal and reconstructs them by cubic interpolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GapInterpolator {
    policy: BoundaryPolicy,
}

impl GapInterpolator {
    pub fn new(policy: BoundaryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> BoundaryPolicy {
        self.policy
    }

    /// Replace `y[x1..=x2]` with a cubic interpolant. Returns a new signal of
    /// the same length; `y` is never modified.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidWindow`] unless `0 <= x1 < x2 < y.len()`.
    /// * [`Error::InsufficientBoundary`] when the policy's flanking nodes do
    ///   not exist on both sides.
    pub fn remove_and_interpolate(&self, y: &[f64], x1: isize, x2: isize) -> crate::Result<Vec<f64>> {
        self.apply(y, &[Gap::new(x1, x2)]).map_err(|f| f.error)
    }

    /// Fill every gap in `gaps` (ascending, non-overlapping).
    ///
    /// All gaps are validated before any sample is written, so a failure
    /// never leaves a half-processed result behind.
    pub fn apply(&self, y: &[f64], gaps: &[Gap]) -> Result<Vec<f64>, GapFailure> {
        let len = y.len();
        self.validate(gaps, len)?;

        let mut out = y.to_vec();
        match self.policy {
            BoundaryPolicy::FlankingPairs => {
                for gap in gaps {
                    fill_flanking(&mut out, gap.x1 as usize, gap.x2 as usize);
                }
            }
            BoundaryPolicy::AllSamples => {
                let (xs, ys) = outside_nodes(&out, gaps);
                let spline = CubicSpline::not_a_knot(xs, ys);
                for gap in gaps {
                    for i in gap.x1 as usize..=gap.x2 as usize {
                        out[i] = spline.eval(i as f64);
                    }
                }
            }
        }
        Ok(out)
    }

    fn validate(&self, gaps: &[Gap], len: usize) -> Result<(), GapFailure> {
        let fail = |gap: usize, error: Error| Err(GapFailure { gap, error });
        let n = len as isize;

        for (i, g) in gaps.iter().enumerate() {
            if !(0 <= g.x1 && g.x1 < g.x2 && g.x2 < n) {
                return fail(i, Error::InvalidWindow { x1: g.x1, x2: g.x2, len });
            }
            if i > 0 && g.x1 <= gaps[i - 1].x2 {
                return fail(i, Error::OverlappingWindows {
                    first: gaps[i - 1].x1,
                    second: g.x1,
                });
            }
        }

        let insufficient = |g: &Gap| Error::InsufficientBoundary {
            x1: g.x1,
            x2: g.x2,
            len,
            required: self.policy.required_per_side(),
        };

        match self.policy {
            BoundaryPolicy::FlankingPairs => {
                for (i, g) in gaps.iter().enumerate() {
                    if g.x1 < 2 || g.x2 + 2 >= n {
                        return fail(i, insufficient(g));
                    }
                }
            }
            BoundaryPolicy::AllSamples => {
                let Some(first) = gaps.first() else { return Ok(()) };
                let removed: usize = gaps.iter().map(|g| (g.x2 - g.x1 + 1) as usize).sum();
                if len - removed < 4 {
                    return fail(0, insufficient(first));
                }
                // Gaps are sorted, so only the outermost ones can lack a node.
                if first.x1 < 1 {
                    return fail(0, insufficient(first));
                }
                let last_idx = gaps.len() - 1;
                let last = &gaps[last_idx];
                if last.x2 + 1 >= n {
                    return fail(last_idx, insufficient(last));
                }
            }
        }
        Ok(())
    }
}

/// Fill one gap using the cubic through the two samples on either side.
fn fill_flanking(y: &mut [f64], x1: usize, x2: usize) {
    let nodes = [x1 - 2, x1 - 1, x2 + 1, x2 + 2];
    let xs = nodes.map(|i| i as f64);
    let ys = nodes.map(|i| y[i]);
    let coef = divided_differences(&xs, &ys);
    for i in x1..=x2 {
        y[i] = newton_eval(&xs, &coef, i as f64);
    }
}

/// Newton divided-difference coefficients of the cubic through four points.
/// Identical `ys` give all-zero higher coefficients, so constants are exact.
fn divided_differences(xs: &[f64; 4], ys: &[f64; 4]) -> [f64; 4] {
    let mut c = *ys;
    for j in 1..4 {
        for i in (j..4).rev() {
            c[i] = (c[i] - c[i - 1]) / (xs[i] - xs[i - j]);
        }
    }
    c
}

fn newton_eval(xs: &[f64; 4], c: &[f64; 4], x: f64) -> f64 {
    let mut p = c[3];
    for i in (0..3).rev() {
        p = p * (x - xs[i]) + c[i];
    }
    p
}

/// Every sample outside every gap, as (position, value) node arrays.
fn outside_nodes(y: &[f64], gaps: &[Gap]) -> (Vec<f64>, Vec<f64>) {
    let mut xs = Vec::with_capacity(y.len());
    let mut ys = Vec::with_capacity(y.len());
    let mut next = 0usize;
    for g in gaps {
        for i in next..g.x1 as usize {
            xs.push(i as f64);
            ys.push(y[i]);
        }
        next = g.x2 as usize + 1;
    }
    for (i, &v) in y.iter().enumerate().skip(next) {
        xs.push(i as f64);
        ys.push(v);
    }
    (xs, ys)
}

/// Cubic spline with not-a-knot end conditions, stored as node positions,
/// values and second derivatives.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    m: Vec<f64>,
}

impl CubicSpline {
    /// Fit through `x` (strictly increasing, at least 4 nodes) and `y`.
    ///
    /// The not-a-knot conditions make the third derivative continuous at the
    /// second and second-to-last node. Substituting them into the first and
    /// last interior equations keeps the system tridiagonal, which is then
    /// solved with the Thomas algorithm.
    pub fn not_a_knot(x: Vec<f64>, y: Vec<f64>) -> Self {
        let n = x.len();
        debug_assert!(n >= 4 && y.len() == n);

        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let slope: Vec<f64> = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();

        // Unknowns M_1 ..= M_{n-2}.
        let m_len = n - 2;
        let mut a = vec![0.0; m_len];
        let mut b = vec![0.0; m_len];
        let mut c = vec![0.0; m_len];
        let mut d = vec![0.0; m_len];
        for k in 0..m_len {
            let i = k + 1;
            a[k] = h[i - 1];
            b[k] = 2.0 * (h[i - 1] + h[i]);
            c[k] = h[i];
            d[k] = 6.0 * (slope[i] - slope[i - 1]);
        }

        // M_0 = ((h0 + h1) M_1 - h0 M_2) / h1
        let (h0, h1) = (h[0], h[1]);
        b[0] += h0 * (h0 + h1) / h1;
        c[0] -= h0 * h0 / h1;

        // M_{n-1} = ((h_{n-3} + h_{n-2}) M_{n-2} - h_{n-2} M_{n-3}) / h_{n-3}
        let (hp, hl) = (h[n - 3], h[n - 2]);
        b[m_len - 1] += hl * (hp + hl) / hp;
        a[m_len - 1] -= hl * hl / hp;

        let inner = thomas(&a, &b, &c, &d);

        let mut m = Vec::with_capacity(n);
        m.push(((h0 + h1) * inner[0] - h0 * inner[1]) / h1);
        m.extend_from_slice(&inner);
        m.push(((hp + hl) * inner[m_len - 1] - hl * inner[m_len - 2]) / hp);

        Self { x, y, m }
    }

    /// Evaluate at `t`. Points outside the node range use the end pieces.
    pub fn eval(&self, t: f64) -> f64 {
        let n = self.x.len();
        let i = self.x.partition_point(|&xn| xn <= t).clamp(1, n - 1) - 1;
        let h = self.x[i + 1] - self.x[i];
        let dt = t - self.x[i];
        let (mi, mj) = (self.m[i], self.m[i + 1]);
        let b = (self.y[i + 1] - self.y[i]) / h - h * (2.0 * mi + mj) / 6.0;
        let c = mi / 2.0;
        let d = (mj - mi) / (6.0 * h);
        self.y[i] + dt * (b + dt * (c + dt * d))
    }
}

/// Tridiagonal solve: `a` sub-diagonal (a[0] unused), `b` diagonal,
/// `c` super-diagonal (c[last] unused), `d` right-hand side.
fn thomas(a: &[f64], b: &[f64], c: &[f64], d: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut cp = vec![0.0; n];
    let mut dp = vec![0.0; n];
    cp[0] = c[0] / b[0];
    dp[0] = d[0] / b[0];
    for i in 1..n {
        let denom = b[i] - a[i] * cp[i - 1];
        cp[i] = c[i] / denom;
        dp[i] = (d[i] - a[i] * dp[i - 1]) / denom;
    }
    let mut out = vec![0.0; n];
    out[n - 1] = dp[n - 1];
    for i in (0..n - 1).rev() {
        out[i] = dp[i] - cp[i] * out[i + 1];
    }
    out
}
