//! Monotone Interpolator
//!
//! Fritsch–Carlson slopes with cubic Hermite evaluation. Between knots the
//! curve never leaves the range of the neighbouring knot values, so a
//! monotone window of samples yields a monotone, overshoot-free trajectory.

use serde::{Deserialize, Serialize};

use crate::error::InterpolationError;

pub type Result<T> = std::result::Result<T, InterpolationError>;

/// A sampled (time offset, angle) pair anchoring the curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Knot {
    /// Seconds from cycle start
    pub t: f64,
    /// Degrees
    pub value: f64,
}

impl Knot {
    pub const fn new(t: f64, value: f64) -> Self {
        Self { t, value }
    }
}

fn validate(x: &[f64], y: &[f64]) -> Result<()> {
    if x.len() != y.len() {
        return Err(InterpolationError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(InterpolationError::TooFewKnots(x.len()));
    }
    for (i, (xi, yi)) in x.iter().zip(y).enumerate() {
        if !xi.is_finite() || !yi.is_finite() {
            return Err(InterpolationError::NonFinite(i));
        }
    }
    for i in 1..x.len() {
        if x[i] <= x[i - 1] {
            return Err(InterpolationError::NotIncreasing(i));
        }
    }
    Ok(())
}

/// Per-knot slopes by the Fritsch–Carlson rule.
///
/// Endpoints take the adjacent secant. An interior slope is zero when the
/// secants on either side disagree in sign or either is flat; otherwise it is
/// the distance-weighted harmonic mean of the two secants.
pub fn fritsch_carlson_slopes(x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
    validate(x, y)?;
    let n = x.len();

    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let d: Vec<f64> = (0..n - 1).map(|k| (y[k + 1] - y[k]) / h[k]).collect();

    let mut m = vec![0.0; n];
    m[0] = d[0];
    m[n - 1] = d[n - 2];

    for i in 1..n - 1 {
        let (d0, d1) = (d[i - 1], d[i]);
        if d0 == 0.0 || d1 == 0.0 || d0.signum() != d1.signum() {
            m[i] = 0.0;
            continue;
        }
        let w1 = 2.0 * h[i] + h[i - 1];
        let w2 = h[i] + 2.0 * h[i - 1];
        m[i] = (w1 + w2) / (w1 / d0 + w2 / d1);
    }

    Ok(m)
}

/// Evaluate the Hermite curve through `(x, y)` with slopes `m` at `xq`.
///
/// Queries outside `[x[0], x[n-1]]` are an error; the curve is never
/// extrapolated.
pub fn evaluate(x: &[f64], y: &[f64], m: &[f64], xq: f64) -> Result<f64> {
    validate(x, y)?;
    if m.len() != x.len() {
        return Err(InterpolationError::LengthMismatch {
            x: x.len(),
            y: m.len(),
        });
    }
    hermite(x, y, m, xq)
}

fn hermite(x: &[f64], y: &[f64], m: &[f64], xq: f64) -> Result<f64> {
    let n = x.len();
    let (lo, hi) = (x[0], x[n - 1]);
    if !xq.is_finite() || xq < lo || xq > hi {
        return Err(InterpolationError::OutOfSpan { xq, lo, hi });
    }

    // first knot strictly greater than xq, pulled back into [1, n-1]
    let k = x.partition_point(|&xi| xi <= xq).clamp(1, n - 1) - 1;

    let h = x[k + 1] - x[k];
    let t = (xq - x[k]) / h;
    let t2 = t * t;
    let t3 = t2 * t;

    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;

    Ok(h00 * y[k] + h10 * h * m[k] + h01 * y[k + 1] + h11 * h * m[k + 1])
}

/// Interpolation segment for one cycle: knots plus precomputed slopes.
///
/// Built once per cycle and evaluated repeatedly; never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct MonotoneCubic {
    x: Vec<f64>,
    y: Vec<f64>,
    m: Vec<f64>,
}

impl MonotoneCubic {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        let m = fritsch_carlson_slopes(&x, &y)?;
        Ok(Self { x, y, m })
    }

    pub fn from_knots(knots: &[Knot]) -> Result<Self> {
        let x = knots.iter().map(|k| k.t).collect();
        let y = knots.iter().map(|k| k.value).collect();
        Self::new(x, y)
    }

    pub fn evaluate(&self, xq: f64) -> Result<f64> {
        hermite(&self.x, &self.y, &self.m, xq)
    }

    pub fn slopes(&self) -> &[f64] {
        &self.m
    }

    /// First and last knot time.
    pub fn span(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }
}
