//! Number-or-range values.
//!
//! Loop counts, pick counts and sleep durations are written either as a
//! literal (`3`) or as a two-element range (`[3, 6]`) that is re-resolved
//! every time it is read.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{GenloopError, Result};

/// A scalar or an inclusive `[min, max]` range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrRange {
    Value(f64),
    Range(Vec<f64>),
}

impl NumberOrRange {
    pub fn range(min: f64, max: f64) -> Self {
        NumberOrRange::Range(vec![min, max])
    }

    /// Min and max of the sequence, swapped into order.
    fn bounds(values: &[f64]) -> Result<(f64, f64)> {
        if values.is_empty() {
            return Err(GenloopError::InvalidRange("empty range".to_string()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(GenloopError::InvalidRange(format!("non-finite value in {:?}", values)));
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok((min, max))
    }

    /// Resolve to an integer.
    ///
    /// A scalar is truncated. A range yields a uniform integer in
    /// `floor(min)..=ceil(max)`.
    pub fn resolve_int<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<i64> {
        match self {
            NumberOrRange::Value(v) => Ok(v.trunc() as i64),
            NumberOrRange::Range(values) => {
                let (min, max) = Self::bounds(values)?;
                let lo = min.floor() as i64;
                let hi = max.ceil() as i64;
                Ok(rng.random_range(lo..=hi))
            }
        }
    }

    /// Resolve to a non-negative count.
    pub fn resolve_count<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<usize> {
        Ok(self.resolve_int(rng)?.max(0) as usize)
    }

    /// Resolve to a float: a scalar passes through, a range is sampled uniformly.
    pub fn resolve_float<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        match self {
            NumberOrRange::Value(v) => Ok(*v),
            NumberOrRange::Range(values) => {
                let (min, max) = Self::bounds(values)?;
                if min == max {
                    return Ok(min);
                }
                Ok(rng.random_range(min..=max))
            }
        }
    }

    /// Largest integer this value can resolve to.
    pub fn upper_bound(&self) -> Result<i64> {
        match self {
            NumberOrRange::Value(v) => Ok(v.trunc() as i64),
            NumberOrRange::Range(values) => Ok(Self::bounds(values)?.1.ceil() as i64),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            NumberOrRange::Value(v) if !v.is_finite() => {
                Err(GenloopError::InvalidRange(format!("non-finite value {}", v)))
            }
            NumberOrRange::Value(_) => Ok(()),
            NumberOrRange::Range(values) => Self::bounds(values).map(|_| ()),
        }
    }
}

impl From<i64> for NumberOrRange {
    fn from(v: i64) -> Self {
        NumberOrRange::Value(v as f64)
    }
}
