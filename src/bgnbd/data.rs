//! # RFM Data
//!
//! $$
//! \mathcal{D}=\{(x_i,t_{x,i},T_i)\}_{i=1}^{n},\qquad 0\le t_{x,i}\le T_i
//! $$
//!
use ndarray::Array1;
use ndarray::Zip;

use crate::error::BgnbdError;
use crate::error::Result;

/// Validated parallel arrays `(x, t_x, T)` describing a population.
#[derive(Clone, Debug, PartialEq)]
pub struct RfmData {
  x: Array1<f64>,
  t_x: Array1<f64>,
  t: Array1<f64>,
}

impl RfmData {
  /// Build the arrays, checking lengths and the per-row invariants
  /// `x` a non-negative integer, `T > 0` and `0 <= t_x <= T`.
  pub fn new(x: Array1<f64>, t_x: Array1<f64>, t: Array1<f64>) -> Result<Self> {
    if x.len() != t_x.len() || x.len() != t.len() {
      return Err(BgnbdError::input(format!(
        "x, t_x and T must have the same length ({}, {}, {})",
        x.len(),
        t_x.len(),
        t.len()
      )));
    }
    if x.is_empty() {
      return Err(BgnbdError::insufficient("population is empty"));
    }

    for (i, ((&xi, &txi), &ti)) in x.iter().zip(t_x.iter()).zip(t.iter()).enumerate() {
      if !xi.is_finite() || xi < 0.0 || xi.fract() != 0.0 {
        return Err(BgnbdError::input(format!(
          "row {i}: frequency must be a non-negative integer, got {xi}"
        )));
      }
      if !ti.is_finite() || ti <= 0.0 {
        return Err(BgnbdError::input(format!(
          "row {i}: observation period must be positive, got {ti}"
        )));
      }
      if !txi.is_finite() || txi < 0.0 || txi > ti {
        return Err(BgnbdError::input(format!(
          "row {i}: recency {txi} must lie in [0, {ti}]"
        )));
      }
    }

    Ok(Self { x, t_x, t })
  }

  pub fn from_vecs(x: Vec<f64>, t_x: Vec<f64>, t: Vec<f64>) -> Result<Self> {
    Self::new(x.into(), t_x.into(), t.into())
  }

  pub fn x(&self) -> &Array1<f64> {
    &self.x
  }

  pub fn t_x(&self) -> &Array1<f64> {
    &self.t_x
  }

  pub fn t(&self) -> &Array1<f64> {
    &self.t
  }

  pub fn len(&self) -> usize {
    self.x.len()
  }

  pub fn is_empty(&self) -> bool {
    self.x.is_empty()
  }

  /// Largest observation period of the population.
  pub fn t_max(&self) -> f64 {
    self.t.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v))
  }

  /// Same population with both time columns divided by `factor`.
  pub(crate) fn time_scaled(&self, factor: f64) -> Self {
    Self {
      x: self.x.clone(),
      t_x: &self.t_x / factor,
      t: &self.t / factor,
    }
  }

  /// Fold over `(x, t_x, T)` rows.
  pub(crate) fn fold_rows<F>(&self, init: f64, mut f: F) -> f64
  where
    F: FnMut(f64, f64, f64, f64) -> f64,
  {
    let mut acc = init;
    Zip::from(&self.x)
      .and(&self.t_x)
      .and(&self.t)
      .for_each(|&x, &t_x, &t| acc = f(acc, x, t_x, t));
    acc
  }
}
