//! # Params
//!
//! $$
//! \lambda\sim\Gamma(r,\alpha),\qquad p\sim\mathrm{Beta}(a,b)
//! $$
//!
use std::fmt::Display;

use crate::error::BgnbdError;
use crate::error::Result;

/// Fitted BG/NBD parameters, all strictly positive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelParameters {
  r: f64,
  alpha: f64,
  a: f64,
  b: f64,
}

impl ModelParameters {
  pub fn new(r: f64, alpha: f64, a: f64, b: f64) -> Result<Self> {
    for (name, v) in [("r", r), ("alpha", alpha), ("a", a), ("b", b)] {
      if !v.is_finite() || v <= 0.0 {
        return Err(BgnbdError::input(format!(
          "parameter {name} must be finite and positive, got {v}"
        )));
      }
    }
    Ok(Self { r, alpha, a, b })
  }

  /// Shape of the purchase-rate gamma distribution.
  pub fn r(&self) -> f64 {
    self.r
  }

  /// Scale (time units) of the purchase-rate gamma distribution.
  pub fn alpha(&self) -> f64 {
    self.alpha
  }

  /// First shape of the dropout beta distribution.
  pub fn a(&self) -> f64 {
    self.a
  }

  /// Second shape of the dropout beta distribution.
  pub fn b(&self) -> f64 {
    self.b
  }

  pub fn to_array(&self) -> [f64; 4] {
    [self.r, self.alpha, self.a, self.b]
  }

  /// Same parameters with `alpha` expressed in time units `factor` times larger.
  pub fn with_alpha_scaled(&self, factor: f64) -> Result<Self> {
    Self::new(self.r, self.alpha * factor, self.a, self.b)
  }
}

impl TryFrom<[f64; 4]> for ModelParameters {
  type Error = BgnbdError;

  fn try_from(p: [f64; 4]) -> Result<Self> {
    Self::new(p[0], p[1], p[2], p[3])
  }
}

impl From<ModelParameters> for [f64; 4] {
  fn from(p: ModelParameters) -> Self {
    p.to_array()
  }
}

impl Display for ModelParameters {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "r={:.6}, alpha={:.6}, a={:.6}, b={:.6}",
      self.r, self.alpha, self.a, self.b
    )
  }
}

/// Output of one optimizer run.
#[derive(Clone, Debug, PartialEq)]
pub struct FitResult {
  /// Parameters in the caller's time units.
  pub params: ModelParameters,
  /// Total negative log-likelihood at `params` on the caller's data.
  pub nll: f64,
  /// `false` when the iteration cap was reached first.
  pub converged: bool,
  pub iterations: u64,
  /// Position of the run among the restarts.
  pub restart: usize,
  /// Seed of the random initial guess, `None` for a caller-supplied guess.
  pub seed: Option<u64>,
}

/// Best run of a fitting session together with every restart.
#[derive(Clone, Debug)]
pub struct FitOutcome {
  pub best: FitResult,
  pub restarts: Vec<FitResult>,
  /// Divisor applied to the time columns during optimization (1 when unscaled).
  pub time_scale: f64,
}

impl FitOutcome {
  pub fn params(&self) -> ModelParameters {
    self.best.params
  }

  pub fn nll(&self) -> f64 {
    self.best.nll
  }

  pub fn converged(&self) -> bool {
    self.best.converged
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_non_positive_components() {
    assert!(ModelParameters::new(0.2, 4.0, 0.8, 2.4).is_ok());
    assert!(ModelParameters::new(0.0, 4.0, 0.8, 2.4).is_err());
    assert!(ModelParameters::new(0.2, -4.0, 0.8, 2.4).is_err());
    assert!(ModelParameters::try_from([0.2, 4.0, f64::NAN, 2.4]).is_err());
  }

  #[test]
  fn alpha_rescaling_leaves_shapes_untouched() {
    let p = ModelParameters::new(0.24, 0.11, 0.79, 2.43).unwrap();
    let scaled = p.with_alpha_scaled(39.0).unwrap();
    assert_eq!(scaled.to_array(), [0.24, 0.11 * 39.0, 0.79, 2.43]);
  }
}
