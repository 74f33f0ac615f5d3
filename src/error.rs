//! # Error
//!
//! $$
//! \mathcal{E}=\{\text{configuration},\ \text{data insufficiency},\ \text{domain},\ \text{input}\}
//! $$
//!
//! Error taxonomy shared by the aggregator, the optimizer and the expectation engine.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BgnbdError>;

/// All errors surfaced by the engine.
///
/// Infeasible parameter candidates never show up here: the likelihood maps them to
/// `+inf` and the optimizer simply walks away from them.
#[derive(Debug, Error)]
pub enum BgnbdError {
  /// Invalid call configuration (restart count, window bounds, filters, tolerances).
  #[error("configuration error: {0}")]
  Configuration(String),

  /// Not enough data to produce the requested quantity.
  #[error("insufficient data: {0}")]
  DataInsufficiency(String),

  /// Closed-form expectation preconditions violated (`a > 1`, `b + x > 1`).
  #[error("domain error: {0}")]
  Domain(String),

  /// Malformed record, array, date or horizon.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// Runtime failure inside the argmin executor.
  #[error("optimizer failure: {0}")]
  Optimizer(#[from] argmin::core::Error),
}

impl BgnbdError {
  pub(crate) fn config(msg: impl Into<String>) -> Self {
    Self::Configuration(msg.into())
  }

  pub(crate) fn insufficient(msg: impl Into<String>) -> Self {
    Self::DataInsufficiency(msg.into())
  }

  pub(crate) fn domain(msg: impl Into<String>) -> Self {
    Self::Domain(msg.into())
  }

  pub(crate) fn input(msg: impl Into<String>) -> Self {
    Self::InvalidInput(msg.into())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages_carry_the_category() {
    assert_eq!(
      BgnbdError::config("restarts must be >= 1").to_string(),
      "configuration error: restarts must be >= 1"
    );
    assert_eq!(
      BgnbdError::insufficient("empty population").to_string(),
      "insufficient data: empty population"
    );
  }

  #[test]
  fn argmin_errors_convert() {
    let err: BgnbdError = anyhow::anyhow!("line search failed").into();
    assert!(matches!(err, BgnbdError::Optimizer(_)));
  }
}
