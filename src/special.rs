//! # Special
//!
//! $$
//! {}_2F_1(a,b;c;z)=\sum_{n=0}^{\infty}\frac{(a)_n(b)_n}{(c)_n}\frac{z^n}{n!}
//! $$
//!
//! Gauss hypergeometric function on the unit disc, summed term by term.

use crate::error::BgnbdError;
use crate::error::Result;

const MAX_TERMS: usize = 1_000_000;
const REL_EPS: f64 = 1e-15;

/// Gauss hypergeometric function `2F1(a, b; c; z)` for real `|z| < 1`.
///
/// Each term is obtained from the previous one through the ratio
/// `(a+n)(b+n) z / ((c+n)(n+1))`. Once `n` has passed `|a|`, `|b|` and `-c` every
/// factor of that ratio moves monotonically towards one, so
/// `|z| max(1, (a+n)/(n+1)) max(1, (b+n)/(c+n))` bounds all later ratios and the
/// remaining tail is bounded by a geometric series. Summation stops once that bound
/// falls below `1e-15` relative to the partial sum. A sum that leaves the `f64`
/// range is a domain error.
pub fn hyp2f1(a: f64, b: f64, c: f64, z: f64) -> Result<f64> {
  if !(a.is_finite() && b.is_finite() && c.is_finite() && z.is_finite()) {
    return Err(BgnbdError::input(format!(
      "hyp2f1 arguments must be finite (a={a}, b={b}, c={c}, z={z})"
    )));
  }
  if c <= 0.0 && c.fract() == 0.0 {
    return Err(BgnbdError::domain(format!(
      "hyp2f1 is undefined for non-positive integer c={c}"
    )));
  }
  if z.abs() >= 1.0 {
    return Err(BgnbdError::domain(format!(
      "hyp2f1 series requires |z| < 1, got z={z}"
    )));
  }
  if z == 0.0 {
    return Ok(1.0);
  }

  let monotone_from = a.abs().max(b.abs()).max(-c);
  let mut term = 1.0_f64;
  let mut sum = 1.0_f64;

  for n in 0..MAX_TERMS {
    let k = n as f64;
    let ratio = (a + k) * (b + k) / ((c + k) * (k + 1.0)) * z;
    term *= ratio;
    sum += term;

    // a or b hit a non-positive integer: the series is a polynomial and just ended
    if term == 0.0 {
      return Ok(sum);
    }

    if !sum.is_finite() {
      return Err(BgnbdError::domain(format!(
        "hyp2f1({a}, {b}; {c}; {z}) overflows after {} terms",
        n + 1
      )));
    }

    let next = k + 1.0;
    if next < monotone_from {
      continue;
    }
    let rho = z.abs() * ((a + next) / (next + 1.0)).max(1.0) * ((b + next) / (c + next)).max(1.0);
    if rho < 1.0 {
      let tail = term.abs() * rho / (1.0 - rho);
      if tail <= REL_EPS * sum.abs() {
        return Ok(sum);
      }
    }
  }

  Err(BgnbdError::domain(format!(
    "hyp2f1({a}, {b}; {c}; {z}) did not converge within {MAX_TERMS} terms"
  )))
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  #[test]
  fn hyp2f1_at_origin_is_one() {
    assert_eq!(hyp2f1(0.3, 2.5, 1.7, 0.0).unwrap(), 1.0);
  }

  #[test]
  fn hyp2f1_matches_log_identity() {
    // 2F1(1, 1; 2; z) = -ln(1 - z) / z
    for &z in &[0.05, 0.3, 0.5, 0.8, 0.95] {
      let expected = -(1.0 - z as f64).ln() / z;
      assert_relative_eq!(hyp2f1(1.0, 1.0, 2.0, z).unwrap(), expected, max_relative = 1e-12);
    }
  }

  #[test]
  fn hyp2f1_matches_binomial_identity() {
    // 2F1(a, b; b; z) = (1 - z)^(-a)
    let a = 1.37;
    for &z in &[-0.4, 0.1, 0.6, 0.9] {
      let expected = (1.0 - z as f64).powf(-a);
      assert_relative_eq!(hyp2f1(a, 2.2, 2.2, z).unwrap(), expected, max_relative = 1e-12);
    }
  }

  #[test]
  fn hyp2f1_matches_arcsin_identity() {
    // 2F1(1/2, 1/2; 3/2; z^2) = asin(z) / z
    let z = 0.7_f64;
    assert_relative_eq!(
      hyp2f1(0.5, 0.5, 1.5, z * z).unwrap(),
      z.asin() / z,
      max_relative = 1e-12
    );
  }

  #[test]
  fn hyp2f1_terminates_for_polynomial_case() {
    // 2F1(-2, b; c; z) = 1 - 2bz/c + b(b+1)z^2/(c(c+1))
    let (b, c, z) = (3.0, 4.0, 0.5);
    let expected = 1.0 - 2.0 * b * z / c + b * (b + 1.0) * z * z / (c * (c + 1.0));
    assert_relative_eq!(hyp2f1(-2.0, b, c, z).unwrap(), expected, max_relative = 1e-14);
  }

  #[test]
  fn hyp2f1_handles_slow_convergence_near_one() {
    let z = 0.999;
    let expected = -(1.0_f64 - z).ln() / z;
    assert_relative_eq!(hyp2f1(1.0, 1.0, 2.0, z).unwrap(), expected, max_relative = 1e-10);
  }

  #[test]
  fn hyp2f1_sums_large_parameters() {
    // 2F1(a, b; b; z) = (1 - z)^(-a), terms peak far above the result's scale
    assert_relative_eq!(
      hyp2f1(300.0, 2.2, 2.2, 0.5).unwrap(),
      2.0_f64.powi(300),
      max_relative = 1e-10
    );

    // Euler: 2F1(a, b; c; z) = (1 - z)^(c-a-b) 2F1(c-a, c-b; c; z)
    let (a, b, c, z) = (400.24, 402.43, 802.93, 0.4_f64);
    assert_relative_eq!(
      hyp2f1(a, b, c, z).unwrap(),
      (1.0 - z).powf(c - a - b) * hyp2f1(c - a, c - b, c, z).unwrap(),
      max_relative = 1e-9
    );
  }

  #[test]
  fn hyp2f1_reports_overflow() {
    assert!(matches!(
      hyp2f1(2000.0, 2000.0, 1.5, 0.9),
      Err(BgnbdError::Domain(_))
    ));
  }

  #[test]
  fn hyp2f1_rejects_out_of_domain_arguments() {
    assert!(matches!(hyp2f1(1.0, 1.0, 2.0, 1.0), Err(BgnbdError::Domain(_))));
    assert!(matches!(hyp2f1(1.0, 1.0, -3.0, 0.5), Err(BgnbdError::Domain(_))));
    assert!(matches!(
      hyp2f1(f64::NAN, 1.0, 2.0, 0.5),
      Err(BgnbdError::InvalidInput(_))
    ));
  }
}
