//! # Likelihood
//!
//! $$
//! \ell_i=A_1+A_2+\ln\!\left(e^{A_3}+\delta_{x_i>0}\,e^{A_4}\right)
//! $$
//!
//! BG/NBD individual log-likelihood (Fader, Hardie & Lee, 2005, eq. 6) and the
//! total negative log-likelihood minimized by the optimizer.

use statrs::function::gamma::ln_gamma;

use super::data::RfmData;

/// `ln(e^u + e^v)` without overflow or underflow of the exponentials.
///
/// Agrees with the direct form to rounding whenever both exponentials are
/// representable.
#[inline]
pub(crate) fn log_add_exp(u: f64, v: f64) -> f64 {
  let (hi, lo) = if u >= v { (u, v) } else { (v, u) };
  if hi == f64::NEG_INFINITY {
    return f64::NEG_INFINITY;
  }
  hi + (lo - hi).exp().ln_1p()
}

/// Log-likelihood contribution of one customer.
///
/// Assumes a feasible parameter vector; `A4` is only formed when `x > 0`.
pub fn log_likelihood_row(params: &[f64; 4], x: f64, t_x: f64, t: f64) -> f64 {
  let [r, alpha, a, b] = *params;

  let a1 = ln_gamma(r + x) - ln_gamma(r) + r * alpha.ln();
  let a2 = ln_gamma(a + b) + ln_gamma(b + x) - ln_gamma(b) - ln_gamma(a + b + x);
  let a3 = -(r + x) * (alpha + t).ln();

  let tail = if x > 0.0 {
    let a4 = a.ln() - (b + x - 1.0).ln() - (r + x) * (alpha + t_x).ln();
    log_add_exp(a3, a4)
  } else {
    a3
  };

  a1 + a2 + tail
}

/// Total negative log-likelihood of `data` under `params` (a sum, not a mean).
///
/// Returns `+inf` for any non-positive or non-finite component so the
/// unconstrained simplex search stays inside the feasible region. A NaN total is
/// reported as `+inf` as well.
pub fn neg_log_likelihood(params: &[f64; 4], data: &RfmData) -> f64 {
  if params.iter().any(|&p| !p.is_finite() || p <= 0.0) {
    return f64::INFINITY;
  }

  let ll = data.fold_rows(0.0, |acc, x, t_x, t| {
    acc + log_likelihood_row(params, x, t_x, t)
  });

  if ll.is_nan() {
    f64::INFINITY
  } else {
    -ll
  }
}
