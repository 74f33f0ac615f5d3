//! # Expectation
//!
//! $$
//! \mathbb E[Y(t)\mid x,t_x,T]=\frac{a+b+x-1}{a-1}\,
//! \frac{1-\left(\frac{\alpha+T}{\alpha+T+t}\right)^{r+x}{}_2F_1\!\left(r+x,b+x;a+b+x-1;\frac{t}{\alpha+T+t}\right)}
//! {1+\delta_{x>0}\frac{a}{b+x-1}\left(\frac{\alpha+T}{\alpha+t_x}\right)^{r+x}}
//! $$
//!
//! Conditional expected transactions (Fader, Hardie & Lee, 2005, eq. 10) and the
//! monetary projection built on top of it.

use tracing::debug;
use tracing::warn;

use super::data::RfmData;
use super::fit::fit;
use super::fit::FitConfig;
use super::params::ModelParameters;
use crate::error::BgnbdError;
use crate::error::Result;
use crate::rfm::aggregate;
use crate::rfm::AggregationWindow;
use crate::rfm::CustomerFilter;
use crate::rfm::RfmSummary;
use crate::rfm::TransactionRecord;
use crate::rfm::TypeFilter;
use crate::special::hyp2f1;

fn validate_horizon(horizon: f64) -> Result<()> {
  if !horizon.is_finite() || horizon < 0.0 {
    return Err(BgnbdError::input(format!(
      "forecast horizon must be finite and non-negative, got {horizon}"
    )));
  }
  Ok(())
}

/// `w^(r+x) 2F1(r+x, b+x; a+b+x-1; z)` with `w = 1 - z`, summed directly.
fn direct_form([r, a, b]: [f64; 3], x: f64, w: f64, z: f64) -> Result<f64> {
  Ok(w.powf(r + x) * hyp2f1(r + x, b + x, a + b + x - 1.0, z)?)
}

/// Same quantity after Euler's transformation, `w^(a-1) 2F1(a+b-1-r, a-1; a+b+x-1; z)`.
fn euler_form([r, a, b]: [f64; 3], x: f64, w: f64, z: f64) -> Result<f64> {
  Ok(w.powf(a - 1.0) * hyp2f1(a + b - 1.0 - r, a - 1.0, a + b + x - 1.0, z)?)
}

/// Discounted hypergeometric term of the expectation numerator.
///
/// The direct series grows like `w^(a-1-r-x)` and overflows for heavy buyers over
/// long horizons. Of the two equivalent forms the one whose series has a
/// non-negative excess `c - a - b` stays bounded on `[0, 1)`, and that one is summed.
fn survival_term(shape: [f64; 3], x: f64, w: f64, z: f64) -> Result<f64> {
  let [r, a, _] = shape;
  if x + r - a + 1.0 >= 0.0 {
    euler_form(shape, x, w, z)
  } else {
    direct_form(shape, x, w, z)
  }
}

/// Expected number of transactions of one customer in the next `horizon` weeks.
///
/// Requires `a > 1`, and `b + x > 1` when `x > 0`; violating either is a domain
/// error rather than a silent NaN.
pub fn conditional_expected_transactions(
  horizon: f64,
  params: &ModelParameters,
  x: f64,
  t_x: f64,
  t: f64,
) -> Result<f64> {
  validate_horizon(horizon)?;
  let [r, alpha, a, b] = params.to_array();

  if a <= 1.0 {
    return Err(BgnbdError::domain(format!(
      "expected transactions require a > 1, got a = {a}"
    )));
  }
  if x > 0.0 && b + x <= 1.0 {
    return Err(BgnbdError::domain(format!(
      "expected transactions require b + x > 1, got b = {b}, x = {x}"
    )));
  }

  let factor = (a + b + x - 1.0) / (a - 1.0);
  let span = alpha + t + horizon;
  let numerator = 1.0 - survival_term([r, a, b], x, (alpha + t) / span, horizon / span)?;
  let denominator = if x > 0.0 {
    1.0 + (a / (b + x - 1.0)) * ((alpha + t) / (alpha + t_x)).powf(r + x)
  } else {
    1.0
  };

  let expected = factor * numerator / denominator;
  if !expected.is_finite() {
    return Err(BgnbdError::domain(format!(
      "expected transactions not finite for x = {x}, t_x = {t_x}, T = {t}, horizon = {horizon}"
    )));
  }
  Ok(expected)
}

/// Mean expected number of transactions over every row of `data`.
pub fn expected_transactions(
  horizon: f64,
  params: &ModelParameters,
  data: &RfmData,
) -> Result<f64> {
  let mut total = 0.0;
  for ((&x, &t_x), &t) in data.x().iter().zip(data.t_x().iter()).zip(data.t().iter()) {
    total += conditional_expected_transactions(horizon, params, x, t_x, t)?;
  }
  Ok(total / data.len() as f64)
}

/// Mean expected number of transactions over the customers of `summary` whose
/// frequency is exactly `x`.
pub fn expected_transactions_for_frequency(
  horizon: f64,
  params: &ModelParameters,
  summary: &RfmSummary,
  x: u64,
) -> Result<f64> {
  let bucket = summary.frequency_bucket(x)?;
  expected_transactions(horizon, params, &bucket.to_data()?)
}

/// Where the parameters of a value forecast come from.
#[derive(Clone, Debug)]
pub enum ParameterSource {
  /// Use an earlier fit.
  Reuse(ModelParameters),
  /// Fit on the whole population active in the forecast window.
  Fit(FitConfig),
}

/// Inputs of [`expected_value`].
#[derive(Clone, Debug)]
pub struct ValueForecastRequest {
  /// Forecast horizon in weeks.
  pub horizon_weeks: f64,
  /// Calibration window.
  pub window: AggregationWindow,
  pub types: TypeFilter,
  /// Customers whose purchases are forecast.
  pub customers: CustomerFilter,
  pub parameters: ParameterSource,
  /// Customers farther than this many standard deviations from the mean total
  /// value are left out of the per-transaction value.
  pub outlier_sigmas: f64,
}

impl ValueForecastRequest {
  /// Request for the whole population, fitting with default settings.
  pub fn new(horizon_weeks: f64, window: AggregationWindow) -> Self {
    Self {
      horizon_weeks,
      window,
      types: TypeFilter::All,
      customers: CustomerFilter::All,
      parameters: ParameterSource::Fit(FitConfig::default()),
      outlier_sigmas: 2.0,
    }
  }

  pub fn with_customers(mut self, customers: CustomerFilter) -> Self {
    self.customers = customers;
    self
  }

  pub fn with_types(mut self, types: TypeFilter) -> Self {
    self.types = types;
    self
  }

  pub fn with_parameters(mut self, parameters: ParameterSource) -> Self {
    self.parameters = parameters;
    self
  }

  pub fn with_outlier_sigmas(mut self, sigmas: f64) -> Self {
    self.outlier_sigmas = sigmas;
    self
  }
}

/// Expected purchases and spend of a customer group.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueForecast {
  /// Mean expected transactions per customer over the horizon.
  pub expected_count: f64,
  /// `expected_count * value_per_transaction`.
  pub expected_value: f64,
  /// Historical mean value of one unit bought.
  pub value_per_transaction: f64,
  /// Customers of the group active in the calibration window.
  pub customers: usize,
  /// Customers left out of the per-transaction value as outliers.
  pub outliers_removed: usize,
  /// Customers left out of the per-transaction value for lack of purchased units.
  pub without_units: usize,
  pub params: ModelParameters,
}

impl From<ValueForecast> for (f64, f64) {
  fn from(f: ValueForecast) -> Self {
    (f.expected_count, f.expected_value)
  }
}

/// Historical value of one purchased unit for a customer group.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitValue {
  /// Mean `value / x` over the kept customers.
  pub per_transaction: f64,
  /// Customers farther than the outlier threshold from the mean total value.
  pub outliers_removed: usize,
  /// Customers within the threshold who bought no counted unit.
  pub without_units: usize,
}

/// Mean `value / x` over the customers of `summary` whose total value lies within
/// `sigmas` sample standard deviations of the group mean.
///
/// Customers with no purchased units cannot contribute a ratio and are reported
/// apart from the outliers.
pub fn value_per_transaction(summary: &RfmSummary, sigmas: f64) -> Result<UnitValue> {
  if !sigmas.is_finite() || sigmas <= 0.0 {
    return Err(BgnbdError::config(format!(
      "outlier threshold must be positive, got {sigmas} standard deviations"
    )));
  }

  let values = summary.iter().map(|(_, row)| row.value).collect::<Vec<_>>();
  let n = values.len();
  if n == 0 {
    return Err(BgnbdError::insufficient("no customers to value"));
  }
  let mean = values.iter().sum::<f64>() / n as f64;
  let sd = if n > 1 {
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
  } else {
    0.0
  };
  let limit = sigmas * sd;

  let mut kept = 0usize;
  let mut ratio_sum = 0.0;
  let mut outliers_removed = 0usize;
  let mut without_units = 0usize;
  for (_, row) in summary.iter() {
    if (row.value - mean).abs() > limit {
      outliers_removed += 1;
    } else if row.x == 0 {
      without_units += 1;
    } else {
      ratio_sum += row.value / row.x as f64;
      kept += 1;
    }
  }

  if without_units > 0 {
    warn!(without_units, "customers without purchased units skipped in value estimate");
  }
  if kept == 0 {
    return Err(BgnbdError::insufficient(
      "no customer left to estimate the value per transaction after outlier removal",
    ));
  }

  debug!(kept, outliers_removed, without_units, mean, sd, "per-transaction value estimated");
  Ok(UnitValue {
    per_transaction: ratio_sum / kept as f64,
    outliers_removed,
    without_units,
  })
}

/// Expected transactions and spend over `request.horizon_weeks` for a customer group.
///
/// The log is aggregated over the request window and type filter, parameters are
/// reused or fitted on the whole active population, and the expected count is the
/// mean over the requested customers. The value per transaction comes from the same
/// customers after outlier removal.
pub fn expected_value(
  records: &[TransactionRecord],
  request: &ValueForecastRequest,
) -> Result<ValueForecast> {
  validate_horizon(request.horizon_weeks)?;

  let population = aggregate(
    records,
    &request.window,
    &request.types,
    &CustomerFilter::All,
  )?;
  let group = population.restrict(&request.customers)?;

  let params = match &request.parameters {
    ParameterSource::Reuse(params) => *params,
    ParameterSource::Fit(config) => fit(&population.to_data()?, config)?.params(),
  };

  let expected_count = expected_transactions(request.horizon_weeks, &params, &group.to_data()?)?;
  let unit = value_per_transaction(&group, request.outlier_sigmas)?;

  Ok(ValueForecast {
    expected_count,
    expected_value: expected_count * unit.per_transaction,
    value_per_transaction: unit.per_transaction,
    customers: group.len(),
    outliers_removed: unit.outliers_removed,
    without_units: unit.without_units,
    params,
  })
}
