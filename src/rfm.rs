//! # RFM
//!
//! $$
//! x_i=\sum_{j\in W_i} q_j,\qquad t_{x,i}=\frac{\max_{j\in W_i} d_j-d_0}{7},\qquad T=\frac{d_c-d_0}{7}
//! $$
//!
//! Reduction of raw transaction logs into per-customer recency/frequency/period rows.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::Days;
use chrono::NaiveDate;
use impl_new_derive::ImplNew;
use tracing::debug;

use crate::bgnbd::data::RfmData;
use crate::error::BgnbdError;
use crate::error::Result;

/// Calendar format used for dates at the crate boundary.
pub const DATE_FORMAT: &str = "%Y%m%d";

const DAYS_PER_WEEK: f64 = 7.0;

/// Parse an 8-digit `YYYYMMDD` date.
pub fn parse_yyyymmdd(s: &str) -> Result<NaiveDate> {
  let s = s.trim();
  if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
    return Err(BgnbdError::input(format!(
      "expected an 8-digit YYYYMMDD date, got '{s}'"
    )));
  }
  NaiveDate::parse_from_str(s, DATE_FORMAT)
    .map_err(|e| BgnbdError::input(format!("invalid date '{s}': {e}")))
}

/// One purchase as delivered by the data source.
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct TransactionRecord {
  /// Customer identifier. `0` marks an empty row and is discarded.
  pub customer_id: u64,
  /// Transaction-type indicators, a flag is set when its count is non-zero.
  pub flags: BTreeMap<String, u32>,
  /// Purchased units.
  pub quantity: u32,
  /// Monetary value of the purchase.
  pub value: f64,
  /// Purchase date.
  pub date: NaiveDate,
}

impl TransactionRecord {
  /// Record without any type flags.
  pub fn untyped(customer_id: u64, quantity: u32, value: f64, date: NaiveDate) -> Self {
    Self::new(customer_id, BTreeMap::new(), quantity, value, date)
  }

  /// Set a type flag to `count`.
  pub fn with_flag(mut self, name: impl Into<String>, count: u32) -> Self {
    self.flags.insert(name.into(), count);
    self
  }

  pub fn has_flag(&self, name: &str) -> bool {
    self.flags.get(name).is_some_and(|&c| c != 0)
  }
}

/// Which transaction types take part in an aggregation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TypeFilter {
  #[default]
  All,
  /// Keep a record when at least one of the named flags is set.
  Subset(BTreeSet<String>),
}

impl TypeFilter {
  pub fn subset<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::Subset(names.into_iter().map(Into::into).collect())
  }

  fn validate(&self) -> Result<()> {
    match self {
      TypeFilter::Subset(names) if names.is_empty() => Err(BgnbdError::config(
        "type filter subset must name at least one transaction type",
      )),
      _ => Ok(()),
    }
  }

  pub fn matches(&self, record: &TransactionRecord) -> bool {
    match self {
      TypeFilter::All => true,
      TypeFilter::Subset(names) => names.iter().any(|n| record.has_flag(n)),
    }
  }
}

/// Which customers take part in an aggregation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CustomerFilter {
  #[default]
  All,
  Subset(BTreeSet<u64>),
}

impl CustomerFilter {
  pub fn subset<I: IntoIterator<Item = u64>>(ids: I) -> Self {
    Self::Subset(ids.into_iter().collect())
  }

  pub fn contains(&self, customer_id: u64) -> bool {
    match self {
      CustomerFilter::All => true,
      CustomerFilter::Subset(ids) => ids.contains(&customer_id),
    }
  }
}

/// Inclusive calendar window `[start, cutoff]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregationWindow {
  start: NaiveDate,
  cutoff: NaiveDate,
}

impl AggregationWindow {
  pub fn new(start: NaiveDate, cutoff: NaiveDate) -> Result<Self> {
    if start >= cutoff {
      return Err(BgnbdError::config(format!(
        "window start {start} must precede cutoff {cutoff}"
      )));
    }
    Ok(Self { start, cutoff })
  }

  /// Window from two `YYYYMMDD` strings.
  pub fn from_yyyymmdd(start: &str, cutoff: &str) -> Result<Self> {
    Self::new(parse_yyyymmdd(start)?, parse_yyyymmdd(cutoff)?)
  }

  /// Window opening at this window's cutoff and spanning `weeks` (whole days, floored).
  pub fn following(&self, weeks: f64) -> Result<Self> {
    if !weeks.is_finite() || weeks <= 0.0 {
      return Err(BgnbdError::config(format!(
        "forward window length must be positive, got {weeks} weeks"
      )));
    }
    let days = (weeks * DAYS_PER_WEEK).floor() as u64;
    let cutoff = self
      .cutoff
      .checked_add_days(Days::new(days))
      .ok_or_else(|| BgnbdError::config(format!("{weeks} weeks after {} overflows", self.cutoff)))?;
    Self::new(self.cutoff, cutoff)
  }

  pub fn start(&self) -> NaiveDate {
    self.start
  }

  pub fn cutoff(&self) -> NaiveDate {
    self.cutoff
  }

  pub fn contains(&self, date: NaiveDate) -> bool {
    self.start <= date && date <= self.cutoff
  }

  /// Weeks elapsed between the window start and `date`.
  pub fn weeks_since_start(&self, date: NaiveDate) -> f64 {
    (date - self.start).num_days() as f64 / DAYS_PER_WEEK
  }

  /// Observation period `T` in weeks.
  pub fn period_weeks(&self) -> f64 {
    self.weeks_since_start(self.cutoff)
  }
}

/// Recency/frequency/period row of one customer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CustomerSummary {
  /// Summed purchase quantity in the window.
  pub x: u64,
  /// Weeks from window start to the last purchase.
  pub t_x: f64,
  /// Weeks from window start to cutoff.
  pub t: f64,
  /// Summed monetary value in the window.
  pub value: f64,
}

/// Aggregation output keyed by customer id.
#[derive(Clone, Debug)]
pub struct RfmSummary {
  window: AggregationWindow,
  rows: BTreeMap<u64, CustomerSummary>,
}

impl RfmSummary {
  pub fn window(&self) -> &AggregationWindow {
    &self.window
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn get(&self, customer_id: u64) -> Option<&CustomerSummary> {
    self.rows.get(&customer_id)
  }

  pub fn contains(&self, customer_id: u64) -> bool {
    self.rows.contains_key(&customer_id)
  }

  pub fn iter(&self) -> impl Iterator<Item = (u64, &CustomerSummary)> + '_ {
    self.rows.iter().map(|(&id, row)| (id, row))
  }

  pub fn customer_ids(&self) -> impl Iterator<Item = u64> + '_ {
    self.rows.keys().copied()
  }

  /// Frequency of a customer, reading absence from the window as zero purchases.
  ///
  /// Absence and zero are different things for the aggregator; callers comparing
  /// forecasts with realised purchases opt into this reading explicitly.
  pub fn frequency_or_zero(&self, customer_id: u64) -> u64 {
    self.rows.get(&customer_id).map_or(0, |row| row.x)
  }

  /// Rows of the customers accepted by `filter`.
  pub fn restrict(&self, filter: &CustomerFilter) -> Result<Self> {
    let rows: BTreeMap<u64, CustomerSummary> = self
      .rows
      .iter()
      .filter(|&(&id, _)| filter.contains(id))
      .map(|(&id, &row)| (id, row))
      .collect();

    if rows.is_empty() {
      return Err(BgnbdError::insufficient(
        "no requested customer is active in the aggregation window",
      ));
    }

    Ok(Self {
      window: self.window,
      rows,
    })
  }

  /// Rows sharing frequency `x`.
  pub fn frequency_bucket(&self, x: u64) -> Result<Self> {
    let rows: BTreeMap<u64, CustomerSummary> = self
      .rows
      .iter()
      .filter(|(_, row)| row.x == x)
      .map(|(&id, &row)| (id, row))
      .collect();

    if rows.is_empty() {
      return Err(BgnbdError::insufficient(format!(
        "no customer with frequency {x} in the aggregation window"
      )));
    }

    Ok(Self {
      window: self.window,
      rows,
    })
  }

  /// Parallel `(x, t_x, T)` arrays in customer-id order.
  pub fn to_data(&self) -> Result<RfmData> {
    let x = self.rows.values().map(|r| r.x as f64).collect::<Vec<_>>();
    let t_x = self.rows.values().map(|r| r.t_x).collect::<Vec<_>>();
    let t = self.rows.values().map(|r| r.t).collect::<Vec<_>>();
    RfmData::new(x.into(), t_x.into(), t.into())
  }
}

/// Reduce `records` to one row per customer active in `window`.
///
/// Sentinel rows (`customer_id == 0`) are dropped, then records are filtered by
/// customer, by transaction type and finally by date. Quantity and value are summed
/// per customer and the latest purchase date becomes the recency. A customer without
/// surviving records gets no row at all.
pub fn aggregate(
  records: &[TransactionRecord],
  window: &AggregationWindow,
  types: &TypeFilter,
  customers: &CustomerFilter,
) -> Result<RfmSummary> {
  types.validate()?;

  struct Acc {
    quantity: u64,
    value: f64,
    last: NaiveDate,
  }

  let mut sentinels = 0usize;
  let mut acc: BTreeMap<u64, Acc> = BTreeMap::new();

  for record in records {
    if record.customer_id == 0 {
      sentinels += 1;
      continue;
    }
    if !record.value.is_finite() || record.value < 0.0 {
      return Err(BgnbdError::input(format!(
        "customer {} has an invalid transaction value {} on {}",
        record.customer_id, record.value, record.date
      )));
    }
    if !customers.contains(record.customer_id)
      || !types.matches(record)
      || !window.contains(record.date)
    {
      continue;
    }

    acc
      .entry(record.customer_id)
      .and_modify(|a| {
        a.quantity += u64::from(record.quantity);
        a.value += record.value;
        a.last = a.last.max(record.date);
      })
      .or_insert(Acc {
        quantity: u64::from(record.quantity),
        value: record.value,
        last: record.date,
      });
  }

  if acc.is_empty() {
    return Err(BgnbdError::insufficient(format!(
      "no transactions between {} and {} match the filters",
      window.start(),
      window.cutoff()
    )));
  }

  let t = window.period_weeks();
  let rows = acc
    .into_iter()
    .map(|(id, a)| {
      (
        id,
        CustomerSummary {
          x: a.quantity,
          t_x: window.weeks_since_start(a.last),
          t,
          value: a.value,
        },
      )
    })
    .collect::<BTreeMap<_, _>>();

  debug!(
    customers = rows.len(),
    dropped_sentinels = sentinels,
    period_weeks = t,
    "aggregated transaction log"
  );

  Ok(RfmSummary {
    window: *window,
    rows,
  })
}
