use anyhow::Result;
use bgnbd_rs::bgnbd::expectation::expected_transactions_for_frequency;
use bgnbd_rs::bgnbd::expected_value;
use bgnbd_rs::bgnbd::fit;
use bgnbd_rs::bgnbd::FitConfig;
use bgnbd_rs::bgnbd::ModelParameters;
use bgnbd_rs::bgnbd::ParameterSource;
use bgnbd_rs::bgnbd::ValueForecastRequest;
use bgnbd_rs::rfm::aggregate;
use bgnbd_rs::rfm::AggregationWindow;
use bgnbd_rs::rfm::CustomerFilter;
use bgnbd_rs::rfm::TypeFilter;
use bgnbd_rs::simulate::simulate_transactions;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn main() -> Result<()> {
  let truth = ModelParameters::new(0.5, 5.0, 3.0, 6.0)?;
  let calibration = AggregationWindow::from_yyyymmdd("19970101", "19970930")?;
  let horizon = 39.0;
  let holdout = calibration.following(horizon)?;
  let full = AggregationWindow::new(calibration.start(), holdout.cutoff())?;

  let mut rng = StdRng::seed_from_u64(42);
  let records = simulate_transactions(&truth, 2_000, &full, 30.0, &mut rng)?;
  println!("Simulated {} records of 2000 customers", records.len());

  let summary = aggregate(&records, &calibration, &TypeFilter::All, &CustomerFilter::All)?;
  let config = FitConfig {
    restarts: 8,
    seed: Some(7),
    ..FitConfig::default()
  };
  let outcome = fit(&summary.to_data()?, &config)?;
  println!("True parameters:   {truth}");
  println!("Fitted parameters: {}", outcome.params());
  println!("  NLL: {:.4}, converged: {}", outcome.nll(), outcome.converged());
  for run in &outcome.restarts {
    println!(
      "  restart {} (seed {:?}): nll {:.4} after {} iterations",
      run.restart, run.seed, run.nll, run.iterations
    );
  }

  let actual = aggregate(&records, &holdout, &TypeFilter::All, &CustomerFilter::All)?;
  println!("\nHoldout of {horizon} weeks, per frequency in calibration:");
  for x in 0..=6 {
    let Ok(bucket) = summary.frequency_bucket(x) else {
      continue;
    };
    let predicted = expected_transactions_for_frequency(horizon, &outcome.params(), &summary, x)?;
    let observed = bucket
      .customer_ids()
      .map(|id| actual.frequency_or_zero(id) as f64)
      .sum::<f64>()
      / bucket.len() as f64;
    println!("  x = {x}: predicted {predicted:.3}, actual {observed:.3} ({} customers)", bucket.len());
  }

  let request = ValueForecastRequest::new(horizon, calibration)
    .with_customers(CustomerFilter::subset(1..=200))
    .with_parameters(ParameterSource::Reuse(outcome.params()));
  let forecast = expected_value(&records, &request)?;
  println!("\nCustomers 1..=200 over the next {horizon} weeks:");
  println!("  Expected purchases per customer: {:.3}", forecast.expected_count);
  println!("  Value per purchase: {:.2}", forecast.value_per_transaction);
  println!("  Expected spend per customer: {:.2}", forecast.expected_value);
  println!("  Outliers removed: {}", forecast.outliers_removed);
  println!("  Without repeat purchases: {}", forecast.without_units);

  Ok(())
}
