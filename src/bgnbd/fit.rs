//! # Fit
//!
//! $$
//! (\hat r,\hat\alpha,\hat a,\hat b)=\arg\min_{\theta>0}\ -\sum_{i=1}^{n}\ell_i(\theta)
//! $$
//!
//! Multi-restart Nelder-Mead search for the BG/NBD maximum-likelihood parameters.

use std::borrow::Cow;

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::core::TerminationStatus;
use argmin::solver::neldermead::NelderMead;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Normal;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::data::RfmData;
use super::likelihood::neg_log_likelihood;
use super::params::FitOutcome;
use super::params::FitResult;
use super::params::ModelParameters;
use crate::error::BgnbdError;
use crate::error::Result;

/// Injectable settings of a fitting session.
#[derive(Clone, Debug)]
pub struct FitConfig {
  /// Number of independent optimizer runs, at least one.
  pub restarts: usize,
  /// Fixed initial guess in the caller's time units. Only valid with one restart.
  pub initial_params: Option<ModelParameters>,
  /// Simplex cost standard deviation at which a run counts as converged.
  pub tolerance: f64,
  /// Iteration cap of each run.
  pub max_iters: u64,
  /// Base seed for the random initial guesses, drawn and logged when `None`.
  pub seed: Option<u64>,
  /// Standard deviation of the `Normal(1, spread)` initial draws.
  pub init_spread: f64,
  /// Divide `t_x` and `T` by `max(T)` while optimizing.
  pub scale_time: bool,
  /// Run restarts on the rayon pool.
  pub parallel: bool,
}

impl Default for FitConfig {
  fn default() -> Self {
    Self {
      restarts: 1,
      initial_params: None,
      tolerance: 1e-6,
      max_iters: 2000,
      seed: None,
      init_spread: 0.05,
      scale_time: true,
      parallel: true,
    }
  }
}

impl FitConfig {
  fn validate(&self) -> Result<()> {
    if self.restarts == 0 {
      return Err(BgnbdError::config("restarts must be at least 1"));
    }
    if self.restarts > 1 && self.initial_params.is_some() {
      return Err(BgnbdError::config(
        "several restarts from one fixed initial guess cannot improve the fit",
      ));
    }
    if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
      return Err(BgnbdError::config(format!(
        "tolerance must be finite and positive, got {}",
        self.tolerance
      )));
    }
    if self.max_iters == 0 {
      return Err(BgnbdError::config("max_iters must be at least 1"));
    }
    if self.initial_params.is_none() && (!self.init_spread.is_finite() || self.init_spread <= 0.0)
    {
      return Err(BgnbdError::config(format!(
        "init_spread must be finite and positive, got {}",
        self.init_spread
      )));
    }
    Ok(())
  }
}

/// Negative log-likelihood as an argmin cost.
struct BgnbdCost<'a> {
  data: &'a RfmData,
}

impl CostFunction for BgnbdCost<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, p: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let candidate: [f64; 4] = p
      .as_slice()
      .try_into()
      .map_err(|_| anyhow::anyhow!("expected 4 parameters, got {}", p.len()))?;
    Ok(neg_log_likelihood(&candidate, self.data))
  }
}

/// Data as seen by the optimizer plus the factor mapping it back.
struct Workspace<'a> {
  original: &'a RfmData,
  working: Cow<'a, RfmData>,
  scale: f64,
}

impl<'a> Workspace<'a> {
  fn new(data: &'a RfmData, scale_time: bool) -> Self {
    if scale_time {
      let scale = data.t_max();
      debug!(t_max = scale, "scaling time columns for optimization");
      Self {
        original: data,
        working: Cow::Owned(data.time_scaled(scale)),
        scale,
      }
    } else {
      Self {
        original: data,
        working: Cow::Borrowed(data),
        scale: 1.0,
      }
    }
  }

  fn to_working(&self, params: &ModelParameters) -> [f64; 4] {
    let [r, alpha, a, b] = params.to_array();
    [r, alpha / self.scale, a, b]
  }

  /// One Nelder-Mead run from `x0` (optimizer coordinates).
  fn minimize(
    &self,
    x0: [f64; 4],
    config: &FitConfig,
    restart: usize,
    seed: Option<u64>,
  ) -> Result<FitResult> {
    let solver = NelderMead::new(initial_simplex(&x0)).with_sd_tolerance(config.tolerance)?;
    let cost = BgnbdCost {
      data: &self.working,
    };

    let res = Executor::new(cost, solver)
      .configure(|state| state.max_iters(config.max_iters))
      .run()?;

    let state = res.state();
    let best = state
      .get_best_param()
      .ok_or_else(|| anyhow::anyhow!("restart {restart} finished without a best point"))?;
    let best: [f64; 4] = best
      .as_slice()
      .try_into()
      .map_err(|_| anyhow::anyhow!("restart {restart} returned {} parameters", best.len()))?;

    // alpha carries time units, r, a and b are dimensionless
    let params = ModelParameters::try_from(best)?.with_alpha_scaled(self.scale)?;
    let nll = neg_log_likelihood(&params.to_array(), self.original);
    let converged = matches!(
      state.get_termination_status(),
      TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );
    let iterations = state.get_iter();

    if converged {
      debug!(restart, iterations, nll, %params, "restart converged");
    } else {
      warn!(
        restart,
        iterations,
        nll,
        status = ?state.get_termination_status(),
        "restart did not converge, keeping best point reached"
      );
    }

    Ok(FitResult {
      params,
      nll,
      converged,
      iterations,
      restart,
      seed,
    })
  }
}

/// Initial simplex: `x0` plus one vertex per coordinate moved by 5%
/// (or to `0.00025` when the coordinate is zero).
fn initial_simplex(x0: &[f64]) -> Vec<Vec<f64>> {
  let mut simplex = Vec::with_capacity(x0.len() + 1);
  simplex.push(x0.to_vec());
  for i in 0..x0.len() {
    let mut vertex = x0.to_vec();
    vertex[i] = if vertex[i] != 0.0 {
      1.05 * vertex[i]
    } else {
      0.00025
    };
    simplex.push(vertex);
  }
  simplex
}

/// Random initial guess, four independent `Normal(1, spread)` draws.
fn random_guess(seed: u64, spread: f64) -> Result<[f64; 4]> {
  let normal = Normal::new(1.0, spread)
    .map_err(|e| BgnbdError::config(format!("init_spread {spread} is invalid: {e}")))?;
  let mut rng = StdRng::seed_from_u64(seed);
  Ok(std::array::from_fn(|_| normal.sample(&mut rng)))
}

/// Per-restart seeds derived from `base`, fixed before any restart runs.
pub fn restart_seeds(base: u64, restarts: usize) -> Vec<u64> {
  let mut seeder = StdRng::seed_from_u64(base);
  (0..restarts).map(|_| seeder.gen()).collect()
}

/// Single direct minimization from a caller-supplied guess, no randomness.
pub fn minimize_from(
  data: &RfmData,
  initial: &ModelParameters,
  config: &FitConfig,
) -> Result<FitResult> {
  let config = FitConfig {
    restarts: 1,
    initial_params: Some(*initial),
    ..config.clone()
  };
  config.validate()?;

  let ws = Workspace::new(data, config.scale_time);
  ws.minimize(ws.to_working(initial), &config, 0, None)
}

/// Single minimization from the random guess drawn with `seed`.
pub fn minimize_seeded(data: &RfmData, seed: u64, config: &FitConfig) -> Result<FitResult> {
  let config = FitConfig {
    restarts: 1,
    initial_params: None,
    ..config.clone()
  };
  config.validate()?;

  let ws = Workspace::new(data, config.scale_time);
  ws.minimize(random_guess(seed, config.init_spread)?, &config, 0, Some(seed))
}

/// Fit the BG/NBD model to `data`.
///
/// Each restart starts either from `config.initial_params` or from its own random
/// guess and runs Nelder-Mead until the simplex costs agree within `tolerance` or
/// `max_iters` is hit. Hitting the cap is reported through `converged`, not as an
/// error. The winner is the lowest negative log-likelihood, ties going to the
/// earlier restart, so the outcome does not depend on the order in which parallel
/// restarts finish.
pub fn fit(data: &RfmData, config: &FitConfig) -> Result<FitOutcome> {
  config.validate()?;
  let ws = Workspace::new(data, config.scale_time);

  let jobs: Vec<(usize, Option<u64>, [f64; 4])> = match &config.initial_params {
    Some(initial) => vec![(0, None, ws.to_working(initial))],
    None => {
      let base = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
      debug!(seed = base, restarts = config.restarts, "drawing initial guesses");
      restart_seeds(base, config.restarts)
        .into_iter()
        .enumerate()
        .map(|(i, seed)| Ok((i, Some(seed), random_guess(seed, config.init_spread)?)))
        .collect::<Result<_>>()?
    }
  };

  let run = |(restart, seed, x0): (usize, Option<u64>, [f64; 4])| {
    ws.minimize(x0, config, restart, seed)
  };
  let results: Vec<Result<FitResult>> = if config.parallel && jobs.len() > 1 {
    jobs.into_par_iter().map(run).collect()
  } else {
    jobs.into_iter().map(run).collect()
  };
  let restarts = results.into_iter().collect::<Result<Vec<_>>>()?;

  let best = restarts
    .iter()
    .min_by(|l, r| l.nll.total_cmp(&r.nll).then(l.restart.cmp(&r.restart)))
    .cloned()
    .ok_or_else(|| BgnbdError::config("restarts must be at least 1"))?;

  info!(
    restart = best.restart,
    nll = best.nll,
    converged = best.converged,
    params = %best.params,
    "selected best fit"
  );

  Ok(FitOutcome {
    best,
    restarts,
    time_scale: ws.scale,
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use tracing_test::traced_test;

  use super::*;
  use crate::simulate::simulate_rfm;

  fn truth() -> ModelParameters {
    ModelParameters::new(0.5, 5.0, 1.5, 4.0).unwrap()
  }

  fn population(n: usize, seed: u64) -> RfmData {
    let mut rng = StdRng::seed_from_u64(seed);
    simulate_rfm(&truth(), n, 39.0, &mut rng).unwrap()
  }

  #[test]
  fn rejects_invalid_restart_configuration() {
    let data = population(50, 1);

    let zero = FitConfig {
      restarts: 0,
      ..FitConfig::default()
    };
    assert!(matches!(fit(&data, &zero), Err(BgnbdError::Configuration(_))));

    let pinned = FitConfig {
      restarts: 2,
      initial_params: Some(ModelParameters::new(1.0, 1.0, 1.0, 1.0).unwrap()),
      ..FitConfig::default()
    };
    assert!(matches!(fit(&data, &pinned), Err(BgnbdError::Configuration(_))));
  }

  #[test]
  fn fixed_guess_matches_direct_minimization() {
    let data = population(300, 2);
    let initial = ModelParameters::new(1.0, 39.0, 1.0, 1.0).unwrap();
    let config = FitConfig {
      initial_params: Some(initial),
      ..FitConfig::default()
    };

    let outcome = fit(&data, &config).unwrap();
    let direct = minimize_from(&data, &initial, &config).unwrap();

    assert_eq!(outcome.best, direct);
    assert_eq!(outcome.restarts.len(), 1);
    assert_eq!(outcome.best.seed, None);
  }

  #[test]
  fn best_restart_is_no_worse_than_any_single_run() {
    let data = population(300, 3);
    let config = FitConfig {
      restarts: 4,
      seed: Some(42),
      ..FitConfig::default()
    };

    let outcome = fit(&data, &config).unwrap();
    assert_eq!(outcome.restarts.len(), 4);

    for run in &outcome.restarts {
      let seed = run.seed.unwrap();
      let independent = minimize_seeded(&data, seed, &config).unwrap();
      assert_eq!(independent.nll, run.nll);
      assert!(outcome.nll() <= independent.nll);
    }
  }

  #[test]
  fn parallel_and_sequential_selection_agree() {
    let data = population(200, 4);
    let parallel = FitConfig {
      restarts: 3,
      seed: Some(9),
      parallel: true,
      ..FitConfig::default()
    };
    let sequential = FitConfig {
      parallel: false,
      ..parallel.clone()
    };

    let a = fit(&data, &parallel).unwrap();
    let b = fit(&data, &sequential).unwrap();
    assert_eq!(a.best, b.best);
    assert_eq!(a.restarts, b.restarts);
  }

  #[test]
  fn time_scaling_round_trips_alpha() {
    let data = population(400, 5);
    let t_max = data.t_max();
    let initial = ModelParameters::new(1.0, t_max, 1.0, 1.0).unwrap();
    let scaled = FitConfig {
      initial_params: Some(initial),
      tolerance: 1e-10,
      max_iters: 10_000,
      scale_time: true,
      ..FitConfig::default()
    };
    let unscaled = FitConfig {
      scale_time: false,
      ..scaled.clone()
    };

    let s = fit(&data, &scaled).unwrap();
    let u = fit(&data, &unscaled).unwrap();

    assert_eq!(s.time_scale, t_max);
    assert_eq!(u.time_scale, 1.0);
    for (ps, pu) in s.params().to_array().iter().zip(u.params().to_array()) {
      assert_relative_eq!(*ps, pu, max_relative = 1e-3);
    }
    assert_relative_eq!(s.nll(), u.nll(), max_relative = 1e-8);
  }

  #[test]
  fn recovers_generating_parameters() {
    let data = population(2000, 6);
    let config = FitConfig {
      restarts: 3,
      seed: Some(7),
      ..FitConfig::default()
    };

    let outcome = fit(&data, &config).unwrap();
    let p = outcome.params();

    assert!(outcome.nll() <= neg_log_likelihood(&truth().to_array(), &data) + 1e-6);
    assert!(p.r() > 0.3 && p.r() < 0.8, "r = {}", p.r());
    assert!(p.alpha() > 2.5 && p.alpha() < 10.0, "alpha = {}", p.alpha());
  }

  #[test]
  #[traced_test]
  fn iteration_cap_is_soft() {
    let data = population(100, 8);
    let config = FitConfig {
      max_iters: 3,
      seed: Some(1),
      ..FitConfig::default()
    };

    let outcome = fit(&data, &config).unwrap();
    assert!(!outcome.converged());
    assert!(outcome.nll().is_finite());
    assert!(logs_contain("did not converge"));
  }

  #[test]
  fn simplex_perturbs_each_coordinate_once() {
    let simplex = initial_simplex(&[1.0, 0.0, 2.0]);
    assert_eq!(simplex.len(), 4);
    assert_eq!(simplex[0], vec![1.0, 0.0, 2.0]);
    assert_eq!(simplex[1], vec![1.05, 0.0, 2.0]);
    assert_eq!(simplex[2], vec![1.0, 0.00025, 2.0]);
    assert_eq!(simplex[3], vec![1.0, 0.0, 2.1]);
  }

  #[test]
  fn restart_seeds_are_reproducible() {
    assert_eq!(restart_seeds(5, 3), restart_seeds(5, 3));
    assert_ne!(restart_seeds(5, 3), restart_seeds(6, 3));
  }
}
