//! # BG/NBD
//!
//! $$
//! \Pr(X(T)=x\mid\lambda,p)=(1-p)^x\frac{(\lambda T)^x e^{-\lambda T}}{x!}
//! +\delta_{x>0}\,p(1-p)^{x-1}\Big(1-e^{-\lambda T}\sum_{j=0}^{x-1}\frac{(\lambda T)^j}{j!}\Big)
//! $$
//!
//! Beta-geometric/negative-binomial repeat-purchase model: likelihood, fitting and
//! conditional expectations.
pub mod data;
pub mod expectation;
pub mod fit;
pub mod likelihood;
pub mod params;

pub use data::RfmData;
pub use expectation::conditional_expected_transactions;
pub use expectation::expected_transactions;
pub use expectation::expected_transactions_for_frequency;
pub use expectation::expected_value;
pub use expectation::ParameterSource;
pub use expectation::UnitValue;
pub use expectation::ValueForecast;
pub use expectation::ValueForecastRequest;
pub use fit::fit;
pub use fit::FitConfig;
pub use likelihood::neg_log_likelihood;
pub use params::FitOutcome;
pub use params::FitResult;
pub use params::ModelParameters;
