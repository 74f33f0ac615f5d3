//! # bgnbd-rs
//!
//! $$
//! \lambda\sim\Gamma(r,\alpha),\quad p\sim\mathrm{Beta}(a,b)
//! $$
//!
//! Customer-base analysis with the BG/NBD model. A dated purchase log is folded
//! into per-customer recency/frequency/value rows ([`rfm`]), the four population
//! parameters are estimated by maximum likelihood ([`bgnbd::fit`]) and used to
//! forecast purchases and spend of any customer group ([`bgnbd::expectation`]).
pub mod bgnbd;
pub mod error;
pub mod rfm;
pub mod simulate;
pub mod special;

pub use error::BgnbdError;
pub use error::Result;
