//! Pure indicator functions. Every `compute` takes prices oldest first and
//! returns its output series oldest first, one point per bar from the first
//! bar where the indicator is fully defined. Too little input yields an
//! empty series rather than an error.

pub mod bollinger;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stochastic;

pub use bollinger::{Band, BollingerBands};
pub use macd::{MacdIndicator, MacdPoint};
pub use rsi::RsiIndicator;
pub use sma::sma;
pub use stochastic::{StochasticIndicator, StochasticPoint};
