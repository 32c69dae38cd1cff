pub mod indicators;
pub mod signals;

pub use signals::{evaluate, evaluate_with};
