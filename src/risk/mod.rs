pub mod evaluator;
pub mod types;

pub use evaluator::{Classifier, HeuristicClassifier, estimate_profit, estimate_slippage};
pub use types::RiskConfig;
