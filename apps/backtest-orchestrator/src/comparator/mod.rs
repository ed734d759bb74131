//! Result comparison.
//!
//! Pure functions over parsed [`BacktestResult`]s: no I/O and no mutation.
//! Rankings borrow from the input slice. Besides single-key sorting there is
//! a weighted composite ranking ([`rank_weighted`]) and a risk/return
//! quadrant split ([`risk_return`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use backtest_orchestrator::comparator::{FilterSpec, SortKey, build_matrix, filter, top_n};
//!
//! let spec = FilterSpec::from_pairs([("min_win_rate", dec!(50))])?;
//! let kept: Vec<_> = filter(&results, &spec).into_iter().cloned().collect();
//! let best = top_n(&kept, 3, SortKey::SharpeRatio, true)?;
//! println!("{}", build_matrix(best).to_table());
//! ```

mod filter;
mod matrix;
mod risk_return;
mod score;
mod sort;
mod summary;

pub use filter::{Constraint, FilterSpec, filter};
pub use matrix::{MatrixRow, MetricCell, NOT_AVAILABLE, PerformanceMatrix, build_matrix};
pub use risk_return::{Quadrant, RiskReturnAnalysis, risk_return};
pub use score::{MetricWeights, WeightedRank, rank_weighted, score};
pub use sort::{SortKey, sort, top_n};
pub use summary::{ComparisonSummary, summarize};
