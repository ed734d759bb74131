//! Result parsing for engine output.
//!
//! Executors hand the captured console text and the export document (if one
//! was written) to a [`ResultParser`]. Two strategies are provided:
//!
//! - [`ConsoleTextParser`]: scans console text line by line and uses the
//!   export to fill whatever the console did not report.
//! - [`ExportOnlyParser`]: ignores console text and requires the export.
//!
//! Derived fields (win rate, Calmar ratio, profit factor) are always computed
//! after extraction and are never taken from the engine.
//!
//! # Example
//!
//! ```rust
//! use backtest_orchestrator::parser::{ConsoleTextParser, EngineOutput, ResultParser};
//!
//! let output = EngineOutput::console_only(
//!     "SampleStrategy",
//!     "Total Return %: 25.00\nTotal trades: 15\nWinning trades: 7\n",
//! );
//! let parsed = ConsoleTextParser.parse(&output).unwrap();
//! assert_eq!(parsed.metrics.total_trades, Some(15));
//! ```

mod console;
mod export;
mod hyperopt;
mod number;
mod raw;

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::backtest::{PerformanceMetrics, TradeRecord};
use crate::error::OrchestratorError;
use crate::observability::record_parse_fallback;

pub use hyperopt::parse_hyperopt_document;
pub use number::{Numeric, parse_count, parse_numeric};
pub use raw::{calmar_ratio, profit_factor, win_rate};

// ============================================
// Error Types
// ============================================

/// Errors from result parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Neither console text nor an export document was produced.
    #[error("Engine produced no output")]
    EmptyOutput,

    /// The document is not well-formed JSON.
    #[error("Document is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A required top-level key is absent.
    #[error("Document is missing required key '{key}'")]
    MissingKey {
        /// Missing key.
        key: String,
    },

    /// The document has the right keys but the wrong shape.
    #[error("Malformed document: {message}")]
    Malformed {
        /// What was wrong.
        message: String,
    },
}

impl From<ParseError> for OrchestratorError {
    fn from(err: ParseError) -> Self {
        Self::data(err.to_string())
    }
}

// ============================================
// Parser Port
// ============================================

/// Captured output of one engine run.
#[derive(Debug, Clone, Copy)]
pub struct EngineOutput<'a> {
    /// Strategy the run evaluated; selects the export section.
    pub strategy_id: &'a str,
    /// Captured standard output.
    pub console: &'a str,
    /// Contents of the export file, if one was written.
    pub export: Option<&'a str>,
}

impl<'a> EngineOutput<'a> {
    /// Output with console text only.
    #[must_use]
    pub const fn console_only(strategy_id: &'a str, console: &'a str) -> Self {
        Self {
            strategy_id,
            console,
            export: None,
        }
    }

    fn has_console(&self) -> bool {
        !self.console.trim().is_empty()
    }

    fn export_text(&self) -> Option<&'a str> {
        self.export.filter(|text| !text.trim().is_empty())
    }
}

/// Parsed metrics and trades.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRun {
    /// Final metrics with derived fields computed.
    pub metrics: PerformanceMetrics,
    /// Trades from the export document.
    pub trades: Vec<TradeRecord>,
}

/// Converts engine output into structured metrics.
pub trait ResultParser: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Parse one run's output. Fails only when there is nothing to parse
    /// (or, for export-only parsing, when the export is unusable).
    fn parse(&self, output: &EngineOutput<'_>) -> Result<ParsedRun, ParseError>;
}

/// Console-text parser with export supplement.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleTextParser;

impl ResultParser for ConsoleTextParser {
    fn name(&self) -> &'static str {
        "console"
    }

    fn parse(&self, output: &EngineOutput<'_>) -> Result<ParsedRun, ParseError> {
        let has_console = output.has_console();
        let export = output.export_text();
        if !has_console && export.is_none() {
            return Err(ParseError::EmptyOutput);
        }

        let mut raw = console::scan_console(output.console);
        let mut trades = Vec::new();

        if let Some(text) = export {
            match export::parse_export(text, output.strategy_id) {
                Ok(data) => {
                    debug!(
                        strategy_id = output.strategy_id,
                        trades = data.trades.len(),
                        "Merging export metrics into console parse"
                    );
                    raw.fill_gaps(data.metrics);
                    trades = data.trades;
                }
                Err(e) if has_console => {
                    debug!(
                        strategy_id = output.strategy_id,
                        error = %e,
                        "Ignoring unreadable export, using console output only"
                    );
                    record_parse_fallback("export_ignored");
                }
                Err(e) => return Err(e),
            }
        } else if raw.is_empty() {
            debug!(
                strategy_id = output.strategy_id,
                "No recognized metric lines in console output"
            );
            record_parse_fallback("no_metric_lines");
        }

        Ok(ParsedRun {
            metrics: raw.finish(&trades),
            trades,
        })
    }
}

/// Parser that reads only the export document.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOnlyParser;

impl ResultParser for ExportOnlyParser {
    fn name(&self) -> &'static str {
        "export"
    }

    fn parse(&self, output: &EngineOutput<'_>) -> Result<ParsedRun, ParseError> {
        let text = output.export_text().ok_or(ParseError::EmptyOutput)?;
        let data = export::parse_export(text, output.strategy_id)?;
        Ok(ParsedRun {
            metrics: data.metrics.finish(&data.trades),
            trades: data.trades,
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::error::ErrorKind;

    const CONSOLE: &str = "Total Return %: 25.00\nTotal trades: 15\nWinning trades: 7\n";

    #[test]
    fn test_console_end_to_end_metrics() {
        let parsed = ConsoleTextParser
            .parse(&EngineOutput::console_only("S", CONSOLE))
            .unwrap();
        let metrics = parsed.metrics;
        assert_eq!(metrics.total_trades, Some(15));
        assert_eq!(metrics.winning_trades, Some(7));
        assert_eq!(metrics.losing_trades, None);
        assert!((metrics.win_rate - dec!(46.67)).abs() < dec!(0.01));
        assert_eq!(metrics.total_return_pct, Some(dec!(25)));
        assert_eq!(metrics.calmar_ratio, None);
        assert_eq!(metrics.sharpe_ratio, None);
    }

    #[test]
    fn test_empty_input_is_data_error() {
        let Err(err) = ConsoleTextParser.parse(&EngineOutput::console_only("S", "  \n")) else {
            panic!("empty output should fail");
        };
        assert!(matches!(err, ParseError::EmptyOutput));
        assert_eq!(OrchestratorError::from(err).kind(), ErrorKind::Data);
    }

    #[test]
    fn test_unrecognized_text_yields_defaults() {
        let parsed = ConsoleTextParser
            .parse(&EngineOutput::console_only("S", "nothing useful here"))
            .unwrap();
        assert_eq!(parsed.metrics, PerformanceMetrics::default());
    }

    #[test]
    fn test_export_fills_console_gaps() {
        let export = r#"{"results_metrics": {"sharpe": 1.8, "profit_total_pct": 99.0,
                         "max_drawdown_pct": 10.0}}"#;
        let output = EngineOutput {
            strategy_id: "S",
            console: CONSOLE,
            export: Some(export),
        };
        let metrics = ConsoleTextParser.parse(&output).unwrap().metrics;
        assert_eq!(metrics.total_return_pct, Some(dec!(25)));
        assert_eq!(metrics.sharpe_ratio, Some(dec!(1.8)));
        assert_eq!(metrics.calmar_ratio, Some(dec!(2.5)));
    }

    #[test]
    fn test_out_of_range_export_does_not_panic() {
        let output = EngineOutput {
            strategy_id: "S",
            console: "",
            export: Some(r#"{"results_metrics": {"profit_total_abs": 1, "profit_total": 1e27}}"#),
        };
        let metrics = ConsoleTextParser.parse(&output).unwrap().metrics;
        assert_eq!(metrics.total_return, Some(dec!(1)));
        assert_eq!(metrics.total_return_pct, None);
        assert_eq!(metrics.calmar_ratio, None);
    }

    #[test]
    fn test_bad_export_ignored_when_console_present() {
        let output = EngineOutput {
            strategy_id: "S",
            console: CONSOLE,
            export: Some("{truncated"),
        };
        assert_eq!(
            ConsoleTextParser.parse(&output).unwrap().metrics.total_trades,
            Some(15)
        );

        let output = EngineOutput {
            console: "",
            ..output
        };
        assert!(matches!(
            ConsoleTextParser.parse(&output),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_export_only_parser() {
        let output = EngineOutput::console_only("S", CONSOLE);
        assert!(matches!(
            ExportOnlyParser.parse(&output),
            Err(ParseError::EmptyOutput)
        ));

        let output = EngineOutput {
            export: Some(r#"{"results_metrics": {"trades": 4, "wins": 1}}"#),
            ..output
        };
        let metrics = ExportOnlyParser.parse(&output).unwrap().metrics;
        assert_eq!(metrics.total_trades, Some(4));
        assert_eq!(metrics.win_rate, dec!(25));
        assert_eq!(ExportOnlyParser.name(), "export");
    }

    proptest! {
        #[test]
        fn prop_console_parse_is_idempotent(
            total in 0u64..500,
            wins in 0u64..500,
            ret in -10_000i64..10_000,
            noise in "[a-z :|]{0,40}",
        ) {
            let text = format!(
                "{noise}\nTotal Return %: {}\nTotal trades: {total}\nWinning trades: {wins}\n{noise}\n",
                Decimal::new(ret, 2)
            );
            let output = EngineOutput::console_only("S", &text);
            let first = ConsoleTextParser.parse(&output).unwrap();
            let second = ConsoleTextParser.parse(&output).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert!(first.metrics.win_rate >= Decimal::ZERO);
            prop_assert!(first.metrics.win_rate <= Decimal::ONE_HUNDRED);
        }
    }
}
