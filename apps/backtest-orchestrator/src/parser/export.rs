//! JSON export parsing for evaluation runs.
//!
//! Two layouts are accepted: a flat document with `results_metrics` and
//! `trades`, and the engine's native layout where metrics and trades sit
//! under `strategy.<strategy name>`.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::ParseError;
use super::number::{json_count, json_decimal};
use super::raw::RawMetrics;
use crate::backtest::{HUNDRED, TradeRecord};

/// Metrics and trades read from an export document.
#[derive(Debug, Clone, Default)]
pub struct ExportData {
    pub metrics: RawMetrics,
    pub trades: Vec<TradeRecord>,
}

/// Parse an evaluation export document.
pub fn parse_export(text: &str, strategy_id: &str) -> Result<ExportData, ParseError> {
    let root: Value = serde_json::from_str(text)?;
    let Some(root) = root.as_object() else {
        return Err(ParseError::Malformed {
            message: "export root is not a JSON object".to_string(),
        });
    };

    let section = strategy_section(root, strategy_id);
    let metrics_map = root
        .get("results_metrics")
        .and_then(Value::as_object)
        .or(section);
    let trade_list = root
        .get("trades")
        .and_then(Value::as_array)
        .or_else(|| section.and_then(|s| s.get("trades")).and_then(Value::as_array));

    if metrics_map.is_none() && trade_list.is_none() {
        return Err(ParseError::MissingKey {
            key: "results_metrics".to_string(),
        });
    }

    Ok(ExportData {
        metrics: metrics_map.map(metrics_from_object).unwrap_or_default(),
        trades: trade_list.map(|list| parse_trades(list)).unwrap_or_default(),
    })
}

fn strategy_section<'a>(
    root: &'a Map<String, Value>,
    strategy_id: &str,
) -> Option<&'a Map<String, Value>> {
    let strategies = root.get("strategy")?.as_object()?;
    strategies
        .get(strategy_id)
        .or_else(|| strategies.values().next())
        .and_then(Value::as_object)
}

fn parse_trades(list: &[Value]) -> Vec<TradeRecord> {
    list.iter()
        .filter_map(|entry| match TradeRecord::deserialize(entry) {
            Ok(trade) => Some(trade),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable trade entry");
                None
            }
        })
        .collect()
}

fn decimal_key(map: &Map<String, Value>, key: &str) -> Option<Decimal> {
    map.get(key).and_then(json_decimal)
}

fn count_key(map: &Map<String, Value>, key: &str) -> Option<u64> {
    map.get(key).and_then(json_count)
}

/// Ratio to percent; `None` when the result does not fit a `Decimal`.
fn ratio_to_pct(ratio: Decimal) -> Option<Decimal> {
    ratio.checked_mul(HUNDRED)
}

/// Map an export metrics object onto primary values.
///
/// `profit_total` is absolute when no `profit_total_abs` is present and a
/// ratio otherwise; `max_drawdown_account` is always a ratio.
pub fn metrics_from_object(map: &Map<String, Value>) -> RawMetrics {
    let profit_total_abs = decimal_key(map, "profit_total_abs");
    let profit_total = decimal_key(map, "profit_total");

    let (total_return, profit_ratio) = match profit_total_abs {
        Some(abs) => (Some(abs), profit_total),
        None => (profit_total, None),
    };
    let total_return_pct = decimal_key(map, "profit_total_pct")
        .or_else(|| profit_ratio.and_then(ratio_to_pct));

    let max_drawdown =
        decimal_key(map, "max_drawdown_abs").or_else(|| decimal_key(map, "max_drawdown"));
    let max_drawdown_pct = decimal_key(map, "max_drawdown_pct")
        .or_else(|| decimal_key(map, "max_drawdown_account").and_then(ratio_to_pct));

    RawMetrics {
        total_return,
        total_return_pct,
        total_trades: count_key(map, "total_trades").or_else(|| count_key(map, "trades")),
        winning_trades: count_key(map, "wins"),
        losing_trades: count_key(map, "losses"),
        max_drawdown,
        max_drawdown_pct,
        sharpe_ratio: decimal_key(map, "sharpe"),
        sortino_ratio: decimal_key(map, "sortino"),
        profit_factor: decimal_key(map, "profit_factor"),
        gross_profit: None,
        gross_loss: None,
    }
}
