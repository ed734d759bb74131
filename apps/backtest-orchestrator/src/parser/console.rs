//! Console text scanning.
//!
//! The engine prints summary tables whose layout is not contractually stable.
//! Each line is matched against one generic `label <sep> value` pattern; the
//! label is normalized and looked up in a fixed alias table. Unknown labels
//! are skipped, and a later match for the same metric overwrites an earlier one.

use std::sync::OnceLock;

use regex::Regex;

use super::number::{parse_count, parse_numeric};
use super::raw::RawMetrics;

/// Metric a console label refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleField {
    TotalReturn,
    TotalReturnPct,
    TotalTrades,
    WinningTrades,
    LosingTrades,
    MaxDrawdown,
    MaxDrawdownPct,
    Sharpe,
    Sortino,
    ProfitFactor,
    GrossProfit,
    GrossLoss,
}

#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn line_regex() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(
            r"^[\s│┃|]*(?P<label>[A-Za-z][A-Za-z0-9 .%()/&_-]*?)\s*[:|│┃]\s*(?P<value>[^\s|│┃]+)",
        )
        .expect("console line regex is valid")
    })
}

fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn lookup(label: &str) -> Option<ConsoleField> {
    let field = match label {
        "total return" | "total profit" | "total return usdt" | "total profit usdt"
        | "absolute profit" | "tot profit usdt" => ConsoleField::TotalReturn,
        "total return %" | "total profit %" | "total return pct" | "tot profit %" => {
            ConsoleField::TotalReturnPct
        }
        "total trades" | "trades" | "total/daily avg trades" => ConsoleField::TotalTrades,
        "winning trades" | "wins" => ConsoleField::WinningTrades,
        "losing trades" | "losses" => ConsoleField::LosingTrades,
        "max drawdown" | "maximum drawdown" | "max drawdown usdt" | "absolute drawdown"
        | "absolute drawdown (account)" => ConsoleField::MaxDrawdown,
        "max drawdown %" | "maximum drawdown %" | "max drawdown pct"
        | "max % of account underwater" => ConsoleField::MaxDrawdownPct,
        "sharpe" | "sharpe ratio" => ConsoleField::Sharpe,
        "sortino" | "sortino ratio" => ConsoleField::Sortino,
        "profit factor" => ConsoleField::ProfitFactor,
        "gross profit" | "gross profit usdt" => ConsoleField::GrossProfit,
        "gross loss" | "gross loss usdt" | "total loss" | "total loss usdt" => {
            ConsoleField::GrossLoss
        }
        _ => return None,
    };
    Some(field)
}

/// Scan console output for recognized metric lines.
pub fn scan_console(text: &str) -> RawMetrics {
    let mut raw = RawMetrics::default();
    let re = line_regex();

    for line in text.lines() {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let (Some(label), Some(value)) = (caps.name("label"), caps.name("value")) else {
            continue;
        };
        if let Some(field) = lookup(&normalize_label(label.as_str())) {
            apply(&mut raw, field, value.as_str());
        }
    }

    raw
}

/// Store one token. A malformed token leaves the field untouched.
fn apply(raw: &mut RawMetrics, field: ConsoleField, token: &str) {
    match field {
        ConsoleField::TotalTrades => {
            if let Some(count) = parse_count(token) {
                raw.total_trades = Some(count);
            }
        }
        ConsoleField::WinningTrades => {
            if let Some(count) = parse_count(token) {
                raw.winning_trades = Some(count);
            }
        }
        ConsoleField::LosingTrades => {
            if let Some(count) = parse_count(token) {
                raw.losing_trades = Some(count);
            }
        }
        _ => {
            let Some(num) = parse_numeric(token) else {
                return;
            };
            match field {
                ConsoleField::TotalReturn if num.percent => raw.total_return_pct = Some(num.value),
                ConsoleField::TotalReturn => raw.total_return = Some(num.value),
                ConsoleField::TotalReturnPct => raw.total_return_pct = Some(num.value),
                ConsoleField::MaxDrawdown if num.percent => raw.max_drawdown_pct = Some(num.value),
                ConsoleField::MaxDrawdown => raw.max_drawdown = Some(num.value),
                ConsoleField::MaxDrawdownPct => raw.max_drawdown_pct = Some(num.value),
                ConsoleField::Sharpe => raw.sharpe_ratio = Some(num.value),
                ConsoleField::Sortino => raw.sortino_ratio = Some(num.value),
                ConsoleField::ProfitFactor => raw.profit_factor = Some(num.value),
                ConsoleField::GrossProfit if !num.percent => raw.gross_profit = Some(num.value),
                ConsoleField::GrossLoss if !num.percent => raw.gross_loss = Some(num.value),
                _ => {}
            }
        }
    }
}
