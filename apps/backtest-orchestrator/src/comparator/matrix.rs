//! Strategy-by-metric comparison matrix.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

use crate::backtest::{BacktestResult, MetricField, RunStatus};

/// Marker rendered for unavailable cells.
pub const NOT_AVAILABLE: &str = "N/A";

/// One matrix cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricCell {
    /// The metric was reported or derived.
    Available(Decimal),
    /// The metric is missing or undefined.
    NotAvailable,
}

impl MetricCell {
    /// The value, if available.
    #[must_use]
    pub const fn value(&self) -> Option<Decimal> {
        match self {
            Self::Available(v) => Some(*v),
            Self::NotAvailable => None,
        }
    }

    fn render(&self, field: MetricField) -> String {
        match self {
            Self::Available(v) if field.is_count() => v.trunc().to_string(),
            Self::Available(v) => format!("{:.2}", v.round_dp(2)),
            Self::NotAvailable => NOT_AVAILABLE.to_string(),
        }
    }
}

impl From<Option<Decimal>> for MetricCell {
    fn from(value: Option<Decimal>) -> Self {
        value.map_or(Self::NotAvailable, Self::Available)
    }
}

impl Serialize for MetricCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Available(v) => Serialize::serialize(v, serializer),
            Self::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

/// One strategy row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixRow {
    /// Strategy id.
    pub strategy_id: String,
    /// Run status.
    pub status: RunStatus,
    /// Cells, aligned with [`PerformanceMatrix::columns`].
    pub cells: Vec<MetricCell>,
}

/// Cross-strategy comparison table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformanceMatrix {
    /// Column order (the full metric field list).
    pub columns: Vec<MetricField>,
    /// Rows in input order.
    pub rows: Vec<MatrixRow>,
}

impl PerformanceMatrix {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up one cell.
    #[must_use]
    pub fn cell(&self, strategy_id: &str, field: MetricField) -> Option<MetricCell> {
        let column = self.columns.iter().position(|c| *c == field)?;
        self.rows
            .iter()
            .find(|row| row.strategy_id == strategy_id)
            .and_then(|row| row.cells.get(column).copied())
    }

    /// Render as an aligned text table.
    #[must_use]
    pub fn to_table(&self) -> String {
        let mut header: Vec<String> = vec!["strategy".to_string(), "status".to_string()];
        header.extend(self.columns.iter().map(|c| c.name().to_string()));

        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                let mut line = vec![row.strategy_id.clone(), status_label(row.status).to_string()];
                line.extend(
                    row.cells
                        .iter()
                        .zip(&self.columns)
                        .map(|(cell, field)| cell.render(*field)),
                );
                line
            })
            .collect();

        let mut widths: Vec<usize> = header.iter().map(String::len).collect();
        for line in &body {
            for (width, cell) in widths.iter_mut().zip(line) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        push_line(&mut out, &header, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        push_line(&mut out, &rule, &widths);
        for line in &body {
            push_line(&mut out, line, &widths);
        }
        out
    }
}

impl fmt::Display for PerformanceMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_table())
    }
}

const fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Completed => "COMPLETED",
        RunStatus::Failed => "FAILED",
    }
}

/// First two columns left-aligned, metrics right-aligned.
fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let rendered: Vec<String> = cells
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(i, (cell, width))| {
            if i < 2 {
                format!("{cell:<width$}")
            } else {
                format!("{cell:>width$}")
            }
        })
        .collect();
    out.push_str(rendered.join("  ").trim_end());
    out.push('\n');
}

/// Build the matrix. Row order follows the input; failed runs show
/// "not available" in every column.
#[must_use]
pub fn build_matrix<'a, I>(results: I) -> PerformanceMatrix
where
    I: IntoIterator<Item = &'a BacktestResult>,
{
    let columns = MetricField::ALL.to_vec();
    let rows = results
        .into_iter()
        .map(|result| MatrixRow {
            strategy_id: result.strategy_id.clone(),
            status: result.status,
            cells: columns
                .iter()
                .map(|field| {
                    if result.is_completed() {
                        MetricCell::from(result.metrics.get(*field))
                    } else {
                        MetricCell::NotAvailable
                    }
                })
                .collect(),
        })
        .collect();

    PerformanceMatrix { columns, rows }
}
