//! Hyperopt results document parsing.
//!
//! Required top-level keys: `best_params` (object), `results_metrics`
//! (object) and `hyperopt_results` (array, `results` accepted as an alias).

use serde_json::{Map, Value};

use super::ParseError;
use super::export::metrics_from_object;
use super::number::json_decimal;
use crate::backtest::{HyperoptResult, HyperoptSample, ParamSet};

/// Keys checked, in order, for a sample's objective value.
const SAMPLE_METRIC_KEYS: [&str; 4] = ["profit", "loss", "metric", "objective"];

/// Parse a hyperopt results document.
pub fn parse_hyperopt_document(text: &str) -> Result<HyperoptResult, ParseError> {
    let root: Value = serde_json::from_str(text)?;
    let Some(root) = root.as_object() else {
        return Err(ParseError::Malformed {
            message: "results root is not a JSON object".to_string(),
        });
    };

    let best_params = required_object(root, "best_params")?;
    let metrics = required_object(root, "results_metrics")?;
    let samples = root
        .get("hyperopt_results")
        .or_else(|| root.get("results"))
        .ok_or_else(|| ParseError::MissingKey {
            key: "hyperopt_results".to_string(),
        })?
        .as_array()
        .ok_or_else(|| ParseError::Malformed {
            message: "'hyperopt_results' is not an array".to_string(),
        })?;

    Ok(HyperoptResult {
        best_params: param_set(best_params, "best_params")?,
        metrics: metrics_from_object(metrics).finish(&[]),
        samples: samples
            .iter()
            .enumerate()
            .map(|(index, entry)| parse_sample(index, entry))
            .collect::<Result<_, _>>()?,
    })
}

fn required_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a Map<String, Value>, ParseError> {
    root.get(key)
        .ok_or_else(|| ParseError::MissingKey {
            key: key.to_string(),
        })?
        .as_object()
        .ok_or_else(|| ParseError::Malformed {
            message: format!("'{key}' is not an object"),
        })
}

fn param_set(map: &Map<String, Value>, context: &str) -> Result<ParamSet, ParseError> {
    serde_json::from_value(Value::Object(map.clone())).map_err(|e| ParseError::Malformed {
        message: format!("'{context}' has unreadable parameters: {e}"),
    })
}

fn parse_sample(index: usize, entry: &Value) -> Result<HyperoptSample, ParseError> {
    let Some(entry) = entry.as_object() else {
        return Err(ParseError::Malformed {
            message: format!("sample {index} is not an object"),
        });
    };

    let params = match entry.get("params") {
        Some(Value::Object(map)) => param_set(map, "params")?,
        Some(_) => {
            return Err(ParseError::Malformed {
                message: format!("sample {index} has non-object params"),
            });
        }
        None => ParamSet::new(),
    };

    let metric = SAMPLE_METRIC_KEYS
        .iter()
        .find_map(|key| entry.get(*key).and_then(json_decimal));

    Ok(HyperoptSample { params, metric })
}
