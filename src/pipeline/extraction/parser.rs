//! Model output → `ExtractedResultItem`s.
//!
//! Accepts a JSON array of panels or a single panel object, optionally wrapped
//! in a markdown code fence. Anything else is a parse error; there is no
//! fallback item at this level.

use serde::Deserialize;
use serde_json::Value;

use super::ExtractionError;
use crate::models::{ExtractedResultItem, ResultKind, ResultValues};

const DEFAULT_CATEGORY: &str = "General";
const UNTITLED: &str = "Unknown Test";

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default, alias = "type")]
    kind: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, alias = "test_name", alias = "name")]
    title: Option<String>,
    #[serde(default)]
    date: Option<Value>,
    #[serde(default, alias = "values", alias = "parameters")]
    results: Option<Value>,
}

/// Remove a surrounding ```json ... ``` fence if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

pub fn parse_extraction(raw: &str) -> Result<Vec<ExtractedResultItem>, ExtractionError> {
    let body = strip_code_fences(raw);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ExtractionError::Parse(format!("not valid JSON: {e}")))?;

    let elements = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        other => {
            return Err(ExtractionError::Parse(format!(
                "expected an array or object, got {}",
                json_kind(&other)
            )))
        }
    };

    elements
        .into_iter()
        .enumerate()
        .map(|(idx, element)| item_from_value(idx, element))
        .collect()
}

fn item_from_value(idx: usize, element: Value) -> Result<ExtractedResultItem, ExtractionError> {
    if !element.is_object() {
        return Err(ExtractionError::Parse(format!(
            "panel {idx} is {}, expected an object",
            json_kind(&element)
        )));
    }
    let raw: RawItem = serde_json::from_value(element)
        .map_err(|e| ExtractionError::Parse(format!("panel {idx}: {e}")))?;

    let results = match raw.results {
        None | Some(Value::Null) => ResultValues::new(),
        Some(Value::Object(map)) => map,
        Some(Value::Array(rows)) => results_from_rows(idx, rows)?,
        Some(other) => {
            return Err(ExtractionError::Parse(format!(
                "panel {idx}: results is {}",
                json_kind(&other)
            )))
        }
    };

    Ok(ExtractedResultItem {
        kind: ResultKind::from_model_label(raw.kind.as_deref().unwrap_or("LAB")),
        category: non_empty(raw.category).unwrap_or_else(|| DEFAULT_CATEGORY.into()),
        title: non_empty(raw.title).unwrap_or_else(|| UNTITLED.into()),
        date: match raw.date {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        },
        results,
    })
}

/// `[{"name": "Na", "value": "139", "unit": "mmol/L"}, ...]` → ordered map.
fn results_from_rows(idx: usize, rows: Vec<Value>) -> Result<ResultValues, ExtractionError> {
    let mut results = ResultValues::new();
    for row in rows {
        let name = row
            .get("name")
            .or_else(|| row.get("parameter"))
            .and_then(Value::as_str)
            .ok_or_else(|| ExtractionError::Parse(format!("panel {idx}: result row without a name")))?
            .trim()
            .to_string();
        let value = row.get("value").cloned().unwrap_or(Value::Null);
        let value = match (value, row.get("unit").and_then(Value::as_str)) {
            (Value::String(v), Some(unit)) if !unit.is_empty() => Value::String(format!("{v} {unit}")),
            (Value::Number(n), Some(unit)) if !unit.is_empty() => Value::String(format!("{n} {unit}")),
            (v, _) => v,
        };
        results.insert(name, value);
    }
    Ok(results)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
