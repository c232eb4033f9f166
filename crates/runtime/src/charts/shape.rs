//! Per-record validation against a chart type's expected shape.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use super::DataPoint;

/// The record layout a chart type expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Shape {
    /// `name` plus a numeric `value`; extra numeric fields become series.
    Category,
    /// Numeric `x` and `y`, optional `name`.
    Scatter,
    /// Objects with arbitrary fields.
    Table,
    /// Two categorical axes and one numeric intensity.
    Heatmap,
}

/// A record that failed validation, numbered from 1.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Rejection {
    pub record: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub(super) struct Validated {
    pub points: Vec<DataPoint>,
    pub rejected: Vec<Rejection>,
    pub warnings: Vec<String>,
}

pub(super) fn validate(shape: Shape, records: Vec<Value>) -> Validated {
    let mut out = Validated::default();
    let mut columns = BTreeSet::new();

    for (index, record) in records.into_iter().enumerate() {
        let result = match record {
            Value::Object(fields) => {
                if shape == Shape::Table && !fields.is_empty() {
                    let mut keys: Vec<&str> = fields.keys().map(String::as_str).collect();
                    keys.sort_unstable();
                    columns.insert(keys.join(","));
                }
                match shape {
                    Shape::Category => category(fields),
                    Shape::Scatter => scatter(&fields),
                    Shape::Table => row(fields),
                    Shape::Heatmap => cell(&fields),
                }
            }
            other => Err(format!("expected an object, got {}", kind_of(&other))),
        };

        match result {
            Ok(point) => out.points.push(point),
            Err(reason) => out.rejected.push(Rejection {
                record: index + 1,
                reason,
            }),
        }
    }

    if columns.len() > 1 {
        out.warnings.push(format!(
            "rows have differing columns ({} distinct column sets)",
            columns.len()
        ));
    }
    out
}

fn category(fields: Map<String, Value>) -> Result<DataPoint, String> {
    let name = match fields.get("name") {
        None | Some(Value::Null) => return Err("missing 'name'".into()),
        Some(v) => label(v).ok_or("'name' must be a string or number")?,
    };
    let value = match fields.get("value") {
        None | Some(Value::Null) => return Err("missing numeric 'value'".into()),
        Some(v) => number(v).ok_or("'value' must be a finite number")?,
    };

    // Non-numeric extras such as colors are ignored.
    let series: BTreeMap<String, f64> = fields
        .iter()
        .filter(|(key, _)| *key != "name" && *key != "value")
        .filter_map(|(key, v)| number(v).map(|n| (key.clone(), n)))
        .collect();

    Ok(DataPoint::Category {
        name,
        value,
        series,
    })
}

fn scatter(fields: &Map<String, Value>) -> Result<DataPoint, String> {
    let x = fields
        .get("x")
        .and_then(number)
        .ok_or("'x' must be a finite number")?;
    let y = fields
        .get("y")
        .and_then(number)
        .ok_or("'y' must be a finite number")?;
    let name = match fields.get("name") {
        None | Some(Value::Null) => None,
        Some(v) => Some(label(v).ok_or("'name' must be a string or number")?),
    };
    Ok(DataPoint::Scatter { x, y, name })
}

fn row(fields: Map<String, Value>) -> Result<DataPoint, String> {
    if fields.is_empty() {
        return Err("empty row".into());
    }
    Ok(DataPoint::Row(fields))
}

fn cell(fields: &Map<String, Value>) -> Result<DataPoint, String> {
    if ["x", "y", "value"].iter().any(|key| fields.contains_key(*key)) {
        let axis = |key: &str| {
            fields
                .get(key)
                .and_then(label)
                .ok_or_else(|| format!("'{key}' must be a string or number"))
        };
        let value = fields
            .get("value")
            .and_then(number)
            .ok_or("'value' must be a finite number")?;
        return Ok(DataPoint::Cell {
            x: axis("x")?,
            y: axis("y")?,
            value,
        });
    }

    // Without explicit axes, take the two string fields (by key order) and
    // the single numeric one.
    let mut axes: Vec<(&String, &str)> = fields
        .iter()
        .filter_map(|(key, v)| match v {
            Value::String(s) if !s.trim().is_empty() => Some((key, s.trim())),
            _ => None,
        })
        .collect();
    axes.sort_by(|a, b| a.0.cmp(b.0));
    let values: Vec<f64> = fields.values().filter_map(number).collect();

    match (axes.as_slice(), values.as_slice()) {
        ([(_, x), (_, y)], [value]) => Ok(DataPoint::Cell {
            x: x.to_string(),
            y: y.to_string(),
            value: *value,
        }),
        _ => Err("expected two categorical fields and one numeric field".into()),
    }
}

fn label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|n| n.is_finite())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
