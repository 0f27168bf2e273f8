// src/serializer.rs
//
// JSON envelopes for the three tabular responses: row windows, folder
// listings, and table descriptions. Cell rendering is driven by the
// declared column type, not the datum variant, so a column keeps one
// wire representation no matter what the source stored in it.

use crate::session::RowBatch;
use crate::source::{ColumnInfo, ColumnType, Datum, EntryMeta, Schema};
use serde_json::{Map, Value, json};

/// Row window envelope: `total_count`, then `start`/`limit` when the caller
/// asked for a window (`limit` echoes the rows actually returned), then
/// `items` keyed by column name in schema order.
pub fn rows_envelope(batch: &RowBatch, start: Option<u64>, limit_requested: bool) -> Value {
    let mut root = Map::new();

    if let Some(total) = batch.total_count {
        root.insert("total_count".to_string(), json!(total));
    }
    if let Some(start) = start {
        root.insert("start".to_string(), json!(start));
    }
    if limit_requested {
        root.insert("limit".to_string(), json!(batch.rows.len() as u64));
    }

    let items: Vec<Value> = batch.rows.iter().map(|row| item(&batch.columns, row)).collect();
    root.insert("items".to_string(), Value::Array(items));

    Value::Object(root)
}

fn item(columns: &[ColumnInfo], row: &[Datum]) -> Value {
    let mut obj = Map::new();
    for (column, datum) in columns.iter().zip(row) {
        if let Some(value) = cell(column, datum) {
            obj.insert(column.name.clone(), value);
        }
    }
    Value::Object(obj)
}

/// Render one cell, or None for columns that are never serialized.
fn cell(column: &ColumnInfo, datum: &Datum) -> Option<Value> {
    match column.ty {
        ColumnType::Undefined | ColumnType::Invalid | ColumnType::Binary => None,

        ColumnType::Character | ColumnType::WideCharacter => {
            Some(Value::String(datum.as_text()))
        }

        ColumnType::Numeric | ColumnType::Double => {
            let v = datum.as_f64()?;
            Some(Value::String(format!("{:.*}", column.scale as usize, v)))
        }

        ColumnType::Integer => Some(Value::String(datum.as_i64()?.to_string())),

        ColumnType::Date => match datum {
            Datum::Date(d) if d.is_zero() => Some(Value::String("0000-00-00".to_string())),
            Datum::Date(d) => Some(Value::String(format!(
                "{:04}-{:02}-{:02}",
                d.year, d.month, d.day
            ))),
            Datum::Timestamp(t) if t.is_zero() => {
                Some(Value::String("0000-00-00".to_string()))
            }
            Datum::Timestamp(t) => Some(Value::String(format!(
                "{:04}-{:02}-{:02}",
                t.date.year, t.date.month, t.date.day
            ))),
            _ => None,
        },

        ColumnType::DateTime => match datum {
            Datum::Timestamp(t) if t.is_zero() => {
                Some(Value::String("0000-00-00 00:00:00".to_string()))
            }
            Datum::Timestamp(t) => Some(Value::String(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                t.date.year, t.date.month, t.date.day, t.hour, t.minute, t.second
            ))),
            Datum::Date(d) if d.is_zero() => {
                Some(Value::String("0000-00-00 00:00:00".to_string()))
            }
            Datum::Date(d) => Some(Value::String(format!(
                "{:04}-{:02}-{:02} 00:00:00",
                d.year, d.month, d.day
            ))),
            _ => None,
        },

        ColumnType::Boolean => Some(Value::Bool(datum.as_bool()?)),
    }
}

/// Folder listing envelope. The entry count is exact, so the listing always
/// reports a fast row count.
pub fn folder_envelope(entries: &[EntryMeta]) -> Value {
    let mut root = Map::new();
    root.insert("total_count".to_string(), json!(entries.len() as u64));
    root.insert("fast_row_count".to_string(), Value::Bool(true));
    root.insert(
        "items".to_string(),
        Value::Array(
            entries
                .iter()
                .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
                .collect(),
        ),
    );
    Value::Object(root)
}

/// Describe envelope: `total_count` is the column count; `row_count` and
/// `fast_row_count` appear when the source can count cheaply.
pub fn describe_envelope(schema: &Schema) -> Value {
    let mut root = Map::new();
    root.insert(
        "total_count".to_string(),
        json!(schema.columns.len() as u64),
    );
    match schema.row_count {
        Some(count) => {
            root.insert("row_count".to_string(), json!(count));
            root.insert("fast_row_count".to_string(), Value::Bool(true));
        }
        None => {
            root.insert("fast_row_count".to_string(), Value::Bool(false));
        }
    }

    let items: Vec<Value> = schema
        .columns
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "type": c.ty.as_str(),
                "width": c.width,
                "scale": c.scale,
            })
        })
        .collect();
    root.insert("items".to_string(), Value::Array(items));

    Value::Object(root)
}
