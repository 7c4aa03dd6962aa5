//! Column-typed view of JSON prediction input.
//!
//! Rows arrive as JSON objects keyed by column name. Each model column is
//! converted into a typed vector once per batch, so feature engineering can
//! work column by column.

use crate::format::ColumnSpec;
use serde_json::{Map, Value};
use std::num::NonZeroUsize;
use tracing::trace;

/// One JSON input row.
pub type Row = Map<String, Value>;

/// A batch of rows converted to the model's column types.
#[derive(Debug, Clone)]
pub struct Table {
    n_rows: usize,
    columns: Vec<TableColumn>,
}

#[derive(Debug, Clone)]
pub struct TableColumn {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Column of unknown type; its values are never read.
    Unknown,
    /// NaN marks a missing or unparsable value.
    Number(Vec<f32>),
    /// 1-based option index; `None` for values outside the options.
    Enum(Vec<Option<NonZeroUsize>>),
    Text(Vec<String>),
}

impl Table {
    /// Convert `rows` using the column list of a model.
    pub fn from_rows(columns: &[ColumnSpec], rows: &[Row]) -> Table {
        let columns: Vec<TableColumn> = columns
            .iter()
            .map(|column| TableColumn {
                name: column.name().to_owned(),
                data: convert_column(column, rows),
            })
            .collect();
        if tracing::enabled!(tracing::Level::TRACE) {
            for (index, row) in rows.iter().enumerate() {
                for key in row.keys() {
                    if !Self::has_column(&columns, key) {
                        trace!(row = index, column = %key, "Ignoring unknown input column");
                    }
                }
            }
        }
        Table {
            n_rows: rows.len(),
            columns,
        }
    }

    fn has_column(columns: &[TableColumn], name: &str) -> bool {
        columns.iter().any(|column| column.name == name)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn columns(&self) -> &[TableColumn] {
        &self.columns
    }

    /// Column at `index`, in model column order.
    pub fn column(&self, index: usize) -> Option<&TableColumn> {
        self.columns.get(index)
    }
}

fn convert_column(column: &ColumnSpec, rows: &[Row]) -> ColumnData {
    match column {
        ColumnSpec::Unknown { .. } => ColumnData::Unknown,
        ColumnSpec::Number { name } => ColumnData::Number(
            rows.iter()
                .map(|row| number_value(row.get(name)))
                .collect(),
        ),
        ColumnSpec::Enum { name, options } => ColumnData::Enum(
            rows.iter()
                .map(|row| enum_value(row.get(name), options))
                .collect(),
        ),
        ColumnSpec::Text { name } => ColumnData::Text(
            rows.iter().map(|row| text_value(row.get(name))).collect(),
        ),
    }
}

fn number_value(value: Option<&Value>) -> f32 {
    match value {
        Some(Value::Number(n)) => n.as_f64().map(|v| v as f32).unwrap_or(f32::NAN),
        Some(Value::String(s)) => s.trim().parse::<f32>().unwrap_or(f32::NAN),
        _ => f32::NAN,
    }
}

fn enum_value(value: Option<&Value>, options: &[String]) -> Option<NonZeroUsize> {
    let text = match value? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    options
        .iter()
        .position(|option| *option == text)
        .and_then(|index| NonZeroUsize::new(index + 1))
}

fn text_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::Number {
                name: "age".to_string(),
            },
            ColumnSpec::Enum {
                name: "grade".to_string(),
                options: vec!["a".to_string(), "b".to_string(), "1".to_string()],
            },
            ColumnSpec::Text {
                name: "notes".to_string(),
            },
            ColumnSpec::Unknown {
                name: "misc".to_string(),
            },
        ]
    }

    fn rows(values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_number_conversion() {
        let table = Table::from_rows(
            &columns(),
            &rows(vec![
                json!({"age": 42}),
                json!({"age": " 3.5 "}),
                json!({"age": "old"}),
                json!({"age": null}),
                json!({}),
            ]),
        );
        match &table.column(0).unwrap().data {
            ColumnData::Number(values) => {
                assert_eq!(values[0], 42.0);
                assert_eq!(values[1], 3.5);
                assert!(values[2..].iter().all(|v| v.is_nan()));
            }
            other => panic!("unexpected column data: {other:?}"),
        }
    }

    #[test]
    fn test_enum_conversion() {
        let table = Table::from_rows(
            &columns(),
            &rows(vec![
                json!({"grade": "b"}),
                json!({"grade": 1}),
                json!({"grade": "B"}),
                json!({"grade": true}),
            ]),
        );
        let expected = vec![NonZeroUsize::new(2), NonZeroUsize::new(3), None, None];
        assert_eq!(table.column(1).unwrap().data, ColumnData::Enum(expected));
    }

    #[test]
    fn test_text_and_unknown_columns() {
        let table = Table::from_rows(
            &columns(),
            &rows(vec![
                json!({"notes": "hello", "misc": 1, "extra": "ignored"}),
                json!({"notes": 7}),
                json!({"notes": ["x"]}),
            ]),
        );
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.columns().len(), 4);
        assert_eq!(
            table.column(2).unwrap().data,
            ColumnData::Text(vec!["hello".to_string(), "7".to_string(), String::new()])
        );
        assert_eq!(table.column(3).unwrap().data, ColumnData::Unknown);
    }
}
