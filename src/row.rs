//! Driver-independent result rows
//!
//! Verification scripts are arbitrary SQL, so their result shape is only
//! known at runtime. [`ResultRow`] keeps each column's name and a JSON
//! rendering of its value, in column order. That is all the verifier needs to
//! interpret a result and to store it as audit details.

use may_postgres::types::Type;
use may_postgres::Row;
use serde_json::{Map, Value};

/// One row of a query result, as ordered `(column, value)` pairs
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultRow {
    columns: Vec<(String, Value)>,
}

impl ResultRow {
    /// Create an empty row
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// Append a column
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    /// Value of the first column called `column`
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.iter().find(|(name, _)| name == column).map(|(_, value)| value)
    }

    /// Value at a column position
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).map(|(_, value)| value)
    }

    /// Iterate over column values in order
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.columns.iter().map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Render the row as a JSON object keyed by column name
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (name, value) in &self.columns {
            object.entry(name.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(object)
    }

    /// Convert a `may_postgres` row
    ///
    /// Booleans, integers, floats, text and JSON columns map to their JSON
    /// counterparts. SQL `NULL` maps to `null`. Columns of any other type are
    /// rendered as `"<type_name>"` so the column still shows up in the
    /// audit details.
    #[must_use]
    pub fn from_pg_row(row: &Row) -> Self {
        let mut result = Self::new();
        for (index, column) in row.columns().iter().enumerate() {
            result.push(column.name(), pg_value(row, index, column.type_()));
        }
        result
    }
}

fn pg_value(row: &Row, index: usize, ty: &Type) -> Value {
    let converted = if *ty == Type::BOOL {
        row.try_get::<usize, Option<bool>>(index).map(|v| v.map(Value::Bool))
    } else if *ty == Type::INT2 {
        row.try_get::<usize, Option<i16>>(index).map(|v| v.map(Value::from))
    } else if *ty == Type::INT4 {
        row.try_get::<usize, Option<i32>>(index).map(|v| v.map(Value::from))
    } else if *ty == Type::INT8 {
        row.try_get::<usize, Option<i64>>(index).map(|v| v.map(Value::from))
    } else if *ty == Type::FLOAT4 {
        row.try_get::<usize, Option<f32>>(index).map(|v| v.map(|f| Value::from(f64::from(f))))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<usize, Option<f64>>(index).map(|v| v.map(Value::from))
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<usize, Option<Value>>(index)
    } else {
        row.try_get::<usize, Option<String>>(index).map(|v| v.map(Value::String))
    };

    match converted {
        Ok(Some(value)) => value,
        Ok(None) => Value::Null,
        Err(_) => Value::String(format!("<{}>", ty.name())),
    }
}
