//! Driver-independent SQL values and result rows.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use sqlx::any::AnyRow;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo};

/// A single SQL value, used both for bound parameters and for decoded columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(f) => Some(*f),
            SqlValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// One result row: column names and values in select order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Value at `index` in select order.
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Value of the first column named `name`.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }
}

/// Rows from the runtime-selected driver (SQLite in tests): portable types only.
impl TryFrom<&AnyRow> for SqlRow {
    type Error = sqlx::Error;

    fn try_from(row: &AnyRow) -> Result<Self, Self::Error> {
        SqlRow::decode_with(row, decode_any_column)
    }
}

/// Rows from the native MySQL driver, including temporal, `DECIMAL` and `JSON` columns.
impl TryFrom<&MySqlRow> for SqlRow {
    type Error = sqlx::Error;

    fn try_from(row: &MySqlRow) -> Result<Self, Self::Error> {
        SqlRow::decode_with(row, decode_mysql_column)
    }
}

impl SqlRow {
    fn decode_with<R: Row>(
        row: &R,
        decode: fn(&R, usize) -> Result<SqlValue, sqlx::Error>,
    ) -> Result<Self, sqlx::Error> {
        let mut columns = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (index, column) in row.columns().iter().enumerate() {
            columns.push(column.name().to_string());
            values.push(decode(row, index)?);
        }
        Ok(Self { columns, values })
    }
}

/// Tries the portable types in turn: i64, f64, bool, text, bytes.
fn decode_any_column(row: &AnyRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Int));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Float));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Bool));
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Text));
    }
    row.try_get::<Option<Vec<u8>>, _>(index)
        .map(|v| v.map_or(SqlValue::Null, SqlValue::Bytes))
}

/// MySQL columns: integers (unsigned ones above `i64::MAX` become text), floats,
/// date and time types as ISO text, then text and binary. `DECIMAL`, `JSON` and
/// anything else left is read as its text form.
fn decode_mysql_column(row: &MySqlRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    let unsigned = row
        .columns()
        .get(index)
        .is_some_and(|c| c.type_info().name().ends_with("UNSIGNED"));
    if unsigned {
        if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
            return Ok(v.map_or(SqlValue::Null, |n| {
                i64::try_from(n).map_or_else(|_| SqlValue::Text(n.to_string()), SqlValue::Int)
            }));
        }
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Int));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Float));
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, |f| SqlValue::Float(f64::from(f))));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Bool));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, |t| SqlValue::Text(t.to_string())));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, |d| SqlValue::Text(d.to_string())));
    }
    if let Ok(v) = row.try_get::<Option<NaiveTime>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, |t| SqlValue::Text(t.to_string())));
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Text));
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Bytes));
    }
    // DECIMAL and JSON arrive as length-prefixed text
    row.try_get_unchecked::<Option<String>, _>(index)
        .map(|v| v.map_or(SqlValue::Null, SqlValue::Text))
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: row
                .columns()
                .get(index)
                .map_or_else(|| index.to_string(), |c| c.name().to_string()),
            source: format!("unsupported column type: {e}").into(),
        })
}

impl Serialize for SqlRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}
