//! PostgreSQL column decoding.
//!
//! This module turns driver rows into JSON values, either as ordered value
//! sequences or as column-name mappings.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Per-category decoders handle the actual value extraction
//!
//! NUMERIC and types without a dedicated decoder are read from the raw wire
//! value and reported as the server's text output, so the same query yields
//! the same strings whether it was sent prepared (binary results) or
//! unprepared (text results).

use crate::db::text_format;
use crate::models::{QueryRows, ResultShape};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgRow, PgValueFormat};
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Unknown,
}

/// Classify a PostgreSQL type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    // Temporal types - "timestamptz" must win over "timestamp"
    match lower.as_str() {
        "timestamptz" | "timestamp with time zone" => return TypeCategory::TimestampTz,
        "timestamp" | "timestamp without time zone" => return TypeCategory::Timestamp,
        "date" => return TypeCategory::Date,
        "time" | "time without time zone" => return TypeCategory::Time,
        _ => {}
    }

    if matches!(
        lower.as_str(),
        "int2" | "int4" | "int8" | "smallint" | "integer" | "int" | "bigint" | "oid"
    ) || lower.ends_with("serial")
    {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower == "text"
        || lower == "varchar"
        || lower == "bpchar"
        || lower == "char"
        || lower == "name"
        || lower.starts_with("character")
    {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Encode binary column data as a base64 JSON string.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    JsonValue::String(STANDARD.encode(bytes))
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Conversion of a driver row into JSON values.
pub trait RowDecode {
    /// Values in select-list order.
    fn to_json_values(&self) -> Vec<JsonValue>;
    /// Column name to value mapping.
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
}

impl RowDecode for PgRow {
    fn to_json_values(&self) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| decode_column(self, idx, categorize_type(col.type_info().name())))
            .collect()
    }

    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name());
                (col.name().to_string(), decode_column(self, idx, category))
            })
            .collect()
    }
}

/// Convert fetched rows into the requested shape.
pub fn shape_rows<R: RowDecode>(rows: &[R], shape: ResultShape) -> QueryRows {
    match shape {
        ResultShape::Positional => {
            QueryRows::Positional(rows.iter().map(RowDecode::to_json_values).collect())
        }
        ResultShape::Named => QueryRows::Named(rows.iter().map(RowDecode::to_json_map).collect()),
    }
}

/// Read a single integer column, accepting int8, int4 and int2.
pub fn decode_count<I>(row: &PgRow, index: I) -> Result<i64, sqlx::Error>
where
    I: sqlx::ColumnIndex<PgRow> + Copy,
{
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Ok(v);
    }
    if let Ok(v) = row.try_get::<i32, _>(index) {
        return Ok(v.into());
    }
    row.try_get::<i16, _>(index).map(Into::into)
}

fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
    match category {
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => decode_binary_col(row, idx),
        TypeCategory::Json => decode_json(row, idx),
        TypeCategory::Uuid => decode_uuid(row, idx),
        TypeCategory::Timestamp => decode_display::<chrono::NaiveDateTime>(row, idx, |v| {
            v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
        }),
        TypeCategory::TimestampTz => {
            decode_display::<chrono::DateTime<chrono::Utc>>(row, idx, |v| v.to_rfc3339())
        }
        TypeCategory::Date => decode_display::<chrono::NaiveDate>(row, idx, |v| v.to_string()),
        TypeCategory::Time => decode_display::<chrono::NaiveTime>(row, idx, |v| v.to_string()),
        TypeCategory::Text => decode_text(row, idx),
        TypeCategory::Unknown => decode_raw(row, idx, text_format::render),
    }
}

fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
    // Exact textual representation with the column's scale; JSON numbers
    // would lose precision
    decode_raw(row, idx, |_, bytes| text_format::numeric(bytes))
}

/// Report a column as the server's text output.
///
/// Text-format values are taken as they are. Binary values go through
/// `render`; a value it cannot render is logged and reported as `null`.
fn decode_raw<F>(row: &PgRow, idx: usize, render: F) -> JsonValue
where
    F: Fn(&sqlx::postgres::PgTypeInfo, &[u8]) -> Option<String>,
{
    let value = match row.try_get_raw(idx) {
        Ok(value) if !value.is_null() => value,
        Ok(_) => return JsonValue::Null,
        Err(e) => {
            tracing::error!("Failed to read column {}: {:?}", idx, e);
            return JsonValue::Null;
        }
    };

    let type_info = value.type_info().into_owned();
    let rendered = match value.format() {
        PgValueFormat::Text => value.as_str().ok().map(str::to_owned),
        PgValueFormat::Binary => value
            .as_bytes()
            .ok()
            .and_then(|bytes| render(&type_info, bytes)),
    };

    rendered.map(JsonValue::String).unwrap_or_else(|| {
        tracing::error!(
            "Failed to decode column {} of type {}",
            idx,
            type_info.name()
        );
        JsonValue::Null
    })
}

fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<sqlx::postgres::types::Oid>, _>(idx) {
        return JsonValue::Number(v.0.into());
    }
    JsonValue::Null
}

fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<bool>, _>(idx)
        .ok()
        .flatten()
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
        return serde_json::Number::from_f64(v as f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    JsonValue::Null
}

fn decode_binary_col(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(|v| encode_binary_value(&v))
        .unwrap_or(JsonValue::Null)
}

fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<JsonValue>, _>(idx)
        .ok()
        .flatten()
        .unwrap_or(JsonValue::Null)
}

fn decode_uuid(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<uuid::Uuid>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(v.to_string()))
        .unwrap_or(JsonValue::Null)
}

fn decode_display<T>(row: &PgRow, idx: usize, render: impl Fn(T) -> String) -> JsonValue
where
    T: for<'r> Decode<'r, sqlx::Postgres> + Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(render(v)))
        .unwrap_or(JsonValue::Null)
}

fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<String>, _>(idx)
        .ok()
        .flatten()
        .map(JsonValue::String)
        .unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT4"), TypeCategory::Integer);
        assert_eq!(categorize_type("int8"), TypeCategory::Integer);
        assert_eq!(categorize_type("SERIAL"), TypeCategory::Integer);
        assert_eq!(categorize_type("OID"), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Decimal);
        assert_eq!(categorize_type("decimal"), TypeCategory::Decimal);
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(categorize_type("TIMESTAMPTZ"), TypeCategory::TimestampTz);
        assert_eq!(categorize_type("TIMESTAMP"), TypeCategory::Timestamp);
        assert_eq!(categorize_type("DATE"), TypeCategory::Date);
        assert_eq!(categorize_type("TIME"), TypeCategory::Time);
    }

    #[test]
    fn test_categorize_type_other() {
        assert_eq!(categorize_type("jsonb"), TypeCategory::Json);
        assert_eq!(categorize_type("UUID"), TypeCategory::Uuid);
        assert_eq!(categorize_type("BYTEA"), TypeCategory::Binary);
        assert_eq!(categorize_type("BOOL"), TypeCategory::Boolean);
        assert_eq!(categorize_type("FLOAT8"), TypeCategory::Float);
        assert_eq!(categorize_type("VARCHAR"), TypeCategory::Text);
        assert_eq!(categorize_type("INTERVAL"), TypeCategory::Unknown);
        assert_eq!(categorize_type("POINT"), TypeCategory::Unknown);
    }

    #[test]
    fn test_encode_binary_value() {
        assert_eq!(
            encode_binary_value(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(
            encode_binary_value(&[0xFF, 0xFE, 0x00, 0x01]),
            JsonValue::String("//4AAQ==".to_string())
        );
        assert_eq!(encode_binary_value(&[]), JsonValue::String(String::new()));
    }

    struct FakeRow(Vec<(&'static str, JsonValue)>);

    impl RowDecode for FakeRow {
        fn to_json_values(&self) -> Vec<JsonValue> {
            self.0.iter().map(|(_, v)| v.clone()).collect()
        }

        fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
            self.0
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect()
        }
    }

    #[test]
    fn test_shape_rows() {
        let rows = vec![FakeRow(vec![
            ("id", JsonValue::from(1)),
            ("name", JsonValue::from("a")),
        ])];

        let positional = shape_rows(&rows, ResultShape::Positional);
        assert_eq!(
            positional.as_positional().unwrap()[0],
            vec![JsonValue::from(1), JsonValue::from("a")]
        );

        let named = shape_rows(&rows, ResultShape::Named);
        assert_eq!(named.as_named().unwrap()[0]["name"], JsonValue::from("a"));
    }
}
