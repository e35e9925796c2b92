//! Query-related data models.
//!
//! This module defines bound parameter values, the result shape setting and
//! the rows returned by read queries.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default number of rows per chunk for bulk inserts.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// A parameter value for parameterized statements.
///
/// Values are bound positionally to `$1`, `$2`, ... placeholders and sent to
/// the server separately from the statement text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    /// JSON document, bound as `jsonb`
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }

    /// Convert a plain JSON value into a parameter.
    ///
    /// Scalars map onto the matching variant; arrays and objects are bound
    /// as JSON documents.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(v) => Self::Bool(v),
            JsonValue::Number(n) => match n.as_i64() {
                Some(v) => Self::Int(v),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<JsonValue> for QueryParam {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// How rows of a read query are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultShape {
    /// Ordered values matching the select list.
    #[default]
    Positional,
    /// Column name to value mapping.
    Named,
}

impl ResultShape {
    pub fn is_named(&self) -> bool {
        matches!(self, Self::Named)
    }
}

impl std::str::FromStr for ResultShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positional" | "tuple" => Ok(Self::Positional),
            "named" | "dict" => Ok(Self::Named),
            other => Err(format!(
                "Unknown result shape '{other}', expected 'positional' or 'named'"
            )),
        }
    }
}

impl std::fmt::Display for ResultShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positional => write!(f, "positional"),
            Self::Named => write!(f, "named"),
        }
    }
}

/// Rows returned by a read query, in the helper's configured shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryRows {
    Positional(Vec<Vec<JsonValue>>),
    Named(Vec<serde_json::Map<String, JsonValue>>),
}

impl QueryRows {
    pub fn shape(&self) -> ResultShape {
        match self {
            Self::Positional(_) => ResultShape::Positional,
            Self::Named(_) => ResultShape::Named,
        }
    }

    /// Get the number of rows.
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(rows) => rows.len(),
            Self::Named(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows as ordered value sequences, if this result is positional.
    pub fn as_positional(&self) -> Option<&[Vec<JsonValue>]> {
        match self {
            Self::Positional(rows) => Some(rows),
            Self::Named(_) => None,
        }
    }

    /// Rows as column mappings, if this result is named.
    pub fn as_named(&self) -> Option<&[serde_json::Map<String, JsonValue>]> {
        match self {
            Self::Named(rows) => Some(rows),
            Self::Positional(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(
            QueryParam::String("hello".to_string()).type_name(),
            "string"
        );
        assert_eq!(QueryParam::Json(json!({"a": 1})).type_name(), "json");
    }

    #[test]
    fn test_query_param_from_primitives() {
        assert_eq!(QueryParam::from(7), QueryParam::Int(7));
        assert_eq!(QueryParam::from("abc"), QueryParam::String("abc".into()));
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some(1.5)), QueryParam::Float(1.5));
    }

    #[test]
    fn test_query_param_from_json() {
        assert_eq!(QueryParam::from_json(json!(null)), QueryParam::Null);
        assert_eq!(QueryParam::from_json(json!(3)), QueryParam::Int(3));
        assert_eq!(QueryParam::from_json(json!(2.5)), QueryParam::Float(2.5));
        assert_eq!(
            QueryParam::from_json(json!("x")),
            QueryParam::String("x".into())
        );
        assert_eq!(
            QueryParam::from_json(json!([1, 2])),
            QueryParam::Json(json!([1, 2]))
        );
    }

    #[test]
    fn test_query_param_untagged_deserialize() {
        let params: Vec<QueryParam> = serde_json::from_str(r#"[null, true, 5, 1.25, "s"]"#).unwrap();
        assert_eq!(
            params,
            vec![
                QueryParam::Null,
                QueryParam::Bool(true),
                QueryParam::Int(5),
                QueryParam::Float(1.25),
                QueryParam::String("s".into()),
            ]
        );
    }

    #[test]
    fn test_result_shape_parse() {
        assert_eq!("named".parse::<ResultShape>(), Ok(ResultShape::Named));
        assert_eq!("DICT".parse::<ResultShape>(), Ok(ResultShape::Named));
        assert_eq!(
            "positional".parse::<ResultShape>(),
            Ok(ResultShape::Positional)
        );
        assert!("columns".parse::<ResultShape>().is_err());
        assert_eq!(ResultShape::default(), ResultShape::Positional);
    }

    #[test]
    fn test_query_rows_accessors() {
        let rows = QueryRows::Positional(vec![vec![json!(1), json!("a")]]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.shape(), ResultShape::Positional);
        assert!(rows.as_named().is_none());
        assert_eq!(rows.as_positional().unwrap()[0][1], json!("a"));

        let empty = QueryRows::Named(Vec::new());
        assert!(empty.is_empty());
        assert_eq!(empty.shape(), ResultShape::Named);
    }

    #[test]
    fn test_query_rows_serialization() {
        let mut map = serde_json::Map::new();
        map.insert("id".to_string(), json!(1));
        let rows = QueryRows::Named(vec![map]);
        assert_eq!(serde_json::to_string(&rows).unwrap(), r#"[{"id":1}]"#);
    }
}
