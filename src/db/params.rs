//! Parameter binding utilities for database queries.
//!
//! This module binds `QueryParam` values onto PostgreSQL query objects. Values
//! always travel out-of-band from the statement text.
//!
//! Binding is two-step. The statement is first described with NULL and string
//! parameters left untyped, so the server infers their types from context.
//! Each value is then encoded as the parameter type the server reported,
//! which lets a string fill a DATE or UUID column and a NULL fill any column.

use crate::models::QueryParam;
use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo, PgTypeKind};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Postgres, Type, TypeInfo};
use serde_json::Value as JsonValue;
use std::str::FromStr;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Parameter type left for the server to infer.
fn unspecified() -> PgTypeInfo {
    PgTypeInfo::with_oid(Oid(0))
}

/// A NULL without a declared type.
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        unspecified()
    }

    fn compatible(_: &PgTypeInfo) -> bool {
        true
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Type declared for a parameter when the statement is described.
pub(crate) fn declared_type(param: &QueryParam) -> PgTypeInfo {
    match param {
        QueryParam::Null | QueryParam::String(_) => unspecified(),
        QueryParam::Bool(_) => <bool as Type<Postgres>>::type_info(),
        QueryParam::Int(_) => <i64 as Type<Postgres>>::type_info(),
        QueryParam::Float(_) => <f64 as Type<Postgres>>::type_info(),
        QueryParam::Bytes(_) => <Vec<u8> as Type<Postgres>>::type_info(),
        QueryParam::Json(_) => <Json<JsonValue> as Type<Postgres>>::type_info(),
    }
}

/// Upper-case name of the type a value must be encoded as.
///
/// Domains resolve to their base type; enums behave like text.
fn target_name(ty: &PgTypeInfo) -> String {
    match ty.kind() {
        PgTypeKind::Domain(base) => target_name(base),
        PgTypeKind::Enum(_) => "TEXT".to_string(),
        _ => ty.name().to_ascii_uppercase(),
    }
}

fn is_text(name: &str) -> bool {
    matches!(
        name,
        "TEXT" | "VARCHAR" | "BPCHAR" | "\"CHAR\"" | "CHAR" | "NAME" | "UNKNOWN" | "CITEXT"
    )
}

fn conversion_error(
    index: usize,
    param: &QueryParam,
    target: &str,
    reason: impl std::fmt::Display,
) -> sqlx::Error {
    sqlx::Error::Encode(
        format!(
            "parameter ${}: cannot convert {} value to {target}: {reason}",
            index + 1,
            param.type_name()
        )
        .into(),
    )
}

/// Bind a parameter using its natural type.
fn bind_natural<'q>(query: PgQuery<'q>, param: &'q QueryParam) -> PgQuery<'q> {
    match param {
        QueryParam::Null => query.bind(UntypedNull),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a string parameter as `target`, parsing it where the wire format
/// of the target is not plain text.
fn bind_string<'q>(query: PgQuery<'q>, s: &'q str, target: &str) -> Result<PgQuery<'q>, String> {
    fn parsed<T: FromStr>(s: &str) -> Result<T, String>
    where
        T::Err: std::fmt::Display,
    {
        s.trim().parse::<T>().map_err(|e| e.to_string())
    }

    Ok(match target {
        "INT2" => query.bind(parsed::<i16>(s)?),
        "INT4" => query.bind(parsed::<i32>(s)?),
        "INT8" => query.bind(parsed::<i64>(s)?),
        "FLOAT4" => query.bind(parsed::<f32>(s)?),
        "FLOAT8" => query.bind(parsed::<f64>(s)?),
        "NUMERIC" => query.bind(parsed::<BigDecimal>(s)?),
        "BOOL" => query.bind(parse_bool(s)?),
        "UUID" => query.bind(parsed::<uuid::Uuid>(s)?),
        "DATE" => query.bind(parsed::<NaiveDate>(s)?),
        "TIME" => query.bind(parsed::<NaiveTime>(s)?),
        "TIMESTAMP" => query.bind(parse_timestamp(s)?),
        "TIMESTAMPTZ" => query.bind(parse_timestamptz(s)?),
        "JSON" | "JSONB" => {
            let value: JsonValue = serde_json::from_str(s).map_err(|e| e.to_string())?;
            query.bind(Json(value))
        }
        "BYTEA" => query.bind(s.as_bytes()),
        name if is_text(name) => query.bind(s),
        other => {
            return Err(format!(
                "no string conversion for this type; cast the placeholder, e.g. $n::text::{}",
                other.to_ascii_lowercase()
            ));
        }
    })
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
        other => Err(format!("invalid boolean {other:?}")),
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, String> {
    let s = s.trim();
    s.parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| s.parse::<NaiveDate>().map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|e| e.to_string())
}

fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    DateTime::<FixedOffset>::parse_from_rfc3339(s)
        .or_else(|_| DateTime::<FixedOffset>::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| parse_timestamp(s).map(|naive| naive.and_utc()))
        .map_err(|e| e.to_string())
}

/// Bind a parameter as the type the server expects at its position.
fn bind_as<'q>(
    query: PgQuery<'q>,
    index: usize,
    param: &'q QueryParam,
    expected: &PgTypeInfo,
) -> Result<PgQuery<'q>, sqlx::Error> {
    let target = target_name(expected);

    let bound = match (param, target.as_str()) {
        (QueryParam::String(s), target) => bind_string(query, s, target),
        (QueryParam::Int(v), "INT2") => i16::try_from(*v)
            .map(|v| query.bind(v))
            .map_err(|e| e.to_string()),
        (QueryParam::Int(v), "INT4") => i32::try_from(*v)
            .map(|v| query.bind(v))
            .map_err(|e| e.to_string()),
        (QueryParam::Int(v), "FLOAT4") => Ok(query.bind(*v as f32)),
        (QueryParam::Int(v), "FLOAT8") => Ok(query.bind(*v as f64)),
        (QueryParam::Int(v), "NUMERIC") => Ok(query.bind(BigDecimal::from(*v))),
        (QueryParam::Float(v), "FLOAT4") => Ok(query.bind(*v as f32)),
        (QueryParam::Float(v), "NUMERIC") => BigDecimal::try_from(*v)
            .map(|v| query.bind(v))
            .map_err(|e| e.to_string()),
        (QueryParam::Int(v), name) if is_text(name) => Ok(query.bind(v.to_string())),
        (QueryParam::Float(v), name) if is_text(name) => Ok(query.bind(v.to_string())),
        (QueryParam::Bool(v), name) if is_text(name) => Ok(query.bind(v.to_string())),
        (QueryParam::Json(v), name) if is_text(name) => Ok(query.bind(v.to_string())),
        _ => Ok(bind_natural(query, param)),
    };

    bound.map_err(|reason| conversion_error(index, param, &target, reason))
}

/// Build a prepared query with every parameter bound in order.
///
/// `expected` holds the parameter types of the described statement. Positions
/// without an entry are bound with the value's natural type.
pub(crate) fn bind_all<'q>(
    sql: &'q str,
    params: &'q [QueryParam],
    expected: &[PgTypeInfo],
) -> Result<PgQuery<'q>, sqlx::Error> {
    params
        .iter()
        .enumerate()
        .try_fold(sqlx::query(sql), |query, (index, param)| {
            match expected.get(index) {
                Some(ty) if !param.is_null() => bind_as(query, index, param, ty),
                _ => Ok(bind_natural(query, param)),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_type_leaves_null_and_string_untyped() {
        assert_eq!(declared_type(&QueryParam::Null).oid(), Some(Oid(0)));
        assert_eq!(declared_type(&QueryParam::String("x".into())).oid(), Some(Oid(0)));
        assert_eq!(declared_type(&QueryParam::Int(1)).name(), "INT8");
        assert_eq!(declared_type(&QueryParam::Bool(true)).name(), "BOOL");
    }

    #[test]
    fn test_target_name_for_builtin() {
        assert_eq!(target_name(&<NaiveDate as Type<Postgres>>::type_info()), "DATE");
        assert_eq!(target_name(&<i32 as Type<Postgres>>::type_info()), "INT4");
    }

    #[test]
    fn test_parse_bool_words() {
        assert_eq!(parse_bool("Yes"), Ok(true));
        assert_eq!(parse_bool(" f "), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(parse_timestamp("2024-01-02T03:04:05"), Ok(expected));
        assert_eq!(parse_timestamp("2024-01-02 03:04:05"), Ok(expected));
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_parse_timestamptz_to_utc() {
        let parsed = parse_timestamptz("2024-01-02T05:04:05+02:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-02T03:04:05+00:00");
        let naive = parse_timestamptz("2024-01-02 03:04:05").unwrap();
        assert_eq!(naive, parsed);
    }

    #[test]
    fn test_bind_all_reports_bad_conversion() {
        let params = vec![QueryParam::String("not-a-date".into())];
        let err = bind_all("SELECT $1", &params, &[<NaiveDate as Type<Postgres>>::type_info()])
            .err()
            .expect("conversion must fail");
        let message = err.to_string();
        assert!(message.contains("parameter $1"), "{message}");
        assert!(message.contains("string"), "{message}");
        assert!(message.contains("DATE"), "{message}");
    }

    #[test]
    fn test_bind_all_rejects_out_of_range_int4() {
        let params = vec![QueryParam::Int(i64::MAX)];
        assert!(bind_all("SELECT $1", &params, &[<i32 as Type<Postgres>>::type_info()]).is_err());
    }
}
