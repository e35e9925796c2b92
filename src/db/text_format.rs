//! PostgreSQL text output for binary wire values.
//!
//! Unprepared statements return columns in text format while prepared ones
//! return binary. Types without a dedicated JSON decoder are reported as the
//! server's text output, so this module renders binary values the way the
//! server would print them. Only the default `DateStyle` (ISO) and
//! `IntervalStyle` (postgres) are reproduced; `None` means the type is not
//! covered here.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::TypeInfo;
use sqlx::postgres::{PgTypeInfo, PgTypeKind};
use std::fmt::Write as _;
use std::net::{Ipv4Addr, Ipv6Addr};

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

const USECS_PER_SEC: i64 = 1_000_000;

/// Big-endian cursor over a binary value.
struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.0.len() < n {
            return None;
        }
        let (head, rest) = self.0.split_at(n);
        self.0 = rest;
        Some(head)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> Option<i32> {
        self.take(4).and_then(|b| b.try_into().ok()).map(i32::from_be_bytes)
    }

    fn i64(&mut self) -> Option<i64> {
        self.take(8).and_then(|b| b.try_into().ok()).map(i64::from_be_bytes)
    }
}

/// Render a binary value of type `ty` as the server's text output.
pub fn render(ty: &PgTypeInfo, bytes: &[u8]) -> Option<String> {
    match ty.kind() {
        PgTypeKind::Enum(_) => std::str::from_utf8(bytes).ok().map(str::to_owned),
        PgTypeKind::Domain(base) => render(base, bytes),
        PgTypeKind::Array(elem) => render_array(elem, bytes),
        _ => render_scalar(&ty.name().to_ascii_uppercase(), bytes),
    }
}

fn render_scalar(name: &str, bytes: &[u8]) -> Option<String> {
    let exact = |n: usize| (bytes.len() == n).then_some(Reader(bytes));

    match name {
        "INT2" => exact(2)?.u16().map(|v| (v as i16).to_string()),
        "INT4" => exact(4)?.i32().map(|v| v.to_string()),
        "INT8" => exact(8)?.i64().map(|v| v.to_string()),
        "OID" => exact(4)?.i32().map(|v| (v as u32).to_string()),
        "FLOAT4" => Some(format_float(f32::from_be_bytes(bytes.try_into().ok()?), 6)),
        "FLOAT8" => Some(format_float(f64::from_be_bytes(bytes.try_into().ok()?), 15)),
        "BOOL" => exact(1)?.u8().map(|v| (if v != 0 { "t" } else { "f" }).to_string()),
        "NUMERIC" => numeric(bytes),
        "INTERVAL" => {
            let mut reader = exact(16)?;
            let micros = reader.i64()?;
            let days = reader.i32()?;
            let months = reader.i32()?;
            Some(interval(months, days, micros))
        }
        "INET" | "CIDR" => inet(bytes, name == "CIDR"),
        "UUID" => uuid::Uuid::from_slice(bytes).ok().map(|v| v.to_string()),
        "DATE" => exact(4)?.i32().and_then(date),
        "TIME" => exact(8)?.i64().and_then(time),
        "TIMESTAMP" => exact(8)?.i64().and_then(timestamp),
        "TEXT" | "VARCHAR" | "CHAR" | "\"CHAR\"" | "BPCHAR" | "NAME" | "UNKNOWN" | "CITEXT"
        | "XML" | "JSON" => std::str::from_utf8(bytes).ok().map(str::to_owned),
        _ => None,
    }
}

/// Shortest round-trip output, switching to exponent form like `float8out`.
fn format_float<T>(v: T, max_exponent: i32) -> String
where
    T: Into<f64> + Copy + std::fmt::Display + std::fmt::LowerExp,
{
    let wide: f64 = v.into();
    if wide.is_nan() {
        return "NaN".to_string();
    }
    if wide.is_infinite() {
        return (if wide > 0.0 { "Infinity" } else { "-Infinity" }).to_string();
    }

    let plain = v.to_string();
    if wide == 0.0 {
        return plain;
    }
    let scientific = format!("{v:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return plain;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return plain;
    };
    if (-4..max_exponent).contains(&exponent) {
        return plain;
    }
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.abs())
}

/// NUMERIC in base-10000 digits, printed with its display scale.
pub fn numeric(bytes: &[u8]) -> Option<String> {
    let mut reader = Reader(bytes);
    let ndigits = usize::from(reader.u16()?);
    let weight = i32::from(reader.u16()? as i16);
    let sign = reader.u16()?;
    let dscale = usize::from(reader.u16()?);

    match sign {
        NUMERIC_NAN => return Some("NaN".to_string()),
        NUMERIC_PINF => return Some("Infinity".to_string()),
        NUMERIC_NINF => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|_| reader.u16())
        .collect::<Option<Vec<u16>>>()?;
    let digit = |index: i32| {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for index in 0..=weight {
            if index == 0 {
                let _ = write!(out, "{}", digit(index));
            } else {
                let _ = write!(out, "{:04}", digit(index));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut index = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", digit(index));
            index += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Some(out)
}

/// Interval in the default `postgres` style, e.g. `1 year 2 mons 3 days 04:05:06`.
fn interval(months: i32, days: i32, micros: i64) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut seen_negative = false;

    for (value, unit) in [(months / 12, "year"), (months % 12, "mon"), (days, "day")] {
        if value == 0 {
            continue;
        }
        let plus = if value > 0 && seen_negative { "+" } else { "" };
        let plural = if value == 1 { "" } else { "s" };
        parts.push(format!("{plus}{value} {unit}{plural}"));
        seen_negative |= value < 0;
    }

    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 {
            "-"
        } else if seen_negative {
            "+"
        } else {
            ""
        };
        let total = micros.unsigned_abs();
        let usecs = USECS_PER_SEC as u64;
        let (hours, rest) = (total / (3600 * usecs), total % (3600 * usecs));
        let (minutes, rest) = (rest / (60 * usecs), rest % (60 * usecs));
        let (seconds, fraction) = (rest / usecs, rest % usecs);
        parts.push(format!(
            "{sign}{hours:02}:{minutes:02}:{seconds:02}{}",
            fraction_suffix(fraction)
        ));
    }

    parts.join(" ")
}

/// `.ffffff` with trailing zeros removed, or nothing for whole seconds.
fn fraction_suffix(micros: u64) -> String {
    if micros == 0 {
        return String::new();
    }
    let digits = format!("{micros:06}");
    format!(".{}", digits.trim_end_matches('0'))
}

fn inet(bytes: &[u8], cidr: bool) -> Option<String> {
    let mut reader = Reader(bytes);
    let family = reader.u8()?;
    let bits = reader.u8()?;
    let _is_cidr = reader.u8()?;
    let len = usize::from(reader.u8()?);
    let addr = reader.take(len)?;

    let (text, max_bits) = match family {
        PGSQL_AF_INET => (Ipv4Addr::from(<[u8; 4]>::try_from(addr).ok()?).to_string(), 32),
        PGSQL_AF_INET6 => (Ipv6Addr::from(<[u8; 16]>::try_from(addr).ok()?).to_string(), 128),
        _ => return None,
    };

    if cidr || bits != max_bits {
        Some(format!("{text}/{bits}"))
    } else {
        Some(text)
    }
}

fn epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2000, 1, 1).map(|d| d.and_time(NaiveTime::MIN))
}

fn date(days: i32) -> Option<String> {
    match days {
        i32::MAX => Some("infinity".to_string()),
        i32::MIN => Some("-infinity".to_string()),
        _ => {
            let date = epoch()?
                .date()
                .checked_add_signed(Duration::try_days(i64::from(days))?)?;
            Some(date.format("%Y-%m-%d").to_string())
        }
    }
}

fn time(micros: i64) -> Option<String> {
    let seconds = micros.div_euclid(USECS_PER_SEC);
    let fraction = micros.rem_euclid(USECS_PER_SEC) as u64;
    Some(format!(
        "{:02}:{:02}:{:02}{}",
        seconds / 3600,
        seconds % 3600 / 60,
        seconds % 60,
        fraction_suffix(fraction)
    ))
}

fn timestamp(micros: i64) -> Option<String> {
    match micros {
        i64::MAX => return Some("infinity".to_string()),
        i64::MIN => return Some("-infinity".to_string()),
        _ => {}
    }
    let at = epoch()?.checked_add_signed(Duration::microseconds(micros))?;
    let fraction = micros.rem_euclid(USECS_PER_SEC) as u64;
    Some(format!(
        "{}{}",
        at.format("%Y-%m-%d %H:%M:%S"),
        fraction_suffix(fraction)
    ))
}

fn render_array(elem: &PgTypeInfo, bytes: &[u8]) -> Option<String> {
    let mut reader = Reader(bytes);
    let ndim = usize::try_from(reader.i32()?).ok()?;
    let _has_nulls = reader.i32()?;
    let _elem_oid = reader.i32()?;
    if ndim == 0 {
        return Some("{}".to_string());
    }

    let mut dims = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        dims.push(usize::try_from(reader.i32()?).ok()?);
        let _lower_bound = reader.i32()?;
    }

    let total: usize = dims.iter().product();
    let mut items = Vec::with_capacity(total);
    for _ in 0..total {
        let len = reader.i32()?;
        if len < 0 {
            items.push("NULL".to_string());
            continue;
        }
        let raw = reader.take(usize::try_from(len).ok()?)?;
        items.push(quote_element(&render(elem, raw)?));
    }

    let mut out = String::new();
    nest(&dims, &items, &mut out);
    Some(out)
}

fn nest(dims: &[usize], items: &[String], out: &mut String) {
    out.push('{');
    match dims {
        [] | [_] => out.push_str(&items.join(",")),
        [outer, inner @ ..] => {
            let step = items.len() / (*outer).max(1);
            for (i, chunk) in items.chunks(step.max(1)).enumerate() {
                if i > 0 {
                    out.push(',');
                }
                nest(inner, chunk, out);
            }
        }
    }
    out.push('}');
}

fn quote_element(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text.eq_ignore_ascii_case("null")
        || text
            .chars()
            .any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_ascii_whitespace());
    if !needs_quotes {
        return text.to_string();
    }

    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
