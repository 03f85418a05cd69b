// ABOUTME: Binds migration values as PostgreSQL parameters
// ABOUTME: Encodes each value for the column type PostgreSQL inferred for its placeholder

use crate::migration::Value;
use crate::utils::quote_ident;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::value::RawValue;
use std::error::Error;
use std::str::FromStr;
use tokio_postgres::types::{to_sql_checked, IsNull, Json, Kind, ToSql, Type};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// A migration value usable as a query parameter
///
/// Placeholders without a cast take the type of their target column, so the
/// same SQLite value may need to be written as `int4`, `numeric`, `text` or
/// `timestamptz` depending on the destination schema. Values that cannot be
/// represented in the inferred type fail the statement, and with it the row.
/// Text headed for a type this encoder has no binary form for is instead
/// sent as `$n::text::type` (see [`binds_natively`]).
#[derive(Debug)]
pub struct SqlParam<'a>(pub &'a Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Integer(i) => encode_integer(*i, ty, out),
            Value::Real(f) => encode_real(*f, ty, out),
            Value::Boolean(b) => encode_bool(*b, ty, out),
            Value::Text(s) => encode_text(s, ty, out),
            Value::Json(s) => encode_json(s, ty, out),
            Value::Blob(bytes) => match *ty {
                Type::BYTEA => bytes.as_slice().to_sql(ty, out),
                _ => Err(mismatch(self.0, ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Compatibility is decided per value in to_sql
        true
    }

    to_sql_checked!();
}

/// Whether `value` can be encoded directly for a parameter of type `ty`
///
/// Only text is ever routed through a cast: it is what SQLite hands back for
/// intervals, time zones, ranges and the like, and PostgreSQL can parse it
/// into any type.
pub fn binds_natively(value: &Value, ty: &Type) -> bool {
    match value {
        Value::Text(_) => text_binds_natively(ty),
        _ => true,
    }
}

/// Schema-qualified, quoted name of `ty` for use in a cast
pub fn cast_type_name(ty: &Type) -> String {
    format!("{}.{}", quote_ident(ty.schema()), quote_ident(ty.name()))
}

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot bind {} value to column of type {}", value.kind(), ty).into()
}

fn is_text_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    ) || matches!(ty.kind(), Kind::Enum(_))
        || ty.name() == "citext"
}

fn write_text(s: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    out.extend_from_slice(s.as_bytes());
    Ok(IsNull::No)
}

fn encode_integer(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT8 => i.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(i).to_sql(ty, out),
        // SQLite stores booleans as 0/1
        Type::BOOL => (i != 0).to_sql(ty, out),
        _ if is_text_type(ty) => write_text(&i.to_string(), out),
        _ => Err(mismatch(&Value::Integer(i), ty)),
    }
}

fn encode_real(f: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT8 => f.to_sql(ty, out),
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::NUMERIC => parse_decimal(&f.to_string())?.to_sql(ty, out),
        _ if is_text_type(ty) => write_text(&f.to_string(), out),
        _ => Err(mismatch(&Value::Real(f), ty)),
    }
}

fn encode_bool(b: bool, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => b.to_sql(ty, out),
        Type::INT2 => (b as i16).to_sql(ty, out),
        Type::INT4 => (b as i32).to_sql(ty, out),
        Type::INT8 => (b as i64).to_sql(ty, out),
        _ if is_text_type(ty) => write_text(if b { "true" } else { "false" }, out),
        _ => Err(mismatch(&Value::Boolean(b), ty)),
    }
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        _ if is_text_type(ty) => write_text(s, out),
        Type::JSON | Type::JSONB => encode_json(s, ty, out),
        Type::BOOL => parse_bool(s)?.to_sql(ty, out),
        Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
        Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => parse_decimal(s.trim())?.to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_timestamptz(s)?.to_sql(ty, out),
        Type::TIMESTAMP => parse_timestamp(s)?.to_sql(ty, out),
        Type::DATE => parse_date(s)?.to_sql(ty, out),
        Type::TIME => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")?.to_sql(ty, out),
        Type::BYTEA => s.as_bytes().to_sql(ty, out),
        Type::UUID => Uuid::parse_str(s.trim())?.to_sql(ty, out),
        _ => Err(mismatch(&Value::Text(s.to_string()), ty)),
    }
}

fn text_binds_natively(ty: &Type) -> bool {
    is_text_type(ty)
        || matches!(
            *ty,
            Type::JSON
                | Type::JSONB
                | Type::BOOL
                | Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::NUMERIC
                | Type::TIMESTAMPTZ
                | Type::TIMESTAMP
                | Type::DATE
                | Type::TIME
                | Type::BYTEA
                | Type::UUID
        )
}

fn encode_json(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::JSON | Type::JSONB => Json(RawValue::from_string(s.to_owned())?).to_sql(ty, out),
        _ if is_text_type(ty) => write_text(s, out),
        _ => Err(mismatch(&Value::Json(s.to_string()), ty)),
    }
}

/// Plain (`-12.50`) or scientific (`1.5e3`) notation
fn parse_decimal(s: &str) -> Result<Decimal, BoxError> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|_| format!("invalid numeric '{}'", s).into())
}

fn parse_bool(s: &str) -> Result<bool, BoxError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "on" => Ok(true),
        "false" | "f" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("invalid boolean '{}'", other).into()),
    }
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse timestamps as stored by SQLite-backed apps; naive values are taken as UTC
fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, BoxError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    Ok(parse_timestamp(s)?.and_utc())
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, BoxError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    Err(format!("invalid timestamp '{}'", s).into())
}

fn parse_date(s: &str) -> Result<NaiveDate, BoxError> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    Ok(parse_timestamp(s)?.date())
}
