// ABOUTME: Dialect-neutral cell values moved between source and destination
// ABOUTME: Includes conversion to a column's logical type when nothing is lost

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::schema::LogicalType;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single cell value.
///
/// Drivers decode native rows into `SqlValue`s and bind `SqlValue`s back as
/// parameters, so every source/destination pair shares one representation.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Interpret the value as an integer, as returned by `COUNT(*)` and
    /// catalog flag columns on every dialect.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Bool(v) => Some(i64::from(*v)),
            SqlValue::Decimal(d) => d.trunc().to_i64(),
            SqlValue::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Render the value as text for drivers that bind strings.
    ///
    /// Returns `None` for NULL.
    pub fn render_text(&self) -> Option<String> {
        let text = match self {
            SqlValue::Null => return None,
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) => v.clone(),
            SqlValue::Bytes(v) => String::from_utf8_lossy(v).into_owned(),
            SqlValue::Date(v) => v.format(DATE_FORMAT).to_string(),
            SqlValue::Time(v) => v.format(TIME_FORMAT).to_string(),
            SqlValue::Timestamp(v) => v.format(TIMESTAMP_FORMAT).to_string(),
            SqlValue::TimestampTz(v) => v.to_rfc3339(),
            SqlValue::Uuid(v) => v.to_string(),
            SqlValue::Json(v) => v.to_string(),
        };
        Some(text)
    }

    /// Convert the value towards the representation of `ty`.
    ///
    /// Dynamically typed sources (SQLite in particular) hand back dates as
    /// text and booleans as integers; conforming to the reflected column type
    /// lets strongly typed destinations bind them. A conversion only happens
    /// when it loses nothing: text must read back identically and temporal
    /// values keep every component. Anything else is returned unchanged and
    /// left for the destination to judge.
    pub fn conform(self, ty: &LogicalType) -> SqlValue {
        if self.is_null() {
            return self;
        }

        let converted = match ty {
            LogicalType::Boolean => self.to_bool(),
            LogicalType::SmallInt | LogicalType::Integer | LogicalType::BigInt => self.to_int(),
            LogicalType::Real | LogicalType::Double => self.to_float(),
            LogicalType::Decimal { .. } => self.to_decimal(),
            LogicalType::Char { .. } | LogicalType::Varchar { .. } | LogicalType::Text => {
                self.to_text()
            }
            LogicalType::Binary => match &self {
                SqlValue::Text(s) => Some(SqlValue::Bytes(s.clone().into_bytes())),
                _ => None,
            },
            LogicalType::Date => self.to_date(),
            LogicalType::Time => match &self {
                SqlValue::Text(s) => parse_time(s).map(SqlValue::Time),
                _ => None,
            },
            LogicalType::Timestamp => self.to_timestamp(),
            LogicalType::TimestampTz => self.to_timestamp_tz(),
            LogicalType::Uuid => match &self {
                SqlValue::Text(s) => Uuid::parse_str(s).ok().map(SqlValue::Uuid),
                SqlValue::Bytes(b) => Uuid::from_slice(b).ok().map(SqlValue::Uuid),
                _ => None,
            },
            LogicalType::Json => match &self {
                SqlValue::Text(s) => serde_json::from_str(s).ok().map(SqlValue::Json),
                _ => None,
            },
            LogicalType::Other(_) => None,
        };

        converted.unwrap_or(self)
    }

    fn to_bool(&self) -> Option<SqlValue> {
        match self {
            SqlValue::Bool(_) => None,
            SqlValue::Int(v) => Some(SqlValue::Bool(*v != 0)),
            SqlValue::Decimal(d) => Some(SqlValue::Bool(!d.is_zero())),
            SqlValue::Text(s) => match s.to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" => Some(SqlValue::Bool(true)),
                "0" | "f" | "false" | "n" | "no" => Some(SqlValue::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }

    fn to_int(&self) -> Option<SqlValue> {
        match self {
            SqlValue::Bool(v) => Some(SqlValue::Int(i64::from(*v))),
            SqlValue::Decimal(d) if d.fract().is_zero() => d.to_i64().map(SqlValue::Int),
            SqlValue::Float(f)
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
            {
                Some(SqlValue::Int(*f as i64))
            }
            SqlValue::Text(s) => s
                .parse::<i64>()
                .ok()
                .filter(|v| v.to_string() == *s)
                .map(SqlValue::Int),
            _ => None,
        }
    }

    fn to_float(&self) -> Option<SqlValue> {
        match self {
            SqlValue::Int(v) => Some(SqlValue::Float(*v as f64)),
            SqlValue::Decimal(d) => d.to_f64().map(SqlValue::Float),
            SqlValue::Text(s) => s
                .parse::<f64>()
                .ok()
                .filter(|v| v.to_string() == *s)
                .map(SqlValue::Float),
            _ => None,
        }
    }

    fn to_decimal(&self) -> Option<SqlValue> {
        match self {
            SqlValue::Int(v) => Some(SqlValue::Decimal(Decimal::from(*v))),
            SqlValue::Float(f) => Decimal::from_f64(*f).map(SqlValue::Decimal),
            SqlValue::Text(s) => Decimal::from_str(s)
                .ok()
                .filter(|v| v.to_string() == *s)
                .map(SqlValue::Decimal),
            _ => None,
        }
    }

    fn to_text(&self) -> Option<SqlValue> {
        match self {
            SqlValue::Text(_) => None,
            SqlValue::Bytes(b) => String::from_utf8(b.clone()).ok().map(SqlValue::Text),
            other => other.render_text().map(SqlValue::Text),
        }
    }

    fn to_date(&self) -> Option<SqlValue> {
        match self {
            SqlValue::Text(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .filter(|d| d.format(DATE_FORMAT).to_string() == *s)
                .map(SqlValue::Date),
            SqlValue::Timestamp(ts) if ts.time() == NaiveTime::default() => {
                Some(SqlValue::Date(ts.date()))
            }
            _ => None,
        }
    }

    fn to_timestamp(&self) -> Option<SqlValue> {
        match self {
            SqlValue::Text(s) => parse_timestamp(s).map(SqlValue::Timestamp),
            SqlValue::Date(d) => d.and_hms_opt(0, 0, 0).map(SqlValue::Timestamp),
            SqlValue::TimestampTz(ts) => Some(SqlValue::Timestamp(ts.naive_utc())),
            _ => None,
        }
    }

    fn to_timestamp_tz(&self) -> Option<SqlValue> {
        match self {
            SqlValue::Text(s) => {
                DateTime::parse_from_rfc3339(s)
                    .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
                    .map(|ts| ts.with_timezone(&Utc))
                    .ok()
                    .or_else(|| parse_timestamp(s).map(|ts| Utc.from_utc_datetime(&ts)))
                    .map(SqlValue::TimestampTz)
            }
            SqlValue::Timestamp(ts) => Some(SqlValue::TimestampTz(Utc.from_utc_datetime(ts))),
            _ => None,
        }
    }
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
