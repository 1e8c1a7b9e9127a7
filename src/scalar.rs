//! The `Date` scalar.
//!
//! Dates travel as integer epoch milliseconds in both directions and are
//! stored the same way inside documents. Input that is not a date becomes a
//! null date instead of failing the request.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use async_graphql::{InputValueResult, Scalar, ScalarType, Value};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Date(#[serde(with = "chrono::serde::ts_milliseconds_option")] Option<DateTime<Utc>>);

impl Date {
    pub const NULL: Date = Date(None);

    /// Current server time truncated to millisecond precision, so the value
    /// read back from a document equals the one written.
    pub fn now() -> Self {
        let now = Utc::now();
        Self::from_millis(now.timestamp_millis()).unwrap_or(Self(Some(now)))
    }

    pub fn from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(|dt| Self(Some(dt)))
    }

    pub fn millis(&self) -> Option<i64> {
        self.0.map(|dt| dt.timestamp_millis())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }
}

impl Display for Date {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => f.write_str("null"),
        }
    }
}

impl FromStr for Date {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(millis) = s.trim().parse::<i64>() {
            return Self::from_millis(millis).ok_or_else(|| format!("`{}` is out of range", s));
        }
        DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| Self(Some(dt.with_timezone(&Utc))))
            .map_err(|err| format!("`{}` is not a date: {}", s, err))
    }
}

#[Scalar]
impl ScalarType for Date {
    fn parse(value: Value) -> InputValueResult<Self> {
        let date = match &value {
            Value::Number(number) => number.as_i64().and_then(Date::from_millis),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };
        if date.is_none() {
            log::debug!("Coercing non-date input {} to a null date", value);
        }
        Ok(date.unwrap_or(Date::NULL))
    }

    fn to_value(&self) -> Value {
        match self.millis() {
            Some(millis) => Value::Number(millis.into()),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_epoch_millis() {
        let date = Date::parse(Value::Number(86_400_000.into())).unwrap();
        assert_eq!(date.to_string(), "1970-01-02T00:00:00+00:00");
        assert_eq!(date.to_value(), Value::Number(86_400_000.into()));
    }

    #[test]
    fn strings_accept_rfc3339_and_integers() {
        let a = Date::parse(Value::String("2001-02-03T04:05:06Z".into())).unwrap();
        let b = Date::parse(Value::String(a.millis().unwrap().to_string())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn other_kinds_become_null() {
        for value in [
            Value::Boolean(true),
            Value::String("yesterday".into()),
            Value::Number(serde_json::Number::from_f64(1.5).unwrap()),
            Value::List(vec![]),
        ] {
            let date = Date::parse(value).unwrap();
            assert!(date.is_null());
            assert_eq!(date.to_value(), Value::Null);
        }
    }

    #[test]
    fn null_dates_store_as_json_null() {
        assert_eq!(serde_json::to_value(Date::NULL).unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn stored_as_millis() {
        let date = Date::from_millis(1_600_000_000_123).unwrap();
        assert_eq!(serde_json::to_value(date).unwrap(), serde_json::json!(1_600_000_000_123i64));
        let back: Date = serde_json::from_value(serde_json::json!(1_600_000_000_123i64)).unwrap();
        assert_eq!(back, date);
    }
}
