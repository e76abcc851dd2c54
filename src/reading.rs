use chrono::{DateTime, Utc};
use thiserror::Error;

/// One temperature measurement as received from the broker.
///
/// `received_at` is assigned on arrival, never taken from the sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Payload text exactly as published (served back by the latest endpoint).
    pub raw: String,
    /// Degrees Celsius. `NaN` only when an unparsable payload was accepted.
    pub value: f64,
    pub received_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(raw: impl Into<String>, value: f64, received_at: DateTime<Utc>) -> Self {
        Self {
            raw: raw.into(),
            value,
            received_at,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("payload {0:?} is not a finite number")]
    NotNumeric(String),
}

/// Interpret a raw MQTT payload as a temperature value.
///
/// Surrounding whitespace is ignored. `NaN` and infinities are rejected even
/// though `f64::from_str` accepts them.
pub fn parse_payload(payload: &[u8]) -> Result<f64, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::NotUtf8)?;
    let trimmed = text.trim();

    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::NotNumeric(trimmed.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_decimal() {
        assert_eq!(parse_payload(b"23.5"), Ok(23.5));
    }

    #[test]
    fn parses_negative_and_integer_values() {
        assert_eq!(parse_payload(b"-4"), Ok(-4.0));
        assert_eq!(parse_payload(b"18"), Ok(18.0));
    }

    #[test]
    fn ignores_surrounding_whitespace() {
        assert_eq!(parse_payload(b"  21.25\n"), Ok(21.25));
    }

    #[test]
    fn rejects_text() {
        assert_eq!(
            parse_payload(b"not-a-number"),
            Err(ParseError::NotNumeric("not-a-number".into()))
        );
    }

    #[test]
    fn rejects_empty_payload() {
        assert_eq!(parse_payload(b""), Err(ParseError::NotNumeric(String::new())));
    }

    #[test]
    fn rejects_non_finite_literals() {
        assert!(parse_payload(b"NaN").is_err());
        assert!(parse_payload(b"inf").is_err());
        assert!(parse_payload(b"-infinity").is_err());
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_eq!(parse_payload(&[0xff, 0xfe, 0x31]), Err(ParseError::NotUtf8));
    }
}
