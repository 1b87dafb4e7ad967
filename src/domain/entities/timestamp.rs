//! Timestamp value object
//!
//! Filesystem and registry metadata carry timestamps that may be missing or
//! garbage. Instead of surfacing parse failures, every timestamp is one of
//! three states and serializes to a single string column.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Display format used in every JSON output
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Sentinel written when the raw value is absent or zero
pub const NOT_AVAILABLE: &str = "N/A";

/// Sentinel written when the raw value cannot be represented
pub const INVALID_TIMESTAMP: &str = "Invalid Timestamp";

/// A metadata timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp {
    /// A representable UTC instant
    Valid(DateTime<Utc>),
    /// The source had no value (null or zero)
    NotAvailable,
    /// The source value could not be converted; holds the text that was written
    Invalid(String),
}

impl Timestamp {
    /// Converts a raw epoch-seconds value as reported by a filesystem
    pub fn from_epoch(raw: Option<i64>) -> Self {
        match raw {
            None | Some(0) => Self::NotAvailable,
            Some(secs) => match DateTime::from_timestamp(secs, 0) {
                Some(dt) if (1..=9999).contains(&dt.year()) => Self::Valid(dt),
                _ => Self::Invalid(INVALID_TIMESTAMP.to_string()),
            },
        }
    }

    /// Parses the textual form produced by [`Timestamp::as_text`]
    pub fn parse(text: &str) -> Self {
        if text == NOT_AVAILABLE {
            return Self::NotAvailable;
        }
        match NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
            Ok(naive) => Self::Valid(naive.and_utc()),
            Err(_) => Self::Invalid(text.to_string()),
        }
    }

    /// Returns the instant when the timestamp is valid
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Valid(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    /// Returns true when the timestamp lies strictly after `now`
    pub fn is_after(&self, now: DateTime<Utc>) -> bool {
        self.instant().is_some_and(|dt| dt > now)
    }

    /// Textual form written to JSON outputs
    pub fn as_text(&self) -> String {
        match self {
            Self::Valid(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
            Self::NotAvailable => NOT_AVAILABLE.to_string(),
            Self::Invalid(raw) => raw.clone(),
        }
    }
}

impl From<Option<DateTime<Utc>>> for Timestamp {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Self::NotAvailable, Self::Valid)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_text())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::parse(&text))
    }
}
