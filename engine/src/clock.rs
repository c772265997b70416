//! Timestamps and the time source used to stamp records.
//!
//! A [`Timestamp`] is a UTC instant kept at millisecond precision and rendered
//! as ISO-8601 with a `Z` suffix (`2024-02-01T12:00:00.000Z`). In that
//! normalized form string order equals time order, which is what the
//! watermark comparison relies on.

use crate::{error::Result, Error};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Zone-less ISO-8601 forms, read as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Seconds from the Unix epoch to `0001-01-01T00:00:00Z`.
const REPLACED_SECS: i64 = -62_135_596_800;

/// A UTC instant with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Wrap a chrono instant, truncating to milliseconds.
    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        Self(instant.trunc_subsecs(3))
    }

    /// `1970-01-01T00:00:00.000Z`, the initial watermark.
    pub fn epoch() -> Self {
        Self(DateTime::<Utc>::default())
    }

    /// Sentinel written onto replaced records.
    ///
    /// Strictly older than [`Timestamp::epoch`], so it never raises a
    /// watermark and always sorts before any real instant.
    pub fn replaced() -> Self {
        Self(DateTime::from_timestamp(REPLACED_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    /// Build from milliseconds since the Unix epoch.
    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Self)
    }

    /// Parse an ISO-8601 string. RFC 3339 with an offset is preferred; a
    /// date-time or bare date without one is taken as UTC.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self::from_datetime(instant.with_timezone(&Utc)));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
            .map(|naive| Self::from_datetime(naive.and_utc()))
            .ok_or_else(|| Error::InvalidTimestamp(input.to_string()))
    }

    /// Read a timestamp out of a JSON value: an ISO string or epoch millis.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::parse(s).ok(),
            serde_json::Value::Number(n) => n.as_i64().and_then(Self::from_millis),
            _ => None,
        }
    }

    /// The JSON representation written into record values.
    pub fn to_value(self) -> serde_json::Value {
        serde_json::Value::String(self.to_string())
    }

    /// Milliseconds since the Unix epoch.
    pub fn as_millis(self) -> i64 {
        self.0.timestamp_millis()
    }

    /// This instant shifted by `millis` (saturating at the representable range).
    pub fn plus_millis(self, millis: i64) -> Self {
        self.0
            .checked_add_signed(chrono::Duration::milliseconds(millis))
            .map(Self)
            .unwrap_or(self)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Source of "now" for the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_datetime(Utc::now())
    }
}

/// A clock that only moves when told to. Used for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock() = now;
    }

    /// Move the clock forward and return the new time.
    pub fn advance(&self, millis: i64) -> Timestamp {
        let mut now = self.now.lock();
        *now = now.plus_millis(millis);
        *now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
