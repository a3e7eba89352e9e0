//! Rows and measurements returned by the PARCdata functions.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime};
use dataparc_core::{parsers::localize, Quality, QualityCode, TagName, Tz};
use serde::{ser::SerializeStruct, Serialize, Serializer};
use thiserror::Error;

/// Series of measurements per tag, in the order the server returned them.
pub type SeriesMap = BTreeMap<TagName, Vec<TagMeasurement>>;

/// One undecoded result row of a PARCdata function.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Tag name as spelled by the server.
    pub tag_name: String,
    /// Site-local sample time.
    pub timestamp: NaiveDateTime,
    /// Sample value; `None` when the historian stored NULL.
    pub value: Option<f64>,
    /// Vendor quality code.
    pub quality: QualityCode,
}

/// A single sample of a tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TagMeasurement {
    pub(crate) value: Option<f64>,
    pub(crate) timestamp: DateTime<Tz>,
    pub(crate) quality: QualityCode,
}

impl TagMeasurement {
    /// Creates a measurement from its parts.
    pub fn new(value: impl Into<Option<f64>>, timestamp: DateTime<Tz>, quality: QualityCode) -> Self {
        Self {
            value: value.into(),
            timestamp,
            quality,
        }
    }

    pub(crate) fn from_row(row: &RawRow, tz: &Tz) -> Self {
        Self::new(row.value, localize(row.timestamp, tz), row.quality)
    }

    /// Sample value, or `None` if the historian stored NULL.
    pub fn value(&self) -> Option<f64> {
        self.value
    }
    /// Sample time in the site timezone.
    pub fn timestamp(&self) -> DateTime<Tz> {
        self.timestamp
    }
    /// Raw vendor quality code.
    pub fn quality(&self) -> QualityCode {
        self.quality
    }
    /// Interpreted quality.
    pub fn quality_kind(&self) -> Quality {
        Quality::from_code(self.quality)
    }
    /// `Good` for 192, `Bad` for 0, `Unknown` otherwise.
    pub fn quality_str(&self) -> &'static str {
        self.quality_kind().label()
    }
}

impl fmt::Display for TagMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(value) => write!(f, "{value:.2}")?,
            None => f.write_str("NULL")?,
        }
        write!(
            f,
            " at {} (S:{})",
            self.timestamp.format("%m/%d/%y %H:%M:%S %z"),
            self.quality_str()
        )
    }
}

impl Serialize for TagMeasurement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TagMeasurement", 4)?;
        state.serialize_field("value", &self.value)?;
        state.serialize_field("timestamp", &self.timestamp.to_rfc3339())?;
        state.serialize_field("quality", &self.quality)?;
        state.serialize_field("quality_label", self.quality_str())?;
        state.end()
    }
}

/// Reduces each series to its most recent sample.
pub fn latest_per_tag(series: SeriesMap) -> BTreeMap<TagName, TagMeasurement> {
    series
        .into_iter()
        .filter_map(|(tag, samples)| {
            let latest = samples.into_iter().max_by_key(TagMeasurement::timestamp)?;
            Some((tag, latest))
        })
        .collect()
}

/// Aggregation the server applies inside each interpolation step.
///
/// The named variants cover the common cases. Anything else the historian
/// understands goes through [`Aggregate::Other`] and is sent as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Aggregate {
    /// `AVERAGE`
    Average,
    /// `MIN`
    Minimum,
    /// `MAX`
    Maximum,
    /// Any other aggregate name, passed through unchanged.
    Other(String),
}

impl Aggregate {
    /// Identifier passed to `ctc_fn_PARCdata_ReadInterpolatedTags`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Average => "AVERAGE",
            Self::Minimum => "MIN",
            Self::Maximum => "MAX",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when the aggregate text is blank.
#[derive(Error, Debug)]
#[error("aggregate name cannot be empty (got {0:?})")]
pub struct ParseAggregateError(
    /// The text that failed to parse.
    pub String,
);

impl FromStr for Aggregate {
    type Err = ParseAggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Err(ParseAggregateError(s.to_string()));
        }
        Ok(match name.to_uppercase().as_str() {
            "AVERAGE" => Self::Average,
            "MIN" => Self::Minimum,
            "MAX" => Self::Maximum,
            _ => Self::Other(name.to_string()),
        })
    }
}
