//! DataParc historian access library.
//!
//! [`DataParc`] wraps a SQL Server connection to a DataParc `ctc_config`
//! database and exposes the four PARCdata read functions (latest, raw,
//! interpolated and at-time) as typed queries returning [`TagMeasurement`]s.

pub mod backend;
pub mod config;
pub mod context;
pub mod database;
pub mod models;
pub mod mssql;

pub use backend::{Backend, Param, Statement};
pub use config::Config;
pub use context::{Query, TagList};
pub use database::DataParc;
pub use models::{latest_per_tag, Aggregate, RawRow, SeriesMap, TagMeasurement};
pub use mssql::SqlServer;

use chrono::{DateTime, TimeDelta};
use dataparc_core::{
    errors::{ParseTimestampError, ParseTimezoneError},
    Tz,
};
use thiserror::Error;

/// Convenience alias for results returned from DataParc operations.
pub type DataParcResult<T> = Result<T, DataParcError>;

/// Broad classification of a [`DataParcError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server or the connection to it failed.
    Database,
    /// Anything else that went wrong after a request was accepted, such as a malformed response.
    Unexpected,
    /// The request was rejected before reaching the database.
    InvalidInput,
}

/// Errors that can occur while querying DataParc.
#[derive(Error, Debug)]
pub enum DataParcError {
    /// Wrapper around tiberius errors (network, login and query failures).
    #[error("database error occurred: {0}")]
    Database(#[from] tiberius::error::Error),
    /// A result row was missing a column or carried an unexpected type.
    #[error("malformed row: column {column}: {reason}")]
    MalformedRow {
        /// Name of the offending column.
        column: &'static str,
        /// What was wrong with it.
        reason: String,
    },
    /// The I/O runtime driving the connection could not be started.
    #[error("failed to start I/O runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Catch-all for failures outside the database itself.
    #[error("an unexpected error occurred: {0}")]
    Unexpected(String),
    /// No tags were supplied.
    #[error("tag list cannot be empty")]
    EmptyTagList,
    /// A tag name contains the list delimiter and would be split server-side.
    #[error("tag name {0:?} contains the list delimiter ','")]
    InvalidTagName(String),
    /// Range queries require `start < end`.
    #[error("start time must be before end time (start: {start}, end: {end})")]
    InvalidTimeRange {
        /// Requested start, in the site timezone.
        start: DateTime<Tz>,
        /// Requested end, in the site timezone.
        end: DateTime<Tz>,
    },
    /// Interpolation steps must be a positive whole number of seconds.
    #[error("step size must be greater than zero (got {0})")]
    InvalidStepSize(TimeDelta),
    /// No timestamps were supplied to an at-time query.
    #[error("timestamps list cannot be empty")]
    EmptyTimestamps,
    /// The server address could not be split into host, instance and port.
    #[error("invalid server address {0:?}")]
    InvalidServerAddress(String),
    /// A required connection setting was not provided.
    #[error("database connection information is incomplete: {0} is not set")]
    IncompleteConfig(&'static str),
    /// The configured timezone is not a known IANA zone.
    #[error("{0}")]
    ParseTimezone(#[from] ParseTimezoneError),
    /// A timestamp supplied as text could not be parsed.
    #[error("{0}")]
    ParseTimestamp(#[from] ParseTimestampError),
}

impl DataParcError {
    /// Returns which of the three error families this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Database(_) => ErrorKind::Database,
            Self::MalformedRow { .. } | Self::Runtime(_) | Self::Unexpected(_) => {
                ErrorKind::Unexpected
            }
            Self::EmptyTagList
            | Self::InvalidTagName(_)
            | Self::InvalidTimeRange { .. }
            | Self::InvalidStepSize(_)
            | Self::EmptyTimestamps
            | Self::InvalidServerAddress(_)
            | Self::IncompleteConfig(_)
            | Self::ParseTimezone(_)
            | Self::ParseTimestamp(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Re-exports for the most common types.
pub mod prelude {
    pub use crate::{
        config::Config,
        context::{Query, TagList},
        database::DataParc,
        models::{latest_per_tag, Aggregate, SeriesMap, TagMeasurement},
        DataParcError, DataParcResult, ErrorKind,
    };
    pub use dataparc_core::{Quality, Tz};
}
