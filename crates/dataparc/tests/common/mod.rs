#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use dataparc::{Backend, Config, DataParc, DataParcError, DataParcResult, RawRow, Statement};
use parking_lot::Mutex;

/// Stands in for SQL Server: records statements and replays canned rows.
#[derive(Clone, Default)]
pub struct MockBackend {
    pub rows: Vec<RawRow>,
    pub fail_with: Option<std::io::ErrorKind>,
    pub executed: Arc<Mutex<Vec<Statement>>>,
    pub pings: Arc<Mutex<usize>>,
}

impl MockBackend {
    pub fn with_rows(rows: Vec<RawRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_with: Some(std::io::ErrorKind::ConnectionRefused),
            ..Self::default()
        }
    }

    fn failure(&self) -> Option<DataParcError> {
        self.fail_with.map(|kind| {
            let io = std::io::Error::new(kind, "Connection failed");
            DataParcError::Database(tiberius::error::Error::from(io))
        })
    }
}

impl Backend for MockBackend {
    fn query(&mut self, statement: &Statement) -> DataParcResult<Vec<RawRow>> {
        self.executed.lock().push(statement.clone());
        match self.failure() {
            Some(err) => Err(err),
            None => Ok(self.rows.clone()),
        }
    }

    fn ping(&mut self) -> DataParcResult<()> {
        *self.pings.lock() += 1;
        match self.failure() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn config(timezone: &str) -> Config {
    Config::builder()
        .server("localhost")
        .username("test_user")
        .password("test_password")
        .site_abbreviation("TEST")
        .timezone(timezone)
        .build_with_env(|_| None)
        .expect("valid test configuration")
}

pub fn connector(backend: MockBackend) -> DataParc<MockBackend> {
    DataParc::with_backend(config("UTC"), backend)
}

pub fn naive(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, min, s))
        .expect("valid test timestamp")
}

pub fn row(tag: &str, timestamp: NaiveDateTime, value: impl Into<Option<f64>>, quality: i32) -> RawRow {
    RawRow {
        tag_name: tag.to_string(),
        timestamp,
        value: value.into(),
        quality,
    }
}
