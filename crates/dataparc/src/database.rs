//! The [`DataParc`] connector.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, TimeZone};
use dataparc_core::{parsers::to_site_local, TagName, Tz};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    backend::Backend,
    config::Config,
    context::{Query, TagList},
    models::{Aggregate, RawRow, SeriesMap, TagMeasurement},
    mssql::SqlServer,
    DataParcResult,
};

/// Primary entry point for reading tag data from a DataParc site.
///
/// All methods take `&self`; calls are serialized on the single backend
/// session.
///
/// The calls are blocking. From async code, run them through
/// `tokio::task::spawn_blocking`. With the SQL Server backend, a call made
/// directly on an async executor fails with [`ErrorKind::Unexpected`]
/// instead of stalling it.
///
/// [`ErrorKind::Unexpected`]: crate::ErrorKind::Unexpected
pub struct DataParc<B: Backend = SqlServer> {
    config: Config,
    backend: Mutex<B>,
}

impl DataParc<SqlServer> {
    /// Creates a connector for `config`. The session is opened on first use.
    pub fn connect(config: Config) -> DataParcResult<Self> {
        let backend = SqlServer::new(&config)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Creates a connector configured from `DATAPARC_*` environment variables.
    pub fn from_env() -> DataParcResult<Self> {
        Self::connect(Config::from_env()?)
    }
}

impl<B: Backend> DataParc<B> {
    /// Creates a connector that runs its statements on `backend`.
    pub fn with_backend(config: Config, backend: B) -> Self {
        Self {
            config,
            backend: Mutex::new(backend),
        }
    }

    /// Returns the configuration this connector was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Timezone used to interpret historian timestamps.
    pub fn timezone(&self) -> Tz {
        self.config.timezone()
    }

    /// Runs `SELECT 1`, opening or refreshing the session if needed.
    pub fn ping(&self) -> DataParcResult<()> {
        self.backend.lock().ping()
    }

    /// Returns `true` if the database answered a trivial query.
    pub fn check_connection(&self) -> bool {
        match self.ping() {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, host = self.config.host(), "DataParc connection check failed");
                false
            }
        }
    }

    /// Fetches the most recent sample of each tag.
    pub fn fetch_latest_values<I, S>(&self, tags: I) -> DataParcResult<BTreeMap<TagName, TagMeasurement>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = TagList::new(tags)?;
        let rows = self.fetch(&tags, &Query::latest())?;
        Ok(tags.collect_latest(rows, &self.timezone()))
    }

    /// Fetches every stored sample of each tag between `start` and `end`.
    pub fn fetch_raw_data<I, S, T>(
        &self,
        tags: I,
        start: &DateTime<T>,
        end: &DateTime<T>,
    ) -> DataParcResult<SeriesMap>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        T: TimeZone,
    {
        let tags = TagList::new(tags)?;
        let tz = self.timezone();
        let query = Query::raw(start.with_timezone(&tz), end.with_timezone(&tz))?;
        let rows = self.fetch(&tags, &query)?;
        Ok(tags.collect_series(rows, &tz))
    }

    /// Fetches server-side aggregates of each tag every `step` between `start` and `end`.
    pub fn fetch_interpolated_data<I, S, T>(
        &self,
        tags: I,
        start: &DateTime<T>,
        end: &DateTime<T>,
        step: TimeDelta,
        aggregate: Aggregate,
    ) -> DataParcResult<SeriesMap>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        T: TimeZone,
    {
        let tags = TagList::new(tags)?;
        let tz = self.timezone();
        let query = Query::interpolated(
            start.with_timezone(&tz),
            end.with_timezone(&tz),
            step,
            aggregate,
        )?;
        let rows = self.fetch(&tags, &query)?;
        Ok(tags.collect_series(rows, &tz))
    }

    /// Fetches the sample of each tag at (or nearest to) each of `timestamps`.
    pub fn fetch_data_at_times<I, S, T>(
        &self,
        tags: I,
        timestamps: &[DateTime<T>],
    ) -> DataParcResult<SeriesMap>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        T: TimeZone,
    {
        let tags = TagList::new(tags)?;
        let tz = self.timezone();
        let query = Query::at_times(timestamps.iter().map(|ts| to_site_local(ts, &tz)))?;
        let rows = self.fetch(&tags, &query)?;
        Ok(tags.collect_series(rows, &tz))
    }

    /// Runs an already validated query and returns the undecoded rows.
    pub fn fetch(&self, tags: &TagList, query: &Query) -> DataParcResult<Vec<RawRow>> {
        let statement = query.statement(tags);
        debug!(
            function = query.function_name(),
            tags = tags.len(),
            "executing PARCdata query"
        );
        let rows = self.backend.lock().query(&statement)?;
        debug!(rows = rows.len(), "PARCdata query returned");
        Ok(rows)
    }
}
