//! Request shaping: validated tag lists and the four PARCdata query kinds.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDateTime, TimeDelta};
use dataparc_core::{parsers::format_timestamp, Tz, LIST_DELIMITER};
use itertools::Itertools;
use tracing::warn;

use crate::{
    backend::{Param, Statement},
    models::{Aggregate, RawRow, SeriesMap, TagMeasurement},
    DataParcError, DataParcResult,
};

const READ_LAST_TAGS: &str =
    "SELECT tagName, timestamp, value, quality FROM ctc_fn_PARCdata_ReadLastTags (@P1, ',')";
const READ_RAW_TAGS: &str = "SELECT tagName, timestamp, value, quality \
     FROM ctc_fn_PARCdata_ReadRawTags (@P1, @P2, @P3, 1, ',')";
const READ_INTERPOLATED_TAGS: &str = "SELECT tagName, timestamp, value, quality \
     FROM ctc_fn_PARCdata_ReadInterpolatedTags (@P1, @P2, @P3, @P4, @P5, ',')";
const READ_AT_TIME_TAGS: &str = "SELECT tagName, timestamp, value, quality \
     FROM ctc_fn_PARCdata_ReadAtTimeTags (@P1, @P2, ',')";

/// Validated, de-duplicated set of tag names for a single request.
///
/// Tags keep the caller's spelling and order. Rows coming back from the
/// server are matched to them without regard to ASCII case, which mirrors
/// the default SQL Server collation.
#[derive(Debug, Clone)]
pub struct TagList {
    tags: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl TagList {
    /// Builds a tag list, rejecting empty input and names containing `,`.
    pub fn new<I, S>(tags: I) -> DataParcResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<String> = tags
            .into_iter()
            .map(|t| t.as_ref().to_string())
            .unique_by(|t| t.to_ascii_lowercase())
            .collect();
        if tags.is_empty() {
            return Err(DataParcError::EmptyTagList);
        }
        if let Some(bad) = tags.iter().find(|t| t.contains(LIST_DELIMITER)) {
            return Err(DataParcError::InvalidTagName(bad.clone()));
        }
        let lookup = tags
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_ascii_lowercase(), i))
            .collect();
        Ok(Self { tags, lookup })
    }

    /// Number of distinct tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Always `false` for a successfully built list.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Tags in request order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Tags joined with the list delimiter, as the PARCdata functions expect.
    pub fn joined(&self) -> String {
        self.tags.iter().join(&LIST_DELIMITER.to_string())
    }

    /// Returns the requested spelling of `name`, if it was requested at all.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.lookup
            .get(&name.to_ascii_lowercase())
            .map(|&i| self.tags[i].as_str())
    }

    /// Groups rows into one series per requested tag, keeping server order.
    pub fn collect_series(&self, rows: Vec<RawRow>, tz: &Tz) -> SeriesMap {
        let mut series = SeriesMap::new();
        let mut dropped = 0usize;
        for row in rows {
            let Some(tag) = self.resolve(&row.tag_name) else {
                dropped += 1;
                continue;
            };
            series
                .entry(tag.to_string())
                .or_default()
                .push(TagMeasurement::from_row(&row, tz));
        }
        if dropped > 0 {
            warn!(dropped, "discarded rows for tags that were not requested");
        }
        series
    }

    /// Keeps the most recent row per requested tag.
    pub fn collect_latest(&self, rows: Vec<RawRow>, tz: &Tz) -> BTreeMap<String, TagMeasurement> {
        crate::models::latest_per_tag(self.collect_series(rows, tz))
    }
}

/// What to read for each tag.
///
/// Range bounds are instants in the site timezone. They are compared as
/// instants, so a range crossing a fall-back hour is valid even when its
/// wall-clock end reads earlier than its start. They are sent as naive
/// wall-clock times, which is how the historian stores them.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Most recent sample of each tag.
    Latest,
    /// Every stored sample in `[start, end]`.
    Raw {
        /// Inclusive lower bound.
        start: DateTime<Tz>,
        /// Inclusive upper bound.
        end: DateTime<Tz>,
    },
    /// Server-side aggregation over fixed steps.
    Interpolated {
        /// Start of the first step.
        start: DateTime<Tz>,
        /// End of the last step.
        end: DateTime<Tz>,
        /// Step width in seconds.
        step_seconds: i32,
        /// Aggregation applied within each step.
        aggregate: Aggregate,
    },
    /// Samples at (or nearest to) each listed site-local time.
    AtTimes(Vec<NaiveDateTime>),
}

impl Query {
    /// Most recent sample per tag.
    pub fn latest() -> Self {
        Self::Latest
    }

    /// Raw samples between `start` and `end`; requires `start < end`.
    pub fn raw(start: DateTime<Tz>, end: DateTime<Tz>) -> DataParcResult<Self> {
        check_range(start, end)?;
        Ok(Self::Raw { start, end })
    }

    /// Aggregated samples every `step` between `start` and `end`.
    ///
    /// `step` must be a positive whole number of seconds.
    pub fn interpolated(
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        step: TimeDelta,
        aggregate: Aggregate,
    ) -> DataParcResult<Self> {
        check_range(start, end)?;
        let whole_seconds = step.num_seconds();
        if whole_seconds <= 0 || step.subsec_nanos() != 0 {
            return Err(DataParcError::InvalidStepSize(step));
        }
        let step_seconds =
            i32::try_from(whole_seconds).map_err(|_| DataParcError::InvalidStepSize(step))?;
        Ok(Self::Interpolated {
            start,
            end,
            step_seconds,
            aggregate,
        })
    }

    /// Samples at each of `timestamps`; the list must not be empty.
    pub fn at_times(timestamps: impl IntoIterator<Item = NaiveDateTime>) -> DataParcResult<Self> {
        let timestamps: Vec<NaiveDateTime> = timestamps.into_iter().collect();
        if timestamps.is_empty() {
            return Err(DataParcError::EmptyTimestamps);
        }
        Ok(Self::AtTimes(timestamps))
    }

    /// Name of the PARCdata function this query calls.
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::Latest => "ctc_fn_PARCdata_ReadLastTags",
            Self::Raw { .. } => "ctc_fn_PARCdata_ReadRawTags",
            Self::Interpolated { .. } => "ctc_fn_PARCdata_ReadInterpolatedTags",
            Self::AtTimes(_) => "ctc_fn_PARCdata_ReadAtTimeTags",
        }
    }

    /// Builds the parameterized SQL for `tags`.
    pub fn statement(&self, tags: &TagList) -> Statement {
        let tag_param = Param::Text(tags.joined());
        match self {
            Self::Latest => Statement::new(READ_LAST_TAGS, vec![tag_param]),
            Self::Raw { start, end } => Statement::new(
                READ_RAW_TAGS,
                vec![
                    tag_param,
                    Param::Time(start.naive_local()),
                    Param::Time(end.naive_local()),
                ],
            ),
            Self::Interpolated {
                start,
                end,
                step_seconds,
                aggregate,
            } => Statement::new(
                READ_INTERPOLATED_TAGS,
                vec![
                    tag_param,
                    Param::Time(start.naive_local()),
                    Param::Time(end.naive_local()),
                    Param::Text(aggregate.as_str().to_string()),
                    Param::Int(*step_seconds),
                ],
            ),
            Self::AtTimes(timestamps) => Statement::new(
                READ_AT_TIME_TAGS,
                vec![
                    tag_param,
                    Param::Text(timestamps.iter().map(format_timestamp).join(",")),
                ],
            ),
        }
    }
}

fn check_range(start: DateTime<Tz>, end: DateTime<Tz>) -> DataParcResult<()> {
    if start >= end {
        return Err(DataParcError::InvalidTimeRange { start, end });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|d| d.and_hms_opt(h, 0, 0))
            .expect("valid test time")
    }

    fn utc(h: u32) -> DateTime<Tz> {
        Tz::UTC.from_utc_datetime(&at(h))
    }

    #[test]
    fn range_is_checked_on_instants_across_fall_back() -> DataParcResult<()> {
        let chicago = Tz::America__Chicago;
        let utc_time = |h, m| {
            NaiveDate::from_ymd_opt(2024, 11, 3)
                .and_then(|d| d.and_hms_opt(h, m, 0))
                .expect("valid test time")
        };
        // 01:30 CDT, then 01:10 CST forty minutes later.
        let start = chicago.from_utc_datetime(&utc_time(6, 30));
        let end = chicago.from_utc_datetime(&utc_time(7, 10));
        assert!(start.naive_local() > end.naive_local());

        let tags = TagList::new(["T1"])?;
        let statement = Query::raw(start, end)?.statement(&tags);
        assert_eq!(statement.params()[1], Param::Time(start.naive_local()));
        assert_eq!(statement.params()[2], Param::Time(end.naive_local()));

        let err = Query::raw(end, start).unwrap_err();
        assert!(matches!(err, DataParcError::InvalidTimeRange { .. }));
        Ok(())
    }

    #[test]
    fn tag_list_dedups_and_resolves_case_insensitively() -> DataParcResult<()> {
        let tags = TagList::new(["Line1.Flow", "line1.flow", "Line1.Temp"])?;
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.joined(), "Line1.Flow,Line1.Temp");
        assert_eq!(tags.resolve("LINE1.FLOW"), Some("Line1.Flow"));
        assert_eq!(tags.resolve("Line2.Flow"), None);
        Ok(())
    }

    #[test]
    fn tag_list_rejects_delimiter() {
        let err = TagList::new(["A,B"]).unwrap_err();
        assert!(matches!(err, DataParcError::InvalidTagName(name) if name == "A,B"));
    }

    #[test]
    fn step_size_must_be_whole_positive_seconds() {
        for step in [
            TimeDelta::zero(),
            TimeDelta::seconds(-60),
            TimeDelta::milliseconds(1500),
        ] {
            let err = Query::interpolated(utc(0), utc(1), step, Aggregate::Average).unwrap_err();
            assert!(matches!(err, DataParcError::InvalidStepSize(_)));
        }
    }

    #[test]
    fn at_time_statement_formats_timestamps() -> DataParcResult<()> {
        let tags = TagList::new(["T1"])?;
        let statement = Query::at_times([at(1), at(2)])?.statement(&tags);
        assert_eq!(
            statement.params(),
            &[
                Param::Text("T1".to_string()),
                Param::Text("2024-06-01 01:00:00,2024-06-01 02:00:00".to_string()),
            ]
        );
        Ok(())
    }
}
