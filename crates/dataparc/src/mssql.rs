//! SQL Server backend built on `tiberius`.

use std::future::Future;

use dataparc_core::QualityCode;
use tiberius::{AuthMethod, Client, ColumnData, FromSql, Query, Row, SqlBrowser};
use tokio::{
    net::TcpStream,
    runtime::{Builder, Handle, Runtime},
};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use crate::{
    backend::{Backend, Param, Statement},
    config::{Config, DEFAULT_PORT},
    models::RawRow,
    DataParcError, DataParcResult,
};

type Connection = Client<Compat<TcpStream>>;

/// A result cell paired with its column name.
type Cell<'a> = (&'a str, &'a ColumnData<'static>);

const APPLICATION_NAME: &str = "dataparc-rs";

/// [`Backend`] talking TDS to the SQL Server instance behind DataParc.
///
/// The session is opened on first use and kept for later calls. Any database
/// error drops it so the next call reconnects.
///
/// Calls block on a private runtime, so they must not be made from inside an
/// async context. They fail with an `Unexpected` error there instead of
/// blocking the caller's executor.
pub struct SqlServer {
    runtime: Runtime,
    settings: tiberius::Config,
    named_instance: bool,
    client: Option<Connection>,
}

impl SqlServer {
    /// Prepares a backend for `config` without connecting yet.
    pub fn new(config: &Config) -> DataParcResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(DataParcError::Runtime)?;
        let mut settings = tiberius::Config::new();
        if config.host().contains(':') {
            settings.host(format!("[{}]", config.host()));
        } else {
            settings.host(config.host());
        }
        match (config.port(), config.instance_name()) {
            (Some(port), _) => settings.port(port),
            (None, None) => settings.port(DEFAULT_PORT),
            (None, Some(_)) => {}
        }
        if let Some(instance) = config.instance_name() {
            settings.instance_name(instance);
        }
        settings.database(config.database());
        settings.application_name(APPLICATION_NAME);
        settings.authentication(AuthMethod::sql_server(config.username(), config.password()));
        if config.trust_server_certificate() {
            settings.trust_cert();
        }
        Ok(Self {
            runtime,
            settings,
            named_instance: config.instance_name().is_some(),
            client: None,
        })
    }

    /// Whether a session is currently open.
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn ensure_connected(&mut self) -> DataParcResult<()> {
        if self.client.is_some() {
            return Ok(());
        }
        debug!(
            addr = %self.settings.get_addr(),
            named_instance = self.named_instance,
            "opening SQL Server session"
        );
        let client = block_on(
            &self.runtime,
            open(self.settings.clone(), self.named_instance),
        )??;
        self.client = Some(client);
        Ok(())
    }

    fn keep_or_drop<T>(&mut self, result: tiberius::Result<T>) -> DataParcResult<T> {
        result.map_err(|err| {
            if self.client.take().is_some() {
                warn!(error = %err, "dropping SQL Server session after error");
            }
            DataParcError::from(err)
        })
    }
}

impl Backend for SqlServer {
    fn query(&mut self, statement: &Statement) -> DataParcResult<Vec<RawRow>> {
        self.ensure_connected()?;
        let Self {
            runtime, client, ..
        } = self;
        let Some(conn) = client.as_mut() else {
            return Err(DataParcError::Unexpected("session unavailable".to_string()));
        };
        let result = block_on(runtime, run(conn, statement))?;
        let rows = self.keep_or_drop(result)?;
        rows.iter().map(decode_row).collect()
    }

    fn ping(&mut self) -> DataParcResult<()> {
        self.ensure_connected()?;
        let Self {
            runtime, client, ..
        } = self;
        let Some(conn) = client.as_mut() else {
            return Err(DataParcError::Unexpected("session unavailable".to_string()));
        };
        let result = block_on(runtime, async {
            conn.simple_query("SELECT 1").await?.into_row().await?;
            Ok::<(), tiberius::error::Error>(())
        })?;
        self.keep_or_drop(result)
    }
}

fn block_on<F: Future>(runtime: &Runtime, future: F) -> DataParcResult<F::Output> {
    if Handle::try_current().is_ok() {
        return Err(DataParcError::Unexpected(
            "DataParc calls block and cannot run inside an async runtime; \
             use tokio::task::spawn_blocking"
                .to_string(),
        ));
    }
    Ok(runtime.block_on(future))
}

async fn open(settings: tiberius::Config, named_instance: bool) -> tiberius::Result<Connection> {
    // Named instances resolve their port through the SQL Browser service.
    let tcp = if named_instance {
        TcpStream::connect_named(&settings).await?
    } else {
        TcpStream::connect(settings.get_addr()).await?
    };
    tcp.set_nodelay(true)?;
    Client::connect(settings, tcp.compat_write()).await
}

async fn run(conn: &mut Connection, statement: &Statement) -> tiberius::Result<Vec<Row>> {
    let mut query = Query::new(statement.sql());
    for param in statement.params() {
        match param {
            Param::Text(text) => query.bind(text.as_str()),
            Param::Time(time) => query.bind(*time),
            Param::Int(int) => query.bind(*int),
        }
    }
    query.query(conn).await?.into_first_result().await
}

fn decode_row(row: &Row) -> DataParcResult<RawRow> {
    let cells: Vec<Cell<'_>> = row
        .cells()
        .map(|(column, data)| (column.name(), data))
        .collect();
    decode_cells(&cells)
}

fn decode_cells(cells: &[Cell<'_>]) -> DataParcResult<RawRow> {
    let tag_name = required::<&str>(cell(cells, "tagName")?, "tagName")?.to_string();
    let timestamp = required(cell(cells, "timestamp")?, "timestamp")?;
    let value = decode_value(cell(cells, "value")?)?;
    let quality = decode_quality(cell(cells, "quality")?)?;
    Ok(RawRow {
        tag_name,
        timestamp,
        value,
        quality,
    })
}

fn malformed(column: &'static str, reason: impl Into<String>) -> DataParcError {
    DataParcError::MalformedRow {
        column,
        reason: reason.into(),
    }
}

fn cell<'a>(cells: &[Cell<'a>], name: &'static str) -> DataParcResult<&'a ColumnData<'static>> {
    cells
        .iter()
        .find(|(column, _)| column.eq_ignore_ascii_case(name))
        .map(|&(_, data)| data)
        .ok_or_else(|| malformed(name, "column missing from result"))
}

fn required<'a, T>(data: &'a ColumnData<'static>, name: &'static str) -> DataParcResult<T>
where
    T: FromSql<'a>,
{
    T::from_sql(data)
        .map_err(|err| malformed(name, err.to_string()))?
        .ok_or_else(|| malformed(name, "NULL value"))
}

// NULL values are kept; bad-quality samples often carry no value.
fn decode_value(data: &ColumnData<'static>) -> DataParcResult<Option<f64>> {
    match data {
        ColumnData::F64(value) => Ok(*value),
        ColumnData::F32(value) => Ok(value.map(f64::from)),
        other => Err(malformed(
            "value",
            format!("expected float or real, got {other:?}"),
        )),
    }
}

fn decode_quality(data: &ColumnData<'static>) -> DataParcResult<QualityCode> {
    let code = match data {
        ColumnData::I32(code) => *code,
        ColumnData::I16(code) => code.map(i32::from),
        ColumnData::U8(code) => code.map(i32::from),
        other => {
            return Err(malformed(
                "quality",
                format!("expected int, smallint or tinyint, got {other:?}"),
            ))
        }
    };
    code.ok_or_else(|| malformed("quality", "NULL value"))
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use chrono::{NaiveDate, NaiveDateTime};
    use tiberius::IntoSql;

    use super::*;

    fn sampled_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .expect("valid test time")
    }

    fn decode(value: ColumnData<'static>, quality: ColumnData<'static>) -> DataParcResult<RawRow> {
        let tag = ColumnData::String(Some(Cow::Borrowed("Line1.Flow")));
        let timestamp = sampled_at().into_sql();
        decode_cells(&[
            ("tagName", &tag),
            ("timestamp", &timestamp),
            ("value", &value),
            ("quality", &quality),
        ])
    }

    #[test]
    fn decodes_float_and_int_columns() -> DataParcResult<()> {
        let row = decode(ColumnData::F64(Some(12.5)), ColumnData::I32(Some(192)))?;
        assert_eq!(row.tag_name, "Line1.Flow");
        assert_eq!(row.timestamp, sampled_at());
        assert_eq!(row.value, Some(12.5));
        assert_eq!(row.quality, 192);
        Ok(())
    }

    #[test]
    fn accepts_narrower_column_types() -> DataParcResult<()> {
        let row = decode(ColumnData::F32(Some(1.5)), ColumnData::I16(Some(192)))?;
        assert_eq!(row.value, Some(1.5));
        assert_eq!(row.quality, 192);
        let row = decode(ColumnData::F64(Some(0.0)), ColumnData::U8(Some(7)))?;
        assert_eq!(row.quality, 7);
        Ok(())
    }

    #[test]
    fn null_value_keeps_the_row() -> DataParcResult<()> {
        let row = decode(ColumnData::F64(None), ColumnData::I32(Some(0)))?;
        assert_eq!(row.value, None);
        assert_eq!(row.quality, 0);
        let row = decode(ColumnData::F32(None), ColumnData::I32(Some(0)))?;
        assert_eq!(row.value, None);
        Ok(())
    }

    #[test]
    fn null_quality_is_malformed() {
        let err = decode(ColumnData::F64(Some(1.0)), ColumnData::I32(None)).unwrap_err();
        assert!(matches!(
            err,
            DataParcError::MalformedRow { column: "quality", ref reason } if reason == "NULL value"
        ));
    }

    #[test]
    fn unexpected_types_are_malformed() {
        let text = ColumnData::String(Some(Cow::Borrowed("12.5")));
        let err = decode(text, ColumnData::I32(Some(192))).unwrap_err();
        assert!(matches!(err, DataParcError::MalformedRow { column: "value", .. }));
        assert_eq!(err.kind(), crate::ErrorKind::Unexpected);

        let err = decode(ColumnData::F64(Some(1.0)), ColumnData::F64(Some(192.0))).unwrap_err();
        assert!(matches!(err, DataParcError::MalformedRow { column: "quality", .. }));
    }

    #[test]
    fn missing_column_is_malformed() {
        let tag = ColumnData::String(Some(Cow::Borrowed("Line1.Flow")));
        let err = decode_cells(&[("tagName", &tag)]).unwrap_err();
        assert!(matches!(err, DataParcError::MalformedRow { column: "timestamp", .. }));
    }

    #[test]
    fn column_names_match_without_case() -> DataParcResult<()> {
        let tag = ColumnData::String(Some(Cow::Borrowed("T1")));
        let timestamp = sampled_at().into_sql();
        let value = ColumnData::F64(Some(2.0));
        let quality = ColumnData::I32(Some(192));
        let row = decode_cells(&[
            ("TAGNAME", &tag),
            ("Timestamp", &timestamp),
            ("VALUE", &value),
            ("quality", &quality),
        ])?;
        assert_eq!(row.tag_name, "T1");
        Ok(())
    }
}
