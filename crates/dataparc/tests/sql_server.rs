//! SQL Server backend behaviour without a reachable server, plus an opt-in live check.

use chrono::{TimeDelta, Utc};
use dataparc::{prelude::*, SqlServer};

fn unreachable_config() -> Config {
    // Port 1 on loopback refuses connections immediately.
    Config::builder()
        .server("127.0.0.1:1")
        .username("test_user")
        .password("test_password")
        .build_with_env(|_| None)
        .expect("valid test configuration")
}

#[test]
fn unreachable_server_fails_connection_check() -> DataParcResult<()> {
    let db = DataParc::connect(unreachable_config())?;
    assert!(!db.check_connection());
    let err = db.ping().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Database);
    Ok(())
}

#[test]
fn unreachable_server_fails_queries_with_database_error() -> DataParcResult<()> {
    let db = DataParc::connect(unreachable_config())?;
    let err = db.fetch_latest_values(["Test.Tag1"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Database);
    Ok(())
}

#[test]
fn validation_happens_before_connecting() -> DataParcResult<()> {
    let backend = SqlServer::new(&unreachable_config())?;
    assert!(!backend.is_connected());
    let db = DataParc::with_backend(unreachable_config(), backend);
    let end = Utc::now();
    let err = db
        .fetch_raw_data(["Test.Tag1"], &end, &(end - TimeDelta::hours(1)))
        .unwrap_err();
    assert!(matches!(err, DataParcError::InvalidTimeRange { .. }));
    Ok(())
}

#[test]
fn calls_from_inside_an_async_runtime_fail_cleanly() -> DataParcResult<()> {
    let db = DataParc::connect(unreachable_config())?;
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(DataParcError::Runtime)?;
    let err = rt.block_on(async { db.ping() }).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unexpected);
    assert!(err.to_string().contains("spawn_blocking"));
    assert!(!rt.block_on(async { db.check_connection() }));
    Ok(())
}

/// Runs against a real historian when `DATAPARC_TEST_SERVER` is set, using
/// `DATAPARC_TEST_USERNAME`, `DATAPARC_TEST_PASSWORD`, `DATAPARC_TEST_TIMEZONE`
/// and `DATAPARC_TEST_TAG`.
#[test]
fn live_latest_value() -> DataParcResult<()> {
    let Ok(server) = std::env::var("DATAPARC_TEST_SERVER") else {
        eprintln!("DATAPARC_TEST_SERVER not set, skipping live test");
        return Ok(());
    };
    let var = |key: &str| std::env::var(key).unwrap_or_default();
    let config = Config::builder()
        .server(server)
        .username(var("DATAPARC_TEST_USERNAME"))
        .password(var("DATAPARC_TEST_PASSWORD"))
        .timezone(std::env::var("DATAPARC_TEST_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()))
        .build_with_env(|_| None)?;
    let tag = var("DATAPARC_TEST_TAG");
    let db = DataParc::connect(config)?;
    assert!(db.check_connection());
    let values = db.fetch_latest_values([tag.as_str()])?;
    assert!(values.len() <= 1);
    if let Some(value) = values.get(&tag) {
        println!("{tag}: {value}");
    }
    Ok(())
}
