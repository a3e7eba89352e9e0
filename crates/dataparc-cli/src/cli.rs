use std::{env, ffi::OsString, io::Write};

use chrono::{DateTime, TimeDelta};
use clap::{Parser, Subcommand};
use dataparc::{
    config::{DEFAULT_DATABASE, DEFAULT_TIMEZONE},
    Aggregate, Config, DataParc,
};
use dataparc_core::{parsers::parse_timestamp, Tz};
use serde_json::{json, to_writer_pretty};
use tracing::debug;

#[derive(Parser)]
#[command(name = "dataparc", version, about = "Read tag data from a DataParc historian")]
struct Cli {
    /// SQL Server address, host[:port] (or env DATAPARC_SERVER)
    #[arg(long, env = "DATAPARC_SERVER")]
    server: String,

    /// SQL login (or env DATAPARC_USERNAME)
    #[arg(long, env = "DATAPARC_USERNAME")]
    username: String,

    /// SQL password (or env DATAPARC_PASSWORD)
    #[arg(long, env = "DATAPARC_PASSWORD", hide_env_values = true)]
    password: String,

    /// Database holding the PARCdata functions (or env DATAPARC_DATABASE)
    #[arg(long, env = "DATAPARC_DATABASE", default_value = DEFAULT_DATABASE)]
    database: String,

    /// Site abbreviation (or env DATAPARC_SITE_ABBREVIATION)
    #[arg(long, env = "DATAPARC_SITE_ABBREVIATION")]
    site: Option<String>,

    /// IANA timezone of the historian (or env DATAPARC_TIMEZONE)
    #[arg(long, env = "DATAPARC_TIMEZONE", default_value = DEFAULT_TIMEZONE)]
    timezone: String,

    /// Validate the server's TLS certificate
    #[arg(long)]
    verify_certificate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the database answers
    Check,
    /// Most recent value of each tag
    Latest {
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Raw samples between two times
    Raw {
        /// Start time: RFC 3339, or YYYY-MM-DD HH:MM:SS in the site timezone
        #[arg(long)]
        start: String,
        /// End time, same formats as --start
        #[arg(long)]
        end: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Server-side aggregates over fixed steps
    Interpolated {
        /// Start time, same formats as for `raw`
        #[arg(long)]
        start: String,
        /// End time
        #[arg(long)]
        end: String,
        /// Step width in seconds
        #[arg(long, default_value_t = 60)]
        step: i64,
        /// AVG, MIN or MAX
        #[arg(long, default_value = "AVERAGE")]
        aggregate: Aggregate,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Values at specific times
    AtTimes {
        /// Requested time (repeatable)
        #[arg(long = "at", required = true)]
        times: Vec<String>,
        #[arg(required = true)]
        tags: Vec<String>,
    },
}

impl Cli {
    fn config(&self) -> dataparc::DataParcResult<Config> {
        let mut builder = Config::builder()
            .server(&self.server)
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
            .timezone(&self.timezone)
            .trust_server_certificate(!self.verify_certificate);
        if let Some(site) = &self.site {
            builder = builder.site_abbreviation(site);
        }
        builder.build_with_env(|_| None)
    }
}

fn parse_times(raw: &[String], tz: &Tz) -> Result<Vec<DateTime<Tz>>, Box<dyn std::error::Error>> {
    raw.iter()
        .map(|s| parse_timestamp(s, tz).map_err(Into::into))
        .collect()
}

/// Execute the command-line interface with a custom argv iterator, writing JSON to `out`.
pub fn run_with_args<I, T, W>(args: I, mut out: W) -> Result<(), Box<dyn std::error::Error>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
{
    let cli = Cli::try_parse_from(args)?;
    let config = cli.config()?;
    let tz = config.timezone();
    let site = config.site_abbreviation().map(str::to_string);
    debug!(host = config.host(), site = ?site, timezone = %tz, "configured DataParc connector");
    let db = DataParc::connect(config)?;

    match cli.command {
        Command::Check => {
            db.ping()?;
            to_writer_pretty(&mut out, &json!({ "status": "ok", "site": site }))?;
        }
        Command::Latest { tags } => {
            to_writer_pretty(&mut out, &db.fetch_latest_values(&tags)?)?;
        }
        Command::Raw { start, end, tags } => {
            let start = parse_timestamp(&start, &tz)?;
            let end = parse_timestamp(&end, &tz)?;
            to_writer_pretty(&mut out, &db.fetch_raw_data(&tags, &start, &end)?)?;
        }
        Command::Interpolated {
            start,
            end,
            step,
            aggregate,
            tags,
        } => {
            let start = parse_timestamp(&start, &tz)?;
            let end = parse_timestamp(&end, &tz)?;
            let step = TimeDelta::try_seconds(step).ok_or("step is out of range")?;
            let series = db.fetch_interpolated_data(&tags, &start, &end, step, aggregate)?;
            to_writer_pretty(&mut out, &series)?;
        }
        Command::AtTimes { times, tags } => {
            let times = parse_times(&times, &tz)?;
            to_writer_pretty(&mut out, &db.fetch_data_at_times(&tags, &times)?)?;
        }
    }
    writeln!(out)?;
    Ok(())
}

pub fn cli() -> Result<(), Box<dyn std::error::Error>> {
    run_with_args(env::args_os(), std::io::stdout().lock())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [&str; 7] = [
        "dataparc",
        "--server",
        "127.0.0.1:1",
        "--username",
        "reader",
        "--password",
        "secret",
    ];

    fn parse(extra: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(BASE.iter().chain(extra).copied())
    }

    #[test]
    fn latest_requires_tags() {
        assert!(parse(&["latest"]).is_err());
        assert!(parse(&["latest", "Line1.Flow"]).is_ok());
    }

    #[test]
    fn interpolated_defaults() {
        let cli = parse(&["interpolated", "--start", "a", "--end", "b", "T1"]).unwrap();
        match cli.command {
            Command::Interpolated { step, aggregate, .. } => {
                assert_eq!(step, 60);
                assert_eq!(aggregate, Aggregate::Average);
            }
            _ => panic!("wrong subcommand"),
        }
        let cli = parse(&[
            "interpolated", "--start", "a", "--end", "b", "--aggregate", "max", "T1",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Interpolated {
                aggregate: Aggregate::Maximum,
                ..
            }
        ));
    }

    #[test]
    fn config_uses_arguments() {
        let cli = parse(&["--timezone", "Asia/Seoul", "--site", "MILL", "check"]).unwrap();
        let config = cli.config().unwrap();
        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(config.port(), Some(1));
        assert_eq!(config.timezone(), Tz::Asia__Seoul);
        assert_eq!(config.site_abbreviation(), Some("MILL"));
        assert!(config.trust_server_certificate());
    }

    #[test]
    fn parse_times_rejects_garbage() {
        let tz = Tz::UTC;
        assert_eq!(parse_times(&["2024-01-01 00:00:00".to_string()], &tz).unwrap().len(), 1);
        assert!(parse_times(&["soon".to_string()], &tz).is_err());
    }
}
