//! Connection settings, from explicit values or `DATAPARC_*` environment variables.

use std::{fmt, net::Ipv6Addr};

use dataparc_core::{parsers::parse_timezone, Tz};

use crate::{DataParcError, DataParcResult};

/// Database holding the PARCdata table-valued functions.
pub const DEFAULT_DATABASE: &str = "ctc_config";
/// Default SQL Server port.
pub const DEFAULT_PORT: u16 = 1433;
/// Timezone assumed when none is configured.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Environment variable naming the SQL Server address.
///
/// Accepted forms are `host`, `host:port`, `host,port`, `host\instance`,
/// `host\instance,port`, `[ipv6]:port` and a bare IPv6 literal.
pub const SERVER_VAR: &str = "DATAPARC_SERVER";
/// Environment variable holding the SQL login name.
pub const USERNAME_VAR: &str = "DATAPARC_USERNAME";
/// Environment variable holding the SQL login password.
pub const PASSWORD_VAR: &str = "DATAPARC_PASSWORD";
/// Environment variable holding the site abbreviation.
pub const SITE_ABBREVIATION_VAR: &str = "DATAPARC_SITE_ABBREVIATION";
/// Environment variable holding the IANA timezone of the site.
pub const TIMEZONE_VAR: &str = "DATAPARC_TIMEZONE";
/// Environment variable overriding the database name.
pub const DATABASE_VAR: &str = "DATAPARC_DATABASE";

/// Connection settings for a DataParc site. Read-only once built.
#[derive(Clone)]
pub struct Config {
    host: String,
    port: Option<u16>,
    instance_name: Option<String>,
    username: String,
    password: String,
    database: String,
    site_abbreviation: Option<String>,
    timezone: Tz,
    trust_server_certificate: bool,
}

impl Config {
    /// Starts an empty builder. Unset values fall back to the environment.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Builds a configuration entirely from `DATAPARC_*` environment variables.
    pub fn from_env() -> DataParcResult<Self> {
        Self::builder().build()
    }

    /// Host name or address of the SQL Server instance.
    pub fn host(&self) -> &str {
        &self.host
    }
    /// Explicit TCP port, if one was given.
    ///
    /// Without one the default instance listens on [`DEFAULT_PORT`] and a
    /// named instance is located through the SQL Browser service.
    pub fn port(&self) -> Option<u16> {
        self.port
    }
    /// Named SQL Server instance, from a `host\instance` address.
    pub fn instance_name(&self) -> Option<&str> {
        self.instance_name.as_deref()
    }
    /// SQL login name.
    pub fn username(&self) -> &str {
        &self.username
    }
    /// SQL login password.
    pub fn password(&self) -> &str {
        &self.password
    }
    /// Database containing the PARCdata functions.
    pub fn database(&self) -> &str {
        &self.database
    }
    /// Short code of the plant site, if configured.
    pub fn site_abbreviation(&self) -> Option<&str> {
        self.site_abbreviation.as_deref()
    }
    /// Timezone in which the historian stores its timestamps.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }
    /// Whether the server certificate is accepted without validation.
    pub fn trust_server_certificate(&self) -> bool {
        self.trust_server_certificate
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("instance_name", &self.instance_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("site_abbreviation", &self.site_abbreviation)
            .field("timezone", &self.timezone)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .finish()
    }
}

/// Builder for [`Config`]; explicit values take precedence over the environment.
#[derive(Default, Clone)]
pub struct ConfigBuilder {
    server: Option<String>,
    username: Option<String>,
    password: Option<String>,
    database: Option<String>,
    site_abbreviation: Option<String>,
    timezone: Option<String>,
    trust_server_certificate: Option<bool>,
}

impl ConfigBuilder {
    /// Server address, in any of the forms listed under [`SERVER_VAR`].
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }
    /// SQL login name.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
    /// SQL login password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
    /// Database name, `ctc_config` unless overridden.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
    /// Short code of the plant site.
    pub fn site_abbreviation(mut self, abbreviation: impl Into<String>) -> Self {
        self.site_abbreviation = Some(abbreviation.into());
        self
    }
    /// IANA timezone name, e.g. `America/Chicago`.
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }
    /// Accept the server certificate without validation (defaults to `true`).
    pub fn trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = Some(trust);
        self
    }

    /// Finishes the configuration, reading missing values from the process environment.
    pub fn build(self) -> DataParcResult<Config> {
        self.build_with_env(|key| std::env::var(key).ok())
    }

    /// Finishes the configuration, reading missing values through `env`.
    pub fn build_with_env<F>(self, env: F) -> DataParcResult<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |explicit: Option<String>, key: &str| {
            explicit
                .filter(|v| !v.is_empty())
                .or_else(|| env(key).filter(|v| !v.is_empty()))
        };
        let server = pick(self.server, SERVER_VAR).ok_or(DataParcError::IncompleteConfig(SERVER_VAR))?;
        let username =
            pick(self.username, USERNAME_VAR).ok_or(DataParcError::IncompleteConfig(USERNAME_VAR))?;
        let password =
            pick(self.password, PASSWORD_VAR).ok_or(DataParcError::IncompleteConfig(PASSWORD_VAR))?;
        let database = pick(self.database, DATABASE_VAR).unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let site_abbreviation = pick(self.site_abbreviation, SITE_ABBREVIATION_VAR);
        let timezone = parse_timezone(
            &pick(self.timezone, TIMEZONE_VAR).unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        )?;
        let ServerAddress {
            host,
            port,
            instance_name,
        } = ServerAddress::parse(&server)?;
        Ok(Config {
            host,
            port,
            instance_name,
            username,
            password,
            database,
            site_abbreviation,
            timezone,
            trust_server_certificate: self.trust_server_certificate.unwrap_or(true),
        })
    }
}

#[derive(Debug, PartialEq)]
struct ServerAddress {
    host: String,
    port: Option<u16>,
    instance_name: Option<String>,
}

impl ServerAddress {
    fn parse(server: &str) -> DataParcResult<Self> {
        let server = server.trim();
        let invalid = || DataParcError::InvalidServerAddress(server.to_string());
        let parse_port = |port: &str| port.trim().parse::<u16>().map_err(|_| invalid());

        let (rest, mut port) = match server.rsplit_once(',') {
            Some((rest, port)) => (rest.trim(), Some(parse_port(port)?)),
            None => (server, None),
        };

        let (host, instance_name) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed.split_once(']').ok_or_else(invalid)?;
            host.parse::<Ipv6Addr>().map_err(|_| invalid())?;
            match tail.strip_prefix(':') {
                Some(p) if port.is_none() => port = Some(parse_port(p)?),
                None if tail.is_empty() => {}
                _ => return Err(invalid()),
            }
            (host.to_string(), None)
        } else if rest.parse::<Ipv6Addr>().is_ok() {
            // A bare IPv6 literal; its port needs brackets or a comma.
            (rest.to_string(), None)
        } else {
            let rest = match rest.split_once(':') {
                Some((host, p)) if port.is_none() => {
                    port = Some(parse_port(p)?);
                    host
                }
                Some(_) => return Err(invalid()),
                None => rest,
            };
            match rest.split_once('\\') {
                Some((host, instance)) => {
                    if instance.is_empty() || instance.contains('\\') {
                        return Err(invalid());
                    }
                    (host.to_string(), Some(instance.to_string()))
                }
                None => (rest.to_string(), None),
            }
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host,
            port,
            instance_name,
        })
    }
}
