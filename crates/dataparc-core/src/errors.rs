use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseTimestampError {
    #[error("could not parse timestamp \"{0}\" (expected RFC 3339 or YYYY-MM-DD HH:MM:SS)")]
    InvalidFormat(String),
    #[error("{0} does not exist in timezone {1}")]
    NonexistentLocalTime(String, String),
}

#[derive(Error, Debug)]
#[error("unknown timezone: {0}")]
pub struct ParseTimezoneError(pub String);
