pub mod errors;
pub mod parsers;
pub mod quality;

pub use chrono_tz::Tz;
pub use quality::Quality;

/// Name of a tag (sensor or process variable) as stored in DataParc.
pub type TagName = String;

/// Raw quality code as reported by DataParc.
pub type QualityCode = i32;

/// Delimiter used when passing lists to the DataParc table-valued functions.
pub const LIST_DELIMITER: char = ',';
