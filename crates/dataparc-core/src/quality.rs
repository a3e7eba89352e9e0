use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::QualityCode;

/// Quality code DataParc reports for a valid sample.
pub const GOOD_QUALITY: QualityCode = 192;
/// Quality code DataParc reports for an invalid sample.
pub const BAD_QUALITY: QualityCode = 0;

/// Interpreted sample quality.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize,
)]
pub enum Quality {
    /// Code 192
    #[strum(serialize = "Good")]
    Good,
    /// Code 0
    #[strum(serialize = "Bad")]
    Bad,
    /// Any other vendor code
    #[strum(serialize = "Unknown")]
    Unknown(QualityCode),
}

impl Quality {
    pub fn from_code(code: QualityCode) -> Self {
        match code {
            GOOD_QUALITY => Self::Good,
            BAD_QUALITY => Self::Bad,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> QualityCode {
        match self {
            Self::Good => GOOD_QUALITY,
            Self::Bad => BAD_QUALITY,
            Self::Unknown(code) => *code,
        }
    }

    /// Human-readable label: `Good`, `Bad` or `Unknown`.
    pub fn label(&self) -> &'static str {
        self.into()
    }

    pub fn is_good(&self) -> bool {
        matches!(self, Self::Good)
    }
}

impl From<QualityCode> for Quality {
    fn from(value: QualityCode) -> Self {
        Self::from_code(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(Quality::from_code(192).label(), "Good");
        assert_eq!(Quality::from_code(0).label(), "Bad");
        assert_eq!(Quality::from_code(7).label(), "Unknown");
        assert_eq!(Quality::from_code(7).to_string(), "Unknown");
    }

    #[test]
    fn code_round_trip() {
        for code in [0, 7, 192] {
            assert_eq!(Quality::from(code).code(), code);
        }
    }
}
