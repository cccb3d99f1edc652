//! Ground-truth labels revealed by the analyst

use serde::{Deserialize, Serialize};

/// Label of one instance
///
/// `Unknown` marks instances whose truth is not available. When such an
/// instance is queried it is treated as nominal, the same as any label that is
/// not `Anomaly`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    /// Confirmed nominal
    Nominal,
    /// Confirmed anomaly
    Anomaly,
    /// Not yet known
    #[default]
    Unknown,
}

impl Label {
    /// True only for confirmed anomalies
    pub fn is_anomaly(self) -> bool {
        matches!(self, Self::Anomaly)
    }

    /// Map the common 0/1 encoding; any other value is `Unknown`
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Anomaly,
            0 => Self::Nominal,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_codes() {
        assert_eq!(Label::from_code(1), Label::Anomaly);
        assert_eq!(Label::from_code(0), Label::Nominal);
        assert_eq!(Label::from_code(-1), Label::Unknown);
        assert!(!Label::Unknown.is_anomaly());
    }
}
