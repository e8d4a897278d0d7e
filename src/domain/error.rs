//! Domain error types.

use chrono::NaiveDateTime;

/// Raised by indicators and strategies when the window is shorter than the
/// lookback they need. Expected during warm-up; callers recover from it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("insufficient data for {what}: have {have} bars, need {need}")]
pub struct InsufficientData {
    pub what: String,
    pub have: usize,
    pub need: usize,
}

impl InsufficientData {
    pub fn new(what: impl Into<String>, have: usize, need: usize) -> Self {
        Self {
            what: what.into(),
            have,
            need,
        }
    }
}

/// Top-level error type for confluence.
#[derive(Debug, thiserror::Error)]
pub enum ConfluenceError {
    #[error("invalid bar at {timestamp}: {reason}")]
    DataValidation {
        timestamp: NaiveDateTime,
        reason: String,
    },

    #[error(transparent)]
    InsufficientData(#[from] InsufficientData),

    #[error("invalid signal: {reason}")]
    InvalidSignal { reason: String },

    #[error("order rejected: {reason}")]
    OrderRejected { reason: String },

    #[error("unknown strategy '{name}'")]
    UnknownStrategy { name: String },

    #[error("invalid parameter {param} for {strategy}: {reason}")]
    InvalidParameter {
        strategy: String,
        param: String,
        reason: String,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("market feed error: {reason}")]
    Feed { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConfluenceError {
    /// Fatal errors abort a run; everything else is recoverable by the engine.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ConfluenceError::InsufficientData(_) | ConfluenceError::OrderRejected { .. }
        )
    }
}

impl From<&ConfluenceError> for std::process::ExitCode {
    fn from(err: &ConfluenceError) -> Self {
        let code: u8 = match err {
            ConfluenceError::Io(_) | ConfluenceError::Csv(_) | ConfluenceError::Json(_) => 1,
            ConfluenceError::ConfigParse { .. }
            | ConfluenceError::ConfigMissing { .. }
            | ConfluenceError::ConfigInvalid { .. } => 2,
            ConfluenceError::DataSource { .. } | ConfluenceError::Feed { .. } => 3,
            ConfluenceError::UnknownStrategy { .. }
            | ConfluenceError::InvalidParameter { .. }
            | ConfluenceError::InvalidSignal { .. } => 4,
            ConfluenceError::DataValidation { .. }
            | ConfluenceError::InsufficientData(_)
            | ConfluenceError::OrderRejected { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn insufficient_data_message() {
        let err = InsufficientData::new("SMA(50)", 12, 50);
        assert_eq!(
            err.to_string(),
            "insufficient data for SMA(50): have 12 bars, need 50"
        );
    }

    #[test]
    fn data_validation_surfaces_timestamp() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let err = ConfluenceError::DataValidation {
            timestamp: ts,
            reason: "high < low".into(),
        };
        assert_eq!(err.to_string(), "invalid bar at 2024-03-01 12:00:00: high < low");
        assert!(err.is_fatal());
    }

    #[test]
    fn recoverable_kinds_are_not_fatal() {
        let warmup: ConfluenceError = InsufficientData::new("RSI(14)", 3, 15).into();
        assert!(!warmup.is_fatal());
        let rejected = ConfluenceError::OrderRejected {
            reason: "zero quantity".into(),
        };
        assert!(!rejected.is_fatal());
        let invalid = ConfluenceError::InvalidSignal {
            reason: "strength 1.5".into(),
        };
        assert!(invalid.is_fatal());
    }
}
