//! Domain error types.

/// Top-level error type for soltrade.
#[derive(Debug, thiserror::Error)]
pub enum SoltradeError {
    #[error("invalid argument `{field}`: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("duplicate transaction id {txid}")]
    DuplicateTransaction { txid: String },

    #[error("unknown series `{alias}`")]
    UnknownSeries { alias: String },

    #[error("series `{alias}` has {len} samples but the timestamp axis has {expected}")]
    SeriesLengthMismatch {
        alias: String,
        len: usize,
        expected: usize,
    },

    #[error("alias mismatch: {reason}")]
    AliasMismatch { reason: String },

    #[error("data error: {reason}")]
    Data { reason: String },

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
}

impl SoltradeError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        SoltradeError::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

impl From<&SoltradeError> for std::process::ExitCode {
    fn from(err: &SoltradeError) -> Self {
        let code: u8 = match err {
            SoltradeError::ConfigParse { .. }
            | SoltradeError::ConfigMissing { .. }
            | SoltradeError::ConfigInvalid { .. } => 2,
            SoltradeError::Data { .. } => 3,
            SoltradeError::UnknownSeries { .. }
            | SoltradeError::SeriesLengthMismatch { .. }
            | SoltradeError::AliasMismatch { .. } => 4,
            SoltradeError::InvalidArgument { .. }
            | SoltradeError::DuplicateTransaction { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

/// Fails with [`SoltradeError::InvalidArgument`] unless `value` is finite and strictly positive.
pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<f64, SoltradeError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SoltradeError::invalid(
            field,
            format!("must be a finite positive number, got {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_display() {
        let err = SoltradeError::invalid("entry_price", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid argument `entry_price`: must be positive"
        );
    }

    #[test]
    fn length_mismatch_display() {
        let err = SoltradeError::SeriesLengthMismatch {
            alias: "close".into(),
            len: 3,
            expected: 4,
        };
        assert_eq!(
            err.to_string(),
            "series `close` has 3 samples but the timestamp axis has 4"
        );
    }

    #[test]
    fn require_positive_rejects_bad_values() {
        assert!(require_positive("price", 1.5).is_ok());
        assert!(require_positive("price", 0.0).is_err());
        assert!(require_positive("price", -2.0).is_err());
        assert!(require_positive("price", f64::NAN).is_err());
        assert!(require_positive("price", f64::INFINITY).is_err());
    }
}
