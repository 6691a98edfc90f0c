use thiserror::Error;

/// Failures reported by the integration boundary and the analysis helpers.
///
/// All of these are structural: they are detected before any stepping takes
/// place (or, for [`EpidemicError::ConvergenceFailure`], by an iterative
/// solve that gave up), and retrying with the same inputs yields the same
/// error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EpidemicError {
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("state dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Newton solve failed to converge in {iterations} steps (|g(x)| = {residual})")]
    ConvergenceFailure { iterations: usize, residual: f64 },
}

impl EpidemicError {
    pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, EpidemicError>;

/// Rejects NaN and infinities.
pub(crate) fn ensure_finite(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EpidemicError::invalid(name, value, "must be finite"))
    }
}

/// Rejects negative (and non-finite) values.
pub(crate) fn ensure_non_negative(name: &'static str, value: f64) -> Result<()> {
    ensure_finite(name, value)?;
    if value < 0.0 {
        return Err(EpidemicError::invalid(name, value, "must be non-negative"));
    }
    Ok(())
}

/// Rejects zero, negative and non-finite values.
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<()> {
    ensure_finite(name, value)?;
    if value <= 0.0 {
        return Err(EpidemicError::invalid(name, value, "must be positive"));
    }
    Ok(())
}
