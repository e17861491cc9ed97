//! Error types and context management for core operations.

use std::fmt;

/// Main error type for all core operations.
#[derive(Debug)]
pub enum CoreError {
    /// Build was given zero example maps.
    ZeroMaps,

    /// One of the example maps has no layers.
    NullMaps,

    /// Example maps disagree on layer count.
    MismatchedLayers {
        /// Layer count expected from the first map seen.
        expected: usize,
        /// Layer count found on a later map.
        found: usize,
    },

    /// An example map's `commonality` weight is negative, or the total
    /// across all maps is non-positive.
    InvalidCommonality {
        /// Description of which map/total failed validation.
        reason: String,
    },

    /// A weight, bias, or loss value went non-finite during training.
    NumericFault {
        /// Name of the operation that produced the fault.
        operation: &'static str,
        /// Description of the failure.
        reason: String,
    },

    /// Training was stopped via the cooperative `abort` signal; weights are
    /// left in whatever state the worker reached.
    Cancelled,

    /// No consistent assignment exists and `forceful` is disabled.
    Unsatisfiable,

    /// No consistent assignment exists even with `forceful` enabled.
    BorderImpossible,

    /// The tilemap adapter's layer count disagrees with the generator's.
    LayerCountMismatch {
        /// Layer count the generator was trained with.
        expected: usize,
        /// Layer count reported by the adapter.
        found: usize,
    },

    /// Generate was called against a generator with no registered tiles.
    EmptyUniqueTileSet,

    /// Algorithm parameter validation failed.
    InvalidParameter {
        /// Name of the invalid parameter.
        parameter: &'static str,
        /// Provided value that failed validation.
        value: String,
        /// Explanation of why the value is invalid.
        reason: String,
    },

    /// General file system operation failure.
    FileSystem {
        /// Description of the operation that failed.
        operation: &'static str,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to (de)serialize persisted generator state.
    Persistence {
        /// Description of the operation that failed.
        operation: &'static str,
        /// Underlying serialization error.
        source: serde_json::Error,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroMaps => write!(f, "build was given zero example maps"),
            Self::NullMaps => write!(f, "an example map has no layers"),
            Self::MismatchedLayers { expected, found } => write!(
                f,
                "example maps disagree on layer count (expected {expected}, found {found})"
            ),
            Self::InvalidCommonality { reason } => {
                write!(f, "invalid commonality weighting: {reason}")
            }
            Self::NumericFault { operation, reason } => {
                write!(f, "numeric fault in {operation}: {reason}")
            }
            Self::Cancelled => write!(f, "build was cancelled"),
            Self::Unsatisfiable => write!(f, "no consistent assignment exists"),
            Self::BorderImpossible => {
                write!(f, "no consistent assignment exists even with forceful repair")
            }
            Self::LayerCountMismatch { expected, found } => write!(
                f,
                "tilemap adapter has {found} layers, generator expects {expected}"
            ),
            Self::EmptyUniqueTileSet => {
                write!(f, "generator has no registered tiles")
            }
            Self::InvalidParameter {
                parameter,
                value,
                reason,
            } => write!(f, "invalid parameter '{parameter}' = '{value}': {reason}"),
            Self::FileSystem { operation, source } => {
                write!(f, "file system error during {operation}: {source}")
            }
            Self::Persistence { operation, source } => {
                write!(f, "persistence error during {operation}: {source}")
            }
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FileSystem { source, .. } => Some(source),
            Self::Persistence { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience type alias for core results.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Additional context to enrich error messages.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Current training epoch.
    pub epoch: Option<usize>,
    /// World coordinates where the error occurred.
    pub position: Option<[i32; 2]>,
    /// Operation being performed.
    pub operation: Option<&'static str>,
}

/// Enriches error messages with core operation state.
pub trait WithContext<T> {
    /// Adds error context to a `Result`.
    ///
    /// # Errors
    ///
    /// Propagates the original error with additional context applied.
    fn with_context(self, context: ErrorContext) -> Result<T>;

    /// Adds just the operation context.
    ///
    /// # Errors
    ///
    /// Propagates the original error with the operation context applied.
    fn with_operation(self, operation: &'static str) -> Result<T>;
}

impl<T, E> WithContext<T> for std::result::Result<T, E>
where
    E: Into<CoreError>,
{
    fn with_context(self, context: ErrorContext) -> Result<T> {
        self.map_err(|e| {
            let mut error = e.into();
            if let CoreError::NumericFault { reason, .. } = &mut error {
                if let Some(op) = context.operation {
                    *reason = format!("{reason} (during {op})");
                }
            }
            error
        })
    }

    fn with_operation(self, operation: &'static str) -> Result<T> {
        self.with_context(ErrorContext {
            operation: Some(operation),
            ..Default::default()
        })
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            operation: "unknown",
            source: err,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence {
            operation: "unknown",
            source: err,
        }
    }
}

/// Creates an invalid-parameter error.
pub fn invalid_parameter(
    parameter: &'static str,
    value: &impl ToString,
    reason: &impl ToString,
) -> CoreError {
    CoreError::InvalidParameter {
        parameter,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_context_annotates_numeric_fault_reason() {
        let result: std::result::Result<(), CoreError> = Err(CoreError::NumericFault {
            operation: "train_step",
            reason: "nan".to_string(),
        });

        let err = result.with_operation("epoch_loop").unwrap_err();
        match err {
            CoreError::NumericFault { reason, .. } => {
                assert!(reason.contains("epoch_loop"));
            }
            other => unreachable!("expected NumericFault, got {other:?}"),
        }
    }

    #[test]
    fn display_messages_are_non_empty() {
        assert!(!CoreError::ZeroMaps.to_string().is_empty());
        assert!(!CoreError::Unsatisfiable.to_string().is_empty());
    }
}
