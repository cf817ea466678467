use crate::filter::FilterError;
use crate::geometry::Rect;
use std::time::Duration;
use thiserror::Error;

/// Faults raised by an inference adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("Batch rejected by adapter: {0}")]
    Rejected(String),

    #[error("Batch did not complete within {0:?}")]
    Timeout(Duration),

    #[error("Batch {0} was cancelled")]
    Cancelled(u64),

    #[error("Unknown batch handle {0}")]
    UnknownHandle(u64),

    #[error("Adapter worker disconnected")]
    Disconnected,

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Adapter returned {actual} outputs for a batch of {expected}")]
    OutputCountMismatch { expected: usize, actual: usize },
}

/// A raw output that could not be turned into a result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Unexpected output shape: expected {expected} values, got {actual}")]
    Shape { expected: usize, actual: usize },

    #[error("Invalid output value: {0}")]
    InvalidValue(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("Invalid region at {location}: {reason}")]
    InvalidRegion {
        location: Rect,
        reason: &'static str,
    },

    #[error("Crop buffer full ({capacity} items)")]
    BatchFull { capacity: usize },

    #[error("A batch is already in flight")]
    BatchInFlight,

    #[error("Submission failed: {0}")]
    SubmissionFailed(#[source] AdapterError),

    #[error("Failed to decode output {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: DecodeError,
    },

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),

    #[error("Result index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Output sink failed: {0}")]
    Sink(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display_formatting() {
        let err = LifecycleError::InvalidRegion {
            location: Rect::new(0, 0, 0, 10),
            reason: "zero-area crop",
        };
        assert_eq!(
            err.to_string(),
            "Invalid region at (0, 0, 0x10): zero-area crop"
        );

        let err = LifecycleError::BatchFull { capacity: 16 };
        assert_eq!(err.to_string(), "Crop buffer full (16 items)");

        let err = LifecycleError::IndexOutOfRange { index: 3, len: 2 };
        assert_eq!(err.to_string(), "Result index 3 out of range (len 2)");

        let err = AdapterError::OutputCountMismatch {
            expected: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Adapter returned 3 outputs for a batch of 4"
        );
    }

    #[test]
    fn test_error_conversion_from_adapter_error() {
        fn fails() -> Result<(), AdapterError> {
            Err(AdapterError::Disconnected)
        }

        fn uses_question_mark() -> Result<(), LifecycleError> {
            fails()?;
            Ok(())
        }

        match uses_question_mark() {
            Err(LifecycleError::Adapter(AdapterError::Disconnected)) => {}
            other => panic!("Expected Adapter(Disconnected), got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_exposes_source() {
        let err = LifecycleError::Decode {
            index: 1,
            source: DecodeError::Shape {
                expected: 6,
                actual: 5,
            },
        };

        let source = err.source().expect("decode error should carry a source");
        assert_eq!(
            source.to_string(),
            "Unexpected output shape: expected 6 values, got 5"
        );
    }
}
