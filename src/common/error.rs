//! Error types for the capture pipeline.

use crate::common::{Pid, RegionHandle};

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors surfaced by the pipeline.
///
/// None of them is fatal: every variant is recoverable at the call site.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error, e.g. the deferred worker thread could not be spawned.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request cannot fit in a single page next to its bookkeeping.
    #[error("allocation of {requested} bytes exceeds the per-page maximum of {max}")]
    OutOfCapacity { requested: usize, max: usize },

    /// The page source refused to hand out another page.
    #[error("allocation of {requested} bytes failed: no page available")]
    AllocationExhausted { requested: usize },

    /// The handle does not name a live region.
    #[error("invalid region handle {handle}")]
    InvalidHandle { handle: RegionHandle },

    /// A blocking wait was cancelled by a signal.
    ///
    /// The operation had no side effects and may be restarted.
    #[error("interrupted by signal, restart the call")]
    Interrupted,

    /// A copy across the external boundary faulted.
    #[error("copy across the user boundary faulted after {transferred} bytes")]
    BoundaryCopyFault { transferred: usize },

    /// The caller does not own the device.
    #[error("{pid} does not own the device")]
    NotOwner { pid: Pid },

    /// The sample source refused handler registration.
    #[error("sample source registration failed: {0}")]
    SourceRegistration(String),

    /// A configuration value was rejected.
    #[error("invalid configuration for {parameter}: {message}")]
    InvalidConfig { parameter: String, message: String },
}

impl Error {
    /// Create an invalid-configuration error.
    pub fn invalid_config(parameter: &str, message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }

    /// Whether the caller may simply retry the call.
    pub fn is_restartable(&self) -> bool {
        matches!(self, Error::Interrupted)
    }

    /// Whether this error comes from the page allocator running dry.
    pub fn is_allocation_failure(&self) -> bool {
        matches!(
            self,
            Error::OutOfCapacity { .. } | Error::AllocationExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::OutOfCapacity {
            requested: 5000,
            max: 4048,
        };
        assert_eq!(
            format!("{}", err),
            "allocation of 5000 bytes exceeds the per-page maximum of 4048"
        );

        let err = Error::BoundaryCopyFault { transferred: 3 };
        assert_eq!(
            format!("{}", err),
            "copy across the user boundary faulted after 3 bytes"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "spawn failed");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(format!("{}", err), "I/O error: spawn failed");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::Interrupted.is_restartable());
        assert!(!Error::AllocationExhausted { requested: 1 }.is_restartable());
        assert!(Error::AllocationExhausted { requested: 1 }.is_allocation_failure());
        assert!(!Error::Interrupted.is_allocation_failure());
    }

    #[test]
    fn test_result_type_alias() {
        fn might_fail() -> Result<u32> {
            Ok(42)
        }

        assert_eq!(might_fail().unwrap(), 42);
    }
}
