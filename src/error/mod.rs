use std::fmt;

pub mod testing;

/// Main error type for the deferred update scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerError {
    // ============ Update Errors ============
    /// An update's action failed while being drained
    UpdateFailed {
        kind: String,
        reason: String,
    },

    // ============ Transaction Round Errors ============
    /// Round operation attempted under a label that does not own the round
    RoundOwnership {
        expected: String,
        actual: String,
    },

    /// Tried to open a round while one is already open
    RoundAlreadyOpen {
        owner: String,
    },

    /// Round operation requires an open round
    NoOpenRound {
        operation: String,
    },

    /// Round posture did not match what an update requires (scheduler defect)
    RoundPostureViolation {
        kind: String,
        detail: String,
    },

    // ============ Job Queue Errors ============
    /// The job queue refused a spilled update
    JobSubmitFailed {
        domain: String,
        reason: String,
    },

    // ============ Programming Errors ============
    /// Owner, origin or job type label is malformed
    InvalidLabel {
        label: String,
        reason: String,
    },

    // ============ Configuration / I/O Errors ============
    /// Configuration error (invalid setting values)
    ConfigError {
        setting: String,
        value: String,
        reason: String,
    },

    /// Serialization/deserialization failed
    SerializationError {
        message: String,
    },

    /// Internal error (bug in the scheduler)
    InternalError {
        message: String,
        file: &'static str,
        line: u32,
    },
}

impl SchedulerError {
    /// Error class, following the taxonomy used by callers to decide what to do
    pub fn class(&self) -> &'static str {
        use SchedulerError::*;
        match self {
            UpdateFailed { .. } => "update",

            RoundOwnership { .. } => "transaction",
            RoundAlreadyOpen { .. } => "transaction",
            NoOpenRound { .. } => "transaction",
            RoundPostureViolation { .. } => "internal",

            JobSubmitFailed { .. } => "queue",

            InvalidLabel { .. } => "programming",

            ConfigError { .. } => "config",
            SerializationError { .. } => "serialization",
            InternalError { .. } => "internal",
        }
    }

    /// Whether a caller may reasonably retry or continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self.class(), "update" | "queue")
    }

    /// Wrap an arbitrary failure raised by an update's action
    pub fn update_failed(kind: impl Into<String>, reason: impl fmt::Display) -> Self {
        SchedulerError::UpdateFailed {
            kind: kind.into(),
            reason: reason.to_string(),
        }
    }

    /// Create internal error with file/line info
    pub fn internal(message: String, file: &'static str, line: u32) -> Self {
        SchedulerError::InternalError { message, file, line }
    }
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SchedulerError::*;
        match self {
            UpdateFailed { kind, reason } => {
                write!(f, "Deferred update '{}' failed: {}", kind, reason)
            }
            RoundOwnership { expected, actual } => {
                write!(f, "Transaction round is owned by '{}', not '{}'", expected, actual)
            }
            RoundAlreadyOpen { owner } => {
                write!(f, "Transaction round already open (owner '{}')", owner)
            }
            NoOpenRound { operation } => {
                write!(f, "No transaction round open for '{}'", operation)
            }
            RoundPostureViolation { kind, detail } => {
                write!(f, "Round posture violated while running '{}': {}\nPlease report this bug.",
                       kind, detail)
            }
            JobSubmitFailed { domain, reason } => {
                write!(f, "Failed to submit job to domain '{}': {}", domain, reason)
            }
            InvalidLabel { label, reason } => {
                write!(f, "Invalid label '{}': {}", label, reason)
            }
            ConfigError { setting, value, reason } => {
                write!(f, "Configuration error for '{}': {} (value: {})", setting, reason, value)
            }
            SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
            InternalError { message, file, line } => {
                write!(f, "Internal error at {}:{}: {}\nPlease report this bug.",
                       file, line, message)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Convert serde_json::Error to SchedulerError
impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        SchedulerError::SerializationError {
            message: format!("JSON serialization error: {}", e),
        }
    }
}

/// Convert regex::Error to SchedulerError
impl From<regex::Error> for SchedulerError {
    fn from(e: regex::Error) -> Self {
        SchedulerError::internal(format!("Regex compilation failed: {}", e), file!(), line!())
    }
}

/// Convert std::io::Error to SchedulerError
impl From<std::io::Error> for SchedulerError {
    fn from(e: std::io::Error) -> Self {
        SchedulerError::SerializationError {
            message: format!("I/O error: {}", e),
        }
    }
}

/// Helper macro for creating internal errors with automatic file/line
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::SchedulerError::internal($msg.to_string(), file!(), line!())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::SchedulerError::internal(format!($fmt, $($arg)*), file!(), line!())
    };
}
