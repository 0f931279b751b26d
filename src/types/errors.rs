//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. Every
//! variant maps onto a stable numeric code from the error-code table so that
//! log lines stay greppable across releases.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the node runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// A core structure could not be built (fatal during bootstrap).
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// Caller misuse, e.g. storing a `none` value in a map.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Index outside `[0, size)`.
    #[error("index {index} out of bounds for size {size}")]
    OutOfBounds { index: isize, size: usize },

    /// Element, key, implementation or queue not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// Tagged-value accessor used against the wrong discriminant.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Persisted document is malformed.
    #[error("config format error: {0}")]
    ConfigFormat(String),

    /// Persisted document names a typename with no registered converter.
    #[error("config not registered: {0}")]
    ConfigNotRegistered(String),

    /// OS resource or permission problem.
    #[error("system call failure: {0}")]
    SystemCall(String),

    /// Non-blocking send against a queue at capacity.
    #[error("queue full: {0}")]
    QueueFull(String),

    /// Internal invariant broken (poisoned lock, join failure).
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Entry in the error-code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    AllocationFailure,
    InvalidArgument,
    OutOfBounds,
    NotFound,
    TypeMismatch,
    ConfigFormat,
    ConfigNotRegistered,
    SystemCall,
    QueueFull,
    Internal,
    Serialization,
}

impl ErrorCode {
    /// Numeric code. Container codes start at 150, serialization at 160,
    /// configuration at 170.
    pub fn number(self) -> u16 {
        match self {
            ErrorCode::AllocationFailure => 12,
            ErrorCode::InvalidArgument => 22,
            ErrorCode::SystemCall => 5,
            ErrorCode::Internal => 131,
            ErrorCode::OutOfBounds => 150,
            ErrorCode::NotFound => 151,
            ErrorCode::TypeMismatch => 152,
            ErrorCode::QueueFull => 153,
            ErrorCode::Serialization => 160,
            ErrorCode::ConfigNotRegistered => 170,
            ErrorCode::ConfigFormat => 171,
        }
    }

    /// Machine-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::AllocationFailure => "ALLOCATION_FAILURE",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::OutOfBounds => "OUT_OF_BOUNDS",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::ConfigFormat => "CONFIG_FORMAT",
            ErrorCode::ConfigNotRegistered => "CONFIG_NOT_REGISTERED",
            ErrorCode::SystemCall => "SYSTEM_CALL",
            ErrorCode::QueueFull => "QUEUE_FULL",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::Serialization => "SERIALIZATION",
        }
    }

    /// Human-readable description.
    pub fn describe(self) -> &'static str {
        match self {
            ErrorCode::AllocationFailure => "Unable to allocate a core structure",
            ErrorCode::InvalidArgument => "Invalid argument",
            ErrorCode::OutOfBounds => "Array index out of bounds",
            ErrorCode::NotFound => "Element not present",
            ErrorCode::TypeMismatch => "Tagged value holds a different type",
            ErrorCode::ConfigFormat => "Configuration document is malformed",
            ErrorCode::ConfigNotRegistered => "No converter registered for configuration typename",
            ErrorCode::SystemCall => "Operating system call failed",
            ErrorCode::QueueFull => "Message queue is at capacity",
            ErrorCode::Internal => "Internal error",
            ErrorCode::Serialization => "Serialization failed",
        }
    }

    /// Reverse lookup by number.
    pub fn from_number(number: u16) -> Option<Self> {
        ALL_CODES.iter().copied().find(|code| code.number() == number)
    }
}

const ALL_CODES: [ErrorCode; 11] = [
    ErrorCode::AllocationFailure,
    ErrorCode::InvalidArgument,
    ErrorCode::OutOfBounds,
    ErrorCode::NotFound,
    ErrorCode::TypeMismatch,
    ErrorCode::ConfigFormat,
    ErrorCode::ConfigNotRegistered,
    ErrorCode::SystemCall,
    ErrorCode::QueueFull,
    ErrorCode::Internal,
    ErrorCode::Serialization,
];

impl Error {
    /// Look up this error's entry in the error-code table.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::AllocationFailure(_) => ErrorCode::AllocationFailure,
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::OutOfBounds { .. } => ErrorCode::OutOfBounds,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            Error::ConfigFormat(_) => ErrorCode::ConfigFormat,
            Error::ConfigNotRegistered(_) => ErrorCode::ConfigNotRegistered,
            Error::SystemCall(_) | Error::Io(_) => ErrorCode::SystemCall,
            Error::QueueFull(_) => ErrorCode::QueueFull,
            Error::Internal(_) => ErrorCode::Internal,
            Error::Serialization(_) => ErrorCode::Serialization,
        }
    }

    /// Recoverable container misuse; the caller decides what to do.
    pub fn is_container_misuse(&self) -> bool {
        matches!(
            self,
            Error::OutOfBounds { .. } | Error::NotFound(_) | Error::TypeMismatch { .. }
        )
    }
}

// Convenience constructors
impl Error {
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::AllocationFailure(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn config_format(msg: impl Into<String>) -> Self {
        Self::ConfigFormat(msg.into())
    }

    pub fn config_not_registered(msg: impl Into<String>) -> Self {
        Self::ConfigNotRegistered(msg.into())
    }

    pub fn system_call(msg: impl Into<String>) -> Self {
        Self::SystemCall(msg.into())
    }

    pub fn queue_full(msg: impl Into<String>) -> Self {
        Self::QueueFull(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
