//! Error types for mainctx

use core::fmt;

/// Result type for instance-kit and runtime operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur when constructing instances, registering
/// types or configuring the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Allocation of an instance or table failed
    AllocationFailure,

    /// The type exists but cannot be instantiated (abstract)
    TypeNotConstructible(String),

    /// A type with this name is already registered
    TypeAlreadyRegistered(String),

    /// No type registered under this tag
    UnknownType(u32),

    /// The type already declares a signal with this name
    SignalAlreadyRegistered {
        type_name: String,
        signal: String,
    },

    /// Configuration value out of range
    InvalidConfig(&'static str),

    /// Process-wide state was already initialized
    AlreadyInitialized,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::AllocationFailure => write!(f, "allocation failed"),
            CoreError::TypeNotConstructible(name) => {
                write!(f, "type '{}' is not constructible", name)
            }
            CoreError::TypeAlreadyRegistered(name) => {
                write!(f, "type '{}' is already registered", name)
            }
            CoreError::UnknownType(tag) => write!(f, "unknown type tag {}", tag),
            CoreError::SignalAlreadyRegistered { type_name, signal } => {
                write!(f, "signal '{}' already registered on '{}'", signal, type_name)
            }
            CoreError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            CoreError::AlreadyInitialized => write!(f, "already initialized"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<std::collections::TryReserveError> for CoreError {
    fn from(_: std::collections::TryReserveError) -> Self {
        CoreError::AllocationFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = CoreError::TypeNotConstructible("Monitor".into());
        assert_eq!(format!("{}", e), "type 'Monitor' is not constructible");

        let e = CoreError::SignalAlreadyRegistered {
            type_name: "Monitor".into(),
            signal: "changed".into(),
        };
        assert_eq!(format!("{}", e), "signal 'changed' already registered on 'Monitor'");
    }

    #[test]
    fn test_error_conversion() {
        let mut v: Vec<u8> = Vec::new();
        let err = v.try_reserve(usize::MAX).unwrap_err();
        let core: CoreError = err.into();
        assert_eq!(core, CoreError::AllocationFailure);
    }
}
