//! Error type for type strings

use core::fmt;

/// Why a type string was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantTypeError {
    /// The string is empty
    Empty,

    /// A character that cannot appear at this position
    UnexpectedChar { position: usize, found: char },

    /// The string ends inside a container
    UnexpectedEnd,

    /// Containers nested deeper than `MAX_DEPTH`
    TooDeep,

    /// A complete type is followed by more characters
    TrailingData { position: usize },

    /// The type contains `r`, `*` or `?` and describes no concrete layout
    Indefinite,

    /// The operation needs an array, maybe, tuple or dict entry
    NotAContainer,
}

impl fmt::Display for VariantTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantTypeError::Empty => write!(f, "empty type string"),
            VariantTypeError::UnexpectedChar { position, found } => {
                write!(f, "unexpected '{}' at position {}", found.escape_default(), position)
            }
            VariantTypeError::UnexpectedEnd => write!(f, "type string ends inside a container"),
            VariantTypeError::TooDeep => write!(f, "type nested too deeply"),
            VariantTypeError::TrailingData { position } => {
                write!(f, "trailing characters from position {}", position)
            }
            VariantTypeError::Indefinite => write!(f, "type is not definite"),
            VariantTypeError::NotAContainer => write!(f, "type is not a container"),
        }
    }
}

impl std::error::Error for VariantTypeError {}
