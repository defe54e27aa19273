//! # mainctx-variant
//!
//! Variant type strings and the interned type info cache.
//!
//! ## Modules
//!
//! - `type_string` - Grammar, validation and depth of type strings
//! - `info` - Alignment, fixed size and tuple offset tables per type
//! - `error` - Why a type string was rejected

pub mod error;
pub mod info;
pub mod type_string;

pub use error::VariantTypeError;
pub use info::{BasicInfo, ContainerInfo, Layout, MemberEnding, MemberInfo, TypeInfo, NO_OFFSET};
