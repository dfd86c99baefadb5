//! Typed mount point properties.
//!
//! Mount point attributes arrive as strings. An attribute `k` paired with a
//! `kDatatype` sibling is coerced to that declared type; everything else is
//! passed through as a string.

mod extract;

pub use extract::{extract, DeclaredType, PropertyValue, TypeCoercionError, TypedProperties};
