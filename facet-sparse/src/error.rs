//! Errors returned while validating, compiling, or applying a field set.

use alloc::string::String;
use alloc::vec::Vec;

use facet_core::Shape;

/// Error returned by [`SparseFormatter`](crate::SparseFormatter) and the plans it caches.
///
/// Every variant describes a problem with the request itself (the field list
/// or the type it was applied to), so callers usually surface these as client
/// validation errors.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum FormatError {
    /// The field list names one or more paths more than once.
    DuplicateFields {
        /// Each duplicated path, once, in order of first occurrence.
        fields: Vec<String>,
    },

    /// The root type does not reach a struct through option, pointer, or
    /// sequence wrappers, so there is nothing to select fields from.
    UnsupportedType {
        /// The rejected root shape.
        shape: &'static Shape,
    },

    /// A path segment does not name a selectable field.
    ///
    /// Also raised when a path continues past a field that has no fields of
    /// its own, like `name.first` on a `String`.
    FieldNotFound {
        /// The full path as requested, including any prefix.
        path: String,
        /// The segment that could not be resolved.
        segment: String,
        /// The shape that was searched for `segment`.
        shape: &'static Shape,
    },

    /// A formatter was applied to a value of a different type than it was
    /// compiled for.
    TypeMismatch {
        /// The shape the formatter was compiled for.
        expected: &'static Shape,
        /// The shape of the value it was given.
        actual: &'static Shape,
    },

    /// Reflection or value conversion failed while walking a value.
    Traversal {
        /// The shape being walked when the failure happened.
        shape: &'static Shape,
        /// The underlying failure, rendered.
        message: String,
    },
}

impl FormatError {
    pub(crate) fn not_found(path: &str, segment: &str, shape: &'static Shape) -> Self {
        FormatError::FieldNotFound {
            path: path.into(),
            segment: segment.into(),
            shape,
        }
    }

    pub(crate) fn traversal(shape: &'static Shape, err: impl core::fmt::Display) -> Self {
        FormatError::Traversal {
            shape,
            message: alloc::format!("{err}"),
        }
    }
}

impl core::fmt::Display for FormatError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FormatError::DuplicateFields { fields } => {
                write!(f, "duplicate fields detected: {}", fields.join(", "))
            }
            FormatError::UnsupportedType { shape } => {
                write!(
                    f,
                    "unsupported type {shape}: expected a struct, or an option, pointer, or sequence of structs"
                )
            }
            FormatError::FieldNotFound {
                path,
                segment,
                shape,
            } => {
                write!(f, "field '{segment}' not found in {shape} (path '{path}')")
            }
            FormatError::TypeMismatch { expected, actual } => {
                write!(
                    f,
                    "type mismatch: formatter compiled for {expected}, value is {actual}"
                )
            }
            FormatError::Traversal { shape, message } => {
                write!(f, "failed to read {shape}: {message}")
            }
        }
    }
}

impl core::error::Error for FormatError {}
