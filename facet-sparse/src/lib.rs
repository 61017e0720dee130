#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

extern crate alloc;

mod tracing_macros;
pub(crate) use tracing_macros::{debug, trace};

mod error;
pub use error::FormatError;

pub mod fieldset;
pub use fieldset::{FieldKey, KeyOrder, check_duplicates, parse_fields};

pub mod descriptor;
pub use descriptor::{FieldNode, NodeKind, StructNode, TypeDescriptor, TypeNode};

mod builder;
pub use builder::Builder;

mod formatter;
pub use formatter::Formatter;

mod cache;

mod sparse;
pub use sparse::{CacheStats, Sparse, SparseConfig, SparseFormatter};
