//! Query construction and compilation.
//!
//! `predicate` is the pure expression tree, `queryset` the immutable lazy
//! builder over one schema, and `compile` the per-backend rendering of a
//! tree into a native operation.

pub mod compile;
pub mod predicate;
pub mod queryset;

pub use compile::{CompileError, CompiledOp, NativeOp};
pub use predicate::{CompareOp, Predicate};
pub use queryset::{OrderDirection, QuerySet};
