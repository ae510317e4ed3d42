//! Core protocol primitives.
//!
//! Leaf components with no knowledge of HTTP or match state: the
//! s-expression codec every message depends on, and the clock-derived
//! deadlines threaded through every user callback.

pub mod deadline;
pub mod sexpr;

// Re-export core types
pub use deadline::Deadline;
pub use sexpr::{SExpr, SexprError};
