//! Ownership, borrowing and escape analysis for the Merl compiler.
//!
//! Merl is a statically typed, expression-oriented functional language with
//! algebraic data types, pattern matching and no garbage collector. This
//! crate is the static core that proves, without user-written lifetime
//! annotations, that every value has exactly one owner, that mutable access
//! is exclusive, that no reference outlives its referent, and that values
//! crossing a thread boundary are safe to do so. It also decides, per
//! allocation site, whether storage is placed on the stack or the heap.
//!
//! Input: a typed program tree (see [`tree`]) produced by the upstream
//! inference pass, plus a type-classification oracle (see
//! [`types::ClassOracle`]). Output: an ordered diagnostic list and the
//! allocation/capture/drop metadata consumed by code generation (see
//! [`ownck::AnalysisOutput`]).

pub mod context;
pub mod diag;
pub mod ids;
pub mod ownck;
pub mod scope;
pub mod tree;
pub mod types;
