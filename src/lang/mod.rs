//! # Monkey language model
//!
//! The syntax tree produced by the parser and consumed by both engines, the
//! runtime value model, and the builtin function table.
//!
//! ## Layout
//!
//! - `node` / `program`: statements and expressions.
//! - `value`: runtime values, hash keys, closures.
//! - `builtins`: host functions addressable by index from bytecode.
//! - `environment`: name bindings of the tree-walking evaluator.

pub mod builtins;
pub mod environment;
pub mod node;
pub mod program;
pub mod value;
