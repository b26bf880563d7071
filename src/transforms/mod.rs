//! AST-to-AST lowering transforms.
//!
//! # Architecture
//!
//! Transforms mutate the arena AST in place and never emit text themselves;
//! the printer handles all string emission afterwards. This separation keeps
//! the lowering logic testable on tree shapes and lets the printer own
//! formatting concerns.
//!
//! The only transform in this crate is the generator lowering: it rewrites
//! `function*` bodies into switch-driven state machine programs over a small
//! runtime context object.

pub mod generators;
