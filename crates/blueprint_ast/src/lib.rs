//! # Blueprint AST
//!
//! Compiler front-end for visual node graphs: takes a graph of nodes, pins
//! and links and produces a typed, folded expression tree ready for a
//! bytecode backend.
//!
//! ## Overview
//!
//! - [`graph`] — the read-only node/pin/link model the parser consumes.
//! - [`ast`] — the expression model: kinds, arena storage, subject mapping.
//! - [`parser`] — graph traversal, the folding pipeline, the interactive
//!   cycle/link validator, and the debug dumps.
//!
//! ## Example
//!
//! ```
//! use blueprint_ast::{AstSettings, BlueprintAst, ExprKind};
//! use blueprint_ast::graph::{GraphDescription, Node, PinDirection};
//!
//! let mut graph = GraphDescription::new("demo");
//! let mut update = Node::event("Update", "Update");
//! update.add_exec_pin("ExecuteContext", PinDirection::Output);
//! graph.add_node(update);
//!
//! let ast = BlueprintAst::parse(&graph, AstSettings::optimized()).unwrap();
//! let entry = ast.roots()[0];
//! assert_eq!(ast.expr(entry).kind(), ExprKind::Entry);
//! ```
//!
//! The whole pipeline is single-threaded and synchronous: one `parse` call
//! builds and folds the tree to completion. The tree borrows the graph, so
//! the graph cannot change underneath the validator — rebuild after edits.

pub mod ast;
pub mod error;
pub mod graph;
pub mod parser;

pub use ast::{ExprArena, ExprId, ExprKind, ExprPayload, Expression, Subject};
pub use error::{AstError, Diagnostic, LinkRejection};
pub use parser::{AstSettings, BlueprintAst, CycleCheckState, ErrorPolicy, TraverseRelationship};
