//! Error types for AST construction and interactive link validation.
//!
//! Structural problems in the input graph surface as [`Diagnostic`]s, either
//! aggregated into an [`AstError`] (strict mode) or recorded on the parsed
//! AST (lenient mode). Link validation failures are ordinary values
//! ([`LinkRejection`]) since they are the expected outcome of interactive
//! editing, not faults.

use std::fmt;

use thiserror::Error;

/// A single structural problem found while traversing the graph.
///
/// `context` names the graph element the problem was found on (a node name,
/// a pin path, or a link representation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub context: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}

/// Errors surfaced by [`BlueprintAst::parse`](crate::BlueprintAst::parse).
#[derive(Debug, Error)]
pub enum AstError {
    /// The graph contains structural errors and the parser ran with
    /// [`ErrorPolicy::Strict`](crate::ErrorPolicy::Strict).
    #[error("graph contains structural errors:\n{}", format_diagnostics(.0))]
    InvalidGraph(Vec<Diagnostic>),
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("  - {d}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Why a proposed link was rejected by
/// [`BlueprintAst::can_link`](crate::BlueprintAst::can_link).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkRejection {
    #[error("one of the provided pins does not exist in the graph")]
    UnknownPin,

    #[error("source and target pins are identical")]
    IdenticalPins,

    #[error("source and target nodes are identical")]
    SameNode,

    #[error("source pin is not an output")]
    SourceNotAnOutput,

    #[error("target pin is not an input")]
    TargetNotAnInput,

    #[error("cannot drive a constant pin from a non-constant value")]
    ConstantMismatch,

    #[error("pin types are not compatible ({source_type} vs {target})")]
    TypeMismatch { source_type: String, target: String },

    #[error("an identical link already exists")]
    AlreadyLinked,

    #[error("node '{0}' is not part of the expression tree")]
    NodeNotInAst(String),

    #[error("cycles are not allowed")]
    CycleDetected,

    #[error("you cannot combine nodes from \"{source_block}\" and \"{target_block}\"")]
    BlocksIncompatible {
        source_block: String,
        target_block: String,
    },
}
