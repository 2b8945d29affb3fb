//! The expression node of the output tree: a shared header (name, stable
//! index, parent/child edges) plus a per-kind payload referencing the graph
//! subject the expression stands for.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::graph::{NodeId, PinId};

/// Handle to an expression slot inside the owning arena.
///
/// Handles are never reused: removing an expression tombstones its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) usize);

impl std::fmt::Display for ExprId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expr#{}", self.0)
    }
}

/// The closed set of expression kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprKind {
    Block,
    Entry,
    CallExtern,
    NoOp,
    Var,
    Literal,
    Assign,
    Copy,
    CachedValue,
    Exit,
    Branch,
    If,
    Select,
}

impl ExprKind {
    /// Capability query over the kind hierarchy: every kind is-a itself,
    /// an `Entry` is-a `Block`, a `Literal` is-a `Var`, and a `Copy` is-a
    /// `Assign`.
    pub fn is_a(self, other: ExprKind) -> bool {
        if self == other {
            return true;
        }
        matches!(
            (self, other),
            (ExprKind::Entry, ExprKind::Block)
                | (ExprKind::Literal, ExprKind::Var)
                | (ExprKind::Copy, ExprKind::Assign)
        )
    }

    /// Fixed-width tag used by the text dump.
    pub(crate) fn type_label(self) -> &'static str {
        match self {
            ExprKind::Block => "[.Block.]",
            ExprKind::Entry => "[.Entry.]",
            ExprKind::CallExtern => "[.Call..]",
            ExprKind::NoOp => "[.NoOp..]",
            ExprKind::Var => "[.Var...]",
            ExprKind::Literal => "[Literal]",
            ExprKind::Assign => "[.Assign]",
            ExprKind::Copy => "[.Copy..]",
            ExprKind::CachedValue => "[.Cache.]",
            ExprKind::Exit => "[.Exit..]",
            ExprKind::Branch => "[Branch.]",
            ExprKind::If => "[..If...]",
            ExprKind::Select => "[Select.]",
        }
    }
}

/// Per-kind payload: the subject reference(s) an expression carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprPayload {
    Block { obsolete: bool },
    Entry { node: NodeId },
    CallExtern { node: NodeId },
    NoOp { node: Option<NodeId> },
    Var { pin: PinId },
    Literal { pin: PinId },
    Assign { source: PinId, target: PinId },
    Copy { source: PinId, target: PinId },
    CachedValue,
    Exit,
    Branch { node: NodeId },
    If { node: NodeId },
    Select { node: NodeId },
}

impl ExprPayload {
    pub fn kind(&self) -> ExprKind {
        match self {
            ExprPayload::Block { .. } => ExprKind::Block,
            ExprPayload::Entry { .. } => ExprKind::Entry,
            ExprPayload::CallExtern { .. } => ExprKind::CallExtern,
            ExprPayload::NoOp { .. } => ExprKind::NoOp,
            ExprPayload::Var { .. } => ExprKind::Var,
            ExprPayload::Literal { .. } => ExprKind::Literal,
            ExprPayload::Assign { .. } => ExprKind::Assign,
            ExprPayload::Copy { .. } => ExprKind::Copy,
            ExprPayload::CachedValue => ExprKind::CachedValue,
            ExprPayload::Exit => ExprKind::Exit,
            ExprPayload::Branch { .. } => ExprKind::Branch,
            ExprPayload::If { .. } => ExprKind::If,
            ExprPayload::Select { .. } => ExprKind::Select,
        }
    }
}

/// One node of the expression tree.
///
/// Parent/child edges are symmetric by construction; all edge mutation goes
/// through the owning [`ExprArena`](super::ExprArena) so that both endpoints
/// stay in sync.
#[derive(Debug, Clone)]
pub struct Expression {
    pub(crate) name: Option<String>,
    pub(crate) index: usize,
    pub(crate) parents: SmallVec<[ExprId; 2]>,
    pub(crate) children: SmallVec<[ExprId; 4]>,
    pub(crate) payload: ExprPayload,
}

impl Expression {
    pub(crate) fn new(payload: ExprPayload, index: usize) -> Self {
        Self {
            name: None,
            index,
            parents: SmallVec::new(),
            children: SmallVec::new(),
            payload,
        }
    }

    pub fn kind(&self) -> ExprKind {
        self.payload.kind()
    }

    pub fn is_a(&self, kind: ExprKind) -> bool {
        self.kind().is_a(kind)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Stable integer index; contiguous `[0, N)` immediately after the
    /// arena's last renumbering pass.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn payload(&self) -> &ExprPayload {
        &self.payload
    }

    pub fn parents(&self) -> &[ExprId] {
        &self.parents
    }

    pub fn children(&self) -> &[ExprId] {
        &self.children
    }

    pub fn num_parents(&self) -> usize {
        self.parents.len()
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn parent_at(&self, index: usize) -> Option<ExprId> {
        self.parents.get(index).copied()
    }

    pub fn child_at(&self, index: usize) -> Option<ExprId> {
        self.children.get(index).copied()
    }

    /// The graph node this expression stands for, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self.payload {
            ExprPayload::Entry { node }
            | ExprPayload::CallExtern { node }
            | ExprPayload::Branch { node }
            | ExprPayload::If { node }
            | ExprPayload::Select { node } => Some(node),
            ExprPayload::NoOp { node } => node,
            _ => None,
        }
    }

    /// The graph pin this expression stands for (Var and Literal only).
    pub fn pin(&self) -> Option<PinId> {
        match self.payload {
            ExprPayload::Var { pin } | ExprPayload::Literal { pin } => Some(pin),
            _ => None,
        }
    }

    /// Source pin of an Assign/Copy expression.
    pub fn source_pin(&self) -> Option<PinId> {
        match self.payload {
            ExprPayload::Assign { source, .. } | ExprPayload::Copy { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Target pin of an Assign/Copy expression.
    pub fn target_pin(&self) -> Option<PinId> {
        match self.payload {
            ExprPayload::Assign { target, .. } | ExprPayload::Copy { target, .. } => Some(target),
            _ => None,
        }
    }

    /// True for the shared block collecting unreached graph regions.
    pub fn is_obsolete_block(&self) -> bool {
        matches!(self.payload, ExprPayload::Block { obsolete: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_a_reflects_the_capability_hierarchy() {
        assert!(ExprKind::Entry.is_a(ExprKind::Block));
        assert!(ExprKind::Entry.is_a(ExprKind::Entry));
        assert!(ExprKind::Literal.is_a(ExprKind::Var));
        assert!(ExprKind::Copy.is_a(ExprKind::Assign));

        assert!(!ExprKind::Block.is_a(ExprKind::Entry));
        assert!(!ExprKind::Var.is_a(ExprKind::Literal));
        assert!(!ExprKind::Assign.is_a(ExprKind::Copy));
        assert!(!ExprKind::CallExtern.is_a(ExprKind::Block));
    }

    #[test]
    fn payload_maps_to_kind() {
        assert_eq!(
            ExprPayload::Block { obsolete: false }.kind(),
            ExprKind::Block
        );
        assert_eq!(ExprPayload::Exit.kind(), ExprKind::Exit);
        assert_eq!(
            ExprPayload::Entry { node: NodeId(0) }.kind(),
            ExprKind::Entry
        );
    }
}
