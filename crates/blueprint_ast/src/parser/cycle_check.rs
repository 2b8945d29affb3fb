//! Interactive link validation: answers "would connecting these two pins
//! introduce a cycle or cross incompatible execution blocks" against the
//! already-built tree, without mutating it.
//!
//! The expensive part is a two-direction flood fill from a prepared anchor
//! expression; the per-expression flag array is kept between calls, so
//! repeated queries against a stable anchor reuse the previous fill.

use crate::ast::ExprId;
use crate::error::LinkRejection;
use crate::graph::{PinId, WILDCARD_TYPE};

use super::BlueprintAst;

/// How an expression relates to the prepared anchor after a flood fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraverseRelationship {
    #[default]
    Unknown,
    Parent,
    Child,
    SelfExpr,
}

/// Flood-fill state for cycle checking: the anchor expression of the most
/// recent [`BlueprintAst::prepare_cycle_checking`] call plus one relationship
/// flag per expression slot. Reset whenever the anchor changes.
#[derive(Debug, Default)]
pub struct CycleCheckState {
    anchor: Option<ExprId>,
    flags: Vec<TraverseRelationship>,
}

impl CycleCheckState {
    fn reset(&mut self) {
        self.anchor = None;
        self.flags.clear();
    }

    fn rebase(&mut self, anchor: ExprId, num_slots: usize) {
        self.anchor = Some(anchor);
        self.flags.clear();
        self.flags.resize(num_slots, TraverseRelationship::Unknown);
        self.flags[anchor.0] = TraverseRelationship::SelfExpr;
    }
}

impl<'g> BlueprintAst<'g> {
    /// Anchor the cycle checker on the node owning `pin`. Passing `None`
    /// clears all state (used when the editing session moves elsewhere).
    ///
    /// Re-preparing with the same anchor keeps the previous flood fill.
    pub fn prepare_cycle_checking(&mut self, pin: Option<PinId>) {
        let Some(pin) = pin else {
            self.cycle.reset();
            return;
        };

        let Some(expr) = self.expr_for_node(pin.node) else {
            return;
        };

        if self.cycle.anchor != Some(expr) {
            self.cycle.rebase(expr, self.arena.num_slots());
        }
    }

    /// Would a link from `source` to `target` be legal on the current tree?
    ///
    /// Rejections are ordinary values; the tree is never mutated beyond the
    /// cached flood-fill flags.
    pub fn can_link(&mut self, source: PinId, target: PinId) -> Result<(), LinkRejection> {
        let graph = self.graph;
        let (Some(source_pin), Some(target_pin)) = (graph.get_pin(source), graph.get_pin(target))
        else {
            return Err(LinkRejection::UnknownPin);
        };

        if source == target {
            return Err(LinkRejection::IdenticalPins);
        }
        if source.node == target.node {
            return Err(LinkRejection::SameNode);
        }
        if !source_pin.direction.is_output() {
            return Err(LinkRejection::SourceNotAnOutput);
        }
        if !target_pin.direction.is_input() {
            return Err(LinkRejection::TargetNotAnInput);
        }
        if target_pin.constant && !source_pin.constant {
            return Err(LinkRejection::ConstantMismatch);
        }
        if !pin_types_compatible(source_pin.cpp_type.as_str(), target_pin.cpp_type.as_str())
            || source_pin.execute_context != target_pin.execute_context
        {
            return Err(LinkRejection::TypeMismatch {
                source_type: source_pin.cpp_type.clone(),
                target: target_pin.cpp_type.clone(),
            });
        }
        if graph.has_link(source, target) {
            return Err(LinkRejection::AlreadyLinked);
        }

        let source_expr = self
            .expr_for_node(source.node)
            .ok_or_else(|| LinkRejection::NodeNotInAst(graph.node(source.node).name.clone()))?;
        let target_expr = self
            .expr_for_node(target.node)
            .ok_or_else(|| LinkRejection::NodeNotInAst(graph.node(target.node).name.clone()))?;

        let (Some(source_block), Some(target_block)) =
            (self.block_of(source_expr), self.block_of(target_expr))
        else {
            return Err(LinkRejection::BlocksIncompatible {
                source_block: String::new(),
                target_block: String::new(),
            });
        };

        let related = source_block == target_block
            || self.block_contains(source_block, target_block)
            || self.block_contains(target_block, source_block)
            || self
                .root_block_of(target_block)
                .is_some_and(|root| self.block_contains(root, source_block))
            || self
                .root_block_of(source_block)
                .is_some_and(|root| self.block_contains(root, target_block));

        if !related {
            // crossing between an executed region and an unreached one is
            // fine; combining two live execution blocks is not
            let source_live = self
                .root_block_of(source_block)
                .is_some_and(|root| self.contains_entry(root));
            let target_live = self
                .root_block_of(target_block)
                .is_some_and(|root| self.contains_entry(root));
            if source_live != target_live {
                return Ok(());
            }
            return Err(LinkRejection::BlocksIncompatible {
                source_block: self.block_name(source_block),
                target_block: self.block_name(target_block),
            });
        }

        if self.cycle.anchor != Some(source_expr) && self.cycle.anchor != Some(target_expr) {
            self.prepare_cycle_checking(Some(source));
        }
        let anchor = self.cycle.anchor.expect("anchor prepared above");

        let mut flags = std::mem::take(&mut self.cycle.flags);
        self.mark_parents(anchor, &mut flags);
        self.mark_children(anchor, &mut flags);
        self.cycle.flags = flags;

        let found_cycle = if anchor == source_expr {
            self.cycle.flags[target_expr.0] == TraverseRelationship::Child
        } else {
            self.cycle.flags[source_expr.0] == TraverseRelationship::Parent
        };

        if found_cycle {
            return Err(LinkRejection::CycleDetected);
        }
        Ok(())
    }

    fn block_name(&self, block: ExprId) -> String {
        let expr = self.arena.expr(block);
        if expr.is_obsolete_block() {
            return "Unused".to_string();
        }
        expr.name().unwrap_or("Block").to_string()
    }

    /// Flood upward, marking everything above the anchor as Parent. A node
    /// already marked stops the walk; the anchor itself is walked through
    /// without being overwritten.
    fn mark_parents(&self, id: ExprId, flags: &mut [TraverseRelationship]) {
        match flags[id.0] {
            TraverseRelationship::SelfExpr => {}
            TraverseRelationship::Unknown => flags[id.0] = TraverseRelationship::Parent,
            _ => return,
        }
        for parent in self.arena.expr(id).parents() {
            self.mark_parents(*parent, flags);
        }
    }

    /// Flood downward, marking everything below the anchor as Child.
    fn mark_children(&self, id: ExprId, flags: &mut [TraverseRelationship]) {
        match flags[id.0] {
            TraverseRelationship::SelfExpr => {}
            TraverseRelationship::Unknown => flags[id.0] = TraverseRelationship::Child,
            _ => return,
        }
        for child in self.arena.expr(id).children() {
            self.mark_children(*child, flags);
        }
    }
}

fn pin_types_compatible(source: &str, target: &str) -> bool {
    source == target || source == WILDCARD_TYPE || target == WILDCARD_TYPE
}
