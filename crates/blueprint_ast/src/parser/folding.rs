//! Folding passes: rewrites over the expression tree that collapse
//! redundant structure while preserving semantics.
//!
//! The passes run in a fixed order after the initial build (see
//! [`BlueprintAst::parse`]): entries with the same event name merge, every
//! entry gets a terminal exit, no-ops are spliced out, constant branches are
//! eliminated to a fixpoint, multi-block cached values bubble up, assignment
//! chains collapse, and duplicate literals deduplicate. Every pass leaves
//! parent/child lists symmetric and the subject map accurate, and every pass
//! tolerates the structures an earlier, disabled pass would have removed.

use std::collections::HashMap;

use tracing::trace;

use crate::ast::{ExprId, ExprKind, ExprPayload, Subject};
use crate::graph::{NodeKind, PinDirection, PinId};

use super::BlueprintAst;

fn push_unique(list: &mut Vec<ExprId>, id: ExprId) {
    if !list.contains(&id) {
        list.push(id);
    }
}

impl<'g> BlueprintAst<'g> {
    /// Merge root entries sharing an event name. The first becomes
    /// canonical; later ones dissolve into it, leaving a NoOp behind so
    /// their node still resolves through the subject map. Execute-context
    /// vars of dissolved entries are dropped outright since the canonical
    /// entry already owns one.
    pub(super) fn fold_entries(&mut self) {
        let mut fold_roots: Vec<ExprId> = Vec::new();
        let mut to_remove: Vec<ExprId> = Vec::new();
        let mut entry_by_name: HashMap<String, ExprId> = HashMap::new();

        for root in self.roots.clone() {
            if !self.arena.expr(root).is_a(ExprKind::Entry) {
                fold_roots.push(root);
                continue;
            }

            let event_name = self
                .arena
                .expr(root)
                .name()
                .unwrap_or_default()
                .to_string();
            let node = self
                .arena
                .expr(root)
                .node()
                .expect("entry expressions are node-backed");

            let Some(canonical) = entry_by_name.get(&event_name).copied() else {
                entry_by_name.insert(event_name, root);
                fold_roots.push(root);
                continue;
            };

            trace!(event = %event_name, "merging duplicate entry");

            let children: Vec<ExprId> = self.arena.expr(root).children().to_vec();
            for child in children {
                self.arena.remove_parent(child, root);
                let drop_child = self.arena.expr(child).is_a(ExprKind::Var)
                    && self.is_execute_context(child);
                if drop_child {
                    push_unique(&mut to_remove, child);
                    continue;
                }
                self.arena.add_parent(child, canonical);
            }

            let noop = self.arena.make_expr(ExprPayload::NoOp { node: Some(node) });
            self.arena.expr_mut(noop).name = Some(event_name);
            self.arena.add_parent(noop, canonical);
            self.arena.repoint_subject(Subject::Node(node), noop);

            push_unique(&mut to_remove, root);
        }

        self.roots = fold_roots;
        self.arena.remove_expressions(&to_remove);
    }

    /// Append an Exit to every entry whose last child is not one already, so
    /// every execution path has an explicit terminal marker.
    pub(super) fn inject_exits_to_entries(&mut self) {
        for root in self.roots.clone() {
            if !self.arena.expr(root).is_a(ExprKind::Entry) {
                continue;
            }
            let has_exit = self
                .arena
                .expr(root)
                .children()
                .last()
                .is_some_and(|child| self.arena.expr(*child).is_a(ExprKind::Exit));
            if !has_exit {
                let exit = self.arena.make_expr(ExprPayload::Exit);
                self.arena.add_parent(exit, root);
            }
        }
    }

    /// Splice out no-op expressions, reparenting their children onto their
    /// former parents in place. NoOps wrapping an input-direction parameter
    /// node or a getter-direction variable node carry semantic meaning and
    /// survive.
    pub(super) fn fold_no_ops(&mut self) {
        let mut to_remove: Vec<ExprId> = Vec::new();

        for id in self.arena.ids() {
            if self.arena.expr(id).kind() != ExprKind::NoOp {
                continue;
            }
            if let Some(node_id) = self.arena.expr(id).node() {
                match self.graph.node(node_id).kind {
                    NodeKind::Parameter { input: true } => continue,
                    NodeKind::Variable { getter: true } => continue,
                    _ => {}
                }
            }

            let parents: Vec<ExprId> = self.arena.expr(id).parents().to_vec();
            let children: Vec<ExprId> = self.arena.expr(id).children().to_vec();

            for parent in &parents {
                let position = self
                    .arena
                    .expr(*parent)
                    .children()
                    .iter()
                    .position(|child| *child == id)
                    .expect("parent/child lists are symmetric");
                self.arena.remove_parent(id, *parent);
                let mut offset = 0;
                for child in &children {
                    if self.arena.insert_child_at(*parent, position + offset, *child) {
                        offset += 1;
                    }
                }
            }

            to_remove.push(id);
        }

        trace!(count = to_remove.len(), "folded no-op expressions");
        self.arena.remove_expressions(&to_remove);
    }

    /// Eliminate branches whose condition is a literal: the block chained to
    /// the taken execution output stands in for the whole branch. Returns
    /// true when anything changed, so the caller can loop to a fixpoint.
    pub(super) fn fold_constant_branches(&mut self) -> bool {
        let mut to_remove: Vec<ExprId> = Vec::new();

        for id in self.arena.ids() {
            if self.arena.expr(id).kind() != ExprKind::Branch {
                continue;
            }
            if self.arena.expr(id).num_parents() == 0 {
                continue;
            }

            let Some(condition) = self.branch_condition_expr(id) else {
                continue;
            };
            if self.arena.expr(condition).kind() != ExprKind::Literal {
                continue;
            }
            let default = self.default_value(condition).unwrap_or("");
            let taken_case = if default.eq_ignore_ascii_case("true") {
                0
            } else if default.eq_ignore_ascii_case("false") || default.is_empty() {
                1
            } else {
                continue;
            };

            let Some(case_var) = self.branch_case_expr(id, taken_case) else {
                continue;
            };
            if self.arena.expr(case_var).num_children() != 1 {
                continue;
            }
            let replacement = self
                .arena
                .expr(case_var)
                .child_at(0)
                .expect("checked num_children above");
            if self.arena.expr(replacement).kind() != ExprKind::Block {
                continue;
            }

            trace!(branch = %id, "eliminating constant branch");

            let block_parent = self
                .arena
                .expr(replacement)
                .parent_at(0)
                .expect("case blocks are parented under their pin var");
            self.arena.remove_parent(replacement, block_parent);
            self.arena.replace_by(id, replacement);
            push_unique(&mut to_remove, id);
        }

        if to_remove.is_empty() {
            return false;
        }
        self.arena.remove_expressions(&to_remove);
        true
    }

    /// The Var/Literal child standing for the branch's condition pin.
    fn branch_condition_expr(&self, branch: ExprId) -> Option<ExprId> {
        let node_id = self.arena.expr(branch).node()?;
        let node = self.graph.node(node_id);
        let condition_pin = node.root_pins().map(|pin| PinId { node: node_id, pin }).find(|pin| {
            let pin = self.graph.pin(*pin);
            !pin.execute_context
                && matches!(pin.direction, PinDirection::Input | PinDirection::Visible)
        })?;
        self.find_child_var(branch, condition_pin)
    }

    /// The Var child standing for the branch's n-th execution output pin.
    fn branch_case_expr(&self, branch: ExprId, case: usize) -> Option<ExprId> {
        let node_id = self.arena.expr(branch).node()?;
        let node = self.graph.node(node_id);
        let case_pin = node
            .root_pins()
            .map(|pin| PinId { node: node_id, pin })
            .filter(|pin| {
                let pin = self.graph.pin(*pin);
                pin.execute_context && pin.direction.is_output()
            })
            .nth(case)?;
        self.find_child_var(branch, case_pin)
    }

    fn find_child_var(&self, parent: ExprId, pin: PinId) -> Option<ExprId> {
        self.arena
            .expr(parent)
            .children()
            .iter()
            .copied()
            .find(|child| {
                let child = self.arena.expr(*child);
                child.is_a(ExprKind::Var) && child.pin() == Some(pin)
            })
    }

    /// A cached value consumed from more than one block is additionally
    /// parented — as first parent, at the minimal child index — under the
    /// nearest block containing all of its consumers, so a traversing
    /// backend schedules the computation before either of them.
    pub(super) fn bubble_up_expressions(&mut self) {
        for id in self.arena.ids() {
            if self.arena.expr(id).kind() != ExprKind::CachedValue {
                continue;
            }
            if self.arena.expr(id).num_parents() < 2 {
                continue;
            }

            let mut blocks: Vec<ExprId> = Vec::new();
            for parent in self.arena.expr(id).parents().to_vec() {
                let block = if self.arena.expr(parent).is_a(ExprKind::Block) {
                    Some(parent)
                } else {
                    self.block_of(parent)
                };
                if let Some(block) = block {
                    push_unique(&mut blocks, block);
                }
            }
            if blocks.len() <= 1 {
                continue;
            }

            // walk up the block tree until one block contains them all
            let mut candidates = blocks.clone();
            let mut outer = None;
            let mut index = 0;
            while index < candidates.len() {
                let candidate = candidates[index];
                if blocks
                    .iter()
                    .all(|block| self.block_contains(candidate, *block))
                {
                    outer = Some(candidate);
                    break;
                }
                if let Some(parent_block) = self.block_of(candidate) {
                    push_unique(&mut candidates, parent_block);
                }
                index += 1;
            }

            if let Some(outer) = outer {
                if let Some(child_index) = self.arena.min_child_index_within_parent(id, outer) {
                    self.arena.insert_parent_at_front(id, outer, child_index);
                }
            }
        }
    }

    /// Collapse assignment chains: an Assign (never a Copy) targeting an
    /// input pin or a reroute hop is removed and its child takes the target
    /// var's place under every grandparent. A grandparent that is itself an
    /// Assign has its recorded source pin rewritten to the chain's ultimate
    /// source.
    pub(super) fn fold_assignments(&mut self) {
        let mut to_remove: Vec<ExprId> = Vec::new();

        for id in self.arena.ids() {
            let expr = self.arena.expr(id);
            if expr.num_parents() == 0 {
                continue;
            }
            if expr.kind() != ExprKind::Assign {
                continue;
            }

            let target = expr.target_pin().expect("assigns carry a target pin");
            let source = expr.source_pin().expect("assigns carry a source pin");
            if self.graph.pin(target).direction != PinDirection::Input
                && self.graph.node(target.node).kind != NodeKind::Reroute
            {
                continue;
            }
            if expr.num_parents() != 1 || expr.num_children() != 1 {
                continue;
            }

            let parent = expr.parent_at(0).expect("checked num_parents above");
            if !self.arena.expr(parent).is_a(ExprKind::Var) {
                continue;
            }
            let child = expr.child_at(0).expect("checked num_children above");

            self.arena.remove_parent(id, parent);
            self.arena.remove_parent(child, id);

            let grandparents: Vec<ExprId> = self.arena.expr(parent).parents().to_vec();
            for grandparent in grandparents {
                self.arena.replace_child(grandparent, parent, child);
                if self.arena.expr(grandparent).kind().is_a(ExprKind::Assign) {
                    match &mut self.arena.expr_mut(grandparent).payload {
                        ExprPayload::Assign { source: slot, .. }
                        | ExprPayload::Copy { source: slot, .. } => *slot = source,
                        _ => unreachable!("checked kind above"),
                    }
                    let grandparent_target = self
                        .arena
                        .expr(grandparent)
                        .target_pin()
                        .expect("assigns carry a target pin");
                    self.arena.expr_mut(grandparent).name = Some(format!(
                        "{} -> {}",
                        self.graph.pin_path(source),
                        self.graph.pin_path(grandparent_target)
                    ));
                }
            }

            push_unique(&mut to_remove, id);
            if self.arena.expr(parent).num_parents() == 0 {
                push_unique(&mut to_remove, parent);
            }
        }

        trace!(count = to_remove.len(), "folded assignment chains");
        self.arena.remove_expressions(&to_remove);
    }

    /// Deduplicate literal constants: literals hashed by C++ type and
    /// default value collapse onto the first occurrence, which replaces the
    /// duplicate in every parent. The dedup table is local to one pass.
    pub(super) fn fold_literals(&mut self) {
        let mut value_to_literal: HashMap<String, ExprId> = HashMap::new();
        let mut to_remove: Vec<ExprId> = Vec::new();

        for id in self.arena.ids() {
            let expr = self.arena.expr(id);
            if expr.num_parents() == 0 {
                continue;
            }
            if expr.kind() != ExprKind::Literal {
                continue;
            }
            assert_eq!(expr.num_children(), 0, "literals have no children");

            let pin = self.graph.pin(expr.pin().expect("literals reference a pin"));
            if pin.default_value.is_empty() {
                continue;
            }

            let hash = format!("[{}] {}", pin.cpp_type, pin.default_value);
            match value_to_literal.get(&hash).copied() {
                Some(canonical) => {
                    let parents: Vec<ExprId> = self.arena.expr(id).parents().to_vec();
                    for parent in parents {
                        self.arena.replace_child(parent, id, canonical);
                    }
                    push_unique(&mut to_remove, id);
                }
                None => {
                    value_to_literal.insert(hash, id);
                }
            }
        }

        trace!(count = to_remove.len(), "deduplicated literals");
        self.arena.remove_expressions(&to_remove);
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{GraphDescription, Node, NodeId, NodeKind, PinDirection};
    use crate::parser::{AstSettings, BlueprintAst};
    use crate::ast::ExprKind;

    fn event_node(name: &str, event: &str) -> Node {
        let mut node = Node::event(name, event);
        node.add_exec_pin("ExecuteContext", PinDirection::Output);
        node
    }

    fn mutable_call(name: &str) -> Node {
        let mut node = Node::new(name, NodeKind::Function);
        node.mutable = true;
        node.add_exec_pin("ExecuteContext", PinDirection::IO);
        node
    }

    fn link_exec(graph: &mut GraphDescription, from: NodeId, to: NodeId) {
        graph.add_link(
            graph.find_pin(from, "ExecuteContext").unwrap(),
            graph.find_pin(to, "ExecuteContext").unwrap(),
        );
    }

    /// Two "Tick" events, each chaining one call.
    fn duplicate_entry_graph() -> GraphDescription {
        let mut graph = GraphDescription::new("test");
        let first = graph.add_node(event_node("TickA", "Tick"));
        let call_a = graph.add_node(mutable_call("A"));
        let second = graph.add_node(event_node("TickB", "Tick"));
        let call_b = graph.add_node(mutable_call("B"));
        link_exec(&mut graph, first, call_a);
        link_exec(&mut graph, second, call_b);
        graph
    }

    #[test]
    fn duplicate_entries_merge_preserving_child_order() {
        let graph = duplicate_entry_graph();
        let ast = BlueprintAst::parse(&graph, AstSettings::fast()).unwrap();

        let canonical = ast.expr_for_node(NodeId(0)).unwrap();
        assert_eq!(ast.expr(canonical).kind(), ExprKind::Entry);

        // only one entry root remains
        let entry_roots: Vec<_> = ast
            .roots()
            .iter()
            .filter(|root| ast.expr(**root).kind() == ExprKind::Entry)
            .collect();
        assert_eq!(entry_roots.len(), 1);

        // the second entry's node now maps to a NoOp under the canonical one
        let dissolved = ast.expr_for_node(NodeId(2)).unwrap();
        assert_eq!(ast.expr(dissolved).kind(), ExprKind::NoOp);
        assert!(ast.expr(dissolved).parents().contains(&canonical));

        // relative child order: A's call before B's call, exit injected last
        let call_a = ast.expr_for_node(NodeId(1)).unwrap();
        let call_b = ast.expr_for_node(NodeId(3)).unwrap();
        let children = ast.expr(canonical).children();
        let pos_a = children.iter().position(|c| *c == call_a).unwrap();
        let pos_b = children.iter().position(|c| *c == call_b).unwrap();
        assert!(pos_a < pos_b);
        assert_eq!(
            ast.expr(*children.last().unwrap()).kind(),
            ExprKind::Exit,
            "exit is the final child"
        );

        // the dissolved entry's execute-context var was dropped, so exactly
        // one execute var remains under the canonical entry
        let exec_vars = children
            .iter()
            .filter(|c| ast.expr(**c).is_a(ExprKind::Var) && ast.is_execute_context(**c))
            .count();
        assert_eq!(exec_vars, 1);
    }

    #[test]
    fn every_entry_gets_a_terminal_exit() {
        let mut graph = GraphDescription::new("test");
        graph.add_node(event_node("Init", "Init"));
        graph.add_node(event_node("Tick", "Tick"));

        let ast = BlueprintAst::parse(&graph, AstSettings::fast()).unwrap();

        for root in ast.roots() {
            if ast.expr(*root).kind() != ExprKind::Entry {
                continue;
            }
            let last = ast.expr(*root).children().last().copied().unwrap();
            assert_eq!(ast.expr(last).kind(), ExprKind::Exit);
        }
    }

    /// Event -> Sink whose input arrives through a reroute from a pure
    /// source node.
    fn reroute_graph() -> GraphDescription {
        let mut graph = GraphDescription::new("test");

        let update = graph.add_node(event_node("Update", "Update"));

        let mut source = Node::new("Source", NodeKind::Function);
        source.add_pin("Value", PinDirection::Output, "float");
        let source_id = graph.add_node(source);

        let mut reroute = Node::new("Reroute", NodeKind::Reroute);
        reroute.add_pin("Value", PinDirection::IO, crate::graph::WILDCARD_TYPE);
        let reroute_id = graph.add_node(reroute);

        let mut sink = mutable_call("Sink");
        sink.add_pin("In", PinDirection::Input, "float");
        let sink_id = graph.add_node(sink);

        link_exec(&mut graph, update, sink_id);
        graph.add_link(
            graph.find_pin(source_id, "Value").unwrap(),
            graph.find_pin(reroute_id, "Value").unwrap(),
        );
        graph.add_link(
            graph.find_pin(reroute_id, "Value").unwrap(),
            graph.find_pin(sink_id, "In").unwrap(),
        );

        graph
    }

    #[test]
    fn folding_collapses_reroute_chains_onto_the_source() {
        let graph = reroute_graph();
        let ast = BlueprintAst::parse(&graph, AstSettings::optimized()).unwrap();

        // the reroute's NoOp and both assignment hops are gone; the sink's
        // call consumes the cached source directly
        assert!(
            !ast.expressions()
                .any(|(_, e)| e.kind() == ExprKind::NoOp || e.kind() == ExprKind::Assign),
            "no-ops and assigns folded away:\n{}",
            ast.dump_text()
        );
        assert!(ast.expr_for_node(NodeId(2)).is_none(), "reroute unmapped");

        let sink_expr = ast.expr_for_node(NodeId(3)).unwrap();
        let cache = ast
            .expr(sink_expr)
            .children()
            .iter()
            .copied()
            .find(|c| ast.expr(*c).kind() == ExprKind::CachedValue)
            .expect("sink consumes the cached source value");
        let source_expr = ast.expr_for_node(NodeId(1)).unwrap();
        assert!(ast.expr(cache).children().contains(&source_expr));
    }

    #[test]
    fn skipped_passes_leave_the_chain_intact() {
        let graph = reroute_graph();
        let ast = BlueprintAst::parse(&graph, AstSettings::fast()).unwrap();

        assert!(ast
            .expressions()
            .any(|(_, e)| e.kind() == ExprKind::NoOp));
        assert!(ast
            .expressions()
            .any(|(_, e)| e.kind() == ExprKind::Assign));
    }

    #[test]
    fn folding_is_idempotent() {
        let graph = reroute_graph();
        let mut ast = BlueprintAst::parse(&graph, AstSettings::optimized()).unwrap();
        let stable = ast.dump_text();

        ast.fold_entries();
        ast.inject_exits_to_entries();
        ast.fold_no_ops();
        while ast.fold_constant_branches() {}
        ast.bubble_up_expressions();
        ast.fold_assignments();
        ast.fold_literals();

        assert_eq!(ast.dump_text(), stable);
    }

    #[test]
    fn no_orphans_after_folding() {
        let graph = reroute_graph();
        let ast = BlueprintAst::parse(&graph, AstSettings::optimized()).unwrap();

        for (id, expr) in ast.expressions() {
            assert!(
                expr.num_parents() > 0 || ast.roots().contains(&id),
                "{id} ({:?}) is an orphan",
                expr.kind()
            );
        }
    }

    #[test]
    fn literals_deduplicate_by_type_and_value() {
        let mut graph = GraphDescription::new("test");
        let update = graph.add_node(event_node("Update", "Update"));
        let mut add = mutable_call("Add");
        let x = add.add_pin("X", PinDirection::Input, "float");
        add.pins[x].default_value = "1.0".to_string();
        let y = add.add_pin("Y", PinDirection::Input, "float");
        add.pins[y].default_value = "1.0".to_string();
        let z = add.add_pin("Z", PinDirection::Input, "float");
        add.pins[z].default_value = "2.0".to_string();
        let add_id = graph.add_node(add);
        link_exec(&mut graph, update, add_id);

        let ast = BlueprintAst::parse(&graph, AstSettings::optimized()).unwrap();

        let literals: Vec<_> = ast
            .expressions()
            .filter(|(_, e)| e.kind() == ExprKind::Literal)
            .map(|(id, _)| id)
            .collect();
        assert_eq!(literals.len(), 2, "1.0 deduplicated, 2.0 kept separate");

        // the survivor replaced the duplicate in its former parent
        let call = ast.expr_for_node(add_id).unwrap();
        let survivor = ast
            .expr_for_pin(graph.find_pin(add_id, "X").unwrap())
            .unwrap();
        let shared = ast
            .expr(call)
            .children()
            .iter()
            .filter(|c| **c == survivor)
            .count();
        assert_eq!(shared, 2, "both X and Y slots point at the survivor");
    }

    #[test]
    fn constant_branches_fold_to_the_taken_side() {
        let mut graph = GraphDescription::new("test");
        let update = graph.add_node(event_node("Update", "Update"));

        let mut branch = Node::new("Branch", NodeKind::Branch);
        branch.mutable = true;
        branch.add_exec_pin("ExecuteContext", PinDirection::Input);
        let condition = branch.add_pin("Condition", PinDirection::Input, "bool");
        branch.pins[condition].default_value = "true".to_string();
        branch.add_exec_pin("True", PinDirection::Output);
        branch.add_exec_pin("False", PinDirection::Output);
        let branch_id = graph.add_node(branch);

        let taken = graph.add_node(mutable_call("Taken"));
        let skipped = graph.add_node(mutable_call("Skipped"));

        graph.add_link(
            graph.find_pin(update, "ExecuteContext").unwrap(),
            graph.find_pin(branch_id, "ExecuteContext").unwrap(),
        );
        graph.add_link(
            graph.find_pin(branch_id, "True").unwrap(),
            graph.find_pin(taken, "ExecuteContext").unwrap(),
        );
        graph.add_link(
            graph.find_pin(branch_id, "False").unwrap(),
            graph.find_pin(skipped, "ExecuteContext").unwrap(),
        );

        let mut settings = AstSettings::fast();
        settings.fold_constant_branches = true;
        let ast = BlueprintAst::parse(&graph, settings).unwrap();

        assert!(
            !ast.expressions().any(|(_, e)| e.kind() == ExprKind::Branch),
            "branch eliminated:\n{}",
            ast.dump_text()
        );
        // the taken case block stands in for the branch under the entry
        let entry = ast.expr_for_node(update).unwrap();
        let block = ast
            .expr(entry)
            .children()
            .iter()
            .copied()
            .find(|c| ast.expr(*c).kind() == ExprKind::Block)
            .expect("taken block replaces the branch");
        assert_eq!(ast.expr(block).name(), Some("True"));
        let taken_expr = ast.expr_for_node(taken).unwrap();
        assert!(ast.block_contains(block, taken_expr));
    }
}
