//! # Graph → AST Parser
//!
//! Transforms a [`GraphDescription`] into a typed expression tree ready for
//! a bytecode backend.
//!
//! ## Pipeline
//!
//! 1. **Validation**: structural problems (dangling links, events without an
//!    execution pin) become diagnostics; strict mode aborts, lenient mode
//!    skips the offending element and keeps going.
//! 2. **Traversal**: event nodes are walked first and become `Entry` roots;
//!    execution links chain downstream mutable nodes under the same parent
//!    block. Anything left over lands in one shared "obsolete" block so the
//!    tree stays fully enumerable.
//! 3. **Folding**: a fixed pipeline of rewrite passes collapses redundant
//!    structure (see [`folding`]).
//!
//! Each graph subject (node, pin, link) maps to exactly one expression, so
//! re-entering the traversal for an already-visited subject short-circuits
//! through the subject map and only adds a parent edge.

use std::collections::HashSet;

use tracing::debug;

use crate::ast::{ExprArena, ExprId, ExprKind, ExprPayload, Expression, Subject};
use crate::error::{AstError, Diagnostic};
use crate::graph::{GraphDescription, LinkId, NodeId, NodeKind, Pin, PinDirection, PinId};

mod cycle_check;
mod dump;
mod folding;

pub use cycle_check::{CycleCheckState, TraverseRelationship};

/// How the parser reacts to structural errors in the input graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Record a diagnostic, skip the malformed element, keep building.
    Lenient,
    /// Abort with the aggregated diagnostics; no tree is produced.
    Strict,
}

/// Parser configuration: which folding passes run, and the error policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AstSettings {
    /// Splice out no-op expressions (reroutes and friends).
    pub fold_reroutes: bool,
    /// Collapse assignment chains onto their ultimate source.
    pub fold_assignments: bool,
    /// Deduplicate literals by type and value.
    pub fold_literals: bool,
    /// Eliminate branches whose condition is a literal.
    pub fold_constant_branches: bool,
    pub error_policy: ErrorPolicy,
}

impl AstSettings {
    /// Build only, no folding. Suited to live-editing validation where the
    /// tree is rebuilt often and queried by [`BlueprintAst::can_link`].
    pub fn fast() -> Self {
        Self {
            fold_reroutes: false,
            fold_assignments: false,
            fold_literals: false,
            fold_constant_branches: false,
            error_policy: ErrorPolicy::Strict,
        }
    }

    /// All folding passes on. Suited to a final compile before bytecode
    /// emission.
    pub fn optimized() -> Self {
        Self {
            fold_reroutes: true,
            fold_assignments: true,
            fold_literals: true,
            fold_constant_branches: true,
            error_policy: ErrorPolicy::Strict,
        }
    }
}

impl Default for AstSettings {
    fn default() -> Self {
        Self::fast()
    }
}

/// The parsed, folded expression tree for one graph.
///
/// Owns every expression; borrows the graph it was built from, which also
/// pins down the single-writer contract — the graph cannot be mutated while
/// this tree (or its cycle validator) is alive.
#[derive(Debug)]
pub struct BlueprintAst<'g> {
    graph: &'g GraphDescription,
    settings: AstSettings,
    arena: ExprArena,
    roots: Vec<ExprId>,
    obsolete_block: Option<ExprId>,
    diagnostics: Vec<Diagnostic>,
    skipped_links: HashSet<LinkId>,
    cycle: CycleCheckState,
}

impl<'g> BlueprintAst<'g> {
    /// Build the expression tree for `graph` and run the configured folding
    /// passes.
    pub fn parse(graph: &'g GraphDescription, settings: AstSettings) -> Result<Self, AstError> {
        let mut ast = Self {
            graph,
            settings,
            arena: ExprArena::new(),
            roots: Vec::new(),
            obsolete_block: None,
            diagnostics: Vec::new(),
            skipped_links: HashSet::new(),
            cycle: CycleCheckState::default(),
        };

        ast.validate_graph()?;

        debug!(
            graph = %graph.name,
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            "building expression tree"
        );

        for (node_id, node) in graph.nodes() {
            if node.is_event() {
                ast.traverse_mutable_node(node_id, None);
            }
        }

        // sweep everything the events did not reach into the obsolete
        // block: remaining mutable nodes first, then pure nodes
        for sweep_mutable in [true, false] {
            for (node_id, node) in graph.nodes() {
                if ast.arena.expr_for_subject(Subject::Node(node_id)).is_some() {
                    continue;
                }
                if node.mutable != sweep_mutable {
                    continue;
                }
                let obsolete = ast.obsolete_block_mut();
                if sweep_mutable {
                    ast.traverse_mutable_node(node_id, Some(obsolete));
                } else {
                    ast.traverse_node(node_id, obsolete);
                }
            }
        }

        ast.fold_entries();
        ast.inject_exits_to_entries();

        if settings.fold_reroutes || settings.fold_assignments {
            ast.fold_no_ops();
        }

        if settings.fold_constant_branches {
            while ast.fold_constant_branches() {}
        }

        ast.bubble_up_expressions();

        if settings.fold_assignments {
            ast.fold_assignments();
        }
        if settings.fold_literals {
            ast.fold_literals();
        }

        debug!(
            expressions = ast.arena.num_live(),
            roots = ast.roots.len(),
            "expression tree ready"
        );

        Ok(ast)
    }

    /// Pre-scan for structural problems. Malformed links are skipped by the
    /// traversal in lenient mode; strict mode aborts here.
    fn validate_graph(&mut self) -> Result<(), AstError> {
        let graph = self.graph;

        for (link_id, link) in graph.links() {
            let (source, target) = match (graph.get_pin(link.source), graph.get_pin(link.target)) {
                (Some(source), Some(target)) => (source, target),
                _ => {
                    self.skipped_links.insert(link_id);
                    self.diagnostics.push(Diagnostic::new(
                        format!("link #{}", link_id.0),
                        "dangling link: source or target pin does not exist",
                    ));
                    continue;
                }
            };

            let problem = if link.source.node == link.target.node {
                Some("links a node to itself")
            } else if !source.direction.is_output() {
                Some("link source is not an output pin")
            } else if !target.direction.is_input() {
                Some("link target is not an input pin")
            } else {
                None
            };

            if let Some(problem) = problem {
                self.skipped_links.insert(link_id);
                self.diagnostics
                    .push(Diagnostic::new(graph.link_path(link_id), problem));
            }
        }

        for (_, node) in graph.nodes() {
            if node.is_event()
                && !node
                    .pins
                    .iter()
                    .any(|pin| pin.execute_context && pin.direction.is_output())
            {
                self.diagnostics.push(Diagnostic::new(
                    node.name.clone(),
                    "event node has no execution output pin",
                ));
            }
        }

        if self.settings.error_policy == ErrorPolicy::Strict && !self.diagnostics.is_empty() {
            return Err(AstError::InvalidGraph(std::mem::take(&mut self.diagnostics)));
        }
        Ok(())
    }

    /// Incoming links of `pin`, minus the ones validation rejected.
    fn valid_source_links(&self, pin: PinId, include_sub_pins: bool) -> Vec<LinkId> {
        self.graph
            .source_links(pin, include_sub_pins)
            .into_iter()
            .filter(|link| !self.skipped_links.contains(link))
            .collect()
    }

    /// Target pins of outgoing links of `pin`, minus rejected links.
    fn valid_target_pins(&self, pin: PinId) -> Vec<PinId> {
        self.graph
            .links()
            .filter(|(id, link)| link.source == pin && !self.skipped_links.contains(id))
            .map(|(_, link)| link.target)
            .collect()
    }

    fn obsolete_block_mut(&mut self) -> ExprId {
        if let Some(id) = self.obsolete_block {
            return id;
        }
        let id = self.arena.make_expr(ExprPayload::Block { obsolete: true });
        self.roots.push(id);
        self.obsolete_block = Some(id);
        id
    }

    /// Walk a node with control flow, then chain every downstream mutable
    /// node reached through its execution outputs under the same parent —
    /// this is what establishes linear execution order inside a block.
    fn traverse_mutable_node(&mut self, node_id: NodeId, parent: Option<ExprId>) -> ExprId {
        if let Some(existing) = self.arena.expr_for_subject(Subject::Node(node_id)) {
            return existing;
        }

        let graph = self.graph;
        let node_expr = self.create_expression_for_node(node_id, parent);
        let chain_parent = parent.unwrap_or(node_expr);

        self.traverse_pins(node_id, node_expr);

        let pin_indices: Vec<usize> = graph.node(node_id).root_pins().collect();
        for pin_index in pin_indices {
            let pin_id = PinId {
                node: node_id,
                pin: pin_index,
            };
            let pin = graph.pin(pin_id);
            if !pin.direction.is_output() || !pin.execute_context {
                continue;
            }

            let mut parent_expr = chain_parent;
            if self.arena.expr(node_expr).kind() == ExprKind::Branch {
                // each branch case gets its own block so the backend can
                // schedule the two sides independently
                if let Some(pin_expr) = self.arena.expr_for_subject(Subject::Pin(pin_id)) {
                    let block = self.arena.make_expr(ExprPayload::Block { obsolete: false });
                    self.arena.expr_mut(block).name = Some(pin.name.clone());
                    self.arena.add_parent(block, pin_expr);
                    parent_expr = block;
                }
            }

            for target in self.valid_target_pins(pin_id) {
                self.traverse_mutable_node(target.node, Some(parent_expr));
            }
        }

        node_expr
    }

    /// Walk a node reached through a data link (or the obsolete sweep). A
    /// node visited before only gains another parent edge — sub-expressions
    /// are shared, never duplicated.
    fn traverse_node(&mut self, node_id: NodeId, parent_expr: ExprId) -> ExprId {
        if let Some(existing) = self.arena.expr_for_subject(Subject::Node(node_id)) {
            self.arena.add_parent(existing, parent_expr);
            return existing;
        }

        let node_expr = self.create_expression_for_node(node_id, Some(parent_expr));
        self.traverse_pins(node_id, node_expr);
        node_expr
    }

    fn create_expression_for_node(&mut self, node_id: NodeId, parent: Option<ExprId>) -> ExprId {
        let node = self.graph.node(node_id);

        let expr = if let Some(event_name) = &node.event {
            let expr = self.arena.make_expr(ExprPayload::Entry { node: node_id });
            self.arena.expr_mut(expr).name = Some(event_name.clone());
            expr
        } else {
            let payload = match node.kind {
                NodeKind::Reroute | NodeKind::Parameter { .. } | NodeKind::Variable { .. } => {
                    ExprPayload::NoOp {
                        node: Some(node_id),
                    }
                }
                NodeKind::Branch => ExprPayload::Branch { node: node_id },
                NodeKind::If => ExprPayload::If { node: node_id },
                NodeKind::Select => ExprPayload::Select { node: node_id },
                NodeKind::Function => ExprPayload::CallExtern { node: node_id },
            };
            let expr = self.arena.make_expr(payload);
            self.arena.expr_mut(expr).name = Some(node.name.clone());
            expr
        };

        match parent {
            Some(parent) => self.arena.add_parent(expr, parent),
            None => self.roots.push(expr),
        }
        self.arena.register_subject(Subject::Node(node_id), expr);
        expr
    }

    fn traverse_pins(&mut self, node_id: NodeId, parent_expr: ExprId) {
        let pin_indices: Vec<usize> = self.graph.node(node_id).root_pins().collect();
        for pin in pin_indices {
            self.traverse_pin(
                PinId {
                    node: node_id,
                    pin,
                },
                parent_expr,
            );
        }
    }

    fn traverse_pin(&mut self, pin_id: PinId, parent_expr: ExprId) -> Option<ExprId> {
        let graph = self.graph;
        assert!(
            self.arena.expr_for_subject(Subject::Pin(pin_id)).is_none(),
            "pin traversed twice: {}",
            graph.pin_path(pin_id)
        );

        let node = graph.node(pin_id.node);
        let pin = graph.pin(pin_id);

        // bookkeeping pins that never become expressions
        match node.kind {
            NodeKind::Variable { .. } if pin.direction == PinDirection::Hidden => return None,
            NodeKind::Parameter { .. } if pin.direction == PinDirection::Visible => return None,
            _ => {}
        }

        let source_links = self.valid_source_links(pin_id, true);

        let unlinked_input = matches!(pin.direction, PinDirection::Input | PinDirection::Visible)
            && source_links.is_empty();
        let pin_expr = if unlinked_input {
            if matches!(
                node.kind,
                NodeKind::Parameter { .. } | NodeKind::Variable { .. }
            ) {
                // parameter/variable values are mutable storage seeded from
                // the default, not plain constants
                let var = self.arena.make_expr(ExprPayload::Var { pin: pin_id });
                let copy = self.arena.make_expr(ExprPayload::Copy {
                    source: pin_id,
                    target: pin_id,
                });
                let literal = self.arena.make_expr(ExprPayload::Literal { pin: pin_id });
                self.arena.add_parent(copy, var);
                self.arena.add_parent(literal, copy);
                self.arena.expr_mut(literal).name = Some(graph.pin_path(pin_id));
                var
            } else {
                self.arena.make_expr(ExprPayload::Literal { pin: pin_id })
            }
        } else {
            self.arena.make_expr(ExprPayload::Var { pin: pin_id })
        };

        self.arena.add_parent(pin_expr, parent_expr);
        self.arena.expr_mut(pin_expr).name = Some(graph.pin_path(pin_id));
        self.arena.register_subject(Subject::Pin(pin_id), pin_expr);

        if pin.execute_context {
            return Some(pin_expr);
        }

        if matches!(pin.direction, PinDirection::IO | PinDirection::Input) {
            let root = graph.root_pin(pin_id);
            let has_root_link = source_links
                .iter()
                .any(|link| graph.link(*link).target == root);
            let direct_links = self.valid_source_links(pin_id, false);

            // nothing drives the pin itself (only sub-pins, or nothing at
            // all on an IO pin): reads of the value before this node runs
            // need isolated storage seeded from the default
            if !has_root_link
                && direct_links.is_empty()
                && (pin.direction == PinDirection::IO || !source_links.is_empty())
            {
                let literal = self.arena.make_expr(ExprPayload::Literal { pin: pin_id });
                let copy = self.arena.make_expr(ExprPayload::Copy {
                    source: pin_id,
                    target: pin_id,
                });
                let path = graph.pin_path(pin_id);
                self.arena.expr_mut(copy).name = Some(format!("{path} -> {path}"));
                self.arena.expr_mut(literal).name = Some(path);
                self.arena.add_parent(copy, pin_expr);
                self.arena.add_parent(literal, copy);
                self.arena.repoint_subject(Subject::Pin(pin_id), literal);
            }
        }

        let mut parent_for_links = pin_expr;
        if matches!(pin.direction, PinDirection::IO | PinDirection::Input)
            && !source_links.is_empty()
        {
            let parent_kind = self.arena.expr(parent_expr).kind();
            if parent_kind.is_a(ExprKind::If) || parent_kind.is_a(ExprKind::Select) {
                let block = self.arena.make_expr(ExprPayload::Block { obsolete: false });
                self.arena.expr_mut(block).name = Some(pin.name.clone());
                self.arena.add_parent(block, pin_expr);
                parent_for_links = block;
            }
        }

        for link in source_links {
            self.traverse_link(link, parent_for_links);
        }

        Some(pin_expr)
    }

    fn traverse_link(&mut self, link_id: LinkId, parent_expr: ExprId) {
        let graph = self.graph;
        assert!(
            self.arena.expr_for_subject(Subject::Link(link_id)).is_none(),
            "link traversed twice: {}",
            graph.link_path(link_id)
        );

        let link = *graph.link(link_id);
        let source_root = graph.root_pin(link.source);
        let target_root = graph.root_pin(link.target);

        // sub-pin endpoints decompose a struct, and parameter/variable sinks
        // need their own storage; both force a value copy
        let mut requires_copy = source_root != link.source || target_root != link.target;
        if !requires_copy {
            requires_copy = matches!(
                graph.node(target_root.node).kind,
                NodeKind::Parameter { .. } | NodeKind::Variable { .. }
            );
        }

        let assign = if requires_copy {
            self.arena.make_expr(ExprPayload::Copy {
                source: link.source,
                target: link.target,
            })
        } else {
            self.arena.make_expr(ExprPayload::Assign {
                source: link.source,
                target: link.target,
            })
        };
        self.arena.expr_mut(assign).name = Some(graph.link_path(link_id));
        self.arena.add_parent(assign, parent_expr);
        self.arena.register_subject(Subject::Link(link_id), assign);

        let node_expr = self.traverse_node(link.source.node, assign);

        let node_kind = self.arena.expr(node_expr).kind();
        if !(node_kind.is_a(ExprKind::CallExtern)
            || node_kind.is_a(ExprKind::If)
            || node_kind.is_a(ExprKind::Select))
        {
            return;
        }

        // the produced value may be consumed by several assignments; wrap
        // the computation in a cached value so it is scheduled at most once
        let children: Vec<ExprId> = self.arena.expr(node_expr).children().to_vec();
        for child in children {
            let child_expr = self.arena.expr(child);
            if !child_expr.is_a(ExprKind::Var) || child_expr.pin() != Some(source_root) {
                continue;
            }

            let mut cache = None;
            for parent in self.arena.expr(child).parents() {
                if self.arena.expr(*parent).kind() == ExprKind::CachedValue {
                    cache = Some(*parent);
                    break;
                }
            }
            let cache = match cache {
                Some(cache) => cache,
                None => {
                    let name = self.arena.expr(assign).name().map(str::to_string);
                    let cache = self.arena.make_expr(ExprPayload::CachedValue);
                    self.arena.expr_mut(cache).name = name;
                    self.arena.add_parent(child, cache);
                    self.arena.add_parent(node_expr, cache);
                    cache
                }
            };
            self.arena.replace_child(assign, node_expr, cache);
            return;
        }

        panic!(
            "traversed node has no var expression for its output pin {}",
            graph.pin_path(source_root)
        );
    }

    // ------------------------------------------------------------------
    // Read-only tree navigation
    // ------------------------------------------------------------------

    pub fn graph(&self) -> &'g GraphDescription {
        self.graph
    }

    pub fn settings(&self) -> AstSettings {
        self.settings
    }

    /// Structural problems recorded during a lenient build.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Root expressions in creation order (entries first, then unreached
    /// roots and the obsolete block).
    pub fn roots(&self) -> &[ExprId] {
        &self.roots
    }

    /// The shared block collecting unreached graph regions, if any node
    /// ended up there.
    pub fn obsolete_block(&self) -> Option<ExprId> {
        self.obsolete_block
    }

    pub fn expr(&self, id: ExprId) -> &Expression {
        self.arena.expr(id)
    }

    /// Live expressions in storage order.
    pub fn expressions(&self) -> impl Iterator<Item = (ExprId, &Expression)> {
        self.arena.iter()
    }

    pub fn num_expressions(&self) -> usize {
        self.arena.num_live()
    }

    /// O(1) re-lookup of the expression standing for a graph subject.
    pub fn expr_for_subject(&self, subject: Subject) -> Option<ExprId> {
        self.arena.expr_for_subject(subject)
    }

    pub fn expr_for_node(&self, node: NodeId) -> Option<ExprId> {
        self.expr_for_subject(Subject::Node(node))
    }

    pub fn expr_for_pin(&self, pin: PinId) -> Option<ExprId> {
        self.expr_for_subject(Subject::Pin(pin))
    }

    /// Nearest enclosing block: the expression itself for a parentless
    /// block, the obsolete block for any other parentless expression.
    pub fn block_of(&self, id: ExprId) -> Option<ExprId> {
        let expr = self.arena.expr(id);
        if expr.num_parents() == 0 {
            if expr.is_a(ExprKind::Block) {
                return Some(id);
            }
            return self.obsolete_block;
        }
        let parent = expr.parent_at(0).expect("checked num_parents above");
        if self.arena.expr(parent).is_a(ExprKind::Block) {
            Some(parent)
        } else {
            self.block_of(parent)
        }
    }

    /// Outermost enclosing block.
    pub fn root_block_of(&self, id: ExprId) -> Option<ExprId> {
        let block = self.block_of(id);
        let expr = self.arena.expr(id);
        if expr.is_a(ExprKind::Block) {
            if let Some(block) = block {
                if expr.num_parents() > 0 {
                    return self.root_block_of(block);
                }
            }
            return Some(id);
        }
        block.and_then(|block| self.root_block_of(block))
    }

    /// True when `expr` is `block` or reachable from it through parent
    /// edges.
    pub fn block_contains(&self, block: ExprId, expr: ExprId) -> bool {
        if block == expr {
            return true;
        }
        self.arena
            .expr(expr)
            .parents()
            .iter()
            .any(|parent| self.block_contains(block, *parent))
    }

    /// True when `id` is an entry or has one among its descendants.
    pub fn contains_entry(&self, id: ExprId) -> bool {
        if self.arena.expr(id).is_a(ExprKind::Entry) {
            return true;
        }
        self.arena
            .expr(id)
            .children()
            .iter()
            .any(|child| self.contains_entry(*child))
    }

    /// A block should execute iff it contains an entry.
    pub fn should_execute(&self, block: ExprId) -> bool {
        self.contains_entry(block)
    }

    /// True when the value of `id` cannot change between runs: every leaf
    /// it depends on is a literal.
    pub fn is_constant(&self, id: ExprId) -> bool {
        let expr = self.arena.expr(id);
        if let Some(pin_id) = expr.pin() {
            let pin = self.graph.pin(pin_id);
            if pin.execute_context {
                return false;
            }
            if pin.constant {
                return true;
            }
        }
        expr.children().iter().all(|child| self.is_constant(*child))
    }

    fn referenced_pin(&self, id: ExprId) -> Option<&'g Pin> {
        self.arena.expr(id).pin().map(|pin| self.graph.pin(pin))
    }

    /// C++ type of the pin a Var/Literal references.
    pub fn cpp_type(&self, id: ExprId) -> Option<&'g str> {
        self.referenced_pin(id).map(|pin| pin.cpp_type.as_str())
    }

    /// Direction of the pin a Var/Literal references.
    pub fn pin_direction(&self, id: ExprId) -> Option<PinDirection> {
        self.referenced_pin(id).map(|pin| pin.direction)
    }

    /// Default value of the pin a Var/Literal references.
    pub fn default_value(&self, id: ExprId) -> Option<&'g str> {
        self.referenced_pin(id).map(|pin| pin.default_value.as_str())
    }

    /// True when a Var/Literal references an execution-context pin.
    pub fn is_execute_context(&self, id: ExprId) -> bool {
        self.referenced_pin(id)
            .is_some_and(|pin| pin.execute_context)
    }
}
