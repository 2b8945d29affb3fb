//! End-to-end tests driving the public API: build graphs the way the editor
//! does, parse them, and check the folded tree and the interactive link
//! validator together.

use blueprint_ast::graph::{GraphDescription, Node, NodeId, NodeKind, PinDirection};
use blueprint_ast::{AstSettings, BlueprintAst, ExprKind, LinkRejection};

fn event_node(name: &str, event: &str) -> Node {
    let mut node = Node::event(name, event);
    node.add_exec_pin("ExecuteContext", PinDirection::Output);
    node
}

fn call_node(name: &str) -> Node {
    let mut node = Node::new(name, NodeKind::Function);
    node.mutable = true;
    node.add_exec_pin("ExecuteContext", PinDirection::IO);
    node.add_pin("In", PinDirection::Input, "float");
    node.add_pin("Out", PinDirection::Output, "float");
    node
}

fn link_exec(graph: &mut GraphDescription, from: NodeId, to: NodeId) {
    graph.add_link(
        graph.find_pin(from, "ExecuteContext").unwrap(),
        graph.find_pin(to, "ExecuteContext").unwrap(),
    );
}

/// The canonical end-to-end scenario: Entry "Update" -> "Add" with X and Y
/// both defaulting to 2.0. Optimized folding must share one literal between
/// both inputs and terminate the entry with an exit.
#[test]
fn optimized_folding_shares_literals_and_injects_exits() {
    let mut graph = GraphDescription::new("update");

    let update = graph.add_node(event_node("Update", "Update"));
    let mut add = Node::new("Add", NodeKind::Function);
    add.mutable = true;
    add.add_exec_pin("ExecuteContext", PinDirection::IO);
    let x = add.add_pin("X", PinDirection::Input, "float");
    add.pins[x].default_value = "2.0".to_string();
    let y = add.add_pin("Y", PinDirection::Input, "float");
    add.pins[y].default_value = "2.0".to_string();
    add.add_pin("Result", PinDirection::Output, "float");
    let add_id = graph.add_node(add);
    link_exec(&mut graph, update, add_id);

    let ast = BlueprintAst::parse(&graph, AstSettings::optimized()).unwrap();

    // one entry root, call chained under it, exit last
    assert_eq!(ast.roots().len(), 1);
    let entry = ast.roots()[0];
    assert_eq!(ast.expr(entry).kind(), ExprKind::Entry);
    assert_eq!(ast.expr(entry).name(), Some("Update"));

    let call = ast.expr_for_node(add_id).unwrap();
    assert!(ast.expr(call).parents().contains(&entry));
    let last = *ast.expr(entry).children().last().unwrap();
    assert_eq!(ast.expr(last).kind(), ExprKind::Exit);

    // exactly one literal expression survives, shared by both input slots
    let literals: Vec<_> = ast
        .expressions()
        .filter(|(_, expr)| expr.kind() == ExprKind::Literal)
        .map(|(id, _)| id)
        .collect();
    assert_eq!(literals.len(), 1);
    let shared = literals[0];
    assert_eq!(ast.default_value(shared), Some("2.0"));
    assert_eq!(ast.cpp_type(shared), Some("float"));
    let slots = ast
        .expr(call)
        .children()
        .iter()
        .filter(|child| **child == shared)
        .count();
    assert_eq!(slots, 2, "X and Y both consume the shared literal");
}

/// A -> B -> C chained by execution and data. Closing the loop C -> A must
/// be rejected; a parallel forward edge A -> C must be accepted.
#[test]
fn cycle_validation_on_a_linear_chain() {
    let mut graph = GraphDescription::new("chain");
    let update = graph.add_node(event_node("Update", "Update"));
    let a = graph.add_node(call_node("A"));
    let b = graph.add_node(call_node("B"));
    let c = graph.add_node(call_node("C"));

    link_exec(&mut graph, update, a);
    link_exec(&mut graph, a, b);
    link_exec(&mut graph, b, c);
    graph.add_link(
        graph.find_pin(a, "Out").unwrap(),
        graph.find_pin(b, "In").unwrap(),
    );
    graph.add_link(
        graph.find_pin(b, "Out").unwrap(),
        graph.find_pin(c, "In").unwrap(),
    );

    let mut ast = BlueprintAst::parse(&graph, AstSettings::fast()).unwrap();

    assert_eq!(
        ast.can_link(
            graph.find_pin(c, "Out").unwrap(),
            graph.find_pin(a, "In").unwrap()
        ),
        Err(LinkRejection::CycleDetected)
    );
    assert_eq!(
        ast.can_link(
            graph.find_pin(a, "Out").unwrap(),
            graph.find_pin(c, "In").unwrap()
        ),
        Ok(())
    );
}

/// Pins in two different live entry blocks must not connect, while links
/// into a never-executed region are fine in either direction.
#[test]
fn block_compatibility_rules() {
    let mut graph = GraphDescription::new("blocks");
    let init = graph.add_node(event_node("OnInit", "Init"));
    let init_call = graph.add_node(call_node("InitWork"));
    let tick = graph.add_node(event_node("OnTick", "Tick"));
    let tick_call = graph.add_node(call_node("TickWork"));
    let dead_call = graph.add_node(call_node("DeadWork"));

    let mut pure = Node::new("Pure", NodeKind::Function);
    pure.add_pin("Out", PinDirection::Output, "float");
    let pure_id = graph.add_node(pure);

    link_exec(&mut graph, init, init_call);
    link_exec(&mut graph, tick, tick_call);

    let mut ast = BlueprintAst::parse(&graph, AstSettings::fast()).unwrap();

    // live block <-> different live block: rejected
    assert!(matches!(
        ast.can_link(
            graph.find_pin(init_call, "Out").unwrap(),
            graph.find_pin(tick_call, "In").unwrap()
        ),
        Err(LinkRejection::BlocksIncompatible { .. })
    ));

    // unreached -> unreached: allowed
    assert_eq!(
        ast.can_link(
            graph.find_pin(pure_id, "Out").unwrap(),
            graph.find_pin(dead_call, "In").unwrap()
        ),
        Ok(())
    );

    // live -> unreached: allowed (crossing into a region that never runs)
    assert_eq!(
        ast.can_link(
            graph.find_pin(init_call, "Out").unwrap(),
            graph.find_pin(dead_call, "In").unwrap()
        ),
        Ok(())
    );
}

/// Entries sharing an event name merge into one root; the dissolved entry's
/// node keeps resolving through the subject map.
#[test]
fn entry_merge_keeps_subject_lookups_valid() {
    let mut graph = GraphDescription::new("events");
    let first = graph.add_node(event_node("TickA", "Tick"));
    let first_call = graph.add_node(call_node("A"));
    let second = graph.add_node(event_node("TickB", "Tick"));
    let second_call = graph.add_node(call_node("B"));
    link_exec(&mut graph, first, first_call);
    link_exec(&mut graph, second, second_call);

    let ast = BlueprintAst::parse(&graph, AstSettings::fast()).unwrap();

    let canonical = ast.expr_for_node(first).unwrap();
    assert_eq!(ast.expr(canonical).kind(), ExprKind::Entry);

    let dissolved = ast.expr_for_node(second).unwrap();
    assert_eq!(ast.expr(dissolved).kind(), ExprKind::NoOp);

    // both calls run under the canonical entry, in entry order
    let children = ast.expr(canonical).children();
    let a = ast.expr_for_node(first_call).unwrap();
    let b = ast.expr_for_node(second_call).unwrap();
    let pos_a = children.iter().position(|child| *child == a).unwrap();
    let pos_b = children.iter().position(|child| *child == b).unwrap();
    assert!(pos_a < pos_b);
}

/// Parsing the same graph twice yields the same tree shape: the subject map
/// short-circuits make traversal deterministic and duplicate-free.
#[test]
fn parsing_is_deterministic_and_duplicate_free() {
    let mut graph = GraphDescription::new("deterministic");
    let update = graph.add_node(event_node("Update", "Update"));
    let a = graph.add_node(call_node("A"));
    let b = graph.add_node(call_node("B"));
    link_exec(&mut graph, update, a);
    link_exec(&mut graph, a, b);
    graph.add_link(
        graph.find_pin(a, "Out").unwrap(),
        graph.find_pin(b, "In").unwrap(),
    );

    let first = BlueprintAst::parse(&graph, AstSettings::optimized()).unwrap();
    let second = BlueprintAst::parse(&graph, AstSettings::optimized()).unwrap();

    assert_eq!(first.num_expressions(), second.num_expressions());
    assert_eq!(first.dump_text(), second.dump_text());
    assert_eq!(first.dump_dot(), second.dump_dot());

    // every graph subject resolves to exactly one live expression
    for (node_id, _) in graph.nodes() {
        let expr = first.expr_for_node(node_id).unwrap();
        assert!(first.expressions().any(|(id, _)| id == expr));
    }
}

/// The fast preset leaves reroutes and assignment chains in place, and the
/// tree still answers block/entry queries correctly.
#[test]
fn fast_preset_builds_without_folding() {
    let mut graph = GraphDescription::new("fast");
    let update = graph.add_node(event_node("Update", "Update"));
    let sink = graph.add_node(call_node("Sink"));

    let mut reroute = Node::new("Reroute", NodeKind::Reroute);
    reroute.add_pin(
        "Value",
        PinDirection::IO,
        blueprint_ast::graph::WILDCARD_TYPE,
    );
    let reroute_id = graph.add_node(reroute);

    let mut source = Node::new("Source", NodeKind::Function);
    source.add_pin("Out", PinDirection::Output, "float");
    let source_id = graph.add_node(source);

    link_exec(&mut graph, update, sink);
    graph.add_link(
        graph.find_pin(source_id, "Out").unwrap(),
        graph.find_pin(reroute_id, "Value").unwrap(),
    );
    graph.add_link(
        graph.find_pin(reroute_id, "Value").unwrap(),
        graph.find_pin(sink, "In").unwrap(),
    );

    let ast = BlueprintAst::parse(&graph, AstSettings::fast()).unwrap();

    // the reroute's no-op is still there and the chain is intact
    let noop = ast.expr_for_node(reroute_id).unwrap();
    assert_eq!(ast.expr(noop).kind(), ExprKind::NoOp);
    assert!(ast
        .expressions()
        .any(|(_, expr)| expr.kind() == ExprKind::Assign));

    // block queries see one live entry and no obsolete members beyond the
    // pure data chain
    let entry = ast.expr_for_node(update).unwrap();
    let sink_expr = ast.expr_for_node(sink).unwrap();
    assert_eq!(ast.block_of(sink_expr), Some(entry));
    assert!(ast.should_execute(entry));
}
