//! Debug serializations of the expression tree: an indented text dump and a
//! Graphviz dot dump. Both are pure functions of the current tree state,
//! useful as regression snapshots and for eyeballing folding results.

use crate::ast::{ExprId, ExprKind, ExprPayload};
use crate::graph::NodeKind;

use super::BlueprintAst;

impl<'g> BlueprintAst<'g> {
    /// Indented text rendering of every root expression.
    pub fn dump_text(&self) -> String {
        let mut result = String::new();
        for root in &self.roots {
            result.push('\n');
            self.dump_text_expr(*root, "", &mut result);
        }
        result
    }

    fn dump_text_expr(&self, id: ExprId, prefix: &str, out: &mut String) {
        let expr = self.arena.expr(id);
        out.push_str(prefix);
        out.push_str(expr.kind().type_label());
        if let Some(name) = expr.name() {
            out.push(' ');
            out.push_str(name);
        }

        let child_prefix = if prefix.is_empty() {
            "-- ".to_string()
        } else {
            format!("---{prefix}")
        };
        for child in expr.children() {
            out.push('\n');
            self.dump_text_expr(*child, &child_prefix, out);
        }
    }

    /// Graphviz rendering: entries and parentless blocks become subgraph
    /// clusters, every expression is defined exactly once by index.
    pub fn dump_dot(&self) -> String {
        let mut defined = vec![false; self.arena.num_slots()];
        let mut result = String::from("digraph AST {\n  node [style=filled];\n  rankdir=\"LR\";");
        for root in &self.roots {
            self.dump_dot_expr(*root, "  ", &mut defined, &mut result);
        }
        result.push_str("\n}");
        result
    }

    fn dump_dot_expr(&self, id: ExprId, prefix: &str, defined: &mut [bool], out: &mut String) {
        let expr = self.arena.expr(id);
        let index = expr.index();
        let mut prefix = prefix.to_string();
        let was_defined = defined[id.0];

        if !was_defined {
            let mut label = expr.name().unwrap_or_default().to_string();
            let mut node_settings = String::new();

            match &expr.payload {
                ExprPayload::Literal { pin } => {
                    label = format!("{}(Literal)", self.graph.pin(*pin).name);
                }
                ExprPayload::Var { pin } => {
                    let node = self.graph.node(pin.node);
                    label = match node.kind {
                        NodeKind::Parameter { .. } => format!("Param {}", node.name),
                        NodeKind::Variable { .. } => format!("Variable {}", node.name),
                        _ => self.graph.pin(*pin).name.clone(),
                    };
                    if self.graph.pin(*pin).execute_context {
                        node_settings.push_str(", shape = cds");
                    }
                }
                ExprPayload::Block { .. } => {
                    if expr.num_parents() == 0 {
                        label = "Unused".to_string();
                        out.push_str(&format!("\n{prefix}subgraph unused_{index} {{"));
                        prefix.push_str("  ");
                    } else {
                        label = "Block".to_string();
                    }
                }
                ExprPayload::Assign { .. } => label = "=".to_string(),
                ExprPayload::Copy { .. } => label = "Copy".to_string(),
                ExprPayload::CachedValue => label = "Cache".to_string(),
                ExprPayload::NoOp { .. } => label = "NoOp".to_string(),
                ExprPayload::Exit => label = "Exit".to_string(),
                ExprPayload::Entry { .. } => {
                    out.push_str(&format!(
                        "\n{prefix}subgraph {}_{index} {{",
                        expr.name().unwrap_or("entry")
                    ));
                    prefix.push_str("  ");
                }
                _ => {}
            }

            if !label.is_empty() {
                out.push_str(&format!(
                    "\n{prefix}node_{index} [label = \"{label}\"{node_settings}];"
                ));
            }

            match expr.kind() {
                ExprKind::Entry | ExprKind::Exit | ExprKind::Branch | ExprKind::Block => {
                    out.push_str(&format!("\n{prefix}node_{index} [shape = Mdiamond];"));
                }
                ExprKind::Assign
                | ExprKind::Copy
                | ExprKind::CallExtern
                | ExprKind::If
                | ExprKind::Select
                | ExprKind::NoOp => {
                    out.push_str(&format!("\n{prefix}node_{index} [shape = box];"));
                }
                _ => {}
            }
        }

        for child in expr.children() {
            self.dump_dot_expr(*child, &prefix, defined, out);
            if !was_defined {
                let child_index = self.arena.expr(*child).index();
                out.push_str(&format!("\n{prefix}node_{index} -> node_{child_index};"));
            }
        }

        if !defined[id.0] {
            let is_cluster = matches!(expr.kind(), ExprKind::Entry)
                || (expr.kind() == ExprKind::Block && expr.num_parents() == 0);
            if is_cluster {
                prefix.truncate(prefix.len().saturating_sub(2));
                out.push_str(&format!("\n{prefix}}}"));
            }
        }

        defined[id.0] = true;
    }
}
