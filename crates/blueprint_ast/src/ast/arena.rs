//! Flat storage and lifetime management for expressions.
//!
//! All expressions live in one arena addressed by [`ExprId`]; parent/child
//! "references" are id lists into the arena. Removal tombstones the slot
//! (ids are never reused) and severs both edge directions plus every
//! subject-map entry pointing at the victim. Renumbering the stable header
//! indices is a separate compaction pass so that batch removals stay linear.

use std::collections::HashMap;

use crate::graph::{LinkId, NodeId, PinId};

use super::expression::{ExprId, ExprKind, ExprPayload, Expression};

/// An external graph entity an expression stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Node(NodeId),
    Pin(PinId),
    Link(LinkId),
}

/// Owns every expression of one parse.
///
/// Expressions never own each other; the arena is the single place where
/// edges and lifetimes change, which is what keeps parent/child lists
/// symmetric and the subject map accurate.
#[derive(Debug, Default)]
pub struct ExprArena {
    slots: Vec<Option<Expression>>,
    subjects: HashMap<Subject, ExprId>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new expression. The header index starts out as the slot
    /// position and stays valid until the next removal.
    pub fn make_expr(&mut self, payload: ExprPayload) -> ExprId {
        let id = ExprId(self.slots.len());
        self.slots.push(Some(Expression::new(payload, id.0)));
        id
    }

    /// Number of slots ever allocated, including tombstones. Upper bound
    /// for any per-expression flag array indexed by [`ExprId`].
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Number of live expressions.
    pub fn num_live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn contains(&self, id: ExprId) -> bool {
        self.slots.get(id.0).is_some_and(|slot| slot.is_some())
    }

    pub fn expr(&self, id: ExprId) -> &Expression {
        self.slots[id.0]
            .as_ref()
            .unwrap_or_else(|| panic!("{id} was removed but is still referenced"))
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expression {
        self.slots[id.0]
            .as_mut()
            .unwrap_or_else(|| panic!("{id} was removed but is still referenced"))
    }

    pub fn get(&self, id: ExprId) -> Option<&Expression> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Live expressions in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ExprId, &Expression)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|expr| (ExprId(index), expr)))
    }

    /// Snapshot of live ids, for passes that mutate while iterating.
    pub fn ids(&self) -> Vec<ExprId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Add a parent edge. Keeps both sides in sync, is a no-op when the
    /// edge already exists, and refuses self-parenting loudly.
    pub fn add_parent(&mut self, child: ExprId, parent: ExprId) {
        assert_ne!(child, parent, "an expression cannot be its own parent");
        if self.expr(child).parents.contains(&parent) {
            return;
        }
        self.expr_mut(parent).children.push(child);
        self.expr_mut(child).parents.push(parent);
    }

    /// Remove a parent edge; no-op when the edge does not exist.
    pub fn remove_parent(&mut self, child: ExprId, parent: ExprId) {
        let parents = &mut self.expr_mut(child).parents;
        let Some(position) = parents.iter().position(|p| *p == parent) else {
            return;
        };
        parents.remove(position);
        self.expr_mut(parent).children.retain(|c| *c != child);
    }

    /// Add a parent edge with the child placed at `index` in the parent's
    /// child list. Returns false (and changes nothing) when the edge already
    /// exists.
    pub fn insert_child_at(&mut self, parent: ExprId, index: usize, child: ExprId) -> bool {
        assert_ne!(child, parent, "an expression cannot be its own parent");
        if self.expr(child).parents.contains(&parent) {
            return false;
        }
        let children = &mut self.expr_mut(parent).children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.expr_mut(child).parents.push(parent);
        true
    }

    /// Add a parent edge with the child placed at `child_index` in the
    /// parent's child list and the parent placed *first* in the child's
    /// parent list, so it wins nearest-block queries. No-op when the edge
    /// already exists.
    pub fn insert_parent_at_front(&mut self, child: ExprId, parent: ExprId, child_index: usize) {
        assert_ne!(child, parent, "an expression cannot be its own parent");
        if self.expr(child).parents.contains(&parent) {
            return;
        }
        let children = &mut self.expr_mut(parent).children;
        let index = child_index.min(children.len());
        children.insert(index, child);
        self.expr_mut(child).parents.insert(0, parent);
    }

    /// Replace every occurrence of `old_child` in `parent`'s child list with
    /// `new_child`, preserving the position.
    pub fn replace_child(&mut self, parent: ExprId, old_child: ExprId, new_child: ExprId) {
        let mut replaced = false;
        for slot in self.expr_mut(parent).children.iter_mut() {
            if *slot == old_child {
                *slot = new_child;
                replaced = true;
            }
        }
        if replaced {
            self.expr_mut(old_child).parents.retain(|p| *p != parent);
            let parents = &mut self.expr_mut(new_child).parents;
            if !parents.contains(&parent) {
                parents.push(parent);
            }
        }
    }

    /// Replace every occurrence of `old_parent` in `child`'s parent list
    /// with `new_parent`, preserving the position.
    pub fn replace_parent(&mut self, child: ExprId, old_parent: ExprId, new_parent: ExprId) {
        let mut replaced = false;
        for slot in self.expr_mut(child).parents.iter_mut() {
            if *slot == old_parent {
                *slot = new_parent;
                replaced = true;
            }
        }
        if replaced {
            self.expr_mut(old_parent).children.retain(|c| *c != child);
            let children = &mut self.expr_mut(new_parent).children;
            if !children.contains(&child) {
                children.push(child);
            }
        }
    }

    /// Repoint every parent of `old` at `new`, detaching `old`.
    pub fn replace_by(&mut self, old: ExprId, new: ExprId) {
        let parents: Vec<ExprId> = self.expr(old).parents.to_vec();
        for parent in parents {
            self.replace_child(parent, old, new);
        }
    }

    /// Register the expression standing for a subject. Registering a subject
    /// twice is a builder bug.
    pub fn register_subject(&mut self, subject: Subject, id: ExprId) {
        let previous = self.subjects.insert(subject, id);
        assert!(
            previous.is_none(),
            "subject {subject:?} is already registered"
        );
    }

    /// Atomically repoint a subject at a replacement expression.
    pub fn repoint_subject(&mut self, subject: Subject, id: ExprId) {
        self.subjects.insert(subject, id);
    }

    pub fn expr_for_subject(&self, subject: Subject) -> Option<ExprId> {
        self.subjects.get(&subject).copied()
    }

    /// Detach `id` from every parent and child, erase all subject-map
    /// entries pointing at it, and tombstone the slot.
    ///
    /// Children are never removed implicitly; callers reparent or schedule
    /// them for removal themselves. Removing the same expression twice is a
    /// programming error.
    pub fn remove_expression(&mut self, id: ExprId, refresh_indices: bool) {
        assert!(self.contains(id), "{id} removed twice");

        let parents: Vec<ExprId> = self.expr(id).parents.to_vec();
        for parent in parents {
            self.remove_parent(id, parent);
        }
        let children: Vec<ExprId> = self.expr(id).children.to_vec();
        for child in children {
            self.remove_parent(child, id);
        }

        self.subjects.retain(|_, expr| *expr != id);
        self.slots[id.0] = None;

        if refresh_indices {
            self.refresh_expr_indices();
        }
    }

    /// Batched removal; renumbering runs once at the end instead of per
    /// expression.
    pub fn remove_expressions(&mut self, ids: &[ExprId]) {
        for id in ids {
            self.remove_expression(*id, false);
        }
        self.refresh_expr_indices();
    }

    /// Reassign each surviving expression's stable index to its position in
    /// live slot order; indices are contiguous `[0, N)` afterwards.
    pub fn refresh_expr_indices(&mut self) {
        let mut next = 0;
        for slot in self.slots.iter_mut() {
            if let Some(expr) = slot {
                expr.index = next;
                next += 1;
            }
        }
    }

    /// First parent (breadth over direct parents, then their ancestors)
    /// matching `kind`.
    pub fn first_parent_of_kind(&self, id: ExprId, kind: ExprKind) -> Option<ExprId> {
        let expr = self.expr(id);
        for parent in expr.parents.iter() {
            if self.expr(*parent).is_a(kind) {
                return Some(*parent);
            }
        }
        for parent in expr.parents.iter() {
            if let Some(found) = self.first_parent_of_kind(*parent, kind) {
                return Some(found);
            }
        }
        None
    }

    /// First child (breadth over direct children, then their descendants)
    /// matching `kind`.
    pub fn first_child_of_kind(&self, id: ExprId, kind: ExprKind) -> Option<ExprId> {
        let expr = self.expr(id);
        for child in expr.children.iter() {
            if self.expr(*child).is_a(kind) {
                return Some(*child);
            }
        }
        for child in expr.children.iter() {
            if let Some(found) = self.first_child_of_kind(*child, kind) {
                return Some(found);
            }
        }
        None
    }

    /// Smallest child index at which `id` (or a subtree containing it)
    /// appears within `parent`, across all paths.
    pub fn min_child_index_within_parent(&self, id: ExprId, parent: ExprId) -> Option<usize> {
        let mut min_index: Option<usize> = None;
        for candidate in self.expr(id).parents.iter() {
            let child_index = if *candidate == parent {
                self.expr(parent).children.iter().position(|c| *c == id)
            } else {
                self.min_child_index_within_parent(*candidate, parent)
            };
            if let Some(child_index) = child_index {
                min_index = Some(match min_index {
                    Some(current) => current.min(child_index),
                    None => child_index,
                });
            }
        }
        min_index
    }
}
