//! Expression model: the typed tree the parser produces and the folding
//! passes rewrite. Expressions are stored in a flat arena and reference each
//! other by id; see [`arena::ExprArena`] for lifetime rules.

mod arena;
mod expression;

pub use arena::{ExprArena, Subject};
pub use expression::{ExprId, ExprKind, ExprPayload, Expression};
