//! Point numbering and last-use computation for one body.
//!
//! Every expression node gets a preorder program point; the checker and the
//! borrow windows share this numbering. A borrow's end point is its
//! borrower's last textual use, found by a backward scan over the recorded
//! use events.

use std::collections::HashMap;

use crate::ids::{NodeId, PlaceId};
use crate::ownck::state::Point;
use crate::tree::{Expr, ExprKind};

pub struct BodyFacts {
    pub point_of: HashMap<NodeId, Point>,
    pub last_use: HashMap<PlaceId, Point>,
}

impl BodyFacts {
    pub fn point(&self, id: NodeId) -> Point {
        self.point_of[&id]
    }
}

pub fn analyze(body: &Expr) -> BodyFacts {
    let mut point_of = HashMap::new();
    let mut uses: Vec<(PlaceId, Point)> = Vec::new();

    // Explicit-stack preorder walk; children are pushed in reverse so they
    // pop in source order.
    let mut next: Point = 0;
    let mut stack: Vec<&Expr> = vec![body];
    while let Some(expr) = stack.pop() {
        let point = next;
        next += 1;
        point_of.insert(expr.id, point);

        match &expr.kind {
            ExprKind::Var { place } | ExprKind::Ref { place, .. } => {
                uses.push((*place, point));
            }
            ExprKind::Assign { target, .. } => {
                uses.push((*target, point));
            }
            _ => {}
        }

        for child in children(expr).into_iter().rev() {
            stack.push(child);
        }
    }

    // Backward scan: the first sighting from the end is the last use.
    let mut last_use = HashMap::new();
    for (place, point) in uses.into_iter().rev() {
        last_use.entry(place).or_insert(point);
    }

    BodyFacts { point_of, last_use }
}

pub(super) fn children(expr: &Expr) -> Vec<&Expr> {
    match &expr.kind {
        ExprKind::Unit
        | ExprKind::LitInt(_)
        | ExprKind::LitFloat(_)
        | ExprKind::LitBool(_)
        | ExprKind::LitChar(_)
        | ExprKind::LitStr(_)
        | ExprKind::Var { .. }
        | ExprKind::Ref { .. } => Vec::new(),
        ExprKind::Let { bindings, body, .. } => {
            let mut out: Vec<&Expr> = bindings.iter().map(|b| &b.value).collect();
            out.push(body);
            out
        }
        ExprKind::Seq(exprs) => exprs.iter().collect(),
        ExprKind::Assign { value, .. } => vec![value],
        ExprKind::Deref { value } => vec![value],
        ExprKind::Tuple(elems) | ExprKind::ArrayLit(elems) | ExprKind::ListLit(elems) => {
            elems.iter().collect()
        }
        ExprKind::Record { fields } => fields.iter().map(|(_, value)| value).collect(),
        ExprKind::Variant { payload, .. } => payload.iter().collect(),
        ExprKind::Field { target, .. } => vec![target],
        ExprKind::If {
            cond,
            then_body,
            else_body,
        } => vec![cond, then_body, else_body],
        ExprKind::Case { scrutinee, arms } => {
            let mut out = vec![scrutinee.as_ref()];
            out.extend(arms.iter().map(|arm| &arm.body));
            out
        }
        ExprKind::While { cond, body } => vec![cond, body],
        ExprKind::Closure { body, .. } => vec![body],
        ExprKind::Call { callee, args } => {
            let mut out = vec![callee.as_ref()];
            out.extend(args.iter());
            out
        }
        ExprKind::Spawn { closure } => vec![closure],
        ExprKind::Send { channel, value } => vec![channel, value],
    }
}
