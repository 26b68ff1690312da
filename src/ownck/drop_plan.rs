//! Drop planning.
//!
//! For every scope, the plan lists the places the scope must destroy at its
//! exit: places the scope declares that are still owned when it ends, hold a
//! move-class value, and are backed by a heap-placed allocation. Stack
//! allocations vanish with the frame and copy-class bindings own nothing, so
//! neither gets a drop step. Scopes are planned innermost-first and each
//! scope drops in reverse declaration order.

use std::collections::HashMap;

use crate::context::AnalysisContext;
use crate::ids::{PlaceId, ScopeId};
use crate::ownck::escape::{EscapeAnalysis, Placement};
use crate::ownck::state::OwnershipState;
use crate::tree::FuncDef;
use crate::types::TypeClass;

pub(super) fn plan(
    ctx: &AnalysisContext,
    func: &FuncDef,
    scope_exits: &HashMap<ScopeId, HashMap<PlaceId, OwnershipState>>,
    escape: &EscapeAnalysis,
) -> Vec<(ScopeId, Vec<PlaceId>)> {
    let threshold = ctx.config.stack_size_threshold;
    let mut plans = Vec::new();

    for scope in ctx.program.scopes.post_order(func.scope) {
        let mut steps = Vec::new();
        for &place in ctx.program.scopes.get(scope).places.iter().rev() {
            let owned = scope_exits
                .get(&scope)
                .map(|snapshot| !snapshot.get(&place).is_some_and(|s| s.is_moved()))
                .unwrap_or(true);
            if !owned {
                continue;
            }
            let info = ctx.program.places.get(place);
            if ctx.oracle.class(&info.ty) != Some(TypeClass::Move) {
                continue;
            }
            if escape.place_decision(place, threshold) != Some(Placement::Heap) {
                continue;
            }
            steps.push(place);
        }
        plans.push((scope, steps));
    }

    plans
}

#[cfg(test)]
#[path = "../tests/t_drop_plan.rs"]
mod tests;
