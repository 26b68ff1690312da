//! The ownership core: move/borrow checking, closure capture resolution,
//! escape analysis and drop planning over a typed program.
//!
//! Bodies are independent and analyzed in parallel; all outputs are merged
//! deterministically in declaration order. Per body the passes run in a
//! fixed sequence:
//!
//! 1. move/borrow check (flow-sensitive, per `move_check`)
//! 2. optimistic capture resolution (`capture`)
//! 3. escape analysis over allocation sites (`escape`)
//! 4. thread-safety checks on spawned closures and sends, against the
//!    resolved (pre-upgrade) capture modes
//! 5. borrow-to-move upgrade for escaping closures, with capture cells
//!    materialized and escape re-propagated
//! 6. drop planning per scope (`drop_plan`)
//!
//! A body containing a type the oracle cannot classify is skipped whole and
//! reported in [`AnalysisOutput::aborted_bodies`]; other bodies are
//! unaffected.

pub mod capture;
pub mod errors;
pub mod escape;
pub mod liveness;
pub mod state;

mod drop_plan;
mod move_check;

use std::mem::{Discriminant, discriminant};

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::context::{AnalysisContext, Config};
use crate::diag::Span;
use crate::ids::{ClosureId, PlaceId, ScopeId, SiteId};
use crate::ownck::state::OwnershipState;
use crate::tree::{FuncDef, Program};
use crate::types::ClassOracle;

pub use capture::CaptureMode;
pub use errors::{OwnError, OwnErrorKind};
pub use escape::{AllocationInfo, Placement};

/// Everything the backend needs from the ownership core.
#[derive(Debug, Default)]
pub struct AnalysisOutput {
    pub diagnostics: Vec<OwnError>,
    pub allocations: IndexMap<SiteId, AllocationInfo>,
    /// Per scope, the places to destroy at its exit, innermost scopes
    /// first, reverse declaration order within a scope.
    pub drop_plans: IndexMap<ScopeId, Vec<PlaceId>>,
    pub captures: IndexMap<(ClosureId, PlaceId), CaptureMode>,
    /// Bodies skipped because a type could not be classified.
    pub aborted_bodies: Vec<String>,
}

pub fn analyze(program: &Program, oracle: &dyn ClassOracle, config: Config) -> AnalysisOutput {
    let ctx = AnalysisContext::new(program, oracle, config);

    let outcomes: Vec<BodyOutcome> = program
        .module
        .funcs
        .par_iter()
        .map(|func| analyze_body(&ctx, func))
        .collect();

    let mut out = AnalysisOutput::default();
    let mut next_site: u32 = 0;
    for outcome in outcomes {
        if outcome.aborted {
            out.aborted_bodies.push(outcome.name);
            continue;
        }
        out.diagnostics.extend(outcome.errors);
        for info in outcome.allocations {
            out.allocations.insert(SiteId(next_site), info);
            next_site += 1;
        }
        for (scope, steps) in outcome.drop_plans {
            out.drop_plans.insert(scope, steps);
        }
        for (key, mode) in outcome.captures {
            out.captures.insert(key, mode);
        }
    }

    dedup_diagnostics(&mut out.diagnostics);
    out
}

struct BodyOutcome {
    name: String,
    aborted: bool,
    errors: Vec<OwnError>,
    allocations: Vec<AllocationInfo>,
    drop_plans: Vec<(ScopeId, Vec<PlaceId>)>,
    captures: Vec<((ClosureId, PlaceId), CaptureMode)>,
}

fn analyze_body(ctx: &AnalysisContext, func: &FuncDef) -> BodyOutcome {
    let mut checked = move_check::check(ctx, func);
    if checked.aborted {
        return BodyOutcome {
            name: func.name.clone(),
            aborted: true,
            errors: Vec::new(),
            allocations: Vec::new(),
            drop_plans: Vec::new(),
            captures: Vec::new(),
        };
    }

    let mut errors = std::mem::take(&mut checked.errors);
    let mut captures = capture::resolve(ctx, func, &checked.facts);
    let mut escape = escape::analyze(ctx, func, &captures);

    capture::check_thread_safety(ctx, &captures, &mut errors);
    capture::check_send_safety(ctx, func, &mut errors);

    let escaping = escape.escaping_closures();
    let upgraded =
        capture::upgrade_escaping(ctx, &mut captures, &checked.facts, &escaping, &mut errors);
    escape.add_capture_cells(ctx, &upgraded);
    escape.propagate();

    // An upgraded place now lives in the closure environment; its scope
    // has nothing left to drop.
    for up in &upgraded {
        let scope = ctx.program.places.get(up.place).scope;
        if let Some(snapshot) = checked.scope_exits.get_mut(&scope) {
            snapshot.insert(up.place, OwnershipState::Moved { at: up.span });
        }
    }

    let drop_plans = drop_plan::plan(ctx, func, &checked.scope_exits, &escape);
    let allocations = escape
        .decisions(ctx.config.stack_size_threshold)
        .into_iter()
        .map(|(_, info)| info)
        .collect();
    let capture_modes = captures
        .closures
        .iter()
        .flat_map(|(&id, caps)| {
            caps.modes
                .iter()
                .map(move |(&place, &mode)| ((id, place), mode))
        })
        .collect();

    BodyOutcome {
        name: func.name.clone(),
        aborted: false,
        errors,
        allocations,
        drop_plans,
        captures: capture_modes,
    }
}

/// Drop exact repeats: same kind at the same primary span.
fn dedup_diagnostics(diagnostics: &mut Vec<OwnError>) {
    let mut seen: Vec<(Discriminant<OwnErrorKind>, Span)> = Vec::new();
    diagnostics.retain(|error| {
        let key = (discriminant(&error.kind), error.span);
        if seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    });
}

#[cfg(test)]
#[path = "../tests/t_ownck.rs"]
mod tests;
