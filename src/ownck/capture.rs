//! Closure capture resolution.
//!
//! Captures are resolved optimistically from how the closure body uses each
//! free place: plain reads borrow shared, mutation and exclusive borrows
//! borrow exclusively, and value-position uses of move-class places capture
//! by move. A borrow capture is upgraded to a move later, once escape
//! analysis proves the closure outlives its defining scope.
//!
//! Thread-safety checks run on the resolved (pre-upgrade) modes of spawned
//! closures: exclusive borrows never cross a spawn, moved values must be
//! transferable, and shared referents must be shareable.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::context::AnalysisContext;
use crate::diag::Span;
use crate::ids::{ClosureId, PlaceId, ScopeId};
use crate::ownck::errors::{OwnError, OwnErrorKind};
use crate::ownck::liveness::BodyFacts;
use crate::ownck::state::Point;
use crate::tree::visit::{self, Visitor};
use crate::tree::{BindPattern, Expr, ExprKind, FuncDef};
use crate::types::{RefKind, Type, TypeClass};

/// How a closure holds a captured place. Ordered by strength; resolving a
/// stronger use upgrades the mode, never the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CaptureMode {
    Copy,
    SharedBorrow,
    ExclusiveBorrow,
    Move,
}

#[derive(Debug)]
pub struct ClosureCaptures {
    pub scope: ScopeId,
    pub span: Span,
    /// Last program point inside the closure subtree. A place used past
    /// this point belongs to the enclosing body and cannot be
    /// move-upgraded out from under it.
    pub body_end: Point,
    pub parent: Option<ClosureId>,
    pub spawned: bool,
    pub modes: IndexMap<PlaceId, CaptureMode>,
}

#[derive(Debug, Default)]
pub struct CaptureResult {
    pub closures: IndexMap<ClosureId, ClosureCaptures>,
    /// Let bindings whose initializer is a closure literal.
    pub closure_of_place: HashMap<PlaceId, ClosureId>,
}

/// A borrow capture promoted to a move because the closure escapes.
#[derive(Debug, Clone, Copy)]
pub struct UpgradedCapture {
    pub closure: ClosureId,
    pub place: PlaceId,
    pub span: Span,
}

pub(super) fn resolve(ctx: &AnalysisContext, func: &FuncDef, facts: &BodyFacts) -> CaptureResult {
    let mut scan = Scan {
        ctx,
        facts,
        stack: Vec::new(),
        result: CaptureResult::default(),
    };
    scan.scan(&func.body);
    scan.result
}

/// Value-position uses of free move-class places inside a closure body.
/// The enclosing body's checker treats each as a move at the closure
/// construction: the place is gone once the closure holds it.
pub(super) fn syntactic_moves(
    ctx: &AnalysisContext,
    body: &Expr,
    closure_scope: ScopeId,
) -> Vec<(PlaceId, Span)> {
    let mut moves = Vec::new();
    collect_value_moves(ctx, body, closure_scope, &mut moves);
    moves
}

fn collect_value_moves(
    ctx: &AnalysisContext,
    expr: &Expr,
    closure_scope: ScopeId,
    out: &mut Vec<(PlaceId, Span)>,
) {
    match &expr.kind {
        ExprKind::Var { place } => {
            let info = ctx.program.places.get(*place);
            if !ctx.program.scopes.is_within(info.scope, closure_scope)
                && ctx.oracle.class(&info.ty) == Some(TypeClass::Move)
            {
                out.push((*place, expr.span));
            }
        }
        // Read positions never consume.
        ExprKind::Deref { .. } | ExprKind::Field { .. } => {}
        ExprKind::Call { callee, args } => {
            if !matches!(callee.kind, ExprKind::Var { .. }) {
                collect_value_moves(ctx, callee, closure_scope, out);
            }
            for arg in args {
                collect_value_moves(ctx, arg, closure_scope, out);
            }
        }
        ExprKind::Send { channel, value } => {
            if !matches!(channel.kind, ExprKind::Var { .. }) {
                collect_value_moves(ctx, channel, closure_scope, out);
            }
            collect_value_moves(ctx, value, closure_scope, out);
        }
        ExprKind::Let { bindings, body, .. } => {
            for binding in bindings {
                collect_value_moves(ctx, &binding.value, closure_scope, out);
            }
            collect_value_moves(ctx, body, closure_scope, out);
        }
        ExprKind::Seq(exprs) => {
            for expr in exprs {
                collect_value_moves(ctx, expr, closure_scope, out);
            }
        }
        ExprKind::Assign { value, .. } => collect_value_moves(ctx, value, closure_scope, out),
        ExprKind::Tuple(elems) | ExprKind::ArrayLit(elems) | ExprKind::ListLit(elems) => {
            for elem in elems {
                collect_value_moves(ctx, elem, closure_scope, out);
            }
        }
        ExprKind::Record { fields } => {
            for (_, value) in fields {
                collect_value_moves(ctx, value, closure_scope, out);
            }
        }
        ExprKind::Variant { payload, .. } => {
            for elem in payload {
                collect_value_moves(ctx, elem, closure_scope, out);
            }
        }
        ExprKind::If {
            cond,
            then_body,
            else_body,
        } => {
            collect_value_moves(ctx, cond, closure_scope, out);
            collect_value_moves(ctx, then_body, closure_scope, out);
            collect_value_moves(ctx, else_body, closure_scope, out);
        }
        ExprKind::Case { scrutinee, arms } => {
            collect_value_moves(ctx, scrutinee, closure_scope, out);
            for arm in arms {
                collect_value_moves(ctx, &arm.body, closure_scope, out);
            }
        }
        ExprKind::While { cond, body } => {
            collect_value_moves(ctx, cond, closure_scope, out);
            collect_value_moves(ctx, body, closure_scope, out);
        }
        // A nested closure's moves consume through this one.
        ExprKind::Closure { body, .. } => collect_value_moves(ctx, body, closure_scope, out),
        ExprKind::Spawn { closure } => collect_value_moves(ctx, closure, closure_scope, out),
        ExprKind::Unit
        | ExprKind::LitInt(_)
        | ExprKind::LitFloat(_)
        | ExprKind::LitBool(_)
        | ExprKind::LitChar(_)
        | ExprKind::LitStr(_)
        | ExprKind::Ref { .. } => {}
    }
}

// --- Free-place scan ---

#[derive(Clone, Copy)]
enum UseKind {
    /// Value position; moves a move-class place.
    Value,
    /// Read position (deref, field target, callee, channel).
    Read,
    SharedRef,
    ExclusiveRef,
    Mutate,
}

struct Scan<'a> {
    ctx: &'a AnalysisContext<'a>,
    facts: &'a BodyFacts,
    /// Closures currently being walked, outermost first.
    stack: Vec<ClosureId>,
    result: CaptureResult,
}

impl<'a> Scan<'a> {
    fn scan(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Var { place } => self.record(*place, UseKind::Value, expr.span),
            ExprKind::Ref { kind, place } => {
                let use_kind = match kind {
                    RefKind::Shared => UseKind::SharedRef,
                    RefKind::Exclusive => UseKind::ExclusiveRef,
                };
                self.record(*place, use_kind, expr.span);
            }
            ExprKind::Assign { target, value } => {
                self.record(*target, UseKind::Mutate, expr.span);
                self.scan(value);
            }
            ExprKind::Deref { value } => self.scan_read(value),
            ExprKind::Field { target, .. } => self.scan_read(target),
            ExprKind::Call { callee, args } => {
                self.scan_read(callee);
                for arg in args {
                    self.scan(arg);
                }
            }
            ExprKind::Send { channel, value } => {
                self.scan_read(channel);
                self.scan(value);
            }
            ExprKind::Let {
                bindings, body, ..
            } => {
                for binding in bindings {
                    if let (BindPattern::Name { place }, ExprKind::Closure { id, .. }) =
                        (&binding.pattern, &binding.value.kind)
                    {
                        self.result.closure_of_place.insert(*place, *id);
                    }
                    self.scan(&binding.value);
                }
                self.scan(body);
            }
            ExprKind::Closure {
                id, scope, body, ..
            } => {
                self.result.closures.insert(
                    *id,
                    ClosureCaptures {
                        scope: *scope,
                        span: expr.span,
                        body_end: subtree_end(self.facts, expr),
                        parent: self.stack.last().copied(),
                        spawned: false,
                        modes: IndexMap::new(),
                    },
                );
                self.stack.push(*id);
                self.scan(body);
                self.stack.pop();
            }
            ExprKind::Spawn { closure } => {
                self.scan(closure);
                let spawned = match &closure.kind {
                    ExprKind::Closure { id, .. } => Some(*id),
                    ExprKind::Var { place } => self.result.closure_of_place.get(place).copied(),
                    _ => None,
                };
                if let Some(id) = spawned {
                    if let Some(caps) = self.result.closures.get_mut(&id) {
                        caps.spawned = true;
                    }
                }
            }
            ExprKind::Seq(exprs) => {
                for expr in exprs {
                    self.scan(expr);
                }
            }
            ExprKind::Tuple(elems) | ExprKind::ArrayLit(elems) | ExprKind::ListLit(elems) => {
                for elem in elems {
                    self.scan(elem);
                }
            }
            ExprKind::Record { fields } => {
                for (_, value) in fields {
                    self.scan(value);
                }
            }
            ExprKind::Variant { payload, .. } => {
                for elem in payload {
                    self.scan(elem);
                }
            }
            ExprKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.scan(cond);
                self.scan(then_body);
                self.scan(else_body);
            }
            ExprKind::Case { scrutinee, arms } => {
                self.scan(scrutinee);
                for arm in arms {
                    self.scan(&arm.body);
                }
            }
            ExprKind::While { cond, body } => {
                self.scan(cond);
                self.scan(body);
            }
            ExprKind::Unit
            | ExprKind::LitInt(_)
            | ExprKind::LitFloat(_)
            | ExprKind::LitBool(_)
            | ExprKind::LitChar(_)
            | ExprKind::LitStr(_) => {}
        }
    }

    fn scan_read(&mut self, expr: &Expr) {
        if let ExprKind::Var { place } = &expr.kind {
            self.record(*place, UseKind::Read, expr.span);
        } else {
            self.scan(expr);
        }
    }

    /// Fold the use into the capture set of every enclosing closure the
    /// place is free in.
    fn record(&mut self, place: PlaceId, use_kind: UseKind, _span: Span) {
        if self.stack.is_empty() {
            return;
        }
        let info = self.ctx.program.places.get(place);
        let Some(class) = self.ctx.oracle.class(&info.ty) else {
            return;
        };
        let mode = match use_kind {
            UseKind::Value => match class {
                TypeClass::Copy => CaptureMode::Copy,
                TypeClass::Move => CaptureMode::Move,
            },
            UseKind::Read => match class {
                TypeClass::Copy => CaptureMode::Copy,
                TypeClass::Move => CaptureMode::SharedBorrow,
            },
            UseKind::SharedRef => CaptureMode::SharedBorrow,
            UseKind::ExclusiveRef | UseKind::Mutate => CaptureMode::ExclusiveBorrow,
        };
        for idx in 0..self.stack.len() {
            let id = self.stack[idx];
            let scope = self.result.closures[&id].scope;
            if self.ctx.program.scopes.is_within(info.scope, scope) {
                continue;
            }
            let caps = self.result.closures.get_mut(&id).unwrap_or_else(|| {
                panic!("compiler bug: closure on walk stack has no capture entry")
            });
            let entry = caps.modes.entry(place).or_insert(mode);
            *entry = (*entry).max(mode);
        }
    }
}

// --- Thread safety ---

/// Check a spawned closure's resolved modes, before any escape-driven
/// upgrade: the upgrade must never mask a violation the programmer wrote.
pub(super) fn check_thread_safety(
    ctx: &AnalysisContext,
    captures: &CaptureResult,
    errors: &mut Vec<OwnError>,
) {
    for caps in captures.closures.values() {
        if !caps.spawned {
            continue;
        }
        for (&place, &mode) in &caps.modes {
            let info = ctx.program.places.get(place);
            match mode {
                CaptureMode::ExclusiveBorrow => {
                    errors.push(
                        OwnErrorKind::ThreadSafetyViolation(info.name.clone())
                            .at(caps.span)
                            .with_related(info.span),
                    );
                }
                CaptureMode::Move => {
                    if !ctx.oracle.transferable(&info.ty) {
                        errors.push(
                            OwnErrorKind::ThreadSafetyViolation(info.name.clone())
                                .at(caps.span)
                                .with_related(info.span),
                        );
                    }
                }
                CaptureMode::SharedBorrow | CaptureMode::Copy => {
                    let referent = match &info.ty {
                        Type::Ref { elem, .. } => elem.as_ref(),
                        other => other,
                    };
                    let shareable = match mode {
                        // A copy of a non-reference copy-class value is a
                        // private duplicate; only reference captures share.
                        CaptureMode::Copy => {
                            !matches!(info.ty, Type::Ref { .. })
                                || ctx.oracle.shareable(referent)
                        }
                        _ => ctx.oracle.shareable(referent),
                    };
                    if !shareable {
                        errors.push(
                            OwnErrorKind::ThreadSafetyViolation(info.name.clone())
                                .at(caps.span)
                                .with_related(info.span),
                        );
                    }
                }
            }
        }
    }
}

/// Values sent through a channel must be transferable.
pub(super) fn check_send_safety(ctx: &AnalysisContext, func: &FuncDef, errors: &mut Vec<OwnError>) {
    let mut checker = SendChecker { ctx, errors };
    checker.visit_func_def(func);
}

struct SendChecker<'a, 'e> {
    ctx: &'a AnalysisContext<'a>,
    errors: &'e mut Vec<OwnError>,
}

impl Visitor for SendChecker<'_, '_> {
    fn visit_expr(&mut self, expr: &Expr) {
        if let ExprKind::Send { value, .. } = &expr.kind {
            if !self.ctx.oracle.transferable(&value.ty) {
                self.errors.push(
                    OwnErrorKind::ThreadSafetyViolation(value.ty.to_string()).at(value.span),
                );
            }
        }
        visit::walk_expr(self, expr);
    }
}

// --- Escape-driven upgrade ---

/// Promote borrow captures of escaping, non-spawned closures to moves. A
/// closure nested inside another escaping closure is skipped: its defining
/// frame escapes along with it, so the borrows stay valid.
///
/// A promoted place still used by the enclosing body after the closure is
/// constructed cannot be given away; that is a capture-escape error.
pub(super) fn upgrade_escaping(
    ctx: &AnalysisContext,
    captures: &mut CaptureResult,
    facts: &BodyFacts,
    escaping: &HashSet<ClosureId>,
    errors: &mut Vec<OwnError>,
) -> Vec<UpgradedCapture> {
    let eligible: Vec<ClosureId> = captures
        .closures
        .iter()
        .filter(|(id, caps)| {
            escaping.contains(id) && !caps.spawned && !parent_escapes(captures, caps, escaping)
        })
        .map(|(&id, _)| id)
        .collect();

    let mut upgraded = Vec::new();
    for id in eligible {
        let caps = &mut captures.closures[&id];
        let span = caps.span;
        let body_end = caps.body_end;
        for (&place, mode) in caps.modes.iter_mut() {
            if !matches!(
                mode,
                CaptureMode::SharedBorrow | CaptureMode::ExclusiveBorrow
            ) {
                continue;
            }
            *mode = CaptureMode::Move;
            upgraded.push(UpgradedCapture {
                closure: id,
                place,
                span,
            });
            let info = ctx.program.places.get(place);
            let used_after = facts
                .last_use
                .get(&place)
                .is_some_and(|&last| last > body_end);
            if used_after {
                errors.push(
                    OwnErrorKind::ClosureCaptureEscapesScope(info.name.clone())
                        .at(span)
                        .with_related(info.span),
                );
            }
        }
    }
    upgraded
}

fn subtree_end(facts: &BodyFacts, expr: &Expr) -> Point {
    let mut max = facts.point(expr.id);
    for child in crate::ownck::liveness::children(expr) {
        max = max.max(subtree_end(facts, child));
    }
    max
}

fn parent_escapes(
    captures: &CaptureResult,
    caps: &ClosureCaptures,
    escaping: &HashSet<ClosureId>,
) -> bool {
    let mut curr = caps.parent;
    while let Some(id) = curr {
        if escaping.contains(&id) {
            return true;
        }
        curr = captures.closures.get(&id).and_then(|c| c.parent);
    }
    false
}

#[cfg(test)]
#[path = "../tests/t_capture.rs"]
mod tests;
