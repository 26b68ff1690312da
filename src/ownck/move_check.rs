//! Flow-sensitive move/borrow checking.
//!
//! Semantics:
//! - Binding from a move-class source place marks the source `Moved`; any
//!   later read, move or borrow of it is a use-after-move until re-bound.
//! - Binding from a copy-class expression duplicates; the source keeps its
//!   state.
//! - Reference creation inserts a borrow record; at most one live exclusive
//!   record per place, and exclusive excludes shared.
//! - Field reads never move; moving a component requires a whole-value
//!   destructure.
//! - A scope's tail value carries its borrow records, through aggregate
//!   construction included; a carried borrow of a scope-local is rejected at
//!   the scope's exit, as is storing one through a longer-lived reference.
//! - Branch arms fork the state and join with moved-union / borrow-intersect.
//! - Loop bodies run to a fixpoint; a re-read of a place moved by an earlier
//!   iteration is a loop-reuse error, and no borrow survives the back edge.
//!
//! Errors are non-fatal to the pass: the walk continues to surface further
//! independent diagnostics. An unclassifiable type aborts this body only.

use std::collections::HashMap;

use crate::context::AnalysisContext;
use crate::diag::Span;
use crate::ids::{PlaceId, ScopeId};
use crate::ownck::capture;
use crate::ownck::errors::{OwnError, OwnErrorKind};
use crate::ownck::liveness::{self, BodyFacts};
use crate::ownck::state::{BorrowRecord, FlowState, OwnershipState};
use crate::tree::{Arm, BindPattern, Expr, ExprKind, FuncDef, MatchPattern};
use crate::types::{RefKind, Type, TypeClass};

pub struct MoveCheckResult {
    pub errors: Vec<OwnError>,
    pub borrows: Vec<BorrowRecord>,
    /// Ownership of each scope's own places at that scope's exit.
    pub scope_exits: HashMap<ScopeId, HashMap<PlaceId, OwnershipState>>,
    pub facts: BodyFacts,
    /// Set when a type in this body could not be classified; the partial
    /// results must not be consumed.
    pub aborted: bool,
}

pub(super) fn check(ctx: &AnalysisContext, func: &FuncDef) -> MoveCheckResult {
    let facts = liveness::analyze(&func.body);
    let mut checker = Checker {
        ctx,
        facts,
        state: FlowState::new(),
        borrows: Vec::new(),
        ref_targets: HashMap::new(),
        scope_exits: HashMap::new(),
        errors: Vec::new(),
        aborted: false,
        loop_repass: false,
    };

    let summary = checker.eval(&func.body);
    checker.exit_scope(func.scope, func.body.span, summary);

    MoveCheckResult {
        errors: checker.errors,
        borrows: checker.borrows,
        scope_exits: checker.scope_exits,
        facts: checker.facts,
        aborted: checker.aborted,
    }
}

/// What an expression evaluates to, as far as borrow tracking cares: either
/// an ordinary value or a value carrying one or more borrow records. An
/// aggregate built over references carries every component's record, so a
/// reference smuggled out inside a tuple is still caught at scope exit.
#[derive(Debug, Clone)]
enum Value {
    Plain,
    Borrow { records: Vec<usize> },
}

impl Value {
    fn from_records(records: Vec<usize>) -> Value {
        if records.is_empty() {
            Value::Plain
        } else {
            Value::Borrow { records }
        }
    }

    fn records(&self) -> &[usize] {
        match self {
            Value::Plain => &[],
            Value::Borrow { records } => records,
        }
    }

    fn merge(self, other: Value) -> Value {
        let mut records = match self {
            Value::Plain => Vec::new(),
            Value::Borrow { records } => records,
        };
        records.extend_from_slice(other.records());
        Value::from_records(records)
    }
}

struct Checker<'a> {
    ctx: &'a AnalysisContext<'a>,
    facts: BodyFacts,
    state: FlowState,
    borrows: Vec<BorrowRecord>,
    /// Which place each live reference binding borrows.
    ref_targets: HashMap<PlaceId, (PlaceId, RefKind)>,
    scope_exits: HashMap<ScopeId, HashMap<PlaceId, OwnershipState>>,
    errors: Vec<OwnError>,
    aborted: bool,
    /// Re-walking a loop body against post-iteration state; moved-value
    /// uses report as loop reuse.
    loop_repass: bool,
}

impl<'a> Checker<'a> {
    fn eval(&mut self, expr: &Expr) -> Value {
        if self.aborted {
            return Value::Plain;
        }
        let point = self.facts.point(expr.id);
        self.expire_borrows(point);

        match &expr.kind {
            ExprKind::Unit
            | ExprKind::LitInt(_)
            | ExprKind::LitFloat(_)
            | ExprKind::LitBool(_)
            | ExprKind::LitChar(_)
            | ExprKind::LitStr(_) => Value::Plain,

            ExprKind::Var { place } => self.use_place(*place, point, expr.span),

            ExprKind::Ref { kind, place } => {
                self.check_not_moved(*place, expr.span);
                // A new exclusive borrow tolerates nothing live; a new
                // shared borrow tolerates only other shared borrows.
                self.check_borrow_conflict(*place, *kind == RefKind::Exclusive, expr.span);
                let record = self.insert_borrow(*kind, *place, point, expr.span);
                Value::Borrow {
                    records: vec![record],
                }
            }

            ExprKind::Let {
                scope,
                bindings,
                body,
            } => {
                for binding in bindings {
                    let value = self.eval(&binding.value);
                    self.bind_pattern(&binding.pattern, value);
                }
                let summary = self.eval(body);
                self.exit_scope(*scope, body.span, summary)
            }

            ExprKind::Seq(exprs) => {
                let mut last = Value::Plain;
                for expr in exprs {
                    last = self.eval(expr);
                }
                last
            }

            ExprKind::Assign { target, value } => {
                let stored = self.eval(value);
                self.check_assign_target(*target, expr.span);
                self.check_stored_borrows(*target, &stored, expr.span);
                Value::Plain
            }

            ExprKind::Deref { value } => {
                self.eval_read(value);
                Value::Plain
            }

            ExprKind::Tuple(elems) | ExprKind::ArrayLit(elems) | ExprKind::ListLit(elems) => {
                let mut records = Vec::new();
                for elem in elems {
                    records.extend_from_slice(self.eval(elem).records());
                }
                Value::from_records(records)
            }

            ExprKind::Record { fields } => {
                let mut records = Vec::new();
                for (_, value) in fields {
                    records.extend_from_slice(self.eval(value).records());
                }
                Value::from_records(records)
            }

            ExprKind::Variant { payload, .. } => {
                let mut records = Vec::new();
                for elem in payload {
                    records.extend_from_slice(self.eval(elem).records());
                }
                Value::from_records(records)
            }

            ExprKind::Field { target, .. } => {
                self.eval_read(target);
                if self.classify(&expr.ty) == Some(TypeClass::Move) {
                    let name = self.describe(target);
                    self.errors
                        .push(OwnErrorKind::PartialMove(name).at(expr.span));
                }
                Value::Plain
            }

            ExprKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.eval(cond);
                let base = self.state.clone();

                let then_value = self.eval(then_body);
                let then_state = std::mem::replace(&mut self.state, base);
                let else_value = self.eval(else_body);
                let else_state = std::mem::take(&mut self.state);

                self.state = FlowState::join_arms(vec![then_state, else_state]);
                then_value.merge(else_value)
            }

            ExprKind::Case { scrutinee, arms } => self.eval_case(scrutinee, arms),

            ExprKind::While { cond, body } => {
                self.eval(cond);
                self.eval_loop_body(body);
                Value::Plain
            }

            ExprKind::Closure { scope, body, .. } => {
                // The closure runs later (or never): its body is checked
                // against a fork of the current state whose effects are
                // discarded. Capture resolution owns the interaction with
                // the enclosing body.
                let saved = self.state.clone();
                let summary = self.eval(body);
                self.exit_scope(*scope, body.span, summary);
                self.state = saved;
                // Constructing the closure consumes every free move-class
                // place its body uses in value position.
                for (place, use_span) in capture::syntactic_moves(self.ctx, body, *scope) {
                    if self.check_not_moved(place, use_span) {
                        self.check_borrow_conflict(place, true, use_span);
                        self.state.mark_moved(place, use_span);
                    }
                }
                Value::Plain
            }

            ExprKind::Call { callee, args } => {
                self.eval_read(callee);
                for arg in args {
                    self.eval(arg);
                }
                Value::Plain
            }

            ExprKind::Spawn { closure } => {
                self.eval(closure);
                Value::Plain
            }

            ExprKind::Send { channel, value } => {
                self.eval_read(channel);
                self.eval(value);
                Value::Plain
            }
        }
    }

    /// Non-consuming evaluation: a plain variable is read, not moved.
    fn eval_read(&mut self, expr: &Expr) {
        if let ExprKind::Var { place } = &expr.kind {
            self.check_not_moved(*place, expr.span);
            self.check_borrow_conflict(*place, false, expr.span);
        } else {
            self.eval(expr);
        }
    }

    /// A variable in value position: a copy-class read, or a move that
    /// invalidates the source.
    fn use_place(&mut self, place: PlaceId, point: u32, span: Span) -> Value {
        let ty = self.ctx.program.places.get(place).ty.clone();
        let Some(class) = self.classify(&ty) else {
            return Value::Plain;
        };

        if !self.check_not_moved(place, span) {
            return Value::Plain;
        }

        match class {
            TypeClass::Move => {
                self.check_borrow_conflict(place, true, span);
                self.state.mark_moved(place, span);
                // Moving an exclusive-reference binding transfers its
                // borrow record to the new owner.
                self.live_record_of(place)
                    .map(|record| Value::Borrow {
                        records: vec![record],
                    })
                    .unwrap_or(Value::Plain)
            }
            TypeClass::Copy => {
                self.check_borrow_conflict(place, false, span);
                // Copying a shared reference opens an independent borrow
                // window for the copy.
                if let Some(&(borrowed, RefKind::Shared)) = self.ref_targets.get(&place) {
                    let record = self.insert_borrow(RefKind::Shared, borrowed, point, span);
                    return Value::Borrow {
                        records: vec![record],
                    };
                }
                Value::Plain
            }
        }
    }

    fn eval_case(&mut self, scrutinee: &Expr, arms: &[Arm]) -> Value {
        let consuming = arms.iter().any(|arm| arm.pattern.binds());
        if consuming {
            self.eval(scrutinee);
        } else {
            self.eval_read(scrutinee);
        }

        let base = self.state.clone();
        let mut arm_states = Vec::with_capacity(arms.len());
        let mut summary = Value::Plain;
        for arm in arms {
            self.state = base.clone();
            match &arm.pattern {
                MatchPattern::Wildcard => {}
                MatchPattern::Bind { place } => self.state.rebind(*place),
                MatchPattern::Variant { binds, .. } => {
                    for place in binds {
                        self.state.rebind(*place);
                    }
                }
            }
            let value = self.eval(&arm.body);
            let value = self.exit_scope(arm.scope, arm.body.span, value);
            summary = summary.merge(value);
            arm_states.push(std::mem::take(&mut self.state));
        }
        if !arm_states.is_empty() {
            self.state = FlowState::join_arms(arm_states);
        } else {
            self.state = base;
        }
        summary
    }

    /// Loop fixpoint: walk the body once, and if that moved anything new,
    /// walk it again against the post-iteration state so a use on a later
    /// iteration is caught. No borrow survives the back edge.
    fn eval_loop_body(&mut self, body: &Expr) {
        let entry = self.state.clone();
        let moved_before = self.state.moved_set();

        self.eval(body);
        self.kill_all_borrows();

        let moved_after = self.state.moved_set();
        if moved_after != moved_before && !self.aborted {
            let saved_flag = self.loop_repass;
            self.loop_repass = true;
            self.eval(body);
            self.loop_repass = saved_flag;
            self.kill_all_borrows();
        }

        // The loop may run zero times.
        let exit = std::mem::take(&mut self.state);
        self.state = FlowState::join_arms(vec![entry, exit]);
    }

    // --- Bindings and scopes ---

    fn bind_pattern(&mut self, pattern: &BindPattern, value: Value) {
        match pattern {
            BindPattern::Name { place } => {
                self.state.rebind(*place);
                for &record in value.records() {
                    self.attach_borrower(record, *place);
                }
            }
            BindPattern::Destructure { places } => {
                // The destructure consumed the scrutinee whole; every
                // component starts out owned.
                for place in places {
                    self.state.rebind(*place);
                }
            }
        }
    }

    fn attach_borrower(&mut self, record: usize, place: PlaceId) {
        let rec = &mut self.borrows[record];
        rec.borrower = Some(place);
        let last = self.facts.last_use.get(&place).copied().unwrap_or(rec.start);
        rec.end = last.max(rec.start);
        self.ref_targets.insert(place, (rec.place, rec.kind));
    }

    /// Scope exit: snapshot what the scope still owns, end every borrow
    /// whose borrower or owner dies here, and reject a reference value that
    /// would outlive a place owned by this scope.
    fn exit_scope(&mut self, scope: ScopeId, tail_span: Span, summary: Value) -> Value {
        let scopes = &self.ctx.program.scopes;
        let places = &self.ctx.program.places;

        let snapshot: HashMap<PlaceId, OwnershipState> = scopes
            .get(scope)
            .places
            .iter()
            .map(|&place| (place, self.state.ownership(place)))
            .collect();
        self.scope_exits.insert(scope, snapshot);

        // Every borrow the tail value carries, bare or inside an aggregate,
        // must outlast this scope's own places.
        let mut kept = Vec::new();
        for &record in summary.records() {
            let borrowed = self.borrows[record].place;
            if scopes.is_within(places.get(borrowed).scope, scope) {
                let name = places.get(borrowed).name.clone();
                self.errors.push(
                    OwnErrorKind::BorrowOutlivesOwner(name)
                        .at(tail_span)
                        .with_related(self.borrows[record].span),
                );
            } else {
                kept.push(record);
            }
        }
        let result = Value::from_records(kept);

        let dying: Vec<usize> = self
            .state
            .live
            .iter()
            .copied()
            .filter(|&idx| {
                let rec = &self.borrows[idx];
                let borrower_dies = rec
                    .borrower
                    .is_some_and(|b| scopes.is_within(places.get(b).scope, scope));
                let owner_dies = scopes.is_within(places.get(rec.place).scope, scope);
                borrower_dies || owner_dies
            })
            .collect();
        for idx in dying {
            self.state.live.remove(&idx);
        }

        result
    }

    // --- Borrow bookkeeping ---

    fn insert_borrow(&mut self, kind: RefKind, place: PlaceId, start: u32, span: Span) -> usize {
        let idx = self.borrows.len();
        self.borrows.push(BorrowRecord {
            kind,
            place,
            borrower: None,
            start,
            // Until bound to a borrower, the window is the creation point.
            end: start,
            span,
        });
        self.state.live.insert(idx);
        idx
    }

    fn expire_borrows(&mut self, point: u32) {
        let borrows = &self.borrows;
        self.state.live.retain(|&idx| borrows[idx].end >= point);
    }

    fn kill_all_borrows(&mut self) {
        self.state.live.clear();
    }

    fn live_record_of(&self, borrower: PlaceId) -> Option<usize> {
        self.state
            .live
            .iter()
            .copied()
            .find(|&idx| self.borrows[idx].borrower == Some(borrower))
    }

    // --- Checks ---

    /// Returns false (and reports) if the place is already moved.
    fn check_not_moved(&mut self, place: PlaceId, span: Span) -> bool {
        if let OwnershipState::Moved { at } = self.state.ownership(place) {
            // The loop re-walk revisits sites already diagnosed on the
            // first pass; keep the straight-line diagnostic.
            let already = self.loop_repass
                && self.errors.iter().any(|e| {
                    e.span == span
                        && matches!(
                            e.kind,
                            OwnErrorKind::UseAfterMove(_) | OwnErrorKind::LoopReuseAfterMove(_)
                        )
                });
            if already {
                return false;
            }
            let name = self.ctx.program.places.get(place).name.clone();
            let kind = if self.loop_repass {
                OwnErrorKind::LoopReuseAfterMove(name)
            } else {
                OwnErrorKind::UseAfterMove(name)
            };
            self.errors.push(kind.at(span).with_related(at));
            return false;
        }
        true
    }

    /// `exclusive_access` is a move, mutation or new exclusive borrow: it
    /// conflicts with any live record. A read or new shared borrow
    /// conflicts only with a live exclusive record.
    fn check_borrow_conflict(&mut self, place: PlaceId, exclusive_access: bool, span: Span) {
        let conflicting = self.state.live.iter().copied().find(|&idx| {
            let rec = &self.borrows[idx];
            rec.place == place && (exclusive_access || rec.kind == RefKind::Exclusive)
        });
        if let Some(idx) = conflicting {
            let name = self.ctx.program.places.get(place).name.clone();
            self.errors.push(
                OwnErrorKind::OverlappingExclusiveBorrow(name)
                    .at(span)
                    .with_related(self.borrows[idx].span),
            );
        }
    }

    /// A borrow stored through a reference lands in storage that lives at
    /// least as long as the target binding; a referent declared more deeply
    /// than the target would dangle.
    fn check_stored_borrows(&mut self, target: PlaceId, stored: &Value, span: Span) {
        let scopes = &self.ctx.program.scopes;
        let places = &self.ctx.program.places;
        let target_scope = places.get(target).scope;
        for &record in stored.records() {
            let borrowed = self.borrows[record].place;
            let owner_scope = places.get(borrowed).scope;
            if owner_scope != target_scope && scopes.is_within(owner_scope, target_scope) {
                self.errors.push(
                    OwnErrorKind::BorrowOutlivesOwner(places.get(borrowed).name.clone())
                        .at(span)
                        .with_related(self.borrows[record].span),
                );
            }
        }
    }

    fn check_assign_target(&mut self, target: PlaceId, span: Span) {
        if !self.check_not_moved(target, span) {
            return;
        }
        let place = self.ctx.program.places.get(target);
        let exclusive = matches!(
            place.ty,
            Type::Ref {
                kind: RefKind::Exclusive,
                ..
            }
        );
        if !exclusive {
            self.errors
                .push(OwnErrorKind::CannotMutateImmutableRef(place.name.clone()).at(span));
        }
    }

    fn classify(&mut self, ty: &Type) -> Option<TypeClass> {
        let class = self.ctx.oracle.class(ty);
        if class.is_none() {
            self.aborted = true;
        }
        class
    }

    fn describe(&self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Var { place } => self.ctx.program.places.get(*place).name.clone(),
            _ => expr.ty.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "../tests/t_move_check.rs"]
mod tests;
