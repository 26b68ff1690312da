use crate::context::{AnalysisContext, Config};
use crate::ownck::errors::OwnErrorKind;
use crate::tree::MatchPattern;
use crate::tree::Program;
use crate::tree::build::Builder;
use crate::types::{RefKind, StructuralOracle, Type};

use super::MoveCheckResult;

fn check(program: &Program) -> MoveCheckResult {
    let oracle = StructuralOracle::new();
    let ctx = AnalysisContext::new(program, &oracle, Config::default());
    super::check(&ctx, &program.module.funcs[0])
}

fn string_pair() -> Type {
    Type::Tuple(vec![Type::String, Type::String])
}

#[test]
fn move_then_use_is_rejected() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let x = b.place(s0, "x", Type::String);
    let inner = b.scope(s0);
    let y = b.place(inner, "y", Type::String);

    let init = b.var(x);
    let bind_y = b.bind(y, init);
    let reuse = b.var(x);
    let body = b.let_in(inner, vec![bind_y], reuse);
    b.func("f", s0, vec![x], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(&result.errors[0].kind, OwnErrorKind::UseAfterMove(n) if n == "x"));
    // The move site is attached for the two-point rendering.
    assert!(result.errors[0].related.is_some());
}

#[test]
fn copy_class_reads_do_not_move() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let x = b.place(s0, "x", Type::Int);
    let inner = b.scope(s0);
    let y = b.place(inner, "y", Type::Int);

    let init = b.var(x);
    let bind_y = b.bind(y, init);
    let reuse = b.var(x);
    let body = b.let_in(inner, vec![bind_y], reuse);
    b.func("f", s0, vec![x], body);

    let result = check(&b.finish());
    assert!(result.errors.is_empty());
}

#[test]
fn rebinding_restores_ownership() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let x = b.place(s0, "x", Type::String);
    let inner = b.scope(s0);
    let y = b.place(inner, "y", Type::String);

    let moved = b.var(x);
    let bind_y = b.bind(y, moved);
    let fresh = b.string("again");
    let bind_x = b.bind(x, fresh);
    let reuse = b.var(x);
    let body = b.let_in(inner, vec![bind_y, bind_x], reuse);
    b.func("f", s0, vec![x], body);

    let result = check(&b.finish());
    assert!(result.errors.is_empty());
}

#[test]
fn field_read_of_move_class_component_is_partial_move() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let p = b.place(s0, "p", string_pair());

    let target = b.var(p);
    let body = b.field(target, 0);
    b.func("f", s0, vec![p], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(&result.errors[0].kind, OwnErrorKind::PartialMove(n) if n == "p"));
}

#[test]
fn destructure_consumes_the_whole_value() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let p = b.place(s0, "p", string_pair());
    let inner = b.scope(s0);
    let a = b.place(inner, "a", Type::String);
    let second = b.place(inner, "b", Type::String);

    let scrutinee = b.var(p);
    let bind = b.destructure(vec![a, second], scrutinee);
    let reuse = b.var(p);
    let body = b.let_in(inner, vec![bind], reuse);
    b.func("f", s0, vec![p], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(&result.errors[0].kind, OwnErrorKind::UseAfterMove(n) if n == "p"));
}

#[test]
fn two_live_exclusive_borrows_conflict() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let x = b.place(s0, "x", Type::String);
    let inner = b.scope(s0);
    let excl = Type::Ref {
        kind: RefKind::Exclusive,
        elem: Box::new(Type::String),
    };
    let r1 = b.place(inner, "r1", excl.clone());
    let r2 = b.place(inner, "r2", excl);

    let first = b.reff(RefKind::Exclusive, x);
    let bind1 = b.bind(r1, first);
    let second = b.reff(RefKind::Exclusive, x);
    let bind2 = b.bind(r2, second);
    // r1 is still live here, so the second borrow overlaps it.
    let use_r1 = b.var(r1);
    let tail = b.deref(use_r1);
    let body = b.let_in(inner, vec![bind1, bind2], tail);
    b.func("f", s0, vec![x], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(
        matches!(&result.errors[0].kind, OwnErrorKind::OverlappingExclusiveBorrow(n) if n == "x")
    );
    assert!(result.errors[0].related.is_some());
}

#[test]
fn shared_borrows_overlap_freely() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let x = b.place(s0, "x", Type::String);
    let inner = b.scope(s0);
    let shared = Type::Ref {
        kind: RefKind::Shared,
        elem: Box::new(Type::String),
    };
    let r1 = b.place(inner, "r1", shared.clone());
    let r2 = b.place(inner, "r2", shared);

    let first = b.reff(RefKind::Shared, x);
    let bind1 = b.bind(r1, first);
    let second = b.reff(RefKind::Shared, x);
    let bind2 = b.bind(r2, second);
    let use1 = b.var(r1);
    let d1 = b.deref(use1);
    let use2 = b.var(r2);
    let d2 = b.deref(use2);
    let tail = b.seq(vec![d1, d2]);
    let body = b.let_in(inner, vec![bind1, bind2], tail);
    b.func("f", s0, vec![x], body);

    let result = check(&b.finish());
    assert!(result.errors.is_empty());
}

#[test]
fn exclusive_borrow_after_last_use_is_fine() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let x = b.place(s0, "x", Type::String);
    let sc1 = b.scope(s0);
    let excl = Type::Ref {
        kind: RefKind::Exclusive,
        elem: Box::new(Type::String),
    };
    let r1 = b.place(sc1, "r1", excl.clone());
    let sc2 = b.scope(sc1);
    let r2 = b.place(sc2, "r2", excl);

    let first = b.reff(RefKind::Exclusive, x);
    let bind1 = b.bind(r1, first);
    let use1 = b.var(r1);
    let d1 = b.deref(use1);
    // r1's window ended at its last use above.
    let second = b.reff(RefKind::Exclusive, x);
    let bind2 = b.bind(r2, second);
    let use2 = b.var(r2);
    let d2 = b.deref(use2);
    let inner_let = b.let_in(sc2, vec![bind2], d2);
    let tail = b.seq(vec![d1, inner_let]);
    let body = b.let_in(sc1, vec![bind1], tail);
    b.func("f", s0, vec![x], body);

    let result = check(&b.finish());
    assert!(result.errors.is_empty());
}

#[test]
fn moving_a_borrowed_place_conflicts() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let x = b.place(s0, "x", Type::String);
    let inner = b.scope(s0);
    let shared = Type::Ref {
        kind: RefKind::Shared,
        elem: Box::new(Type::String),
    };
    let r = b.place(inner, "r", shared);

    let borrow = b.reff(RefKind::Shared, x);
    let bind_r = b.bind(r, borrow);
    let moved = b.var(x);
    let use_r = b.var(r);
    let d = b.deref(use_r);
    let tail = b.seq(vec![moved, d]);
    let body = b.let_in(inner, vec![bind_r], tail);
    b.func("f", s0, vec![x], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(
        matches!(&result.errors[0].kind, OwnErrorKind::OverlappingExclusiveBorrow(n) if n == "x")
    );
}

#[test]
fn assignment_through_shared_ref_is_rejected() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let x = b.place(s0, "x", Type::Int);
    let inner = b.scope(s0);
    let shared = Type::Ref {
        kind: RefKind::Shared,
        elem: Box::new(Type::Int),
    };
    let r = b.place(inner, "r", shared);

    let borrow = b.reff(RefKind::Shared, x);
    let bind_r = b.bind(r, borrow);
    let one = b.int(1);
    let body_tail = b.assign(r, one);
    let body = b.let_in(inner, vec![bind_r], body_tail);
    b.func("f", s0, vec![x], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(
        matches!(&result.errors[0].kind, OwnErrorKind::CannotMutateImmutableRef(n) if n == "r")
    );
}

#[test]
fn assignment_through_exclusive_ref_is_fine() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let x = b.place(s0, "x", Type::Int);
    let inner = b.scope(s0);
    let excl = Type::Ref {
        kind: RefKind::Exclusive,
        elem: Box::new(Type::Int),
    };
    let r = b.place(inner, "r", excl);

    let borrow = b.reff(RefKind::Exclusive, x);
    let bind_r = b.bind(r, borrow);
    let one = b.int(1);
    let body_tail = b.assign(r, one);
    let body = b.let_in(inner, vec![bind_r], body_tail);
    b.func("f", s0, vec![x], body);

    let result = check(&b.finish());
    assert!(result.errors.is_empty());
}

#[test]
fn borrow_escaping_its_owner_scope_is_rejected() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let inner = b.scope(s0);
    let temp = b.place(inner, "temp", Type::Int);

    let init = b.int(42);
    let bind = b.bind(temp, init);
    let tail = b.reff(RefKind::Shared, temp);
    let body = b.let_in(inner, vec![bind], tail);
    b.func("f", s0, vec![], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(&result.errors[0].kind, OwnErrorKind::BorrowOutlivesOwner(n) if n == "temp"));
}

// `let val temp = 42 in (&temp, 1) end`
#[test]
fn borrow_inside_a_returned_tuple_is_rejected() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let inner = b.scope(s0);
    let temp = b.place(inner, "temp", Type::Int);

    let init = b.int(42);
    let bind = b.bind(temp, init);
    let r = b.reff(RefKind::Shared, temp);
    let one = b.int(1);
    let tail = b.tuple(vec![r, one]);
    let body = b.let_in(inner, vec![bind], tail);
    b.func("f", s0, vec![], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(&result.errors[0].kind, OwnErrorKind::BorrowOutlivesOwner(n) if n == "temp"));
}

#[test]
fn borrow_inside_a_returned_variant_is_rejected() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let wrap = Type::Adt {
        name: "wrap".to_string(),
        recursive: false,
        variants: vec![(
            "Wrap".to_string(),
            vec![Type::Ref {
                kind: RefKind::Shared,
                elem: Box::new(Type::Int),
            }],
        )],
    };
    let inner = b.scope(s0);
    let temp = b.place(inner, "temp", Type::Int);

    let init = b.int(42);
    let bind = b.bind(temp, init);
    let r = b.reff(RefKind::Shared, temp);
    let tail = b.variant(wrap, "Wrap", vec![r]);
    let body = b.let_in(inner, vec![bind], tail);
    b.func("f", s0, vec![], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(&result.errors[0].kind, OwnErrorKind::BorrowOutlivesOwner(n) if n == "temp"));
}

#[test]
fn storing_a_borrow_of_an_inner_local_through_an_outer_cell() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let cell_ty = Type::Ref {
        kind: RefKind::Exclusive,
        elem: Box::new(Type::Ref {
            kind: RefKind::Shared,
            elem: Box::new(Type::Int),
        }),
    };
    let cell = b.place(s0, "cell", cell_ty);
    let inner = b.scope(s0);
    let temp = b.place(inner, "temp", Type::Int);

    let init = b.int(42);
    let bind = b.bind(temp, init);
    let r = b.reff(RefKind::Shared, temp);
    let tail = b.assign(cell, r);
    let body = b.let_in(inner, vec![bind], tail);
    b.func("f", s0, vec![cell], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(&result.errors[0].kind, OwnErrorKind::BorrowOutlivesOwner(n) if n == "temp"));
}

#[test]
fn storing_a_borrow_of_a_same_scope_local_is_fine() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let cell_ty = Type::Ref {
        kind: RefKind::Exclusive,
        elem: Box::new(Type::Ref {
            kind: RefKind::Shared,
            elem: Box::new(Type::Int),
        }),
    };
    let cell = b.place(s0, "cell", cell_ty);
    let x = b.place(s0, "x", Type::Int);

    let r = b.reff(RefKind::Shared, x);
    let body = b.assign(cell, r);
    b.func("f", s0, vec![cell, x], body);

    let result = check(&b.finish());
    assert!(result.errors.is_empty());
}

#[test]
fn returning_a_borrow_of_a_local_is_rejected() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let x = b.place(s0, "x", Type::Int);

    let body = b.reff(RefKind::Shared, x);
    b.func("f", s0, vec![x], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(&result.errors[0].kind, OwnErrorKind::BorrowOutlivesOwner(n) if n == "x"));
}

#[test]
fn a_move_on_one_branch_poisons_the_join() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let c = b.place(s0, "c", Type::Bool);
    let x = b.place(s0, "x", Type::String);
    let sc_then = b.scope(s0);
    let y = b.place(sc_then, "y", Type::String);

    let cond = b.var(c);
    let moved = b.var(x);
    let bind_y = b.bind(y, moved);
    let then_tail = b.unit();
    let then_body = b.let_in(sc_then, vec![bind_y], then_tail);
    let else_body = b.unit();
    let branch = b.if_else(cond, then_body, else_body);
    let reuse = b.var(x);
    let body = b.seq(vec![branch, reuse]);
    b.func("f", s0, vec![c, x], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(&result.errors[0].kind, OwnErrorKind::UseAfterMove(n) if n == "x"));
}

#[test]
fn consuming_case_forks_and_joins_arms() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let opt = Type::Adt {
        name: "option".to_string(),
        recursive: false,
        variants: vec![
            ("None".to_string(), vec![]),
            ("Some".to_string(), vec![Type::String]),
        ],
    };
    let s = b.place(s0, "s", opt);
    let sc_some = b.scope(s0);
    let v = b.place(sc_some, "v", Type::String);
    let sc_none = b.scope(s0);

    let scrutinee = b.var(s);
    let some_body = b.var(v);
    let some_arm = b.arm(
        sc_some,
        MatchPattern::Variant {
            tag: "Some".to_string(),
            binds: vec![v],
        },
        some_body,
    );
    let none_body = b.string("none");
    let none_arm = b.arm(sc_none, MatchPattern::Wildcard, none_body);
    let case = b.case(scrutinee, vec![some_arm, none_arm]);
    let reuse = b.var(s);
    let body = b.seq(vec![case, reuse]);
    b.func("f", s0, vec![s], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(&result.errors[0].kind, OwnErrorKind::UseAfterMove(n) if n == "s"));
}

#[test]
fn loop_reuse_of_a_moved_value_is_reported() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let c = b.place(s0, "c", Type::Bool);
    let x = b.place(s0, "x", Type::String);
    let sc = b.scope(s0);
    let y = b.place(sc, "y", Type::String);

    let cond = b.var(c);
    let moved = b.var(x);
    let bind_y = b.bind(y, moved);
    let tail = b.unit();
    let loop_body = b.let_in(sc, vec![bind_y], tail);
    let body = b.while_loop(cond, loop_body);
    b.func("f", s0, vec![c, x], body);

    let result = check(&b.finish());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(&result.errors[0].kind, OwnErrorKind::LoopReuseAfterMove(n) if n == "x"));
}

#[test]
fn borrows_do_not_survive_the_back_edge() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let c = b.place(s0, "c", Type::Bool);
    let x = b.place(s0, "x", Type::String);
    let sc = b.scope(s0);
    let excl = Type::Ref {
        kind: RefKind::Exclusive,
        elem: Box::new(Type::String),
    };
    let r = b.place(sc, "r", excl);

    let cond = b.var(c);
    let borrow = b.reff(RefKind::Exclusive, x);
    let bind_r = b.bind(r, borrow);
    let use_r = b.var(r);
    let tail = b.deref(use_r);
    let loop_body = b.let_in(sc, vec![bind_r], tail);
    let body = b.while_loop(cond, loop_body);
    b.func("f", s0, vec![c, x], body);

    let result = check(&b.finish());
    assert!(result.errors.is_empty());
}

#[test]
fn unclassifiable_type_aborts_the_body() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let x = b.place(s0, "x", Type::Opaque("Ffi.handle".to_string()));

    let body = b.var(x);
    b.func("f", s0, vec![x], body);

    let result = check(&b.finish());
    assert!(result.aborted);
    assert!(result.errors.is_empty());
}

#[test]
fn scope_exit_snapshots_record_ownership() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let x = b.place(s0, "x", Type::String);
    let inner = b.scope(s0);
    let y = b.place(inner, "y", Type::String);

    let moved = b.var(x);
    let bind_y = b.bind(y, moved);
    let tail = b.unit();
    let body = b.let_in(inner, vec![bind_y], tail);
    b.func("f", s0, vec![x], body);

    let result = check(&b.finish());
    assert!(result.errors.is_empty());
    let root_exit = &result.scope_exits[&s0];
    assert!(root_exit[&x].is_moved());
    let inner_exit = &result.scope_exits[&inner];
    assert!(!inner_exit[&y].is_moved());
}
