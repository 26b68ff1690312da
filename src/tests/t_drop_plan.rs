use crate::context::{AnalysisContext, Config};
use crate::ids::{PlaceId, ScopeId};
use crate::ownck::{capture, escape, move_check};
use crate::tree::Program;
use crate::tree::build::Builder;
use crate::types::{StructuralOracle, Type};

fn plans(program: &Program) -> Vec<(ScopeId, Vec<PlaceId>)> {
    let oracle = StructuralOracle::new();
    let ctx = AnalysisContext::new(program, &oracle, Config::default());
    let func = &program.module.funcs[0];
    let checked = move_check::check(&ctx, func);
    assert!(!checked.aborted);
    let captures = capture::resolve(&ctx, func, &checked.facts);
    let analysis = escape::analyze(&ctx, func, &captures);
    super::plan(&ctx, func, &checked.scope_exits, &analysis)
}

fn steps_for(plans: &[(ScopeId, Vec<PlaceId>)], scope: ScopeId) -> &[PlaceId] {
    &plans.iter().find(|(s, _)| *s == scope).unwrap().1
}

#[test]
fn owned_heap_value_gets_a_release_step() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let inner = b.scope(s0);
    let s = b.place(inner, "s", Type::String);

    let init = b.string("payload");
    let bind = b.bind(s, init);
    let tail = b.unit();
    let body = b.let_in(inner, vec![bind], tail);
    b.func("f", s0, vec![], body);

    let program = b.finish();
    let plans = plans(&program);
    assert_eq!(steps_for(&plans, inner), &[s]);
    assert!(steps_for(&plans, s0).is_empty());
}

#[test]
fn moved_out_value_is_not_released() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let inner = b.scope(s0);
    let s = b.place(inner, "s", Type::String);

    let init = b.string("payload");
    let bind = b.bind(s, init);
    let tail = b.var(s);
    let body = b.let_in(inner, vec![bind], tail);
    b.func("f", s0, vec![], body);

    let program = b.finish();
    let plans = plans(&program);
    assert!(steps_for(&plans, inner).is_empty());
}

#[test]
fn copy_bindings_need_no_release() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let inner = b.scope(s0);
    let n = b.place(inner, "n", Type::Int);

    let init = b.int(7);
    let bind = b.bind(n, init);
    let tail = b.unit();
    let body = b.let_in(inner, vec![bind], tail);
    b.func("f", s0, vec![], body);

    let program = b.finish();
    let plans = plans(&program);
    assert!(steps_for(&plans, inner).is_empty());
}

#[test]
fn stack_placed_aggregate_unwinds_implicitly() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let inner = b.scope(s0);
    let p = b.place(inner, "p", Type::Tuple(vec![Type::String, Type::String]));

    let first = b.string("a");
    let second = b.string("b");
    let value = b.tuple(vec![first, second]);
    let bind = b.bind(p, value);
    let tail = b.unit();
    let body = b.let_in(inner, vec![bind], tail);
    b.func("f", s0, vec![], body);

    let program = b.finish();
    let plans = plans(&program);
    assert!(steps_for(&plans, inner).is_empty());
}

#[test]
fn parameters_have_no_backing_site() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let s = b.place(s0, "s", Type::String);

    let body = b.unit();
    b.func("f", s0, vec![s], body);

    let program = b.finish();
    let plans = plans(&program);
    assert!(steps_for(&plans, s0).is_empty());
}

#[test]
fn release_order_reverses_declaration_order() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let inner = b.scope(s0);
    let a = b.place(inner, "a", Type::String);
    let second = b.place(inner, "b", Type::String);

    let init_a = b.string("a");
    let bind_a = b.bind(a, init_a);
    let init_b = b.string("b");
    let bind_b = b.bind(second, init_b);
    let tail = b.unit();
    let body = b.let_in(inner, vec![bind_a, bind_b], tail);
    b.func("f", s0, vec![], body);

    let program = b.finish();
    let plans = plans(&program);
    assert_eq!(steps_for(&plans, inner), &[second, a]);
}

#[test]
fn scopes_are_planned_innermost_first() {
    let mut b = Builder::new();
    let s0 = b.root_scope();
    let outer = b.scope(s0);
    let inner = b.scope(outer);
    let x = b.place(outer, "x", Type::String);
    let y = b.place(inner, "y", Type::String);

    let init_y = b.string("y");
    let bind_y = b.bind(y, init_y);
    let tail = b.unit();
    let inner_let = b.let_in(inner, vec![bind_y], tail);
    let init_x = b.string("x");
    let bind_x = b.bind(x, init_x);
    let body = b.let_in(outer, vec![bind_x], inner_let);
    b.func("f", s0, vec![], body);

    let program = b.finish();
    let plans = plans(&program);
    let inner_pos = plans.iter().position(|(s, _)| *s == inner).unwrap();
    let outer_pos = plans.iter().position(|(s, _)| *s == outer).unwrap();
    assert!(inner_pos < outer_pos);
    assert_eq!(steps_for(&plans, inner), &[y]);
    assert_eq!(steps_for(&plans, outer), &[x]);
}
