//! Tree visitor with default traversal helpers.
//!
//! Implement the methods you care about (e.g. `visit_expr`) and call the
//! corresponding `walk_*` function to recurse into children.

use crate::tree::{Arm, Binding, Expr, ExprKind, FuncDef, Module};

pub trait Visitor: Sized {
    fn visit_module(&mut self, module: &Module) {
        walk_module(self, module)
    }

    fn visit_func_def(&mut self, func_def: &FuncDef) {
        walk_func_def(self, func_def)
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr)
    }

    fn visit_binding(&mut self, binding: &Binding) {
        walk_binding(self, binding)
    }

    fn visit_arm(&mut self, arm: &Arm) {
        walk_arm(self, arm)
    }
}

pub fn walk_module<V: Visitor>(visitor: &mut V, module: &Module) {
    for func in &module.funcs {
        visitor.visit_func_def(func);
    }
}

pub fn walk_func_def<V: Visitor>(visitor: &mut V, func_def: &FuncDef) {
    visitor.visit_expr(&func_def.body);
}

pub fn walk_expr<V: Visitor>(visitor: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Unit
        | ExprKind::LitInt(_)
        | ExprKind::LitFloat(_)
        | ExprKind::LitBool(_)
        | ExprKind::LitChar(_)
        | ExprKind::LitStr(_)
        | ExprKind::Var { .. }
        | ExprKind::Ref { .. } => {}
        ExprKind::Let { bindings, body, .. } => {
            for binding in bindings {
                visitor.visit_binding(binding);
            }
            visitor.visit_expr(body);
        }
        ExprKind::Seq(exprs) => {
            for expr in exprs {
                visitor.visit_expr(expr);
            }
        }
        ExprKind::Assign { value, .. } => visitor.visit_expr(value),
        ExprKind::Deref { value } => visitor.visit_expr(value),
        ExprKind::Tuple(elems) | ExprKind::ArrayLit(elems) | ExprKind::ListLit(elems) => {
            for elem in elems {
                visitor.visit_expr(elem);
            }
        }
        ExprKind::Record { fields } => {
            for (_, value) in fields {
                visitor.visit_expr(value);
            }
        }
        ExprKind::Variant { payload, .. } => {
            for elem in payload {
                visitor.visit_expr(elem);
            }
        }
        ExprKind::Field { target, .. } => visitor.visit_expr(target),
        ExprKind::If {
            cond,
            then_body,
            else_body,
        } => {
            visitor.visit_expr(cond);
            visitor.visit_expr(then_body);
            visitor.visit_expr(else_body);
        }
        ExprKind::Case { scrutinee, arms } => {
            visitor.visit_expr(scrutinee);
            for arm in arms {
                visitor.visit_arm(arm);
            }
        }
        ExprKind::While { cond, body } => {
            visitor.visit_expr(cond);
            visitor.visit_expr(body);
        }
        ExprKind::Closure { body, .. } => visitor.visit_expr(body),
        ExprKind::Call { callee, args } => {
            visitor.visit_expr(callee);
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::Spawn { closure } => visitor.visit_expr(closure),
        ExprKind::Send { channel, value } => {
            visitor.visit_expr(channel);
            visitor.visit_expr(value);
        }
    }
}

pub fn walk_binding<V: Visitor>(visitor: &mut V, binding: &Binding) {
    visitor.visit_expr(&binding.value);
}

pub fn walk_arm<V: Visitor>(visitor: &mut V, arm: &Arm) {
    visitor.visit_expr(&arm.body);
}
