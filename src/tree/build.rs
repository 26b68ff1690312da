//! Typed-tree construction.
//!
//! The upstream inference pass (and this crate's tests) build program trees
//! through [`Builder`], which owns the id generators and the scope/place
//! arenas so every node, place and scope comes out with a fresh id and a
//! distinct, monotonically increasing span.

use crate::diag::{Position, Span};
use crate::ids::{ClosureIdGen, NodeIdGen, PlaceId, ScopeId};
use crate::scope::{Place, PlaceTable, ScopeTree};
use crate::tree::{Arm, BindPattern, Binding, Expr, ExprKind, FuncDef, MatchPattern, Module, Program};
use crate::types::{RefKind, Type};

pub struct Builder {
    nodes: NodeIdGen,
    closures: ClosureIdGen,
    scopes: ScopeTree,
    places: PlaceTable,
    funcs: Vec<FuncDef>,
    next_line: usize,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            nodes: NodeIdGen::new(),
            closures: ClosureIdGen::new(),
            scopes: ScopeTree::new(),
            places: PlaceTable::new(),
            funcs: Vec::new(),
            next_line: 1,
        }
    }

    /// Each entity gets its own source line, so spans are unique and ordered
    /// in construction order.
    fn next_span(&mut self) -> Span {
        let line = self.next_line;
        self.next_line += 1;
        Span::new(Position::new(line, line, 1), Position::new(line, line, 10))
    }

    fn expr(&mut self, kind: ExprKind, ty: Type) -> Expr {
        Expr {
            id: self.nodes.new_id(),
            ty,
            span: self.next_span(),
            kind,
        }
    }

    // --- Scopes and places ---

    pub fn root_scope(&mut self) -> ScopeId {
        self.scopes.add_root()
    }

    pub fn scope(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.add_child(parent)
    }

    pub fn place(&mut self, scope: ScopeId, name: &str, ty: Type) -> PlaceId {
        let span = self.next_span();
        let id = self.places.add(Place {
            name: name.to_string(),
            ty,
            scope,
            span,
        });
        self.scopes.declare(scope, id);
        id
    }

    pub fn place_ty(&self, place: PlaceId) -> Type {
        self.places.get(place).ty.clone()
    }

    // --- Leaf expressions ---

    pub fn unit(&mut self) -> Expr {
        self.expr(ExprKind::Unit, Type::Unit)
    }

    pub fn int(&mut self, value: i64) -> Expr {
        self.expr(ExprKind::LitInt(value), Type::Int)
    }

    pub fn float(&mut self, value: f64) -> Expr {
        self.expr(ExprKind::LitFloat(value), Type::Float)
    }

    pub fn boolean(&mut self, value: bool) -> Expr {
        self.expr(ExprKind::LitBool(value), Type::Bool)
    }

    pub fn chr(&mut self, value: char) -> Expr {
        self.expr(ExprKind::LitChar(value), Type::Char)
    }

    pub fn string(&mut self, value: &str) -> Expr {
        self.expr(ExprKind::LitStr(value.to_string()), Type::String)
    }

    pub fn var(&mut self, place: PlaceId) -> Expr {
        let ty = self.place_ty(place);
        self.expr(ExprKind::Var { place }, ty)
    }

    // --- Bindings and blocks ---

    pub fn bind(&mut self, place: PlaceId, value: Expr) -> Binding {
        Binding {
            pattern: BindPattern::Name { place },
            value,
        }
    }

    pub fn destructure(&mut self, places: Vec<PlaceId>, value: Expr) -> Binding {
        Binding {
            pattern: BindPattern::Destructure { places },
            value,
        }
    }

    pub fn let_in(&mut self, scope: ScopeId, bindings: Vec<Binding>, body: Expr) -> Expr {
        let ty = body.ty.clone();
        self.expr(
            ExprKind::Let {
                scope,
                bindings,
                body: Box::new(body),
            },
            ty,
        )
    }

    pub fn seq(&mut self, exprs: Vec<Expr>) -> Expr {
        let ty = exprs.last().map(|e| e.ty.clone()).unwrap_or(Type::Unit);
        self.expr(ExprKind::Seq(exprs), ty)
    }

    // --- References and mutation ---

    pub fn reff(&mut self, kind: RefKind, place: PlaceId) -> Expr {
        let elem = self.place_ty(place);
        self.expr(
            ExprKind::Ref { kind, place },
            Type::Ref {
                kind,
                elem: Box::new(elem),
            },
        )
    }

    pub fn deref(&mut self, value: Expr) -> Expr {
        let Type::Ref { elem, .. } = &value.ty else {
            panic!("builder misuse: deref of non-reference type {}", value.ty);
        };
        let ty = (**elem).clone();
        self.expr(
            ExprKind::Deref {
                value: Box::new(value),
            },
            ty,
        )
    }

    pub fn assign(&mut self, target: PlaceId, value: Expr) -> Expr {
        self.expr(
            ExprKind::Assign {
                target,
                value: Box::new(value),
            },
            Type::Unit,
        )
    }

    // --- Aggregates ---

    pub fn tuple(&mut self, elems: Vec<Expr>) -> Expr {
        let ty = Type::Tuple(elems.iter().map(|e| e.ty.clone()).collect());
        self.expr(ExprKind::Tuple(elems), ty)
    }

    pub fn record(&mut self, fields: Vec<(String, Expr)>) -> Expr {
        let ty = Type::Record(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), value.ty.clone()))
                .collect(),
        );
        self.expr(ExprKind::Record { fields }, ty)
    }

    pub fn array(&mut self, elem_ty: Type, elems: Vec<Expr>) -> Expr {
        self.expr(ExprKind::ArrayLit(elems), Type::Array(Box::new(elem_ty)))
    }

    pub fn list(&mut self, elem_ty: Type, elems: Vec<Expr>) -> Expr {
        self.expr(ExprKind::ListLit(elems), Type::List(Box::new(elem_ty)))
    }

    pub fn variant(&mut self, ty: Type, tag: &str, payload: Vec<Expr>) -> Expr {
        self.expr(
            ExprKind::Variant {
                tag: tag.to_string(),
                payload,
            },
            ty,
        )
    }

    pub fn field(&mut self, target: Expr, index: usize) -> Expr {
        let ty = match &target.ty {
            Type::Tuple(elems) => elems[index].clone(),
            Type::Record(fields) => fields[index].1.clone(),
            other => panic!("builder misuse: field access on {other}"),
        };
        self.expr(
            ExprKind::Field {
                target: Box::new(target),
                index,
            },
            ty,
        )
    }

    // --- Control flow ---

    pub fn if_else(&mut self, cond: Expr, then_body: Expr, else_body: Expr) -> Expr {
        let ty = then_body.ty.clone();
        self.expr(
            ExprKind::If {
                cond: Box::new(cond),
                then_body: Box::new(then_body),
                else_body: Box::new(else_body),
            },
            ty,
        )
    }

    pub fn arm(&mut self, scope: ScopeId, pattern: MatchPattern, body: Expr) -> Arm {
        Arm {
            scope,
            pattern,
            body,
        }
    }

    pub fn case(&mut self, scrutinee: Expr, arms: Vec<Arm>) -> Expr {
        let ty = arms
            .first()
            .map(|arm| arm.body.ty.clone())
            .unwrap_or(Type::Unit);
        self.expr(
            ExprKind::Case {
                scrutinee: Box::new(scrutinee),
                arms,
            },
            ty,
        )
    }

    pub fn while_loop(&mut self, cond: Expr, body: Expr) -> Expr {
        self.expr(
            ExprKind::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
            Type::Unit,
        )
    }

    // --- Functions, closures, boundaries ---

    pub fn closure(&mut self, scope: ScopeId, params: Vec<PlaceId>, body: Expr) -> Expr {
        let ty = Type::Closure {
            params: params.iter().map(|p| self.place_ty(*p)).collect(),
            ret: Box::new(body.ty.clone()),
        };
        let id = self.closures.new_id();
        self.expr(
            ExprKind::Closure {
                id,
                scope,
                params,
                body: Box::new(body),
            },
            ty,
        )
    }

    pub fn call(&mut self, callee: Expr, args: Vec<Expr>) -> Expr {
        let ty = match &callee.ty {
            Type::Fn { ret, .. } | Type::Closure { ret, .. } => (**ret).clone(),
            other => panic!("builder misuse: call of non-function type {other}"),
        };
        self.expr(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            ty,
        )
    }

    pub fn spawn(&mut self, closure: Expr) -> Expr {
        self.expr(
            ExprKind::Spawn {
                closure: Box::new(closure),
            },
            Type::Unit,
        )
    }

    pub fn send(&mut self, channel: Expr, value: Expr) -> Expr {
        self.expr(
            ExprKind::Send {
                channel: Box::new(channel),
                value: Box::new(value),
            },
            Type::Unit,
        )
    }

    pub fn func(&mut self, name: &str, scope: ScopeId, params: Vec<PlaceId>, body: Expr) {
        self.funcs.push(FuncDef {
            name: name.to_string(),
            scope,
            params,
            body,
        });
    }

    pub fn finish(self) -> Program {
        Program {
            module: Module { funcs: self.funcs },
            scopes: self.scopes,
            places: self.places,
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
