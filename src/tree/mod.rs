//! The typed program tree consumed by the ownership core.
//!
//! Produced by the upstream inference pass: every expression node carries
//! its inferred type. Node kinds are a closed tagged-variant set; each pass
//! is a plain traversal function over the same shape (see [`visit`]).

pub mod build;
pub mod visit;

use crate::diag::Span;
use crate::ids::{ClosureId, NodeId, PlaceId, ScopeId};
use crate::scope::{PlaceTable, ScopeTree};
use crate::types::{RefKind, Type};

/// A whole compilation unit: the module plus the scope/place arenas built
/// alongside it by the upstream pass.
#[derive(Debug)]
pub struct Program {
    pub module: Module,
    pub scopes: ScopeTree,
    pub places: PlaceTable,
}

#[derive(Debug)]
pub struct Module {
    pub funcs: Vec<FuncDef>,
}

#[derive(Debug)]
pub struct FuncDef {
    pub name: String,
    /// Root scope of the body; parameters are declared directly in it.
    pub scope: ScopeId,
    pub params: Vec<PlaceId>,
    pub body: Expr,
}

#[derive(Debug)]
pub struct Expr {
    pub id: NodeId,
    pub ty: Type,
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug)]
pub enum ExprKind {
    Unit,
    LitInt(i64),
    LitFloat(f64),
    LitBool(bool),
    LitChar(char),
    /// String literals construct a heap-class value, so they are allocation
    /// sites like any other aggregate.
    LitStr(String),
    Var {
        place: PlaceId,
    },
    /// `let val p = e ... in body end`; bindings evaluate in order, the body
    /// evaluates in `scope`.
    Let {
        scope: ScopeId,
        bindings: Vec<Binding>,
        body: Box<Expr>,
    },
    /// `(e1; e2; ...)`, value of the last expression.
    Seq(Vec<Expr>),
    /// `target := value`; `target` must denote a live, owned
    /// exclusive-reference binding.
    Assign {
        target: PlaceId,
        value: Box<Expr>,
    },
    /// `&place` / `&mut place`.
    Ref {
        kind: RefKind,
        place: PlaceId,
    },
    /// `*value`.
    Deref {
        value: Box<Expr>,
    },
    Tuple(Vec<Expr>),
    Record {
        fields: Vec<(String, Expr)>,
    },
    ArrayLit(Vec<Expr>),
    ListLit(Vec<Expr>),
    Variant {
        tag: String,
        payload: Vec<Expr>,
    },
    /// `#index target`: a field/element read. Never a move; moving a
    /// component requires a full destructuring binding.
    Field {
        target: Box<Expr>,
        index: usize,
    },
    If {
        cond: Box<Expr>,
        then_body: Box<Expr>,
        else_body: Box<Expr>,
    },
    Case {
        scrutinee: Box<Expr>,
        arms: Vec<Arm>,
    },
    While {
        cond: Box<Expr>,
        body: Box<Expr>,
    },
    /// `fn (params) => body`; `scope` is the closure's own root scope.
    Closure {
        id: ClosureId,
        scope: ScopeId,
        params: Vec<PlaceId>,
        body: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Concurrency-spawn boundary: runs the closure on another thread.
    Spawn {
        closure: Box<Expr>,
    },
    /// Message-send boundary: transfers `value` through `channel`.
    Send {
        channel: Box<Expr>,
        value: Box<Expr>,
    },
}

#[derive(Debug)]
pub struct Binding {
    pub pattern: BindPattern,
    pub value: Expr,
}

#[derive(Debug)]
pub enum BindPattern {
    Name {
        place: PlaceId,
    },
    /// Whole-value destructure: consumes the scrutinee as a whole and
    /// introduces a fresh owned place per component.
    Destructure {
        places: Vec<PlaceId>,
    },
}

#[derive(Debug)]
pub struct Arm {
    /// Arm bodies get their own scope; pattern bindings are declared in it.
    pub scope: ScopeId,
    pub pattern: MatchPattern,
    pub body: Expr,
}

#[derive(Debug)]
pub enum MatchPattern {
    Wildcard,
    Bind { place: PlaceId },
    Variant { tag: String, binds: Vec<PlaceId> },
}

impl MatchPattern {
    /// True if matching this pattern consumes the scrutinee (binds any of
    /// its components).
    pub fn binds(&self) -> bool {
        match self {
            MatchPattern::Wildcard => false,
            MatchPattern::Bind { .. } => true,
            MatchPattern::Variant { binds, .. } => !binds.is_empty(),
        }
    }
}
