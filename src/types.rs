//! Merl types, structural classification and capability flags.
//!
//! The ownership core never inspects type *meaning*; it only asks the
//! classification oracle three questions: is this type copy-class or
//! move-class, may it be transferred across a concurrency boundary, and may
//! an immutable reference to it be shared across one. [`StructuralOracle`]
//! is the standard structural implementation; classification is computed
//! once per type and cached.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Bool,
    Char,
    Unit,
    String,
    Array(Box<Type>),
    List(Box<Type>),
    Tuple(Vec<Type>),
    Record(Vec<(String, Type)>),
    /// A nominal ADT. The upstream inference pass marks self-recursive types,
    /// which are unconditionally heap-placed.
    Adt {
        name: String,
        recursive: bool,
        variants: Vec<(String, Vec<Type>)>,
    },
    Ref {
        kind: RefKind,
        elem: Box<Type>,
    },
    /// A bare function value (no environment).
    Fn {
        params: Vec<Type>,
        ret: Box<Type>,
    },
    /// A closure value with an environment. Always move-class; its thread
    /// capabilities are judged per capture at the spawn site, not here.
    Closure {
        params: Vec<Type>,
        ret: Box<Type>,
    },
    Channel(Box<Type>),
    Atomic(Box<Type>),
    /// A type the oracle cannot see through (e.g. an unresolved import).
    /// Classification fails, aborting analysis of the enclosing body.
    Opaque(String),
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::Unit => write!(f, "unit"),
            Type::String => write!(f, "string"),
            Type::Array(elem) => write!(f, "{elem} array"),
            Type::List(elem) => write!(f, "{elem} list"),
            Type::Tuple(elems) => {
                let parts: Vec<String> = elems.iter().map(|ty| ty.to_string()).collect();
                write!(f, "({})", parts.join(" * "))
            }
            Type::Record(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(name, ty)| format!("{name}: {ty}"))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Type::Adt { name, .. } => write!(f, "{name}"),
            Type::Ref { kind, elem } => match kind {
                RefKind::Shared => write!(f, "&{elem}"),
                RefKind::Exclusive => write!(f, "&mut {elem}"),
            },
            Type::Fn { params, ret } | Type::Closure { params, ret } => {
                let parts: Vec<String> = params.iter().map(|ty| ty.to_string()).collect();
                write!(f, "({}) -> {ret}", parts.join(", "))
            }
            Type::Channel(elem) => write!(f, "{elem} channel"),
            Type::Atomic(elem) => write!(f, "{elem} atomic"),
            Type::Opaque(name) => write!(f, "{name}"),
        }
    }
}

/// Structural classification: binding a copy-class value duplicates it;
/// binding a move-class value transfers ownership and invalidates the
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Copy,
    Move,
}

/// The type-classification oracle consulted by every pass.
///
/// `Sync` so independent bodies can be analyzed in parallel against a shared
/// oracle.
pub trait ClassOracle: Sync {
    /// `None` means the type cannot be classified; analysis of the enclosing
    /// body is aborted.
    fn class(&self, ty: &Type) -> Option<TypeClass>;

    /// Safe to move across a concurrency boundary.
    fn transferable(&self, ty: &Type) -> bool;

    /// Safe to share an immutable reference to across a concurrency
    /// boundary.
    fn shareable(&self, ty: &Type) -> bool;

    /// Unconditionally heap-placed regardless of escape (recursive or
    /// variable-size aggregates).
    fn always_heap(&self, ty: &Type) -> bool;

    /// Estimated size in abstract size units, for the stack-placement
    /// threshold.
    fn size_units(&self, ty: &Type) -> u64;
}

/// Standard structural oracle. Classification results are memoized per type.
pub struct StructuralOracle {
    class_cache: RwLock<HashMap<Type, Option<TypeClass>>>,
}

impl StructuralOracle {
    pub fn new() -> Self {
        Self {
            class_cache: RwLock::new(HashMap::new()),
        }
    }

    fn classify(&self, ty: &Type) -> Option<TypeClass> {
        match ty {
            Type::Int | Type::Float | Type::Bool | Type::Char | Type::Unit => {
                Some(TypeClass::Copy)
            }
            Type::Fn { .. } => Some(TypeClass::Copy),
            // A shared reference duplicates freely; each copy gets its own
            // borrow record. An exclusive reference must stay unique.
            Type::Ref { kind, .. } => match kind {
                RefKind::Shared => Some(TypeClass::Copy),
                RefKind::Exclusive => Some(TypeClass::Move),
            },
            Type::Tuple(elems) => self.all_copy(elems.iter()),
            Type::Record(fields) => self.all_copy(fields.iter().map(|(_, ty)| ty)),
            Type::String
            | Type::Array(_)
            | Type::List(_)
            | Type::Adt { .. }
            | Type::Closure { .. }
            | Type::Channel(_)
            | Type::Atomic(_) => Some(TypeClass::Move),
            Type::Opaque(_) => None,
        }
    }

    fn all_copy<'a>(&self, mut tys: impl Iterator<Item = &'a Type>) -> Option<TypeClass> {
        if tys.try_fold(true, |all, ty| Some(all && self.class(ty)? == TypeClass::Copy))? {
            Some(TypeClass::Copy)
        } else {
            Some(TypeClass::Move)
        }
    }
}

impl Default for StructuralOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassOracle for StructuralOracle {
    fn class(&self, ty: &Type) -> Option<TypeClass> {
        if let Some(cached) = self.class_cache.read().unwrap().get(ty) {
            return *cached;
        }
        let class = self.classify(ty);
        self.class_cache.write().unwrap().insert(ty.clone(), class);
        class
    }

    fn transferable(&self, ty: &Type) -> bool {
        match ty {
            Type::Int | Type::Float | Type::Bool | Type::Char | Type::Unit => true,
            Type::Fn { .. } => true,
            Type::String => true,
            // An exclusive reference is neither transferable nor shareable;
            // a shared reference may cross only if its referent is shareable.
            Type::Ref { kind, elem } => match kind {
                RefKind::Shared => self.shareable(elem),
                RefKind::Exclusive => false,
            },
            Type::Array(elem) | Type::List(elem) => self.transferable(elem),
            Type::Tuple(elems) => elems.iter().all(|ty| self.transferable(ty)),
            Type::Record(fields) => fields.iter().all(|(_, ty)| self.transferable(ty)),
            Type::Adt { variants, .. } => variants
                .iter()
                .all(|(_, payload)| payload.iter().all(|ty| self.transferable(ty))),
            // Judged per capture at the spawn boundary, never as a whole.
            Type::Closure { .. } => false,
            Type::Channel(elem) => self.transferable(elem),
            Type::Atomic(_) => true,
            Type::Opaque(_) => false,
        }
    }

    fn shareable(&self, ty: &Type) -> bool {
        match ty {
            Type::Int | Type::Float | Type::Bool | Type::Char | Type::Unit => true,
            Type::Fn { .. } => true,
            Type::String => true,
            Type::Ref { kind, elem } => match kind {
                RefKind::Shared => self.shareable(elem),
                RefKind::Exclusive => false,
            },
            Type::Array(elem) | Type::List(elem) => self.shareable(elem),
            Type::Tuple(elems) => elems.iter().all(|ty| self.shareable(ty)),
            Type::Record(fields) => fields.iter().all(|(_, ty)| self.shareable(ty)),
            Type::Adt { variants, .. } => variants
                .iter()
                .all(|(_, payload)| payload.iter().all(|ty| self.shareable(ty))),
            Type::Closure { .. } => false,
            Type::Channel(_) => true,
            Type::Atomic(_) => true,
            Type::Opaque(_) => false,
        }
    }

    fn always_heap(&self, ty: &Type) -> bool {
        match ty {
            Type::String | Type::Array(_) | Type::List(_) | Type::Channel(_) => true,
            Type::Adt { recursive, .. } => *recursive,
            _ => false,
        }
    }

    fn size_units(&self, ty: &Type) -> u64 {
        match ty {
            Type::Int | Type::Float => 8,
            Type::Bool | Type::Char => 1,
            Type::Unit => 0,
            Type::Ref { .. } | Type::Fn { .. } => 8,
            // Handle-sized: the payload lives behind the handle.
            Type::String | Type::Array(_) | Type::List(_) | Type::Channel(_) => 16,
            Type::Atomic(elem) => self.size_units(elem).max(8),
            Type::Tuple(elems) => elems.iter().map(|ty| self.size_units(ty)).sum(),
            Type::Record(fields) => fields.iter().map(|(_, ty)| self.size_units(ty)).sum(),
            Type::Adt { variants, .. } => {
                let payload = variants
                    .iter()
                    .map(|(_, tys)| tys.iter().map(|ty| self.size_units(ty)).sum::<u64>())
                    .max()
                    .unwrap_or(0);
                8 + payload
            }
            Type::Closure { .. } => 16,
            Type::Opaque(_) => 8,
        }
    }
}

#[cfg(test)]
#[path = "tests/t_types.rs"]
mod tests;
