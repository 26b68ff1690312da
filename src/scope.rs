//! Places and the scope tree.
//!
//! Scopes form an arena-backed tree: parent links are plain indices, never
//! owning pointers, so the tree has no ownership cycles. Each scope owns the
//! ordered list of places declared directly within it; scopes are destroyed
//! top-down at their own exit.

use crate::diag::Span;
use crate::ids::{PlaceId, ScopeId};
use crate::types::Type;

/// A named, non-decomposable, whole-value storage location. Partial-field
/// paths are never places for move purposes.
#[derive(Debug, Clone)]
pub struct Place {
    pub name: String,
    pub ty: Type,
    pub scope: ScopeId,
    /// Declaration site, for two-point diagnostics.
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct PlaceTable {
    places: Vec<Place>,
}

impl PlaceTable {
    pub fn new() -> Self {
        Self { places: Vec::new() }
    }

    pub fn add(&mut self, place: Place) -> PlaceId {
        let id = PlaceId(self.places.len() as u32);
        self.places.push(place);
        id
    }

    pub fn get(&self, id: PlaceId) -> &Place {
        &self.places[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.places
            .iter()
            .enumerate()
            .map(|(idx, place)| (PlaceId(idx as u32), place))
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    /// Places declared directly in this scope, in declaration order.
    pub places: Vec<PlaceId>,
    pub children: Vec<ScopeId>,
}

#[derive(Debug, Default)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self { scopes: Vec::new() }
    }

    pub fn add_root(&mut self) -> ScopeId {
        self.push(None)
    }

    pub fn add_child(&mut self, parent: ScopeId) -> ScopeId {
        let id = self.push(Some(parent));
        self.scopes[parent.0 as usize].children.push(id);
        id
    }

    fn push(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent,
            places: Vec::new(),
            children: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn declare(&mut self, scope: ScopeId, place: PlaceId) {
        self.scopes[scope.0 as usize].places.push(place);
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// True if `anc` is `id` or one of its ancestors.
    pub fn is_within(&self, id: ScopeId, anc: ScopeId) -> bool {
        let mut curr = Some(id);
        while let Some(scope) = curr {
            if scope == anc {
                return true;
            }
            curr = self.get(scope).parent;
        }
        false
    }

    /// Post-order walk of the subtree rooted at `root`, via an explicit
    /// stack so deeply nested scopes cannot overflow the call stack.
    pub fn post_order(&self, root: ScopeId) -> Vec<ScopeId> {
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((scope, expanded)) = stack.pop() {
            if expanded {
                order.push(scope);
                continue;
            }
            stack.push((scope, true));
            for &child in self.get(scope).children.iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }
}
