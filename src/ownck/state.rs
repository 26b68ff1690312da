//! Flow-sensitive ownership and borrow state.

use std::collections::{BTreeSet, HashMap};

use crate::diag::Span;
use crate::ids::PlaceId;
use crate::types::RefKind;

/// Program points are preorder indices into one body's tree; the numbering
/// is shared between the checker and the last-use scan.
pub type Point = u32;

/// Exactly one of these holds per place at any program point. `Moved`
/// carries the move site so a later misuse renders as a two-point
/// diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipState {
    Owned,
    Moved { at: Span },
}

impl OwnershipState {
    pub fn is_moved(&self) -> bool {
        matches!(self, OwnershipState::Moved { .. })
    }
}

/// A temporary, non-owning access right to a place. The window runs from
/// the creation point to the borrower's last textual use.
#[derive(Debug, Clone)]
pub struct BorrowRecord {
    pub kind: RefKind,
    /// The place being borrowed.
    pub place: PlaceId,
    /// The binding holding the reference, if it was bound at all.
    pub borrower: Option<PlaceId>,
    pub start: Point,
    pub end: Point,
    /// Creation site, for conflict diagnostics.
    pub span: Span,
}

/// Per-point state: ownership per place plus the set of live borrow
/// records (indices into the body's borrow table). Cloned at branch forks
/// and joined at merges.
#[derive(Debug, Clone, Default)]
pub struct FlowState {
    owner: HashMap<PlaceId, OwnershipState>,
    pub live: BTreeSet<usize>,
}

impl FlowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ownership(&self, place: PlaceId) -> OwnershipState {
        self.owner
            .get(&place)
            .copied()
            .unwrap_or(OwnershipState::Owned)
    }

    pub fn mark_moved(&mut self, place: PlaceId, at: Span) {
        self.owner.insert(place, OwnershipState::Moved { at });
    }

    /// Re-binding a place restores ownership.
    pub fn rebind(&mut self, place: PlaceId) {
        self.owner.insert(place, OwnershipState::Owned);
    }

    pub fn moved_set(&self) -> BTreeSet<PlaceId> {
        self.owner
            .iter()
            .filter(|(_, state)| state.is_moved())
            .map(|(place, _)| *place)
            .collect()
    }

    /// Branch join. A place is `Moved` after the join iff it is `Moved` on
    /// any arm (a path exists where the value is gone). A borrow stays live
    /// only if it is live on every arm.
    pub fn join_arms(arms: Vec<FlowState>) -> FlowState {
        let mut iter = arms.into_iter();
        let Some(mut joined) = iter.next() else {
            return FlowState::new();
        };
        for arm in iter {
            for (place, state) in arm.owner {
                // Keep the first recorded move site.
                if state.is_moved() && !joined.ownership(place).is_moved() {
                    joined.owner.insert(place, state);
                }
            }
            joined.live = joined.live.intersection(&arm.live).copied().collect();
        }
        joined
    }
}
