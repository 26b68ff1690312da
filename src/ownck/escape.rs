//! Escape analysis over allocation sites.
//!
//! Every move-class construction is an allocation site. Sites form a
//! containment graph: a component's site is contained in the aggregate
//! built from it, and a move-captured place's sites are contained in the
//! capturing closure's site. Escape roots are values leaving the frame:
//! the body's tail value, a closure body's tail value, and anything
//! crossing a spawn or send boundary. Escape propagates from an escaped
//! site to everything it contains, by worklist, and propagation is
//! idempotent so the capture-upgrade pass can extend the graph and re-run
//! it.
//!
//! The final placement of a site is heap if it escapes, if its type always
//! lives on the heap, or if it is at least the configured size threshold;
//! otherwise stack.

use std::collections::{HashMap, HashSet};

use crate::context::AnalysisContext;
use crate::diag::Span;
use crate::ids::{ClosureId, PlaceId, SiteId};
use crate::ownck::capture::{CaptureMode, CaptureResult, UpgradedCapture};
use crate::tree::{BindPattern, Expr, ExprKind, FuncDef, MatchPattern};
use crate::types::TypeClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Stack,
    Heap,
}

#[derive(Debug, Clone)]
pub struct AllocationSite {
    pub span: Span,
    pub size: u64,
    pub always_heap: bool,
    /// Set when this site is a closure environment.
    pub closure: Option<ClosureId>,
    /// Set when this site is a cell materialized for an upgraded capture.
    pub capture_cell: Option<PlaceId>,
}

#[derive(Debug, Clone)]
pub struct AllocationInfo {
    pub span: Span,
    pub decision: Placement,
    pub escaped: bool,
}

pub(super) struct EscapeAnalysis {
    pub sites: Vec<AllocationSite>,
    /// Aggregate site -> sites of the values it holds.
    contains: HashMap<SiteId, Vec<SiteId>>,
    escaped: HashSet<SiteId>,
    site_of_place: HashMap<PlaceId, Vec<SiteId>>,
    closure_sites: HashMap<ClosureId, SiteId>,
}

pub(super) fn analyze(
    ctx: &AnalysisContext,
    func: &FuncDef,
    captures: &CaptureResult,
) -> EscapeAnalysis {
    let mut builder = GraphBuilder {
        ctx,
        captures,
        analysis: EscapeAnalysis {
            sites: Vec::new(),
            contains: HashMap::new(),
            escaped: HashSet::new(),
            site_of_place: HashMap::new(),
            closure_sites: HashMap::new(),
        },
    };
    let tail = builder.eval(&func.body);
    let mut analysis = builder.analysis;
    for site in tail {
        analysis.escaped.insert(site);
    }
    analysis.propagate();
    analysis
}

impl EscapeAnalysis {
    /// Transitive closure of the escape set over containment. Safe to call
    /// again after new sites and edges are added.
    pub fn propagate(&mut self) {
        let mut worklist: Vec<SiteId> = self.escaped.iter().copied().collect();
        while let Some(site) = worklist.pop() {
            let Some(held) = self.contains.get(&site) else {
                continue;
            };
            for &inner in held.clone().iter() {
                if self.escaped.insert(inner) {
                    worklist.push(inner);
                }
            }
        }
    }

    pub fn escaping_closures(&self) -> HashSet<ClosureId> {
        self.closure_sites
            .iter()
            .filter(|(_, site)| self.escaped.contains(site))
            .map(|(&id, _)| id)
            .collect()
    }

    /// Materialize a heap cell per upgraded capture: the moved place now
    /// lives in the closure environment, and anything it held moves with
    /// it.
    pub fn add_capture_cells(&mut self, ctx: &AnalysisContext, upgraded: &[UpgradedCapture]) {
        for up in upgraded {
            let info = ctx.program.places.get(up.place);
            let size = ctx.oracle.size_units(&info.ty);
            let cell = self.add_site(AllocationSite {
                span: up.span,
                size,
                always_heap: true,
                closure: None,
                capture_cell: Some(up.place),
            });
            if let Some(&closure_site) = self.closure_sites.get(&up.closure) {
                self.contains.entry(closure_site).or_default().push(cell);
            }
            let held = self
                .site_of_place
                .get(&up.place)
                .cloned()
                .unwrap_or_default();
            self.contains.entry(cell).or_default().extend(held);
            self.site_of_place.insert(up.place, vec![cell]);
        }
    }

    pub fn decisions(&self, threshold: u64) -> Vec<(SiteId, AllocationInfo)> {
        self.sites
            .iter()
            .enumerate()
            .map(|(idx, site)| {
                let id = SiteId(idx as u32);
                let escaped = self.escaped.contains(&id);
                let decision = if escaped || site.always_heap || site.size >= threshold {
                    Placement::Heap
                } else {
                    Placement::Stack
                };
                (
                    id,
                    AllocationInfo {
                        span: site.span,
                        decision,
                        escaped,
                    },
                )
            })
            .collect()
    }

    /// Heap iff any site the place may hold decides heap. A place with no
    /// site (parameters, copy-class bindings) has no backing allocation.
    pub fn place_decision(&self, place: PlaceId, threshold: u64) -> Option<Placement> {
        let sites = self.site_of_place.get(&place)?;
        if sites.is_empty() {
            return None;
        }
        let heap = sites.iter().any(|&id| {
            let site = &self.sites[id.0 as usize];
            self.escaped.contains(&id) || site.always_heap || site.size >= threshold
        });
        Some(if heap {
            Placement::Heap
        } else {
            Placement::Stack
        })
    }

    fn add_site(&mut self, site: AllocationSite) -> SiteId {
        let id = SiteId(self.sites.len() as u32);
        self.sites.push(site);
        id
    }
}

struct GraphBuilder<'a> {
    ctx: &'a AnalysisContext<'a>,
    captures: &'a CaptureResult,
    analysis: EscapeAnalysis,
}

impl<'a> GraphBuilder<'a> {
    /// Returns the allocation sites the expression's value may be backed
    /// by.
    fn eval(&mut self, expr: &Expr) -> Vec<SiteId> {
        match &expr.kind {
            ExprKind::Unit
            | ExprKind::LitInt(_)
            | ExprKind::LitFloat(_)
            | ExprKind::LitBool(_)
            | ExprKind::LitChar(_) => Vec::new(),

            // String literals build a heap value like any constructor.
            ExprKind::LitStr(_) => {
                let site = self.construction_site(expr);
                vec![site]
            }

            ExprKind::Var { place } => self
                .analysis
                .site_of_place
                .get(place)
                .cloned()
                .unwrap_or_default(),

            // References and dereferences are views, never allocations.
            ExprKind::Ref { .. } => Vec::new(),
            ExprKind::Deref { value } => {
                self.eval(value);
                Vec::new()
            }

            ExprKind::Let {
                bindings, body, ..
            } => {
                for binding in bindings {
                    let sites = self.eval(&binding.value);
                    match &binding.pattern {
                        BindPattern::Name { place } => {
                            self.analysis.site_of_place.insert(*place, sites);
                        }
                        BindPattern::Destructure { places } => {
                            // Components share the aggregate's storage.
                            for place in places {
                                self.analysis.site_of_place.insert(*place, sites.clone());
                            }
                        }
                    }
                }
                self.eval(body)
            }

            ExprKind::Seq(exprs) => {
                let mut last = Vec::new();
                for expr in exprs {
                    last = self.eval(expr);
                }
                last
            }

            // Storing through a reference sends the value to storage whose
            // lifetime is not tracked here; treat it as escaped.
            ExprKind::Assign { value, .. } => {
                for site in self.eval(value) {
                    self.analysis.escaped.insert(site);
                }
                Vec::new()
            }

            ExprKind::ArrayLit(elems) | ExprKind::ListLit(elems) => {
                let held: Vec<SiteId> = elems.iter().flat_map(|elem| self.eval(elem)).collect();
                let site = self.construction_site(expr);
                self.analysis.contains.insert(site, held);
                vec![site]
            }

            // Copy-class aggregates own nothing and allocate nothing.
            ExprKind::Tuple(elems) => {
                let held: Vec<SiteId> = elems.iter().flat_map(|elem| self.eval(elem)).collect();
                if self.ctx.oracle.class(&expr.ty) != Some(TypeClass::Move) {
                    return Vec::new();
                }
                let site = self.construction_site(expr);
                self.analysis.contains.insert(site, held);
                vec![site]
            }

            ExprKind::Record { fields } => {
                let held: Vec<SiteId> = fields
                    .iter()
                    .flat_map(|(_, value)| self.eval(value))
                    .collect();
                if self.ctx.oracle.class(&expr.ty) != Some(TypeClass::Move) {
                    return Vec::new();
                }
                let site = self.construction_site(expr);
                self.analysis.contains.insert(site, held);
                vec![site]
            }

            ExprKind::Variant { payload, .. } => {
                let held: Vec<SiteId> = payload.iter().flat_map(|elem| self.eval(elem)).collect();
                let site = self.construction_site(expr);
                self.analysis.contains.insert(site, held);
                vec![site]
            }

            ExprKind::Field { target, .. } => {
                let target_sites = self.eval(target);
                if self.ctx.oracle.class(&expr.ty) == Some(TypeClass::Move) {
                    target_sites
                } else {
                    Vec::new()
                }
            }

            ExprKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.eval(cond);
                let mut sites = self.eval(then_body);
                sites.extend(self.eval(else_body));
                sites
            }

            ExprKind::Case { scrutinee, arms } => {
                let scrutinee_sites = self.eval(scrutinee);
                let mut sites = Vec::new();
                for arm in arms {
                    match &arm.pattern {
                        MatchPattern::Wildcard => {}
                        MatchPattern::Bind { place } => {
                            self.analysis
                                .site_of_place
                                .insert(*place, scrutinee_sites.clone());
                        }
                        MatchPattern::Variant { binds, .. } => {
                            for place in binds {
                                self.analysis
                                    .site_of_place
                                    .insert(*place, scrutinee_sites.clone());
                            }
                        }
                    }
                    sites.extend(self.eval(&arm.body));
                }
                sites
            }

            ExprKind::While { cond, body } => {
                self.eval(cond);
                self.eval(body);
                Vec::new()
            }

            ExprKind::Closure { id, body, .. } => {
                let site = self.construction_site(expr);
                self.analysis.sites[site.0 as usize].closure = Some(*id);
                self.analysis.closure_sites.insert(*id, site);

                // The closure's return value leaves its frame on every
                // call.
                for tail in self.eval(body) {
                    self.analysis.escaped.insert(tail);
                }

                let mut held = Vec::new();
                if let Some(caps) = self.captures.closures.get(id) {
                    for (&place, &mode) in &caps.modes {
                        if mode == CaptureMode::Move {
                            if let Some(sites) = self.analysis.site_of_place.get(&place) {
                                held.extend(sites.iter().copied());
                            }
                        }
                    }
                }
                self.analysis.contains.insert(site, held);
                vec![site]
            }

            // Arguments stay within the analyzed body's knowledge; the
            // call result is untracked.
            ExprKind::Call { callee, args } => {
                self.eval(callee);
                for arg in args {
                    self.eval(arg);
                }
                Vec::new()
            }

            ExprKind::Spawn { closure } => {
                for site in self.eval(closure) {
                    self.analysis.escaped.insert(site);
                }
                Vec::new()
            }

            ExprKind::Send { channel, value } => {
                self.eval(channel);
                for site in self.eval(value) {
                    self.analysis.escaped.insert(site);
                }
                Vec::new()
            }
        }
    }

    fn construction_site(&mut self, expr: &Expr) -> SiteId {
        self.analysis.add_site(AllocationSite {
            span: expr.span,
            size: self.ctx.oracle.size_units(&expr.ty),
            always_heap: self.ctx.oracle.always_heap(&expr.ty),
            closure: None,
            capture_cell: None,
        })
    }
}

#[cfg(test)]
#[path = "../tests/t_escape.rs"]
mod tests;
