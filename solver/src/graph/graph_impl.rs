use crate::core::{BVar, Lbool, Lit};
use crate::collections::ref_store::RefVec;
use crate::graph::{Flaw, FlawId, FlawKind, Resolver, ResolverId, ResolverKind};
use crate::json::Event;
use crate::reasoners::sat::SatCore;
use crate::solver::{SolveError, Solver};
use crate::utils::{InfRational, Rational};
use hashbrown::{HashMap, HashSet};
use std::collections::{BTreeSet, VecDeque};

/// The flaw/resolver graph.
///
/// Flaws and resolvers live in two append-only arenas and are indexed by the
/// variables of their activity literals, so that SAT assignments can be routed
/// back to them. γ is the graph-validity literal: it is taken as a search
/// decision, and its refutation at root level triggers reconstruction.
pub struct Graph {
    pub gamma: Option<Lit>,
    pub flaws: RefVec<FlawId, Flaw>,
    pub resolvers: RefVec<ResolverId, Resolver>,
    pub phis: HashMap<BVar, Vec<FlawId>>,
    pub rhos: HashMap<BVar, Vec<ResolverId>>,
    pub active_flaws: BTreeSet<FlawId>,
    /// Flaws created away from the root level, waiting for it to be
    /// initialized.
    pub pending_flaws: Vec<FlawId>,
    /// Registry of the causal links added by unification, for observers.
    pub causal_links: Vec<(FlawId, ResolverId)>,
    /// Unexpanded flaws, in FIFO order (the heuristic's expansion queue).
    pub flaw_q: VecDeque<FlawId>,
    /// Flaws already closed under the current γ by pruning.
    pub already_closed: HashSet<FlawId>,
    /// Cycle breaker for cost propagation and deferrability.
    pub visited: HashSet<FlawId>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Graph {
        Graph {
            gamma: None,
            flaws: RefVec::new(),
            resolvers: RefVec::new(),
            phis: HashMap::new(),
            rhos: HashMap::new(),
            active_flaws: BTreeSet::new(),
            pending_flaws: Vec::new(),
            causal_links: Vec::new(),
            flaw_q: VecDeque::new(),
            already_closed: HashSet::new(),
            visited: HashSet::new(),
        }
    }

    /// The estimated cost of applying `r`: its intrinsic cost plus the
    /// estimated costs of its preconditions.
    pub fn resolver_est_cost(&self, r: ResolverId) -> Rational {
        let resolver = &self.resolvers[r];
        let mut cost = resolver.intrinsic_cost;
        for &p in &resolver.preconditions {
            cost += self.flaws[p].est_cost;
        }
        cost
    }

    /// The cheapest resolver of `f` among those not already refuted; ties are
    /// broken by insertion order.
    pub fn cheapest_resolver(&self, f: FlawId, sat: &SatCore) -> Option<ResolverId> {
        let mut best: Option<(ResolverId, Rational)> = None;
        for &r in &self.flaws[f].resolvers {
            if sat.value(self.resolvers[r].rho) == Lbool::False {
                continue;
            }
            let cost = self.resolver_est_cost(r);
            match best {
                Some((_, b)) if b <= cost => {}
                _ => best = Some((r, cost)),
            }
        }
        best.map(|(r, _)| r)
    }
}

impl Solver {
    /// Registers a freshly created flaw.
    ///
    /// At root level the flaw is initialized right away and either enqueued
    /// for heuristic expansion or expanded immediately; elsewhere it is
    /// stashed until the search is back at the root.
    pub(crate) fn new_flaw(
        &mut self,
        kind: FlawKind,
        causes: Vec<ResolverId>,
        exclusive: bool,
        enqueue: bool,
    ) -> Result<FlawId, SolveError> {
        let position = self.rdl.new_var();
        let f = self.graph.flaws.push(Flaw::new(position, causes, exclusive, kind));
        tracing::trace!("new {} {f:?}", self.graph.flaws[f].kind.name());
        if self.root_level() {
            self.init_flaw(f)?;
            if enqueue {
                self.graph.flaw_q.push_back(f);
            } else {
                self.expand_flaw(f)?;
            }
        } else {
            self.graph.pending_flaws.push(f);
        }
        Ok(f)
    }

    /// Assigns φ, posts the causal clauses and indexes the flaw. Root level
    /// only.
    pub(crate) fn init_flaw(&mut self, f: FlawId) -> Result<(), SolveError> {
        debug_assert!(self.root_level());
        debug_assert!(self.graph.flaws[f].phi.is_none());
        let phi = Lit::new(self.sat.new_var(), true);
        self.graph.flaws[f].phi = Some(phi);
        self.graph.phis.entry(phi.variable()).or_default().push(f);
        let causes = self.graph.flaws[f].causes.clone();
        if causes.is_empty() {
            // a flaw with no causes must be solved unconditionally
            if !self.sat.new_clause([phi]) {
                return Err(SolveError::Unsolvable);
            }
        } else {
            for c in causes {
                self.wire_precondition(f, c)?;
            }
        }
        self.fire(Event::FlawCreated(f));
        Ok(())
    }

    /// Makes `f` a precondition of `r`: activation flows from ρ(r) to φ(f),
    /// the cost of `r` starts depending on `f`, and `f` is positioned
    /// strictly before the flaw `r` resolves.
    fn wire_precondition(&mut self, f: FlawId, r: ResolverId) -> Result<(), SolveError> {
        self.graph.resolvers[r].preconditions.push(f);
        self.graph.flaws[f].supports.push(r);
        let rho = self.graph.resolvers[r].rho;
        let phi = self.graph.flaws[f].phi();
        if !self.sat.new_clause([!rho, phi]) {
            return Err(SolveError::Unsolvable);
        }
        let effect = self.graph.resolvers[r].flaw;
        let pos_f = self.graph.flaws[f].position;
        let pos_e = self.graph.flaws[effect].position;
        // position(f) + 1 ≤ position(effect)
        self.rdl
            .post_leq(pos_f, pos_e, InfRational::from(-1))
            .map_err(|_| SolveError::Unsolvable)?;
        Ok(())
    }

    /// Adds a causal link from `f` to `r` (used by unification, where the
    /// target's flaw becomes a precondition of the unifying resolver).
    pub(crate) fn new_causal_link(&mut self, f: FlawId, r: ResolverId) -> Result<(), SolveError> {
        self.wire_precondition(f, r)?;
        self.graph.causal_links.push((f, r));
        self.fire(Event::CausalLinkAdded {
            flaw: f,
            resolver: r,
        });
        self.fire(Event::FlawPositionChanged(f));
        Ok(())
    }

    /// Registers a resolver for `f`. When `rho` is not given a fresh variable
    /// backs the activity literal.
    pub(crate) fn new_resolver(
        &mut self,
        f: FlawId,
        rho: Option<Lit>,
        intrinsic_cost: Rational,
        kind: ResolverKind,
    ) -> Result<ResolverId, SolveError> {
        let rho = rho.unwrap_or_else(|| Lit::new(self.sat.new_var(), true));
        debug_assert!(self.sat.value(rho) != Lbool::False);
        let r = self.graph.resolvers.push(Resolver {
            flaw: f,
            rho,
            intrinsic_cost,
            preconditions: Vec::new(),
            kind,
        });
        self.graph.flaws[f].resolvers.push(r);
        self.graph.rhos.entry(rho.variable()).or_default().push(r);
        let phi = self.graph.flaws[f].phi();
        if rho != phi {
            // ρ ⇒ φ
            if !self.sat.new_clause([!rho, phi]) {
                return Err(SolveError::Unsolvable);
            }
        }
        self.fire(Event::ResolverCreated(r));
        Ok(r)
    }

    /// Expands `f`: computes its resolvers, posts the coverage and exclusion
    /// clauses and applies every resolver. Root level only, at most once.
    pub(crate) fn expand_flaw(&mut self, f: FlawId) -> Result<(), SolveError> {
        assert!(self.root_level(), "flaws can only be expanded at root level");
        assert!(!self.graph.flaws[f].expanded, "flaw expanded twice");
        let phi = self.graph.flaws[f].phi();
        // anything created while computing resolvers is gated on φ
        self.set_ni(phi);
        let computed = self.compute_resolvers(f);
        self.restore_ni();
        computed?;
        self.graph.flaws[f].expanded = true;

        let resolvers = self.graph.flaws[f].resolvers.clone();
        let mut coverage = vec![!phi];
        coverage.extend(resolvers.iter().map(|&r| self.graph.resolvers[r].rho));
        if !self.sat.new_clause(coverage) {
            return Err(SolveError::Unsolvable);
        }
        if self.graph.flaws[f].exclusive {
            for i in 0..resolvers.len() {
                for j in i + 1..resolvers.len() {
                    let ri = self.graph.resolvers[resolvers[i]].rho;
                    let rj = self.graph.resolvers[resolvers[j]].rho;
                    if !self.sat.new_clause([!ri, !rj]) {
                        return Err(SolveError::Unsolvable);
                    }
                }
            }
        }
        for r in resolvers.iter().copied() {
            self.apply_resolver(r)?;
        }
        self.propagate_costs(f);
        // a resolver may already hold (e.g. an activation whose ρ is φ itself)
        if self.sat.value(phi) == Lbool::True
            && resolvers
                .iter()
                .any(|&r| self.sat.value(self.graph.resolvers[r].rho) == Lbool::True)
        {
            self.graph.active_flaws.remove(&f);
        }
        Ok(())
    }

    /// Applies a resolver under its activity literal; an unsolvable outcome
    /// forbids the resolver instead of failing the whole problem.
    pub(crate) fn apply_resolver(&mut self, r: ResolverId) -> Result<(), SolveError> {
        let prev = self.res;
        self.res = Some(r);
        let rho = self.graph.resolvers[r].rho;
        self.set_ni(rho);
        let result = self.apply(r);
        self.restore_ni();
        self.res = prev;
        match result {
            Err(SolveError::Unsolvable) => {
                tracing::debug!("resolver {r:?} is inapplicable");
                if !self.sat.new_clause([!rho]) {
                    return Err(SolveError::Unsolvable);
                }
                Ok(())
            }
            other => other,
        }
    }

    /// Updates the estimated cost of `f`, keeping the change reversible.
    pub(crate) fn set_cost(&mut self, f: FlawId, cost: Rational) {
        let old = self.graph.flaws[f].est_cost;
        if old == cost {
            return;
        }
        if let Some(layer) = self.trail.last_mut() {
            layer.old_costs.entry(f).or_insert(old);
        }
        self.graph.flaws[f].est_cost = cost;
        self.fire(Event::FlawCostChanged(f));
    }

    /// Initializes and expands the flaws that were created away from the root
    /// level. Root level only.
    pub(crate) fn flush_pending(&mut self) -> Result<(), SolveError> {
        debug_assert!(self.root_level());
        while !self.graph.pending_flaws.is_empty() {
            let pending = std::mem::take(&mut self.graph.pending_flaws);
            for f in pending {
                self.init_flaw(f)?;
                self.expand_flaw(f)?;
            }
        }
        Ok(())
    }
}
