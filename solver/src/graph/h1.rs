//! The `h₁` relaxed-plan heuristic: breadth expansion of the causal graph
//! with cost propagation over supports, deferrability analysis and optional
//! pruning under the graph-validity literal.

use crate::core::{Lbool, Lit};
use crate::graph::FlawId;
use crate::solver::{SolveError, Solver};
use crate::utils::Rational;

impl Solver {
    /// Ensures the graph admits a solution estimate and that γ is decided.
    ///
    /// At root level: when γ has been refuted (or never built), a fresh γ is
    /// allocated and the graph is built or deepened by one layer; γ is then
    /// taken as a decision.
    pub(crate) fn check_graph(&mut self) -> Result<(), SolveError> {
        debug_assert!(self.root_level());
        self.propagate_and_recover()?;
        self.flush_pending()?;
        let first = self.graph.gamma.is_none();
        let rebuild = match self.graph.gamma {
            None => true,
            Some(g) => self.sat.value(g) == Lbool::False,
        }
        // content added after a solution (or released by a refuted γ) shows
        // up as active flaws that were never expanded
        || self
            .graph
            .active_flaws
            .iter()
            .any(|&f| !self.graph.flaws[f].expanded);
        if rebuild {
            let gamma = Lit::new(self.sat.new_var(), true);
            tracing::debug!("building the causal graph under {gamma:?}");
            self.graph.gamma = Some(gamma);
            self.graph.already_closed.clear();
            // pruning clauses of the refuted γ no longer bite: re-estimate
            for f in self.graph.active_flaws.clone() {
                self.propagate_costs(f);
            }
            let infinite = self
                .graph
                .active_flaws
                .iter()
                .any(|&f| self.graph.flaws[f].est_cost.is_positive_infinite());
            if first || infinite {
                self.build()?;
            } else {
                self.add_layer()?;
            }
        }
        if let Some(gamma) = self.graph.gamma {
            if self.sat.value(gamma) == Lbool::Undef {
                if self.config.pruning {
                    self.prune()?;
                }
                self.take_decision(gamma)?;
            }
        }
        Ok(())
    }

    /// Expands flaws in FIFO order until every active flaw has a finite cost
    /// estimate. An empty queue with an unreachable active flaw left proves
    /// the problem unsolvable.
    pub(crate) fn build(&mut self) -> Result<(), SolveError> {
        debug_assert!(self.root_level());
        self.propagate_and_recover()?;
        while self
            .graph
            .active_flaws
            .iter()
            .any(|&f| self.graph.flaws[f].est_cost.is_positive_infinite())
        {
            let Some(f) = self.graph.flaw_q.pop_front() else {
                return Err(SolveError::Unsolvable);
            };
            if self.graph.flaws[f].expanded {
                continue;
            }
            if self.sat.value(self.graph.flaws[f].phi()) != Lbool::False {
                if self.is_deferrable(f) {
                    self.graph.flaw_q.push_back(f);
                } else {
                    self.expand_flaw(f)?;
                    self.propagate_and_recover()?;
                }
            }
        }
        self.get_incs()?;
        self.flush_pending()?;
        self.propagate_and_recover()?;
        if !self.sat.simplify_db() {
            return Err(SolveError::Unsolvable);
        }
        Ok(())
    }

    /// Forces the expansion of one full breadth layer of the queue, even
    /// where deferrable.
    pub(crate) fn add_layer(&mut self) -> Result<(), SolveError> {
        debug_assert!(self.root_level());
        tracing::debug!("adding a layer to the causal graph");
        let snapshot = self.graph.flaw_q.len();
        for _ in 0..snapshot {
            let Some(f) = self.graph.flaw_q.pop_front() else {
                break;
            };
            if self.graph.flaws[f].expanded {
                continue;
            }
            if self.sat.value(self.graph.flaws[f].phi()) != Lbool::False {
                self.expand_flaw(f)?;
                self.propagate_and_recover()?;
            }
        }
        self.get_incs()?;
        self.flush_pending()?;
        self.propagate_and_recover()?;
        if !self.sat.simplify_db() {
            return Err(SolveError::Unsolvable);
        }
        Ok(())
    }

    /// Closes every still-queued flaw under γ: refuting the graph reopens
    /// them.
    pub(crate) fn prune(&mut self) -> Result<(), SolveError> {
        let gamma = self.graph.gamma.expect("pruning before the graph is built");
        for f in self.graph.flaw_q.clone() {
            if self.graph.already_closed.insert(f) {
                let phi = self.graph.flaws[f].phi();
                if !self.sat.new_clause([!gamma, !phi]) {
                    return Err(SolveError::Unsolvable);
                }
            }
        }
        self.propagate_and_recover()
    }

    /// A flaw can be deferred when a solution estimate already exists for it,
    /// or when everything its cost feeds into is itself deferrable.
    pub(crate) fn is_deferrable(&mut self, f: FlawId) -> bool {
        if self.graph.flaws[f].est_cost < Rational::PosInfinity
            || self.graph.flaws[f]
                .resolvers
                .iter()
                .any(|&r| self.sat.value(self.graph.resolvers[r].rho) == Lbool::True)
        {
            return true;
        }
        if self.sat.value(self.graph.flaws[f].phi()) == Lbool::True
            || self.graph.visited.contains(&f)
        {
            return false;
        }
        self.graph.visited.insert(f);
        let supports = self.graph.flaws[f].supports.clone();
        let deferrable = supports.iter().all(|&r| {
            let effect = self.graph.resolvers[r].flaw;
            self.is_deferrable(effect)
        });
        self.graph.visited.remove(&f);
        deferrable
    }

    /// Recomputes the estimated cost of `f` from its best resolver and
    /// propagates the change to the flaws supported by it. Cycles collapse to
    /// `+∞`.
    pub(crate) fn propagate_costs(&mut self, f: FlawId) {
        let mut cost = if self.sat.value(self.graph.flaws[f].phi()) == Lbool::False {
            Rational::PosInfinity
        } else {
            match self.graph.cheapest_resolver(f, &self.sat) {
                Some(r) => self.graph.resolver_est_cost(r),
                None => Rational::PosInfinity,
            }
        };
        if self.graph.flaws[f].est_cost == cost {
            return;
        }
        if self.graph.visited.contains(&f) {
            cost = Rational::PosInfinity;
            if self.graph.flaws[f].est_cost == cost {
                return;
            }
        }
        self.set_cost(f, cost);
        self.graph.visited.insert(f);
        let supports = self.graph.flaws[f].supports.clone();
        for r in supports {
            if self.sat.value(self.graph.resolvers[r].rho) != Lbool::False {
                let effect = self.graph.resolvers[r].flaw;
                self.propagate_costs(effect);
            }
        }
        self.graph.visited.remove(&f);
    }
}
