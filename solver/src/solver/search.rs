//! The DPLL-style search: decision taking, propagation routing between the
//! SAT core, the arithmetic theories and the graph, conflict recovery through
//! the trail, and the solve loop with its inconsistency phase.

use crate::backtrack::Backtrack;
use crate::core::{Lbool, Lit};
use crate::graph::{FlawId, ResolverId};
use crate::json::Event;
use crate::reasoners::Contradiction;
use crate::solver::{Layer, SolveError, Solver};
use crate::utils::Rational;

impl Solver {
    /// Propagates through every theory, recovering from conflicts by
    /// backtracking until the learnt clause is satisfiable; a conflict that
    /// survives at root level is final.
    pub fn propagate_and_recover(&mut self) -> Result<(), SolveError> {
        loop {
            match self.propagate_all() {
                Ok(()) => return Ok(()),
                Err(conflict) => self.backtrack_until(conflict)?,
            }
        }
    }

    /// One propagation fixpoint: SAT unit propagation, routing of the new
    /// assignments to the graph and the smart-type watches, then arithmetic
    /// propagation (whose bound changes wake further watches).
    fn propagate_all(&mut self) -> Result<(), Contradiction> {
        loop {
            self.sat.propagate()?;
            let start = self.sat_cursor;
            let end = self.sat.trail().len();
            if start == end {
                return Ok(());
            }
            self.sat_cursor = end;
            let news: Vec<Lit> = self.sat.trail()[start..end].to_vec();
            for p in news {
                self.on_sat_assignment(p);
            }
            self.lra.propagate(&self.sat)?;
            // may enqueue entailed ordering literals, picked up by the next
            // round of unit propagation
            self.rdl.propagate(&mut self.sat)?;
            for v in self.rdl.take_changed() {
                if let Some(watchers) = self.rdl_watches.get(&v).cloned() {
                    for (idx, atm) in watchers {
                        self.mark_smart(idx, atm);
                    }
                }
            }
            for v in self.lra.take_changed() {
                if let Some(watchers) = self.lra_watches.get(&v).cloned() {
                    for (idx, atm) in watchers {
                        self.mark_smart(idx, atm);
                    }
                }
            }
        }
    }

    /// Routes one SAT assignment to the flaws and resolvers indexed by its
    /// variable, and to the smart-type watches.
    fn on_sat_assignment(&mut self, p: Lit) {
        let v = p.variable();
        if let Some(flaws) = self.graph.phis.get(&v).cloned() {
            for f in flaws {
                if self.graph.flaws[f].phi() == p {
                    self.activated_flaw(f);
                } else {
                    self.negated_flaw(f);
                }
            }
        }
        if let Some(resolvers) = self.graph.rhos.get(&v).cloned() {
            for r in resolvers {
                if self.graph.resolvers[r].rho == p {
                    self.activated_resolver(r);
                } else {
                    self.negated_resolver(r);
                }
            }
        }
        if let Some(watchers) = self.sat_watches.get(&v).cloned() {
            for (idx, atm) in watchers {
                self.mark_smart(idx, atm);
            }
        }
    }

    fn activated_flaw(&mut self, f: FlawId) {
        self.fire(Event::FlawStateChanged(f));
        let solved = self.graph.flaws[f]
            .resolvers
            .iter()
            .any(|&r| self.sat.value(self.graph.resolvers[r].rho) == Lbool::True);
        if !solved {
            self.graph.active_flaws.insert(f);
            if let Some(layer) = self.trail.last_mut() {
                layer.new_flaws.insert(f);
            }
        }
    }

    fn negated_flaw(&mut self, f: FlawId) {
        self.fire(Event::FlawStateChanged(f));
        self.propagate_costs(f);
    }

    fn activated_resolver(&mut self, r: ResolverId) {
        self.fire(Event::ResolverStateChanged(r));
        let f = self.graph.resolvers[r].flaw;
        if self.graph.active_flaws.remove(&f) {
            if let Some(layer) = self.trail.last_mut() {
                layer.solved_flaws.insert(f);
            }
        }
    }

    fn negated_resolver(&mut self, r: ResolverId) {
        self.fire(Event::ResolverStateChanged(r));
        let f = self.graph.resolvers[r].flaw;
        if self.sat.value(self.graph.flaws[f].phi()) != Lbool::False {
            self.propagate_costs(f);
        }
    }

    /// Opens a new decision level across every theory and assumes `ch`.
    pub fn take_decision(&mut self, ch: Lit) -> Result<(), SolveError> {
        tracing::debug!("decision {ch:?} at level {}", self.trail.len() + 1);
        self.trail.push(Layer::new(ch));
        self.lra.save_state();
        self.rdl.save_state();
        if !self.sat.assume(ch) {
            // the decision is already refuted
            self.backtrack_until(Contradiction::from_clause(vec![!ch]))?;
        }
        self.propagate_and_recover()
    }

    /// Undoes the topmost decision level across every theory and restores the
    /// graph bookkeeping recorded in its layer.
    pub(crate) fn pop(&mut self) {
        let layer = self.trail.pop().expect("pop at root level");
        tracing::debug!("retracting {:?}", layer.decision);
        self.sat.restore_last();
        self.lra.restore_last();
        self.rdl.restore_last();
        self.sat_cursor = self.sat_cursor.min(self.sat.trail().len());
        for (f, c) in layer.old_costs {
            self.graph.flaws[f].est_cost = c;
            self.fire(Event::FlawCostChanged(f));
        }
        for f in layer.solved_flaws {
            self.graph.active_flaws.insert(f);
        }
        for f in layer.new_flaws {
            self.graph.active_flaws.remove(&f);
        }
        // values may have moved back: recheck every timeline
        for idx in 0..self.smarts.len() {
            let instances = self.types[self.smarts[idx].tp].instances.clone();
            self.smarts[idx].to_check.extend(instances);
        }
    }

    /// Pops decision levels until `conflict` is no longer falsified, then
    /// adds it to the clause database.
    pub(crate) fn backtrack_until(&mut self, conflict: Contradiction) -> Result<(), SolveError> {
        if conflict.is_unsat() {
            return Err(SolveError::Unsolvable);
        }
        while conflict
            .clause
            .iter()
            .all(|&l| self.sat.value(l) == Lbool::False)
        {
            if self.root_level() {
                return Err(SolveError::Unsolvable);
            }
            self.pop();
        }
        if !self.sat.new_clause(conflict.clause) {
            return Err(SolveError::Unsolvable);
        }
        Ok(())
    }

    /// The cheapest active flaw; ties are broken by creation order.
    fn select_flaw(&self) -> Option<FlawId> {
        let mut best: Option<(FlawId, Rational)> = None;
        for &f in &self.graph.active_flaws {
            let cost = self.graph.flaws[f].est_cost;
            match best {
                Some((_, b)) if b <= cost => {}
                _ => best = Some((f, cost)),
            }
        }
        best.map(|(f, _)| f)
    }

    /// Searches for a state where every flaw is solved and the smart types
    /// report no inconsistency.
    ///
    /// Returns `Ok(true)` on success; [SolveError::Unsolvable] when the
    /// search space is exhausted; [SolveError::Interrupted] when the
    /// cancellation flag is raised.
    pub fn solve(&mut self) -> Result<bool, SolveError> {
        self.propagate_and_recover()?;
        loop {
            if self.is_interrupted() {
                self.reset_to_root();
                return Err(SolveError::Interrupted);
            }
            if self.root_level() {
                self.check_graph()?;
            }
            if self.graph.active_flaws.is_empty() {
                if self.solve_inconsistencies()? {
                    continue;
                }
                tracing::debug!("solution found");
                return Ok(true);
            }
            let Some(f) = self.select_flaw() else {
                return Err(SolveError::Unsolvable);
            };
            self.current_flaw = Some(f);
            self.fire(Event::CurrentFlaw(f));
            let Some(r) = self.graph.cheapest_resolver(f, &self.sat) else {
                // every resolver is refuted while φ holds: the coverage
                // clause is falsified, surface it
                let phi = self.graph.flaws[f].phi();
                self.backtrack_until(Contradiction::from_clause(vec![!phi]))?;
                self.propagate_and_recover()?;
                continue;
            };
            self.current_resolver = Some(r);
            self.fire(Event::CurrentResolver(r));
            let rho = self.graph.resolvers[r].rho;
            if self.sat.value(rho) == Lbool::True {
                // already applied: the flaw is solved
                self.graph.active_flaws.remove(&f);
                if let Some(layer) = self.trail.last_mut() {
                    layer.solved_flaws.insert(f);
                }
                continue;
            }
            self.take_decision(rho)?;
            self.solve_inconsistencies()?;
        }
    }

    /// The inconsistency phase: queries the smart types for the overlaps of
    /// the current assignment and resolves them, by forced decision, by
    /// branching on the cheapest choice, or through the typed flaws the
    /// smart types injected.
    ///
    /// Returns whether anything was done.
    pub(crate) fn solve_inconsistencies(&mut self) -> Result<bool, SolveError> {
        let mut acted = false;
        loop {
            let (incs, created) = self.get_incs()?;
            if created > 0 {
                acted = true;
                self.propagate_and_recover()?;
            }
            if incs.is_empty() {
                return Ok(acted);
            }
            let mut progressed = created > 0;
            for inc in &incs {
                let undecided: Vec<(Lit, Rational)> = inc
                    .iter()
                    .copied()
                    .filter(|&(l, _)| self.sat.value(l) == Lbool::Undef)
                    .collect();
                if undecided.is_empty() {
                    // no remaining choice: the decisions that led here form a
                    // no-good
                    let decisions: Vec<Lit> =
                        self.trail.iter().map(|layer| !layer.decision).collect();
                    if decisions.is_empty() {
                        return Err(SolveError::Unsolvable);
                    }
                    self.backtrack_until(Contradiction::from_clause(decisions))?;
                    self.propagate_and_recover()?;
                    progressed = true;
                    break;
                }
                // a single choice is forced; otherwise branch on the cheapest
                // choice unless a freshly injected flaw already covers this
                // inconsistency systematically
                if inc.len() == 1 || !self.root_level() || created == 0 {
                    let mut best = undecided[0];
                    for &c in &undecided[1..] {
                        if c.1 < best.1 {
                            best = c;
                        }
                    }
                    self.take_decision(best.0)?;
                    progressed = true;
                    break;
                }
            }
            if !progressed {
                return Ok(acted);
            }
            acted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::Lbool;
    use crate::model::items::ItemId;
    use crate::model::types::{Field, Sort};
    use crate::solver::{Solver, SolverConfig};
    use std::collections::BTreeMap;

    /// A fact `P(1)` and a goal `P(?x)` that can unify with it.
    fn two_atom_model() -> (Solver, ItemId, ItemId) {
        let mut s = Solver::new("test", SolverConfig::default());
        let p = s.new_predicate(None, "P", vec![Field::new("x", Sort::Int)], None);
        let one = s.new_int_const(1);
        let fact = s
            .new_atom(true, p, BTreeMap::from([("x".to_string(), one)]))
            .unwrap();
        let goal = s.new_atom(false, p, BTreeMap::new()).unwrap();
        (s, fact, goal)
    }

    #[test]
    fn test_phi_variables_are_unique() {
        let (mut s, _, _) = two_atom_model();
        s.propagate_and_recover().unwrap();
        s.check_graph().unwrap();
        let mut vars: Vec<_> = s
            .graph
            .flaws
            .values()
            .filter_map(|f| f.phi)
            .map(|l| l.variable())
            .collect();
        let count = vars.len();
        vars.sort();
        vars.dedup();
        assert_eq!(count, vars.len());
    }

    #[test]
    fn test_trail_round_trip() {
        let (mut s, _, goal) = two_atom_model();
        s.propagate_and_recover().unwrap();
        s.check_graph().unwrap();
        let active_before = s.graph.active_flaws.clone();
        let costs_before: Vec<_> = s.graph.flaws.values().map(|f| f.est_cost).collect();
        let sat_len = s.sat.trail().len();

        let f = s.reason(goal);
        let r = s.graph.cheapest_resolver(f, &s.sat).unwrap();
        let rho = s.graph.resolvers[r].rho;
        s.take_decision(rho).unwrap();
        assert_ne!(active_before, s.graph.active_flaws);

        s.pop();
        assert_eq!(active_before, s.graph.active_flaws);
        let costs_after: Vec<_> = s.graph.flaws.values().map(|f| f.est_cost).collect();
        assert_eq!(costs_before, costs_after);
        assert_eq!(sat_len, s.sat.trail().len());
    }

    #[test]
    fn test_graph_rebuild_on_refuted_gamma() {
        let (mut s, _, _) = two_atom_model();
        assert!(s.solve().unwrap());
        let old = s.gamma().unwrap();
        s.reset_to_root();
        assert!(s.sat.new_clause([!old]));
        s.propagate_and_recover().unwrap();
        assert!(s.solve().unwrap());
        let rebuilt = s.gamma().unwrap();
        assert_ne!(old, rebuilt);
        assert_eq!(s.sat.value(old), Lbool::False);
    }

    #[test]
    fn test_deferrability() {
        let (mut s, _, _) = two_atom_model();
        s.propagate_and_recover().unwrap();
        let b = s.new_bool();
        let lit = s.lit(b);
        let f = s.new_disj_flaw(vec![lit], false).unwrap();
        s.propagate_and_recover().unwrap();
        // active, unreachable and without an estimate: must be expanded
        assert!(!s.is_deferrable(f));
        s.check_graph().unwrap();
        // once expanded the flaw has a solution estimate
        assert!(s.graph.flaws[f].expanded);
        assert!(s.is_deferrable(f));
    }

    #[test]
    fn test_resolver_cost_follows_preconditions() {
        let (mut s, _, goal) = two_atom_model();
        s.propagate_and_recover().unwrap();
        s.check_graph().unwrap();
        let f = s.reason(goal);
        for &r in &s.graph.flaws[f].resolvers {
            let mut expected = s.graph.resolvers[r].intrinsic_cost;
            for &p in &s.graph.resolvers[r].preconditions {
                expected += s.graph.flaws[p].est_cost;
            }
            assert_eq!(s.graph.resolver_est_cost(r), expected);
        }
    }
}
