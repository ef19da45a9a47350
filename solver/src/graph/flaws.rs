//! Per-kind flaw expansion (`compute_resolvers`) and resolver application
//! (`apply`), dispatched over the [FlawKind] and [ResolverKind] variants.

use crate::core::{Lbool, Lit};
use crate::graph::{FlawId, FlawKind, ResolverId, ResolverKind};
use crate::model::items::Item;
use crate::model::items::ItemId;
use crate::solver::{SolveError, Solver};
use crate::utils::{InfRational, Rational};

impl Solver {
    pub(crate) fn compute_resolvers(&mut self, f: FlawId) -> Result<(), SolveError> {
        enum Dispatch {
            Bool(Lit),
            Enum(ItemId),
            Disj(Vec<Lit>),
            Disjunction(Vec<crate::graph::Disjunct>),
            Atom(ItemId, bool),
            Smart(ItemId, Vec<ItemId>, bool),
        }
        let dispatch = match &self.graph.flaws[f].kind {
            FlawKind::Bool { lit } => Dispatch::Bool(*lit),
            FlawKind::Enum { item } => Dispatch::Enum(*item),
            FlawKind::Disj { lits } => Dispatch::Disj(lits.clone()),
            FlawKind::Disjunction { branches } => Dispatch::Disjunction(branches.clone()),
            FlawKind::Atom { atom, is_fact } => Dispatch::Atom(*atom, *is_fact),
            FlawKind::StateVariable { instance, atoms } => {
                Dispatch::Smart(*instance, atoms.clone(), false)
            }
            FlawKind::ReusableResource { instance, atoms }
            | FlawKind::ConsumableResource { instance, atoms } => {
                Dispatch::Smart(*instance, atoms.clone(), true)
            }
        };
        match dispatch {
            Dispatch::Bool(lit) => self.compute_bool_resolvers(f, lit),
            Dispatch::Enum(item) => self.compute_enum_resolvers(f, item),
            Dispatch::Disj(lits) => self.compute_disj_resolvers(f, lits),
            Dispatch::Disjunction(branches) => self.compute_disjunction_resolvers(f, branches),
            Dispatch::Atom(atom, is_fact) => self.compute_atom_resolvers(f, atom, is_fact),
            Dispatch::Smart(instance, atoms, with_places) => {
                self.compute_smart_resolvers(f, instance, atoms, with_places)
            }
        }
    }

    fn compute_bool_resolvers(&mut self, f: FlawId, lit: Lit) -> Result<(), SolveError> {
        let half = Rational::new(1, 2);
        match self.sat.value(lit) {
            Lbool::True => {
                self.new_resolver(f, Some(lit), Rational::ZERO, ResolverKind::ChooseLit)?;
            }
            Lbool::False => {
                self.new_resolver(f, Some(!lit), Rational::ZERO, ResolverKind::ChooseLit)?;
            }
            Lbool::Undef => {
                self.new_resolver(f, Some(lit), half, ResolverKind::ChooseLit)?;
                self.new_resolver(f, Some(!lit), half, ResolverKind::ChooseLit)?;
            }
        }
        Ok(())
    }

    fn compute_enum_resolvers(&mut self, f: FlawId, item: ItemId) -> Result<(), SolveError> {
        let var = match &self.items[item] {
            Item::Enum(v) => *v,
            _ => panic!("enum flaw over a non-enum item"),
        };
        let domain = self.ov.domain(var, &self.sat);
        if domain.is_empty() {
            // the coverage clause will refute φ
            return Ok(());
        }
        let cost = Rational::ONE / Rational::from(domain.len() as i64);
        for value in domain {
            let rho = self.ov.allows(var, value);
            if self.sat.value(rho) != Lbool::False {
                self.new_resolver(f, Some(rho), cost, ResolverKind::ChooseValue { item, value })?;
            }
        }
        Ok(())
    }

    fn compute_disj_resolvers(&mut self, f: FlawId, lits: Vec<Lit>) -> Result<(), SolveError> {
        let cost = Rational::ONE / Rational::from(lits.len() as i64);
        for l in lits {
            if self.sat.value(l) != Lbool::False {
                self.new_resolver(f, Some(l), cost, ResolverKind::ChooseLit)?;
            }
        }
        Ok(())
    }

    fn compute_disjunction_resolvers(
        &mut self,
        f: FlawId,
        branches: Vec<crate::graph::Disjunct>,
    ) -> Result<(), SolveError> {
        for branch in branches {
            let cost = match branch.cost {
                Some(c) => {
                    let v = self.arith_value(c);
                    if v.rat.is_finite() {
                        v.rat
                    } else {
                        Rational::ONE
                    }
                }
                None => Rational::ONE,
            };
            self.new_resolver(f, None, cost, ResolverKind::ChooseBranch { branch })?;
        }
        Ok(())
    }

    fn compute_atom_resolvers(
        &mut self,
        f: FlawId,
        atom: ItemId,
        is_fact: bool,
    ) -> Result<(), SolveError> {
        let sigma = self.sigma(atom);
        debug_assert!(self.sat.value(self.graph.flaws[f].phi()) != Lbool::False);
        if self.sat.value(sigma) == Lbool::Undef {
            // look for unification targets among the other atoms of the
            // predicate
            let pred = self.items[atom].as_atom().expect("not an atom").pred;
            let candidates = self.predicates[pred].atoms.clone();
            for target in candidates {
                if target == atom {
                    continue;
                }
                let t_flaw = self.reason(target);
                if !self.graph.flaws[t_flaw].expanded {
                    continue;
                }
                // unifying adds a causal link positioning the target's flaw
                // strictly before this one; skip when that would close a cycle
                let (lb, _) = self.rdl.distance(
                    self.graph.flaws[f].position,
                    self.graph.flaws[t_flaw].position,
                );
                if lb + InfRational::from(1) > InfRational::ZERO {
                    continue;
                }
                if self.sat.value(self.sigma(target)) == Lbool::False {
                    continue;
                }
                if !self.matches(atom, target) {
                    continue;
                }
                let eq = self.eq_lit(atom, target);
                if self.sat.value(eq) == Lbool::False {
                    continue;
                }
                let unif_lits = vec![!sigma, self.sigma(target), eq];
                let r = self.new_resolver(
                    f,
                    None,
                    Rational::ONE,
                    ResolverKind::UnifyAtom {
                        atom,
                        target,
                        unif_lits,
                    },
                )?;
                self.new_causal_link(t_flaw, r)?;
            }
        }
        // the activation resolver; when unification is impossible the
        // activation must hold whenever the flaw does
        let rho = if self.graph.flaws[f].resolvers.is_empty() {
            Some(self.graph.flaws[f].phi())
        } else {
            None
        };
        let (cost, kind) = if is_fact {
            (Rational::ZERO, ResolverKind::ActivateFact { atom })
        } else {
            (Rational::ONE, ResolverKind::ActivateGoal { atom })
        };
        self.new_resolver(f, rho, cost, kind)?;
        Ok(())
    }

    /// Order, forbid and (for resources) place resolvers of a smart-type
    /// flaw, built from the ordering and forbiddance literals stored when the
    /// atoms were created.
    fn compute_smart_resolvers(
        &mut self,
        f: FlawId,
        instance: ItemId,
        atoms: Vec<ItemId>,
        with_places: bool,
    ) -> Result<(), SolveError> {
        let idx = self.smart_of(instance);
        for &a in &atoms {
            for &b in &atoms {
                if a == b {
                    continue;
                }
                let leq = self.smarts[idx]
                    .leqs
                    .get(&a)
                    .and_then(|m| m.get(&b))
                    .copied();
                if let Some(l) = leq {
                    if self.sat.value(l) != Lbool::False {
                        self.new_resolver(
                            f,
                            Some(l),
                            Rational::ZERO,
                            ResolverKind::Order { before: a, after: b },
                        )?;
                    }
                }
            }
        }
        for &a in &atoms {
            let forbid = self.smarts[idx]
                .frbs
                .get(&a)
                .and_then(|m| m.get(&instance))
                .copied();
            if let Some(allow) = forbid {
                if self.sat.value(allow) != Lbool::True {
                    self.new_resolver(
                        f,
                        Some(!allow),
                        Rational::ZERO,
                        ResolverKind::Forbid { atom: a, instance },
                    )?;
                }
            }
        }
        if with_places {
            for &a in &atoms {
                let Some(va) = self.enum_var(self.opt_arg(a, crate::solver::TAU)) else {
                    continue;
                };
                for &b in &atoms {
                    if a == b {
                        continue;
                    }
                    let Some(vb) = self.enum_var(self.opt_arg(b, crate::solver::TAU)) else {
                        continue;
                    };
                    for c in self.ov.candidates(va) {
                        if c == instance {
                            continue;
                        }
                        let aa = self.ov.allows(va, c);
                        let ab = self.ov.allows(vb, c);
                        let rho = self.sat.new_conj(&[aa, !ab]);
                        if self.sat.value(rho) != Lbool::False {
                            self.new_resolver(
                                f,
                                Some(rho),
                                Rational::ZERO,
                                ResolverKind::Place { atom: a, instance: c },
                            )?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies `r`, posting its clauses and running any attached body. The
    /// caller has already installed ρ as the controlling literal.
    pub(crate) fn apply(&mut self, r: ResolverId) -> Result<(), SolveError> {
        let rho = self.graph.resolvers[r].rho;
        let kind = self.graph.resolvers[r].kind.clone();
        match kind {
            ResolverKind::ChooseLit
            | ResolverKind::Order { .. }
            | ResolverKind::Forbid { .. }
            | ResolverKind::Place { .. } => Ok(()),
            ResolverKind::ChooseValue { item, value } => {
                let var = self.enum_var(Some(item)).expect("not an enum item");
                let allow = self.ov.allows(var, value);
                if !self.sat.new_clause([!rho, allow]) {
                    return Err(SolveError::Unsolvable);
                }
                Ok(())
            }
            ResolverKind::ChooseBranch { branch } => (branch.body)(self),
            ResolverKind::ActivateFact { atom } => {
                let sigma = self.sigma(atom);
                if !self.sat.new_clause([!rho, sigma]) {
                    return Err(SolveError::Unsolvable);
                }
                Ok(())
            }
            ResolverKind::ActivateGoal { atom } => {
                let sigma = self.sigma(atom);
                if !self.sat.new_clause([!rho, sigma]) {
                    return Err(SolveError::Unsolvable);
                }
                let pred = self.items[atom].as_atom().expect("not an atom").pred;
                if let Some(rule) = self.predicates[pred].rule.clone() {
                    rule(self, atom)?;
                }
                Ok(())
            }
            ResolverKind::UnifyAtom {
                target, unif_lits, ..
            } => {
                // unification is only possible when the target can itself be
                // activated
                let t_flaw = self.reason(target);
                debug_assert!(self.graph.flaws[t_flaw].expanded);
                let t_resolvers = self.graph.flaws[t_flaw].resolvers.clone();
                for tr in t_resolvers {
                    if matches!(
                        self.graph.resolvers[tr].kind,
                        ResolverKind::ActivateFact { .. } | ResolverKind::ActivateGoal { .. }
                    ) {
                        let t_rho = self.graph.resolvers[tr].rho;
                        if !self.sat.new_clause([t_rho, !rho]) {
                            return Err(SolveError::Unsolvable);
                        }
                    }
                }
                for l in unif_lits {
                    if !self.sat.new_clause([!rho, l]) {
                        return Err(SolveError::Unsolvable);
                    }
                }
                Ok(())
            }
        }
    }

    /// The smart-state index of the component instance's type.
    pub(crate) fn smart_of(&self, instance: ItemId) -> usize {
        match &self.items[instance] {
            Item::Component(c) => self.types[c.tp]
                .smart
                .expect("instance of a non-smart type"),
            _ => panic!("not a component instance"),
        }
    }

    pub(crate) fn enum_var(
        &self,
        item: Option<ItemId>,
    ) -> Option<crate::reasoners::ov::OvVar> {
        match item {
            Some(i) => match &self.items[i] {
                Item::Enum(v) => Some(*v),
                _ => None,
            },
            None => None,
        }
    }
}
