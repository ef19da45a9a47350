//! Smart types: components that observe the atoms declared on them and
//! inject flaws when their own semantic invariants break — timeline
//! exclusivity for state variables, capacity for resources.
//!
//! Each smart type keeps, per atom, the candidate ordering literals (`leqs`)
//! and forbiddance literals (`frbs`) built when the atom was created, a
//! `to_check` set of instances woken up by theory changes, and the set of
//! minimal conflict sets already turned into flaws.

mod agent;
mod consumable_resource;
mod reusable_resource;
mod state_variable;

use crate::core::{Lbool, Lit};
use crate::graph::{FlawKind, ResolverId, ResolverKind};
use crate::model::items::{ItemId, LinExpr};
use crate::model::types::{ComponentType, TypeId};
use crate::solver::{SolveError, Solver, END, START, TAU};
use crate::utils::{InfRational, Rational};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SmartKind {
    Agent,
    StateVariable,
    ReusableResource,
    ConsumableResource,
}

pub struct SmartState {
    pub tp: TypeId,
    pub kind: SmartKind,
    pub atoms: Vec<ItemId>,
    /// `leqs[a][b]`: the literal ordering `a` entirely before `b`.
    pub leqs: BTreeMap<ItemId, BTreeMap<ItemId, Lit>>,
    /// `frbs[a][c]`: the literal allowing atom `a` on instance `c`.
    pub frbs: BTreeMap<ItemId, BTreeMap<ItemId, Lit>>,
    /// Instances whose timeline must be rechecked.
    pub to_check: BTreeSet<ItemId>,
    /// Minimal conflict sets already turned into flaws.
    pub seen: BTreeSet<Vec<ItemId>>,
}

/// One inconsistency: the candidate (literal, cost) choices resolving it.
pub(crate) type Inc = Vec<(Lit, Rational)>;

impl Solver {
    pub(crate) fn register_smart(&mut self, name: impl Into<String>, kind: SmartKind) -> TypeId {
        let idx = self.smarts.len();
        let tp = self.types.push(ComponentType {
            name: name.into(),
            smart: Some(idx),
            instances: Vec::new(),
            predicates: Vec::new(),
        });
        self.smarts.push(SmartState {
            tp,
            kind,
            atoms: Vec::new(),
            leqs: BTreeMap::new(),
            frbs: BTreeMap::new(),
            to_check: BTreeSet::new(),
            seen: BTreeSet::new(),
        });
        tp
    }

    /// Observes a freshly created atom: installs the timeline parameters of
    /// facts, builds the candidate ordering and forbiddance literals against
    /// the atoms already stored, and registers the parameter watches.
    pub(crate) fn smart_new_atom(&mut self, idx: usize, atm: ItemId) -> Result<(), SolveError> {
        let is_fact = self.items[atm].as_atom().expect("not an atom").is_fact;
        if is_fact {
            // goals get the Interval base behavior on activation; facts right
            // away, under their state literal
            let sigma = self.sigma(atm);
            self.set_ni(sigma);
            let installed = self.interval_rule(atm);
            self.restore_ni();
            installed?;
        }
        if self.smarts[idx].kind != SmartKind::Agent {
            let start = self.arg(atm, START);
            let end = self.arg(atm, END);
            let others = self.smarts[idx].atoms.clone();
            for other in others {
                let o_start = self.arg(other, START);
                let o_end = self.arg(other, END);
                let before = self.leq_lit(end, o_start);
                let after = self.leq_lit(o_end, start);
                // the two orderings are mutually exclusive
                if !self.sat.new_clause([!before, !after]) {
                    return Err(SolveError::Unsolvable);
                }
                if self.sat.value(before) == Lbool::Undef {
                    self.smarts[idx]
                        .leqs
                        .entry(atm)
                        .or_default()
                        .insert(other, before);
                    self.smart_watch_lit(idx, atm, before);
                }
                if self.sat.value(after) == Lbool::Undef {
                    self.smarts[idx]
                        .leqs
                        .entry(other)
                        .or_default()
                        .insert(atm, after);
                    self.smart_watch_lit(idx, other, after);
                }
            }
            if let Some(var) = self.enum_var(self.opt_arg(atm, TAU)) {
                for instance in self.ov.candidates(var) {
                    let allow = self.ov.allows(var, instance);
                    if self.sat.value(allow) == Lbool::Undef {
                        self.smarts[idx]
                            .frbs
                            .entry(atm)
                            .or_default()
                            .insert(instance, allow);
                        self.smart_watch_lit(idx, atm, allow);
                    }
                }
            }
            self.smart_watch_lit(idx, atm, self.sigma(atm));
            let start_expr = self.lin_expr(start);
            let end_expr = self.lin_expr(end);
            self.smart_watch_arith(idx, atm, &start_expr);
            self.smart_watch_arith(idx, atm, &end_expr);
        }
        self.smarts[idx].atoms.push(atm);
        self.mark_smart(idx, atm);
        Ok(())
    }

    fn smart_watch_lit(&mut self, idx: usize, atm: ItemId, l: Lit) {
        self.sat_watches
            .entry(l.variable())
            .or_default()
            .push((idx, atm));
    }

    fn smart_watch_arith(&mut self, idx: usize, atm: ItemId, expr: &LinExpr) {
        match expr {
            LinExpr::Rdl(lin) => {
                for &(v, _) in &lin.terms {
                    self.rdl_watches.entry(v).or_default().push((idx, atm));
                }
            }
            LinExpr::Lra(lin) => {
                for &(v, _) in &lin.terms {
                    self.lra_watches.entry(v).or_default().push((idx, atm));
                }
            }
        }
    }

    /// Marks the instances an active atom may lie on as needing a recheck.
    pub(crate) fn mark_smart(&mut self, idx: usize, atm: ItemId) {
        if self.sat.value(self.sigma(atm)) != Lbool::True {
            return;
        }
        let Some(tau) = self.opt_arg(atm, TAU) else {
            return;
        };
        for instance in self.domain(tau) {
            self.smarts[idx].to_check.insert(instance);
        }
    }

    /// Partitions the active atoms of a smart type over the instances they
    /// may lie on, restricted to the instances marked for rechecking.
    pub(crate) fn smart_partition(
        &self,
        idx: usize,
        only_marked: bool,
    ) -> Vec<(ItemId, Vec<ItemId>)> {
        let st = &self.smarts[idx];
        let mut parts: Vec<(ItemId, Vec<ItemId>)> = Vec::new();
        for &instance in &self.types[st.tp].instances {
            if only_marked && !st.to_check.contains(&instance) {
                continue;
            }
            let mut atoms = Vec::new();
            for &atm in &st.atoms {
                if self.sat.value(self.sigma(atm)) != Lbool::True {
                    continue;
                }
                let Some(tau) = self.opt_arg(atm, TAU) else {
                    continue;
                };
                if self.domain(tau).contains(&instance) {
                    atoms.push(atm);
                }
            }
            parts.push((instance, atoms));
        }
        parts
    }

    /// The `[start, end]` window of an atom under the current assignment.
    pub(crate) fn atom_window(&self, atm: ItemId) -> (InfRational, InfRational) {
        let start = self.arith_value(self.arg(atm, START));
        let end = self.arith_value(self.arg(atm, END));
        (start, end)
    }

    /// The activation (or unification) resolvers that gave rise to the given
    /// atoms; they become the causes of the flaws built on those atoms.
    pub(crate) fn activation_resolvers(&self, atoms: &[ItemId]) -> Vec<ResolverId> {
        let mut causes = Vec::new();
        for &atm in atoms {
            let reason = self.reason(atm);
            for &r in &self.graph.flaws[reason].resolvers {
                if matches!(
                    self.graph.resolvers[r].kind,
                    ResolverKind::ActivateFact { .. } | ResolverKind::ActivateGoal { .. }
                ) && self.sat.value(self.graph.resolvers[r].rho) != Lbool::False
                {
                    causes.push(r);
                }
            }
        }
        causes
    }

    /// Injects a typed flaw for a new minimal conflict set; returns whether
    /// the set had not been seen before.
    pub(crate) fn new_smart_flaw(
        &mut self,
        idx: usize,
        instance: ItemId,
        mcs: Vec<ItemId>,
    ) -> Result<bool, SolveError> {
        debug_assert!(mcs.windows(2).all(|w| w[0] < w[1]), "MCS must be sorted");
        if self.smarts[idx].seen.contains(&mcs) {
            return Ok(false);
        }
        self.smarts[idx].seen.insert(mcs.clone());
        let causes = self.activation_resolvers(&mcs);
        let kind = match self.smarts[idx].kind {
            SmartKind::StateVariable => FlawKind::StateVariable {
                instance,
                atoms: mcs,
            },
            SmartKind::ReusableResource => FlawKind::ReusableResource {
                instance,
                atoms: mcs,
            },
            SmartKind::ConsumableResource => FlawKind::ConsumableResource {
                instance,
                atoms: mcs,
            },
            SmartKind::Agent => unreachable!("agents report no inconsistencies"),
        };
        self.new_flaw(kind, causes, false, false)?;
        Ok(true)
    }

    /// The ordering and forbiddance choices currently available for a set of
    /// overlapping atoms on an instance.
    pub(crate) fn mcs_choices(&self, idx: usize, instance: ItemId, mcs: &[ItemId]) -> Inc {
        let st = &self.smarts[idx];
        let mut choices = Vec::new();
        for &a in mcs {
            for &b in mcs {
                if a == b {
                    continue;
                }
                if let Some(&l) = st.leqs.get(&a).and_then(|m| m.get(&b)) {
                    if self.sat.value(l) == Lbool::Undef {
                        choices.push((l, Rational::ZERO));
                    }
                }
            }
        }
        for &a in mcs {
            if let Some(&allow) = st.frbs.get(&a).and_then(|m| m.get(&instance)) {
                if self.sat.value(allow) == Lbool::Undef {
                    choices.push((!allow, Rational::ONE));
                }
            }
        }
        choices
    }

    /// Collects the current inconsistencies of every smart type, injecting
    /// typed flaws for the new minimal conflict sets.
    ///
    /// Returns the per-inconsistency choice lists and the number of flaws
    /// created.
    pub(crate) fn get_incs(&mut self) -> Result<(Vec<Inc>, usize), SolveError> {
        let mut incs = Vec::new();
        let mut created = 0usize;
        for idx in 0..self.smarts.len() {
            match self.smarts[idx].kind {
                SmartKind::Agent => {}
                SmartKind::StateVariable => self.sv_incs(idx, &mut incs, &mut created)?,
                SmartKind::ReusableResource => self.rr_incs(idx, &mut incs, &mut created)?,
                SmartKind::ConsumableResource => self.cr_incs(idx, &mut incs, &mut created)?,
            }
            self.smarts[idx].to_check.clear();
        }
        Ok((incs, created))
    }
}
