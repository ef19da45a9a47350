//! Linear real arithmetic by bound propagation.
//!
//! Constraints are reified inequalities `Σ cᵢ·xᵢ + k ≤ 0` (strict or not)
//! attached to a SAT literal. When the literal is assigned, the constraint —
//! or its negation — is asserted and variable bounds are tightened to
//! fixpoint. There is no simplex: the planner only needs feasibility of the
//! bound store and value/bounds queries on linear expressions.

use crate::backtrack::{Backtrack, DecLvl};
use crate::collections::ref_store::RefVec;
use crate::core::{BVar, Lit, FALSE_LIT, TRUE_LIT};
use crate::create_ref_type;
use crate::model::lang::Lin;
use crate::reasoners::sat::SatCore;
use crate::reasoners::Contradiction;
use crate::utils::{InfRational, Rational};
use hashbrown::HashMap;

create_ref_type!(LraVar);

struct LinLeq {
    /// The left-hand side of `lin ≤ 0` (`< 0` when strict).
    lin: Lin<LraVar>,
    strict: bool,
    lit: Lit,
}

enum Event {
    Bound {
        var: LraVar,
        upper: bool,
        prev: InfRational,
    },
    Asserted,
    Cursor(usize),
}

pub struct LraTheory {
    lbs: RefVec<LraVar, InfRational>,
    ubs: RefVec<LraVar, InfRational>,
    constraints: Vec<LinLeq>,
    /// SAT variable of a reified constraint → indices into `constraints`.
    watches: HashMap<BVar, Vec<usize>>,
    interned: HashMap<(Lin<LraVar>, bool), Lit>,
    /// Currently asserted constraints: (index, asserted positively).
    active: Vec<(usize, bool)>,
    trail: crate::backtrack::Trail<Event>,
    cursor: usize,
    /// Variables whose bounds changed since the last [Self::take_changed].
    changed: Vec<LraVar>,
}

impl Default for LraTheory {
    fn default() -> Self {
        Self::new()
    }
}

impl LraTheory {
    pub fn new() -> LraTheory {
        LraTheory {
            lbs: RefVec::new(),
            ubs: RefVec::new(),
            constraints: Vec::new(),
            watches: HashMap::new(),
            interned: HashMap::new(),
            active: Vec::new(),
            trail: crate::backtrack::Trail::new(),
            cursor: 0,
            changed: Vec::new(),
        }
    }

    pub fn new_var(&mut self) -> LraVar {
        let v = self.lbs.push(InfRational::NEGATIVE_INFINITY);
        self.ubs.push(InfRational::POSITIVE_INFINITY);
        v
    }

    pub fn lb(&self, v: LraVar) -> InfRational {
        self.lbs[v]
    }

    pub fn ub(&self, v: LraVar) -> InfRational {
        self.ubs[v]
    }

    /// Interval of the possible values of `lin` under the current bounds.
    pub fn bounds(&self, lin: &Lin<LraVar>) -> (InfRational, InfRational) {
        let mut lb = InfRational::new(lin.known);
        let mut ub = InfRational::new(lin.known);
        for &(v, c) in &lin.terms {
            if c > Rational::ZERO {
                lb = lb + self.lbs[v] * c;
                ub = ub + self.ubs[v] * c;
            } else {
                lb = lb + self.ubs[v] * c;
                ub = ub + self.lbs[v] * c;
            }
        }
        (lb, ub)
    }

    /// An estimate of the value of `lin`: each variable contributes its lower
    /// bound when finite, its upper bound otherwise, and zero when unbounded.
    pub fn value(&self, lin: &Lin<LraVar>) -> InfRational {
        let mut val = InfRational::new(lin.known);
        for &(v, c) in &lin.terms {
            let x = if self.lbs[v].is_finite() {
                self.lbs[v]
            } else if self.ubs[v].is_finite() {
                self.ubs[v]
            } else {
                InfRational::ZERO
            };
            val = val + x * c;
        }
        val
    }

    /// A literal reifying `lhs ≤ rhs`.
    pub fn new_leq(&mut self, lhs: &Lin<LraVar>, rhs: &Lin<LraVar>, sat: &mut SatCore) -> Lit {
        self.reify(lhs.clone() - rhs.clone(), false, sat)
    }

    /// A literal reifying `lhs < rhs`.
    pub fn new_lt(&mut self, lhs: &Lin<LraVar>, rhs: &Lin<LraVar>, sat: &mut SatCore) -> Lit {
        self.reify(lhs.clone() - rhs.clone(), true, sat)
    }

    fn reify(&mut self, lin: Lin<LraVar>, strict: bool, sat: &mut SatCore) -> Lit {
        if lin.is_constant() {
            let holds = if strict {
                lin.known < Rational::ZERO
            } else {
                lin.known <= Rational::ZERO
            };
            return if holds { TRUE_LIT } else { FALSE_LIT };
        }
        let (lb, ub) = self.bounds(&lin);
        let zero = InfRational::ZERO;
        if (strict && ub < zero) || (!strict && ub <= zero) {
            return TRUE_LIT;
        }
        if (strict && lb >= zero) || (!strict && lb > zero) {
            return FALSE_LIT;
        }
        if let Some(&l) = self.interned.get(&(lin.clone(), strict)) {
            return l;
        }
        let lit = Lit::new(sat.new_var(), true);
        let idx = self.constraints.len();
        self.constraints.push(LinLeq { lin: lin.clone(), strict, lit });
        self.watches.entry(lit.variable()).or_default().push(idx);
        self.interned.insert((lin, strict), lit);
        lit
    }

    /// Processes the SAT assignments made since the last call, asserting the
    /// constraints they reify and tightening bounds to fixpoint.
    pub fn propagate(&mut self, sat: &SatCore) -> Result<(), Contradiction> {
        let trail = sat.trail();
        let mut to_assert = Vec::new();
        while self.cursor < trail.len() {
            let p = trail[self.cursor];
            self.cursor += 1;
            if let Some(idxs) = self.watches.get(&p.variable()) {
                for &idx in idxs {
                    let positive = p == self.constraints[idx].lit;
                    to_assert.push((idx, positive));
                }
            }
        }
        for (idx, positive) in to_assert {
            self.active.push((idx, positive));
            self.trail.push(Event::Asserted);
        }
        self.fixpoint()
    }

    fn fixpoint(&mut self) -> Result<(), Contradiction> {
        // positive cycles of bound tightenings diverge; such systems are
        // inconsistent over the rationals, so a round cap doubles as the
        // cycle-detection criterion
        let max_rounds = (self.lbs.len() + 1) * (self.active.len() + 1) + 1;
        let mut rounds = 0;
        loop {
            let mut changed = false;
            for i in 0..self.active.len() {
                let (idx, positive) = self.active[i];
                changed |= self.derive(idx, positive)?;
            }
            if !changed {
                return Ok(());
            }
            rounds += 1;
            if rounds > max_rounds {
                return Err(self.conflict());
            }
        }
    }

    fn conflict(&self) -> Contradiction {
        let clause = self
            .active
            .iter()
            .map(|&(idx, positive)| {
                let l = self.constraints[idx].lit;
                if positive {
                    !l
                } else {
                    l
                }
            })
            .collect();
        Contradiction::from_clause(clause)
    }

    /// Variables whose bounds changed since the last call.
    pub fn take_changed(&mut self) -> Vec<LraVar> {
        std::mem::take(&mut self.changed)
    }

    /// Tightens the bounds entailed by one asserted constraint. Returns
    /// whether some bound changed.
    fn derive(&mut self, idx: usize, positive: bool) -> Result<bool, Contradiction> {
        let (lin, strict) = {
            let c = &self.constraints[idx];
            if positive {
                (c.lin.clone(), c.strict)
            } else {
                // ¬(lin ≤ 0) is -lin < 0, ¬(lin < 0) is -lin ≤ 0
                (-c.lin.clone(), !c.strict)
            }
        };
        let mut changed = false;
        for i in 0..lin.terms.len() {
            let (v, c) = lin.terms[i];
            // minimal value of the rest of the expression
            let mut rest = InfRational::new(lin.known);
            for (j, &(w, cw)) in lin.terms.iter().enumerate() {
                if j == i {
                    continue;
                }
                rest = rest
                    + if cw > Rational::ZERO {
                        self.lbs[w] * cw
                    } else {
                        self.ubs[w] * cw
                    };
            }
            if !rest.is_finite() {
                continue;
            }
            let mut rhs = -rest;
            if strict {
                rhs = rhs - InfRational::EPSILON;
            }
            let bound = rhs * (Rational::ONE / c);
            if c > Rational::ZERO {
                if bound < self.ubs[v] {
                    self.trail.push(Event::Bound {
                        var: v,
                        upper: true,
                        prev: self.ubs[v],
                    });
                    self.ubs[v] = bound;
                    self.changed.push(v);
                    changed = true;
                }
            } else if bound > self.lbs[v] {
                self.trail.push(Event::Bound {
                    var: v,
                    upper: false,
                    prev: self.lbs[v],
                });
                self.lbs[v] = bound;
                self.changed.push(v);
                changed = true;
            }
            if self.lbs[v] > self.ubs[v] {
                return Err(self.conflict());
            }
        }
        Ok(changed)
    }
}

impl Backtrack for LraTheory {
    fn save_state(&mut self) -> DecLvl {
        let lvl = self.trail.save_state();
        self.trail.push(Event::Cursor(self.cursor));
        lvl
    }

    fn num_saved(&self) -> u32 {
        self.trail.num_saved()
    }

    fn restore_last(&mut self) {
        let lbs = &mut self.lbs;
        let ubs = &mut self.ubs;
        let active = &mut self.active;
        let cursor = &mut self.cursor;
        self.trail.restore_last_with(|e| match e {
            Event::Bound { var, upper, prev } => {
                if upper {
                    ubs[var] = prev;
                } else {
                    lbs[var] = prev;
                }
            }
            Event::Asserted => {
                active.pop();
            }
            Event::Cursor(c) => *cursor = c,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rat(i: i64) -> Rational {
        Rational::from(i)
    }

    #[test]
    fn test_bound_propagation() {
        let mut sat = SatCore::new();
        let mut lra = LraTheory::new();
        let x = lra.new_var();
        // x ≤ 5
        let l = lra.new_leq(
            &Lin::var(x),
            &Lin::constant(rat(5)),
            &mut sat,
        );
        sat.new_clause([l]);
        sat.propagate().unwrap();
        lra.propagate(&sat).unwrap();
        assert_eq!(lra.ub(x), InfRational::from(5));
        // 3 ≤ x
        let l2 = lra.new_leq(&Lin::constant(rat(3)), &Lin::var(x), &mut sat);
        sat.new_clause([l2]);
        sat.propagate().unwrap();
        lra.propagate(&sat).unwrap();
        assert_eq!(lra.lb(x), InfRational::from(3));
        let (lb, ub) = lra.bounds(&Lin::var(x));
        assert_eq!((lb, ub), (InfRational::from(3), InfRational::from(5)));
    }

    #[test]
    fn test_negated_constraint_is_strict_reverse() {
        let mut sat = SatCore::new();
        let mut lra = LraTheory::new();
        let x = lra.new_var();
        let l = lra.new_leq(&Lin::var(x), &Lin::constant(rat(0)), &mut sat);
        sat.new_clause([!l]);
        sat.propagate().unwrap();
        lra.propagate(&sat).unwrap();
        // ¬(x ≤ 0) is x > 0
        assert!(lra.lb(x) > InfRational::ZERO);
        assert_eq!(lra.lb(x), InfRational::EPSILON);
    }

    #[test]
    fn test_infeasible_bounds_conflict() {
        let mut sat = SatCore::new();
        let mut lra = LraTheory::new();
        let x = lra.new_var();
        let l1 = lra.new_leq(&Lin::var(x), &Lin::constant(rat(1)), &mut sat);
        let l2 = lra.new_leq(&Lin::constant(rat(2)), &Lin::var(x), &mut sat);
        sat.new_clause([l1]);
        sat.propagate().unwrap();
        lra.propagate(&sat).unwrap();
        assert!(sat.assume(l2));
        sat.propagate().unwrap();
        let conflict = lra.propagate(&sat).unwrap_err();
        assert!(!conflict.clause.is_empty());
    }

    #[test]
    fn test_entailed_constraints_are_constant() {
        let mut sat = SatCore::new();
        let mut lra = LraTheory::new();
        let x = lra.new_var();
        let l = lra.new_leq(&Lin::var(x), &Lin::constant(rat(4)), &mut sat);
        sat.new_clause([l]);
        sat.propagate().unwrap();
        lra.propagate(&sat).unwrap();
        // x ≤ 10 is already entailed by x ≤ 4
        let e = lra.new_leq(&Lin::var(x), &Lin::constant(rat(10)), &mut sat);
        assert_eq!(e, TRUE_LIT);
        // 11 ≤ x is refuted
        let f = lra.new_leq(&Lin::constant(rat(11)), &Lin::var(x), &mut sat);
        assert_eq!(f, FALSE_LIT);
    }

    #[test]
    fn test_backtrack_restores_bounds() {
        let mut sat = SatCore::new();
        let mut lra = LraTheory::new();
        let x = lra.new_var();
        let l = lra.new_leq(&Lin::var(x), &Lin::constant(rat(7)), &mut sat);
        sat.save_state();
        lra.save_state();
        sat.new_clause([l]);
        sat.propagate().unwrap();
        lra.propagate(&sat).unwrap();
        assert_eq!(lra.ub(x), InfRational::from(7));
        sat.restore_last();
        lra.restore_last();
        assert_eq!(lra.ub(x), InfRational::POSITIVE_INFINITY);
    }
}
