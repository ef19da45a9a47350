//! Consumable resources: a level that production atoms raise and consumption
//! atoms lower, linearly over their interval. The level must stay within
//! `[0, capacity]` at every pulse.

use crate::model::items::ItemId;
use crate::model::types::{Field, PredId, Sort, TypeId};
use crate::solver::{SolveError, Solver, AMOUNT, CAPACITY, INITIAL_AMOUNT};
use crate::types::{Inc, SmartKind};
use crate::utils::{InfRational, Rational};
use std::collections::BTreeSet;
use std::sync::Arc;

impl Solver {
    /// Declares a consumable-resource type with its `Produce(amount)` and
    /// `Consume(amount)` predicates. Instances carry `initial_amount` and
    /// `capacity` expressions.
    pub fn new_consumable_resource(
        &mut self,
        name: impl Into<String>,
    ) -> (TypeId, PredId, PredId) {
        let tp = self.register_smart(name, SmartKind::ConsumableResource);
        let non_negative_amount: crate::model::types::Rule =
            Arc::new(|s: &mut Solver, atm: ItemId| {
                let amount = s.arg(atm, AMOUNT);
                let zero = s.new_real_const(Rational::ZERO);
                let lit = s.leq_lit(zero, amount);
                s.assert_lit(lit)
            });
        let produce = self.new_predicate(
            Some(tp),
            "Produce",
            vec![Field::new(AMOUNT, Sort::Real)],
            Some(non_negative_amount.clone()),
        );
        let consume = self.new_predicate(
            Some(tp),
            "Consume",
            vec![Field::new(AMOUNT, Sort::Real)],
            Some(non_negative_amount),
        );
        (tp, produce, consume)
    }

    /// The signed contribution of an atom to the resource level: positive
    /// for production, negative for consumption.
    fn signed_amount(&self, atm: ItemId) -> Rational {
        let amount = self.arith_value(self.arg(atm, AMOUNT)).rat;
        let pred = self.items[atm].as_atom().expect("not an atom").pred;
        if self.predicates[pred].name == "Produce" {
            amount
        } else {
            -amount
        }
    }

    /// The fraction of an atom's contribution delivered by pulse `p`,
    /// assuming linear delivery over its window.
    fn elapsed_fraction(&self, atm: ItemId, p: InfRational) -> Rational {
        let (start, end) = self.atom_window(atm);
        if p <= start {
            return Rational::ZERO;
        }
        if p >= end {
            return Rational::ONE;
        }
        let span = end.rat - start.rat;
        if !span.is_finite() || span == Rational::ZERO {
            return Rational::ONE;
        }
        (p.rat - start.rat) / span
    }

    /// The resource level at pulse `p` under the current assignment.
    pub(crate) fn cr_level(&self, instance: ItemId, atoms: &[ItemId], p: InfRational) -> Rational {
        let mut level = match self.opt_arg(instance, INITIAL_AMOUNT) {
            Some(i) => self.arith_value(i).rat,
            None => Rational::ZERO,
        };
        for &atm in atoms {
            level += self.signed_amount(atm) * self.elapsed_fraction(atm, p);
        }
        level
    }

    pub(crate) fn cr_incs(
        &mut self,
        idx: usize,
        incs: &mut Vec<Inc>,
        created: &mut usize,
    ) -> Result<(), SolveError> {
        let mut reported: BTreeSet<Vec<ItemId>> = BTreeSet::new();
        for (instance, atoms) in self.smart_partition(idx, true) {
            if atoms.is_empty() {
                continue;
            }
            let initial = match self.opt_arg(instance, INITIAL_AMOUNT) {
                Some(i) => self.arith_value(i).rat,
                None => Rational::ZERO,
            };
            let capacity = match self.opt_arg(instance, CAPACITY) {
                Some(c) => self.arith_value(c).rat,
                None => Rational::PosInfinity,
            };
            let mut pulses: BTreeSet<InfRational> = BTreeSet::new();
            for &atm in &atoms {
                let (start, end) = self.atom_window(atm);
                pulses.insert(start);
                pulses.insert(end);
            }
            for p in pulses {
                let mut level = initial;
                let mut contributing: Vec<ItemId> = Vec::new();
                for &atm in &atoms {
                    let fraction = self.elapsed_fraction(atm, p);
                    if fraction > Rational::ZERO {
                        level += self.signed_amount(atm) * fraction;
                        contributing.push(atm);
                    }
                }
                if level >= Rational::ZERO && level <= capacity {
                    continue;
                }
                if contributing.is_empty() {
                    // the initial level itself is out of range
                    incs.push(Vec::new());
                    continue;
                }
                contributing.sort();
                let mcs = contributing;
                if !reported.insert(mcs.clone()) {
                    continue;
                }
                if self.new_smart_flaw(idx, instance, mcs.clone())? {
                    *created += 1;
                }
                incs.push(self.mcs_choices(idx, instance, &mcs));
            }
        }
        Ok(())
    }
}
