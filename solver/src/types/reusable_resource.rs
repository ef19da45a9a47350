//! Reusable resources: a capacity is lent to the atoms using the resource
//! and recovered when they end. Overlapping users whose summed amounts exceed
//! the capacity form minimal conflict sets resolved by ordering, forbidding
//! or placing elsewhere.

use crate::model::items::ItemId;
use crate::model::types::{Field, PredId, Sort, TypeId};
use crate::solver::{SolveError, Solver, AMOUNT, CAPACITY};
use crate::types::{Inc, SmartKind};
use crate::utils::{InfRational, Rational};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

impl Solver {
    /// Declares a reusable-resource type with its `Use(amount)` predicate.
    /// Instances carry a `capacity` expression.
    pub fn new_reusable_resource(&mut self, name: impl Into<String>) -> (TypeId, PredId) {
        let tp = self.register_smart(name, SmartKind::ReusableResource);
        let use_pred = self.new_predicate(
            Some(tp),
            "Use",
            vec![Field::new(AMOUNT, Sort::Real)],
            Some(Arc::new(|s: &mut Solver, atm: ItemId| {
                let amount = s.arg(atm, AMOUNT);
                let zero = s.new_real_const(Rational::ZERO);
                let non_negative = s.leq_lit(zero, amount);
                s.assert_lit(non_negative)
            })),
        );
        (tp, use_pred)
    }

    fn amount_of(&self, atm: ItemId) -> Rational {
        let v = self.arith_value(self.arg(atm, AMOUNT));
        v.rat
    }

    fn capacity_of(&self, instance: ItemId) -> Rational {
        match self.opt_arg(instance, CAPACITY) {
            Some(c) => self.arith_value(c).rat,
            None => Rational::PosInfinity,
        }
    }

    pub(crate) fn rr_incs(
        &mut self,
        idx: usize,
        incs: &mut Vec<Inc>,
        created: &mut usize,
    ) -> Result<(), SolveError> {
        let mut reported: BTreeSet<Vec<ItemId>> = BTreeSet::new();
        for (instance, atoms) in self.smart_partition(idx, true) {
            if atoms.len() < 2 {
                continue;
            }
            let capacity = self.capacity_of(instance);
            let mut starting: BTreeMap<InfRational, Vec<ItemId>> = BTreeMap::new();
            let mut ending: BTreeMap<InfRational, Vec<ItemId>> = BTreeMap::new();
            let mut pulses: BTreeSet<InfRational> = BTreeSet::new();
            for &atm in &atoms {
                let (start, end) = self.atom_window(atm);
                starting.entry(start).or_default().push(atm);
                ending.entry(end).or_default().push(atm);
                pulses.insert(start);
                pulses.insert(end);
            }
            let mut overlapping: BTreeSet<ItemId> = BTreeSet::new();
            for p in pulses {
                if let Some(starts) = starting.get(&p) {
                    overlapping.extend(starts.iter().copied());
                }
                if let Some(ends) = ending.get(&p) {
                    for atm in ends {
                        overlapping.remove(atm);
                    }
                }
                let usage = overlapping
                    .iter()
                    .fold(Rational::ZERO, |acc, &a| acc + self.amount_of(a));
                if usage <= capacity {
                    continue;
                }
                for mcs in self.minimal_conflict_sets(&overlapping, capacity) {
                    if !reported.insert(mcs.clone()) {
                        continue;
                    }
                    if self.new_smart_flaw(idx, instance, mcs.clone())? {
                        *created += 1;
                    }
                    incs.push(self.mcs_choices(idx, instance, &mcs));
                }
            }
        }
        Ok(())
    }

    /// The minimal subsets of `overlapping` whose summed amounts exceed the
    /// capacity: removing their smallest contribution brings them back under
    /// it.
    pub(crate) fn minimal_conflict_sets(
        &self,
        overlapping: &BTreeSet<ItemId>,
        capacity: Rational,
    ) -> Vec<Vec<ItemId>> {
        let atoms: Vec<ItemId> = overlapping.iter().copied().collect();
        let mut out = Vec::new();
        for k in 2..=atoms.len() {
            for subset in atoms.iter().copied().combinations(k) {
                let amounts: Vec<Rational> =
                    subset.iter().map(|&a| self.amount_of(a)).collect();
                let sum = amounts.iter().fold(Rational::ZERO, |acc, &a| acc + a);
                if sum <= capacity {
                    continue;
                }
                let min = amounts.iter().copied().min().unwrap_or(Rational::ZERO);
                if sum - min <= capacity {
                    out.push(subset);
                }
            }
        }
        out
    }
}
