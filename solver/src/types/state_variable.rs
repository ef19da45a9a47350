//! State variables: timelines on which at most one atom may hold at a time.
//! Any overlap of two or more active atoms on an instance yields, for each
//! pair, a minimal conflict set and an `sv_flaw` with order and forbid
//! resolvers.

use crate::model::items::ItemId;
use crate::model::types::TypeId;
use crate::solver::{SolveError, Solver};
use crate::types::{Inc, SmartKind};
use crate::utils::InfRational;
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};

impl Solver {
    /// Declares a state-variable type; predicates later declared on it are
    /// observed for overlaps.
    pub fn new_state_variable(&mut self, name: impl Into<String>) -> TypeId {
        self.register_smart(name, SmartKind::StateVariable)
    }

    pub(crate) fn sv_incs(
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
            // the timeline's pulses: atoms starting and ending at each
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
                if overlapping.len() < 2 {
                    continue;
                }
                // state-variable MCSs are made of two atoms
                for pair in overlapping.iter().copied().combinations(2) {
                    let mcs: Vec<ItemId> = pair;
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
}
