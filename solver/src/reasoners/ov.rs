//! The object-variable theory.
//!
//! An object variable ranges over a finite set of items. Each candidate value
//! is guarded by an *allowance* literal in the SAT core, with an exactly-one
//! constraint over the guards: the assignment state of the variable is fully
//! carried by SAT, so the theory itself needs no trail.

use crate::core::{Lbool, Lit, FALSE_LIT, TRUE_LIT};
use crate::create_ref_type;
use crate::model::items::ItemId;
use crate::reasoners::sat::SatCore;

create_ref_type!(OvVar);

pub struct OvTheory {
    domains: Vec<Vec<(ItemId, Lit)>>,
}

impl Default for OvTheory {
    fn default() -> Self {
        Self::new()
    }
}

impl OvTheory {
    pub fn new() -> OvTheory {
        OvTheory {
            domains: Vec::new(),
        }
    }

    /// Creates a variable over the given candidate values, posting the
    /// exactly-one clauses over the fresh allowance literals. Root level only.
    pub fn new_var(&mut self, values: Vec<ItemId>, sat: &mut SatCore) -> OvVar {
        assert!(!values.is_empty(), "empty object-variable domain");
        let dom: Vec<(ItemId, Lit)> = if values.len() == 1 {
            vec![(values[0], TRUE_LIT)]
        } else {
            let lits: Vec<(ItemId, Lit)> = values
                .into_iter()
                .map(|v| (v, Lit::new(sat.new_var(), true)))
                .collect();
            sat.new_clause(lits.iter().map(|&(_, l)| l));
            for i in 0..lits.len() {
                for j in i + 1..lits.len() {
                    sat.new_clause([!lits[i].1, !lits[j].1]);
                }
            }
            lits
        };
        self.domains.push(dom);
        OvVar::from(self.domains.len() - 1)
    }

    /// The literal allowing `val` as the value of `var`; a constant false
    /// literal when `val` is not a candidate.
    pub fn allows(&self, var: OvVar, val: ItemId) -> Lit {
        self.domains[usize::from(var)]
            .iter()
            .find(|&&(v, _)| v == val)
            .map(|&(_, l)| l)
            .unwrap_or(FALSE_LIT)
    }

    /// The candidate values not currently excluded.
    pub fn domain(&self, var: OvVar, sat: &SatCore) -> Vec<ItemId> {
        self.domains[usize::from(var)]
            .iter()
            .filter(|&&(_, l)| sat.value(l) != Lbool::False)
            .map(|&(v, _)| v)
            .collect()
    }

    /// All candidate values, excluded or not.
    pub fn candidates(&self, var: OvVar) -> Vec<ItemId> {
        self.domains[usize::from(var)]
            .iter()
            .map(|&(v, _)| v)
            .collect()
    }

    /// The allowance literals of the variable, for listeners.
    pub fn literals(&self, var: OvVar) -> impl Iterator<Item = Lit> + '_ {
        self.domains[usize::from(var)].iter().map(|&(_, l)| l)
    }

    /// Permanently assigns `val` to `var`. Root level only.
    pub fn assign(&mut self, var: OvVar, val: ItemId, sat: &mut SatCore) -> bool {
        sat.new_clause([self.allows(var, val)])
    }

    /// Permanently removes `val` from the domain of `var`. Root level only.
    pub fn forbid(&mut self, var: OvVar, val: ItemId, sat: &mut SatCore) -> bool {
        sat.new_clause([!self.allows(var, val)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(i: u32) -> ItemId {
        ItemId::from_u32(i)
    }

    #[test]
    fn test_exactly_one_semantics() {
        let mut sat = SatCore::new();
        let mut ov = OvTheory::new();
        let v = ov.new_var(vec![item(0), item(1), item(2)], &mut sat);
        assert_eq!(ov.domain(v, &sat).len(), 3);
        ov.forbid(v, item(0), &mut sat);
        ov.forbid(v, item(1), &mut sat);
        sat.propagate().unwrap();
        // exactly-one forces the remaining value
        assert_eq!(ov.domain(v, &sat), vec![item(2)]);
        assert_eq!(sat.value(ov.allows(v, item(2))), Lbool::True);
    }

    #[test]
    fn test_singleton_domain_is_constant() {
        let mut sat = SatCore::new();
        let mut ov = OvTheory::new();
        let v = ov.new_var(vec![item(7)], &mut sat);
        assert_eq!(ov.allows(v, item(7)), TRUE_LIT);
        assert_eq!(ov.allows(v, item(8)), FALSE_LIT);
    }

    #[test]
    fn test_assign() {
        let mut sat = SatCore::new();
        let mut ov = OvTheory::new();
        let v = ov.new_var(vec![item(0), item(1)], &mut sat);
        ov.assign(v, item(1), &mut sat);
        sat.propagate().unwrap();
        assert_eq!(ov.domain(v, &sat), vec![item(1)]);
    }
}
