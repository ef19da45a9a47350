//! A two-watched-literal SAT core with first-UIP conflict analysis.
//!
//! The core exposes exactly what the planning layer consumes: variable
//! creation, clause posting with root-level simplification, assumptions,
//! propagation that reports conflicts as learnt clauses, database
//! simplification, and an assignment trail that consumers read through
//! cursors instead of registering callbacks.

use crate::backtrack::{Backtrack, DecLvl};
use crate::collections::ref_store::RefVec;
use crate::core::{BVar, Lbool, Lit, FALSE_LIT, TRUE_LIT};
use crate::create_ref_type;
use crate::reasoners::Contradiction;
use hashbrown::HashSet;
use smallvec::SmallVec;

create_ref_type!(ClauseId);

struct Clause {
    lits: SmallVec<[Lit; 4]>,
    deleted: bool,
}

pub struct SatCore {
    assignment: RefVec<BVar, Lbool>,
    levels: RefVec<BVar, u32>,
    reasons: RefVec<BVar, Option<ClauseId>>,
    clauses: RefVec<ClauseId, Clause>,
    /// For each literal code, the clauses in which that literal is watched.
    watches: Vec<Vec<ClauseId>>,
    trail: Vec<Lit>,
    trail_lim: Vec<usize>,
    qhead: usize,
}

impl Default for SatCore {
    fn default() -> Self {
        Self::new()
    }
}

impl SatCore {
    pub fn new() -> SatCore {
        let mut sat = SatCore {
            assignment: RefVec::new(),
            levels: RefVec::new(),
            reasons: RefVec::new(),
            clauses: RefVec::new(),
            watches: Vec::new(),
            trail: Vec::new(),
            trail_lim: Vec::new(),
            qhead: 0,
        };
        // variable 0 backs the TRUE_LIT / FALSE_LIT constants
        let v0 = sat.new_var();
        debug_assert_eq!(v0, TRUE_LIT.variable());
        sat.enqueue(TRUE_LIT, None);
        sat.qhead = sat.trail.len();
        sat
    }

    pub fn new_var(&mut self) -> BVar {
        let v = self.assignment.push(Lbool::Undef);
        self.levels.push(0);
        self.reasons.push(None);
        self.watches.push(Vec::new());
        self.watches.push(Vec::new());
        v
    }

    pub fn num_vars(&self) -> usize {
        self.assignment.len()
    }

    pub fn value_var(&self, v: BVar) -> Lbool {
        self.assignment[v]
    }

    pub fn value(&self, l: Lit) -> Lbool {
        if l.is_positive() {
            self.assignment[l.variable()]
        } else {
            self.assignment[l.variable()].negated()
        }
    }

    /// The value of `l` if it is fixed at the root level, `Undef` otherwise.
    pub fn fixed(&self, l: Lit) -> Lbool {
        if self.levels[l.variable()] == 0 {
            self.value(l)
        } else {
            Lbool::Undef
        }
    }

    /// The assignment trail, in chronological order. Consumers that need to
    /// react to assignments keep a cursor into this slice and clamp it on
    /// backtracking.
    pub fn trail(&self) -> &[Lit] {
        &self.trail
    }

    fn enqueue(&mut self, p: Lit, reason: Option<ClauseId>) -> bool {
        match self.value(p) {
            Lbool::False => false,
            Lbool::True => true,
            Lbool::Undef => {
                let v = p.variable();
                self.assignment[v] = Lbool::from_bool(p.is_positive());
                self.levels[v] = self.num_saved();
                self.reasons[v] = reason;
                self.trail.push(p);
                true
            }
        }
    }

    /// Opens a new decision level and enqueues `p` as a decision.
    ///
    /// Returns false if `p` is already falsified (the caller must then treat
    /// the state as conflicting).
    pub fn assume(&mut self, p: Lit) -> bool {
        self.trail_lim.push(self.trail.len());
        self.enqueue(p, None)
    }

    /// Enqueues a literal implied by an external theory.
    ///
    /// The implication carries no reason clause, so conflict analysis stops
    /// at it as it would at a decision. Returns false if `p` is already
    /// falsified.
    pub fn enqueue_implied(&mut self, p: Lit) -> bool {
        self.enqueue(p, None)
    }

    /// Adds a clause to the database, performing root-level simplifications.
    ///
    /// Returns false iff the clause is falsified beyond recovery (empty after
    /// simplification, or all literals false with no room to propagate).
    pub fn new_clause(&mut self, lits: impl IntoIterator<Item = Lit>) -> bool {
        let mut ls: Vec<Lit> = lits.into_iter().collect();
        ls.sort_unstable();
        ls.dedup();
        // a literal and its negation are adjacent once sorted
        if ls.windows(2).any(|w| w[0].variable() == w[1].variable()) {
            return true;
        }
        if ls.iter().any(|&l| self.fixed(l) == Lbool::True) {
            return true;
        }
        ls.retain(|&l| self.fixed(l) != Lbool::False);
        match ls.len() {
            0 => false,
            1 => self.enqueue(ls[0], None),
            _ => {
                // watch non-falsified literals first; among falsified ones the
                // most recently assigned, so backtracking wakes the clause up
                ls.sort_by_key(|&l| {
                    std::cmp::Reverse(match self.value(l) {
                        Lbool::False => self.levels[l.variable()],
                        _ => u32::MAX,
                    })
                });
                let (w0, w1) = (ls[0], ls[1]);
                let cid = self.clauses.push(Clause {
                    lits: ls.into(),
                    deleted: false,
                });
                self.watches[w0.code()].push(cid);
                self.watches[w1.code()].push(cid);
                if self.value(w0) == Lbool::Undef && self.value(w1) == Lbool::False {
                    self.enqueue(w0, Some(cid));
                }
                self.value(w0) != Lbool::False
            }
        }
    }

    /// Runs unit propagation to fixpoint.
    ///
    /// On conflict, returns the learnt clause produced by first-UIP analysis;
    /// an empty clause signals a conflict at the root level.
    pub fn propagate(&mut self) -> Result<(), Contradiction> {
        while self.qhead < self.trail.len() {
            let p = self.trail[self.qhead];
            self.qhead += 1;
            let false_lit = !p;
            let watch_code = false_lit.code();
            let watchers = std::mem::take(&mut self.watches[watch_code]);
            let mut kept = Vec::with_capacity(watchers.len());
            let mut conflict: Option<ClauseId> = None;
            for cid in watchers {
                if conflict.is_some() {
                    kept.push(cid);
                    continue;
                }
                if self.clauses[cid].deleted {
                    continue;
                }
                {
                    let cl = &mut self.clauses[cid];
                    if cl.lits[0] == false_lit {
                        cl.lits.swap(0, 1);
                    }
                }
                let first = self.clauses[cid].lits[0];
                if self.value(first) == Lbool::True {
                    kept.push(cid);
                    continue;
                }
                let mut replaced = false;
                for k in 2..self.clauses[cid].lits.len() {
                    let l = self.clauses[cid].lits[k];
                    if self.value(l) != Lbool::False {
                        self.clauses[cid].lits.swap(1, k);
                        self.watches[l.code()].push(cid);
                        replaced = true;
                        break;
                    }
                }
                if replaced {
                    continue;
                }
                kept.push(cid);
                if self.value(first) == Lbool::False {
                    conflict = Some(cid);
                } else {
                    self.enqueue(first, Some(cid));
                }
            }
            self.watches[watch_code] = kept;
            if let Some(cid) = conflict {
                return Err(self.analyze(cid));
            }
        }
        Ok(())
    }

    /// First-UIP conflict analysis.
    fn analyze(&self, conflict: ClauseId) -> Contradiction {
        let cur = self.num_saved();
        if cur == 0 {
            return Contradiction::empty();
        }
        let mut learnt: Vec<Lit> = Vec::new();
        let mut seen: HashSet<BVar> = HashSet::new();
        let mut counter = 0usize;
        let mut p: Option<Lit> = None;
        let mut confl = Some(conflict);
        let mut index = self.trail.len();
        loop {
            if let Some(c) = confl {
                for i in 0..self.clauses[c].lits.len() {
                    let q = self.clauses[c].lits[i];
                    if Some(q) == p {
                        continue;
                    }
                    let v = q.variable();
                    let lvl = self.levels[v];
                    if lvl > 0 && seen.insert(v) {
                        if lvl == cur {
                            counter += 1;
                        } else {
                            learnt.push(q);
                        }
                    }
                }
            }
            loop {
                index -= 1;
                let l = self.trail[index];
                if self.levels[l.variable()] == cur && seen.contains(&l.variable()) {
                    break;
                }
            }
            let pl = self.trail[index];
            counter -= 1;
            if counter == 0 {
                learnt.insert(0, !pl);
                return Contradiction::from_clause(learnt);
            }
            p = Some(pl);
            confl = self.reasons[pl.variable()];
        }
    }

    /// Removes clauses satisfied at the root level and strips falsified
    /// literals from the remaining ones.
    ///
    /// Returns false if propagation uncovers a root-level conflict first.
    pub fn simplify_db(&mut self) -> bool {
        debug_assert!(self.is_root_level());
        if self.propagate().is_err() {
            return false;
        }
        for ci in 0..self.clauses.len() {
            let cid = ClauseId::from(ci);
            if self.clauses[cid].deleted {
                continue;
            }
            let satisfied = self.clauses[cid]
                .lits
                .iter()
                .any(|&l| self.fixed(l) == Lbool::True);
            if satisfied {
                self.clauses[cid].deleted = true;
                continue;
            }
            // watched literals (positions 0 and 1) are never root-falsified in
            // a clause that survived root propagation
            let mut k = 2;
            while k < self.clauses[cid].lits.len() {
                let l = self.clauses[cid].lits[k];
                if self.fixed(l) == Lbool::False {
                    self.clauses[cid].lits.swap_remove(k);
                } else {
                    k += 1;
                }
            }
        }
        true
    }

    /// A literal equivalent to the conjunction of `lits`. Root level only.
    pub fn new_conj(&mut self, lits: &[Lit]) -> Lit {
        debug_assert!(self.is_root_level());
        let mut ls: Vec<Lit> = lits
            .iter()
            .copied()
            .filter(|&l| self.fixed(l) != Lbool::True)
            .collect();
        ls.sort_unstable();
        ls.dedup();
        if ls.iter().any(|&l| self.fixed(l) == Lbool::False)
            || ls.windows(2).any(|w| w[0].variable() == w[1].variable())
        {
            return FALSE_LIT;
        }
        match ls.len() {
            0 => TRUE_LIT,
            1 => ls[0],
            _ => {
                let c = Lit::new(self.new_var(), true);
                for &l in &ls {
                    self.new_clause([!c, l]);
                }
                let mut all: Vec<Lit> = ls.iter().map(|&l| !l).collect();
                all.push(c);
                self.new_clause(all);
                c
            }
        }
    }

    /// A literal equivalent to the disjunction of `lits`. Root level only.
    pub fn new_disj(&mut self, lits: &[Lit]) -> Lit {
        let negated: Vec<Lit> = lits.iter().map(|&l| !l).collect();
        !self.new_conj(&negated)
    }

    /// A literal equivalent to `a ⇔ b`. Root level only.
    pub fn new_eq(&mut self, a: Lit, b: Lit) -> Lit {
        if a == b {
            return TRUE_LIT;
        }
        if a == !b {
            return FALSE_LIT;
        }
        match (self.fixed(a), self.fixed(b)) {
            (Lbool::True, _) => return b,
            (_, Lbool::True) => return a,
            (Lbool::False, _) => return !b,
            (_, Lbool::False) => return !a,
            _ => {}
        }
        let e = Lit::new(self.new_var(), true);
        self.new_clause([!e, !a, b]);
        self.new_clause([!e, a, !b]);
        self.new_clause([e, a, b]);
        self.new_clause([e, !a, !b]);
        e
    }

    /// A literal equivalent to "exactly one of `lits` holds". Root level only.
    pub fn new_exact_one(&mut self, lits: &[Lit]) -> Lit {
        let at_least_one = self.new_disj(lits);
        let mut pairs = Vec::new();
        for i in 0..lits.len() {
            for j in i + 1..lits.len() {
                pairs.push(self.new_conj(&[lits[i], lits[j]]));
            }
        }
        let some_pair = self.new_disj(&pairs);
        self.new_conj(&[at_least_one, !some_pair])
    }
}

impl Backtrack for SatCore {
    fn save_state(&mut self) -> DecLvl {
        self.trail_lim.push(self.trail.len());
        self.current_decision_level()
    }

    fn num_saved(&self) -> u32 {
        self.trail_lim.len() as u32
    }

    fn restore_last(&mut self) {
        let lim = self.trail_lim.pop().expect("no saved state to restore");
        while self.trail.len() > lim {
            let p = self.trail.pop().expect("empty trail");
            let v = p.variable();
            self.assignment[v] = Lbool::Undef;
            self.levels[v] = 0;
            self.reasons[v] = None;
        }
        self.qhead = lim;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(sat: &mut SatCore) -> Lit {
        Lit::new(sat.new_var(), true)
    }

    #[test]
    fn test_unit_propagation() {
        let mut sat = SatCore::new();
        let a = lit(&mut sat);
        let b = lit(&mut sat);
        assert!(sat.new_clause([!a, b]));
        assert!(sat.new_clause([a]));
        sat.propagate().unwrap();
        assert_eq!(sat.value(a), Lbool::True);
        assert_eq!(sat.value(b), Lbool::True);
    }

    #[test]
    fn test_root_conflict_is_unsat() {
        let mut sat = SatCore::new();
        let a = lit(&mut sat);
        assert!(sat.new_clause([a]));
        assert!(!sat.new_clause([!a]));
    }

    #[test]
    fn test_conflict_analysis_learns_asserting_clause() {
        let mut sat = SatCore::new();
        let a = lit(&mut sat);
        let b = lit(&mut sat);
        let c = lit(&mut sat);
        assert!(sat.new_clause([!a, b]));
        assert!(sat.new_clause([!a, c]));
        assert!(sat.new_clause([!b, !c]));
        assert!(sat.assume(a));
        let conflict = sat.propagate().unwrap_err();
        assert!(!conflict.is_unsat());
        assert!(conflict.clause.contains(&!a));
        sat.restore_last();
        assert!(sat.new_clause(conflict.clause));
        sat.propagate().unwrap();
        assert_eq!(sat.value(a), Lbool::False);
    }

    #[test]
    fn test_backtracking_restores_assignment() {
        let mut sat = SatCore::new();
        let a = lit(&mut sat);
        let b = lit(&mut sat);
        sat.new_clause([!a, b]);
        sat.assume(a);
        sat.propagate().unwrap();
        assert_eq!(sat.value(b), Lbool::True);
        sat.restore_last();
        assert_eq!(sat.value(a), Lbool::Undef);
        assert_eq!(sat.value(b), Lbool::Undef);
    }

    #[test]
    fn test_conj_disj() {
        let mut sat = SatCore::new();
        let a = lit(&mut sat);
        let b = lit(&mut sat);
        let c = sat.new_conj(&[a, b]);
        let d = sat.new_disj(&[a, b]);
        sat.new_clause([c]);
        sat.propagate().unwrap();
        assert_eq!(sat.value(a), Lbool::True);
        assert_eq!(sat.value(b), Lbool::True);
        assert_eq!(sat.value(d), Lbool::True);
        assert_eq!(sat.new_conj(&[TRUE_LIT]), TRUE_LIT);
        assert_eq!(sat.new_conj(&[a, !a]), FALSE_LIT);
    }

    #[test]
    fn test_exact_one() {
        let mut sat = SatCore::new();
        let a = lit(&mut sat);
        let b = lit(&mut sat);
        let e = sat.new_exact_one(&[a, b]);
        sat.new_clause([e]);
        sat.new_clause([a]);
        sat.propagate().unwrap();
        assert_eq!(sat.value(b), Lbool::False);
    }
}
