//! Difference logic over the reals.
//!
//! The theory maintains the transitive closure of a weighted constraint graph
//! as an all-pairs distance matrix: `dist[a][b]` is the tightest proven upper
//! bound on `b − a`. Asserting an edge updates the matrix incrementally;
//! a negative self-distance is a conflict. Strict inequalities carry an
//! infinitesimal in their weight.
//!
//! Variable 0 is the zero point: bounds of a single variable are its
//! distances to and from it. Flaw positions and (by default) the temporal
//! ordering literals of the smart types live here.
//!
//! Propagation is bidirectional: asserted literals become edges, and a
//! reified edge the closed matrix newly entails (or refutes) has its literal
//! enqueued back into the SAT core.

use crate::backtrack::{Backtrack, DecLvl};
use crate::core::{BVar, Lbool, Lit, FALSE_LIT, TRUE_LIT};
use crate::create_ref_type;
use crate::model::lang::Lin;
use crate::reasoners::sat::SatCore;
use crate::reasoners::Contradiction;
use crate::utils::{InfRational, Rational};
use hashbrown::HashMap;

create_ref_type!(RdlVar);

struct DiffLeq {
    /// `x − y ≤ k`.
    x: RdlVar,
    y: RdlVar,
    k: InfRational,
    lit: Lit,
}

enum Event {
    Cell {
        a: usize,
        b: usize,
        prev: InfRational,
    },
    Asserted,
    Cursor(usize),
}

pub struct RdlTheory {
    dist: Vec<Vec<InfRational>>,
    constraints: Vec<DiffLeq>,
    watches: HashMap<BVar, Vec<usize>>,
    interned: HashMap<(RdlVar, RdlVar, InfRational), Lit>,
    /// Asserted constraints, for conflict explanations: (index, positive).
    active: Vec<(usize, bool)>,
    trail: crate::backtrack::Trail<Event>,
    cursor: usize,
    /// Variables whose zero-point distances changed since the last
    /// [Self::take_changed].
    changed: Vec<RdlVar>,
    /// Whether the matrix changed since undecided constraints were last
    /// checked for entailment.
    dirty: bool,
}

impl Default for RdlTheory {
    fn default() -> Self {
        Self::new()
    }
}

impl RdlTheory {
    pub fn new() -> RdlTheory {
        let mut rdl = RdlTheory {
            dist: Vec::new(),
            constraints: Vec::new(),
            watches: HashMap::new(),
            interned: HashMap::new(),
            active: Vec::new(),
            trail: crate::backtrack::Trail::new(),
            cursor: 0,
            changed: Vec::new(),
            dirty: false,
        };
        rdl.new_var(); // the zero point
        rdl
    }

    pub fn zero(&self) -> RdlVar {
        RdlVar::from_u32(0)
    }

    pub fn new_var(&mut self) -> RdlVar {
        let n = self.dist.len();
        for row in self.dist.iter_mut() {
            row.push(InfRational::POSITIVE_INFINITY);
        }
        let mut row = vec![InfRational::POSITIVE_INFINITY; n + 1];
        row[n] = InfRational::ZERO;
        self.dist.push(row);
        RdlVar::from(n)
    }

    /// Bounds of `to − from`.
    pub fn distance(&self, from: RdlVar, to: RdlVar) -> (InfRational, InfRational) {
        let (f, t) = (usize::from(from), usize::from(to));
        (-self.dist[t][f], self.dist[f][t])
    }

    /// Bounds of a linear expression, which must be in difference form:
    /// a constant, `±x + k`, or `x − y + k`.
    pub fn bounds(&self, lin: &Lin<RdlVar>) -> (InfRational, InfRational) {
        let k = InfRational::new(lin.known);
        match lin.terms.len() {
            0 => (k, k),
            1 => {
                let (v, c) = lin.terms[0];
                let (lb, ub) = self.distance(self.zero(), v);
                if c == Rational::ONE {
                    (lb + k, ub + k)
                } else {
                    assert!(c == -Rational::ONE, "not in difference form: {lin:?}");
                    (-ub + k, -lb + k)
                }
            }
            2 => {
                let (x, y) = Self::difference_pair(lin);
                let (lb, ub) = self.distance(y, x);
                (lb + k, ub + k)
            }
            _ => panic!("not in difference form: {lin:?}"),
        }
    }

    /// An estimate of the value of `lin`: its lower bound.
    pub fn value(&self, lin: &Lin<RdlVar>) -> InfRational {
        self.bounds(lin).0
    }

    fn difference_pair(lin: &Lin<RdlVar>) -> (RdlVar, RdlVar) {
        assert_eq!(lin.terms.len(), 2, "not in difference form: {lin:?}");
        let (a, ca) = lin.terms[0];
        let (b, cb) = lin.terms[1];
        if ca == Rational::ONE && cb == -Rational::ONE {
            (a, b)
        } else {
            assert!(
                cb == Rational::ONE && ca == -Rational::ONE,
                "not in difference form: {lin:?}"
            );
            (b, a)
        }
    }

    /// A literal reifying `lhs ≤ rhs`; both sides must combine into a
    /// difference form.
    pub fn new_leq(&mut self, lhs: &Lin<RdlVar>, rhs: &Lin<RdlVar>, sat: &mut SatCore) -> Lit {
        self.reify(lhs.clone() - rhs.clone(), InfRational::ZERO, sat)
    }

    /// A literal reifying `lhs < rhs`.
    pub fn new_lt(&mut self, lhs: &Lin<RdlVar>, rhs: &Lin<RdlVar>, sat: &mut SatCore) -> Lit {
        self.reify(lhs.clone() - rhs.clone(), InfRational::EPSILON, sat)
    }

    fn reify(&mut self, diff: Lin<RdlVar>, slack: InfRational, sat: &mut SatCore) -> Lit {
        // diff ≤ 0 (minus slack), i.e. x − y ≤ k
        let (x, y, k) = self.edge_form(&diff);
        let k = k - slack;
        let (xi, yi) = (usize::from(x), usize::from(y));
        if self.dist[yi][xi] <= k {
            return TRUE_LIT;
        }
        if self.dist[xi][yi] + k < InfRational::ZERO {
            return FALSE_LIT;
        }
        if let Some(&l) = self.interned.get(&(x, y, k)) {
            return l;
        }
        let lit = Lit::new(sat.new_var(), true);
        let idx = self.constraints.len();
        self.constraints.push(DiffLeq { x, y, k, lit });
        self.watches.entry(lit.variable()).or_default().push(idx);
        self.interned.insert((x, y, k), lit);
        lit
    }

    fn edge_form(&self, diff: &Lin<RdlVar>) -> (RdlVar, RdlVar, InfRational) {
        let k = InfRational::new(-diff.known);
        match diff.terms.len() {
            0 => {
                // constant expressions are settled by the caller through
                // bounds(); encode as a self-loop on the zero point
                (self.zero(), self.zero(), k)
            }
            1 => {
                let (v, c) = diff.terms[0];
                if c == Rational::ONE {
                    (v, self.zero(), k)
                } else {
                    assert!(c == -Rational::ONE, "not in difference form: {diff:?}");
                    (self.zero(), v, k)
                }
            }
            2 => {
                let (x, y) = Self::difference_pair(diff);
                (x, y, k)
            }
            _ => panic!("not in difference form: {diff:?}"),
        }
    }

    /// Asserts the hard constraint `x − y ≤ k`, used for the flaw position
    /// graph where edges are unconditional.
    pub fn post_leq(&mut self, x: RdlVar, y: RdlVar, k: InfRational) -> Result<(), Contradiction> {
        self.add_edge(x, y, k)
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

    fn add_edge(&mut self, x: RdlVar, y: RdlVar, k: InfRational) -> Result<(), Contradiction> {
        let (xi, yi) = (usize::from(x), usize::from(y));
        if self.dist[yi][xi] <= k {
            return Ok(());
        }
        if self.dist[xi][yi] + k < InfRational::ZERO {
            return Err(self.conflict());
        }
        let n = self.dist.len();
        for u in 0..n {
            let du_y = self.dist[u][yi];
            if !du_y.is_finite() {
                continue;
            }
            for v in 0..n {
                let dx_v = self.dist[xi][v];
                if !dx_v.is_finite() {
                    continue;
                }
                let cand = du_y + k + dx_v;
                if cand < self.dist[u][v] {
                    self.trail.push(Event::Cell {
                        a: u,
                        b: v,
                        prev: self.dist[u][v],
                    });
                    self.dist[u][v] = cand;
                    self.dirty = true;
                    if u == 0 {
                        self.changed.push(RdlVar::from(v));
                    } else if v == 0 {
                        self.changed.push(RdlVar::from(u));
                    }
                }
            }
        }
        Ok(())
    }

    /// Processes the SAT assignments made since the last call, then enqueues
    /// into the SAT core the literals of the reified edges the closed matrix
    /// now entails or refutes.
    pub fn propagate(&mut self, sat: &mut SatCore) -> Result<(), Contradiction> {
        let trail = sat.trail();
        let mut to_assert = Vec::new();
        while self.cursor < trail.len() {
            let p = trail[self.cursor];
            self.cursor += 1;
            if let Some(idxs) = self.watches.get(&p.variable()) {
                for &idx in idxs {
                    to_assert.push((idx, p == self.constraints[idx].lit));
                }
            }
        }
        for (idx, positive) in to_assert {
            self.active.push((idx, positive));
            self.trail.push(Event::Asserted);
            let (x, y, k) = {
                let c = &self.constraints[idx];
                (c.x, c.y, c.k)
            };
            if positive {
                self.add_edge(x, y, k)?;
            } else {
                // ¬(x − y ≤ k) is y − x ≤ −k − ε
                self.add_edge(y, x, -k - InfRational::EPSILON)?;
            }
        }
        if self.dirty {
            self.dirty = false;
            let mut implied = Vec::new();
            for c in &self.constraints {
                if sat.value(c.lit) != Lbool::Undef {
                    continue;
                }
                let (xi, yi) = (usize::from(c.x), usize::from(c.y));
                if self.dist[yi][xi] <= c.k {
                    implied.push(c.lit);
                } else if self.dist[xi][yi] + c.k < InfRational::ZERO {
                    implied.push(!c.lit);
                }
            }
            for l in implied {
                if !sat.enqueue_implied(l) {
                    return Err(self.conflict());
                }
            }
        }
        Ok(())
    }

    /// Variables whose zero-point bounds changed since the last call.
    pub fn take_changed(&mut self) -> Vec<RdlVar> {
        std::mem::take(&mut self.changed)
    }
}

impl Backtrack for RdlTheory {
    fn save_state(&mut self) -> DecLvl {
        let lvl = self.trail.save_state();
        self.trail.push(Event::Cursor(self.cursor));
        lvl
    }

    fn num_saved(&self) -> u32 {
        self.trail.num_saved()
    }

    fn restore_last(&mut self) {
        let dist = &mut self.dist;
        let active = &mut self.active;
        let cursor = &mut self.cursor;
        self.trail.restore_last_with(|e| match e {
            Event::Cell { a, b, prev } => dist[a][b] = prev,
            Event::Asserted => {
                active.pop();
            }
            Event::Cursor(c) => *cursor = c,
        });
        // retracted cells may re-enable entailments on the next check
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inf(i: i64) -> InfRational {
        InfRational::from(i)
    }

    #[test]
    fn test_edge_tightens_distance() {
        let mut rdl = RdlTheory::new();
        let a = rdl.new_var();
        let b = rdl.new_var();
        // b − a ≤ 3, written a − b ≥ -3
        rdl.post_leq(b, a, inf(3)).unwrap();
        let (lb, ub) = rdl.distance(a, b);
        assert_eq!(ub, inf(3));
        assert_eq!(lb, InfRational::NEGATIVE_INFINITY);
        rdl.post_leq(a, b, inf(-1)).unwrap();
        let (lb, _) = rdl.distance(a, b);
        assert_eq!(lb, inf(1));
    }

    #[test]
    fn test_negative_cycle_is_conflict() {
        let mut rdl = RdlTheory::new();
        let a = rdl.new_var();
        let b = rdl.new_var();
        rdl.post_leq(b, a, inf(1)).unwrap();
        assert!(rdl.post_leq(a, b, inf(-2)).is_err());
    }

    #[test]
    fn test_transitive_closure() {
        let mut rdl = RdlTheory::new();
        let a = rdl.new_var();
        let b = rdl.new_var();
        let c = rdl.new_var();
        rdl.post_leq(b, a, inf(2)).unwrap(); // b ≤ a + 2
        rdl.post_leq(c, b, inf(3)).unwrap(); // c ≤ b + 3
        let (_, ub) = rdl.distance(a, c);
        assert_eq!(ub, inf(5));
    }

    #[test]
    fn test_reified_edges() {
        let mut sat = SatCore::new();
        let mut rdl = RdlTheory::new();
        let x = rdl.new_var();
        let y = rdl.new_var();
        let l = rdl.new_leq(&Lin::var(x), &Lin::var(y), &mut sat);
        rdl.save_state();
        assert!(sat.assume(l));
        sat.propagate().unwrap();
        rdl.propagate(&mut sat).unwrap();
        let (_, ub) = rdl.distance(y, x);
        assert_eq!(ub, InfRational::ZERO);
        sat.restore_last();
        rdl.restore_last();
        // deciding the negation asserts the strict reverse
        sat.save_state();
        rdl.save_state();
        assert!(sat.assume(!l));
        sat.propagate().unwrap();
        rdl.propagate(&mut sat).unwrap();
        let (lb, _) = rdl.distance(y, x);
        assert_eq!(lb, InfRational::EPSILON);
    }

    #[test]
    fn test_entailed_edge_is_propagated_to_sat() {
        let mut sat = SatCore::new();
        let mut rdl = RdlTheory::new();
        let x = rdl.new_var();
        let y = rdl.new_var();
        let tight = rdl.new_leq(&Lin::var(x), &Lin::var(y), &mut sat);
        let loose = rdl.new_leq(
            &Lin::var(x),
            &(Lin::var(y) + Lin::constant(Rational::from(5))),
            &mut sat,
        );
        assert_eq!(sat.value(loose), Lbool::Undef);
        assert!(sat.assume(tight));
        sat.propagate().unwrap();
        rdl.propagate(&mut sat).unwrap();
        // x ≤ y entails x ≤ y + 5
        assert_eq!(sat.value(loose), Lbool::True);
    }

    #[test]
    fn test_refuted_edge_is_propagated_to_sat() {
        let mut sat = SatCore::new();
        let mut rdl = RdlTheory::new();
        let x = rdl.new_var();
        let y = rdl.new_var();
        let l = rdl.new_leq(&Lin::var(x), &Lin::var(y), &mut sat);
        // x ≥ y + 2 refutes x ≤ y
        rdl.post_leq(y, x, inf(-2)).unwrap();
        rdl.propagate(&mut sat).unwrap();
        assert_eq!(sat.value(l), Lbool::False);
    }

    #[test]
    fn test_bounds_of_difference_expression() {
        let mut rdl = RdlTheory::new();
        let s = rdl.new_var();
        let e = rdl.new_var();
        rdl.post_leq(rdl.zero(), s, InfRational::ZERO).unwrap(); // s ≥ 0
        rdl.post_leq(s, e, InfRational::ZERO).unwrap(); // s ≤ e
        rdl.post_leq(e, s, inf(5)).unwrap(); // e − s ≤ 5
        let duration = Lin::var(e) - Lin::var(s);
        let (lb, ub) = rdl.bounds(&duration);
        assert_eq!(lb, InfRational::ZERO);
        assert_eq!(ub, inf(5));
    }
}
