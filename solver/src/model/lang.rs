use crate::utils::Rational;
use smallvec::SmallVec;

/// A linear expression `Σ cᵢ·xᵢ + k` over the variables of one arithmetic
/// theory.
///
/// Terms are kept sorted by variable with no zero coefficients and no
/// duplicates, so that structurally equal expressions compare and hash equal
/// (reified constraints are interned on this form).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Lin<V> {
    pub terms: SmallVec<[(V, Rational); 2]>,
    pub known: Rational,
}

impl<V: Copy + Ord> Lin<V> {
    pub fn constant(k: Rational) -> Lin<V> {
        Lin {
            terms: SmallVec::new(),
            known: k,
        }
    }

    pub fn var(v: V) -> Lin<V> {
        Lin {
            terms: smallvec::smallvec![(v, Rational::ONE)],
            known: Rational::ZERO,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    fn normalize(mut self) -> Lin<V> {
        self.terms.sort_by_key(|(v, _)| *v);
        let mut out: SmallVec<[(V, Rational); 2]> = SmallVec::new();
        for (v, c) in self.terms.drain(..) {
            match out.last_mut() {
                Some((lv, lc)) if *lv == v => *lc += c,
                _ => out.push((v, c)),
            }
        }
        out.retain(|(_, c)| *c != Rational::ZERO);
        Lin {
            terms: out,
            known: self.known,
        }
    }

    pub fn scaled(mut self, factor: Rational) -> Lin<V> {
        if factor == Rational::ZERO {
            return Lin::constant(Rational::ZERO);
        }
        for (_, c) in self.terms.iter_mut() {
            *c = *c * factor;
        }
        self.known = self.known * factor;
        self
    }
}

impl<V: Copy + Ord> std::ops::Add for Lin<V> {
    type Output = Lin<V>;
    fn add(mut self, rhs: Lin<V>) -> Lin<V> {
        self.terms.extend(rhs.terms);
        self.known = self.known + rhs.known;
        self.normalize()
    }
}

impl<V: Copy + Ord> std::ops::Sub for Lin<V> {
    type Output = Lin<V>;
    fn sub(self, rhs: Lin<V>) -> Lin<V> {
        self + (-rhs)
    }
}

impl<V: Copy + Ord> std::ops::Neg for Lin<V> {
    type Output = Lin<V>;
    fn neg(self) -> Lin<V> {
        self.scaled(-Rational::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_cancel() {
        let x = 0u32;
        let y = 1u32;
        let s = Lin::var(x) + Lin::var(y) - Lin::var(x);
        assert_eq!(s, Lin::var(y));
        let z = Lin::var(x) - Lin::var(x);
        assert!(z.is_constant());
        assert_eq!(z.known, Rational::ZERO);
    }

    #[test]
    fn test_scaling() {
        let x = 0u32;
        let s = (Lin::var(x) + Lin::constant(Rational::from(3))).scaled(Rational::from(2));
        assert_eq!(s.known, Rational::from(6));
        assert_eq!(s.terms[0].1, Rational::from(2));
    }
}
