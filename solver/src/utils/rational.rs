use num_rational::Ratio;
use std::fmt::{Debug, Display, Formatter};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// A rational number extended with positive and negative infinity.
///
/// Flaw costs and theory bounds are rationals that must be closed under the
/// "unreachable" value, hence the explicit infinities. Arithmetic saturates:
/// adding anything finite to an infinity yields the same infinity. Adding two
/// infinities of opposite signs is a programming error.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rational {
    NegInfinity,
    Finite(Ratio<i64>),
    PosInfinity,
}
use Rational::*;

impl Rational {
    pub const ZERO: Rational = Finite(Ratio::new_raw(0, 1));
    pub const ONE: Rational = Finite(Ratio::new_raw(1, 1));

    pub fn new(num: i64, den: i64) -> Rational {
        Finite(Ratio::new(num, den))
    }

    pub fn is_finite(self) -> bool {
        matches!(self, Finite(_))
    }

    pub fn is_infinite(self) -> bool {
        !self.is_finite()
    }

    pub fn is_positive_infinite(self) -> bool {
        self == PosInfinity
    }

    pub fn numer(self) -> i64 {
        match self {
            NegInfinity => -1,
            Finite(r) => *r.numer(),
            PosInfinity => 1,
        }
    }

    pub fn denom(self) -> i64 {
        match self {
            Finite(r) => *r.denom(),
            _ => 0,
        }
    }

    /// The underlying finite ratio.
    ///
    /// # Panics
    ///
    /// Panics if the value is infinite.
    pub fn ratio(self) -> Ratio<i64> {
        match self {
            Finite(r) => r,
            _ => panic!("infinite rational has no finite value"),
        }
    }
}

impl From<i64> for Rational {
    fn from(i: i64) -> Self {
        Finite(Ratio::from_integer(i))
    }
}

impl Add for Rational {
    type Output = Rational;
    fn add(self, rhs: Rational) -> Rational {
        match (self, rhs) {
            (Finite(a), Finite(b)) => Finite(a + b),
            (PosInfinity, NegInfinity) | (NegInfinity, PosInfinity) => {
                panic!("adding infinities of opposite signs")
            }
            (PosInfinity, _) | (_, PosInfinity) => PosInfinity,
            (NegInfinity, _) | (_, NegInfinity) => NegInfinity,
        }
    }
}

impl AddAssign for Rational {
    fn add_assign(&mut self, rhs: Rational) {
        *self = *self + rhs;
    }
}

impl Sub for Rational {
    type Output = Rational;
    fn sub(self, rhs: Rational) -> Rational {
        self + (-rhs)
    }
}

impl Neg for Rational {
    type Output = Rational;
    fn neg(self) -> Rational {
        match self {
            NegInfinity => PosInfinity,
            Finite(r) => Finite(-r),
            PosInfinity => NegInfinity,
        }
    }
}

impl Mul for Rational {
    type Output = Rational;
    fn mul(self, rhs: Rational) -> Rational {
        match (self, rhs) {
            (Finite(a), Finite(b)) => Finite(a * b),
            (a, b) => {
                // infinite factor: the sign of the result follows the signs of
                // the operands; multiplying an infinity by zero is an error
                assert!(a != Rational::ZERO && b != Rational::ZERO, "0 * infinity");
                if (a < Rational::ZERO) == (b < Rational::ZERO) {
                    PosInfinity
                } else {
                    NegInfinity
                }
            }
        }
    }
}

impl Div for Rational {
    type Output = Rational;
    fn div(self, rhs: Rational) -> Rational {
        match (self, rhs) {
            (Finite(a), Finite(b)) => {
                assert!(*b.numer() != 0, "division by zero");
                Finite(a / b)
            }
            (a, Finite(b)) => {
                assert!(*b.numer() != 0, "division by zero");
                if (a < Rational::ZERO) == (b < Ratio::new_raw(0, 1)) {
                    PosInfinity
                } else {
                    NegInfinity
                }
            }
            _ => panic!("division by an infinite rational"),
        }
    }
}

impl Display for Rational {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NegInfinity => write!(f, "-inf"),
            Finite(r) if *r.denom() == 1 => write!(f, "{}", r.numer()),
            Finite(r) => write!(f, "{}/{}", r.numer(), r.denom()),
            PosInfinity => write!(f, "+inf"),
        }
    }
}

impl Debug for Rational {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// A rational extended with an infinitesimal component: `rat + eps·ε`.
///
/// Strict bounds over the rationals are represented with ε, e.g. `x < 5` is
/// `x ≤ 5 - ε`. Ordering is lexicographic on (rat, eps).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InfRational {
    pub rat: Rational,
    pub eps: Rational,
}

impl InfRational {
    pub const ZERO: InfRational = InfRational {
        rat: Rational::ZERO,
        eps: Rational::ZERO,
    };
    pub const EPSILON: InfRational = InfRational {
        rat: Rational::ZERO,
        eps: Rational::ONE,
    };
    pub const POSITIVE_INFINITY: InfRational = InfRational {
        rat: Rational::PosInfinity,
        eps: Rational::ZERO,
    };
    pub const NEGATIVE_INFINITY: InfRational = InfRational {
        rat: Rational::NegInfinity,
        eps: Rational::ZERO,
    };

    pub fn new(rat: Rational) -> InfRational {
        InfRational {
            rat,
            eps: Rational::ZERO,
        }
    }

    pub fn with_eps(rat: Rational, eps: Rational) -> InfRational {
        InfRational { rat, eps }
    }

    pub fn is_finite(self) -> bool {
        self.rat.is_finite()
    }

    pub fn is_positive_infinite(self) -> bool {
        self.rat.is_positive_infinite()
    }
}

impl From<Rational> for InfRational {
    fn from(rat: Rational) -> Self {
        InfRational::new(rat)
    }
}

impl From<i64> for InfRational {
    fn from(i: i64) -> Self {
        InfRational::new(Rational::from(i))
    }
}

impl Add for InfRational {
    type Output = InfRational;
    fn add(self, rhs: InfRational) -> InfRational {
        InfRational {
            rat: self.rat + rhs.rat,
            eps: if self.rat.is_finite() && rhs.rat.is_finite() {
                self.eps + rhs.eps
            } else {
                Rational::ZERO
            },
        }
    }
}

impl Sub for InfRational {
    type Output = InfRational;
    fn sub(self, rhs: InfRational) -> InfRational {
        self + (-rhs)
    }
}

impl Neg for InfRational {
    type Output = InfRational;
    fn neg(self) -> InfRational {
        InfRational {
            rat: -self.rat,
            eps: -self.eps,
        }
    }
}

impl Mul<Rational> for InfRational {
    type Output = InfRational;
    fn mul(self, f: Rational) -> InfRational {
        InfRational {
            rat: self.rat * f,
            eps: self.eps * f,
        }
    }
}

impl Display for InfRational {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.eps == Rational::ZERO {
            write!(f, "{}", self.rat)
        } else {
            write!(f, "{} + {}ε", self.rat, self.eps)
        }
    }
}

impl Debug for InfRational {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Rational::NegInfinity < Rational::ZERO);
        assert!(Rational::ZERO < Rational::ONE);
        assert!(Rational::ONE < Rational::PosInfinity);
        assert!(Rational::new(1, 3) < Rational::new(1, 2));
    }

    #[test]
    fn test_saturating_arithmetic() {
        assert_eq!(Rational::PosInfinity + Rational::ONE, Rational::PosInfinity);
        assert_eq!(Rational::from(2) + Rational::new(1, 2), Rational::new(5, 2));
        assert_eq!(-Rational::PosInfinity, Rational::NegInfinity);
    }

    #[test]
    fn test_division() {
        assert_eq!(Rational::ONE / Rational::from(4), Rational::new(1, 4));
        assert_eq!(
            Rational::PosInfinity / Rational::from(-2),
            Rational::NegInfinity
        );
    }

    #[test]
    fn test_inf_rational_strictness() {
        let five = InfRational::from(5);
        let just_below = five - InfRational::EPSILON;
        assert!(just_below < five);
        assert_eq!(just_below + InfRational::EPSILON, five);
    }

    #[test]
    fn test_inf_rational_infinity_absorbs_eps() {
        let inf = InfRational::POSITIVE_INFINITY;
        assert_eq!(inf + InfRational::EPSILON, inf);
    }
}
