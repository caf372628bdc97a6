//! Two-level score: feasibility first, then cost.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub};

use serde::{Serialize, Serializer};

/// A hard/soft score, compared lexicographically.
///
/// Both levels are penalties expressed as non-positive numbers, so higher is
/// better. A solution is feasible when its hard level is zero.
///
/// # Examples
///
/// ```
/// use route_optimizer::score::HardSoftScore;
///
/// let overloaded = HardSoftScore::of(-1, -100);
/// let long = HardSoftScore::of(0, -5_000);
/// assert!(long > overloaded);
/// assert!(long.is_feasible());
/// assert_eq!(long.to_string(), "0hard/-5000soft");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HardSoftScore {
    hard: i64,
    soft: i64,
}

impl HardSoftScore {
    pub const ZERO: HardSoftScore = HardSoftScore { hard: 0, soft: 0 };

    #[inline]
    pub const fn of(hard: i64, soft: i64) -> Self {
        Self { hard, soft }
    }

    #[inline]
    pub const fn of_hard(hard: i64) -> Self {
        Self { hard, soft: 0 }
    }

    #[inline]
    pub const fn of_soft(soft: i64) -> Self {
        Self { hard: 0, soft }
    }

    #[inline]
    pub fn hard(&self) -> i64 {
        self.hard
    }

    #[inline]
    pub fn soft(&self) -> i64 {
        self.soft
    }

    #[inline]
    pub fn is_feasible(&self) -> bool {
        self.hard >= 0
    }
}

impl Ord for HardSoftScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hard
            .cmp(&other.hard)
            .then_with(|| self.soft.cmp(&other.soft))
    }
}

impl PartialOrd for HardSoftScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for HardSoftScore {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::of(self.hard + rhs.hard, self.soft + rhs.soft)
    }
}

impl AddAssign for HardSoftScore {
    fn add_assign(&mut self, rhs: Self) {
        self.hard += rhs.hard;
        self.soft += rhs.soft;
    }
}

impl Sub for HardSoftScore {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::of(self.hard - rhs.hard, self.soft - rhs.soft)
    }
}

impl Neg for HardSoftScore {
    type Output = Self;

    fn neg(self) -> Self {
        Self::of(-self.hard, -self.soft)
    }
}

impl std::iter::Sum for HardSoftScore {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for HardSoftScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}hard/{}soft", self.hard, self.soft)
    }
}

impl Serialize for HardSoftScore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hard_level_dominates() {
        assert!(HardSoftScore::of(0, -1_000_000) > HardSoftScore::of(-1, 0));
        assert!(HardSoftScore::of(-2, 0) < HardSoftScore::of(-1, -9));
        assert!(HardSoftScore::of(0, -3) < HardSoftScore::of(0, -2));
    }

    #[test]
    fn serializes_as_display_string() {
        let json = serde_json::to_string(&HardSoftScore::of(-2, -40)).unwrap();
        assert_eq!(json, "\"-2hard/-40soft\"");
    }

    proptest! {
        #[test]
        fn delta_arithmetic_is_consistent(
            h1 in -1_000i64..1_000, s1 in -100_000i64..100_000,
            h2 in -1_000i64..1_000, s2 in -100_000i64..100_000,
        ) {
            let a = HardSoftScore::of(h1, s1);
            let b = HardSoftScore::of(h2, s2);
            prop_assert_eq!(a + (b - a), b);
            prop_assert_eq!(-(-a), a);
            prop_assert_eq!((a > b), (b - a < HardSoftScore::ZERO));
        }
    }
}
