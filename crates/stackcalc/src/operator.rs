//! Aggregate operators that fold a whole stack into one value

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CalcError;

/// An associative, commutative reduction over a multiset of integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Numeric minimum
    Min,
    /// Numeric maximum
    Max,
    /// Greatest common divisor (always non-negative)
    Gcd,
    /// Least common multiple (always non-negative)
    Lcm,
}

impl Operator {
    /// All operators, in wire order.
    pub const ALL: [Operator; 4] = [Operator::Min, Operator::Max, Operator::Gcd, Operator::Lcm];

    /// The lowercase name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Min => "min",
            Operator::Max => "max",
            Operator::Gcd => "gcd",
            Operator::Lcm => "lcm",
        }
    }

    /// Fold `values` left to right.
    ///
    /// Returns `Ok(None)` for an empty slice, like `Iterator::try_reduce`.
    ///
    /// Zero handling for the number-theoretic operators:
    /// - `gcd(a, 0) = |a|` and `gcd(0, 0) = 0`
    /// - `lcm` is 0 whenever any operand is 0
    ///
    /// Both `gcd` and `lcm` work on absolute values, so their results are
    /// never negative. A result outside `i32` (`lcm(65536, 65537)`, or
    /// `gcd(i32::MIN, 0)`) is reported as [`CalcError::Overflow`].
    pub fn reduce(self, values: &[i32]) -> Result<Option<i32>, CalcError> {
        let Some((&first, rest)) = values.split_first() else {
            return Ok(None);
        };

        let result = match self {
            Operator::Min => rest.iter().fold(first, |acc, &v| acc.min(v)),
            Operator::Max => rest.iter().fold(first, |acc, &v| acc.max(v)),
            Operator::Gcd => {
                let folded = rest.iter().fold(abs(first), |acc, &v| gcd(acc, abs(v)));
                self.narrow(folded)?
            }
            Operator::Lcm => {
                if values.contains(&0) {
                    0
                } else {
                    let mut acc = abs(first);
                    for &v in rest {
                        acc = lcm(acc, abs(v));
                        // With no zero operands lcm only grows, so stop early.
                        if acc > i64::from(i32::MAX) {
                            break;
                        }
                    }
                    self.narrow(acc)?
                }
            }
        };

        Ok(Some(result))
    }

    fn narrow(self, value: i64) -> Result<i32, CalcError> {
        i32::try_from(value).map_err(|_| CalcError::Overflow { operator: self })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min" => Ok(Operator::Min),
            "max" => Ok(Operator::Max),
            "gcd" => Ok(Operator::Gcd),
            "lcm" => Ok(Operator::Lcm),
            other => Err(CalcError::InvalidOperator(other.to_owned())),
        }
    }
}

fn abs(v: i32) -> i64 {
    i64::from(v).abs()
}

/// Euclid on non-negative operands.
fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Operands are non-negative and at most `2^31`, so `a / g * b` fits in i64.
fn lcm(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        return 0;
    }
    a / gcd(a, b) * b
}
