//! Money represented in Kenyan shilling cents.

use serde::{Deserialize, Serialize};

/// Money amount in cents to avoid floating point issues.
///
/// All monetary values in the system are Kenyan shillings (KES);
/// 100 cents = KES 1.00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = KES 10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole-shilling value.
    pub fn from_shillings(shillings: i64) -> Self {
        Self {
            cents: shillings * 100,
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole-shilling portion.
    pub fn shillings(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after whole shillings).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * quantity as i64,
        }
    }

    /// Returns the given whole percentage of this amount, truncated to cents.
    ///
    /// Used for VAT computation (e.g., `percent(16)` on KES 1,000.00 yields
    /// KES 160.00).
    pub fn percent(&self, rate: u8) -> Money {
        Money {
            cents: self.cents * rate as i64 / 100,
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-KES {}.{:02}", self.shillings().abs(), self.cents_part())
        } else {
            write!(f, "KES {}.{:02}", self.shillings(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents - rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.cents -= rhs.cents;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.cents(), 1234);
        assert_eq!(money.shillings(), 12);
        assert_eq!(money.cents_part(), 34);
    }

    #[test]
    fn test_money_from_shillings() {
        let money = Money::from_shillings(50);
        assert_eq!(money.cents(), 5000);
        assert_eq!(money.shillings(), 50);
        assert_eq!(money.cents_part(), 0);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "KES 12.34");
        assert_eq!(Money::from_cents(100).to_string(), "KES 1.00");
        assert_eq!(Money::from_cents(5).to_string(), "KES 0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-KES 12.34");
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!(a.multiply(3).cents(), 3000);
    }

    #[test]
    fn test_money_percent() {
        // 16% VAT on KES 1,000.00
        assert_eq!(
            Money::from_shillings(1000).percent(16),
            Money::from_shillings(160)
        );
        assert_eq!(Money::from_cents(99).percent(16).cents(), 15);
        assert_eq!(Money::zero().percent(16), Money::zero());
    }

    #[test]
    fn test_money_comparison() {
        assert!(Money::from_cents(100).is_positive());
        assert!(Money::from_cents(0).is_zero());
        assert!(Money::from_cents(-100).is_negative());
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [100, 250, 50].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.cents(), 400);
    }

    #[test]
    fn test_money_serialization_roundtrip() {
        let money = Money::from_cents(1360_00);
        let json = serde_json::to_string(&money).unwrap();
        let deserialized: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(money, deserialized);
    }
}
