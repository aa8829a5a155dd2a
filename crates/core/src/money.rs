//! Money and currency value objects.
//!
//! Amounts are `rust_decimal::Decimal` so arithmetic is exact. `Money` can never
//! be negative: every operation that would produce a negative amount, or that
//! mixes currencies, is rejected with [`DomainError::Validation`].

use core::cmp::Ordering;
use core::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// ISO-4217 style three-letter currency code, stored upper case.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub fn new(code: &str) -> DomainResult<Self> {
        let bytes = code.trim().as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(DomainError::validation(format!(
                "currency code must be three letters, got '{code}'"
            )));
        }
        Ok(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }

    pub fn usd() -> Self {
        Self(*b"USD")
    }

    pub fn as_str(&self) -> &str {
        // Constructed from ASCII letters only.
        core::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.as_str().to_string()
    }
}

impl ValueObject for Currency {}

/// A non-negative amount in a single currency.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMoney", into = "RawMoney")]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

/// Unvalidated wire shape, so deserialisation goes through `Money::new`.
#[derive(Serialize, Deserialize)]
struct RawMoney {
    amount: Decimal,
    currency: Currency,
}

impl TryFrom<RawMoney> for Money {
    type Error = DomainError;

    fn try_from(value: RawMoney) -> Result<Self, Self::Error> {
        Money::new(value.amount, value.currency)
    }
}

impl From<Money> for RawMoney {
    fn from(value: Money) -> Self {
        RawMoney {
            amount: value.amount,
            currency: value.currency,
        }
    }
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation(format!(
                "money amount must not be negative, got {amount}"
            )));
        }
        Ok(Self { amount, currency })
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Lossy conversion for scoring heuristics; never use for bookkeeping.
    pub fn to_f64(&self) -> f64 {
        self.amount.to_f64().unwrap_or(0.0)
    }

    pub fn ensure_same_currency(&self, other: &Money) -> DomainResult<()> {
        if self.currency != other.currency {
            return Err(DomainError::validation(format!(
                "currency mismatch: {} vs {}",
                self.currency, other.currency
            )));
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Money) -> DomainResult<Money> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| DomainError::validation("money addition overflow"))?;
        Money::new(amount, self.currency)
    }

    /// Subtract, rejecting a negative result.
    pub fn checked_sub(&self, other: &Money) -> DomainResult<Money> {
        self.ensure_same_currency(other)?;
        if other.amount > self.amount {
            return Err(DomainError::validation(format!(
                "subtraction would produce a negative amount ({} - {})",
                self.amount, other.amount
            )));
        }
        Money::new(self.amount - other.amount, self.currency)
    }

    /// Multiply by a non-negative factor, rounded to cents.
    pub fn multiply(&self, factor: Decimal) -> DomainResult<Money> {
        if factor.is_sign_negative() && !factor.is_zero() {
            return Err(DomainError::validation("money factor must not be negative"));
        }
        let amount = self
            .amount
            .checked_mul(factor)
            .ok_or_else(|| DomainError::validation("money multiplication overflow"))?;
        Money::new(round_cents(amount), self.currency)
    }

    /// Split into `parts` equal shares, rounded to cents.
    pub fn divide(&self, parts: u32) -> DomainResult<Money> {
        if parts == 0 {
            return Err(DomainError::validation("cannot divide money into zero parts"));
        }
        Money::new(round_cents(self.amount / Decimal::from(parts)), self.currency)
    }

    pub fn compare(&self, other: &Money) -> DomainResult<Ordering> {
        self.ensure_same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    pub fn min(&self, other: &Money) -> DomainResult<Money> {
        Ok(match self.compare(other)? {
            Ordering::Greater => *other,
            _ => *self,
        })
    }

    pub fn rounded(&self) -> Money {
        Money {
            amount: round_cents(self.amount),
            currency: self.currency,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount.round_dp(2), self.currency)
    }
}

impl ValueObject for Money {}

fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
