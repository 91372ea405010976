//! Monetary values exchanged with the card reader.
//!
//! [`Amount`] is what the operator asks the reader to load onto a card. It
//! is always a positive whole number and is validated locally, before any
//! transport activity, against [`AmountLimits`]. [`Balance`] is what the
//! reader reports back as the value stored on the card.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest amount the operator can type (six digits).
pub const MAX_AMOUNT: u32 = 999_999;

/// Minimum amount the reader accepts when initializing a fresh card.
pub const INITIALIZE_MINIMUM: u32 = 200;

/// A validated, strictly positive amount in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u32);

impl Amount {
    /// The amount as an integer.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why an operator-supplied amount was rejected locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// Zero or negative.
    #[error("amount must be positive, got {0}")]
    NotPositive(i64),

    /// Below the minimum for this operation.
    #[error("amount {amount} is below the minimum of {minimum}")]
    BelowMinimum {
        /// The rejected amount.
        amount: i64,
        /// The operation minimum.
        minimum: u32,
    },

    /// Above the maximum the reader accepts.
    #[error("amount {amount} exceeds the maximum of {maximum}")]
    AboveMaximum {
        /// The rejected amount.
        amount: i64,
        /// The configured maximum.
        maximum: u32,
    },
}

/// Inclusive bounds applied to an amount before it is sent to the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AmountLimits {
    /// Smallest accepted amount.
    pub minimum: u32,
    /// Largest accepted amount.
    pub maximum: u32,
}

impl AmountLimits {
    /// Default limits for initializing a card.
    pub const INITIALIZE: Self = Self {
        minimum: INITIALIZE_MINIMUM,
        maximum: MAX_AMOUNT,
    };

    /// Default limits for recharging a card.
    pub const RECHARGE: Self = Self {
        minimum: 1,
        maximum: MAX_AMOUNT,
    };

    /// Validate a raw operator-supplied amount.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] when the amount is not positive or falls
    /// outside `minimum..=maximum`.
    pub fn validate(&self, raw: i64) -> Result<Amount, AmountError> {
        if raw <= 0 {
            return Err(AmountError::NotPositive(raw));
        }
        if raw < i64::from(self.minimum) {
            return Err(AmountError::BelowMinimum {
                amount: raw,
                minimum: self.minimum,
            });
        }
        if raw > i64::from(self.maximum) {
            return Err(AmountError::AboveMaximum {
                amount: raw,
                maximum: self.maximum,
            });
        }
        // Bounded by `maximum: u32` above.
        u32::try_from(raw).map(Amount).map_err(|_| AmountError::AboveMaximum {
            amount: raw,
            maximum: self.maximum,
        })
    }
}

/// Value stored on a card, as reported by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(i64);

impl Balance {
    /// Wrap a raw balance.
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The balance as an integer.
    #[must_use]
    pub fn value(self) -> i64 {
        self.0
    }

    /// Read a balance from a JSON number.
    ///
    /// Readers built on different firmware report either integers or
    /// floats; floats are rounded to the nearest unit. Anything that is
    /// not a finite number yields `None`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let serde_json::Value::Number(number) = value else {
            return None;
        };
        if let Some(int) = number.as_i64() {
            return Some(Self(int));
        }
        let float = number.as_f64()?;
        float.is_finite().then(|| Self(float.round() as i64))
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
