//! Transfer amounts.

use crate::Error;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::{convert::TryFrom, fmt, num::NonZeroU64, str::FromStr};

/// A transfer amount.
///
/// Amounts are kept as the text they were given in (so hashes never depend on a
/// float or decimal rendering) together with the parsed decimal value.
///
/// ```
/// use kassenbuch_api::Amount;
///
/// let amount: Amount = " 12.50 ".parse().unwrap();
/// assert_eq!(amount.as_str(), "12.50");
/// assert!("0".parse::<Amount>().is_err());
/// assert!("-3".parse::<Amount>().is_err());
/// assert!("ten".parse::<Amount>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Amount {
    text: String,
    value: Decimal,
}

impl Amount {
    /// The zero amount carried by the genesis block.
    ///
    /// This is the only way to get a non-positive `Amount`.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            text: "0".to_string(),
            value: Decimal::ZERO,
        }
    }

    /// The amount as it is hashed and sent over the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The decimal value of the amount.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.value
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let value = Decimal::from_str(text).map_err(|_| Error::InvalidAmount(text.to_string()))?;
        if value <= Decimal::ZERO {
            return Err(Error::InvalidAmount(text.to_string()));
        }
        Ok(Self {
            text: text.to_string(),
            value,
        })
    }
}

impl TryFrom<String> for Amount {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NonZeroU64> for Amount {
    fn from(units: NonZeroU64) -> Self {
        Self {
            text: units.to_string(),
            value: Decimal::from(units.get()),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text)
    }
}
