//! Arbitrary-precision permission bitmasks
//!
//! A [`Bitmask`] is a non-negative integer of unbounded width whose set bits
//! denote granted actions. Values cross every boundary (storage, config,
//! API) as base-10 decimal strings so that no fixed-width integer ever
//! truncates a mask.
//!
//! # Examples
//!
//! ```
//! use permask_authz::bitmask::Bitmask;
//!
//! let mut mask = Bitmask::zero();
//! mask.set_bit(0);
//! mask.set_bit(2);
//! assert_eq!(mask.to_string(), "5");
//! assert!(mask.has_bit(2));
//! assert_eq!(mask.to_indices(), vec![0, 2]);
//! ```

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::error::{AuthzError, Result};

/// Position of a single permission bit
pub type BitPosition = u32;

/// Arbitrary-precision permission bitmask
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bitmask(BigUint);

impl Bitmask {
    /// The empty mask
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// A mask with exactly one bit set (`1 << position`)
    pub fn from_bit(position: BitPosition) -> Self {
        Self(BigUint::one() << position)
    }

    /// Parses a decimal string strictly
    ///
    /// Surrounding whitespace is ignored. Anything other than ASCII digits is
    /// rejected with [`AuthzError::InvalidBitmask`].
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AuthzError::InvalidBitmask(value.to_string()));
        }

        BigUint::parse_bytes(trimmed.as_bytes(), 10)
            .map(Self)
            .ok_or_else(|| AuthzError::InvalidBitmask(value.to_string()))
    }

    /// Parses a persisted value, reading malformed input as the empty mask
    ///
    /// Stored masks are never trusted to be well formed; a corrupt value
    /// must fail closed without aborting the surrounding check.
    pub fn parse_lenient(value: &str) -> Self {
        match Self::parse(value) {
            Ok(mask) => mask,
            Err(_) => {
                if !value.trim().is_empty() {
                    warn!("Malformed stored bitmask {:?}, treating as empty", value);
                }
                Self::zero()
            }
        }
    }

    /// Builds a mask from a list of set-bit positions
    ///
    /// Duplicate positions are harmless.
    pub fn from_indices<I>(positions: I) -> Self
    where
        I: IntoIterator<Item = BitPosition>,
    {
        let mut digits: Vec<u32> = Vec::new();

        for position in positions {
            let word = (position / 32) as usize;
            if word >= digits.len() {
                digits.resize(word + 1, 0);
            }
            digits[word] |= 1 << (position % 32);
        }

        Self(BigUint::new(digits))
    }

    /// Ascending list of set-bit positions
    pub fn to_indices(&self) -> Vec<BitPosition> {
        let mut positions = Vec::with_capacity(self.bit_count() as usize);

        for (word_idx, word) in self.0.iter_u64_digits().enumerate() {
            let mut remaining = word;
            while remaining != 0 {
                let bit = remaining.trailing_zeros();
                positions.push((word_idx as u64 * 64 + u64::from(bit)) as BitPosition);
                remaining &= remaining - 1;
            }
        }

        positions
    }

    /// Whether the mask is empty
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Tests a single bit
    pub fn has_bit(&self, position: BitPosition) -> bool {
        self.0.bit(u64::from(position))
    }

    /// Sets a single bit
    pub fn set_bit(&mut self, position: BitPosition) {
        self.0.set_bit(u64::from(position), true);
    }

    /// Clears a single bit
    pub fn unset_bit(&mut self, position: BitPosition) {
        self.0.set_bit(u64::from(position), false);
    }

    /// Flips a single bit
    pub fn toggle_bit(&mut self, position: BitPosition) {
        let current = self.has_bit(position);
        self.0.set_bit(u64::from(position), !current);
    }

    /// True when at least one bit of `other` is also set here
    pub fn has_any_bits(&self, other: &Bitmask) -> bool {
        !(&self.0 & &other.0).is_zero()
    }

    /// True when every bit of `other` is also set here
    ///
    /// An empty `other` is vacuously contained; callers that must not treat
    /// the empty mask as satisfied check [`Bitmask::is_zero`] first.
    pub fn has_all_bits(&self, other: &Bitmask) -> bool {
        (&self.0 & &other.0) == other.0
    }

    /// OR of every mask in the list
    pub fn combine<'a, I>(masks: I) -> Self
    where
        I: IntoIterator<Item = &'a Bitmask>,
    {
        let mut result = BigUint::zero();
        for mask in masks {
            result |= &mask.0;
        }
        Self(result)
    }

    /// Bits set in either mask
    pub fn union(&self, other: &Bitmask) -> Self {
        Self(&self.0 | &other.0)
    }

    /// Bits set in both masks
    pub fn intersection(&self, other: &Bitmask) -> Self {
        Self(&self.0 & &other.0)
    }

    /// Bits set here but not in `other`
    pub fn difference(&self, other: &Bitmask) -> Self {
        let shared = &self.0 & &other.0;
        Self(&self.0 ^ shared)
    }

    /// Population count
    pub fn bit_count(&self) -> u64 {
        self.0.count_ones()
    }

    /// Position of the highest set bit, if any
    pub fn highest_bit(&self) -> Option<BitPosition> {
        match self.0.bits() {
            0 => None,
            bits => Some((bits - 1) as BitPosition),
        }
    }

    /// Position of the only set bit (log2), when exactly one bit is set
    pub fn single_bit_position(&self) -> Option<BitPosition> {
        if self.bit_count() == 1 {
            self.0.trailing_zeros().map(|pos| pos as BitPosition)
        } else {
            None
        }
    }

    /// Base-10 representation
    pub fn to_decimal_string(&self) -> String {
        self.0.to_str_radix(10)
    }

    /// Base-16 representation (lowercase, no prefix)
    pub fn to_hex_string(&self) -> String {
        self.0.to_str_radix(16)
    }

    /// Length of the decimal representation
    pub fn decimal_len(&self) -> usize {
        self.to_decimal_string().len()
    }

    /// Borrows the underlying integer
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

impl From<BigUint> for Bitmask {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

impl From<u64> for Bitmask {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl FromStr for Bitmask {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Bitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

impl BitOr for &Bitmask {
    type Output = Bitmask;

    fn bitor(self, rhs: &Bitmask) -> Bitmask {
        self.union(rhs)
    }
}

impl BitOrAssign<&Bitmask> for Bitmask {
    fn bitor_assign(&mut self, rhs: &Bitmask) {
        self.0 |= &rhs.0;
    }
}

impl BitAnd for &Bitmask {
    type Output = Bitmask;

    fn bitand(self, rhs: &Bitmask) -> Bitmask {
        self.intersection(rhs)
    }
}

impl Serialize for Bitmask {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

struct BitmaskVisitor;

impl<'de> Visitor<'de> for BitmaskVisitor {
    type Value = Bitmask;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative decimal integer string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Bitmask, E> {
        Bitmask::parse(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Bitmask, E> {
        Ok(Bitmask::from(value))
    }
}

impl<'de> Deserialize<'de> for Bitmask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(BitmaskVisitor)
    }
}
