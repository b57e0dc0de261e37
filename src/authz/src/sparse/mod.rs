//! Sparse storage optimizer
//!
//! A bitmask with a handful of high bits set (say bit 9999) is a three
//! thousand digit decimal string. Storing the set-bit positions instead is
//! far smaller. This module decides which physical representation to use and
//! converts between them; [`BitmaskRepository`] hides the choice from
//! callers entirely.
//!
//! # Modes
//!
//! - `dense`: always store the decimal string
//! - `sparse`: always store one row per set bit
//! - `auto`: re-evaluate [`SparseOptimizer::should_use_sparse`] on every
//!   write, optionally with a lower exit threshold so owners near the
//!   boundary do not flip on each save

mod repository;

pub use repository::BitmaskRepository;

use serde::{Deserialize, Serialize};

use crate::bitmask::{BitPosition, Bitmask};

/// Physical representation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Always decimal string
    #[default]
    Dense,
    /// Always set-bit rows
    Sparse,
    /// Decide per write
    Auto,
}

impl std::str::FromStr for StorageMode {
    type Err = crate::error::AuthzError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" => Ok(Self::Dense),
            "sparse" => Ok(Self::Sparse),
            "auto" => Ok(Self::Auto),
            other => Err(crate::error::AuthzError::Configuration(format!(
                "Unknown storage mode '{}'",
                other
            ))),
        }
    }
}

/// Representation actually chosen for a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// Decimal string column
    Dense,
    /// One row per set bit
    Sparse,
}

/// Serialized physical form of a bitmask: `{"type": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StoredBitmask {
    /// Base-10 decimal string
    Dense(String),
    /// Set-bit positions
    Sparse(Vec<BitPosition>),
}

impl StoredBitmask {
    /// Which representation this value uses
    pub fn representation(&self) -> Representation {
        match self {
            Self::Dense(_) => Representation::Dense,
            Self::Sparse(_) => Representation::Sparse,
        }
    }
}

/// Sparse storage thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseConfig {
    /// Representation policy
    pub mode: StorageMode,

    /// Minimum decimal length before sparse storage is considered
    pub min_dense_size: usize,

    /// Maximum set bits; beyond this per-row overhead dominates
    pub max_bit_count: u64,

    /// Savings (percent of the decimal length) required to go sparse
    pub min_savings_percent: f64,

    /// Estimated storage cost of one sparse row
    pub per_entry_overhead: usize,

    /// Lower savings threshold for leaving sparse storage (hysteresis)
    pub exit_savings_percent: Option<f64>,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::Dense,
            min_dense_size: 30,
            max_bit_count: 64,
            min_savings_percent: 50.0,
            per_entry_overhead: 12,
            exit_savings_percent: None,
        }
    }
}

/// Size estimate for one value
#[derive(Debug, Clone, PartialEq)]
pub struct SparseEstimate {
    /// Length of the decimal string
    pub decimal_len: usize,
    /// Population count
    pub bit_count: u64,
    /// Estimated sparse storage size
    pub sparse_size: u64,
    /// Percentage saved by going sparse (negative when sparse is larger)
    pub savings_percent: f64,
}

/// Decides and converts between dense and sparse bitmask representations
#[derive(Debug, Clone, Default)]
pub struct SparseOptimizer {
    config: SparseConfig,
}

impl SparseOptimizer {
    /// Create a new optimizer
    pub fn new(config: SparseConfig) -> Self {
        Self { config }
    }

    /// Current thresholds
    pub fn config(&self) -> &SparseConfig {
        &self.config
    }

    /// Estimates dense and sparse sizes for a value
    pub fn estimate(&self, value: &Bitmask) -> SparseEstimate {
        let decimal_len = value.decimal_len();
        let bit_count = value.bit_count();
        let sparse_size = bit_count * self.config.per_entry_overhead as u64;
        let savings_percent =
            (decimal_len as f64 - sparse_size as f64) / decimal_len as f64 * 100.0;

        SparseEstimate {
            decimal_len,
            bit_count,
            sparse_size,
            savings_percent,
        }
    }

    /// Whether a value should be stored sparsely
    ///
    /// True only when the savings meet the threshold, the decimal form is at
    /// least `min_dense_size` long, and no more than `max_bit_count` bits are
    /// set.
    pub fn should_use_sparse(&self, value: &Bitmask) -> bool {
        if value.is_zero() {
            return false;
        }

        let estimate = self.estimate(value);
        estimate.savings_percent >= self.config.min_savings_percent
            && estimate.decimal_len >= self.config.min_dense_size
            && estimate.bit_count <= self.config.max_bit_count
    }

    /// Picks the representation for a write, given what is stored now
    pub fn choose(&self, value: &Bitmask, current: Option<Representation>) -> Representation {
        match self.config.mode {
            StorageMode::Dense => Representation::Dense,
            StorageMode::Sparse => Representation::Sparse,
            StorageMode::Auto => {
                if let (Some(Representation::Sparse), Some(exit)) =
                    (current, self.config.exit_savings_percent)
                {
                    if !value.is_zero() {
                        let estimate = self.estimate(value);
                        if estimate.savings_percent >= exit
                            && estimate.bit_count <= self.config.max_bit_count
                        {
                            return Representation::Sparse;
                        }
                    }
                }

                if self.should_use_sparse(value) {
                    Representation::Sparse
                } else {
                    Representation::Dense
                }
            }
        }
    }

    /// Ascending list of set-bit positions
    pub fn compress(&self, value: &Bitmask) -> Vec<BitPosition> {
        value.to_indices()
    }

    /// OR of `1 << position` over the list
    pub fn decompress(&self, positions: &[BitPosition]) -> Bitmask {
        Bitmask::from_indices(positions.iter().copied())
    }

    /// Serializes a value in whichever form the thresholds favour
    pub fn optimize(&self, value: &Bitmask) -> StoredBitmask {
        if self.should_use_sparse(value) {
            StoredBitmask::Sparse(self.compress(value))
        } else {
            StoredBitmask::Dense(value.to_decimal_string())
        }
    }

    /// Encodes a value in an explicit representation
    pub fn encode(&self, value: &Bitmask, representation: Representation) -> StoredBitmask {
        match representation {
            Representation::Dense => StoredBitmask::Dense(value.to_decimal_string()),
            Representation::Sparse => StoredBitmask::Sparse(self.compress(value)),
        }
    }

    /// Reads back a stored value; malformed dense strings read as empty
    pub fn restore(&self, stored: &StoredBitmask) -> Bitmask {
        match stored {
            StoredBitmask::Dense(decimal) => Bitmask::parse_lenient(decimal),
            StoredBitmask::Sparse(positions) => self.decompress(positions),
        }
    }
}
