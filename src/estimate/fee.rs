//! Fee policy: relay thresholds, the optional per-kilobyte fee, and the protocol minimum fee.

use bitcoin::Amount;

/// Default minimum transaction fee per started kilobyte, in sats. Also the "low output" bar.
pub const DEFAULT_MIN_TX_FEE: u64 = 10_000;

/// Default dust threshold in sats.
pub const DEFAULT_DUST_THRESHOLD: u64 = 5_460;

/// Priority a transaction must exceed to be relayed for free: one coin aged one day, per 250 bytes.
pub const DEFAULT_FREE_PRIORITY_THRESHOLD: f64 = 100_000_000.0 * 144.0 / 250.0;

/// Transactions at or above this size do not fit in the free area of a block.
pub const DEFAULT_FREE_AREA_BYTES: u64 = 1_000;

/// Size from which a transaction is flagged as large.
pub const DEFAULT_LARGE_TX_BYTES: u64 = 2_000;

/// Fee related constants supplied by the wallet and protocol layer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeePolicy {
    /// Protocol minimum fee per started kilobyte. Payment entries below it are "low".
    pub min_tx_fee: Amount,
    /// Payment entries and change below this are dust.
    pub dust_threshold: Amount,
    /// Optional fee the user pays per started kilobyte.
    pub fee_per_kb: Amount,
    /// Free-relay priority bar.
    pub free_priority_threshold: f64,
    /// Size limit for the minimum fee waiver.
    pub free_area_bytes: u64,
    /// Size limit for the large transaction warning.
    pub large_tx_bytes: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            min_tx_fee: Amount::from_sat(DEFAULT_MIN_TX_FEE),
            dust_threshold: Amount::from_sat(DEFAULT_DUST_THRESHOLD),
            fee_per_kb: Amount::ZERO,
            free_priority_threshold: DEFAULT_FREE_PRIORITY_THRESHOLD,
            free_area_bytes: DEFAULT_FREE_AREA_BYTES,
            large_tx_bytes: DEFAULT_LARGE_TX_BYTES,
        }
    }
}

impl FeePolicy {
    /// Whether a transaction with this priority qualifies for free relay.
    pub fn allows_free(&self, priority: f64) -> bool {
        priority > self.free_priority_threshold
    }

    /// The user's optional fee: `fee_per_kb` for every started kilobyte.
    pub fn rate_fee(&self, bytes: u64) -> Amount {
        self.fee_per_kb
            .checked_mul(bytes.div_ceil(1000))
            .unwrap_or(Amount::MAX_MONEY)
    }

    /// The protocol minimum fee rule built from this policy's constants.
    pub fn standard_min_fee(&self) -> StandardMinFee {
        StandardMinFee {
            base_fee: self.min_tx_fee,
            free_area_bytes: self.free_area_bytes,
        }
    }
}

/// Protocol-mandated minimum fee for a transaction of a given size.
pub trait ProtocolMinFee {
    /// Minimum fee for `bytes`, given whether the priority qualifies for free relay.
    fn min_fee(&self, bytes: u64, allow_free: bool) -> Amount;
}

/// `base_fee` per started kilobyte, waived for free-relay eligible transactions
/// smaller than the free area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardMinFee {
    /// Fee charged per started kilobyte.
    pub base_fee: Amount,
    /// Transactions below this size may go free.
    pub free_area_bytes: u64,
}

impl ProtocolMinFee for StandardMinFee {
    fn min_fee(&self, bytes: u64, allow_free: bool) -> Amount {
        if allow_free && bytes < self.free_area_bytes {
            return Amount::ZERO;
        }
        self.base_fee
            .checked_mul(1 + bytes / 1000)
            .unwrap_or(Amount::MAX_MONEY)
    }
}
