//! Cost estimation for a manual coin selection.
//!
//! Every run recomputes everything from the current selection, coin list and payment
//! request. The only side effect is pruning selections that no longer point at a live,
//! unlocked candidate.

mod fee;
mod priority;

pub use fee::{
    FeePolicy, ProtocolMinFee, StandardMinFee, DEFAULT_DUST_THRESHOLD, DEFAULT_FREE_AREA_BYTES,
    DEFAULT_FREE_PRIORITY_THRESHOLD, DEFAULT_LARGE_TX_BYTES, DEFAULT_MIN_TX_FEE,
};
pub use priority::PriorityLabel;

use std::fmt;

use bitcoin::{Amount, OutPoint, SignedAmount};
use serde::Serialize;

use crate::{
    coins::{CandidateOutput, CoinList, KeyShape, PubKeyLookup},
    selection::SelectionStore,
};

/// Input size when signed with a compressed key.
pub const COMPRESSED_INPUT_BYTES: u64 = 148;
/// Input size when signed with an uncompressed key.
pub const UNCOMPRESSED_INPUT_BYTES: u64 = 180;
/// Size of one P2PKH output.
pub const OUTPUT_BYTES: u64 = 34;
/// Version, locktime and counts.
pub const TX_OVERHEAD_BYTES: u64 = 10;
/// How far an uncompressed input overshoots the free priority area (180 - 151).
pub const UNCOMPRESSED_PRIORITY_EXTRA: u64 = 29;
/// Two outputs plus overhead, the baseline of single-output row priorities.
pub const ROW_BASE_BYTES: u64 = 2 * OUTPUT_BYTES + TX_OVERHEAD_BYTES;

/// Estimated size of the input spending an output of this key shape.
pub fn input_bytes(shape: KeyShape) -> u64 {
    match shape {
        KeyShape::Uncompressed => UNCOMPRESSED_INPUT_BYTES,
        KeyShape::Compressed | KeyShape::Unresolved => COMPRESSED_INPUT_BYTES,
    }
}

/// Priority of a single output as if spent alone in a two-output transaction.
pub fn output_priority(output: &CandidateOutput, shape: KeyShape) -> f64 {
    let extra = if shape == KeyShape::Uncompressed {
        UNCOMPRESSED_PRIORITY_EXTRA
    } else {
        0
    };
    output.value.to_sat() as f64 / (extra + ROW_BASE_BYTES) as f64 * (output.depth as f64 + 1.0)
}

/// "Low output" display state of the payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LowOutputStatus {
    /// No positive entry below the low threshold.
    No,
    /// Some entry is low but none is dust.
    Yes,
    /// Some entry is dust.
    #[serde(rename = "dust!")]
    Dust,
}

impl fmt::Display for LowOutputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LowOutputStatus::No => write!(f, "no"),
            LowOutputStatus::Yes => write!(f, "yes"),
            LowOutputStatus::Dust => write!(f, "dust!"),
        }
    }
}

/// Aggregate statistics of the current selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EstimateResult {
    /// Number of selected live outputs.
    pub quantity: usize,
    /// Total input value.
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
    /// Fee, including any folded dust change.
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub fee: Amount,
    /// Input minus fee. Negative when the fee alone exceeds the inputs.
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub net_amount: SignedAmount,
    /// Displayed size estimate.
    pub bytes: u64,
    /// Numeric priority.
    pub priority: f64,
    /// Priority label, `None` when nothing is selected.
    pub priority_label: Option<PriorityLabel>,
    /// Change returned to the payer. Negative means insufficient funds.
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub change: SignedAmount,
    /// Some positive payment entry is below the minimum fee.
    pub low_output: bool,
    /// Some positive payment entry is below the dust threshold.
    pub dust_output: bool,
    /// Sub-dust change was folded into the fee.
    pub dust_change: bool,
    /// The payment request total is non-zero.
    pub payment_active: bool,
    /// The payment request plus the fee exceeds the selected input.
    pub insufficient_funds: bool,
    /// The size estimate reached the large transaction limit.
    pub large_transaction: bool,
    /// Something is selected but the priority does not clear the free-relay bar.
    pub low_priority: bool,
}

impl EstimateResult {
    /// Combined low/dust display state.
    pub fn low_output_status(&self) -> LowOutputStatus {
        match (self.low_output, self.dust_output) {
            (_, true) => LowOutputStatus::Dust,
            (true, false) => LowOutputStatus::Yes,
            (false, false) => LowOutputStatus::No,
        }
    }
}

#[derive(Debug, Default)]
struct InputTally {
    quantity: usize,
    amount: Amount,
    priority_inputs: f64,
    bytes: u64,
    uncompressed: u64,
}

impl InputTally {
    fn add(&mut self, output: &CandidateOutput, shape: KeyShape) {
        self.quantity += 1;
        self.amount = self
            .amount
            .checked_add(output.value)
            .unwrap_or(Amount::MAX_MONEY);
        self.priority_inputs += output.value.to_sat() as f64 * (output.depth as f64 + 1.0);
        self.bytes += input_bytes(shape);
        if shape == KeyShape::Uncompressed {
            self.uncompressed += 1;
        }
    }
}

/// Computes [`EstimateResult`]s under a fee policy and a protocol minimum fee rule.
#[derive(Debug, Clone)]
pub struct CostEstimator<M = StandardMinFee> {
    policy: FeePolicy,
    min_fee: M,
}

impl CostEstimator<StandardMinFee> {
    /// Estimator using the policy's own [`StandardMinFee`].
    pub fn new(policy: FeePolicy) -> Self {
        let min_fee = policy.standard_min_fee();
        Self { policy, min_fee }
    }
}

impl<M: ProtocolMinFee> CostEstimator<M> {
    /// Estimator with a host supplied minimum fee rule.
    pub fn with_min_fee(policy: FeePolicy, min_fee: M) -> Self {
        Self { policy, min_fee }
    }

    /// The fee policy in use.
    pub fn policy(&self) -> &FeePolicy {
        &self.policy
    }

    /// Label for a priority under this policy's free-relay bar.
    pub fn priority_label(&self, priority: f64) -> PriorityLabel {
        PriorityLabel::classify(priority, |p| self.policy.allows_free(p))
    }

    /// The larger of the optional per-kilobyte fee and the protocol minimum fee.
    pub fn fee_for(&self, bytes: u64, priority: f64) -> Amount {
        let rate_fee = self.policy.rate_fee(bytes);
        let min_fee = self
            .min_fee
            .min_fee(bytes, self.policy.allows_free(priority));
        rate_fee.max(min_fee)
    }

    /// Estimates the cost of spending the selected outputs to `payments`.
    ///
    /// Selected outputs that are missing from `coins`, spent, or locked are unselected
    /// and ignored.
    pub fn estimate(
        &self,
        store: &mut SelectionStore,
        coins: &CoinList,
        payments: &[Amount],
        keys: &impl PubKeyLookup,
    ) -> EstimateResult {
        let mut result = EstimateResult::default();

        let mut pay_total = Amount::ZERO;
        for amount in payments {
            pay_total = pay_total.checked_add(*amount).unwrap_or(Amount::MAX_MONEY);
            if *amount > Amount::ZERO {
                if *amount < self.policy.min_tx_fee {
                    result.low_output = true;
                }
                if *amount < self.policy.dust_threshold {
                    result.dust_output = true;
                }
            }
        }
        result.payment_active = pay_total > Amount::ZERO;

        let candidates = coins.index();
        let mut tally = InputTally::default();
        let mut stale: Vec<OutPoint> = Vec::new();
        for outpoint in store.list_selected() {
            match candidates.get(outpoint) {
                Some(output) if !output.spent && !store.is_locked(outpoint) => {
                    tally.add(output, KeyShape::resolve(&output.script_pubkey, keys));
                }
                _ => stale.push(*outpoint),
            }
        }
        for outpoint in &stale {
            log::debug!("Unselecting stale output {outpoint}");
            store.unselect(outpoint);
        }

        if tally.quantity == 0 {
            return result;
        }

        let output_slots = if payments.is_empty() {
            2
        } else {
            payments.len() as u64 + 1
        };
        let mut bytes = tally.bytes + output_slots * OUTPUT_BYTES + TX_OVERHEAD_BYTES;

        let priority = tally.priority_inputs
            / (bytes - tally.bytes + tally.uncompressed * UNCOMPRESSED_PRIORITY_EXTRA) as f64;
        let label = self.priority_label(priority);

        let mut fee = self.fee_for(bytes, priority);
        let mut change: i64 = 0;

        if result.payment_active {
            let pay = pay_total.min(tally.amount);
            change = signed(tally.amount) - signed(fee) - signed(pay);

            if change > 0 && change < signed(self.policy.dust_threshold) {
                log::debug!("Folding {change} sats of dust change into the fee");
                fee += Amount::from_sat(change as u64);
                change = 0;
                result.dust_change = true;
            }

            // No change output needed. Display only, the fee was sized with it.
            if change == 0 {
                bytes -= OUTPUT_BYTES;
            }
        }

        result.quantity = tally.quantity;
        result.amount = tally.amount;
        result.fee = fee;
        result.net_amount = SignedAmount::from_sat(signed(tally.amount) - signed(fee));
        result.bytes = bytes;
        result.priority = priority;
        result.priority_label = Some(label);
        result.change = SignedAmount::from_sat(change);
        // Judged on the full request; the change above is against the clamped one.
        result.insufficient_funds = pay_total
            .checked_add(fee)
            .map_or(true, |needed| needed > tally.amount);
        result.large_transaction = bytes >= self.policy.large_tx_bytes;
        result.low_priority = !self.policy.allows_free(priority);

        log::debug!(
            "Estimate: {} inputs, {} sats in, fee {} sats, ~{} bytes, priority {} ({})",
            result.quantity,
            result.amount.to_sat(),
            result.fee.to_sat(),
            result.bytes,
            result.priority,
            label
        );
        if result.insufficient_funds {
            log::warn!(
                "Insufficient funds: {} sats selected, {} sats requested plus {} sats fee",
                result.amount.to_sat(),
                pay_total.to_sat(),
                result.fee.to_sat()
            );
        }

        result
    }
}

fn signed(amount: Amount) -> i64 {
    amount.to_sat() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{
        hashes::Hash,
        secp256k1::{Secp256k1, SecretKey},
        PubkeyHash, PublicKey, ScriptBuf, Txid,
    };
    use std::collections::HashMap;

    const COIN: u64 = 100_000_000;

    struct Fixture {
        coins: CoinList,
        keys: HashMap<PubkeyHash, PublicKey>,
        store: SelectionStore,
    }

    fn pubkey(seed: u8, compressed: bool) -> PublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
        let mut pk = PublicKey::new(sk.public_key(&secp));
        pk.compressed = compressed;
        pk
    }

    fn op(n: u8, vout: u32) -> OutPoint {
        OutPoint::new(Txid::from_byte_array([n; 32]), vout)
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                coins: CoinList::new(),
                keys: HashMap::new(),
                store: SelectionStore::new(),
            }
        }

        fn add(&mut self, outpoint: OutPoint, sats: u64, depth: u32, compressed: bool) {
            let pk = pubkey(outpoint.txid.to_byte_array()[0], compressed);
            self.keys.insert(pk.pubkey_hash(), pk);
            self.coins.push(
                "addr",
                CandidateOutput {
                    outpoint,
                    value: Amount::from_sat(sats),
                    script_pubkey: ScriptBuf::new_p2pkh(&pk.pubkey_hash()),
                    depth,
                    spent: false,
                    time: 0,
                },
            );
            self.store.select(outpoint);
        }

        fn run(&mut self, estimator: &CostEstimator, payments: &[u64]) -> EstimateResult {
            let payments: Vec<Amount> = payments.iter().map(|s| Amount::from_sat(*s)).collect();
            estimator.estimate(&mut self.store, &self.coins, &payments, &self.keys)
        }
    }

    #[test]
    fn test_single_compressed_input() {
        let estimator = CostEstimator::new(FeePolicy::default());
        let mut fx = Fixture::new();
        fx.add(op(1, 0), 5 * COIN, 6, true);

        let result = fx.run(&estimator, &[4 * COIN]);

        assert_eq!(result.quantity, 1);
        assert_eq!(result.amount, Amount::from_sat(5 * COIN));
        // 148 + 2 * 34 + 10, change output kept.
        assert_eq!(result.bytes, 226);
        // 5e8 * 7 / 78 is below the free-relay bar.
        assert!((result.priority - 5.0 * COIN as f64 * 7.0 / 78.0).abs() < 1e-6);
        assert!(result.low_priority);
        assert_eq!(result.priority_label, Some(PriorityLabel::BelowMedium));
        assert_eq!(result.fee, Amount::from_sat(10_000));
        assert_eq!(
            result.net_amount,
            SignedAmount::from_sat(5 * COIN as i64 - 10_000)
        );
        assert_eq!(result.change, SignedAmount::from_sat(COIN as i64 - 10_000));
        assert!(!result.insufficient_funds);
        assert!(!result.dust_change);
    }

    #[test]
    fn test_empty_selection() {
        let estimator = CostEstimator::new(FeePolicy::default());
        let mut fx = Fixture::new();

        let result = fx.run(&estimator, &[COIN]);

        assert_eq!(result.quantity, 0);
        assert_eq!(result.amount, Amount::ZERO);
        assert_eq!(result.fee, Amount::ZERO);
        assert_eq!(result.change, SignedAmount::ZERO);
        assert_eq!(result.bytes, 0);
        assert_eq!(result.priority_label, None);
        assert!(result.payment_active);
        assert!(!result.insufficient_funds);
        assert!(!result.low_priority);
    }

    #[test]
    fn test_empty_payment_request_assumes_two_outputs() {
        let estimator = CostEstimator::new(FeePolicy::default());
        let mut fx = Fixture::new();
        fx.add(op(1, 0), COIN, 10, true);
        fx.add(op(2, 1), COIN, 10, true);

        let result = fx.run(&estimator, &[]);

        assert_eq!(result.quantity, 2);
        assert_eq!(result.bytes, 2 * 148 + 2 * 34 + 10);
        assert!(!result.payment_active);
        assert_eq!(result.change, SignedAmount::ZERO);
        assert_eq!(
            result.net_amount,
            SignedAmount::from_sat(2 * COIN as i64) - SignedAmount::from_sat(result.fee.to_sat() as i64)
        );
    }

    #[test]
    fn test_uncompressed_inputs() {
        let estimator = CostEstimator::new(FeePolicy::default());
        let mut fx = Fixture::new();
        fx.add(op(1, 0), COIN, 0, false);
        fx.add(op(2, 0), COIN, 0, true);

        let result = fx.run(&estimator, &[COIN / 2, COIN / 4]);

        // 180 + 148 + 3 * 34 + 10
        assert_eq!(result.bytes, 440);
        let expected = 2.0 * COIN as f64 / (3.0 * 34.0 + 10.0 + 29.0);
        assert!((result.priority - expected).abs() < 1e-6);
    }

    #[test]
    fn test_unresolvable_destination_uses_default_size() {
        let estimator = CostEstimator::new(FeePolicy::default());
        let mut fx = Fixture::new();
        fx.add(op(1, 0), COIN, 0, false);
        // The wallet forgot the key.
        fx.keys.clear();

        let result = fx.run(&estimator, &[]);
        assert_eq!(result.bytes, 148 + 2 * 34 + 10);
    }

    #[test]
    fn test_stale_selections_are_pruned() {
        let estimator = CostEstimator::new(FeePolicy::default());
        let mut fx = Fixture::new();
        fx.add(op(1, 0), COIN, 1, true);
        fx.add(op(2, 0), 2 * COIN, 1, true);
        fx.add(op(3, 0), 3 * COIN, 1, true);

        // Spent since the snapshot.
        let mut coins = CoinList::new();
        for (address, output) in fx.coins.outputs() {
            let mut output = output.clone();
            output.spent = output.outpoint == op(2, 0);
            coins.push(address, output);
        }
        fx.coins = coins;
        // Not in the coin list at all.
        fx.store.select(op(9, 9));

        let result = fx.run(&estimator, &[]);

        assert_eq!(result.quantity, 2);
        assert_eq!(result.amount, Amount::from_sat(4 * COIN));
        assert_eq!(fx.store.selected_count(), 2);
        assert!(!fx.store.is_selected(&op(2, 0)));
        assert!(!fx.store.is_selected(&op(9, 9)));
    }

    #[test]
    fn test_dust_change_is_folded_into_fee() {
        let estimator = CostEstimator::new(FeePolicy::default());
        let mut fx = Fixture::new();
        fx.add(op(1, 0), 1_000_000, 0, true);

        // 1_000_000 - 10_000 fee - 988_000 = 2_000 change, below dust.
        let result = fx.run(&estimator, &[988_000]);

        assert!(result.dust_change);
        assert_eq!(result.change, SignedAmount::ZERO);
        assert_eq!(result.fee, Amount::from_sat(12_000));
        assert_eq!(result.net_amount, SignedAmount::from_sat(988_000));
        // Change output dropped from the displayed size only.
        assert_eq!(result.bytes, 226 - 34);
    }

    #[test]
    fn test_exact_change_zero_shrinks_displayed_size() {
        let estimator = CostEstimator::new(FeePolicy::default());
        let mut fx = Fixture::new();
        fx.add(op(1, 0), 1_000_000, 0, true);

        let result = fx.run(&estimator, &[990_000]);

        assert!(!result.dust_change);
        assert_eq!(result.change, SignedAmount::ZERO);
        assert_eq!(result.fee, Amount::from_sat(10_000));
        assert_eq!(result.bytes, 192);
    }

    #[test]
    fn test_insufficient_funds() {
        let estimator = CostEstimator::new(FeePolicy::default());
        let mut fx = Fixture::new();
        fx.add(op(1, 0), 1_000_000, 0, true);

        // Clamped to the input, so the change is minus the fee.
        let result = fx.run(&estimator, &[5_000_000]);

        assert!(result.insufficient_funds);
        assert!(!result.dust_change);
        assert_eq!(result.change, SignedAmount::from_sat(-10_000));
        assert_eq!(result.net_amount, SignedAmount::from_sat(990_000));
        assert_eq!(result.bytes, 226);
    }

    #[test]
    fn test_free_input_against_oversized_request() {
        let estimator = CostEstimator::new(FeePolicy::default());
        let mut fx = Fixture::new();
        fx.add(op(1, 0), COIN, 1_000, true);

        let result = fx.run(&estimator, &[10 * COIN]);

        // Free relay and a clamped request leave nothing negative to spot.
        assert_eq!(result.fee, Amount::ZERO);
        assert_eq!(result.change, SignedAmount::ZERO);
        assert!(result.insufficient_funds);

        // Exactly covered is fine.
        let result = fx.run(&estimator, &[COIN]);
        assert_eq!(result.fee, Amount::ZERO);
        assert!(!result.insufficient_funds);
    }

    #[test]
    fn test_low_and_dust_payment_flags() {
        let estimator = CostEstimator::new(FeePolicy::default());
        let mut fx = Fixture::new();

        let low = fx.run(&estimator, &[COIN, 8_000]);
        assert!(low.low_output);
        assert!(!low.dust_output);
        assert_eq!(low.low_output_status(), LowOutputStatus::Yes);

        let dust = fx.run(&estimator, &[1_000]);
        assert!(dust.low_output);
        assert!(dust.dust_output);
        assert_eq!(dust.low_output_status(), LowOutputStatus::Dust);

        // Zero entries are ignored.
        let none = fx.run(&estimator, &[0, COIN]);
        assert_eq!(none.low_output_status(), LowOutputStatus::No);
    }

    #[test]
    fn test_fee_is_max_of_rate_and_minimum() {
        let policy = FeePolicy {
            fee_per_kb: Amount::from_sat(50_000),
            ..FeePolicy::default()
        };
        let estimator = CostEstimator::new(policy);
        assert_eq!(estimator.fee_for(226, 0.0), Amount::from_sat(50_000));
        assert_eq!(estimator.fee_for(1_500, 0.0), Amount::from_sat(100_000));

        let estimator = CostEstimator::new(FeePolicy::default());
        assert_eq!(estimator.fee_for(226, 0.0), Amount::from_sat(10_000));
        assert_eq!(estimator.fee_for(226, 1e9), Amount::ZERO);
    }

    #[test]
    fn test_custom_min_fee_rule() {
        struct Flat;
        impl ProtocolMinFee for Flat {
            fn min_fee(&self, _bytes: u64, _allow_free: bool) -> Amount {
                Amount::from_sat(777)
            }
        }

        let estimator = CostEstimator::with_min_fee(FeePolicy::default(), Flat);
        let mut store = SelectionStore::new();
        let mut fx = Fixture::new();
        fx.add(op(1, 0), COIN, 100, true);
        store.select(op(1, 0));

        let result = estimator.estimate(&mut store, &fx.coins, &[], &fx.keys);
        assert_eq!(result.fee, Amount::from_sat(777));
    }

    #[test]
    fn test_high_priority_is_free() {
        let estimator = CostEstimator::new(FeePolicy::default());
        let mut fx = Fixture::new();
        fx.add(op(1, 0), 50 * COIN, 1_000, true);

        let result = fx.run(&estimator, &[COIN]);

        assert!(!result.low_priority);
        assert_eq!(result.fee, Amount::ZERO);
        assert!(result.priority_label.unwrap().is_free());
    }

    #[test]
    fn test_output_priority() {
        let output = CandidateOutput {
            outpoint: op(1, 0),
            value: Amount::from_sat(78_000),
            script_pubkey: ScriptBuf::new(),
            depth: 9,
            spent: false,
            time: 0,
        };
        assert_eq!(output_priority(&output, KeyShape::Compressed), 10_000.0);
        assert_eq!(output_priority(&output, KeyShape::Unresolved), 10_000.0);
        assert_eq!(
            output_priority(&output, KeyShape::Uncompressed),
            78_000.0 / 107.0 * 10.0
        );
    }
}
