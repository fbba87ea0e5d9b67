//! A payment-construction session.
//!
//! The session owns the selection store for the lifetime of one payment and reruns the
//! estimator after every change, so callers always hold a result matching the current
//! state. Hosts sharing a session across threads must wrap it in a single mutex.

use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
};

use bitcoin::{Amount, Network, OutPoint, PubkeyHash, PublicKey};

use crate::{
    coins::{CoinList, CoinSnapshot, PubKeyLookup},
    config::CoinControlConfig,
    error::CoinControlError,
    estimate::{CostEstimator, EstimateResult, ProtocolMinFee, StandardMinFee},
    selection::{LockFile, SelectionStore},
    view::{build_view, AddressGroup},
};

/// Selection state, inputs and estimator of one payment.
#[derive(Debug)]
pub struct CoinControlSession<K = HashMap<PubkeyHash, PublicKey>, M = StandardMinFee> {
    store: SelectionStore,
    coins: CoinList,
    keys: K,
    payments: Vec<Amount>,
    estimator: CostEstimator<M>,
    network: Network,
    lock_file: Option<LockFile>,
}

impl CoinControlSession {
    /// Opens a session over a coin snapshot, with locks read from the configured lock file.
    pub fn open(
        config: &CoinControlConfig,
        data_dir: &Path,
        snapshot: CoinSnapshot,
    ) -> Result<Self, CoinControlError> {
        let lock_file = LockFile::from_config(data_dir, &config.lock_file);
        let locked = lock_file.read()?;
        log::info!(
            "Opened session with {} locked outputs from {}",
            locked.len(),
            lock_file.path().display()
        );
        let keys = snapshot.key_lookup();

        let mut session = Self::new(
            snapshot.coins,
            keys,
            CostEstimator::new(config.fee_policy.clone()),
            config.network,
        );
        session.store = SelectionStore::with_locked(locked);
        session.lock_file = Some(lock_file);
        Ok(session)
    }
}

impl<K: PubKeyLookup, M: ProtocolMinFee> CoinControlSession<K, M> {
    /// In-memory session with nothing selected or locked.
    pub fn new(coins: CoinList, keys: K, estimator: CostEstimator<M>, network: Network) -> Self {
        Self {
            store: SelectionStore::new(),
            coins,
            keys,
            payments: Vec::new(),
            estimator,
            network,
            lock_file: None,
        }
    }

    /// The selection store.
    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    /// The candidate coins.
    pub fn coins(&self) -> &CoinList {
        &self.coins
    }

    /// The payment request.
    pub fn payments(&self) -> &[Amount] {
        &self.payments
    }

    /// Replaces the candidate coins with a fresh snapshot.
    pub fn set_coins(&mut self, coins: CoinList) -> EstimateResult {
        self.coins = coins;
        self.estimate()
    }

    /// Replaces the payment request.
    pub fn set_payment_amounts(&mut self, payments: Vec<Amount>) -> EstimateResult {
        self.payments = payments;
        self.estimate()
    }

    /// Selects an output. Locked outputs stay unselected.
    pub fn select(&mut self, outpoint: OutPoint) -> EstimateResult {
        self.store.select(outpoint);
        self.estimate()
    }

    /// Unselects an output.
    pub fn unselect(&mut self, outpoint: &OutPoint) -> EstimateResult {
        self.store.unselect(outpoint);
        self.estimate()
    }

    /// Flips the selection of an output.
    pub fn toggle(&mut self, outpoint: OutPoint) -> EstimateResult {
        if !self.store.unselect(&outpoint) {
            self.store.select(outpoint);
        }
        self.estimate()
    }

    /// Unselects everything if anything is selected, otherwise selects every unlocked,
    /// unspent candidate.
    pub fn toggle_all(&mut self) -> EstimateResult {
        if self.store.selected_count() > 0 {
            self.store.unselect_all();
        } else {
            for (_, output) in self.coins.outputs() {
                if !output.spent {
                    self.store.select(output.outpoint);
                }
            }
        }
        self.estimate()
    }

    /// Locks an output, unselecting it. The lock is persisted first; if that fails
    /// nothing changes.
    pub fn lock(&mut self, outpoint: OutPoint) -> Result<EstimateResult, CoinControlError> {
        if !self.store.is_locked(&outpoint) {
            let mut locked = self.store.list_locked().clone();
            locked.insert(outpoint);
            self.persist_locks(&locked)?;
        }
        if self.store.lock(outpoint) {
            log::info!("Locked output {outpoint}");
        }
        Ok(self.estimate())
    }

    /// Unlocks an output. The change is persisted first; if that fails nothing changes.
    pub fn unlock(&mut self, outpoint: &OutPoint) -> Result<EstimateResult, CoinControlError> {
        if self.store.is_locked(outpoint) {
            let mut locked = self.store.list_locked().clone();
            locked.remove(outpoint);
            self.persist_locks(&locked)?;
        }
        if self.store.unlock(outpoint) {
            log::info!("Unlocked output {outpoint}");
        }
        Ok(self.estimate())
    }

    fn persist_locks(&self, locked: &BTreeSet<OutPoint>) -> Result<(), CoinControlError> {
        match &self.lock_file {
            Some(lock_file) => Ok(lock_file.write(locked)?),
            None => Ok(()),
        }
    }

    /// Recomputes the estimate, pruning stale selections.
    pub fn estimate(&mut self) -> EstimateResult {
        self.estimator
            .estimate(&mut self.store, &self.coins, &self.payments, &self.keys)
    }

    /// Grouped per-output display figures.
    pub fn view(&mut self) -> Vec<AddressGroup> {
        build_view(
            &self.coins,
            &mut self.store,
            &self.keys,
            self.estimator.policy(),
            self.network,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{coins::CandidateOutput, estimate::FeePolicy};
    use bitcoin::{
        hashes::Hash,
        secp256k1::{Secp256k1, SecretKey},
        ScriptBuf, Txid,
    };

    fn op(n: u8) -> OutPoint {
        OutPoint::new(Txid::from_byte_array([n; 32]), 0)
    }

    fn session() -> CoinControlSession {
        let secp = Secp256k1::new();
        let pk = PublicKey::new(SecretKey::from_slice(&[3; 32]).unwrap().public_key(&secp));
        let mut coins = CoinList::new();
        for n in 1..=3 {
            coins.push(
                "addr",
                CandidateOutput {
                    outpoint: op(n),
                    value: Amount::from_sat(n as u64 * 1_000_000),
                    script_pubkey: ScriptBuf::new_p2pkh(&pk.pubkey_hash()),
                    depth: 1,
                    spent: n == 3,
                    time: 0,
                },
            );
        }
        let mut keys = HashMap::new();
        keys.insert(pk.pubkey_hash(), pk);
        CoinControlSession::new(
            coins,
            keys,
            CostEstimator::new(FeePolicy::default()),
            Network::Regtest,
        )
    }

    #[test]
    fn test_toggle_all() {
        let mut session = session();
        let result = session.toggle_all();
        // The spent output is skipped.
        assert_eq!(result.quantity, 2);
        assert_eq!(result.amount, Amount::from_sat(3_000_000));

        let result = session.toggle_all();
        assert_eq!(result.quantity, 0);
        assert_eq!(session.store().selected_count(), 0);
    }

    #[test]
    fn test_toggle_all_skips_locked() {
        let mut session = session();
        session.lock(op(1)).unwrap();
        let result = session.toggle_all();
        assert_eq!(result.quantity, 1);
        assert!(!session.store().is_selected(&op(1)));
    }

    #[test]
    fn test_lock_recomputes() {
        let mut session = session();
        session.select(op(1));
        let result = session.select(op(2));
        assert_eq!(result.quantity, 2);

        let result = session.lock(op(2)).unwrap();
        assert_eq!(result.quantity, 1);
        assert_eq!(result.amount, Amount::from_sat(1_000_000));

        let result = session.select(op(2));
        assert_eq!(result.quantity, 1);

        session.unlock(&op(2)).unwrap();
        let result = session.toggle(op(2));
        assert_eq!(result.quantity, 2);
        let result = session.toggle(op(2));
        assert_eq!(result.quantity, 1);
    }

    #[test]
    fn test_payments_and_coin_refresh() {
        let mut session = session();
        session.select(op(1));
        let result = session.set_payment_amounts(vec![Amount::from_sat(500_000)]);
        assert!(result.payment_active);
        assert_eq!(result.change, bitcoin::SignedAmount::from_sat(490_000));
        assert_eq!(session.payments(), &[Amount::from_sat(500_000)]);

        // The output disappears from the wallet.
        let result = session.set_coins(CoinList::new());
        assert_eq!(result.quantity, 0);
        assert!(!session.store().is_selected(&op(1)));
    }

    #[test]
    fn test_open_reads_persisted_locks() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoinControlConfig::default();
        let snapshot = CoinSnapshot {
            coins: session().coins().clone(),
            pubkeys: Vec::new(),
        };

        let mut first = CoinControlSession::open(&config, dir.path(), snapshot.clone()).unwrap();
        first.lock(op(2)).unwrap();

        let mut second = CoinControlSession::open(&config, dir.path(), snapshot).unwrap();
        assert!(second.store().is_locked(&op(2)));
        assert_eq!(second.select(op(2)).quantity, 0);
        second.unlock(&op(2)).unwrap();

        let third = CoinControlSession::open(&config, dir.path(), CoinSnapshot::default()).unwrap();
        assert_eq!(third.store().locked_count(), 0);
    }

    #[test]
    fn test_failed_lock_write_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoinControlConfig::default();
        let snapshot = CoinSnapshot {
            coins: session().coins().clone(),
            pubkeys: Vec::new(),
        };
        let mut session = CoinControlSession::open(&config, dir.path(), snapshot).unwrap();
        session.select(op(1));

        // Staging name taken by a directory, so the list cannot be replaced.
        std::fs::create_dir(
            dir.path()
                .join(format!("{}.tmp", crate::selection::DEFAULT_LOCK_FILE)),
        )
        .unwrap();

        assert!(session.lock(op(1)).is_err());
        assert!(!session.store().is_locked(&op(1)));
        assert!(session.store().is_selected(&op(1)));
    }
}
