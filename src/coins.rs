//! Candidate outputs available for manual selection, grouped by owning address.
//!
//! Also hosts the public-key lookup used to guess the size of the input that would
//! spend each output.

use std::{collections::BTreeMap, collections::HashMap, fs, path::Path};

use bitcoin::{
    hashes::Hash, opcodes::all::OP_CHECKSIG, Address, Amount, Network, OutPoint, PubkeyHash,
    PublicKey, Script, ScriptBuf,
};
use serde::{Deserialize, Serialize};

use crate::error::CoinControlError;

/// One unspent output as seen by the wallet when the coin list was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateOutput {
    /// Funding transaction id and output index.
    pub outpoint: OutPoint,
    /// Output value.
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
    /// Locking script, used to resolve the destination and key.
    pub script_pubkey: ScriptBuf,
    /// Number of confirmations.
    pub depth: u32,
    /// Set when the output got spent after the snapshot was taken.
    #[serde(default)]
    pub spent: bool,
    /// Transaction time in unix seconds. Only used for sorting.
    #[serde(default)]
    pub time: u64,
}

/// Candidate outputs grouped by owning address, in address order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoinList {
    groups: BTreeMap<String, Vec<CandidateOutput>>,
}

impl CoinList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an output to the group of `address`.
    pub fn push(&mut self, address: impl Into<String>, output: CandidateOutput) {
        self.groups.entry(address.into()).or_default().push(output);
    }

    /// Iterates over `(address, outputs)` groups.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[CandidateOutput])> {
        self.groups
            .iter()
            .map(|(address, outputs)| (address.as_str(), outputs.as_slice()))
    }

    /// Iterates over every output with its owning address.
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &CandidateOutput)> {
        self.groups().flat_map(|(address, outputs)| {
            outputs.iter().map(move |output| (address, output))
        })
    }

    /// Candidates keyed by outpoint.
    pub fn index(&self) -> HashMap<OutPoint, &CandidateOutput> {
        self.outputs()
            .map(|(_, output)| (output.outpoint, output))
            .collect()
    }

    /// Total number of outputs across all groups.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Whether there are no outputs at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Public-key lookup provided by the wallet.
pub trait PubKeyLookup {
    /// Returns the full public key for a key hash, if the wallet knows it.
    fn get_pubkey(&self, hash: &PubkeyHash) -> Option<PublicKey>;
}

impl PubKeyLookup for HashMap<PubkeyHash, PublicKey> {
    fn get_pubkey(&self, hash: &PubkeyHash) -> Option<PublicKey> {
        self.get(hash).copied()
    }
}

/// Shape of the key that would sign an input spending an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// Known compressed key.
    Compressed,
    /// Known uncompressed key.
    Uncompressed,
    /// Destination not key based, or key not known to the wallet.
    Unresolved,
}

impl KeyShape {
    /// Resolves the script to a key hash and asks the wallet for the key.
    pub fn resolve(script: &Script, keys: &impl PubKeyLookup) -> Self {
        let key = key_hash(script).and_then(|hash| keys.get_pubkey(&hash));
        match key {
            Some(pk) if pk.compressed => KeyShape::Compressed,
            Some(_) => KeyShape::Uncompressed,
            None => KeyShape::Unresolved,
        }
    }
}

/// Key hash a P2PKH or P2PK script pays to.
pub fn key_hash(script: &Script) -> Option<PubkeyHash> {
    if script.is_p2pkh() {
        return PubkeyHash::from_slice(&script.as_bytes()[3..23]).ok();
    }
    p2pk_key(script).map(|pk| pk.pubkey_hash())
}

fn p2pk_key(script: &Script) -> Option<PublicKey> {
    let bytes = script.as_bytes();
    let key_len = match bytes.first()? {
        0x21 => 33,
        0x41 => 65,
        _ => return None,
    };
    if bytes.len() != key_len + 2 || bytes[key_len + 1] != OP_CHECKSIG.to_u8() {
        return None;
    }
    PublicKey::from_slice(&bytes[1..=key_len]).ok()
}

/// Address string an output pays to, or `None` when the script has no address form.
///
/// Bare public key outputs are shown as the P2PKH address of their key.
pub fn resolve_address(script: &Script, network: Network) -> Option<String> {
    if let Ok(address) = Address::from_script(script, network) {
        return Some(address.to_string());
    }
    p2pk_key(script).map(|pk| Address::p2pkh(pk.pubkey_hash(), network).to_string())
}

/// A wallet coin list as exported for the CLI: the grouped outputs plus known public keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoinSnapshot {
    /// Candidate outputs keyed by owning address.
    pub coins: CoinList,
    /// Public keys the wallet holds.
    #[serde(default)]
    pub pubkeys: Vec<PublicKey>,
}

impl CoinSnapshot {
    /// Reads a JSON snapshot from disk.
    pub fn load(path: &Path) -> Result<Self, CoinControlError> {
        let data = fs::read_to_string(path)?;
        let snapshot: Self = serde_json::from_str(&data)?;
        log::info!(
            "Loaded {} candidate outputs in {} address groups from {}",
            snapshot.coins.len(),
            snapshot.coins.groups().count(),
            path.display()
        );
        Ok(snapshot)
    }

    /// Builds the key lookup from the snapshot's public keys.
    pub fn key_lookup(&self) -> HashMap<PubkeyHash, PublicKey> {
        self.pubkeys
            .iter()
            .map(|pk| (pk.pubkey_hash(), *pk))
            .collect()
    }
}
