//! Validator set snapshot and the local signing identity.

use super::{Address, KeyError, PublicKey};
use crate::beacon::types::EntropyShare;

use ed25519_dalek::Signer;
use rand::RngCore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validator {
    pub address: Address,
    pub pub_key: PublicKey,
    pub voting_power: u64,
}

impl Validator {
    pub fn new(pub_key: PublicKey, voting_power: u64) -> Self {
        Self {
            address: pub_key.address(),
            pub_key,
            voting_power,
        }
    }
}

/// Immutable, deterministically ordered validator set.
///
/// Ordering is fixed at construction (ascending address) so that the index
/// of a validator is stable for the lifetime of an aeon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
}

impl ValidatorSet {
    pub fn new(mut validators: Vec<Validator>) -> Self {
        validators.sort_by(|a, b| a.address.cmp(&b.address));
        validators.dedup_by(|a, b| a.address == b.address);
        Self { validators }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Returns the index and validator for `address`, if present.
    pub fn get_by_address(&self, address: &Address) -> Option<(u32, &Validator)> {
        self.validators
            .iter()
            .position(|v| &v.address == address)
            .map(|i| (i as u32, &self.validators[i]))
    }

    pub fn get_by_index(&self, index: u32) -> Option<&Validator> {
        self.validators.get(index as usize)
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }
}

/// The node's consensus signing identity.
///
/// Stamps the validator authenticity seal onto locally produced entropy
/// shares. Key custody lives outside this crate; implementations may proxy
/// to a remote signer.
pub trait PrivValidator: Send + Sync {
    fn address(&self) -> Address;

    fn pub_key(&self) -> PublicKey;

    /// Fills `share.validator_signature` with a signature over the
    /// canonical tuple `(chain_id, height, signer_address, signature_share)`.
    /// Deterministic given inputs.
    fn sign_entropy(&self, chain_id: &str, share: &mut EntropyShare) -> Result<(), KeyError>;
}

/// In-process ed25519 signer.
pub struct LocalPrivValidator {
    signing_key: ed25519_dalek::SigningKey,
    pub_key: PublicKey,
    address: Address,
}

impl LocalPrivValidator {
    pub fn new(signing_key: ed25519_dalek::SigningKey) -> Self {
        let pub_key = PublicKey::Ed25519(signing_key.verifying_key());
        let address = pub_key.address();
        Self {
            signing_key,
            pub_key,
            address,
        }
    }

    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::new(ed25519_dalek::SigningKey::from_bytes(&seed))
    }
}

impl PrivValidator for LocalPrivValidator {
    fn address(&self) -> Address {
        self.address
    }

    fn pub_key(&self) -> PublicKey {
        self.pub_key.clone()
    }

    fn sign_entropy(&self, chain_id: &str, share: &mut EntropyShare) -> Result<(), KeyError> {
        let msg = share.canonical_sign_bytes(chain_id);
        share.validator_signature = self.signing_key.sign(&msg).to_bytes().to_vec();
        Ok(())
    }
}
