//! Beacon output artifacts.

use crate::key::Address;
use sha2::{Digest, Sha256};

/// The combined threshold signature for one height: the block's random
/// beacon value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputedEntropy {
    pub height: u64,
    pub group_signature: Vec<u8>,
}

/// One validator's contribution to the entropy at `height`.
///
/// Carries two signatures: the BLS share itself, and the validator's
/// consensus signature sealing the share against spoofing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntropyShare {
    pub height: u64,
    pub signer_address: Address,
    pub signature_share: Vec<u8>,
    pub validator_signature: Vec<u8>,
}

impl EntropyShare {
    /// Canonical bytes sealed by the validator signature: `(chain_id,
    /// height, signer_address, signature_share)`, each field u32-length
    /// framed, big-endian.
    pub fn canonical_sign_bytes(&self, chain_id: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            16 + chain_id.len() + 8 + self.signer_address.as_bytes().len()
                + self.signature_share.len(),
        );
        frame(&mut out, chain_id.as_bytes());
        frame(&mut out, &self.height.to_be_bytes());
        frame(&mut out, self.signer_address.as_bytes());
        frame(&mut out, &self.signature_share);
        out
    }
}

fn frame(out: &mut Vec<u8>, field: &[u8]) {
    out.extend_from_slice(&(field.len() as u32).to_be_bytes());
    out.extend_from_slice(field);
}

/// The message signed at height `h`: the hash of the previous height's
/// group signature. Chaining on the previous entropy, not the height,
/// is what makes the beacon unbiasable below the threshold.
pub fn entropy_message(previous_entropy: &[u8]) -> [u8; 32] {
    Sha256::digest(previous_entropy).into()
}
