//! Consensus-layer key material.
//!
//! Validator identities carry one of several public-key algorithms. The
//! variants are closed: every key travels as a `(tag, bytes)` pair and is
//! decoded through [`PublicKey::from_tagged`]; no open-ended registration.

pub mod validator;

use sha2::{Digest, Sha256};

pub use validator::{LocalPrivValidator, PrivValidator, Validator, ValidatorSet};

/// String tags used by the wire and file encodings of public keys.
pub const ED25519_TAG: &str = "ed25519";
pub const SR25519_TAG: &str = "sr25519";
pub const SECP256K1_TAG: &str = "secp256k1";
pub const BLS12_381_TAG: &str = "bls12_381";

/// Signing context for sr25519 (schnorrkel requires one).
const SR25519_CONTEXT: &[u8] = b"entropy-beacon";

/// Domain separation tag for bls12-381 consensus signatures.
const BLS_CONSENSUS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    #[error("unknown public key tag: {0}")]
    UnknownTag(String),
    #[error("invalid {kind} public key encoding")]
    InvalidKey { kind: &'static str },
    #[error("invalid address length: expected {ADDRESS_LEN}, received {0}")]
    InvalidAddressLength(usize),
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

pub const ADDRESS_LEN: usize = 20;

/// Validator account address: the leading bytes of the hashed public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub fn from_pub_key(key: &PublicKey) -> Self {
        let digest = Sha256::digest(key.to_bytes());
        let mut address = [0u8; ADDRESS_LEN];
        address.copy_from_slice(&digest[..ADDRESS_LEN]);
        Self(address)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != ADDRESS_LEN {
            return Err(KeyError::InvalidAddressLength(bytes.len()));
        }
        let mut address = [0u8; ADDRESS_LEN];
        address.copy_from_slice(bytes);
        Ok(Self(address))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Address({self})")
    }
}

/// A consensus public key, tagged by algorithm.
#[derive(Clone)]
pub enum PublicKey {
    Ed25519(ed25519_dalek::VerifyingKey),
    Sr25519(schnorrkel::PublicKey),
    Secp256k1(k256::ecdsa::VerifyingKey),
    Bls12_381(Box<blst::min_pk::PublicKey>),
}

impl PublicKey {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ed25519(_) => ED25519_TAG,
            Self::Sr25519(_) => SR25519_TAG,
            Self::Secp256k1(_) => SECP256K1_TAG,
            Self::Bls12_381(_) => BLS12_381_TAG,
        }
    }

    /// Canonical byte encoding: compressed point for secp256k1 and
    /// bls12-381, raw 32 bytes for the edwards/ristretto keys.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(key) => key.to_bytes().to_vec(),
            Self::Sr25519(key) => key.to_bytes().to_vec(),
            Self::Secp256k1(key) => key.to_encoded_point(true).as_bytes().to_vec(),
            Self::Bls12_381(key) => key.to_bytes().to_vec(),
        }
    }

    pub fn from_tagged(tag: &str, bytes: &[u8]) -> Result<Self, KeyError> {
        match tag {
            ED25519_TAG => {
                let raw: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| KeyError::InvalidKey { kind: "ed25519" })?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&raw)
                    .map_err(|_| KeyError::InvalidKey { kind: "ed25519" })?;
                Ok(Self::Ed25519(key))
            }
            SR25519_TAG => {
                let key = schnorrkel::PublicKey::from_bytes(bytes)
                    .map_err(|_| KeyError::InvalidKey { kind: "sr25519" })?;
                Ok(Self::Sr25519(key))
            }
            SECP256K1_TAG => {
                let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                    .map_err(|_| KeyError::InvalidKey { kind: "secp256k1" })?;
                Ok(Self::Secp256k1(key))
            }
            BLS12_381_TAG => {
                let key = blst::min_pk::PublicKey::from_bytes(bytes)
                    .map_err(|_| KeyError::InvalidKey { kind: "bls12_381" })?;
                Ok(Self::Bls12_381(Box::new(key)))
            }
            unknown => Err(KeyError::UnknownTag(unknown.to_string())),
        }
    }

    pub fn address(&self) -> Address {
        Address::from_pub_key(self)
    }

    /// Verifies a consensus signature over `msg`.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        match self {
            Self::Ed25519(key) => {
                let Ok(sig) = ed25519_dalek::Signature::from_slice(signature) else {
                    return false;
                };
                key.verify_strict(msg, &sig).is_ok()
            }
            Self::Sr25519(key) => {
                let Ok(sig) = schnorrkel::Signature::from_bytes(signature) else {
                    return false;
                };
                key.verify_simple(SR25519_CONTEXT, msg, &sig).is_ok()
            }
            Self::Secp256k1(key) => {
                use k256::ecdsa::signature::Verifier;
                let Ok(sig) = k256::ecdsa::Signature::from_slice(signature) else {
                    return false;
                };
                key.verify(msg, &sig).is_ok()
            }
            Self::Bls12_381(key) => {
                let Ok(sig) = blst::min_pk::Signature::from_bytes(signature) else {
                    return false;
                };
                sig.verify(true, msg, BLS_CONSENSUS_DST, &[], key, true)
                    == blst::BLST_ERROR::BLST_SUCCESS
            }
        }
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag() && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "PublicKey({}:{})", self.tag(), hex::encode(self.to_bytes()))
    }
}
