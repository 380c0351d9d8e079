//! Execution unit wrapping one aeon's threshold-BLS key material.

use crate::tbls::{self, Dealing, TblsError};

use blst::min_pk::{PublicKey, SecretKey};
use blst::{blst_p1_compress, blst_p1_generator};
use std::collections::BTreeMap;

/// This node's slice of the distributed key.
pub struct SigningShare {
    index: u32,
    secret: SecretKey,
}

impl SigningShare {
    pub fn new(index: u32, secret: SecretKey) -> Self {
        Self { index, secret }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Stateless façade over one DKG output.
///
/// Holds the group public key, the per-member public-key share vector, the
/// qualified-member set, the dealing generator and (when this node took
/// part in the DKG) the local signing share. All beacon cryptography goes
/// through here; the generator never touches curve points directly.
pub struct AeonExecUnit {
    group_public_key: PublicKey,
    public_key_shares: Vec<PublicKey>,
    qual: Vec<u32>,
    generator: Vec<u8>,
    signing: Option<SigningShare>,
}

impl AeonExecUnit {
    pub fn new(
        group_public_key: PublicKey,
        public_key_shares: Vec<PublicKey>,
        mut qual: Vec<u32>,
        generator: Vec<u8>,
        signing: Option<SigningShare>,
    ) -> Self {
        qual.sort_unstable();
        qual.dedup();
        Self {
            group_public_key,
            public_key_shares,
            qual,
            generator,
            signing,
        }
    }

    /// Builds the unit a DKG hand-off represents: every dealt member is
    /// qualified, and `signer` selects whose secret share this node holds.
    pub fn from_dealing(dealing: &Dealing, signer: Option<u32>) -> Result<Self, TblsError> {
        let signing = match signer {
            Some(index) => {
                let dealt = dealing
                    .secret_shares
                    .iter()
                    .find(|s| s.index == index)
                    .ok_or(TblsError::InvalidShare(index))?;
                let secret = SecretKey::from_bytes(&dealt.secret.to_bytes())
                    .map_err(|_| TblsError::InvalidScalar)?;
                Some(SigningShare::new(index, secret))
            }
            None => None,
        };

        Ok(Self::new(
            dealing.group_public_key.clone(),
            dealing.public_key_shares.clone(),
            (0..dealing.public_key_shares.len() as u32).collect(),
            g1_generator_bytes().to_vec(),
            signing,
        ))
    }

    /// True iff this instance holds a private share.
    pub fn can_sign(&self) -> bool {
        self.signing.is_some()
    }

    /// The DKG index the local share is keyed by.
    pub fn dkg_index(&self) -> Option<u32> {
        self.signing.as_ref().map(SigningShare::index)
    }

    pub fn in_qual(&self, index: u32) -> bool {
        self.qual.binary_search(&index).is_ok()
    }

    /// Produces the local signature share over `msg`. Deterministic.
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, TblsError> {
        let signing = self.signing.as_ref().ok_or(TblsError::MissingPrivateShare)?;
        Ok(tbls::sign_share(&signing.secret, msg))
    }

    /// Checks `share` against the stored public-key share at `signer_index`.
    pub fn verify_share(&self, msg: &[u8], share: &[u8], signer_index: u32) -> bool {
        if !self.in_qual(signer_index) {
            return false;
        }
        let Some(public) = self.public_key_shares.get(signer_index as usize) else {
            return false;
        };
        tbls::verify_signature(public, msg, share)
    }

    /// Lagrange-combines `threshold` shares, keyed by signer index, into
    /// the group signature. Order-independent.
    pub fn combine(
        &self,
        shares: &BTreeMap<u32, Vec<u8>>,
        threshold: usize,
    ) -> Result<Vec<u8>, TblsError> {
        tbls::combine(shares, threshold)
    }

    pub fn verify_group_signature(&self, msg: &[u8], signature: &[u8]) -> bool {
        tbls::verify_signature(&self.group_public_key, msg, signature)
    }

    pub fn group_public_key(&self) -> &PublicKey {
        &self.group_public_key
    }

    pub fn public_key_shares(&self) -> &[PublicKey] {
        &self.public_key_shares
    }

    pub fn qual(&self) -> &[u32] {
        &self.qual
    }

    pub fn generator(&self) -> &[u8] {
        &self.generator
    }

    /// Raw bytes of the local secret share, for persistence.
    pub fn private_key(&self) -> Option<[u8; tbls::SCALAR_LEN]> {
        self.signing.as_ref().map(|s| s.secret.to_bytes())
    }
}

impl PartialEq for AeonExecUnit {
    fn eq(&self, other: &Self) -> bool {
        self.group_public_key.to_bytes() == other.group_public_key.to_bytes()
            && self.public_key_shares.len() == other.public_key_shares.len()
            && self
                .public_key_shares
                .iter()
                .zip(&other.public_key_shares)
                .all(|(a, b)| a.to_bytes() == b.to_bytes())
            && self.qual == other.qual
            && self.generator == other.generator
            && self.dkg_index() == other.dkg_index()
            && self.private_key() == other.private_key()
    }
}

impl std::fmt::Debug for AeonExecUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("AeonExecUnit")
            .field("group_public_key", &hex::encode(self.group_public_key.to_bytes()))
            .field("members", &self.public_key_shares.len())
            .field("qual", &self.qual)
            .field("dkg_index", &self.dkg_index())
            .finish()
    }
}

/// Compressed G1 generator of the dealing.
fn g1_generator_bytes() -> [u8; tbls::PUBLIC_KEY_LEN] {
    let mut out = [0u8; tbls::PUBLIC_KEY_LEN];
    unsafe { blst_p1_compress(out.as_mut_ptr(), blst_p1_generator()) };
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::beacon::types::entropy_message;
    use crate::tbls::deal;

    #[test]
    fn observer_unit_cannot_sign() {
        let dealing = deal(&mut rand::rng(), 4, 3).unwrap();
        let unit = AeonExecUnit::from_dealing(&dealing, None).unwrap();
        assert!(!unit.can_sign());
        assert!(unit.dkg_index().is_none());
        assert!(matches!(unit.sign(b"msg"), Err(TblsError::MissingPrivateShare)));
    }

    #[test]
    fn sign_verify_combine_round() {
        let (n, t) = (4usize, 3usize);
        let dealing = deal(&mut rand::rng(), n, t).unwrap();
        let units: Vec<AeonExecUnit> = (0..n as u32)
            .map(|i| AeonExecUnit::from_dealing(&dealing, Some(i)).unwrap())
            .collect();

        let msg = entropy_message(b"Test Entropy");
        let mut shares = BTreeMap::new();
        for unit in units.iter().take(t) {
            let index = unit.dkg_index().unwrap();
            let share = unit.sign(&msg).unwrap();
            assert!(units[0].verify_share(&msg, &share, index));
            assert!(!units[0].verify_share(&msg, &share, (index + 1) % n as u32));
            shares.insert(index, share);
        }

        let group_sig = units[0].combine(&shares, t).unwrap();
        for unit in &units {
            assert!(unit.verify_group_signature(&msg, &group_sig));
        }
        assert!(!units[0].verify_group_signature(&entropy_message(b"other"), &group_sig));
    }

    #[test]
    fn verify_share_rejects_non_qual_index() {
        let dealing = deal(&mut rand::rng(), 4, 3).unwrap();
        let unit = AeonExecUnit::new(
            dealing.group_public_key.clone(),
            dealing.public_key_shares.clone(),
            vec![0, 1, 2],
            vec![],
            None,
        );

        let msg = entropy_message(b"Test Entropy");
        let share = crate::tbls::sign_share(&dealing.secret_shares[3].secret, &msg);
        // Valid BLS share, but signer 3 did not complete the DKG.
        assert!(!unit.verify_share(&msg, &share, 3));
        assert!(!unit.verify_share(&msg, &share, 40));
    }

    #[test]
    fn signing_is_deterministic() {
        let dealing = deal(&mut rand::rng(), 4, 3).unwrap();
        let unit = AeonExecUnit::from_dealing(&dealing, Some(2)).unwrap();
        let msg = entropy_message(b"Test Entropy");
        assert_eq!(unit.sign(&msg).unwrap(), unit.sign(&msg).unwrap());
    }
}
