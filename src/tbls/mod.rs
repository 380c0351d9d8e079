//! Threshold BLS12-381 signatures (min-pk: G1 public keys, G2 signatures).
//!
//! Any `t` of `n` share-holders can produce a signature verifiable under
//! the single group public key, and every `t`-subset yields the same bytes
//! over the same message.

mod lagrange;

use lagrange::{eval_poly, weights_at_zero, Fr};

use blst::min_pk::{PublicKey, SecretKey};
use blst::BLST_ERROR;
use rand::RngCore;
use std::collections::BTreeMap;

/// Domain separation tag for beacon signature shares.
pub const BEACON_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

pub const PUBLIC_KEY_LEN: usize = 48;
pub const SIGNATURE_LEN: usize = 96;
pub const SCALAR_LEN: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum TblsError {
    #[error("not enough signature shares: required {required}, received {received}")]
    NotEnoughShares { required: usize, received: usize },
    #[error("invalid signature share encoding from index {0}")]
    InvalidShare(u32),
    #[error("share x-coordinates are not pairwise distinct")]
    NonInvertibleDenominator,
    #[error("invalid secret scalar")]
    InvalidScalar,
    #[error("no private key share available")]
    MissingPrivateShare,
    #[error("keygen rejected input keying material")]
    KeygenFailed,
}

/// Signs `msg` with a secret share, producing a compressed G2 share.
pub fn sign_share(secret: &SecretKey, msg: &[u8]) -> Vec<u8> {
    secret.sign(msg, BEACON_DST, &[]).to_bytes().to_vec()
}

/// Verifies a (share or group) signature against the matching public key.
pub fn verify_signature(public: &PublicKey, msg: &[u8], signature: &[u8]) -> bool {
    let Ok(sig) = blst::min_pk::Signature::from_bytes(signature) else {
        return false;
    };
    sig.verify(true, msg, BEACON_DST, &[], public, true) == BLST_ERROR::BLST_SUCCESS
}

/// Lagrange-combines `threshold` signature shares into the group signature.
///
/// Shares are keyed by signer index. When more than `threshold` shares are
/// supplied, the lowest indices are combined; the result is the same for
/// every valid subset.
pub fn combine(shares: &BTreeMap<u32, Vec<u8>>, threshold: usize) -> Result<Vec<u8>, TblsError> {
    if shares.len() < threshold {
        return Err(TblsError::NotEnoughShares {
            required: threshold,
            received: shares.len(),
        });
    }

    let subset: Vec<(u32, &[u8])> = shares
        .iter()
        .take(threshold)
        .map(|(&index, bytes)| (index, bytes.as_slice()))
        .collect();
    let indices: Vec<u32> = subset.iter().map(|(index, _)| *index).collect();

    let weights = weights_at_zero(&indices)?;
    let group_sig = lagrange::interpolate_signatures(&subset, &weights)?;
    Ok(group_sig.to_vec())
}

/// Key material for one participant, as a DKG hands it out.
pub struct DealtShare {
    pub index: u32,
    pub secret: SecretKey,
}

/// Output of a trusted dealing: the group key, the per-member public key
/// shares (the sharing polynomial evaluated in G1 at each index), and the
/// members' secret shares.
pub struct Dealing {
    pub group_public_key: PublicKey,
    pub public_key_shares: Vec<PublicKey>,
    pub secret_shares: Vec<DealtShare>,
}

/// Deals `n` shares with reconstruction threshold `threshold`.
///
/// Stands in for the distributed key generation, which produces material of
/// exactly this shape. Used by tests and by single-operator deployments.
pub fn deal<R: RngCore>(rng: &mut R, n: usize, threshold: usize) -> Result<Dealing, TblsError> {
    assert!(threshold >= 1 && threshold <= n, "invalid threshold {threshold} for n {n}");

    let mut coeffs = Vec::with_capacity(threshold);
    let mut ikm = [0u8; 32];
    for _ in 0..threshold {
        rng.fill_bytes(&mut ikm);
        let coeff = SecretKey::key_gen(&ikm, &[]).map_err(|_| TblsError::KeygenFailed)?;
        coeffs.push(Fr::from_bytes_be(&coeff.to_bytes()));
    }

    let group_secret =
        SecretKey::from_bytes(&coeffs[0].to_bytes_be()).map_err(|_| TblsError::InvalidScalar)?;
    let group_public_key = group_secret.sk_to_pk();

    let mut public_key_shares = Vec::with_capacity(n);
    let mut secret_shares = Vec::with_capacity(n);
    for index in 0..n as u32 {
        let eval = eval_poly(&coeffs, u64::from(index) + 1);
        let secret =
            SecretKey::from_bytes(&eval.to_bytes_be()).map_err(|_| TblsError::InvalidScalar)?;
        public_key_shares.push(secret.sk_to_pk());
        secret_shares.push(DealtShare { index, secret });
    }

    Ok(Dealing {
        group_public_key,
        public_key_shares,
        secret_shares,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn collect_shares(dealing: &Dealing, msg: &[u8]) -> BTreeMap<u32, Vec<u8>> {
        dealing
            .secret_shares
            .iter()
            .map(|s| (s.index, sign_share(&s.secret, msg)))
            .collect()
    }

    #[test]
    fn shares_verify_against_their_public_shares() {
        let dealing = deal(&mut rand::rng(), 4, 3).unwrap();
        let msg = b"beacon message";
        for share in &dealing.secret_shares {
            let sig = sign_share(&share.secret, msg);
            let public = &dealing.public_key_shares[share.index as usize];
            assert!(verify_signature(public, msg, &sig));
            // A share never verifies under another member's key.
            let other = &dealing.public_key_shares[((share.index + 1) % 4) as usize];
            assert!(!verify_signature(other, msg, &sig));
        }
    }

    #[test]
    fn any_threshold_subset_recovers_the_same_signature() {
        let (n, t) = (4usize, 3usize);
        let dealing = deal(&mut rand::rng(), n, t).unwrap();
        let msg = b"subset independence";
        let all = collect_shares(&dealing, msg);

        let subsets: [&[u32]; 3] = [&[0, 1, 2], &[1, 2, 3], &[0, 2, 3]];
        let mut recovered = Vec::new();
        for subset in subsets {
            let shares: BTreeMap<u32, Vec<u8>> = subset
                .iter()
                .map(|i| (*i, all[i].clone()))
                .collect();
            let sig = combine(&shares, t).unwrap();
            assert!(verify_signature(&dealing.group_public_key, msg, &sig));
            recovered.push(sig);
        }
        assert!(recovered.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn combine_uses_lowest_indices_and_ignores_the_rest() {
        let (n, t) = (5usize, 3usize);
        let dealing = deal(&mut rand::rng(), n, t).unwrap();
        let msg = b"extra shares";
        let all = collect_shares(&dealing, msg);

        let from_all = combine(&all, t).unwrap();
        let lowest: BTreeMap<u32, Vec<u8>> =
            all.iter().take(t).map(|(i, s)| (*i, s.clone())).collect();
        assert_eq!(from_all, combine(&lowest, t).unwrap());
    }

    #[test]
    fn combine_rejects_insufficient_shares() {
        let dealing = deal(&mut rand::rng(), 4, 3).unwrap();
        let msg = b"short";
        let mut shares = collect_shares(&dealing, msg);
        shares.retain(|&i, _| i < 2);

        assert!(matches!(
            combine(&shares, 3),
            Err(TblsError::NotEnoughShares { required: 3, received: 2 })
        ));
    }

    #[test]
    fn corrupt_share_encoding_is_reported() {
        let dealing = deal(&mut rand::rng(), 4, 3).unwrap();
        let msg = b"corrupt";
        let mut shares = collect_shares(&dealing, msg);
        shares.insert(1, vec![0xFF; SIGNATURE_LEN]);

        assert!(matches!(combine(&shares, 3), Err(TblsError::InvalidShare(1))));
    }

    #[test]
    fn single_member_group_signs_directly() {
        let dealing = deal(&mut rand::rng(), 1, 1).unwrap();
        let msg = b"solo";
        let shares = collect_shares(&dealing, msg);
        let sig = combine(&shares, 1).unwrap();
        assert!(verify_signature(&dealing.group_public_key, msg, &sig));
    }
}
