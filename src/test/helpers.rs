//! Shared fixtures for beacon tests.

use crate::beacon::exec::AeonExecUnit;
use crate::beacon::{AeonDetails, ComputedEntropy, EntropyGenerator};
use crate::key::{LocalPrivValidator, PrivValidator, Validator, ValidatorSet};
use crate::tbls::{deal, Dealing};

use std::sync::Arc;
use std::time::Duration;

pub const TEST_CHAIN_ID: &str = "entropy-test-chain";

/// A dealt validator group: `n` local signers whose validator-set index
/// equals their DKG share index, with threshold `⌊n/2⌋ + 1`.
pub struct DealtGroup {
    dealing: Dealing,
    signers: Vec<Arc<LocalPrivValidator>>,
    validators: Arc<ValidatorSet>,
}

impl DealtGroup {
    pub fn new(n: usize) -> Self {
        let mut rng = rand::rng();
        let mut signers: Vec<Arc<LocalPrivValidator>> = (0..n)
            .map(|_| Arc::new(LocalPrivValidator::generate(&mut rng)))
            .collect();
        let validators = Arc::new(ValidatorSet::new(
            signers
                .iter()
                .map(|signer| Validator::new(signer.pub_key(), 30))
                .collect(),
        ));
        // Align signer order with the set ordering so signer i holds share i.
        signers.sort_by_key(|signer| {
            validators
                .get_by_address(&signer.address())
                .expect("signer is in the set")
                .0
        });
        let dealing = deal(&mut rng, n, n / 2 + 1).expect("dealing succeeds");
        Self {
            dealing,
            signers,
            validators,
        }
    }

    pub fn validator_set(&self) -> Arc<ValidatorSet> {
        self.validators.clone()
    }

    pub fn priv_validator(&self, index: usize) -> Arc<dyn PrivValidator> {
        self.signers[index].clone()
    }
}

pub fn signer_unit(group: &DealtGroup, index: u32) -> Arc<AeonExecUnit> {
    Arc::new(AeonExecUnit::from_dealing(&group.dealing, Some(index)).expect("valid dealing"))
}

pub fn observer_unit(group: &DealtGroup) -> Arc<AeonExecUnit> {
    Arc::new(AeonExecUnit::from_dealing(&group.dealing, None).expect("valid dealing"))
}

/// Aeon over `[start, end]` at validator height 1; `signer` selects which
/// member's share this node holds, `None` for an observer.
pub fn aeon(group: &DealtGroup, signer: Option<usize>, start: u64, end: u64) -> AeonDetails {
    match signer {
        Some(index) => AeonDetails::new(
            Some(group.priv_validator(index)),
            1,
            group.validator_set(),
            signer_unit(group, index as u32),
            start,
            end,
        )
        .expect("valid signing aeon"),
        None => AeonDetails::new(
            None,
            1,
            group.validator_set(),
            observer_unit(group),
            start,
            end,
        )
        .expect("valid observer aeon"),
    }
}

/// Generator with aeon `[1, 50]` installed and `entropy[0]` seeded.
pub fn test_entropy_gen(group: &DealtGroup, signer: Option<usize>) -> EntropyGenerator {
    let generator = EntropyGenerator::new(TEST_CHAIN_ID, 0, None);
    generator.set_aeon_details(aeon(group, signer, 1, 50));
    generator.set_last_computed_entropy(ComputedEntropy {
        height: 0,
        group_signature: b"Test Entropy".to_vec(),
    });
    generator
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
