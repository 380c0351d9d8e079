//! Immutable keying and validator binding for one aeon.

use super::exec::{AeonExecUnit, SigningShare};
use super::file::{AeonDetailsFile, AeonFileError};
use crate::key::{Address, PrivValidator, ValidatorSet};

use blst::min_pk::{PublicKey, SecretKey};
use std::path::Path;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum AeonError {
    #[error("aeon requires a non-empty validator set")]
    EmptyValidatorSet,
    #[error("signing key present but no priv validator supplied")]
    MissingPrivValidator,
    #[error("priv validator {0} is not in the aeon validator set")]
    SignerNotInValidatorSet(Address),
    #[error("validator index {validator} does not match dkg index {dkg}")]
    IndexMismatch { validator: u32, dkg: u32 },
    #[error("public key share vector has {shares} entries for {validators} validators")]
    ShareVectorMismatch { shares: usize, validators: usize },
    #[error("invalid aeon block range [{start}, {end}]")]
    InvalidRange { start: u64, end: u64 },
    #[error("invalid key material in aeon details file")]
    InvalidKeyMaterial,
}

/// One aeon's validator-set snapshot, block range and key material.
///
/// Construction is where the keying consistency rules live; a node must
/// never run with an aeon whose shares and validator indices disagree, so
/// every violation is a hard error for the caller to abort on.
pub struct AeonDetails {
    validator_height: u64,
    validators: Arc<ValidatorSet>,
    priv_validator: Option<Arc<dyn PrivValidator>>,
    exec_unit: Arc<AeonExecUnit>,
    start: u64,
    end: u64,
    threshold: usize,
}

impl AeonDetails {
    pub fn new(
        priv_validator: Option<Arc<dyn PrivValidator>>,
        validator_height: u64,
        validators: Arc<ValidatorSet>,
        exec_unit: Arc<AeonExecUnit>,
        start: u64,
        end: u64,
    ) -> Result<Self, AeonError> {
        if validators.is_empty() {
            return Err(AeonError::EmptyValidatorSet);
        }
        if start > end {
            return Err(AeonError::InvalidRange { start, end });
        }
        if exec_unit.public_key_shares().len() != validators.len() {
            return Err(AeonError::ShareVectorMismatch {
                shares: exec_unit.public_key_shares().len(),
                validators: validators.len(),
            });
        }

        if exec_unit.can_sign() {
            let signer = priv_validator
                .as_ref()
                .ok_or(AeonError::MissingPrivValidator)?;
            let address = signer.address();
            let (index, _) = validators
                .get_by_address(&address)
                .ok_or(AeonError::SignerNotInValidatorSet(address))?;
            let dkg = exec_unit.dkg_index().expect("can_sign implies a dkg index");
            // Shares are keyed by this index on both sides.
            if index != dkg {
                return Err(AeonError::IndexMismatch {
                    validator: index,
                    dkg,
                });
            }
        }

        let threshold = validators.len() / 2 + 1;
        Ok(Self {
            validator_height,
            validators,
            priv_validator,
            exec_unit,
            start,
            end,
            threshold,
        })
    }

    pub fn validator_height(&self) -> u64 {
        self.validator_height
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn priv_validator(&self) -> Option<&Arc<dyn PrivValidator>> {
        self.priv_validator.as_ref()
    }

    pub fn exec_unit(&self) -> &AeonExecUnit {
        &self.exec_unit
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// `⌊n/2⌋ + 1` over the validator-set size.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn can_sign(&self) -> bool {
        self.exec_unit.can_sign()
    }

    pub fn covers(&self, height: u64) -> bool {
        self.start <= height && height <= self.end
    }

    /// Writes the aeon's key material to `path` (see [`AeonDetailsFile`]).
    pub fn save(&self, path: &Path) -> Result<(), AeonFileError> {
        AeonDetailsFile::from_aeon(self).save(path)
    }

    /// Rebinds a deserialized record to a caller-supplied validator set and
    /// local identity. The constructor invariants re-apply.
    pub fn from_file(
        file: &AeonDetailsFile,
        validators: Arc<ValidatorSet>,
        priv_validator: Option<Arc<dyn PrivValidator>>,
    ) -> Result<Self, AeonError> {
        let group_public_key = PublicKey::from_bytes(&file.group_public_key)
            .map_err(|_| AeonError::InvalidKeyMaterial)?;
        let public_key_shares = file
            .public_key_shares
            .iter()
            .map(|bytes| PublicKey::from_bytes(bytes).map_err(|_| AeonError::InvalidKeyMaterial))
            .collect::<Result<Vec<_>, _>>()?;
        let signing = file
            .private_share
            .as_ref()
            .map(|(index, scalar)| {
                SecretKey::from_bytes(scalar)
                    .map(|secret| SigningShare::new(*index, secret))
                    .map_err(|_| AeonError::InvalidKeyMaterial)
            })
            .transpose()?;

        let exec_unit = AeonExecUnit::new(
            group_public_key,
            public_key_shares,
            file.qual.clone(),
            file.generator.clone(),
            signing,
        );

        Self::new(
            priv_validator,
            file.validator_height,
            validators,
            Arc::new(exec_unit),
            file.start,
            file.end,
        )
    }
}

impl std::fmt::Debug for AeonDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("AeonDetails")
            .field("validator_height", &self.validator_height)
            .field("range", &(self.start, self.end))
            .field("validators", &self.validators.len())
            .field("threshold", &self.threshold)
            .field("can_sign", &self.can_sign())
            .finish()
    }
}
