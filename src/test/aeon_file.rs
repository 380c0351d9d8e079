//! Aeon persistence round-trips against real dealt key material.

use super::helpers::{aeon, DealtGroup};
use crate::beacon::{AeonDetails, AeonDetailsFile, AeonError};

use std::sync::Arc;

#[test]
fn save_load_is_identity_on_keying_material() {
    let group = DealtGroup::new(4);
    let original = aeon(&group, Some(0), 1, 10);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entropy.aeon");
    original.save(&path).unwrap();

    let file = AeonDetailsFile::load(&path).unwrap();
    let reloaded =
        AeonDetails::from_file(&file, group.validator_set(), Some(group.priv_validator(0)))
            .unwrap();

    assert_eq!(reloaded.validator_height(), original.validator_height());
    assert_eq!(reloaded.start(), original.start());
    assert_eq!(reloaded.end(), original.end());
    assert_eq!(reloaded.threshold(), original.threshold());
    assert_eq!(reloaded.exec_unit(), original.exec_unit());
}

#[test]
fn observer_aeon_round_trips_without_private_share() {
    let group = DealtGroup::new(4);
    let original = aeon(&group, None, 5, 20);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entropy.aeon");
    original.save(&path).unwrap();

    let file = AeonDetailsFile::load(&path).unwrap();
    assert!(file.private_share.is_none());

    let reloaded = AeonDetails::from_file(&file, group.validator_set(), None).unwrap();
    assert!(!reloaded.can_sign());
    assert_eq!(reloaded.exec_unit(), original.exec_unit());
}

#[test]
fn load_rebind_reapplies_constructor_invariants() {
    let group = DealtGroup::new(4);
    let original = aeon(&group, Some(0), 1, 10);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entropy.aeon");
    original.save(&path).unwrap();
    let file = AeonDetailsFile::load(&path).unwrap();

    // Signing material without the matching local identity must not bind.
    assert!(matches!(
        AeonDetails::from_file(&file, group.validator_set(), None),
        Err(AeonError::MissingPrivValidator)
    ));

    // Binding to a different validator's identity trips the index check.
    assert!(matches!(
        AeonDetails::from_file(&file, group.validator_set(), Some(group.priv_validator(1))),
        Err(AeonError::IndexMismatch { .. })
    ));

    // A foreign validator set cannot host the shares.
    let foreign = DealtGroup::new(2);
    assert!(matches!(
        AeonDetails::from_file(&file, foreign.validator_set(), None),
        Err(AeonError::ShareVectorMismatch { .. })
    ));

    let empty = Arc::new(crate::key::ValidatorSet::new(vec![]));
    assert!(matches!(
        AeonDetails::from_file(&file, empty, None),
        Err(AeonError::EmptyValidatorSet)
    ));
}
