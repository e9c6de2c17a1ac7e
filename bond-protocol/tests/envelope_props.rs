//! Property-based tests for the envelope codec
//!
//! Invariants checked here:
//! - Round-trip: every sign/encrypt combination restores the bond, the
//!   sender and the recipient set at the addressed peer
//! - Signature exclusion strips prior bond signatures and nothing else
//! - Flag bytes outside the known set never decode

use bond_core::{Bond, InMemoryKeyStore, KeyStore, PeerId, Role, Signature};
use bond_protocol::envelope::{self, ENCRYPTED_FLAG, SIGNED_FLAG};
use proptest::prelude::*;

fn peer_id_strategy() -> impl Strategy<Value = PeerId> {
    "[a-z][a-z0-9]{2,15}".prop_map(PeerId::new)
}

fn unit_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("EURO".to_string()),
        Just("USD".to_string()),
        Just("KUDO".to_string()),
    ]
}

fn bond_strategy() -> impl Strategy<Value = Bond> {
    (
        peer_id_strategy(),
        peer_id_strategy(),
        unit_strategy(),
        1u64..1_000_000u64,
        any::<bool>(),
    )
        .prop_map(|(creditor, debtor, unit, amount, allow_transfer)| {
            Bond::new(creditor, debtor, unit, amount, allow_transfer)
        })
}

fn signature_strategy() -> impl Strategy<Value = Signature> {
    any::<[u8; 32]>().prop_map(|half| {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&half);
        bytes[32..].copy_from_slice(&half);
        Signature::from_bytes(bytes)
    })
}

/// A sender/recipient pair that know each other's public identities
fn stores() -> (InMemoryKeyStore, InMemoryKeyStore) {
    let alice = InMemoryKeyStore::new(PeerId::new("alice"));
    let bob = InMemoryKeyStore::new(PeerId::new("bob"));
    alice.add_contact(bob.local_identity(), bob.public_identity());
    bob.add_contact(alice.local_identity(), alice.public_identity());
    (alice, bob)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: the addressed peer restores bond, sender and recipients
    /// for every sign/encrypt combination
    #[test]
    fn prop_envelope_round_trip(
        bond in bond_strategy(),
        sign in any::<bool>(),
        encrypt in any::<bool>(),
    ) {
        let (alice, bob) = stores();
        let sender = alice.local_identity();
        let recipients = vec![bob.local_identity()];

        let bytes =
            envelope::encode(&bond, Some(&sender), &recipients, sign, encrypt, false, &alice)
                .unwrap();
        let decoded = envelope::decode(&bytes, &bob).unwrap();

        prop_assert_eq!(decoded.bond.id(), bond.id());
        prop_assert_eq!(decoded.bond.creditor(), bond.creditor());
        prop_assert_eq!(decoded.bond.debtor(), bond.debtor());
        prop_assert_eq!(decoded.bond.unit(), bond.unit());
        prop_assert_eq!(decoded.bond.amount(), bond.amount());
        prop_assert_eq!(decoded.sender, sender);
        prop_assert_eq!(decoded.recipients, recipients);
        prop_assert_eq!(decoded.signed, sign);
        prop_assert_eq!(decoded.verified, sign);
    }

    /// Property: signature exclusion strips prior bond signatures and
    /// leaves every other field alone
    #[test]
    fn prop_signature_exclusion(
        bond in bond_strategy(),
        creditor_sig in signature_strategy(),
        debtor_sig in signature_strategy(),
    ) {
        let (alice, bob) = stores();
        let mut signed = bond.clone();
        signed.set_signature(Role::Creditor, Some(creditor_sig));
        signed.set_signature(Role::Debtor, Some(debtor_sig));
        let recipients = vec![bob.local_identity()];

        let bytes = envelope::encode(
            &signed,
            Some(&alice.local_identity()),
            &recipients,
            false,
            false,
            true,
            &alice,
        )
        .unwrap();
        let decoded = envelope::decode(&bytes, &bob).unwrap();

        prop_assert!(decoded.bond.signature(Role::Creditor).is_none());
        prop_assert!(decoded.bond.signature(Role::Debtor).is_none());
        prop_assert_eq!(decoded.bond.id(), bond.id());
        prop_assert_eq!(decoded.bond.canonical_bytes(), bond.canonical_bytes());
    }

    /// Property: flag bytes outside the known set never decode
    #[test]
    fn prop_unknown_flag_bits_rejected(
        flags in 0u8..=255,
        rest in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        prop_assume!(flags & !(SIGNED_FLAG | ENCRYPTED_FLAG) != 0);
        let (alice, _) = stores();

        let mut bytes = vec![flags];
        bytes.extend(rest);

        prop_assert!(envelope::decode(&bytes, &alice).is_err());
    }
}
