//! End-to-end protocol flows between in-process peers
//!
//! Three peers (alice, bob, clara) are wired through queue transports;
//! envelopes are routed by their sealed recipient, so every flow here
//! exercises the codec, the engine and the dispatch exactly as deployed.

use bond_core::{crypto, wire, BondConfig, BondIndex, InMemoryKeyStore, KeyStore, PeerId, Role};
use bond_protocol::{envelope, BondPeer, BondState, Error, MessageKind, QueueTransport};
use std::sync::Arc;
use uuid::Uuid;

struct TestPeer {
    peer: BondPeer<InMemoryKeyStore, QueueTransport>,
    outbox: QueueTransport,
}

fn wired_peers() -> Vec<TestPeer> {
    wired_peers_with(|_| BondConfig::default())
}

fn wired_peers_with(config_for: impl Fn(&PeerId) -> BondConfig) -> Vec<TestPeer> {
    let stores = [
        InMemoryKeyStore::new(PeerId::new("alice")),
        InMemoryKeyStore::new(PeerId::new("bob")),
        InMemoryKeyStore::new(PeerId::new("clara")),
    ];
    for a in &stores {
        for b in &stores {
            if a.local_identity() != b.local_identity() {
                a.add_contact(b.local_identity(), b.public_identity());
            }
        }
    }

    stores
        .into_iter()
        .map(|store| {
            let config = config_for(&store.local_identity());
            let outbox = QueueTransport::new();
            let peer = BondPeer::new(store, Arc::new(BondIndex::new()), outbox.clone(), config);
            TestPeer { peer, outbox }
        })
        .collect()
}

fn peer<'a>(peers: &'a [TestPeer], name: &str) -> &'a BondPeer<InMemoryKeyStore, QueueTransport> {
    peers
        .iter()
        .map(|p| &p.peer)
        .find(|p| p.local_identity().as_str() == name)
        .unwrap()
}

fn envelope_recipient(bytes: &[u8]) -> PeerId {
    let mut input = bytes;
    let _flags = wire::read_byte(&mut input).unwrap();
    let blob = wire::read_bytes(&mut input).unwrap();
    crypto::sealed_recipient(&blob).unwrap()
}

/// Deliver queued envelopes until every outbox is empty
fn pump(peers: &[TestPeer]) {
    loop {
        let mut delivered = false;
        for source in peers {
            for (uri, bytes) in source.outbox.drain() {
                let recipient = envelope_recipient(&bytes);
                peer(peers, recipient.as_str())
                    .on_message(&uri, &bytes)
                    .unwrap();
                delivered = true;
            }
        }
        if !delivered {
            return;
        }
    }
}

#[test]
fn test_dual_sign_flow_creditor_initiates() {
    let peers = wired_peers();
    let alice = peer(&peers, "alice");
    let bob = peer(&peers, "bob");

    let bond = alice
        .create_bond_as_creditor(PeerId::new("bob"), "EURO", 100)
        .unwrap();
    pump(&peers);

    // both local views are fully signed and verify on both ends
    for p in [alice, bob] {
        let stored = p.get_bond(bond.id()).unwrap();
        assert!(p.engine().verify_signature(&stored, Role::Creditor));
        assert!(p.engine().verify_signature(&stored, Role::Debtor));
        assert_eq!(p.bond_state(bond.id()).unwrap(), BondState::FullySigned);
    }
    assert_eq!(
        alice
            .bonds_by_pair(&PeerId::new("alice"), &PeerId::new("bob"))
            .len(),
        1
    );
}

#[test]
fn test_dual_sign_flow_debtor_initiates() {
    let peers = wired_peers();
    let bob = peer(&peers, "bob");

    let bond = bob
        .create_bond_as_debtor(PeerId::new("alice"), "KUDO", 42)
        .unwrap();
    pump(&peers);

    let alice = peer(&peers, "alice");
    let stored = alice.get_bond(bond.id()).unwrap();
    assert_eq!(stored.creditor().as_str(), "alice");
    assert_eq!(stored.amount(), 42);
    assert_eq!(alice.bond_state(bond.id()).unwrap(), BondState::FullySigned);
    assert_eq!(bob.bond_state(bond.id()).unwrap(), BondState::FullySigned);
}

#[test]
fn test_creditor_transfer_flow() {
    let peers = wired_peers();
    let alice = peer(&peers, "alice");

    let bond = alice
        .create_bond_as_creditor(PeerId::new("bob"), "EURO", 100)
        .unwrap();
    pump(&peers);

    alice
        .request_transfer_creditor(bond.id(), PeerId::new("clara"))
        .unwrap();
    pump(&peers);

    // every peer converges on the new-creditor form with the old creditor
    // retained in the temp slot, fully signed again
    for name in ["alice", "bob", "clara"] {
        let p = peer(&peers, name);
        let stored = p.get_bond(bond.id()).unwrap();
        assert_eq!(stored.creditor().as_str(), "clara", "at {}", name);
        assert_eq!(stored.debtor().as_str(), "bob", "at {}", name);
        assert_eq!(stored.temp_creditor().unwrap().as_str(), "alice");
        assert!(p.engine().verify_signature(&stored, Role::Creditor));
        assert!(p.engine().verify_signature(&stored, Role::Debtor));
        assert!(!stored.allow_change(Role::Creditor));
    }

    let clara = peer(&peers, "clara");
    assert_eq!(clara.bonds_by_creditor(&PeerId::new("clara")).len(), 1);
}

#[test]
fn test_debtor_transfer_flow() {
    let peers = wired_peers();
    let alice = peer(&peers, "alice");
    let bob = peer(&peers, "bob");

    let bond = alice
        .create_bond_as_creditor(PeerId::new("bob"), "EURO", 100)
        .unwrap();
    pump(&peers);

    bob.request_transfer_debtor(bond.id(), PeerId::new("clara"))
        .unwrap();
    pump(&peers);

    for name in ["alice", "bob", "clara"] {
        let p = peer(&peers, name);
        let stored = p.get_bond(bond.id()).unwrap();
        assert_eq!(stored.creditor().as_str(), "alice", "at {}", name);
        assert_eq!(stored.debtor().as_str(), "clara", "at {}", name);
        assert_eq!(stored.temp_debtor().unwrap().as_str(), "bob");
        assert!(p.engine().verify_signature(&stored, Role::Creditor));
        assert!(p.engine().verify_signature(&stored, Role::Debtor));
    }
}

#[test]
fn test_cooperative_annulment() {
    let peers = wired_peers();
    let alice = peer(&peers, "alice");
    let bob = peer(&peers, "bob");

    let bond = alice
        .create_bond_as_creditor(PeerId::new("bob"), "EURO", 100)
        .unwrap();
    pump(&peers);

    alice.annul_bond(bond.id()).unwrap();
    pump(&peers);

    for p in [alice, bob] {
        let stored = p.get_bond(bond.id()).unwrap();
        assert!(stored.is_annulled());
        assert!(stored.is_expired());
        assert_eq!(p.bond_state(bond.id()).unwrap(), BondState::Annulled);
    }
}

#[test]
fn test_annul_unknown_bond_fails() {
    let peers = wired_peers();
    let alice = peer(&peers, "alice");

    let err = alice.annul_bond(Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_tampered_envelope_rejected() {
    let peers = wired_peers();
    let alice = peer(&peers, "alice");
    let bob = peer(&peers, "bob");

    alice
        .create_bond_as_creditor(PeerId::new("bob"), "EURO", 100)
        .unwrap();
    let (uri, mut bytes) = peers[0].outbox.drain().pop().unwrap();

    // flip one ciphertext byte; the seal must not authenticate
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    let err = bob.on_message(&uri, &bytes).unwrap_err();
    assert!(matches!(
        err,
        Error::Crypto(_) | Error::MalformedEnvelope(_) | Error::SignatureInvalid(_)
    ));
    assert!(bob.bonds_by_debtor(&PeerId::new("bob")).is_empty());
}

#[test]
fn test_forged_sender_rejected() {
    let peers = wired_peers();
    let bob = peer(&peers, "bob");

    // clara signs an envelope but claims alice sent it
    let clara_store = InMemoryKeyStore::new(PeerId::new("clara"));
    let bond = bond_core::Bond::new(PeerId::new("alice"), PeerId::new("bob"), "EURO", 500, true);
    let bytes = envelope::encode(
        &bond,
        Some(&PeerId::new("alice")),
        &[PeerId::new("bob")],
        true,
        false,
        false,
        &clara_store,
    )
    .unwrap();

    let err = bob
        .on_message(MessageKind::AskSignAsDebtor.uri(), &bytes)
        .unwrap_err();
    assert!(matches!(err, Error::SignatureInvalid(_)));
}

#[test]
fn test_unknown_channel_uri_rejected() {
    let peers = wired_peers();
    let bob = peer(&peers, "bob");

    let err = bob
        .on_message("creditbond://definitelyNot", &[0u8; 8])
        .unwrap_err();
    assert!(matches!(err, Error::MalformedEnvelope(_)));
}

#[test]
fn test_envelope_for_someone_else_rejected() {
    let peers = wired_peers();
    let alice = peer(&peers, "alice");
    let clara = peer(&peers, "clara");

    alice
        .create_bond_as_creditor(PeerId::new("bob"), "EURO", 100)
        .unwrap();
    let (uri, bytes) = peers[0].outbox.drain().pop().unwrap();

    // the envelope is sealed for bob; clara cannot open it
    let err = clara.on_message(&uri, &bytes).unwrap_err();
    assert!(matches!(err, Error::NotRecipient(_)));
}

#[test]
fn test_snapshot_written_at_terminal_steps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alice-bonds.json");
    let snapshot_path = path.clone();
    let peers = wired_peers_with(move |id| {
        let mut config = BondConfig::default();
        if id.as_str() == "alice" {
            config.snapshot_path = Some(snapshot_path.clone());
        }
        config
    });
    let alice = peer(&peers, "alice");

    let bond = alice
        .create_bond_as_creditor(PeerId::new("bob"), "EURO", 100)
        .unwrap();
    pump(&peers);

    // alice received the final SignedBond, so her index hit disk
    let restored = BondIndex::load_snapshot(&path).unwrap();
    let stored = restored.get(bond.id()).unwrap();
    assert!(stored.is_fully_signed());

    alice.annul_bond(bond.id()).unwrap();
    pump(&peers);

    // the annulment round rewrote the snapshot
    let restored = BondIndex::load_snapshot(&path).unwrap();
    assert!(restored.get(bond.id()).unwrap().is_annulled());
}

#[test]
fn test_transfer_after_transfer() {
    // a second creditor transfer requires the debtor to accept again,
    // because countersigning cleared the allow flag
    let peers = wired_peers();
    let alice = peer(&peers, "alice");

    let bond = alice
        .create_bond_as_creditor(PeerId::new("bob"), "EURO", 100)
        .unwrap();
    pump(&peers);

    alice
        .request_transfer_creditor(bond.id(), PeerId::new("clara"))
        .unwrap();
    pump(&peers);

    // clara hands the creditor position back to alice
    let clara = peer(&peers, "clara");
    clara
        .request_transfer_creditor(bond.id(), PeerId::new("alice"))
        .unwrap();
    pump(&peers);

    for name in ["alice", "bob", "clara"] {
        let p = peer(&peers, name);
        let stored = p.get_bond(bond.id()).unwrap();
        assert_eq!(stored.creditor().as_str(), "alice", "at {}", name);
        assert_eq!(stored.temp_creditor().unwrap().as_str(), "clara");
        assert!(p.engine().verify_signature(&stored, Role::Creditor));
        assert!(p.engine().verify_signature(&stored, Role::Debtor));
    }
}
