//! CreditBond demo: a full bond lifecycle between in-process peers
//!
//! Alice (creditor) and Bob (debtor) create and dual-sign a 100 EURO bond,
//! Alice transfers her creditor position to Clara, and Clara and Bob then
//! cooperatively annul the bond. Envelopes travel through queue transports
//! and are routed by their sealed recipient, exactly as a real delivery
//! layer would.

use anyhow::{anyhow, Context, Result};
use bond_core::{crypto, wire, BondConfig, BondIndex, InMemoryKeyStore, KeyStore, PeerId};
use bond_protocol::{BondPeer, QueueTransport};
use std::sync::Arc;
use tracing::info;

struct DemoPeer {
    peer: BondPeer<InMemoryKeyStore, QueueTransport>,
    outbox: QueueTransport,
}

impl DemoPeer {
    fn new(keystore: InMemoryKeyStore) -> Self {
        let outbox = QueueTransport::new();
        let peer = BondPeer::new(
            keystore,
            Arc::new(BondIndex::new()),
            outbox.clone(),
            BondConfig::default(),
        );
        Self { peer, outbox }
    }
}

/// Peek at the sealed recipient of an outbound envelope
fn envelope_recipient(bytes: &[u8]) -> Result<PeerId> {
    let mut input = bytes;
    let _flags = wire::read_byte(&mut input)?;
    let blob = wire::read_bytes(&mut input)?;
    Ok(crypto::sealed_recipient(&blob)?)
}

/// Deliver queued envelopes until every outbox is empty
fn pump(peers: &[DemoPeer]) -> Result<()> {
    loop {
        let mut delivered = false;
        for source in peers {
            for (uri, bytes) in source.outbox.drain() {
                let recipient = envelope_recipient(&bytes)?;
                let target = peers
                    .iter()
                    .find(|p| p.peer.local_identity() == recipient)
                    .ok_or_else(|| anyhow!("no peer named {}", recipient))?;
                target
                    .peer
                    .on_message(&uri, &bytes)
                    .with_context(|| format!("{} handling {}", recipient, uri))?;
                delivered = true;
            }
        }
        if !delivered {
            return Ok(());
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // trust establishment: everyone knows everyone's public identity
    let alice_store = InMemoryKeyStore::new(PeerId::new("alice"));
    let bob_store = InMemoryKeyStore::new(PeerId::new("bob"));
    let clara_store = InMemoryKeyStore::new(PeerId::new("clara"));
    for (a, b) in [
        (&alice_store, &bob_store),
        (&alice_store, &clara_store),
        (&bob_store, &clara_store),
    ] {
        a.add_contact(b.local_identity(), b.public_identity());
        b.add_contact(a.local_identity(), a.public_identity());
    }

    let peers = [
        DemoPeer::new(alice_store),
        DemoPeer::new(bob_store),
        DemoPeer::new(clara_store),
    ];
    let (alice, bob, clara) = (&peers[0].peer, &peers[1].peer, &peers[2].peer);

    info!("creating a 100 EURO bond: alice (creditor) / bob (debtor)");
    let bond = alice.create_bond_as_creditor(PeerId::new("bob"), "EURO", 100)?;
    pump(&peers)?;
    info!(state = ?alice.bond_state(bond.id())?, "bond dual-signed");

    info!("alice transfers her creditor position to clara");
    alice.request_transfer_creditor(bond.id(), PeerId::new("clara"))?;
    pump(&peers)?;

    let transferred = clara.get_bond(bond.id())?;
    info!(
        creditor = %transferred.creditor(),
        previous = %transferred.temp_creditor().map(|p| p.to_string()).unwrap_or_default(),
        state = ?clara.bond_state(bond.id())?,
        "transfer complete"
    );

    info!("clara and bob annul the bond");
    clara.annul_bond(bond.id())?;
    pump(&peers)?;

    let annulled = bob.get_bond(bond.id())?;
    info!(
        annulled = annulled.is_annulled(),
        expired = annulled.is_expired(),
        "bond annulled"
    );

    info!(
        clara_bonds = clara.bonds_by_creditor(&PeerId::new("clara")).len(),
        bob_bonds = bob.bonds_by_debtor(&PeerId::new("bob")).len(),
        "final index view"
    );
    Ok(())
}
