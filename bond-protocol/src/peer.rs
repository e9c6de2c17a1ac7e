//! Per-peer protocol handler
//!
//! [`BondPeer`] wires the engine, the envelope codec, the shared index and
//! an outbound transport into one handler. Local operations sign, commit to
//! the index and emit envelopes; [`BondPeer::on_message`] drives the
//! receiving side of every protocol step. All outbound envelopes are signed
//! and sealed for their single recipient; fan-out to several parties is one
//! envelope per recipient.

use crate::channel::MessageKind;
use crate::engine::{BondState, ProtocolEngine};
use crate::envelope;
use bond_core::{Bond, BondConfig, BondIndex, Error, KeyStore, PeerId, Result, Role};
use chrono::Duration;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

/// Outbound byte transport, fire-and-forget
pub trait Transport {
    /// Hand an envelope to the network on the given channel
    fn send(&self, channel_uri: &str, bytes: Vec<u8>) -> Result<()>;
}

/// In-process transport backed by a shared queue
///
/// The test suites and the demo binary drain the queue and feed each
/// envelope into the addressed peer's `on_message`.
#[derive(Clone, Default)]
pub struct QueueTransport {
    queue: Arc<Mutex<VecDeque<(String, Vec<u8>)>>>,
}

impl QueueTransport {
    /// Create an empty queue transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all queued envelopes, in send order
    pub fn drain(&self) -> Vec<(String, Vec<u8>)> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of queued envelopes
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Transport for QueueTransport {
    fn send(&self, channel_uri: &str, bytes: Vec<u8>) -> Result<()> {
        self.queue.lock().push_back((channel_uri.to_string(), bytes));
        Ok(())
    }
}

impl std::fmt::Debug for QueueTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueTransport")
            .field("queued", &self.len())
            .finish()
    }
}

/// One peer's protocol endpoint
pub struct BondPeer<K: KeyStore, T: Transport> {
    engine: ProtocolEngine<K>,
    index: Arc<BondIndex>,
    transport: T,
    config: BondConfig,
}

impl<K: KeyStore, T: Transport> BondPeer<K, T> {
    /// Wire a peer from its key store, shared index and transport
    pub fn new(keystore: K, index: Arc<BondIndex>, transport: T, config: BondConfig) -> Self {
        Self {
            engine: ProtocolEngine::new(keystore),
            index,
            transport,
            config,
        }
    }

    /// This peer's identity
    pub fn local_identity(&self) -> PeerId {
        self.engine.keystore().local_identity()
    }

    /// The engine, for direct state inspection
    pub fn engine(&self) -> &ProtocolEngine<K> {
        &self.engine
    }

    /// Derived lifecycle state of a stored bond
    pub fn bond_state(&self, id: Uuid) -> Result<BondState> {
        let bond = self.get_bond(id)?;
        Ok(self.engine.bond_state(&bond))
    }

    // Local operations

    /// Create a bond owed to us, sign it, and ask the debtor to countersign
    pub fn create_bond_as_creditor(
        &self,
        debtor: PeerId,
        unit: impl Into<String>,
        amount: u64,
    ) -> Result<Bond> {
        let bond = self.new_bond(self.local_identity(), debtor.clone(), unit, amount);
        let bond = self.engine.sign_as_creditor(&bond)?;
        self.index.insert(bond.clone())?;
        self.send_bond(&bond, &[debtor], MessageKind::AskSignAsDebtor)?;
        Ok(bond)
    }

    /// Create a bond we owe, sign it, and ask the creditor to countersign
    pub fn create_bond_as_debtor(
        &self,
        creditor: PeerId,
        unit: impl Into<String>,
        amount: u64,
    ) -> Result<Bond> {
        let bond = self.new_bond(creditor.clone(), self.local_identity(), unit, amount);
        let bond = self.engine.sign_as_debtor(&bond)?;
        self.index.insert(bond.clone())?;
        self.send_bond(&bond, &[creditor], MessageKind::AskSignAsCreditor)?;
        Ok(bond)
    }

    /// Propose transferring our creditor position to another peer
    pub fn request_transfer_creditor(&self, id: Uuid, new_creditor: PeerId) -> Result<Bond> {
        let bond = self.get_bond(id)?;
        let bond = self.engine.request_transfer_creditor(&bond, new_creditor)?;
        self.index.update(bond.clone())?;
        self.send_bond(
            &bond,
            &[bond.debtor().clone()],
            MessageKind::AskAcceptTransferCreditor,
        )?;
        Ok(bond)
    }

    /// Propose transferring our debtor position to another peer
    pub fn request_transfer_debtor(&self, id: Uuid, new_debtor: PeerId) -> Result<Bond> {
        let bond = self.get_bond(id)?;
        let bond = self.engine.request_transfer_debtor(&bond, new_debtor)?;
        self.index.update(bond.clone())?;
        self.send_bond(
            &bond,
            &[bond.creditor().clone()],
            MessageKind::AskAcceptTransferDebtor,
        )?;
        Ok(bond)
    }

    /// Request annulment of a bond we are party to
    pub fn annul_bond(&self, id: Uuid) -> Result<Bond> {
        let bond = self.get_bond(id)?;
        let bond = self.engine.annul(&bond)?;
        self.index.update(bond.clone())?;
        self.send_bond(
            &bond,
            &[self.counterpart_of(&bond)?],
            MessageKind::AnnulBond,
        )?;
        Ok(bond)
    }

    // Queries

    /// A stored bond by id
    pub fn get_bond(&self, id: Uuid) -> Result<Bond> {
        self.index
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("bond {} not in index", id)))
    }

    /// Stored bonds where the given peer is creditor
    pub fn bonds_by_creditor(&self, creditor: &PeerId) -> Vec<Bond> {
        self.index.by_creditor(creditor)
    }

    /// Stored bonds where the given peer is debtor
    pub fn bonds_by_debtor(&self, debtor: &PeerId) -> Vec<Bond> {
        self.index.by_debtor(debtor)
    }

    /// Stored bonds between the given pair
    pub fn bonds_by_pair(&self, creditor: &PeerId, debtor: &PeerId) -> Vec<Bond> {
        self.index.by_pair(creditor, debtor)
    }

    // Receiving side

    /// Handle an inbound envelope from the given channel
    ///
    /// Signed envelopes that fail verification are rejected with
    /// `SignatureInvalid` before any state changes.
    pub fn on_message(&self, channel_uri: &str, bytes: &[u8]) -> Result<()> {
        let kind = MessageKind::from_uri(channel_uri)?;
        let decoded = envelope::decode(bytes, self.engine.keystore())?;
        if decoded.signed && !decoded.verified {
            return Err(Error::SignatureInvalid(format!(
                "envelope from {} on {} does not verify",
                decoded.sender, channel_uri
            )));
        }

        let bond = decoded.bond;
        tracing::debug!(
            bond_id = %bond.id(),
            kind = %kind,
            sender = %decoded.sender,
            "bond message received"
        );

        match kind {
            MessageKind::AskSignAsCreditor => {
                let bond = self.engine.sign_as_creditor(&bond)?;
                self.index.upsert(bond.clone());
                self.send_bond(&bond, &[bond.debtor().clone()], MessageKind::SignedBond)
            }
            MessageKind::AskSignAsDebtor => {
                let bond = self.engine.sign_as_debtor(&bond)?;
                self.index.upsert(bond.clone());
                self.send_bond(&bond, &[bond.creditor().clone()], MessageKind::SignedBond)
            }
            MessageKind::SignedBond => {
                for role in [Role::Creditor, Role::Debtor] {
                    if self.engine.is_signed_by(&bond, role)
                        && !self.engine.verify_signature(&bond, role)
                    {
                        return Err(Error::SignatureInvalid(format!(
                            "{} signature of bond {} does not verify",
                            role,
                            bond.id()
                        )));
                    }
                }
                self.index.upsert(bond);
                self.persist()
            }
            MessageKind::AskAcceptTransferCreditor => {
                let bond = self.engine.accept_transfer_creditor(&bond)?;
                self.index.upsert(bond.clone());
                self.send_bond(
                    &bond,
                    &[bond.creditor().clone()],
                    MessageKind::AcceptedTransferCreditor,
                )
            }
            MessageKind::AcceptedTransferCreditor => {
                let bond = self.engine.accepted_transfer_creditor(&bond)?;
                self.index.upsert(bond.clone());
                self.send_bond(
                    &bond,
                    &[bond.creditor().clone()],
                    MessageKind::AskSignTransferAsCreditor,
                )
            }
            MessageKind::AskSignTransferAsCreditor => {
                let bond = self.engine.sign_transfer_as_creditor(&bond)?;
                self.index.upsert(bond.clone());
                let mut recipients = vec![bond.debtor().clone()];
                recipients.extend(bond.temp_creditor().cloned());
                self.send_bond(&bond, &recipients, MessageKind::SignedTransferCreditor)
            }
            MessageKind::SignedTransferCreditor => {
                self.finish_transfer(bond, Role::Creditor)
            }
            MessageKind::AskAcceptTransferDebtor => {
                let bond = self.engine.accept_transfer_debtor(&bond)?;
                self.index.upsert(bond.clone());
                self.send_bond(
                    &bond,
                    &[bond.debtor().clone()],
                    MessageKind::AcceptedTransferDebtor,
                )
            }
            MessageKind::AcceptedTransferDebtor => {
                let bond = self.engine.accepted_transfer_debtor(&bond)?;
                self.index.upsert(bond.clone());
                self.send_bond(
                    &bond,
                    &[bond.debtor().clone()],
                    MessageKind::AskSignTransferAsDebtor,
                )
            }
            MessageKind::AskSignTransferAsDebtor => {
                let bond = self.engine.sign_transfer_as_debtor(&bond)?;
                self.index.upsert(bond.clone());
                let mut recipients = vec![bond.creditor().clone()];
                recipients.extend(bond.temp_debtor().cloned());
                self.send_bond(&bond, &recipients, MessageKind::SignedTransferDebtor)
            }
            MessageKind::SignedTransferDebtor => {
                self.finish_transfer(bond, Role::Debtor)
            }
            MessageKind::AnnulBond => {
                let bond = self.engine.annul(&bond)?;
                self.index.upsert(bond.clone());
                self.send_bond(
                    &bond,
                    &[self.counterpart_of(&bond)?],
                    MessageKind::AnnulledBond,
                )?;
                self.persist()
            }
            MessageKind::AnnulledBond => {
                self.index.upsert(bond);
                self.persist()
            }
        }
    }

    // Internals

    fn new_bond(
        &self,
        creditor: PeerId,
        debtor: PeerId,
        unit: impl Into<String>,
        amount: u64,
    ) -> Bond {
        Bond::with_validity(
            creditor,
            debtor,
            unit,
            amount,
            self.config.allow_transfer,
            Duration::days(self.config.validity_days),
        )
    }

    /// The incoming party countersigned a transfer; the counterpart
    /// re-signs the new-party form, everyone else just stores it
    fn finish_transfer(&self, bond: Bond, transferred: Role) -> Result<()> {
        if !self.engine.verify_signature(&bond, transferred) {
            return Err(Error::SignatureInvalid(format!(
                "incoming {} signature of bond {} does not verify",
                transferred,
                bond.id()
            )));
        }

        let counterpart = transferred.counterpart();
        if bond.party(counterpart) == &self.local_identity() {
            let bond = match counterpart {
                Role::Creditor => self.engine.sign_as_creditor(&bond)?,
                Role::Debtor => self.engine.sign_as_debtor(&bond)?,
            };
            self.index.upsert(bond.clone());
            let mut recipients = vec![bond.party(transferred).clone()];
            recipients.extend(bond.temp_party(transferred).cloned());
            return self.send_bond(&bond, &recipients, MessageKind::SignedBond);
        }

        self.index.upsert(bond);
        Ok(())
    }

    /// Snapshot the index to the configured path, if any
    ///
    /// Runs at locally-terminal steps: once a bond settles into a signed
    /// or annulled form there is no follow-up message that would rewrite it.
    fn persist(&self) -> Result<()> {
        if let Some(path) = &self.config.snapshot_path {
            self.index.save_snapshot(path)?;
            tracing::debug!(path = %path.display(), bonds = self.index.len(), "index snapshot written");
        }
        Ok(())
    }

    fn counterpart_of(&self, bond: &Bond) -> Result<PeerId> {
        let local = self.local_identity();
        if bond.creditor() == &local {
            Ok(bond.debtor().clone())
        } else if bond.debtor() == &local {
            Ok(bond.creditor().clone())
        } else {
            Err(Error::IdentityMismatch(format!(
                "{} is neither creditor nor debtor of bond {}",
                local,
                bond.id()
            )))
        }
    }

    fn send_bond(&self, bond: &Bond, recipients: &[PeerId], kind: MessageKind) -> Result<()> {
        let sender = self.local_identity();
        for recipient in recipients {
            let bytes = envelope::encode(
                bond,
                Some(&sender),
                std::slice::from_ref(recipient),
                true,
                true,
                false,
                self.engine.keystore(),
            )?;
            self.transport.send(kind.uri(), bytes)?;
            tracing::debug!(
                bond_id = %bond.id(),
                kind = %kind,
                recipient = %recipient,
                "bond message sent"
            );
        }
        Ok(())
    }
}

impl<K: KeyStore, T: Transport> std::fmt::Debug for BondPeer<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BondPeer")
            .field("local", &self.local_identity())
            .field("bonds", &self.index.len())
            .finish()
    }
}
