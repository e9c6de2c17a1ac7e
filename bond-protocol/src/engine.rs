//! Protocol engine: the bond state machine
//!
//! Every operation consumes an immutable bond snapshot and returns a new
//! one; nothing here touches the index or the network. The caller commits
//! the returned snapshot (via `BondIndex`) and ships it (via the envelope
//! codec) once the operation succeeds.
//!
//! Verification always runs over [`Bond::canonical_bytes`], so a pending
//! transfer request never invalidates the signatures a counterparty is
//! asked to check.

use bond_core::{Bond, Error, KeyStore, PeerId, Result, Role};

/// Derived lifecycle state, for logging and inspection only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondState {
    /// No signatures yet
    Draft,
    /// Only the creditor has signed
    CreditorSigned,
    /// Only the debtor has signed
    DebtorSigned,
    /// Both parties signed, no transfer in flight
    FullySigned,
    /// A creditor transfer was requested, not yet past acceptance
    TransferCreditorPending,
    /// A debtor transfer was requested, not yet past acceptance
    TransferDebtorPending,
    /// The old party re-signed the swapped form; awaiting countersign
    TransferAccepted,
    /// The new party countersigned; counterpart has not re-signed yet
    TransferCountersigned,
    /// One party consented to annulment
    AnnulledByOne,
    /// Both parties consented; terminal
    Annulled,
}

/// Pure bond operations over one local identity's key store
pub struct ProtocolEngine<K: KeyStore> {
    keystore: K,
}

impl<K: KeyStore> ProtocolEngine<K> {
    /// Create an engine around a key store
    pub fn new(keystore: K) -> Self {
        Self { keystore }
    }

    /// The key store backing this engine
    pub fn keystore(&self) -> &K {
        &self.keystore
    }

    fn local(&self) -> PeerId {
        self.keystore.local_identity()
    }

    // Signing

    /// Sign as the bond's creditor; local identity must hold that role
    pub fn sign_as_creditor(&self, bond: &Bond) -> Result<Bond> {
        self.sign_as(bond, Role::Creditor)
    }

    /// Sign as the bond's debtor; local identity must hold that role
    pub fn sign_as_debtor(&self, bond: &Bond) -> Result<Bond> {
        self.sign_as(bond, Role::Debtor)
    }

    fn sign_as(&self, bond: &Bond, role: Role) -> Result<Bond> {
        let local = self.local();
        if bond.party(role) != &local {
            return Err(Error::IdentityMismatch(format!(
                "{} cannot sign bond {} as {}; that role is held by {}",
                local,
                bond.id(),
                role,
                bond.party(role)
            )));
        }

        let mut signed = bond.clone();
        let signature = self.keystore.sign(&signed.canonical_bytes())?;
        signed.set_signature(role, Some(signature));
        tracing::info!(bond_id = %bond.id(), role = %role, signer = %local, "bond signed");
        Ok(signed)
    }

    /// Whether the given role has signed at all
    pub fn is_signed_by(&self, bond: &Bond, role: Role) -> bool {
        bond.signature(role).is_some()
    }

    /// Whether the role's signature verifies against the role holder's key
    pub fn verify_signature(&self, bond: &Bond, role: Role) -> bool {
        self.signed_by_peer(bond, role, bond.party(role))
    }

    /// Whether the role's signature verifies against a specific peer's key
    fn signed_by_peer(&self, bond: &Bond, role: Role, signer: &PeerId) -> bool {
        match bond.signature(role) {
            Some(signature) => self
                .keystore
                .verify(&bond.canonical_bytes(), signature, signer),
            None => false,
        }
    }

    // Transfer chain
    //
    // request -> accept (counterpart consents, re-signs) -> accepted (old
    // party swaps itself out and signs the swapped form) -> countersign
    // (new party replaces that signature with its own).

    /// Propose a new creditor; the proposal travels to the current debtor
    pub fn request_transfer_creditor(&self, bond: &Bond, new_creditor: PeerId) -> Result<Bond> {
        self.request_transfer(bond, Role::Creditor, new_creditor)
    }

    /// Propose a new debtor; the proposal travels to the current creditor
    pub fn request_transfer_debtor(&self, bond: &Bond, new_debtor: PeerId) -> Result<Bond> {
        self.request_transfer(bond, Role::Debtor, new_debtor)
    }

    fn request_transfer(&self, bond: &Bond, role: Role, new_party: PeerId) -> Result<Bond> {
        let mut requested = bond.clone();
        requested.set_temp_party(role, Some(new_party.clone()));
        tracing::info!(
            bond_id = %bond.id(),
            role = %role,
            proposed = %new_party,
            "transfer requested"
        );
        Ok(requested)
    }

    /// Consent to a creditor transfer; local identity must be the debtor
    pub fn accept_transfer_creditor(&self, bond: &Bond) -> Result<Bond> {
        self.accept_transfer(bond, Role::Creditor)
    }

    /// Consent to a debtor transfer; local identity must be the creditor
    pub fn accept_transfer_debtor(&self, bond: &Bond) -> Result<Bond> {
        self.accept_transfer(bond, Role::Debtor)
    }

    fn accept_transfer(&self, bond: &Bond, role: Role) -> Result<Bond> {
        let counterpart = role.counterpart();
        let local = self.local();
        if bond.party(counterpart) != &local {
            return Err(Error::IdentityMismatch(format!(
                "only the {} may accept a {} transfer of bond {}",
                counterpart,
                role,
                bond.id()
            )));
        }
        if bond.temp_party(role).is_none() {
            return Err(Error::TransferNotAllowed(format!(
                "no {} transfer requested for bond {}",
                role,
                bond.id()
            )));
        }
        if !bond.is_fully_signed() {
            return Err(Error::SignatureInvalid(format!(
                "bond {} is not signed by both parties",
                bond.id()
            )));
        }
        for signer in [Role::Creditor, Role::Debtor] {
            if !self.verify_signature(bond, signer) {
                return Err(Error::SignatureInvalid(format!(
                    "{} signature of bond {} does not verify",
                    signer,
                    bond.id()
                )));
            }
        }

        let mut accepted = bond.clone();
        accepted.set_allow_change(role, true);
        let signature = self.keystore.sign(&accepted.canonical_bytes())?;
        accepted.set_signature(counterpart, Some(signature));
        tracing::info!(bond_id = %bond.id(), role = %role, by = %local, "transfer accepted");
        Ok(accepted)
    }

    /// Complete the swap as the outgoing creditor
    pub fn accepted_transfer_creditor(&self, bond: &Bond) -> Result<Bond> {
        self.accepted_transfer(bond, Role::Creditor)
    }

    /// Complete the swap as the outgoing debtor
    pub fn accepted_transfer_debtor(&self, bond: &Bond) -> Result<Bond> {
        self.accepted_transfer(bond, Role::Debtor)
    }

    fn accepted_transfer(&self, bond: &Bond, role: Role) -> Result<Bond> {
        let local = self.local();
        if bond.party(role) != &local {
            return Err(Error::IdentityMismatch(format!(
                "only the current {} may complete the transfer of bond {}",
                role,
                bond.id()
            )));
        }
        if !bond.allow_change(role) {
            return Err(Error::TransferNotAllowed(format!(
                "{} transfer of bond {} was not accepted by the counterpart",
                role,
                bond.id()
            )));
        }
        if !self.verify_signature(bond, role.counterpart()) {
            return Err(Error::SignatureInvalid(format!(
                "{} acceptance signature of bond {} does not verify",
                role.counterpart(),
                bond.id()
            )));
        }
        let new_party = bond.temp_party(role).cloned().ok_or_else(|| {
            Error::TransferNotAllowed(format!("no {} transfer requested for bond {}", role, bond.id()))
        })?;

        // swap: the proposed party takes the role, the old party is kept in
        // the temp slot so the countersigner can verify who signed below
        let mut swapped = bond.clone();
        let old_party = swapped.party(role).clone();
        swapped.set_party(role, new_party.clone())?;
        swapped.set_temp_party(role, Some(old_party.clone()));

        let signature = self.keystore.sign(&swapped.canonical_bytes())?;
        swapped.set_signature(role, Some(signature));
        tracing::info!(
            bond_id = %bond.id(),
            role = %role,
            old = %old_party,
            new = %new_party,
            "transfer swap signed by outgoing party"
        );
        Ok(swapped)
    }

    /// Countersign a completed creditor swap as the incoming creditor
    pub fn sign_transfer_as_creditor(&self, bond: &Bond) -> Result<Bond> {
        self.sign_transfer_as(bond, Role::Creditor)
    }

    /// Countersign a completed debtor swap as the incoming debtor
    pub fn sign_transfer_as_debtor(&self, bond: &Bond) -> Result<Bond> {
        self.sign_transfer_as(bond, Role::Debtor)
    }

    fn sign_transfer_as(&self, bond: &Bond, role: Role) -> Result<Bond> {
        let local = self.local();
        if bond.party(role) != &local {
            return Err(Error::IdentityMismatch(format!(
                "{} is not the incoming {} of bond {}",
                local,
                role,
                bond.id()
            )));
        }
        let old_party = bond.temp_party(role).cloned().ok_or_else(|| {
            Error::TransferNotAllowed(format!(
                "bond {} carries no {} transfer to countersign",
                bond.id(),
                role
            ))
        })?;

        // the outgoing party must have signed the swapped form
        if !self.signed_by_peer(bond, role, &old_party) {
            return Err(Error::SignatureInvalid(format!(
                "outgoing {} {} did not endorse the transfer of bond {}",
                role,
                old_party,
                bond.id()
            )));
        }

        let mut countersigned = bond.clone();
        let signature = self.keystore.sign(&countersigned.canonical_bytes())?;
        countersigned.set_signature(role, Some(signature));
        countersigned.set_allow_change(role, false);
        tracing::info!(
            bond_id = %bond.id(),
            role = %role,
            incoming = %local,
            "transfer countersigned"
        );
        Ok(countersigned)
    }

    // Annulment

    /// Record the local party's annulment consent and expire the bond
    pub fn annul(&self, bond: &Bond) -> Result<Bond> {
        let local = self.local();
        let role = if bond.creditor() == &local {
            Role::Creditor
        } else if bond.debtor() == &local {
            Role::Debtor
        } else {
            return Err(Error::IdentityMismatch(format!(
                "{} is neither creditor nor debtor of bond {}",
                local,
                bond.id()
            )));
        };
        if bond.is_annulled() {
            return Err(Error::AlreadyAnnulled(format!(
                "bond {} is already fully annulled",
                bond.id()
            )));
        }

        let mut annulled = bond.clone();
        annulled.set_expired_now();
        annulled.set_annulled_by(role);
        let signature = self.keystore.sign(&annulled.canonical_bytes())?;
        annulled.set_signature(role, Some(signature));
        tracing::info!(bond_id = %bond.id(), role = %role, by = %local, "bond annulled");
        Ok(annulled)
    }

    // Inspection

    /// Derive a lifecycle state report for a bond
    pub fn bond_state(&self, bond: &Bond) -> BondState {
        if bond.is_annulled() {
            return BondState::Annulled;
        }
        if bond.annulled_by(Role::Creditor) || bond.annulled_by(Role::Debtor) {
            return BondState::AnnulledByOne;
        }

        if bond.temp_creditor().is_some() {
            return self.transfer_stage(bond, Role::Creditor);
        }
        if bond.temp_debtor().is_some() {
            return self.transfer_stage(bond, Role::Debtor);
        }

        match (
            self.is_signed_by(bond, Role::Creditor),
            self.is_signed_by(bond, Role::Debtor),
        ) {
            (true, true) => BondState::FullySigned,
            (true, false) => BondState::CreditorSigned,
            (false, true) => BondState::DebtorSigned,
            (false, false) => BondState::Draft,
        }
    }

    /// Which stage of a pending transfer the role's signature reflects
    fn transfer_stage(&self, bond: &Bond, role: Role) -> BondState {
        let pending = match role {
            Role::Creditor => BondState::TransferCreditorPending,
            Role::Debtor => BondState::TransferDebtorPending,
        };
        let Some(old_party) = bond.temp_party(role) else {
            return pending;
        };
        if self.signed_by_peer(bond, role, old_party) {
            return BondState::TransferAccepted;
        }
        if !self.verify_signature(bond, role) {
            return pending;
        }
        if !self.verify_signature(bond, role.counterpart()) {
            return BondState::TransferCountersigned;
        }
        if bond.allow_change(role) {
            return pending;
        }
        BondState::FullySigned
    }
}

impl<K: KeyStore> std::fmt::Debug for ProtocolEngine<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("local", &self.keystore.local_identity())
            .finish()
    }
}
