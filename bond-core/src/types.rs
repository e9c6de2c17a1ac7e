//! Core types for credit bonds
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Signature-excluded canonical forms (self-referential exclusion)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default bond validity in days (one year from creation)
pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

/// Peer identifier (opaque string, resolved externally to keys)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Create new peer ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The two parties of a bond
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The party owed the amount
    Creditor,
    /// The party owing the amount
    Debtor,
}

impl Role {
    /// The other party
    pub fn counterpart(&self) -> Role {
        match self {
            Role::Creditor => Role::Debtor,
            Role::Debtor => Role::Creditor,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Creditor => write!(f, "creditor"),
            Role::Debtor => write!(f, "debtor"),
        }
    }
}

/// Digital signature (Ed25519)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signature bytes (64 bytes)
    #[serde(with = "serde_bytes")]
    bytes: [u8; 64],
}

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }

    /// Verify signature against a 32-byte verifying key
    pub fn verify(&self, message: &[u8], public_key: &[u8; 32]) -> bool {
        use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};

        let signature = DalekSignature::from_bytes(&self.bytes);

        let verifying_key = match VerifyingKey::from_bytes(public_key) {
            Ok(key) => key,
            Err(_) => return false,
        };

        verifying_key.verify(message, &signature).is_ok()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({:02x}{:02x}{:02x}{:02x}..)",
            self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3])
    }
}

/// A credit bond: a signed record of a debt between a creditor and a debtor
///
/// Fields are private; state advances only through the guarded setters used
/// by the protocol engine. Both signature fields are computed over
/// [`Bond::canonical_bytes`], a serialization with the signatures cleared,
/// so verification is order-independent and idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bond {
    /// Unique bond ID, assigned at creation, never reassigned
    id: Uuid,

    /// Current creditor
    creditor: PeerId,

    /// Current debtor
    debtor: PeerId,

    /// Proposed new creditor during a transfer
    temp_creditor: Option<PeerId>,

    /// Proposed new debtor during a transfer
    temp_debtor: Option<PeerId>,

    /// Caller-defined unit label ("EURO", favours, cigarettes, ...)
    unit: String,

    /// Amount of whatever unit was defined
    amount: u64,

    /// Expiration timestamp
    expiration: DateTime<Utc>,

    /// Creditor signature over the canonical form, if signed
    creditor_signature: Option<Signature>,

    /// Debtor signature over the canonical form, if signed
    debtor_signature: Option<Signature>,

    /// Whether a creditor transfer may currently take effect
    allow_creditor_change: bool,

    /// Whether a debtor transfer may currently take effect
    allow_debtor_change: bool,

    /// Annulment consent of the creditor
    annulled_by_creditor: bool,

    /// Annulment consent of the debtor
    annulled_by_debtor: bool,
}

impl Bond {
    /// Create a new bond with a generated ID and default expiration
    pub fn new(
        creditor: PeerId,
        debtor: PeerId,
        unit: impl Into<String>,
        amount: u64,
        allow_transfer: bool,
    ) -> Self {
        Self::with_validity(
            creditor,
            debtor,
            unit,
            amount,
            allow_transfer,
            Duration::days(DEFAULT_VALIDITY_DAYS),
        )
    }

    /// Create a new bond with an explicit validity period
    pub fn with_validity(
        creditor: PeerId,
        debtor: PeerId,
        unit: impl Into<String>,
        amount: u64,
        allow_transfer: bool,
        validity: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            creditor,
            debtor,
            temp_creditor: None,
            temp_debtor: None,
            unit: unit.into(),
            amount,
            expiration: Utc::now() + validity,
            creditor_signature: None,
            debtor_signature: None,
            allow_creditor_change: allow_transfer,
            allow_debtor_change: allow_transfer,
            annulled_by_creditor: false,
            annulled_by_debtor: false,
        }
    }

    // Accessors

    /// Unique bond ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current creditor
    pub fn creditor(&self) -> &PeerId {
        &self.creditor
    }

    /// Current debtor
    pub fn debtor(&self) -> &PeerId {
        &self.debtor
    }

    /// Proposed new creditor (or, after a completed transfer, the old one)
    pub fn temp_creditor(&self) -> Option<&PeerId> {
        self.temp_creditor.as_ref()
    }

    /// Proposed new debtor (or, after a completed transfer, the old one)
    pub fn temp_debtor(&self) -> Option<&PeerId> {
        self.temp_debtor.as_ref()
    }

    /// Unit label
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Amount
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Expiration timestamp
    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    /// Party holding the given role
    pub fn party(&self, role: Role) -> &PeerId {
        match role {
            Role::Creditor => &self.creditor,
            Role::Debtor => &self.debtor,
        }
    }

    /// Proposed new party for the given role
    pub fn temp_party(&self, role: Role) -> Option<&PeerId> {
        match role {
            Role::Creditor => self.temp_creditor.as_ref(),
            Role::Debtor => self.temp_debtor.as_ref(),
        }
    }

    /// Signature of the given role, if present
    pub fn signature(&self, role: Role) -> Option<&Signature> {
        match role {
            Role::Creditor => self.creditor_signature.as_ref(),
            Role::Debtor => self.debtor_signature.as_ref(),
        }
    }

    /// Whether the given role may currently be reassigned
    pub fn allow_change(&self, role: Role) -> bool {
        match role {
            Role::Creditor => self.allow_creditor_change,
            Role::Debtor => self.allow_debtor_change,
        }
    }

    /// Whether the given party has consented to annulment
    pub fn annulled_by(&self, role: Role) -> bool {
        match role {
            Role::Creditor => self.annulled_by_creditor,
            Role::Debtor => self.annulled_by_debtor,
        }
    }

    /// Fully annulled iff both parties consented
    pub fn is_annulled(&self) -> bool {
        self.annulled_by_creditor && self.annulled_by_debtor
    }

    /// Whether the bond has both signatures present
    pub fn is_fully_signed(&self) -> bool {
        self.creditor_signature.is_some() && self.debtor_signature.is_some()
    }

    /// Whether the expiration timestamp has passed
    pub fn is_expired(&self) -> bool {
        self.expiration <= Utc::now()
    }

    // Guarded mutation

    /// Reassign the creditor; fails unless a creditor change is allowed
    pub fn set_creditor(&mut self, creditor: PeerId) -> crate::Result<()> {
        if !self.allow_creditor_change {
            return Err(crate::Error::TransferNotAllowed(
                "the bond's creditor cannot currently be changed".to_string(),
            ));
        }
        self.creditor = creditor;
        Ok(())
    }

    /// Reassign the debtor; fails unless a debtor change is allowed
    pub fn set_debtor(&mut self, debtor: PeerId) -> crate::Result<()> {
        if !self.allow_debtor_change {
            return Err(crate::Error::TransferNotAllowed(
                "the bond's debtor cannot currently be changed".to_string(),
            ));
        }
        self.debtor = debtor;
        Ok(())
    }

    /// Reassign the party for the given role (guarded)
    pub fn set_party(&mut self, role: Role, party: PeerId) -> crate::Result<()> {
        match role {
            Role::Creditor => self.set_creditor(party),
            Role::Debtor => self.set_debtor(party),
        }
    }

    /// Set or clear the proposed new party for a role
    pub fn set_temp_party(&mut self, role: Role, party: Option<PeerId>) {
        match role {
            Role::Creditor => self.temp_creditor = party,
            Role::Debtor => self.temp_debtor = party,
        }
    }

    /// Set or clear a role's signature
    pub fn set_signature(&mut self, role: Role, signature: Option<Signature>) {
        match role {
            Role::Creditor => self.creditor_signature = signature,
            Role::Debtor => self.debtor_signature = signature,
        }
    }

    /// Toggle the transfer permission for a role
    pub fn set_allow_change(&mut self, role: Role, on: bool) {
        match role {
            Role::Creditor => self.allow_creditor_change = on,
            Role::Debtor => self.allow_debtor_change = on,
        }
    }

    /// Record a party's annulment consent
    pub fn set_annulled_by(&mut self, role: Role) {
        match role {
            Role::Creditor => self.annulled_by_creditor = true,
            Role::Debtor => self.annulled_by_debtor = true,
        }
    }

    /// Force immediate expiry (part of annulment)
    pub fn set_expired_now(&mut self) {
        self.expiration = Utc::now();
    }

    /// Push the expiration forward by one validity period from now
    pub fn extend_validity(&mut self, validity: Duration) {
        self.expiration = Utc::now() + validity;
    }

    /// Clear annulment flags, transfer permissions and temp parties
    pub fn reset_transfer_state(&mut self) {
        self.annulled_by_creditor = false;
        self.annulled_by_debtor = false;
        self.allow_creditor_change = false;
        self.allow_debtor_change = false;
        self.temp_creditor = None;
        self.temp_debtor = None;
    }

    // Canonical form

    /// Canonical bytes for signing and verification
    ///
    /// Both signature fields are cleared before serializing, so a signature
    /// never covers itself or its counterpart. Transfer bookkeeping (temp
    /// parties, allow flags) is cleared too: signatures bind the economic
    /// substance of the bond, and an in-flight transfer request must not
    /// invalidate the signatures being verified against it.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut copy = self.clone();
        copy.creditor_signature = None;
        copy.debtor_signature = None;
        copy.temp_creditor = None;
        copy.temp_debtor = None;
        copy.allow_creditor_change = false;
        copy.allow_debtor_change = false;
        bincode::serialize(&copy).expect("serialization cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_bond(allow_transfer: bool) -> Bond {
        Bond::new(
            PeerId::new("alice"),
            PeerId::new("bob"),
            "EURO",
            100,
            allow_transfer,
        )
    }

    #[test]
    fn test_new_bond_defaults() {
        let bond = test_bond(false);
        assert_eq!(bond.creditor().as_str(), "alice");
        assert_eq!(bond.debtor().as_str(), "bob");
        assert_eq!(bond.amount(), 100);
        assert_eq!(bond.unit(), "EURO");
        assert!(bond.signature(Role::Creditor).is_none());
        assert!(bond.signature(Role::Debtor).is_none());
        assert!(!bond.is_annulled());
        assert!(!bond.is_expired());

        // roughly one year out
        let days = (bond.expiration() - Utc::now()).num_days();
        assert!((364..=365).contains(&days));
    }

    #[test]
    fn test_set_creditor_guarded() {
        let mut bond = test_bond(false);
        let err = bond.set_creditor(PeerId::new("clara")).unwrap_err();
        assert!(matches!(err, crate::Error::TransferNotAllowed(_)));
        assert_eq!(bond.creditor().as_str(), "alice");

        bond.set_allow_change(Role::Creditor, true);
        bond.set_creditor(PeerId::new("clara")).unwrap();
        assert_eq!(bond.creditor().as_str(), "clara");
    }

    #[test]
    fn test_annulment_requires_both() {
        let mut bond = test_bond(false);
        bond.set_annulled_by(Role::Creditor);
        assert!(!bond.is_annulled());
        bond.set_annulled_by(Role::Debtor);
        assert!(bond.is_annulled());
    }

    #[test]
    fn test_is_fully_signed_requires_both_signatures() {
        let mut bond = test_bond(false);
        assert!(!bond.is_fully_signed());

        bond.set_signature(Role::Creditor, Some(Signature::from_bytes([7u8; 64])));
        assert!(!bond.is_fully_signed());

        bond.set_signature(Role::Debtor, Some(Signature::from_bytes([9u8; 64])));
        assert!(bond.is_fully_signed());
    }

    #[test]
    fn test_extend_validity() {
        let mut bond = Bond::with_validity(
            PeerId::new("alice"),
            PeerId::new("bob"),
            "EURO",
            100,
            false,
            Duration::days(-1),
        );
        assert!(bond.is_expired());

        bond.extend_validity(Duration::days(30));
        assert!(!bond.is_expired());
        let days = (bond.expiration() - Utc::now()).num_days();
        assert!((29..=30).contains(&days));
    }

    #[test]
    fn test_reset_transfer_state() {
        let mut bond = test_bond(true);
        bond.set_temp_party(Role::Creditor, Some(PeerId::new("clara")));
        bond.set_allow_change(Role::Creditor, true);
        bond.set_annulled_by(Role::Debtor);

        bond.reset_transfer_state();
        assert!(bond.temp_creditor().is_none());
        assert!(bond.temp_debtor().is_none());
        assert!(!bond.allow_change(Role::Creditor));
        assert!(!bond.annulled_by(Role::Debtor));
    }

    #[test]
    fn test_canonical_bytes_excludes_signatures() {
        let mut bond = test_bond(false);
        let unsigned = bond.canonical_bytes();

        bond.set_signature(Role::Creditor, Some(Signature::from_bytes([7u8; 64])));
        bond.set_signature(Role::Debtor, Some(Signature::from_bytes([9u8; 64])));
        let signed = bond.canonical_bytes();

        assert_eq!(unsigned, signed);
    }

    #[test]
    fn test_canonical_bytes_excludes_transfer_bookkeeping() {
        let mut bond = test_bond(false);
        let baseline = bond.canonical_bytes();

        bond.set_temp_party(Role::Creditor, Some(PeerId::new("clara")));
        bond.set_allow_change(Role::Creditor, true);

        assert_eq!(bond.canonical_bytes(), baseline);
    }

    #[test]
    fn test_canonical_bytes_cover_parties() {
        let mut bond = test_bond(true);
        let baseline = bond.canonical_bytes();

        bond.set_creditor(PeerId::new("clara")).unwrap();
        assert_ne!(bond.canonical_bytes(), baseline);
    }

    #[test]
    fn test_set_expired_now() {
        let mut bond = test_bond(false);
        assert!(!bond.is_expired());
        bond.set_expired_now();
        assert!(bond.is_expired());
    }

    #[test]
    fn test_role_counterpart() {
        assert_eq!(Role::Creditor.counterpart(), Role::Debtor);
        assert_eq!(Role::Debtor.counterpart(), Role::Creditor);
    }
}
