//! Key/identity store boundary
//!
//! The protocol core never touches key material directly; it goes through
//! [`KeyStore`]. Production deployments back this with whatever PKI they
//! trust; [`InMemoryKeyStore`] is the reference implementation used by the
//! demo and the test suites.

use crate::crypto::{self, KeyPair, PublicIdentity};
use crate::types::{PeerId, Signature};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Signing, verification and sealed encryption for one local identity
pub trait KeyStore {
    /// The local peer's identity
    fn local_identity(&self) -> PeerId;

    /// Whether the given id is the local identity
    fn is_local(&self, id: &PeerId) -> bool {
        *id == self.local_identity()
    }

    /// Sign a message with the local key
    fn sign(&self, message: &[u8]) -> Result<Signature>;

    /// Verify a signature against a peer's current public key
    ///
    /// Unknown signers verify false rather than erroring: the caller is
    /// expected to branch on the outcome.
    fn verify(&self, message: &[u8], signature: &Signature, signer: &PeerId) -> bool;

    /// Seal a message for exactly one recipient
    fn encrypt_for(&self, message: &[u8], recipient: &PeerId) -> Result<Vec<u8>>;

    /// Open a sealed message addressed to the local identity
    fn decrypt(&self, package: &[u8]) -> Result<Vec<u8>>;
}

impl<K: KeyStore + ?Sized> KeyStore for Arc<K> {
    fn local_identity(&self) -> PeerId {
        (**self).local_identity()
    }

    fn sign(&self, message: &[u8]) -> Result<Signature> {
        (**self).sign(message)
    }

    fn verify(&self, message: &[u8], signature: &Signature, signer: &PeerId) -> bool {
        (**self).verify(message, signature, signer)
    }

    fn encrypt_for(&self, message: &[u8], recipient: &PeerId) -> Result<Vec<u8>> {
        (**self).encrypt_for(message, recipient)
    }

    fn decrypt(&self, package: &[u8]) -> Result<Vec<u8>> {
        (**self).decrypt(package)
    }
}

impl<K: KeyStore + ?Sized> KeyStore for &K {
    fn local_identity(&self) -> PeerId {
        (**self).local_identity()
    }

    fn sign(&self, message: &[u8]) -> Result<Signature> {
        (**self).sign(message)
    }

    fn verify(&self, message: &[u8], signature: &Signature, signer: &PeerId) -> bool {
        (**self).verify(message, signature, signer)
    }

    fn encrypt_for(&self, message: &[u8], recipient: &PeerId) -> Result<Vec<u8>> {
        (**self).encrypt_for(message, recipient)
    }

    fn decrypt(&self, package: &[u8]) -> Result<Vec<u8>> {
        (**self).decrypt(package)
    }
}

/// In-memory key store: one local key pair plus a contact map
pub struct InMemoryKeyStore {
    local_id: PeerId,
    keypair: KeyPair,
    contacts: RwLock<HashMap<PeerId, PublicIdentity>>,
}

impl InMemoryKeyStore {
    /// Create a store with a freshly generated key pair
    pub fn new(local_id: PeerId) -> Self {
        Self::with_keypair(local_id, KeyPair::generate())
    }

    /// Create a store around an existing key pair
    pub fn with_keypair(local_id: PeerId, keypair: KeyPair) -> Self {
        Self {
            local_id,
            keypair,
            contacts: RwLock::new(HashMap::new()),
        }
    }

    /// The shareable public half of the local key pair
    pub fn public_identity(&self) -> PublicIdentity {
        self.keypair.public_identity()
    }

    /// Record a peer's public identity (trust establishment)
    pub fn add_contact(&self, id: PeerId, identity: PublicIdentity) {
        self.contacts.write().insert(id, identity);
    }

    fn resolve(&self, id: &PeerId) -> Option<PublicIdentity> {
        if *id == self.local_id {
            return Some(self.keypair.public_identity());
        }
        self.contacts.read().get(id).copied()
    }
}

impl KeyStore for InMemoryKeyStore {
    fn local_identity(&self) -> PeerId {
        self.local_id.clone()
    }

    fn sign(&self, message: &[u8]) -> Result<Signature> {
        Ok(self.keypair.sign(message))
    }

    fn verify(&self, message: &[u8], signature: &Signature, signer: &PeerId) -> bool {
        match self.resolve(signer) {
            Some(identity) => crypto::verify_signature(message, signature, &identity.verifying),
            None => {
                tracing::debug!(signer = %signer, "no public key for signer");
                false
            }
        }
    }

    fn encrypt_for(&self, message: &[u8], recipient: &PeerId) -> Result<Vec<u8>> {
        let identity = self.resolve(recipient).ok_or_else(|| {
            Error::NotFound(format!("no public key for peer {}", recipient))
        })?;
        crypto::seal(message, recipient, &identity.exchange)
    }

    fn decrypt(&self, package: &[u8]) -> Result<Vec<u8>> {
        self.keypair.open_sealed(package, &self.local_id)
    }
}

impl std::fmt::Debug for InMemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKeyStore")
            .field("local_id", &self.local_id)
            .field("contacts", &self.contacts.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired_stores() -> (InMemoryKeyStore, InMemoryKeyStore) {
        let alice = InMemoryKeyStore::new(PeerId::new("alice"));
        let bob = InMemoryKeyStore::new(PeerId::new("bob"));
        alice.add_contact(PeerId::new("bob"), bob.public_identity());
        bob.add_contact(PeerId::new("alice"), alice.public_identity());
        (alice, bob)
    }

    #[test]
    fn test_is_local() {
        let (alice, _) = paired_stores();
        assert!(alice.is_local(&PeerId::new("alice")));
        assert!(!alice.is_local(&PeerId::new("bob")));
    }

    #[test]
    fn test_cross_peer_verify() {
        let (alice, bob) = paired_stores();
        let signature = alice.sign(b"message").unwrap();

        assert!(bob.verify(b"message", &signature, &PeerId::new("alice")));
        assert!(!bob.verify(b"tampered", &signature, &PeerId::new("alice")));
        assert!(!bob.verify(b"message", &signature, &PeerId::new("bob")));
    }

    #[test]
    fn test_unknown_signer_verifies_false() {
        let (alice, _) = paired_stores();
        let signature = alice.sign(b"message").unwrap();
        assert!(!alice.verify(b"message", &signature, &PeerId::new("mallory")));
    }

    #[test]
    fn test_encrypt_decrypt_between_peers() {
        let (alice, bob) = paired_stores();

        let package = alice.encrypt_for(b"for bob only", &PeerId::new("bob")).unwrap();
        assert_eq!(bob.decrypt(&package).unwrap(), b"for bob only");

        // alice herself is not the recipient
        assert!(matches!(
            alice.decrypt(&package),
            Err(Error::NotRecipient(_))
        ));
    }

    #[test]
    fn test_encrypt_for_unknown_peer() {
        let (alice, _) = paired_stores();
        let err = alice.encrypt_for(b"x", &PeerId::new("mallory")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
