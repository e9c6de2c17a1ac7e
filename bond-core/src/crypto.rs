//! Cryptographic operations for bonds
//!
//! This module provides:
//! - Ed25519 key pair generation, signing, and verification
//! - Sealed single-recipient packages (X25519 ECDH + ChaCha20-Poly1305)
//! - Deterministic key derivation from seeds for reproducible tests

use crate::types::{PeerId, Signature};
use crate::{wire, Error, Result};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey as ExchangePublicKey, StaticSecret};

/// Size of the AEAD nonce in bytes
const NONCE_SIZE: usize = 12;

/// Size of the AEAD authentication tag in bytes
const TAG_SIZE: usize = 16;

/// Public half of a peer's key material, shared during trust establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentity {
    /// Ed25519 verifying key
    pub verifying: [u8; 32],
    /// X25519 exchange key
    pub exchange: [u8; 32],
}

/// Key pair for signing and sealed-package decryption
pub struct KeyPair {
    signing_key: SigningKey,
    exchange_secret: StaticSecret,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);

        // derive a distinct exchange secret from the same seed
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(b"x25519-exchange");
        let exchange_seed: [u8; 32] = hasher.finalize().into();

        Self {
            signing_key,
            exchange_secret: StaticSecret::from(exchange_seed),
        }
    }

    /// Public verifying key bytes
    pub fn verifying_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Public exchange key bytes
    pub fn exchange_key(&self) -> [u8; 32] {
        ExchangePublicKey::from(&self.exchange_secret).to_bytes()
    }

    /// The shareable public half of this key pair
    pub fn public_identity(&self) -> PublicIdentity {
        PublicIdentity {
            verifying: self.verifying_key(),
            exchange: self.exchange_key(),
        }
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature = self.signing_key.sign(message);
        Signature::from_bytes(signature.to_bytes())
    }

    /// Open a sealed package addressed to `local_id`
    ///
    /// Fails with `NotRecipient` when the embedded recipient is someone
    /// else, and with `Crypto` when authentication fails (any tamper).
    pub fn open_sealed(&self, package: &[u8], local_id: &PeerId) -> Result<Vec<u8>> {
        let mut input = package;

        let recipient = wire::read_str(&mut input)?;
        if recipient != local_id.as_str() {
            return Err(Error::NotRecipient(format!(
                "package addressed to {}, local identity is {}",
                recipient, local_id
            )));
        }

        if input.len() < 32 {
            return Err(Error::MalformedEnvelope(
                "truncated ephemeral key".to_string(),
            ));
        }
        let (eph_bytes, rest) = input.split_at(32);
        let mut ephemeral = [0u8; 32];
        ephemeral.copy_from_slice(eph_bytes);
        input = rest;

        let blob = wire::read_bytes(&mut input)?;
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::MalformedEnvelope(
                "sealed blob shorter than nonce + tag".to_string(),
            ));
        }

        let shared = self
            .exchange_secret
            .diffie_hellman(&ExchangePublicKey::from(ephemeral));
        let key = derive_key(shared.as_bytes());

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
        let cipher = ChaCha20Poly1305::new(&key.into());
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| Error::Crypto("sealed package failed authentication".to_string()))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("verifying_key", &self.verifying_key())
            .finish_non_exhaustive()
    }
}

/// Verify a signature with a public key
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &[u8; 32]) -> bool {
    use ed25519_dalek::{Signature as DalekSignature, Verifier};

    let dalek_sig = DalekSignature::from_bytes(signature.as_bytes());

    let verifying_key = match VerifyingKey::from_bytes(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };

    verifying_key.verify(message, &dalek_sig).is_ok()
}

/// Seal a message for exactly one recipient
///
/// Layout: `[lp recipient-id][32-byte ephemeral public key][lp nonce||ct||tag]`.
/// A fresh ephemeral X25519 key is used per package; the shared secret is
/// hashed with SHA-256 into the AEAD key.
pub fn seal(plaintext: &[u8], recipient: &PeerId, exchange_key: &[u8; 32]) -> Result<Vec<u8>> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = ExchangePublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(&ExchangePublicKey::from(*exchange_key));
    let key = derive_key(shared.as_bytes());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = ChaCha20Poly1305::new(&key.into());
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| Error::Crypto("sealing failed".to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);

    let mut package = Vec::new();
    wire::write_str(&mut package, recipient.as_str());
    package.extend_from_slice(ephemeral_public.as_bytes());
    wire::write_bytes(&mut package, &blob);

    Ok(package)
}

/// Peek at the recipient of a sealed package without opening it
pub fn sealed_recipient(package: &[u8]) -> Result<PeerId> {
    let mut input = package;
    Ok(PeerId::new(wire::read_str(&mut input)?))
}

fn derive_key(shared_secret: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret);
    hasher.finalize().into()
}
