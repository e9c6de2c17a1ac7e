//! Envelope codec
//!
//! Wire layout: `[1 flag byte][lp blob]` where `lp` is a u32 big-endian
//! length prefix. Flag bit 0 marks a signed envelope, bit 1 an encrypted
//! one. Inside the (possibly decrypted) blob:
//!
//! ```text
//! signed:   [lp signed-content][lp signature]
//! unsigned: [lp signed-content]
//! ```
//!
//! with `signed-content = [lp bond bytes (bincode)][lp sender id]
//! [lp recipient-id-set]`. Encryption always comes last, so a signed
//! envelope stays verifiable after decryption.

use bond_core::{wire, Bond, Error, KeyStore, PeerId, Result, Role, Signature};

/// Flag bit: the envelope carries a detached signature over its content
pub const SIGNED_FLAG: u8 = 0x01;

/// Flag bit: the envelope blob is sealed for a single recipient
pub const ENCRYPTED_FLAG: u8 = 0x02;

/// A decoded envelope with its verification outcome
///
/// A failed signature check does not abort decoding; the caller inspects
/// `verified` and decides. Unsigned envelopes always report `verified =
/// false`.
#[derive(Debug, Clone)]
pub struct DecodedEnvelope {
    /// The transported bond
    pub bond: Bond,
    /// Declared sender (the party whose key signed, if signed)
    pub sender: PeerId,
    /// Declared recipients, order preserved
    pub recipients: Vec<PeerId>,
    /// Whether the envelope carried a signature
    pub signed: bool,
    /// Whether that signature verified against the declared sender's key
    pub verified: bool,
}

/// Encode a bond into an envelope
///
/// - `sender` defaults to the bond's creditor.
/// - Encrypting requires exactly one explicit recipient and fails
///   `InvalidRecipients` otherwise; only unencrypted envelopes default an
///   empty recipient set to `{debtor}`.
/// - `exclude_prior_signatures` transports the bond with both signature
///   fields cleared (the bytes a counterparty is being asked to sign).
pub fn encode<K: KeyStore>(
    bond: &Bond,
    sender: Option<&PeerId>,
    recipients: &[PeerId],
    sign: bool,
    encrypt: bool,
    exclude_prior_signatures: bool,
    keystore: &K,
) -> Result<Vec<u8>> {
    let sender = sender.unwrap_or_else(|| bond.creditor());

    // sealing needs an explicit single recipient; defaulting applies only
    // to plaintext envelopes
    if encrypt && recipients.len() != 1 {
        return Err(Error::InvalidRecipients(format!(
            "encryption requires exactly one recipient, got {}",
            recipients.len()
        )));
    }
    let default_recipients;
    let recipients = if recipients.is_empty() {
        default_recipients = vec![bond.debtor().clone()];
        &default_recipients
    } else {
        recipients
    };

    let bond_bytes = if exclude_prior_signatures {
        signature_excluded_bytes(bond)?
    } else {
        bincode::serialize(bond)?
    };

    let mut content = Vec::new();
    wire::write_bytes(&mut content, &bond_bytes);
    wire::write_str(&mut content, sender.as_str());
    wire::write_id_set(&mut content, recipients);

    let mut blob = Vec::new();
    wire::write_bytes(&mut blob, &content);

    let mut flags = 0u8;
    if sign {
        let signature = keystore.sign(&content)?;
        wire::write_bytes(&mut blob, signature.as_bytes());
        flags |= SIGNED_FLAG;
    }

    if encrypt {
        blob = keystore.encrypt_for(&blob, &recipients[0])?;
        flags |= ENCRYPTED_FLAG;
    }

    tracing::debug!(
        bond_id = %bond.id(),
        sender = %sender,
        signed = sign,
        encrypted = encrypt,
        "envelope encoded"
    );

    let mut out = Vec::with_capacity(1 + 4 + blob.len());
    out.push(flags);
    wire::write_bytes(&mut out, &blob);
    Ok(out)
}

/// Decode an envelope, decrypting and checking its signature as flagged
pub fn decode<K: KeyStore>(bytes: &[u8], keystore: &K) -> Result<DecodedEnvelope> {
    let mut input = bytes;
    let flags = wire::read_byte(&mut input)?;
    if flags & !(SIGNED_FLAG | ENCRYPTED_FLAG) != 0 {
        return Err(Error::MalformedEnvelope(format!(
            "unknown flag bits: {:#04x}",
            flags
        )));
    }

    let mut blob = wire::read_bytes(&mut input)?;
    if flags & ENCRYPTED_FLAG != 0 {
        blob = keystore.decrypt(&blob)?;
    }

    let mut rest = blob.as_slice();
    let content = wire::read_bytes(&mut rest)?;

    let signed = flags & SIGNED_FLAG != 0;
    let signature = if signed {
        let sig_bytes = wire::read_bytes(&mut rest)?;
        let array: [u8; 64] = sig_bytes.try_into().map_err(|_| {
            Error::MalformedEnvelope("signature field is not 64 bytes".to_string())
        })?;
        Some(Signature::from_bytes(array))
    } else {
        None
    };

    let mut fields = content.as_slice();
    let bond_bytes = wire::read_bytes(&mut fields)?;
    let sender = PeerId::new(wire::read_str(&mut fields)?);
    let recipients = wire::read_id_set(&mut fields)?;

    let bond: Bond = bincode::deserialize(&bond_bytes)
        .map_err(|e| Error::MalformedEnvelope(format!("corrupt bond bytes: {}", e)))?;

    let verified = match &signature {
        Some(sig) => keystore.verify(&content, sig, &sender),
        None => false,
    };

    tracing::debug!(
        bond_id = %bond.id(),
        sender = %sender,
        signed,
        verified,
        "envelope decoded"
    );

    Ok(DecodedEnvelope {
        bond,
        sender,
        recipients,
        signed,
        verified,
    })
}

/// Produce just the detached signature bytes for a bond
///
/// Signs the same content an envelope would carry, without building the
/// envelope. Used when a party only needs to hand over its signature.
pub fn detached_signature<K: KeyStore>(
    bond: &Bond,
    sender: &PeerId,
    recipients: &[PeerId],
    keystore: &K,
) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    wire::write_bytes(&mut content, &signature_excluded_bytes(bond)?);
    wire::write_str(&mut content, sender.as_str());
    wire::write_id_set(&mut content, recipients);

    Ok(keystore.sign(&content)?.as_bytes().to_vec())
}

/// Transport form with both signature fields cleared
///
/// Distinct from [`Bond::canonical_bytes`]: transfer bookkeeping stays in,
/// because an envelope asking a counterparty to act on a transfer must
/// carry the temp fields.
fn signature_excluded_bytes(bond: &Bond) -> Result<Vec<u8>> {
    let mut copy = bond.clone();
    copy.set_signature(Role::Creditor, None);
    copy.set_signature(Role::Debtor, None);
    Ok(bincode::serialize(&copy)?)
}
