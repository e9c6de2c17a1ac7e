//! Message channels
//!
//! Every protocol step travels on its own channel, identified by a stable
//! opaque URI. The closed [`MessageKind`] enum replaces per-URI string
//! matching with compiler-enforced exhaustive dispatch.

use bond_core::{Error, Result};
use std::fmt;

/// The closed set of protocol messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Debtor asks the creditor to sign a fresh bond
    AskSignAsCreditor,
    /// Creditor asks the debtor to sign a fresh bond
    AskSignAsDebtor,
    /// A countersigned bond returning to the requester
    SignedBond,
    /// Creditor asks the debtor to accept a creditor transfer
    AskAcceptTransferCreditor,
    /// Debtor accepted the creditor transfer and re-signed
    AcceptedTransferCreditor,
    /// Old creditor asks the new creditor to countersign the transfer
    AskSignTransferAsCreditor,
    /// New creditor countersigned the transfer
    SignedTransferCreditor,
    /// Debtor asks the creditor to accept a debtor transfer
    AskAcceptTransferDebtor,
    /// Creditor accepted the debtor transfer and re-signed
    AcceptedTransferDebtor,
    /// Old debtor asks the new debtor to countersign the transfer
    AskSignTransferAsDebtor,
    /// New debtor countersigned the transfer
    SignedTransferDebtor,
    /// One party requests annulment
    AnnulBond,
    /// The other party consented; the bond is void
    AnnulledBond,
}

impl MessageKind {
    /// Stable channel URI for this message kind
    pub fn uri(&self) -> &'static str {
        match self {
            MessageKind::AskSignAsCreditor => "creditbond://askSignAsCreditor",
            MessageKind::AskSignAsDebtor => "creditbond://askSignAsDebtor",
            MessageKind::SignedBond => "creditbond://signedBond",
            MessageKind::AskAcceptTransferCreditor => "creditbond://askAcceptTransferCreditor",
            MessageKind::AcceptedTransferCreditor => "creditbond://acceptedTransferCreditor",
            MessageKind::AskSignTransferAsCreditor => "creditbond://askSignTransferAsCreditor",
            MessageKind::SignedTransferCreditor => "creditbond://signedTransferCreditor",
            MessageKind::AskAcceptTransferDebtor => "creditbond://askAcceptTransferDebtor",
            MessageKind::AcceptedTransferDebtor => "creditbond://acceptedTransferDebtor",
            MessageKind::AskSignTransferAsDebtor => "creditbond://askSignTransferAsDebtor",
            MessageKind::SignedTransferDebtor => "creditbond://signedTransferDebtor",
            MessageKind::AnnulBond => "creditbond://annulBond",
            MessageKind::AnnulledBond => "creditbond://annulledBond",
        }
    }

    /// Resolve a channel URI back to its message kind
    pub fn from_uri(uri: &str) -> Result<Self> {
        match uri {
            "creditbond://askSignAsCreditor" => Ok(MessageKind::AskSignAsCreditor),
            "creditbond://askSignAsDebtor" => Ok(MessageKind::AskSignAsDebtor),
            "creditbond://signedBond" => Ok(MessageKind::SignedBond),
            "creditbond://askAcceptTransferCreditor" => Ok(MessageKind::AskAcceptTransferCreditor),
            "creditbond://acceptedTransferCreditor" => Ok(MessageKind::AcceptedTransferCreditor),
            "creditbond://askSignTransferAsCreditor" => Ok(MessageKind::AskSignTransferAsCreditor),
            "creditbond://signedTransferCreditor" => Ok(MessageKind::SignedTransferCreditor),
            "creditbond://askAcceptTransferDebtor" => Ok(MessageKind::AskAcceptTransferDebtor),
            "creditbond://acceptedTransferDebtor" => Ok(MessageKind::AcceptedTransferDebtor),
            "creditbond://askSignTransferAsDebtor" => Ok(MessageKind::AskSignTransferAsDebtor),
            "creditbond://signedTransferDebtor" => Ok(MessageKind::SignedTransferDebtor),
            "creditbond://annulBond" => Ok(MessageKind::AnnulBond),
            "creditbond://annulledBond" => Ok(MessageKind::AnnulledBond),
            other => Err(Error::MalformedEnvelope(format!(
                "unknown channel URI: {}",
                other
            ))),
        }
    }

    /// All message kinds, for channel registration
    pub fn all() -> &'static [MessageKind] {
        &[
            MessageKind::AskSignAsCreditor,
            MessageKind::AskSignAsDebtor,
            MessageKind::SignedBond,
            MessageKind::AskAcceptTransferCreditor,
            MessageKind::AcceptedTransferCreditor,
            MessageKind::AskSignTransferAsCreditor,
            MessageKind::SignedTransferCreditor,
            MessageKind::AskAcceptTransferDebtor,
            MessageKind::AcceptedTransferDebtor,
            MessageKind::AskSignTransferAsDebtor,
            MessageKind::SignedTransferDebtor,
            MessageKind::AnnulBond,
            MessageKind::AnnulledBond,
        ]
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}
