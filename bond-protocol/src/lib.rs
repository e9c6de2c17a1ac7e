//! CreditBond Protocol
//!
//! The protocol layer over `bond-core`: envelope codec, the closed set of
//! message channels, the bond state machine, and the per-peer handler that
//! wires them together.
//!
//! # Flow
//!
//! A caller constructs a bond through [`BondPeer`], which signs it via the
//! [`ProtocolEngine`], commits it to the shared index, and emits signed,
//! sealed envelopes through a [`Transport`]. On the receiving side,
//! [`BondPeer::on_message`] decodes and verifies the envelope and drives
//! the next protocol step.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod channel;
pub mod engine;
pub mod envelope;
pub mod peer;

// Re-exports
pub use bond_core::{Error, Result};
pub use channel::MessageKind;
pub use engine::{BondState, ProtocolEngine};
pub use envelope::DecodedEnvelope;
pub use peer::{BondPeer, QueueTransport, Transport};
