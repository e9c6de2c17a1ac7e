//! CreditBond Core
//!
//! Data model and key material for peer-to-peer credit bonds: a bond is a
//! mutual IOU between a creditor and a debtor, valid once both parties have
//! signed its canonical form.
//!
//! # Architecture
//!
//! - **Dual signatures**: A bond binds only when creditor and debtor have
//!   both signed; either side can annul later
//! - **Canonical form**: Signatures always cover the bond with both
//!   signature fields cleared, so signing order never matters
//! - **Key store seam**: Protocol code reaches keys only through the
//!   [`KeyStore`] trait
//! - **Index**: In-memory view of known bonds with JSON snapshots

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod index;
pub mod keystore;
pub mod types;
pub mod wire;

// Re-exports
pub use config::BondConfig;
pub use crypto::{KeyPair, PublicIdentity};
pub use error::{Error, Result};
pub use index::BondIndex;
pub use keystore::{InMemoryKeyStore, KeyStore};
pub use types::{Bond, PeerId, Role, Signature};
