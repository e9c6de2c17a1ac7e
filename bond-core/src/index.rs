//! Bond index: the local materialized view of all bonds known to a peer
//!
//! Keyed by bond id with secondary maps per creditor and debtor. Insertion
//! order is preserved for role queries. A coarse read/write lock is enough:
//! throughput is human-speed financial agreements, not the bottleneck.
//!
//! Bonds are never physically deleted in the normal lifecycle; they are
//! annulled or left to expire. `remove`/`clear` are administrative.

use crate::types::{Bond, PeerId};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    bonds: HashMap<Uuid, Bond>,
    order: Vec<Uuid>,
    by_creditor: HashMap<PeerId, Vec<Uuid>>,
    by_debtor: HashMap<PeerId, Vec<Uuid>>,
}

impl Inner {
    fn link(&mut self, bond: &Bond) {
        self.by_creditor
            .entry(bond.creditor().clone())
            .or_default()
            .push(bond.id());
        self.by_debtor
            .entry(bond.debtor().clone())
            .or_default()
            .push(bond.id());
    }

    fn unlink(&mut self, bond: &Bond) {
        if let Some(ids) = self.by_creditor.get_mut(bond.creditor()) {
            ids.retain(|id| *id != bond.id());
        }
        if let Some(ids) = self.by_debtor.get_mut(bond.debtor()) {
            ids.retain(|id| *id != bond.id());
        }
    }
}

/// In-memory bond collection with optional snapshot persistence
#[derive(Default)]
pub struct BondIndex {
    inner: RwLock<Inner>,
}

impl BondIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new bond; fails with `Duplicate` if the id is present
    pub fn insert(&self, bond: Bond) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.bonds.contains_key(&bond.id()) {
            return Err(Error::Duplicate(format!(
                "bond {} already present; use update or upsert",
                bond.id()
            )));
        }
        tracing::debug!(bond_id = %bond.id(), "bond inserted");
        inner.order.push(bond.id());
        inner.link(&bond);
        inner.bonds.insert(bond.id(), bond);
        Ok(())
    }

    /// Replace an existing bond; fails with `NotFound` if the id is unknown
    pub fn update(&self, bond: Bond) -> Result<()> {
        let mut inner = self.inner.write();
        let previous = inner
            .bonds
            .remove(&bond.id())
            .ok_or_else(|| Error::NotFound(format!("bond {} not in index", bond.id())))?;
        inner.unlink(&previous);
        inner.link(&bond);
        inner.bonds.insert(bond.id(), bond);
        Ok(())
    }

    /// Insert if unseen, else replace
    pub fn upsert(&self, bond: Bond) {
        let mut inner = self.inner.write();
        match inner.bonds.remove(&bond.id()) {
            Some(previous) => {
                inner.unlink(&previous);
            }
            None => {
                inner.order.push(bond.id());
            }
        }
        tracing::debug!(bond_id = %bond.id(), "bond upserted");
        inner.link(&bond);
        inner.bonds.insert(bond.id(), bond);
    }

    /// Remove a bond (administrative; normal lifecycle annuls instead)
    pub fn remove(&self, id: Uuid) -> Result<Bond> {
        let mut inner = self.inner.write();
        let bond = inner
            .bonds
            .remove(&id)
            .ok_or_else(|| Error::NotFound(format!("bond {} not in index", id)))?;
        inner.unlink(&bond);
        inner.order.retain(|entry| *entry != id);
        Ok(bond)
    }

    /// Drop all bonds (administrative)
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        *inner = Inner::default();
    }

    /// Get a bond by id
    pub fn get(&self, id: Uuid) -> Option<Bond> {
        self.inner.read().bonds.get(&id).cloned()
    }

    /// Number of bonds
    pub fn len(&self) -> usize {
        self.inner.read().bonds.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().bonds.is_empty()
    }

    /// All bonds in insertion order
    pub fn all(&self) -> Vec<Bond> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.bonds.get(id).cloned())
            .collect()
    }

    /// All bonds with the given creditor, insertion order preserved
    pub fn by_creditor(&self, creditor: &PeerId) -> Vec<Bond> {
        let inner = self.inner.read();
        inner
            .by_creditor
            .get(creditor)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.bonds.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All bonds with the given debtor, insertion order preserved
    pub fn by_debtor(&self, debtor: &PeerId) -> Vec<Bond> {
        let inner = self.inner.read();
        inner
            .by_debtor
            .get(debtor)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.bonds.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All bonds between the given creditor/debtor pair
    pub fn by_pair(&self, creditor: &PeerId, debtor: &PeerId) -> Vec<Bond> {
        self.by_creditor(creditor)
            .into_iter()
            .filter(|bond| bond.debtor() == debtor)
            .collect()
    }

    // Snapshot persistence

    /// Write all bonds to a JSON snapshot file
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let bonds = self.all();
        let file = std::fs::File::create(path.as_ref())?;
        serde_json::to_writer_pretty(file, &bonds)
            .map_err(|e| Error::Config(format!("failed to write snapshot: {}", e)))?;
        tracing::info!(count = bonds.len(), path = ?path.as_ref(), "index snapshot saved");
        Ok(())
    }

    /// Load bonds from a JSON snapshot file into an empty index
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let bonds: Vec<Bond> = serde_json::from_reader(file)
            .map_err(|e| Error::Config(format!("failed to parse snapshot: {}", e)))?;

        let index = Self::new();
        for bond in bonds {
            index.insert(bond)?;
        }
        Ok(index)
    }
}

impl std::fmt::Debug for BondIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BondIndex").field("len", &self.len()).finish()
    }
}
