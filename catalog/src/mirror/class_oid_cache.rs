//! `class_oid -> db_class row oid` cache (§4.4): every lookup of a
//! class's catalog row goes through here first so repeated DDL/DML
//! against the same class doesn't re-scan `db_class`.
use dashmap::DashMap;

use common::oid::Oid;

/// Backed by `dashmap`, whose per-shard locking gives the reader/writer
/// critical-section semantics the mirror needs: concurrent readers on
/// distinct classes never block each other, and a writer only excludes
/// readers of the same shard.
#[derive(Default)]
pub struct ClassOidCache {
    entries: DashMap<Oid, Oid>,
}

impl ClassOidCache {
    pub fn new() -> Self {
        ClassOidCache { entries: DashMap::new() }
    }

    pub fn get(&self, class_oid: Oid) -> Option<Oid> {
        self.entries.get(&class_oid).map(|r| *r)
    }

    pub fn insert(&self, class_oid: Oid, row_oid: Oid) {
        self.entries.insert(class_oid, row_oid);
    }

    pub fn remove(&self, class_oid: Oid) {
        self.entries.remove(&class_oid);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
