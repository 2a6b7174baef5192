//! Per-class and per-index statistics the query optimizer consults
//! (§2: "the class representation engine also answers the statistics
//! queries used by the optimizer"). The mirror updates these counters
//! as rows move; nothing here computes selectivity or cost — that's
//! the optimizer's job, out of scope here.
use dashmap::DashMap;

use common::oid::{Btid, Oid};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassStats {
    pub n_rows: u64,
    pub avg_rec_len: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub n_distinct_keys: u64,
    pub height: u32,
    pub leaf_pages: u32,
}

#[derive(Default)]
pub struct CatalogStats {
    classes: DashMap<Oid, ClassStats>,
    indexes: DashMap<Btid, IndexStats>,
}

impl CatalogStats {
    pub fn new() -> Self {
        CatalogStats { classes: DashMap::new(), indexes: DashMap::new() }
    }

    pub fn class_stats(&self, class_oid: Oid) -> ClassStats {
        self.classes.get(&class_oid).map(|r| *r).unwrap_or_default()
    }

    pub fn index_stats(&self, btid: Btid) -> IndexStats {
        self.indexes.get(&btid).map(|r| *r).unwrap_or_default()
    }

    pub fn record_insert(&self, class_oid: Oid, record_len: u32) {
        let mut entry = self.classes.entry(class_oid).or_default();
        let total_before = entry.avg_rec_len as u64 * entry.n_rows;
        entry.n_rows += 1;
        entry.avg_rec_len = ((total_before + record_len as u64) / entry.n_rows) as u32;
    }

    pub fn record_delete(&self, class_oid: Oid) {
        if let Some(mut entry) = self.classes.get_mut(&class_oid) {
            entry.n_rows = entry.n_rows.saturating_sub(1);
        }
    }

    pub fn set_index_stats(&self, btid: Btid, stats: IndexStats) {
        self.indexes.insert(btid, stats);
    }
}
