//! Trait seams for the storage engine collaborator the catalog mirror
//! writes through. The storage engine itself (heap files, B+Trees,
//! page buffering, recovery) is out of scope; these traits are the
//! boundary the mirror is written against.
use common::err::CResult;
use common::oid::{Btid, Hfid, Oid};

/// A heap file the mirror inserts/updates/deletes rows through.
pub trait HeapStore: Send + Sync {
    fn insert(&self, hfid: Hfid, record: &[u8]) -> CResult<Oid>;
    fn update(&self, oid: Oid, record: &[u8]) -> CResult<()>;
    fn delete(&self, oid: Oid) -> CResult<()>;
    fn read(&self, oid: Oid) -> CResult<Vec<u8>>;
}

/// A B+Tree index the mirror maintains alongside heap rows.
pub trait IndexStore: Send + Sync {
    fn insert_key(&self, btid: Btid, key: &[u8], oid: Oid) -> CResult<()>;
    fn delete_key(&self, btid: Btid, key: &[u8], oid: Oid) -> CResult<()>;
}
