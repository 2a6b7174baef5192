//! Physical identifiers shared by the record codec, the catalog mirror
//! and the storage collaborator (§3 "OID", GLOSSARY).

/// Catalog tables (and every other row the mirror writes) live in the
/// global shard group, never a user shard (§3: "Catalog tables have
/// `group_id == GLOBAL_GROUPID`").
pub const GLOBAL_GROUPID: i32 = 0;

/// Physical object identifier `(volid, pageid, slotid, groupid)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oid {
    pub volume_id: i16,
    pub page_id: i32,
    pub slot_id: i16,
    pub group_id: i32,
}

impl Oid {
    pub const NULL: Oid = Oid { volume_id: -1, page_id: -1, slot_id: -1, group_id: GLOBAL_GROUPID };

    pub fn new(volume_id: i16, page_id: i32, slot_id: i16, group_id: i32) -> Self {
        Oid { volume_id, page_id, slot_id, group_id }
    }

    pub fn is_null(&self) -> bool {
        self.volume_id < 0 || self.page_id < 0 || self.slot_id < 0
    }
}

impl Default for Oid {
    fn default() -> Self {
        Oid::NULL
    }
}

/// B+Tree identifier `(vfid, root_pageid)` (GLOSSARY: "BTID").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Btid {
    pub vfid: i32,
    pub root_page_id: i32,
}

impl Btid {
    pub const NULL: Btid = Btid { vfid: -1, root_page_id: -1 };

    pub fn is_null(&self) -> bool {
        self.vfid < 0 || self.root_page_id < 0
    }
}

/// Heap-file identifier (GLOSSARY: "HFID").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hfid {
    pub vfid: i32,
    pub header_page_id: i32,
}
