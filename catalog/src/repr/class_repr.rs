//! `ClassRepr` and its attribute/index members (§3 "Class
//! representation").
use std::sync::Arc;

use common::oid::{Btid, Oid};
use common::value::{Domain, OrValue};

/// Where an attribute lives in the packed record: a byte offset into
/// the fixed region, or a slot index into the variable offset table
/// (§3 "location").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrLocation {
    Fixed(usize),
    Variable(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum IndexType {
    Unique,
    Index,
    PrimaryKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    InProgress,
    Normal,
}

/// A single attribute of a class representation (§3). Historical
/// representations keep only the reduced form — id, type, domain,
/// location/position — with no defaults and no per-attribute btids; a
/// full (current) representation fills every field.
#[derive(Debug, Clone)]
pub struct AttributeRepr {
    pub id: i32,
    pub def_order: i32,
    pub location: AttrLocation,
    pub position: i32,
    pub class_oid: Oid,
    pub domain: Arc<Domain>,
    pub default_value: Option<OrValue>,
    pub current_default_value: Option<OrValue>,
    pub n_btids: usize,
    pub btids: Vec<Btid>,
    pub index_btid: Option<Btid>,
    pub is_fixed: bool,
    pub is_notnull: bool,
    pub is_shard_key: bool,
    /// Populated by the second pass over constraints (§4.3: "resolves
    /// attribute ids to attribute names... because constraints persist
    /// ids but users see names"). Empty for a reduced historical repr.
    pub name: String,
}

impl AttributeRepr {
    /// A reduced (historical) attribute: id, type, domain, location and
    /// position only — no defaults, no per-attribute btids (§3).
    pub fn reduced(id: i32, location: AttrLocation, position: i32, domain: Arc<Domain>) -> Self {
        AttributeRepr {
            id,
            def_order: position,
            location,
            position,
            class_oid: Oid::NULL,
            domain,
            default_value: None,
            current_default_value: None,
            n_btids: 0,
            btids: Vec::new(),
            index_btid: None,
            is_fixed: matches!(location, AttrLocation::Fixed(_)),
            is_notnull: false,
            is_shard_key: false,
            name: String::new(),
        }
    }
}

/// `(btid, type, status, name, n_atts, atts[], asc_desc[])` (§3).
#[derive(Debug, Clone)]
pub struct IndexRepr {
    pub btid: Btid,
    pub index_type: IndexType,
    pub status: IndexStatus,
    pub name: String,
    pub atts: Vec<i32>,
    pub asc_desc: Vec<bool>,
}

impl IndexRepr {
    pub fn n_atts(&self) -> usize {
        self.atts.len()
    }

    /// §3 invariant: `atts[i].length == asc_desc[i].length == n_atts`.
    pub fn check_invariant(&self) -> bool {
        self.atts.len() == self.asc_desc.len()
    }
}

/// Immutable snapshot identified by `(class_oid, repr_id)` (§3).
#[derive(Debug, Clone)]
pub struct ClassRepr {
    pub class_oid: Oid,
    pub repr_id: i32,
    pub attributes: Vec<AttributeRepr>,
    pub indexes: Vec<IndexRepr>,
    pub fixed_length: usize,
    pub n_variable: usize,
    pub is_shard_table: bool,
}

impl ClassRepr {
    pub fn n_attributes(&self) -> usize {
        self.attributes.len()
    }

    pub fn n_indexes(&self) -> usize {
        self.indexes.len()
    }

    pub fn fixed_attributes(&self) -> impl Iterator<Item = &AttributeRepr> {
        self.attributes.iter().filter(|a| matches!(a.location, AttrLocation::Fixed(_)))
    }

    pub fn variable_attributes(&self) -> impl Iterator<Item = &AttributeRepr> {
        self.attributes.iter().filter(|a| matches!(a.location, AttrLocation::Variable(_)))
    }

    /// §3 invariant: "the first attribute of a shard-keyed table has
    /// `is_shard_key = true` and its domain type is varchar."
    pub fn check_shard_key_invariant(&self) -> bool {
        if !self.is_shard_table {
            return true;
        }
        match self.attributes.first() {
            Some(a) => a.is_shard_key && a.domain.data_type == common::value::DomainType::Varchar,
            None => false,
        }
    }

    /// §3 invariant: "a primary-key index implies `type ==
    /// PRIMARY_KEY` and every `att` has `is_notnull = true`."
    pub fn check_primary_key_invariant(&self) -> bool {
        self.indexes.iter().all(|idx| {
            if idx.index_type != IndexType::PrimaryKey {
                return true;
            }
            idx.atts.iter().all(|att_id| {
                self.attributes.iter().find(|a| a.id == *att_id).map(|a| a.is_notnull).unwrap_or(false)
            })
        })
    }

    pub fn find_attribute(&self, id: i32) -> Option<&AttributeRepr> {
        self.attributes.iter().find(|a| a.id == id)
    }
}
