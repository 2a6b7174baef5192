//! C4 Catalog Table Mirror (§4.4): the in-process mirror of `db_class`,
//! `db_attribute` and `db_index` that the class representation engine
//! reads and writes through. Ties together the record codec (§4.1),
//! the class representation builder (§4.3) and the `class_oid` cache.
pub mod class_oid_cache;

use std::sync::Arc;

use common::err::CResult;
use common::oid::{Hfid, Oid};
use common::value::{OrValue, Value};

use crate::error::{CatalogError, CatalogResult};
use crate::heap::HeapStore;
use crate::record::codec::{decode_to_values, encode_from_values, overwrite_group_id};
use crate::repr::class_repr::ClassRepr;

pub use class_oid_cache::ClassOidCache;

/// One row of a cascade (§4.4 "cascades"): a `db_class`/`db_attribute`/
/// `db_index` row together with the child rows it owns. The root row
/// is inserted and deleted before its children, since a child's
/// `class_of` back-pointer needs the root's oid to exist first.
///
/// `self_ref_attrs` names the attribute slots whose value is the
/// self-reference placeholder (the object's own oid embedded in its
/// own record, e.g. `db_class.self_oid`) — these can only be filled in
/// after the row has been physically inserted once (§4.4's two-phase
/// insert).
///
/// `class_of_attr` names the attribute slot carrying the back-pointer
/// to the root of the cascade (§4.4 step 2: "For every subset whose
/// class has a back-pointer attribute (`class_of`), set that attribute
/// to `root_oid` on every element"). Only children set this; the root
/// row itself has no back-pointer to stamp.
pub struct CascadeRow {
    pub class_oid: Oid,
    pub hfid: Hfid,
    pub repr: Arc<ClassRepr>,
    pub values: Vec<OrValue>,
    pub self_ref_attrs: Vec<usize>,
    pub class_of_attr: Option<usize>,
    pub children: Vec<CascadeRow>,
}

/// The mirror itself: a heap-store handle plus the `class_oid` cache.
/// Generic over the storage collaborator so it can be exercised in
/// tests against an in-memory fake (§4.4's storage engine is out of
/// scope; this is the seam).
pub struct CatalogMirror<H: HeapStore> {
    heap: H,
    class_oid_cache: ClassOidCache,
}

impl<H: HeapStore> CatalogMirror<H> {
    pub fn new(heap: H) -> Self {
        CatalogMirror { heap, class_oid_cache: ClassOidCache::new() }
    }

    pub fn class_oid_cache(&self) -> &ClassOidCache {
        &self.class_oid_cache
    }

    /// Exposes the underlying heap collaborator for tests that need to
    /// read back raw stored bytes directly (e.g. §8 scenario 5's
    /// catalog-mirror round trip) rather than through the mirror's own
    /// insert/update/delete API.
    pub fn heap_for_test(&self) -> &H {
        &self.heap
    }

    /// §4.4 insert: the row is inserted in two phases —
    ///
    /// 1. insert a placeholder so a row oid is allocated;
    /// 2. rewrite every `self_ref_attrs` slot to that oid, re-encode,
    ///    and overwrite the placeholder in place.
    ///
    /// then children are recursed into, each one's `class_of_attr`
    /// stamped with the cascade's `root_oid` (step 1's root, not the
    /// immediate parent) before it is itself encoded and inserted —
    /// the child's own oid must not exist yet for step 1 to stamp it,
    /// which is why the root always goes first.
    ///
    /// `group_id` is computed from the assigned row oid and patched
    /// into the packed bytes after encoding (§4.4 step 5), mirroring
    /// `net_buf_overwrite_int`'s patch-in-place pattern.
    pub fn insert_class(&self, row: &CascadeRow, is_top_level: bool) -> CResult<Oid> {
        let row_oid = self.insert_row(row, None)?;
        if is_top_level {
            self.class_oid_cache.insert(row.class_oid, row_oid);
        }
        Ok(row_oid)
    }

    /// Inserts one row of a cascade and recurses into its children.
    /// `root_oid` is `None` only for the cascade's own root; every
    /// recursive call below it carries the root's oid forward
    /// unchanged, since `class_of` always points at the cascade root,
    /// not at an intermediate parent.
    fn insert_row(&self, row: &CascadeRow, root_oid: Option<Oid>) -> CResult<Oid> {
        let mut values = row.values.clone();
        if let (Some(attr), Some(root)) = (row.class_of_attr, root_oid) {
            values[attr] = OrValue::Scalar(Value::Oid(root));
        }

        let placeholder_values: Vec<OrValue> = values
            .iter()
            .enumerate()
            .map(|(i, v)| if row.self_ref_attrs.contains(&i) { OrValue::Scalar(Value::Null) } else { v.clone() })
            .collect();
        let placeholder_bytes = encode_from_values(&placeholder_values, &row.repr).map_err(CatalogError::into)?;
        let row_oid = self.heap.insert(row.hfid, &placeholder_bytes)?;

        if !row.self_ref_attrs.is_empty() {
            let rewritten_values: Vec<OrValue> = values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    if row.self_ref_attrs.contains(&i) {
                        OrValue::Scalar(Value::Oid(row_oid))
                    } else {
                        v.clone()
                    }
                })
                .collect();
            let mut bytes = encode_from_values(&rewritten_values, &row.repr).map_err(CatalogError::into)?;
            overwrite_group_id(&mut bytes, row_oid.group_id);
            self.heap.update(row_oid, &bytes)?;
        }

        let cascade_root = root_oid.unwrap_or(row_oid);
        for child in &row.children {
            self.insert_row(child, Some(cascade_root))?;
        }

        Ok(row_oid)
    }

    /// §4.4 update: compares `row.values` against what's currently
    /// stored and only touches the heap if something actually changed
    /// ("dirty"). Subset-valued attributes are paired by position —
    /// a length mismatch (an inserted or deleted suffix) or any
    /// differing element marks the row dirty, same as a plain scalar
    /// difference. No new oids are allocated on update, so there's no
    /// ordering constraint between parent and children beyond "each
    /// row is compared and rewritten once."
    pub fn update_class(&self, row: &CascadeRow, row_oid: Oid, child_oids: &[Oid]) -> CResult<()> {
        let old_bytes = self.heap.read(row_oid)?;
        let old_values = decode_to_values(&old_bytes, &row.repr).map_err(CatalogError::into)?;

        if values_are_dirty(&old_values, &row.values) {
            let mut bytes = encode_from_values(&row.values, &row.repr).map_err(CatalogError::into)?;
            overwrite_group_id(&mut bytes, row_oid.group_id);
            self.heap.update(row_oid, &bytes)?;
        }

        for (child, child_oid) in row.children.iter().zip(child_oids.iter()) {
            self.update_class(child, *child_oid, &[])?;
        }
        Ok(())
    }

    /// §4.4 delete: the parent row must be read (its embedded child
    /// oids discovered) before anything is deleted — by the time this
    /// is called, `row` already reflects that read. Children are then
    /// deleted depth-first, and the parent last, so a crash mid-cascade
    /// never leaves a dangling self-reference pointing at an
    /// already-deleted row.
    pub fn delete_class(&self, row: &CascadeRow, row_oid: Oid, child_oids: &[Oid], is_top_level: bool) -> CResult<()> {
        for (child, child_oid) in row.children.iter().zip(child_oids.iter()) {
            self.delete_class(child, *child_oid, &[], false)?;
        }
        self.heap.delete(row_oid)?;
        if is_top_level {
            self.class_oid_cache.remove(row.class_oid);
        }
        Ok(())
    }
}

/// §4.4 update "compares each attribute against the stored value":
/// a single differing attribute, scalar or subset, is enough to mark
/// the whole row dirty.
fn values_are_dirty(old: &[OrValue], new: &[OrValue]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    old.iter().zip(new.iter()).any(|(o, n)| match (o, n) {
        (OrValue::Subset(old_elems), OrValue::Subset(new_elems)) => subset_is_dirty(old_elems, new_elems),
        _ => o != n,
    })
}

/// Pairs subset elements by position (§4.4: "update common prefixes,
/// insert the extra suffix of the new side, delete the extra suffix of
/// the old side"). A length mismatch is itself the extra suffix and so
/// is always dirty; otherwise any differing element is.
fn subset_is_dirty(old: &[OrValue], new: &[OrValue]) -> bool {
    old.len() != new.len() || old.iter().zip(new.iter()).any(|(o, n)| o != n)
}
