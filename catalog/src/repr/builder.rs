//! C3 Class Representation Builder (§4.3): assembles a [`ClassRepr`]
//! from catalog-row descriptors, either the current representation
//! (full attribute metadata) or a historical one (reduced form only).
use std::sync::Arc;

use common::oid::{Btid, Oid};
use common::value::{Domain, OrValue};

use crate::error::{CatalogError, CatalogResult};
use crate::record::header::ATT_BTID_PREALLOC;
use crate::repr::class_repr::{AttrLocation, AttributeRepr, ClassRepr, IndexRepr, IndexStatus, IndexType};

/// One `db_attribute` row as the mirror would hand it to the builder.
/// `dropped` attributes are skipped when assembling a repr (§4.3: "a
/// dropped column occupies no slot in the current representation but
/// its id remains reserved so historical reprs can still reference
/// it").
#[derive(Debug, Clone)]
pub struct AttributeDef {
    pub id: i32,
    pub name: String,
    pub domain: Arc<Domain>,
    pub default_value: Option<OrValue>,
    pub current_default_value: Option<OrValue>,
    pub is_notnull: bool,
    pub is_shard_key: bool,
    pub dropped: bool,
}

/// One `db_index` row. `attr_ids` persists attribute ids, not names
/// (§4.3: "constraints persist ids but users see names").
#[derive(Debug, Clone)]
pub struct ConstraintDef {
    pub btid: Btid,
    pub index_type: IndexType,
    pub status: IndexStatus,
    pub name: String,
    pub attr_ids: Vec<i32>,
    pub asc_desc: Vec<bool>,
}

pub struct ClassReprBuilder;

/// Per-attribute btid accumulator backed by a small inline array before
/// spilling to heap (§4.3), recovered from the `OR_ATT_BTID_PREALLOC`
/// ring in `object_representation_sr.h`.
struct BtidRing {
    inline: [Btid; ATT_BTID_PREALLOC],
    inline_len: usize,
    overflow: Vec<Btid>,
}

impl BtidRing {
    fn new() -> Self {
        BtidRing { inline: [Btid::NULL; ATT_BTID_PREALLOC], inline_len: 0, overflow: Vec::new() }
    }

    fn push(&mut self, btid: Btid) {
        if self.inline_len < ATT_BTID_PREALLOC {
            self.inline[self.inline_len] = btid;
            self.inline_len += 1;
        } else {
            self.overflow.push(btid);
        }
    }

    fn into_vec(self) -> Vec<Btid> {
        let mut out = self.inline[..self.inline_len].to_vec();
        out.extend(self.overflow);
        out
    }
}

impl ClassReprBuilder {
    /// Builds the current representation: every live (non-dropped)
    /// attribute with full metadata, fixed/variable partitioned by
    /// `DISK_REPR` layout (fixed-size domains first, in id order, then
    /// variable-size domains in id order) and indexes resolved from
    /// `constraints` with their `att_ids` mapped to attribute names.
    pub fn build_current(
        class_oid: Oid,
        repr_id: i32,
        attributes: &[AttributeDef],
        constraints: &[ConstraintDef],
        is_shard_table: bool,
    ) -> CatalogResult<ClassRepr> {
        let live: Vec<&AttributeDef> = attributes.iter().filter(|a| !a.dropped).collect();

        let mut btid_rings: std::collections::HashMap<i32, BtidRing> =
            live.iter().map(|a| (a.id, BtidRing::new())).collect();
        for c in constraints {
            for id in &c.attr_ids {
                if let Some(ring) = btid_rings.get_mut(id) {
                    ring.push(c.btid);
                }
            }
        }

        let mut fixed: Vec<&AttributeDef> = live.iter().filter(|a| a.domain.data_type.fixed_disk_size().is_some()).copied().collect();
        fixed.sort_by_key(|a| a.id);
        let mut variable: Vec<&AttributeDef> = live.iter().filter(|a| a.domain.data_type.fixed_disk_size().is_none()).copied().collect();
        variable.sort_by_key(|a| a.id);

        let mut attribute_reprs = Vec::with_capacity(live.len());
        let mut fixed_length = 0usize;
        for a in &fixed {
            let size = a.domain.data_type.fixed_disk_size().unwrap();
            let offset = fixed_length;
            fixed_length += size;
            attribute_reprs.push(Self::finish_attribute(a, class_oid, AttrLocation::Fixed(offset), &mut btid_rings));
        }
        let n_variable = variable.len();
        for (slot, a) in variable.iter().enumerate() {
            attribute_reprs.push(Self::finish_attribute(a, class_oid, AttrLocation::Variable(slot), &mut btid_rings));
        }

        // Preserve definition order for consumers that iterate `attributes`
        // expecting declaration order rather than disk layout order.
        attribute_reprs.sort_by_key(|a| a.def_order);

        // §4.3: "Attribute ids that no longer exist (dropped columns)
        // are silently skipped" during the attribute-id -> name
        // resolution pass, rather than failing the whole constraint.
        let indexes: Vec<IndexRepr> = constraints
            .iter()
            .map(|c| {
                let mut atts = Vec::with_capacity(c.attr_ids.len());
                let mut asc_desc = Vec::with_capacity(c.asc_desc.len());
                for (id, dir) in c.attr_ids.iter().zip(c.asc_desc.iter()) {
                    if attribute_reprs.iter().any(|a| a.id == *id) {
                        atts.push(*id);
                        asc_desc.push(*dir);
                    }
                }
                IndexRepr { btid: c.btid, index_type: c.index_type, status: c.status, name: c.name.clone(), atts, asc_desc }
            })
            .collect();

        for idx in &indexes {
            if !idx.check_invariant() {
                return Err(CatalogError::Corrupted(format!(
                    "index {} has mismatched atts/asc_desc lengths",
                    idx.name
                )));
            }
        }

        Ok(ClassRepr { class_oid, repr_id, attributes: attribute_reprs, indexes, fixed_length, n_variable, is_shard_table })
    }

    fn finish_attribute(
        def: &AttributeDef,
        class_oid: Oid,
        location: AttrLocation,
        btid_rings: &mut std::collections::HashMap<i32, BtidRing>,
    ) -> AttributeRepr {
        let btids = btid_rings.remove(&def.id).map(|r| r.into_vec()).unwrap_or_default();
        let mut attr = AttributeRepr::reduced(def.id, location, def.id, def.domain.clone());
        attr.class_oid = class_oid;
        attr.default_value = def.default_value.clone();
        attr.current_default_value = def.current_default_value.clone();
        attr.n_btids = btids.len();
        attr.index_btid = btids.first().copied();
        attr.btids = btids;
        attr.is_notnull = def.is_notnull;
        attr.is_shard_key = def.is_shard_key;
        attr.name = def.name.clone();
        attr
    }

    /// Builds a historical (reduced) representation: id, type, domain,
    /// location and position only, no defaults, no btids (§3 "a reduced
    /// historical repr"). `repr_id` identifies which past snapshot this
    /// is, distinct from the class's current `repr_id`.
    pub fn build_historical(class_oid: Oid, repr_id: i32, attributes: &[AttributeDef], is_shard_table: bool) -> CatalogResult<ClassRepr> {
        let live: Vec<&AttributeDef> = attributes.iter().filter(|a| !a.dropped).collect();

        let mut fixed: Vec<&AttributeDef> = live.iter().filter(|a| a.domain.data_type.fixed_disk_size().is_some()).copied().collect();
        fixed.sort_by_key(|a| a.id);
        let mut variable: Vec<&AttributeDef> = live.iter().filter(|a| a.domain.data_type.fixed_disk_size().is_none()).copied().collect();
        variable.sort_by_key(|a| a.id);

        let mut attribute_reprs = Vec::with_capacity(live.len());
        let mut fixed_length = 0usize;
        for a in &fixed {
            let size = a.domain.data_type.fixed_disk_size().unwrap();
            let offset = fixed_length;
            fixed_length += size;
            attribute_reprs.push(AttributeRepr::reduced(a.id, AttrLocation::Fixed(offset), a.id, a.domain.clone()));
        }
        let n_variable = variable.len();
        for (slot, a) in variable.iter().enumerate() {
            attribute_reprs.push(AttributeRepr::reduced(a.id, AttrLocation::Variable(slot), a.id, a.domain.clone()));
        }
        attribute_reprs.sort_by_key(|a| a.def_order);

        Ok(ClassRepr { class_oid, repr_id, attributes: attribute_reprs, indexes: Vec::new(), fixed_length, n_variable, is_shard_table })
    }

    /// §4.3 "get_class_repr": picks `build_current` for the class's live
    /// `repr_id`, `build_historical` otherwise.
    pub fn get_class_repr(
        class_oid: Oid,
        requested_repr_id: i32,
        current_repr_id: i32,
        attributes: &[AttributeDef],
        constraints: &[ConstraintDef],
        is_shard_table: bool,
    ) -> CatalogResult<ClassRepr> {
        if requested_repr_id == current_repr_id {
            Self::build_current(class_oid, requested_repr_id, attributes, constraints, is_shard_table)
        } else {
            Self::build_historical(class_oid, requested_repr_id, attributes, is_shard_table)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::value::DomainType;

    fn int_attr(id: i32, name: &str) -> AttributeDef {
        AttributeDef {
            id,
            name: name.into(),
            domain: Arc::new(Domain::scalar(DomainType::Integer)),
            default_value: None,
            current_default_value: None,
            is_notnull: false,
            is_shard_key: false,
            dropped: false,
        }
    }

    fn varchar_attr(id: i32, name: &str) -> AttributeDef {
        AttributeDef {
            id,
            name: name.into(),
            domain: Arc::new(Domain::scalar(DomainType::Varchar)),
            default_value: None,
            current_default_value: None,
            is_notnull: false,
            is_shard_key: false,
            dropped: false,
        }
    }

    #[test]
    fn partitions_fixed_before_variable() {
        let attrs = vec![varchar_attr(2, "name"), int_attr(1, "id")];
        let repr = ClassReprBuilder::build_current(Oid::NULL, 0, &attrs, &[], false).unwrap();
        assert_eq!(repr.fixed_length, 4);
        assert_eq!(repr.n_variable, 1);
        assert!(matches!(repr.find_attribute(1).unwrap().location, AttrLocation::Fixed(0)));
        assert!(matches!(repr.find_attribute(2).unwrap().location, AttrLocation::Variable(0)));
    }

    #[test]
    fn dropped_attribute_is_excluded() {
        let mut dropped = int_attr(3, "old_col");
        dropped.dropped = true;
        let attrs = vec![int_attr(1, "id"), dropped];
        let repr = ClassReprBuilder::build_current(Oid::NULL, 0, &attrs, &[], false).unwrap();
        assert_eq!(repr.n_attributes(), 1);
        assert!(repr.find_attribute(3).is_none());
    }

    #[test]
    fn more_than_preallocated_indexes_spill_into_overflow_vec() {
        let attrs = vec![int_attr(1, "id")];
        let constraints: Vec<ConstraintDef> = (0..ATT_BTID_PREALLOC + 3)
            .map(|i| ConstraintDef {
                btid: Btid { vfid: i as i32, root_page_id: 0 },
                index_type: IndexType::Index,
                status: IndexStatus::Normal,
                name: format!("idx_{i}"),
                attr_ids: vec![1],
                asc_desc: vec![true],
            })
            .collect();
        let repr = ClassReprBuilder::build_current(Oid::NULL, 0, &attrs, &constraints, false).unwrap();
        let attr = repr.find_attribute(1).unwrap();
        assert_eq!(attr.n_btids, ATT_BTID_PREALLOC + 3);
    }

    #[test]
    fn unknown_constraint_attribute_is_silently_skipped() {
        let attrs = vec![int_attr(1, "id")];
        let constraints = vec![ConstraintDef {
            btid: Btid::NULL,
            index_type: IndexType::Index,
            status: IndexStatus::Normal,
            name: "idx_missing".into(),
            attr_ids: vec![1, 99],
            asc_desc: vec![true, false],
        }];
        let repr = ClassReprBuilder::build_current(Oid::NULL, 0, &attrs, &constraints, false).unwrap();
        let idx = &repr.indexes[0];
        assert_eq!(idx.atts, vec![1]);
        assert_eq!(idx.asc_desc, vec![true]);
        assert!(idx.check_invariant());
    }

    #[test]
    fn historical_repr_has_no_defaults_or_btids() {
        let attrs = vec![int_attr(1, "id")];
        let repr = ClassReprBuilder::build_historical(Oid::NULL, 3, &attrs, false).unwrap();
        let attr = repr.find_attribute(1).unwrap();
        assert!(attr.default_value.is_none());
        assert!(attr.btids.is_empty());
    }
}
