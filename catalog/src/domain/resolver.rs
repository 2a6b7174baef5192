//! C2 Domain Resolver (§4.2): domain interning, attribute-default
//! resolution, and value coercion into index-key form.
use std::sync::Arc;

use dashmap::DashMap;

use common::value::{Domain, DomainType, Value};

use crate::error::{CatalogError, CatalogResult};

/// Interning key: two domains with the same shape should resolve to
/// the same `Arc<Domain>` (§4.2: "domains are interned once built").
/// `class_oid` participates because two `object`-typed domains over
/// different classes are not interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DomainKey {
    data_type: DomainType,
    precision: i32,
    scale: i32,
    collation: i32,
    class_oid: Option<common::oid::Oid>,
}

impl From<&Domain> for DomainKey {
    fn from(d: &Domain) -> Self {
        DomainKey { data_type: d.data_type, precision: d.precision, scale: d.scale, collation: d.collation, class_oid: d.class_oid }
    }
}

/// Caller-owned cache mapping a domain's shape to its canonical
/// `Arc<Domain>` instance (§4.2). One resolver is shared across a
/// class representation engine session; it is never cleared, only
/// grown, since domains are immutable once defined.
#[derive(Default)]
pub struct DomainResolver {
    cache: DashMap<DomainKey, Arc<Domain>>,
}

impl DomainResolver {
    pub fn new() -> Self {
        DomainResolver { cache: DashMap::new() }
    }

    /// Returns the canonical shared instance for `domain`, inserting it
    /// if this is the first time its shape has been seen.
    pub fn intern(&self, domain: Domain) -> Arc<Domain> {
        let key = DomainKey::from(&domain);
        if let Some(existing) = self.cache.get(&key) {
            return existing.clone();
        }
        let arc = Arc::new(domain);
        self.cache.entry(key).or_insert_with(|| arc.clone()).clone()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// §4.2 "resolve_default": the type-level default value, used when
    /// an attribute has no `DEFAULT` clause and no current-default
    /// override. `Set`-typed attributes default to an empty subset, not
    /// `Null` (a set column without elements is not the same as an
    /// unknown set).
    pub fn resolve_default(data_type: DomainType) -> Value {
        match data_type {
            DomainType::Integer => Value::Integer(0),
            DomainType::BigInt => Value::BigInt(0),
            DomainType::Short => Value::Short(0),
            DomainType::Double => Value::Double(0.0),
            DomainType::Float => Value::Float(0.0),
            DomainType::Numeric => Value::Numeric("0".to_string()),
            DomainType::Varchar | DomainType::Char => Value::Varchar(String::new()),
            DomainType::Set => Value::Set(Vec::new()),
            _ => Value::Null,
        }
    }

    /// §4.2 "coerce_to_idxkey": coerces `value` (carrying `source_collation`,
    /// meaningful only for char-typed values) into the representation
    /// expected by `domain` for use as an index key.
    ///
    /// Rules:
    /// - char-typed domains reject any non-char value (`CannotCoerce`).
    /// - a char value with a collation that differs from the domain's
    ///   declared collation is also rejected, rather than silently
    ///   re-collated.
    /// - numeric and date/time types freely interconvert (`§4.2`); a
    ///   numeric value coerced into a date/time domain reparses its
    ///   decimal-string form, and vice versa.
    /// - anything else is a straight type mismatch.
    pub fn coerce_to_idxkey(&self, value: &Value, source_collation: i32, domain: &Domain) -> CatalogResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        if domain.data_type.is_char() {
            return match value {
                Value::Varchar(s) => {
                    if source_collation != domain.collation {
                        Err(CatalogError::IncompatibleCollations(source_collation, domain.collation))
                    } else {
                        Ok(Value::Varchar(s.clone()))
                    }
                }
                other => Err(CatalogError::CannotCoerce { from: other.data_type(), to: domain.data_type }),
            };
        }

        if domain.data_type.is_numeric_or_datetime() {
            if !value.data_type().is_numeric_or_datetime() {
                return Err(CatalogError::CannotCoerce { from: value.data_type(), to: domain.data_type });
            }
            return Self::coerce_numeric_or_datetime(value, domain.data_type);
        }

        if value.data_type() == domain.data_type {
            return Ok(value.clone());
        }

        Err(CatalogError::CannotCoerce { from: value.data_type(), to: domain.data_type })
    }

    fn coerce_numeric_or_datetime(value: &Value, to: DomainType) -> CatalogResult<Value> {
        if value.data_type() == to {
            return Ok(value.clone());
        }
        let as_i64 = match value {
            Value::Integer(v) => *v as i64,
            Value::BigInt(v) => *v,
            Value::Short(v) => *v as i64,
            Value::Double(v) => *v as i64,
            Value::Float(v) => *v as i64,
            Value::Date(v) => *v as i64,
            Value::Time(v) => *v as i64,
            Value::Timestamp(v) => *v,
            Value::Datetime(v) => *v,
            Value::Numeric(s) => s.parse::<i64>().map_err(|_| CatalogError::CannotCoerce { from: value.data_type(), to })?,
            _ => return Err(CatalogError::CannotCoerce { from: value.data_type(), to }),
        };
        Ok(match to {
            DomainType::Integer => Value::Integer(as_i64 as i32),
            DomainType::BigInt => Value::BigInt(as_i64),
            DomainType::Short => Value::Short(as_i64 as i16),
            DomainType::Double => Value::Double(as_i64 as f64),
            DomainType::Float => Value::Float(as_i64 as f32),
            DomainType::Numeric => Value::Numeric(as_i64.to_string()),
            DomainType::Date => Value::Date(as_i64 as i32),
            DomainType::Time => Value::Time(as_i64 as i32),
            DomainType::Timestamp => Value::Timestamp(as_i64),
            DomainType::Datetime => Value::Datetime(as_i64),
            other => return Err(CatalogError::CannotCoerce { from: value.data_type(), to: other }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_returns_the_same_instance_for_equal_shapes() {
        let resolver = DomainResolver::new();
        let a = resolver.intern(Domain::scalar(DomainType::Integer));
        let b = resolver.intern(Domain::scalar(DomainType::Integer));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(resolver.cached_len(), 1);
    }

    #[test]
    fn default_for_varchar_is_empty_string_not_null() {
        assert_eq!(DomainResolver::resolve_default(DomainType::Varchar), Value::Varchar(String::new()));
    }

    #[test]
    fn char_domain_rejects_integer_value() {
        let resolver = DomainResolver::new();
        let domain = Domain::scalar(DomainType::Varchar);
        let err = resolver.coerce_to_idxkey(&Value::Integer(1), 0, &domain).unwrap_err();
        assert!(matches!(err, CatalogError::CannotCoerce { .. }));
    }

    #[test]
    fn char_domain_rejects_collation_mismatch() {
        let resolver = DomainResolver::new();
        let domain = Domain { collation: 1, ..Domain::scalar(DomainType::Varchar) };
        let err = resolver.coerce_to_idxkey(&Value::Varchar("x".into()), 0, &domain).unwrap_err();
        assert!(matches!(err, CatalogError::IncompatibleCollations(0, 1)));
    }

    #[test]
    fn numeric_coerces_into_date_domain() {
        let resolver = DomainResolver::new();
        let domain = Domain::scalar(DomainType::Date);
        let coerced = resolver.coerce_to_idxkey(&Value::Integer(19840), 0, &domain).unwrap();
        assert_eq!(coerced, Value::Date(19840));
    }

    #[test]
    fn null_coerces_to_null_regardless_of_domain() {
        let resolver = DomainResolver::new();
        let domain = Domain::scalar(DomainType::Integer);
        assert_eq!(resolver.coerce_to_idxkey(&Value::Null, 0, &domain).unwrap(), Value::Null);
    }
}
