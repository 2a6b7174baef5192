//! The scalar value/domain model shared by the record codec and the
//! catalog mirror (§3 "Domain", §9 "Discriminated variants instead of
//! inheritance").
use std::sync::Arc;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

use crate::oid::Oid;

/// A class domain's base type. `Variable` is the placeholder domain
/// recognised during self-reference decoding (§3, §4.4).
#[derive(IntoPrimitive, TryFromPrimitive, Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum DomainType {
    Null = 0,
    Integer = 1,
    BigInt = 2,
    Short = 3,
    Double = 4,
    Float = 5,
    Numeric = 6,
    Char = 7,
    Varchar = 8,
    Date = 9,
    Time = 10,
    Timestamp = 11,
    Datetime = 12,
    Set = 13,
    Oid = 14,
    /// Self-reference placeholder (§3, §4.4): recognised during decode
    /// and rewritten to carry the freshly allocated `root_oid`.
    Variable = 15,
}

impl DomainType {
    /// §4.2: "Char-typed attributes reject non-char values."
    pub fn is_char(&self) -> bool {
        matches!(self, DomainType::Char | DomainType::Varchar)
    }

    /// §4.2: "numeric coerce is allowed from numeric or date/time types."
    pub fn is_numeric_or_datetime(&self) -> bool {
        matches!(
            self,
            DomainType::Integer
                | DomainType::BigInt
                | DomainType::Short
                | DomainType::Double
                | DomainType::Float
                | DomainType::Numeric
                | DomainType::Date
                | DomainType::Time
                | DomainType::Timestamp
                | DomainType::Datetime
        )
    }

    /// Fixed on-disk size in bytes for this type when stored in the
    /// fixed region of a packed record (§3 "Packed record"). Variable
    /// and collection types have no fixed disk size.
    pub fn fixed_disk_size(&self) -> Option<usize> {
        match self {
            DomainType::Null => Some(0),
            DomainType::Integer | DomainType::Float | DomainType::Date | DomainType::Time => Some(4),
            DomainType::BigInt | DomainType::Double | DomainType::Timestamp | DomainType::Datetime => Some(8),
            DomainType::Short => Some(2),
            DomainType::Oid => Some(10), // volume_id:i16 + page_id:i32 + slot_id:i16 + group_id:i32
            DomainType::Numeric | DomainType::Char | DomainType::Varchar | DomainType::Set | DomainType::Variable => {
                None
            }
        }
    }
}

/// `(type, precision, scale, collation, class_oid?, setdomain?)` (§3).
/// Domains are interned (§4.2): once built, a domain tree is passed
/// through [`crate::value`]'s caller-owned cache and the canonical,
/// shared instance is used thereafter — hence `Arc` for nested
/// `set_domain` entries rather than owned recursion.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub data_type: DomainType,
    pub precision: i32,
    pub scale: i32,
    pub collation: i32,
    pub class_oid: Option<Oid>,
    pub set_domain: Vec<Arc<Domain>>,
}

impl Domain {
    pub fn scalar(data_type: DomainType) -> Self {
        Domain { data_type, precision: 0, scale: 0, collation: 0, class_oid: None, set_domain: Vec::new() }
    }

    pub fn with_precision_scale(data_type: DomainType, precision: i32, scale: i32) -> Self {
        Domain { precision, scale, ..Domain::scalar(data_type) }
    }

    pub fn set_of(element: Arc<Domain>) -> Self {
        Domain { set_domain: vec![element], ..Domain::scalar(DomainType::Set) }
    }
}

/// A decoded scalar value. `Numeric` keeps its original decimal-string
/// representation rather than a lossy float, the same design the
/// teacher uses for `Value::Decimal` in `schema::data_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i32),
    BigInt(i64),
    Short(i16),
    Double(f64),
    Float(f32),
    Numeric(String),
    Varchar(String),
    Date(i32),
    Time(i32),
    Timestamp(i64),
    Datetime(i64),
    Oid(Oid),
    Set(Vec<Value>),
}

impl Value {
    pub fn data_type(&self) -> DomainType {
        match self {
            Value::Null => DomainType::Null,
            Value::Integer(_) => DomainType::Integer,
            Value::BigInt(_) => DomainType::BigInt,
            Value::Short(_) => DomainType::Short,
            Value::Double(_) => DomainType::Double,
            Value::Float(_) => DomainType::Float,
            Value::Numeric(_) => DomainType::Numeric,
            Value::Varchar(_) => DomainType::Varchar,
            Value::Date(_) => DomainType::Date,
            Value::Time(_) => DomainType::Time,
            Value::Timestamp(_) => DomainType::Timestamp,
            Value::Datetime(_) => DomainType::Datetime,
            Value::Oid(_) => DomainType::Oid,
            Value::Set(_) => DomainType::Set,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// The parallel id union from §9: a subset's elements are keyed either
/// by the class they belong to (root of a cascade) or by an attribute
/// id (constraints persist attribute ids, not names — §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKey {
    ClassOid(Oid),
    AttrId(i32),
}

/// `OrValue` is a tagged union `{ scalar(Value) | subset(Vec<OrValue>) }`
/// (§9), replacing the C `IS_SUBSET` macro with pattern matching. Used
/// both as the decoded form of a packed record (§4.1) and as the tree
/// the catalog mirror builds and tears down (§4.4).
#[derive(Debug, Clone, PartialEq)]
pub enum OrValue {
    Scalar(Value),
    Subset(Vec<OrValue>),
}

impl OrValue {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            OrValue::Scalar(v) => Some(v),
            OrValue::Subset(_) => None,
        }
    }

    pub fn as_subset(&self) -> Option<&[OrValue]> {
        match self {
            OrValue::Subset(v) => Some(v),
            OrValue::Scalar(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, OrValue::Scalar(Value::Null))
    }
}
