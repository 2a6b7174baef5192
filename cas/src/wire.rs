//! Typed wire payloads and the fixed reply layouts driver clients
//! expect (§5, §6).
use num_enum::{IntoPrimitive, TryFromPrimitive};

use common::err::{CasError, ErrorIndicator};
use common::value::{DomainType, OrValue, Value};

use crate::netbuf::NetBuf;

/// The wire-level type tag (`CCI_TYPE_*`), distinct from the internal
/// [`DomainType`]: drivers only ever see this narrower, stable set of
/// tags, independent of how many internal domain variants the catalog
/// engine grows over time (§5).
#[derive(IntoPrimitive, TryFromPrimitive, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(i8)]
pub enum CciType {
    Null = 0,
    Char = 1,
    String = 2,
    Numeric = 3,
    Int = 4,
    Short = 5,
    Bigint = 10,
    Double = 11,
    Float = 12,
    Date = 13,
    Time = 14,
    Timestamp = 15,
    Datetime = 16,
    Set = 17,
    Oid = 18,
}

impl From<DomainType> for CciType {
    fn from(d: DomainType) -> Self {
        match d {
            DomainType::Null => CciType::Null,
            DomainType::Integer => CciType::Int,
            DomainType::BigInt => CciType::Bigint,
            DomainType::Short => CciType::Short,
            DomainType::Double => CciType::Double,
            DomainType::Float => CciType::Float,
            DomainType::Numeric => CciType::Numeric,
            DomainType::Char => CciType::Char,
            DomainType::Varchar => CciType::String,
            DomainType::Date => CciType::Date,
            DomainType::Time => CciType::Time,
            DomainType::Timestamp => CciType::Timestamp,
            DomainType::Datetime => CciType::Datetime,
            DomainType::Set => CciType::Set,
            DomainType::Oid => CciType::Oid,
            DomainType::Variable => CciType::Oid,
        }
    }
}

/// One `db_attribute`-shaped result-set column descriptor, encoded for
/// a prepare/execute reply (§5, §4.3's attribute-name resolution feeds
/// this from the class representation).
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub cci_type: CciType,
    pub scale: i16,
    pub precision: i32,
    pub name: String,
}

impl ColumnInfo {
    pub fn encode(&self, buf: &mut NetBuf) {
        buf.put_i8(self.cci_type as i8);
        buf.put_i16(self.scale);
        buf.put_i32(self.precision);
        buf.put_cas_string(&self.name);
    }
}

/// Encodes one scalar `Value` onto the wire as `type:i8 | payload` (§6
/// "Typed payloads follow `CCI_TYPE_*`"). `Oid` values use the same
/// 10-byte layout [`catalog::record::codec`] uses on disk; `Set`
/// recurses through [`encode_or_value`] so a fetched subset column
/// comes back exactly as nested as it went in.
pub fn encode_value(buf: &mut NetBuf, value: &Value) {
    buf.put_i8(CciType::from(value.data_type()) as i8);
    match value {
        Value::Null => {}
        Value::Integer(v) => buf.put_i32(*v),
        Value::BigInt(v) => buf.put_i64(*v),
        Value::Short(v) => buf.put_i16(*v),
        Value::Double(v) => buf.put_f64(*v),
        Value::Float(v) => buf.put_f64(*v as f64),
        Value::Numeric(s) => buf.put_cas_string(s),
        Value::Varchar(s) => buf.put_cas_string(s),
        Value::Date(v) => buf.put_i32(*v),
        Value::Time(v) => buf.put_i32(*v),
        Value::Timestamp(v) => buf.put_i64(*v),
        Value::Datetime(v) => buf.put_i64(*v),
        Value::Oid(oid) => {
            buf.put_i16(oid.volume_id);
            buf.put_i32(oid.page_id);
            buf.put_i16(oid.slot_id);
            buf.put_i32(oid.group_id);
        }
        Value::Set(elements) => {
            buf.put_i32(elements.len() as i32);
            for element in elements {
                encode_value(buf, element);
            }
        }
    }
}

/// Encodes an [`OrValue`] (§9's scalar/subset union): a subset is a
/// count-prefixed run of its own kind, recursively, rather than a
/// `Value::Set` of scalars.
pub fn encode_or_value(buf: &mut NetBuf, value: &OrValue) {
    match value {
        OrValue::Scalar(v) => {
            buf.put_i8(0); // §9 discriminant: 0 = scalar, 1 = subset
            encode_value(buf, v);
        }
        OrValue::Subset(elements) => {
            buf.put_i8(1);
            buf.put_i32(elements.len() as i32);
            for element in elements {
                encode_or_value(buf, element);
            }
        }
    }
}

/// §6 body layout: `ERROR:i8 | indicator:i32 | code:i32 | msglen:i32 |
/// msg:msglen`. `indicator` distinguishes a CAS-side failure from a
/// DBMS-side one (mirroring [`common::err::ErrorIndicator`]); `code` is
/// the negative wire code within that namespace.
pub struct ErrorReply {
    pub indicator: i32,
    pub code: i32,
    pub message: String,
}

/// Leading tag byte that marks a reply body as an error (§6).
const ERROR_TAG: i8 = -1;

impl ErrorReply {
    /// Builds the wire reply for a dispatched request that failed,
    /// translating [`ErrorIndicator`] into the wire's signed convention
    /// (§6, §7: CAS-side errors are distinguished from DBMS-side ones).
    pub fn from_cas_error(err: &CasError) -> Self {
        let indicator = match err.indicator() {
            ErrorIndicator::Cas => -1,
            ErrorIndicator::Dbms => -2,
        };
        ErrorReply { indicator, code: err.code(), message: err.to_string() }
    }

    pub fn encode(&self, buf: &mut NetBuf) {
        buf.put_i8(ERROR_TAG);
        buf.put_i32(self.indicator);
        buf.put_i32(self.code);
        buf.put_cas_string(&self.message);
    }
}

/// Width of the `session` field on the wire (§6: "`session_size:i32
/// (=12)`"), one 8-byte session key plus a 4-byte session id.
const CONNECT_REPLY_SESSION_SIZE: i32 = 12;

/// §6 "Connect reply body", sent once the handshake and DB connect
/// (§4.6 steps 1-6) succeed (step 7: "send back server info... as the
/// connect reply").
pub struct ConnectReplyBody {
    pub major: i16,
    pub minor: i16,
    pub patch: i16,
    pub build: i16,
    /// Broker shared-memory slot this CAS occupies; the wire field is
    /// 1-based (`shm_index+1:i32` in §6), this field stays 0-based.
    pub shm_index: i32,
    pub pid: i32,
    pub session: crate::conn::session::SessionKey,
    pub dbms_type: i8,
    pub holdable_result_support: bool,
    pub statement_pooling: bool,
    pub autocommit_default: bool,
    pub server_start_time: i32,
}

impl ConnectReplyBody {
    pub fn encode(&self, buf: &mut NetBuf) {
        buf.put_i16(self.major);
        buf.put_i16(self.minor);
        buf.put_i16(self.patch);
        buf.put_i16(self.build);
        buf.put_i32(self.shm_index + 1);
        buf.put_i32(self.pid);
        buf.put_i32(CONNECT_REPLY_SESSION_SIZE);
        buf.put_bytes(&self.session.to_wire_bytes());
        buf.put_i8(self.dbms_type);
        buf.put_i8(self.holdable_result_support as i8);
        buf.put_i8(self.statement_pooling as i8);
        buf.put_i8(self.autocommit_default as i8);
        buf.put_i32(self.server_start_time);
    }
}
