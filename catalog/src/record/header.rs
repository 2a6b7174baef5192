//! The packed-record header word and its companion constants (§3
//! "Packed record", §4.1 step 1).

/// Offset size is 4 bytes throughout (§3); every record is checked
/// against this constant on decode (§4.1 step 1: "verify
/// `offset_size == 4`").
pub const BIG_VAR_OFFSET_SIZE: usize = 4;

/// Preallocated ring size for per-attribute btid lists before a
/// constraint spills to heap allocation (§4.3), recovered from
/// `OR_ATT_BTID_PREALLOC` in `object_representation_sr.h`.
pub const ATT_BTID_PREALLOC: usize = 8;

/// Handle-table growth chunk (§4.8), recovered from
/// `SRV_HANDLE_ALLOC_SIZE` in `cas_handle.c`.
pub const SRV_HANDLE_ALLOC_SIZE: usize = 256;

const BOUND_BIT_FLAG_MASK: u32 = 0x1;
// One bit: set means the record's variable offsets are
// `BIG_VAR_OFFSET_SIZE` (4) bytes wide, clear means the narrower 2-byte
// offsets this codec doesn't support. A 2-bit literal byte count would
// collide with `REPR_ID_SHIFT` the moment the value reaches 4, so the
// header carries a size *class* rather than the literal size (§3, §4.1
// step 1).
const OFFSET_SIZE_FLAG_MASK: u32 = 0x2;
const OFFSET_SIZE_SHIFT: u32 = 1;
const REPR_ID_SHIFT: u32 = 2;

const SMALL_VAR_OFFSET_SIZE: usize = 2;

/// `(repr_id << n) | offset_size_bits | bound_bit_flag` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub repr_id: i32,
    pub offset_size: usize,
    pub bound_bit_flag: bool,
}

impl RecordHeader {
    pub fn new(repr_id: i32, bound_bit_flag: bool) -> Self {
        RecordHeader { repr_id, offset_size: BIG_VAR_OFFSET_SIZE, bound_bit_flag }
    }

    pub fn encode(&self) -> u32 {
        let offset_size_flag = (self.offset_size == BIG_VAR_OFFSET_SIZE) as u32;
        ((self.repr_id as u32) << REPR_ID_SHIFT)
            | (offset_size_flag << OFFSET_SIZE_SHIFT)
            | (self.bound_bit_flag as u32)
    }

    /// Returns `Err` when the offset size isn't the one this codec
    /// supports (§4.1 step 1).
    pub fn decode(word: u32) -> Result<Self, usize> {
        let offset_size =
            if word & OFFSET_SIZE_FLAG_MASK != 0 { BIG_VAR_OFFSET_SIZE } else { SMALL_VAR_OFFSET_SIZE };
        if offset_size != BIG_VAR_OFFSET_SIZE {
            return Err(offset_size);
        }
        let bound_bit_flag = (word & BOUND_BIT_FLAG_MASK) != 0;
        let repr_id = (word >> REPR_ID_SHIFT) as i32;
        Ok(RecordHeader { repr_id, offset_size, bound_bit_flag })
    }
}
