pub mod codec;
pub mod header;

pub use codec::{decode_to_values, encode_from_values, overwrite_group_id, read_group_id};
pub use header::RecordHeader;
