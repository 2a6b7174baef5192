//! C5 Net Buffer (§5): a growable write buffer for building CAS
//! response messages, growing in [`NET_BUF_EXTRA_SIZE`] increments the
//! way the broker/CAS wire layer always has, plus the big-endian wire
//! integer helpers every message writer builds on.
use bytes::{BufMut, BytesMut};
use byteorder::{BigEndian, ByteOrder};

/// Growth increment for the write buffer (§5), recovered from
/// `NET_BUF_EXTRA_SIZE` in `cas_net_buf.c`.
pub const NET_BUF_EXTRA_SIZE: usize = 65536;

/// A growable, big-endian write buffer. All CAS wire integers are
/// network byte order regardless of host endianness.
#[derive(Debug, Default)]
pub struct NetBuf {
    data: BytesMut,
}

impl NetBuf {
    pub fn new() -> Self {
        NetBuf { data: BytesMut::with_capacity(NET_BUF_EXTRA_SIZE) }
    }

    fn ensure_capacity(&mut self, additional: usize) {
        let remaining = self.data.capacity() - self.data.len();
        if remaining < additional {
            let deficit = additional - remaining;
            let chunks = deficit / NET_BUF_EXTRA_SIZE + 1;
            self.data.reserve(chunks * NET_BUF_EXTRA_SIZE);
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data.to_vec()
    }

    pub fn put_i8(&mut self, v: i8) {
        self.ensure_capacity(1);
        self.data.put_i8(v);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.ensure_capacity(2);
        self.data.put_i16(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.ensure_capacity(4);
        self.data.put_i32(v);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.ensure_capacity(8);
        self.data.put_i64(v);
    }

    pub fn put_f64(&mut self, v: f64) {
        self.ensure_capacity(8);
        self.data.put_f64(v);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.ensure_capacity(bytes.len());
        self.data.put_slice(bytes);
    }

    /// Length-prefixed string: `len:i32 | utf8 bytes | \0`, the CAS
    /// wire convention for `CCI_TYPE_STRING`/`CCI_TYPE_VARCHAR` values
    /// and for message field names (§5).
    pub fn put_cas_string(&mut self, s: &str) {
        self.put_i32(s.len() as i32 + 1);
        self.put_bytes(s.as_bytes());
        self.put_i8(0);
    }

    /// Patches 4 bytes at `offset` in place (§5's
    /// `net_buf_overwrite_int`), used to backfill the `body_size` field
    /// once a message's true length is known.
    pub fn overwrite_i32(&mut self, offset: usize, v: i32) {
        let mut tmp = [0u8; 4];
        BigEndian::write_i32(&mut tmp, v);
        self.data[offset..offset + 4].copy_from_slice(&tmp);
    }
}

/// Reads a big-endian `i32` from the front of `buf`, the framing
/// header's `body_size` field (§5).
pub fn read_body_size(buf: &[u8]) -> Option<i32> {
    if buf.len() < 4 {
        return None;
    }
    Some(BigEndian::read_i32(&buf[0..4]))
}

/// Width in bytes of the `status_info` field (§6: "`S == 16` on
/// current versions"). It carries transaction status, server node id,
/// and shard-info version.
pub const STATUS_INFO_SIZE: usize = 16;

/// Per-connection transaction/shard status carried in every reply's
/// framing header (§6), not just error replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusInfo {
    pub active_transaction: bool,
    pub server_node_id: i32,
    pub shard_info_version: i32,
}

impl StatusInfo {
    fn encode(&self, buf: &mut NetBuf) {
        buf.put_i8(self.active_transaction as i8);
        buf.put_bytes(&[0u8; 3]); // pad to a 4-byte-aligned i32 field
        buf.put_i32(self.server_node_id);
        buf.put_i32(self.shard_info_version);
        buf.put_i32(0); // reserved, rounds the block out to STATUS_INFO_SIZE (§6 "S == 16")
    }
}

/// Assembles one framed CAS response: `body_size:i32 | status_info:S |
/// body` (§6, `S == 16`).
pub struct MessageWriter {
    buf: NetBuf,
    body_start: usize,
}

impl MessageWriter {
    pub fn begin(status: StatusInfo) -> Self {
        let mut buf = NetBuf::new();
        buf.put_i32(0); // body_size placeholder, patched in `finish`
        let body_start = buf.len();
        status.encode(&mut buf);
        debug_assert_eq!(buf.len() - body_start, STATUS_INFO_SIZE);
        MessageWriter { buf, body_start }
    }

    pub fn buf_mut(&mut self) -> &mut NetBuf {
        &mut self.buf
    }

    pub fn finish(mut self) -> Vec<u8> {
        let body_size = (self.buf.len() - self.body_start) as i32;
        self.buf.overwrite_i32(0, body_size);
        self.buf.into_vec()
    }
}

/// Companion cursor for reading a request's decoded arguments back out
/// (§5 "reads use a companion cursor with matched `get_*`"). Unlike
/// [`NetBuf`], this borrows its bytes rather than owning them — a
/// request body is already fully received before decoding starts.
pub struct NetBufReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> NetBufReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        NetBufReader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn need(&self, n: usize) -> Result<(), String> {
        if self.remaining() < n {
            Err(format!("truncated read: need {n} bytes, have {}", self.remaining()))
        } else {
            Ok(())
        }
    }

    pub fn get_i8(&mut self) -> Result<i8, String> {
        self.need(1)?;
        let v = self.data[self.pos] as i8;
        self.pos += 1;
        Ok(v)
    }

    pub fn get_i16(&mut self) -> Result<i16, String> {
        self.need(2)?;
        let v = BigEndian::read_i16(&self.data[self.pos..self.pos + 2]);
        self.pos += 2;
        Ok(v)
    }

    pub fn get_i32(&mut self) -> Result<i32, String> {
        self.need(4)?;
        let v = BigEndian::read_i32(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(v)
    }

    pub fn get_i64(&mut self) -> Result<i64, String> {
        self.need(8)?;
        let v = BigEndian::read_i64(&self.data[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(v)
    }

    pub fn get_f64(&mut self) -> Result<f64, String> {
        self.need(8)?;
        let v = BigEndian::read_f64(&self.data[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(v)
    }

    /// Reads one length-prefixed argument (`len:i32 | bytes[len]`, §6
    /// Body layout) and returns the raw bytes, unparsed.
    pub fn get_arg(&mut self) -> Result<&'a [u8], String> {
        let len = self.get_i32()? as usize;
        self.need(len)?;
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Reads a length-prefixed, NUL-terminated CAS string (§5
    /// `put_cas_string`'s counterpart).
    pub fn get_cas_string(&mut self) -> Result<String, String> {
        let bytes = self.get_arg()?;
        if bytes.is_empty() {
            return Ok(String::new());
        }
        let without_nul = &bytes[..bytes.len() - 1];
        std::str::from_utf8(without_nul).map(|s| s.to_string()).map_err(|e| format!("invalid utf8: {e}"))
    }
}
