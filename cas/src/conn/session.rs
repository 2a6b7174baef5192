//! Session state produced by a successful handshake (§6).
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Driver family the client identified itself as during step 2 of the
/// handshake (§6). Only affects which wire quirks the dispatcher
/// tolerates; every client type speaks the same framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(i8)]
pub enum ClientType {
    Cci = 0,
    Odbc = 1,
    Jdbc = 2,
    Oledb = 3,
    /// Internal replication path (§6 "replication-broker"): skips
    /// normal user authentication, used only for broker-to-broker
    /// replica feeds.
    ReplicationBroker = 4,
}

/// DB connect mode requested in step 5 of the handshake (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbConnectMode {
    ReadWrite,
    ReadOnly,
    SlaveOnly,
    ReplicaOnly,
}

/// Opaque per-connection key handed back to the client in the connect
/// reply and presented on every subsequent request as a lightweight
/// proof of an established session (§6): "an 8-byte server session key
/// plus a 4-byte session id are exchanged" — 12 bytes on the wire
/// (`session_size:i32(=12)` in §6's connect reply body), not one
/// opaque blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub key: [u8; 8],
    /// Assigned by the server when the session is established; a
    /// reconnecting client echoes a prior non-zero id back to resume
    /// that session's state instead of minting a new one.
    pub session_id: i32,
}

impl SessionKey {
    /// Mints a session from a monotonically increasing per-process
    /// counter (`seed`): the counter both seeds the key bytes and
    /// becomes the session id the client echoes back on every later
    /// request.
    pub fn from_seed(seed: u64) -> Self {
        SessionKey { key: seed.to_be_bytes(), session_id: seed as i32 }
    }

    /// Resumes a session the client already holds a session id for.
    pub fn resumed(key: [u8; 8], session_id: i32) -> Self {
        SessionKey { key, session_id }
    }

    /// The 12-byte wire form: 8-byte key followed by the 4-byte,
    /// big-endian session id.
    pub fn to_wire_bytes(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..8].copy_from_slice(&self.key);
        out[8..].copy_from_slice(&self.session_id.to_be_bytes());
        out
    }
}

#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub client_type: ClientType,
    pub connect_mode: DbConnectMode,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
}

/// The established session a CAS process tracks for the lifetime of a
/// client connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub client_type: ClientType,
    pub connect_mode: DbConnectMode,
    pub db_name: String,
    pub db_user: String,
}
