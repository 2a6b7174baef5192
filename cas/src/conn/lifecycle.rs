//! C6 Connection Lifecycle (§6): broker-to-CAS fd handoff, the seven
//! handshake steps, ACL enforcement, and session establishment.
use byteorder::{BigEndian, ByteOrder};

use common::err::{CasError, CResult};

use crate::conn::session::{ClientType, ConnectRequest, DbConnectMode, Session, SessionKey};

/// Step 1 (§6): "the broker accepts the client connection and hands
/// the already-connected socket to a CAS process via `SCM_RIGHTS`" —
/// CAS processes never listen themselves, they only ever receive an
/// already-established client fd from the broker that spawned them.
pub trait BrokerHandoff: Send + Sync {
    fn receive_client_fd(&self) -> CResult<std::os::unix::io::RawFd>;
}

/// Real handoff over a Unix-domain control socket between broker and
/// CAS, using `recvmsg`/`SCM_RIGHTS` ancillary data to receive the
/// client socket fd.
#[cfg(unix)]
pub struct UnixScmHandoff {
    control_fd: std::os::unix::io::RawFd,
}

#[cfg(unix)]
impl UnixScmHandoff {
    pub fn new(control_fd: std::os::unix::io::RawFd) -> Self {
        UnixScmHandoff { control_fd }
    }
}

#[cfg(unix)]
impl BrokerHandoff for UnixScmHandoff {
    fn receive_client_fd(&self) -> CResult<std::os::unix::io::RawFd> {
        use std::mem::MaybeUninit;

        let mut iobuf = [0u8; 1];
        let mut iov = libc::iovec { iov_base: iobuf.as_mut_ptr() as *mut libc::c_void, iov_len: iobuf.len() };

        const CMSG_SPACE: usize = 64;
        let mut cmsg_buf = [0u8; CMSG_SPACE];

        let mut msg: libc::msghdr = unsafe { MaybeUninit::zeroed().assume_init() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = cmsg_buf.len() as _;

        let n = unsafe { libc::recvmsg(self.control_fd, &mut msg, 0) };
        if n < 0 {
            return Err(CasError::Communication(std::io::Error::last_os_error().to_string()));
        }

        let mut cmsg_ptr = unsafe { libc::CMSG_FIRSTHDR(&msg) };
        while !cmsg_ptr.is_null() {
            let cmsg = unsafe { &*cmsg_ptr };
            if cmsg.cmsg_level == libc::SOL_SOCKET && cmsg.cmsg_type == libc::SCM_RIGHTS {
                let data_ptr = unsafe { libc::CMSG_DATA(cmsg_ptr) } as *const std::os::unix::io::RawFd;
                let fd = unsafe { *data_ptr };
                return Ok(fd);
            }
            cmsg_ptr = unsafe { libc::CMSG_NXTHDR(&msg, cmsg_ptr) };
        }

        Err(CasError::Communication("broker handoff carried no SCM_RIGHTS fd".into()))
    }
}

/// Step 4 (§6): the broker's access-control list, checked before any
/// DB authentication is attempted.
pub trait AclChecker: Send + Sync {
    fn is_allowed(&self, db_name: &str, client_type: ClientType) -> bool;
}

/// Step 6 (§6): delegated DBMS authentication. Out of scope here is
/// *how* credentials are checked; this is the seam the CAS process
/// calls through.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, request: &ConnectRequest) -> CResult<()>;
}

/// Protocol magic every handshake packet starts with (§6 step 2).
const HANDSHAKE_MAGIC: &[u8; 4] = b"CUBC";

fn client_type_from_byte(b: i8) -> CResult<ClientType> {
    ClientType::try_from(b).map_err(|_| CasError::Args(format!("unknown client type {b}")))
}

fn connect_mode_from_byte(b: i8) -> CResult<DbConnectMode> {
    Ok(match b {
        0 => DbConnectMode::ReadWrite,
        1 => DbConnectMode::ReadOnly,
        2 => DbConnectMode::SlaveOnly,
        3 => DbConnectMode::ReplicaOnly,
        other => return Err(CasError::Args(format!("unknown connect mode {other}"))),
    })
}

fn read_cas_string<'a>(bytes: &'a [u8], pos: &mut usize) -> CResult<&'a str> {
    if *pos + 4 > bytes.len() {
        return Err(CasError::Communication("truncated string length".into()));
    }
    let len = BigEndian::read_i32(&bytes[*pos..*pos + 4]) as usize;
    *pos += 4;
    if *pos + len > bytes.len() || len == 0 {
        return Err(CasError::Communication("truncated string body".into()));
    }
    let s = std::str::from_utf8(&bytes[*pos..*pos + len - 1])
        .map_err(|e| CasError::Communication(format!("invalid utf8: {e}")))?;
    *pos += len;
    Ok(s)
}

/// Steps 2-5 (§6): parses the client's handshake+connect-request
/// packet (magic, protocol version, client type, connect mode, db
/// name/user/password).
pub fn parse_connect_request(bytes: &[u8]) -> CResult<ConnectRequest> {
    if bytes.len() < 6 || &bytes[0..4] != HANDSHAKE_MAGIC {
        return Err(CasError::Communication("bad handshake magic".into()));
    }
    let mut pos = 4;
    let client_type = client_type_from_byte(bytes[pos] as i8)?;
    pos += 1;
    let connect_mode = connect_mode_from_byte(bytes[pos] as i8)?;
    pos += 1;

    let db_name = read_cas_string(bytes, &mut pos)?.to_string();
    let db_user = read_cas_string(bytes, &mut pos)?.to_string();
    let db_password = read_cas_string(bytes, &mut pos)?.to_string();

    Ok(ConnectRequest { client_type, connect_mode, db_name, db_user, db_password })
}

/// Steps 4, 6 and 7 (§6): ACL check, authentication (skipped for the
/// replication-broker client type), and session establishment.
pub fn establish_session(
    request: ConnectRequest,
    acl: &dyn AclChecker,
    authenticator: &dyn Authenticator,
    session_seed: u64,
) -> CResult<Session> {
    if !acl.is_allowed(&request.db_name, request.client_type) {
        return Err(CasError::NotAuthorized);
    }

    if request.client_type != ClientType::ReplicationBroker {
        authenticator.authenticate(&request)?;
    }

    Ok(Session {
        key: SessionKey::from_seed(session_seed),
        client_type: request.client_type,
        connect_mode: request.connect_mode,
        db_name: request.db_name,
        db_user: request.db_user,
    })
}
