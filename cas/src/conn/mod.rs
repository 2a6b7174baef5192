pub mod lifecycle;
pub mod request_loop;
pub mod session;

pub use lifecycle::{establish_session, parse_connect_request, AclChecker, Authenticator, BrokerHandoff};
#[cfg(unix)]
pub use lifecycle::UnixScmHandoff;
pub use session::{ClientType, ConnectRequest, DbConnectMode, Session, SessionKey};
