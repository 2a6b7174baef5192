//! Default collaborators for a process launched without a real broker
//! ACL/authentication backend or query engine wired in (§1: both are
//! explicitly out of scope for this crate). A production deployment
//! replaces these with its own implementations of the same traits;
//! nothing in `cas` or `cas_server` depends on these concrete types.
use cas::conn::{AclChecker, Authenticator, ClientType, ConnectRequest};
use cas::executor::{ExecuteOutcome, PreparedStatement, QueryExecutor};
use common::err::{CasError, CResult};
use common::value::OrValue;

/// Accepts every `(db_name, client_type)` pair. The broker's real ACL
/// table lives outside this crate's scope.
pub struct AllowAllAcl;

impl AclChecker for AllowAllAcl {
    fn is_allowed(&self, _db_name: &str, _client_type: ClientType) -> bool {
        true
    }
}

/// Accepts every connect request without checking the password. Real
/// DBMS authentication is a collaborator this crate calls through but
/// does not implement (§6 step 6).
pub struct AcceptAllAuthenticator;

impl Authenticator for AcceptAllAuthenticator {
    fn authenticate(&self, _request: &ConnectRequest) -> CResult<()> {
        Ok(())
    }
}

/// Fails every prepare/execute with a clear "not wired up" error
/// rather than silently returning bogus rows. The real query
/// compiler/executor is out of scope (§1); this is only here so the
/// connection loop has something to call until one is plugged in.
pub struct UnimplementedExecutor;

impl QueryExecutor for UnimplementedExecutor {
    fn prepare(&self, _sql: &str) -> CResult<PreparedStatement> {
        Err(CasError::Internal("no query executor configured for this cas_server process".into()))
    }

    fn execute(&self, _stmt: &PreparedStatement, _host_vars: &[OrValue]) -> CResult<ExecuteOutcome> {
        Err(CasError::Internal("no query executor configured for this cas_server process".into()))
    }
}
