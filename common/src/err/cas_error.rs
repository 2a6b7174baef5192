use std::io;

use thiserror::Error;

/// Which side produced the error, mirrored on the wire as `ERROR:i8 | indicator:i32 | ...`.
///
/// `Cas` errors never leave the CAS process itself (bad argument, OOM,
/// handle-table exhaustion); `Dbms` errors are passed through from the
/// storage/query layer with its own code and message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorIndicator {
    Cas,
    Dbms,
}

/// CAS-side error codes. Negative, as required by the wire protocol
/// (§7: "DBMS errors are surfaced with the engine's own code").
/// Exact numeric values are not recoverable from the retrieval pack
/// (cas_error.h was not part of the filtered original_source/ set) so
/// these are assigned in declaration order; only the *shape* (negative,
/// one per taxonomy entry) is grounded.
pub const CAS_ER_ARGS: i32 = -1001;
pub const CAS_ER_COMMUNICATION: i32 = -1002;
pub const CAS_ER_NO_MORE_MEMORY: i32 = -1003;
pub const CAS_ER_SRV_HANDLE: i32 = -1004;
pub const CAS_ER_SCHEMA_TYPE: i32 = -1005;
pub const CAS_ER_PARAM_NAME: i32 = -1006;
pub const CAS_ER_MAX_PREPARED_STMT_COUNT_EXCEEDED: i32 = -1007;
pub const CAS_ER_NOT_AUTHORIZED: i32 = -1008;
pub const CAS_ER_TRAN_TYPE: i32 = -1009;
pub const CAS_ER_INTERNAL: i32 = -1010;
pub const CAS_ER_QUERY_CANCEL: i32 = -1011;
pub const CAS_ER_STMT_POOLING: i32 = -1012;
pub const CAS_ER_REPL_AUTH: i32 = -1013;

/// The one error type that flows through every handler. Handlers return
/// `Result<T, CasError>`; the dispatcher is the single chokepoint that
/// turns a `CasError` into a wire error response (§7, §9 "Error
/// propagation").
#[derive(Debug, Error)]
pub enum CasError {
    #[error("invalid argument: {0}")]
    Args(String),

    #[error("communication error: {0}")]
    Communication(String),

    #[error("no more memory")]
    NoMoreMemory,

    #[error("invalid server handle id {0}")]
    SrvHandle(i32),

    #[error("unexpected schema type {0}")]
    SchemaType(i32),

    #[error("unknown parameter name {0}")]
    ParamName(String),

    #[error("maximum number of prepared statements exceeded")]
    MaxPreparedStmts,

    #[error("not authorized")]
    NotAuthorized,

    #[error("invalid transaction type {0}")]
    TranType(i32),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("query cancelled")]
    QueryCancelled,

    #[error("statement pooling error: {0}")]
    StmtPooling(String),

    #[error("replication authentication failed")]
    ReplAuth,

    /// Error surfaced from the storage/query collaborator, carrying its
    /// own engine code and message (the DBMS side of the taxonomy).
    #[error("{message}")]
    Dbms { code: i32, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CasError {
    pub fn indicator(&self) -> ErrorIndicator {
        match self {
            CasError::Dbms { .. } => ErrorIndicator::Dbms,
            _ => ErrorIndicator::Cas,
        }
    }

    /// Negative wire code for this error (§6 "Error reply").
    pub fn code(&self) -> i32 {
        match self {
            CasError::Args(_) => CAS_ER_ARGS,
            CasError::Communication(_) => CAS_ER_COMMUNICATION,
            CasError::NoMoreMemory => CAS_ER_NO_MORE_MEMORY,
            CasError::SrvHandle(_) => CAS_ER_SRV_HANDLE,
            CasError::SchemaType(_) => CAS_ER_SCHEMA_TYPE,
            CasError::ParamName(_) => CAS_ER_PARAM_NAME,
            CasError::MaxPreparedStmts => CAS_ER_MAX_PREPARED_STMT_COUNT_EXCEEDED,
            CasError::NotAuthorized => CAS_ER_NOT_AUTHORIZED,
            CasError::TranType(_) => CAS_ER_TRAN_TYPE,
            CasError::Internal(_) => CAS_ER_INTERNAL,
            CasError::QueryCancelled => CAS_ER_QUERY_CANCEL,
            CasError::StmtPooling(_) => CAS_ER_STMT_POOLING,
            CasError::ReplAuth => CAS_ER_REPL_AUTH,
            CasError::Dbms { code, .. } => *code,
            CasError::Io(_) => CAS_ER_COMMUNICATION,
        }
    }

    /// Certain DBMS failures (engine crash, broken connection) force a
    /// reset of the CAS's database connection at the next safe point
    /// (§7, §9 open question: "a reset is deferred until there are no
    /// holdable results and the connection is out-of-transaction").
    pub fn forces_reset(&self) -> bool {
        matches!(self, CasError::Dbms { message, .. } if message.contains("server crashed")
            || message.contains("server down") || message.contains("no connect"))
    }
}
