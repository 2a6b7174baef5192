//! Trait seam for the query compiler/executor (§1: explicitly out of
//! scope here). `prepare`/`execute` are the two calls the request
//! dispatcher makes into it; everything about plan generation, cost
//! estimation and actual row production lives on the other side of
//! this trait.
use common::err::CResult;
use common::value::OrValue;

use crate::wire::ColumnInfo;

/// Statement kind returned by `prepare`, surfaced to the client as
/// part of the prepare reply (§4.7 "prepare... returns (handle_id,
/// stmt_type, ...)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtType {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Other,
}

impl StmtType {
    /// Only `SELECT`-shaped statements produce a cursor a client can
    /// `Fetch` from; everything else just reports an affected-row
    /// count (§4.7 "execute... eagerly fetches the first batch as
    /// part of the execute response" applies only when "the statement
    /// is result-producing").
    pub fn is_result_producing(&self) -> bool {
        matches!(self, StmtType::Select)
    }

    /// §8 scenario 3 ("auto-commit rollback"): only DML/DDL statements
    /// participate in the implicit commit/rollback the dispatcher runs
    /// after a successful/failed handler (§4.7 step 4).
    pub fn warrants_auto_commit(&self) -> bool {
        !matches!(self, StmtType::Select)
    }
}

#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub sql: String,
    pub stmt_type: StmtType,
    pub num_markers: i32,
    pub columns: Vec<ColumnInfo>,
}

/// What `execute` hands back: either a row set (`SELECT`) or an
/// affected-row count (everything else).
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub rows: Vec<Vec<OrValue>>,
    pub affected_rows: i64,
}

impl ExecuteOutcome {
    pub fn rows(rows: Vec<Vec<OrValue>>) -> Self {
        ExecuteOutcome { rows, affected_rows: 0 }
    }

    pub fn affected(affected_rows: i64) -> Self {
        ExecuteOutcome { rows: Vec::new(), affected_rows }
    }
}

/// The out-of-scope query compiler/executor collaborator (§1, §2 "C7
/// ... uses ... the query executor"). A real implementation compiles
/// SQL against the live catalog and drives the storage engine; this
/// crate only needs the seam to exercise the dispatcher end to end.
pub trait QueryExecutor: Send + Sync {
    fn prepare(&self, sql: &str) -> CResult<PreparedStatement>;

    fn execute(&self, stmt: &PreparedStatement, host_vars: &[OrValue]) -> CResult<ExecuteOutcome>;

    /// §4.7 "get-query-plan": a human-readable plan string for an
    /// already-prepared statement, used only for diagnostics.
    fn query_plan(&self, stmt: &PreparedStatement) -> CResult<String> {
        Ok(format!("-- no plan available for: {}", stmt.sql))
    }
}
