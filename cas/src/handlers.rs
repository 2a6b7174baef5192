//! The request handlers the dispatcher looks up by [`FunctionCode`]
//! (§4.7): one function per RPC, each operating on a [`CasContext`]
//! and (where it needs to touch SQL) a [`QueryExecutor`]. Framing and
//! error-to-wire conversion happen one level up, in
//! [`crate::conn::request_loop`]; these functions return plain
//! `CResult<T>` so they can be exercised without a socket.
use common::err::{CasError, CResult};
use common::value::OrValue;

use crate::context::CasContext;
use crate::dispatch::FunctionCode;
use crate::executor::{ExecuteOutcome, PreparedStatement, QueryExecutor, StmtType};
use crate::handle::{QueryResult, StatementHandle};
use crate::netbuf::NetBuf;
use crate::wire::ColumnInfo;

pub struct PrepareReply {
    pub handle_id: i32,
    pub stmt_type: StmtType,
    pub num_markers: i32,
    pub columns: Vec<ColumnInfo>,
}

impl PrepareReply {
    pub fn encode(&self, buf: &mut NetBuf) {
        buf.put_i32(self.handle_id);
        buf.put_i8(stmt_type_wire(self.stmt_type));
        buf.put_i32(self.num_markers);
        buf.put_i32(self.columns.len() as i32);
        for col in &self.columns {
            col.encode(buf);
        }
    }
}

fn stmt_type_wire(t: StmtType) -> i8 {
    match t {
        StmtType::Select => 0,
        StmtType::Insert => 1,
        StmtType::Update => 2,
        StmtType::Delete => 3,
        StmtType::Ddl => 4,
        StmtType::Other => 5,
    }
}

/// §4.7 "prepare": compiles `sql` through the query executor and
/// allocates a server handle for it. `is_holdable` comes from the
/// client setting `CCI_PREPARE_HOLDABLE` on the request.
pub fn prepare<E: QueryExecutor>(ctx: &mut CasContext, executor: &E, sql: &str, is_holdable: bool) -> CResult<PrepareReply> {
    let prepared = executor.prepare(sql)?;
    let pooling_enabled = ctx.config.handle.statement_pooling;
    let handle_id = ctx.handles.prepare(sql, is_holdable && ctx.config.handle.holdable_result_support, pooling_enabled)?;
    let handle = ctx.handles.get_mut(handle_id)?;
    handle.stmt_type = Some(prepared.stmt_type);
    handle.num_markers = prepared.num_markers;
    handle.columns = prepared.columns.clone();
    Ok(PrepareReply { handle_id, stmt_type: prepared.stmt_type, num_markers: prepared.num_markers, columns: prepared.columns })
}

pub struct ExecuteReply {
    pub affected_rows: i64,
    /// The first batch of rows, eagerly fetched as part of the
    /// execute response for result-producing statements (§4.7
    /// "execute... eagerly fetches the first batch").
    pub first_batch: Vec<Vec<OrValue>>,
    pub cursor_closed: bool,
}

/// §4.7 "execute": binds `host_vars`, runs the statement, and — for a
/// result-producing statement type — eagerly fetches up to `max_row`
/// rows into the reply (0 means "no limit", matching the CCI
/// convention where the server handle's `max_row` of 0 disables
/// capping). Sets `need_auto_commit` on the dispatcher per §4.7 step 4
/// so the connection loop runs the implicit commit/rollback after this
/// handler returns.
pub fn execute<E: QueryExecutor>(ctx: &mut CasContext, executor: &E, handle_id: i32, host_vars: &[OrValue], max_row: usize) -> CResult<ExecuteReply> {
    let handle = ctx.handles.get(handle_id)?;
    let stmt = PreparedStatement {
        sql: handle.sql.clone(),
        stmt_type: handle.stmt_type.ok_or_else(|| CasError::Internal("handle has no prepared statement".into()))?,
        num_markers: handle.num_markers,
        columns: handle.columns.clone(),
    };

    let outcome = executor.execute(&stmt, host_vars);
    // §4.7 step 4: a failed handler selects auto-commit-rollback; a
    // successful one selects auto-commit only when the statement type
    // warrants it (DML/DDL, not a bare SELECT).
    ctx.dispatcher.pending_commit = match &outcome {
        Ok(_) => stmt.stmt_type.warrants_auto_commit(),
        Err(_) => true,
    };
    ctx.dispatcher.pending_rollback = outcome.is_err();

    let ExecuteOutcome { rows, affected_rows } = outcome?;

    let handle = ctx.handles.get_mut(handle_id)?;
    let is_result_producing = stmt.stmt_type.is_result_producing();
    if is_result_producing {
        handle.result = Some(QueryResult::from_rows(rows));
    } else {
        handle.result = Some(QueryResult::from_affected_rows(affected_rows));
    }

    let handle = ctx.handles.get_mut(handle_id)?;
    let limit = if max_row == 0 { usize::MAX } else { max_row };
    let mut first_batch = Vec::new();
    let mut cursor_closed = false;
    if is_result_producing {
        let result = handle.result.as_mut().expect("just set above");
        while first_batch.len() < limit {
            match result.fetch_next() {
                Some(row) => first_batch.push(row.to_vec()),
                None => break,
            }
        }
        cursor_closed = result.is_exhausted();
    }

    Ok(ExecuteReply { affected_rows, first_batch, cursor_closed })
}

pub struct FetchReply {
    pub rows: Vec<OrValue>,
    pub cursor_closed: bool,
}

/// §4.7 "fetch": advances the cursor. When auto-commit is on and the
/// cursor is not scrollable, reaching end-of-cursor both auto-commits
/// and reports the cursor closed (§4.7, §8 scenario 1).
pub fn fetch(ctx: &mut CasContext, handle_id: i32) -> CResult<FetchReply> {
    let autocommit = ctx.dispatcher.autocommit;
    let handle = ctx.handles.get_mut(handle_id)?;
    let result = handle.result.as_mut().ok_or(CasError::SrvHandle(handle_id))?;

    let row = result.fetch_next();
    let exhausted = result.is_exhausted();
    let rows = row.map(|r| r.to_vec()).unwrap_or_default();

    if exhausted && autocommit {
        ctx.dispatcher.pending_commit = true;
        ctx.dispatcher.pending_rollback = false;
    }

    Ok(FetchReply { rows, cursor_closed: exhausted })
}

/// §4.7 "close-req-handle": frees a single handle outright, regardless
/// of whether it is holdable (closing it explicitly always wins over
/// holdability).
pub fn close(ctx: &mut CasContext, handle_id: i32) -> CResult<()> {
    ctx.handles.free(handle_id)
}

/// §4.7 "cursor-close": frees just the open result set, keeping the
/// prepared statement (and its handle id) alive for a future
/// `Execute`.
pub fn cursor_close(ctx: &mut CasContext, handle_id: i32) -> CResult<()> {
    let handle = ctx.handles.get_mut(handle_id)?;
    if let Some(result) = handle.result.take() {
        drop(result);
    }
    Ok(())
}

/// §4.7 "end-tran": commits or rolls back, then frees handles per
/// §4.8's holdable rule (holdable survives commit, not rollback).
pub fn end_tran(ctx: &mut CasContext, commit: bool) -> CResult<()> {
    ctx.end_transaction(commit);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnStatusSnapshot {
    pub in_transaction: bool,
}

/// §4.7, §8 "Dispatch purity of check-cas": takes a snapshot of
/// connection status and leaves it unchanged — callers compare the
/// snapshot before and after to prove purity (see the dispatcher
/// test). A `restore_on_success` caller uses the snapshot to put
/// status back after a health check that might otherwise have
/// mutated it as a side effect of running through the normal
/// transactional dispatch path.
pub fn check_cas(ctx: &CasContext) -> ConnStatusSnapshot {
    ConnStatusSnapshot { in_transaction: ctx.dispatcher.in_transaction }
}

/// §4.7 "get-db-parameter": reads a named server-side parameter the
/// driver can query (e.g. isolation level, lock timeout). Parameter
/// storage beyond the handful this crate models is out of scope;
/// unknown names are a `ParamName` error (§7 taxonomy).
pub fn get_db_parameter(ctx: &CasContext, name: &str) -> CResult<String> {
    match name {
        "autocommit" => Ok(ctx.dispatcher.autocommit.to_string()),
        "max_prepared_stmt_count" => Ok(ctx.config.handle.max_prepared_stmt_count.to_string()),
        "statement_pooling" => Ok(ctx.config.handle.statement_pooling.to_string()),
        other => Err(CasError::ParamName(other.to_string())),
    }
}

/// §4.7 "execute-batch": runs the same prepared statement once per
/// element of `batch_host_vars`, collecting one outcome per element.
/// Unlike `execute`, none of the individual runs are result-producing
/// (batch execute is for DML) — a `SELECT` handle is a `SchemaType`
/// error.
pub fn execute_batch<E: QueryExecutor>(ctx: &mut CasContext, executor: &E, handle_id: i32, batch_host_vars: &[Vec<OrValue>]) -> CResult<Vec<i64>> {
    let handle = ctx.handles.get(handle_id)?;
    let stmt_type = handle.stmt_type.ok_or_else(|| CasError::Internal("handle has no prepared statement".into()))?;
    if stmt_type.is_result_producing() {
        return Err(CasError::SchemaType(stmt_type_wire(stmt_type) as i32));
    }
    let stmt = PreparedStatement { sql: handle.sql.clone(), stmt_type, num_markers: handle.num_markers, columns: handle.columns.clone() };

    let mut affected = Vec::with_capacity(batch_host_vars.len());
    for vars in batch_host_vars {
        let outcome = executor.execute(&stmt, vars)?;
        affected.push(outcome.affected_rows);
    }
    Ok(affected)
}

/// §4.7 "con-close": tears the session down — every handle is freed
/// (holdable or not, §4.8 "free_all(true)"), independent of whether a
/// transaction happens to be open.
pub fn con_close(ctx: &mut CasContext) {
    ctx.handles.free_all(true);
    ctx.dispatcher.in_transaction = false;
}

/// §4.7 "change-dbuser": re-authenticates the same physical connection
/// as a different DB user without a fresh broker handoff. Any open,
/// non-holdable statement state is dropped, mirroring a fresh
/// connection's clean handle table.
pub fn change_dbuser(ctx: &mut CasContext, new_user: &str) {
    ctx.session.db_user = new_user.to_string();
    ctx.handles.free_all(false);
}

/// §4.7 "server-mode", §8 scenario 3: reports whether the connection
/// is currently inside a transaction, the same snapshot `check_cas`
/// takes, but `server_mode` is the RPC clients actually poll after an
/// auto-commit rollback to confirm the connection landed `OUT_TRAN`.
pub fn server_mode(ctx: &CasContext) -> ConnStatusSnapshot {
    check_cas(ctx)
}

/// §4.7 "get-query-plan": the already-prepared statement's
/// human-readable plan, for diagnostics. Unlike the shard/HA codes
/// below, this one has a real counterpart in this crate's scope — it
/// just asks the query executor for a string instead of running the
/// statement.
pub fn get_query_plan<E: QueryExecutor>(ctx: &CasContext, executor: &E, handle_id: i32) -> CResult<String> {
    let handle = ctx.handles.get(handle_id)?;
    let stmt = PreparedStatement {
        sql: handle.sql.clone(),
        stmt_type: handle.stmt_type.ok_or_else(|| CasError::Internal("handle has no prepared statement".into()))?,
        num_markers: handle.num_markers,
        columns: handle.columns.clone(),
    };
    executor.query_plan(&stmt)
}

/// §4.7: the shard/HA-cluster administrative codes
/// (`update-group-id`, `gid-removed-info {insert,delete}`,
/// `gid-skey-info delete`, `block-global-dml`, `send-repl-data`,
/// `notify-ha-agent-state`) whose real behaviour is implemented by the
/// broker/shard layer (§1 out of scope). CAS's role for all of them is
/// to acknowledge receipt; a real deployment forwards the request to
/// that layer through a collaborator this crate does not model.
pub fn administrative_ack(code: FunctionCode) -> CResult<()> {
    debug_assert!(code.is_administrative(), "administrative_ack called for a non-administrative code: {code:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::AppServerConfig;
    use common::value::Value;

    use crate::conn::session::{ClientType, DbConnectMode, Session, SessionKey};

    struct EchoExecutor;

    impl QueryExecutor for EchoExecutor {
        fn prepare(&self, sql: &str) -> CResult<PreparedStatement> {
            let stmt_type = if sql.trim_start().to_uppercase().starts_with("SELECT") { StmtType::Select } else { StmtType::Insert };
            Ok(PreparedStatement {
                sql: sql.to_string(),
                stmt_type,
                num_markers: 0,
                columns: vec![ColumnInfo { cci_type: crate::wire::CciType::Int, scale: 0, precision: 10, name: "col1".into() }],
            })
        }

        fn execute(&self, stmt: &PreparedStatement, _host_vars: &[OrValue]) -> CResult<ExecuteOutcome> {
            if stmt.stmt_type == StmtType::Select {
                Ok(ExecuteOutcome::rows(vec![vec![OrValue::Scalar(Value::Integer(1))]]))
            } else {
                Ok(ExecuteOutcome::affected(1))
            }
        }
    }

    struct FailingExecutor;
    impl QueryExecutor for FailingExecutor {
        fn prepare(&self, sql: &str) -> CResult<PreparedStatement> {
            Ok(PreparedStatement { sql: sql.to_string(), stmt_type: StmtType::Insert, num_markers: 0, columns: vec![] })
        }
        fn execute(&self, _stmt: &PreparedStatement, _host_vars: &[OrValue]) -> CResult<ExecuteOutcome> {
            Err(CasError::Dbms { code: -670, message: "table not found".into() })
        }
    }

    fn sample_ctx() -> CasContext {
        let config = AppServerConfig::default();
        let session = Session {
            key: SessionKey::from_seed(1),
            client_type: ClientType::Cci,
            connect_mode: DbConnectMode::ReadWrite,
            db_name: "db1".into(),
            db_user: "PUBLIC".into(),
        };
        CasContext::new(session, &config)
    }

    #[test]
    fn connect_prepare_execute_fetch_commit_scenario() {
        // §8 scenario 1.
        let mut ctx = sample_ctx();
        let executor = EchoExecutor;

        let prep = prepare(&mut ctx, &executor, "SELECT 1", false).unwrap();
        assert_eq!(prep.stmt_type, StmtType::Select);
        assert_eq!(prep.num_markers, 0);
        assert_eq!(prep.columns.len(), 1);

        let exec = execute(&mut ctx, &executor, prep.handle_id, &[], 0).unwrap();
        assert_eq!(exec.first_batch.len(), 1);
        assert!(exec.cursor_closed);

        let fetch_reply = fetch(&mut ctx, prep.handle_id).unwrap();
        assert!(fetch_reply.rows.is_empty());
        assert!(fetch_reply.cursor_closed);

        end_tran(&mut ctx, true).unwrap();
    }

    #[test]
    fn duplicate_prepare_reuses_cached_handle() {
        // §8 scenario 2.
        let mut ctx = sample_ctx();
        let executor = EchoExecutor;
        let first = prepare(&mut ctx, &executor, "SELECT 1", false).unwrap();
        let second = prepare(&mut ctx, &executor, "SELECT 1", false).unwrap();
        assert_eq!(first.handle_id, second.handle_id);
    }

    #[test]
    fn auto_commit_rollback_on_execute_failure() {
        // §8 scenario 3.
        let mut ctx = sample_ctx();
        let executor = FailingExecutor;
        let prep = prepare(&mut ctx, &executor, "INSERT INTO t VALUES ('x')", false).unwrap();
        let err = execute(&mut ctx, &executor, prep.handle_id, &[], 0).unwrap_err();
        assert!(matches!(err, CasError::Dbms { .. }));
        assert!(ctx.dispatcher.pending_rollback);
        ctx.apply_pending_auto_commit();
        let snapshot = check_cas(&ctx);
        assert!(!snapshot.in_transaction);
    }

    #[test]
    fn holdable_cursor_survives_commit_but_not_rollback() {
        // §8 scenario 6.
        let mut ctx = sample_ctx();
        let executor = EchoExecutor;
        let prep = prepare(&mut ctx, &executor, "SELECT 1", true).unwrap();
        execute(&mut ctx, &executor, prep.handle_id, &[], 1).unwrap();

        end_tran(&mut ctx, true).unwrap();
        assert!(ctx.handles.get(prep.handle_id).is_ok());

        end_tran(&mut ctx, false).unwrap();
        assert!(matches!(ctx.handles.get(prep.handle_id), Err(CasError::SrvHandle(_))));
    }

    #[test]
    fn check_cas_never_mutates_connection_status() {
        let mut ctx = sample_ctx();
        ctx.dispatcher.in_transaction = true;
        let before = check_cas(&ctx);
        let _ = check_cas(&ctx);
        let after = check_cas(&ctx);
        assert_eq!(before, after);
    }

    #[test]
    fn con_close_frees_every_handle_including_holdable() {
        let mut ctx = sample_ctx();
        let executor = EchoExecutor;
        let prep = prepare(&mut ctx, &executor, "SELECT 1", true).unwrap();
        con_close(&mut ctx);
        assert!(ctx.handles.get(prep.handle_id).is_err());
    }

    #[test]
    fn unknown_db_parameter_is_a_param_name_error() {
        let ctx = sample_ctx();
        assert!(matches!(get_db_parameter(&ctx, "does_not_exist"), Err(CasError::ParamName(_))));
    }

    #[test]
    fn get_query_plan_reads_through_to_the_executor() {
        let mut ctx = sample_ctx();
        let executor = EchoExecutor;
        let prep = prepare(&mut ctx, &executor, "SELECT 1", false).unwrap();
        let plan = get_query_plan(&ctx, &executor, prep.handle_id).unwrap();
        assert!(plan.contains("SELECT 1"));
    }

    #[test]
    fn administrative_codes_always_acknowledge() {
        assert!(administrative_ack(FunctionCode::UpdateGroupId).is_ok());
        assert!(administrative_ack(FunctionCode::SendReplData).is_ok());
    }

    #[test]
    fn server_mode_reports_out_tran_after_auto_rollback() {
        // §8 scenario 3's tail: "a subsequent server_mode request reports OUT_TRAN".
        let mut ctx = sample_ctx();
        let executor = FailingExecutor;
        let prep = prepare(&mut ctx, &executor, "INSERT INTO t VALUES ('x')", false).unwrap();
        let _ = execute(&mut ctx, &executor, prep.handle_id, &[], 0);
        ctx.apply_pending_auto_commit();
        assert!(!server_mode(&ctx).in_transaction);
    }

    #[test]
    fn execute_batch_rejects_result_producing_handles() {
        let mut ctx = sample_ctx();
        let executor = EchoExecutor;
        let prep = prepare(&mut ctx, &executor, "SELECT 1", false).unwrap();
        let err = execute_batch(&mut ctx, &executor, prep.handle_id, &[vec![]]).unwrap_err();
        assert!(matches!(err, CasError::SchemaType(_)));
    }

    #[test]
    fn change_dbuser_updates_session_and_clears_non_holdable_handles() {
        let mut ctx = sample_ctx();
        let executor = EchoExecutor;
        let prep = prepare(&mut ctx, &executor, "SELECT 1", false).unwrap();
        change_dbuser(&mut ctx, "other_user");
        assert_eq!(ctx.session.db_user, "other_user");
        assert!(ctx.handles.get(prep.handle_id).is_err());
    }
}
