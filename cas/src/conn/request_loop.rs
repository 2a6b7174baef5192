//! C6/C7 glue (§4.7, §6): turns one decoded request body into a
//! dispatched call against [`crate::handlers`] and a framed reply.
//! Handlers themselves never see the wire — this module is the only
//! place that knows how a [`FunctionCode`] maps onto an argument list
//! and how the handler's return value gets encoded back onto it.
use common::err::{CasError, CResult};
use common::value::OrValue;

use crate::context::CasContext;
use crate::dispatch::FunctionCode;
use crate::executor::QueryExecutor;
use crate::handlers;
use crate::netbuf::{MessageWriter, NetBuf, NetBufReader, StatusInfo};
use crate::wire::{encode_or_value, ConnectReplyBody, ErrorReply};

/// Protocol version numbers sent in the connect reply (§6). Distinct
/// from the `cas_server` binary's own `--version` (Cargo package
/// version, §6 CLI): this is the wire protocol's version, which moves
/// independently of the crate's release cadence.
const PROTOCOL_MAJOR: i16 = 11;
const PROTOCOL_MINOR: i16 = 0;
const PROTOCOL_PATCH: i16 = 0;
const PROTOCOL_BUILD: i16 = 1;

/// §6 connect reply `dbms_type`: which DBMS flavour this CAS serves.
/// Only one flavour is modelled here.
const DBMS_TYPE: i8 = 1;

/// Builds the §6 connect reply body for a freshly established
/// `session`, reading the server's reported capabilities out of
/// `config` (§4.6 step 7: "server info (version, pid, session key,
/// DBMS flavour, holdable-result support, statement-pooling flag,
/// autocommit default, server start time)").
fn build_connect_reply(
    session: &crate::conn::session::Session,
    config: &common::config::AppServerConfig,
    shm_index: i32,
    server_start_time: i32,
) -> ConnectReplyBody {
    ConnectReplyBody {
        major: PROTOCOL_MAJOR,
        minor: PROTOCOL_MINOR,
        patch: PROTOCOL_PATCH,
        build: PROTOCOL_BUILD,
        shm_index,
        pid: std::process::id() as i32,
        session: session.key,
        dbms_type: DBMS_TYPE,
        holdable_result_support: config.handle.holdable_result_support,
        statement_pooling: config.handle.statement_pooling,
        autocommit_default: config.handle.autocommit_default,
        server_start_time,
    }
}

fn read_host_vars(reader: &mut NetBufReader<'_>) -> CResult<Vec<OrValue>> {
    let count = reader.get_i32().map_err(CasError::Communication)?;
    let mut vars = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        // A real driver payload carries a typed value per §6; decoding
        // that fully is the query executor's job (it owns the domain
        // each marker binds to), so this crate only needs to find
        // where the argument ends.
        let raw = reader.get_arg().map_err(CasError::Communication)?;
        vars.push(OrValue::Scalar(common::value::Value::Varchar(String::from_utf8_lossy(raw).into_owned())));
    }
    Ok(vars)
}

fn encode_conn_status(buf: &mut NetBuf, status: handlers::ConnStatusSnapshot) {
    buf.put_i8(status.in_transaction as i8);
}

/// Wall-clock milliseconds for the dispatcher's alive timestamp (§7).
/// Only the relative ordering of readings matters to the broker's
/// hang-monitor, not any particular epoch.
fn now_ms() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Runs `code` against `ctx`/`executor` with arguments decoded from
/// `reader`, writing the function-specific success payload into `buf`.
/// Errors propagate to the caller, which is responsible for the
/// auto-commit chokepoint (§4.7 step 4) and for turning the error into
/// an [`ErrorReply`] (§7 "Error propagation": handlers never encode
/// their own failures).
pub fn dispatch_request<E: QueryExecutor>(
    ctx: &mut CasContext,
    executor: &E,
    code: FunctionCode,
    reader: &mut NetBufReader<'_>,
    buf: &mut NetBuf,
) -> CResult<()> {
    match code {
        FunctionCode::Prepare => {
            let sql = reader.get_cas_string().map_err(CasError::Communication)?;
            let is_holdable = reader.get_i8().map_err(CasError::Communication)? != 0;
            let reply = handlers::prepare(ctx, executor, &sql, is_holdable)?;
            reply.encode(buf);
        }
        FunctionCode::Execute => {
            let handle_id = reader.get_i32().map_err(CasError::Communication)?;
            let max_row = reader.get_i32().map_err(CasError::Communication)?.max(0) as usize;
            let host_vars = read_host_vars(reader)?;
            let reply = handlers::execute(ctx, executor, handle_id, &host_vars, max_row)?;
            buf.put_i64(reply.affected_rows);
            buf.put_i32(reply.first_batch.len() as i32);
            for row in &reply.first_batch {
                buf.put_i32(row.len() as i32);
                for value in row {
                    encode_or_value(buf, value);
                }
            }
            buf.put_i8(reply.cursor_closed as i8);
        }
        FunctionCode::ExecuteBatch => {
            let handle_id = reader.get_i32().map_err(CasError::Communication)?;
            let batch_count = reader.get_i32().map_err(CasError::Communication)?;
            let mut batches = Vec::with_capacity(batch_count.max(0) as usize);
            for _ in 0..batch_count {
                batches.push(read_host_vars(reader)?);
            }
            let affected = handlers::execute_batch(ctx, executor, handle_id, &batches)?;
            buf.put_i32(affected.len() as i32);
            for count in affected {
                buf.put_i64(count);
            }
        }
        FunctionCode::Fetch => {
            let handle_id = reader.get_i32().map_err(CasError::Communication)?;
            let reply = handlers::fetch(ctx, handle_id)?;
            buf.put_i32(reply.rows.len() as i32);
            for value in &reply.rows {
                encode_or_value(buf, value);
            }
            buf.put_i8(reply.cursor_closed as i8);
        }
        FunctionCode::Close => {
            let handle_id = reader.get_i32().map_err(CasError::Communication)?;
            handlers::close(ctx, handle_id)?;
        }
        FunctionCode::CursorClose => {
            let handle_id = reader.get_i32().map_err(CasError::Communication)?;
            handlers::cursor_close(ctx, handle_id)?;
        }
        FunctionCode::EndTran => {
            let commit = reader.get_i8().map_err(CasError::Communication)? != 0;
            handlers::end_tran(ctx, commit)?;
        }
        FunctionCode::CheckCasAlive => {
            encode_conn_status(buf, handlers::check_cas(ctx));
        }
        FunctionCode::ServerMode => {
            encode_conn_status(buf, handlers::server_mode(ctx));
        }
        FunctionCode::GetDbParameter => {
            let name = reader.get_cas_string().map_err(CasError::Communication)?;
            let value = handlers::get_db_parameter(ctx, &name)?;
            buf.put_cas_string(&value);
        }
        FunctionCode::ConClose => {
            handlers::con_close(ctx);
        }
        FunctionCode::ChangeDbuser => {
            let new_user = reader.get_cas_string().map_err(CasError::Communication)?;
            handlers::change_dbuser(ctx, &new_user);
        }
        FunctionCode::CancelQuery => {
            ctx.dispatcher.cancellation.request_cancel();
        }
        FunctionCode::GetQueryPlan => {
            let handle_id = reader.get_i32().map_err(CasError::Communication)?;
            let plan = handlers::get_query_plan(ctx, executor, handle_id)?;
            buf.put_cas_string(&plan);
        }
        FunctionCode::UpdateGroupId
        | FunctionCode::GidRemovedInfoInsert
        | FunctionCode::GidRemovedInfoDelete
        | FunctionCode::GidSkeyInfoDelete
        | FunctionCode::BlockGlobalDml
        | FunctionCode::SendReplData
        | FunctionCode::NotifyHaAgentState => {
            handlers::administrative_ack(code)?;
        }
        FunctionCode::GetDbVersion | FunctionCode::Schema | FunctionCode::NextResult => {
            return Err(CasError::Internal(format!("{code:?} not wired to a handler")));
        }
    }
    Ok(())
}

/// Runs one request end to end: decodes `code` from the framing
/// header, dispatches it, and always produces a complete framed
/// message — an `Ok` body on success, an [`ErrorReply`] body on
/// failure (§7: the dispatcher is the single place a [`CasError`]
/// becomes a wire response). Also applies the auto-commit chokepoint
/// (§4.7 step 4) after the handler returns, success or not.
pub fn handle_one_request<E: QueryExecutor>(
    ctx: &mut CasContext,
    executor: &E,
    code: FunctionCode,
    body: &[u8],
    status: StatusInfo,
) -> Vec<u8> {
    let mut reader = NetBufReader::new(body);
    let mut writer = MessageWriter::begin(status);

    ctx.dispatcher.begin_request(code);
    let result = dispatch_request(ctx, executor, code, &mut reader, writer.buf_mut());
    ctx.dispatcher.end_request(code, now_ms(), result.is_ok());
    ctx.apply_pending_auto_commit();

    match result {
        Ok(()) => writer.finish(),
        Err(e) => {
            let mut writer = MessageWriter::begin(status);
            ErrorReply::from_cas_error(&e).encode(writer.buf_mut());
            writer.finish()
        }
    }
}

/// Reads one `body_size:i32 | status_info:S | body` frame (§6) off
/// `stream` and returns `(status_info_bytes_ignored, fn_code, body)`.
/// `None` means the client closed the connection cleanly between
/// requests, the ordinary end of a session (§8 "con-close", or simply
/// dropping the socket).
#[cfg(unix)]
async fn read_one_frame(stream: &mut tokio::net::UnixStream) -> CResult<Option<(FunctionCode, Vec<u8>)>> {
    use tokio::io::AsyncReadExt;

    let mut len_buf = [0u8; 4];
    if let Err(e) = stream.read_exact(&mut len_buf).await {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(CasError::Communication(e.to_string()));
    }
    let body_size = i32::from_be_bytes(len_buf) as usize;

    let mut body = vec![0u8; body_size];
    stream.read_exact(&mut body).await.map_err(|e| CasError::Communication(e.to_string()))?;

    if body.is_empty() {
        return Err(CasError::Communication("empty request body, missing function code".into()));
    }
    let code_byte = body[0] as i8;
    let code = FunctionCode::try_from(code_byte as i16).map_err(|_| CasError::Internal(format!("unknown function code {code_byte}")))?;
    Ok(Some((code, body[1..].to_vec())))
}

/// §6 steps 1-7 plus the request loop proper: receives the client fd
/// from the broker, performs the handshake, then dispatches requests
/// until the client disconnects or sends `con-close`. Runs until the
/// connection ends; errors from an individual request are turned into
/// an [`ErrorReply`] and do not end the loop (§7 "Error propagation"
/// — only a communication-layer failure on the socket itself does).
#[cfg(unix)]
pub async fn run_one_connection<E: QueryExecutor>(
    handoff: &dyn crate::conn::BrokerHandoff,
    acl: &dyn crate::conn::AclChecker,
    authenticator: &dyn crate::conn::Authenticator,
    executor: &E,
    config: &common::config::AppServerConfig,
    session_seed: u64,
    shm_index: i32,
    server_start_time: i32,
) -> CResult<()> {
    use std::os::unix::io::FromRawFd;

    let client_fd = handoff.receive_client_fd()?;
    let std_stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(client_fd) };
    std_stream.set_nonblocking(true).map_err(|e| CasError::Communication(e.to_string()))?;
    let mut stream = tokio::net::UnixStream::from_std(std_stream).map_err(|e| CasError::Communication(e.to_string()))?;

    let (handshake_code, handshake_body) = match read_one_frame(&mut stream).await? {
        Some(frame) => frame,
        None => return Ok(()),
    };
    let _ = handshake_code;
    let connect_request = crate::conn::parse_connect_request(&handshake_body)?;
    let session = crate::conn::establish_session(connect_request, acl, authenticator, session_seed)?;

    // §4.6 step 7: send the server-info connect reply before entering
    // the request loop proper.
    let connect_reply = build_connect_reply(&session, config, shm_index, server_start_time);
    let mut reply_writer = MessageWriter::begin(StatusInfo::default());
    connect_reply.encode(reply_writer.buf_mut());
    {
        use tokio::io::AsyncWriteExt;
        stream.write_all(&reply_writer.finish()).await.map_err(|e| CasError::Communication(e.to_string()))?;
    }

    let mut ctx = CasContext::new(session, config);

    loop {
        // §7: the alive timestamp is cleared while waiting on the
        // client socket, same as around any other blocking call, so
        // the broker's hang-monitor can't mistake "idle, waiting for
        // the next request" for "wedged".
        ctx.dispatcher.alive.clear();
        let frame = read_one_frame(&mut stream).await?;
        ctx.dispatcher.alive.mark_alive(now_ms());
        let (code, body) = match frame {
            Some(frame) => frame,
            None => break,
        };

        let is_con_close = code == FunctionCode::ConClose;
        let reply = handle_one_request(&mut ctx, executor, code, &body, StatusInfo { active_transaction: ctx.dispatcher.in_transaction, ..StatusInfo::default() });

        ctx.dispatcher.alive.clear();
        use tokio::io::AsyncWriteExt;
        stream.write_all(&reply).await.map_err(|e| CasError::Communication(e.to_string()))?;
        ctx.dispatcher.alive.mark_alive(now_ms());

        if is_con_close {
            break;
        }
    }

    Ok(())
}
