//! The request function-code table (§7): every request a driver can
//! send names one of these; the dispatcher looks the code up to find
//! which handler runs and whether it participates in the current
//! transaction.
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// §4.7's function-code table in full: every RPC a driver can send.
/// The sharding/HA-cluster codes (`UpdateGroupId` through
/// `NotifyHaAgentState`) exist here for wire compatibility but their
/// real behaviour lives in the broker/shard layer, out of scope here
/// (§1) — see `cas::handlers::administrative_ack`. `GetQueryPlan` is
/// not one of these: it has a real handler (`cas::handlers::get_query_plan`)
/// that reads through to the query executor.
#[derive(IntoPrimitive, TryFromPrimitive, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum FunctionCode {
    EndTran = 1,
    Prepare = 2,
    Execute = 3,
    Fetch = 4,
    GetDbVersion = 5,
    Close = 6,
    CursorClose = 7,
    NextResult = 8,
    Schema = 9,
    CancelQuery = 10,
    CheckCasAlive = 11,
    GetDbParameter = 12,
    ExecuteBatch = 13,
    GetQueryPlan = 14,
    ConClose = 15,
    ChangeDbuser = 16,
    UpdateGroupId = 17,
    GidRemovedInfoInsert = 18,
    GidRemovedInfoDelete = 19,
    GidSkeyInfoDelete = 20,
    BlockGlobalDml = 21,
    ServerMode = 22,
    SendReplData = 23,
    NotifyHaAgentState = 24,
}

impl FunctionCode {
    /// §7: requests that participate in the current transaction and
    /// should reset the query-cancel flag / "alive" timestamp around
    /// their blocking work. `CheckCasAlive` and `CancelQuery` are
    /// control-plane requests, never transactional work, and so is
    /// every administrative/shard-cluster code. `GetQueryPlan` reads a
    /// statement's plan without running it, so it's non-transactional
    /// too.
    pub fn is_transactional(&self) -> bool {
        !matches!(
            self,
            FunctionCode::CheckCasAlive
                | FunctionCode::CancelQuery
                | FunctionCode::ConClose
                | FunctionCode::GetQueryPlan
                | FunctionCode::UpdateGroupId
                | FunctionCode::GidRemovedInfoInsert
                | FunctionCode::GidRemovedInfoDelete
                | FunctionCode::GidSkeyInfoDelete
                | FunctionCode::BlockGlobalDml
                | FunctionCode::ServerMode
                | FunctionCode::SendReplData
                | FunctionCode::NotifyHaAgentState
        )
    }

    /// §4.7: codes whose real work happens in the broker/shard layer
    /// (out of scope, §1); the CAS side of these is a thin
    /// acknowledgement (`cas::handlers::administrative_ack`).
    /// `GetQueryPlan` is deliberately excluded — it has a real handler.
    pub fn is_administrative(&self) -> bool {
        matches!(
            self,
            FunctionCode::UpdateGroupId
                | FunctionCode::GidRemovedInfoInsert
                | FunctionCode::GidRemovedInfoDelete
                | FunctionCode::GidSkeyInfoDelete
                | FunctionCode::BlockGlobalDml
                | FunctionCode::SendReplData
                | FunctionCode::NotifyHaAgentState
        )
    }
}
