//! Per-connection state (§9: "a `CasContext` struct replaces the file-
//! scope globals the original CAS process kept"). One instance is
//! created per accepted connection and lives for as long as it does.
use common::config::AppServerConfig;

use crate::conn::session::Session;
use crate::dispatch::Dispatcher;
use crate::handle::HandleTable;

pub struct CasContext {
    pub session: Session,
    pub dispatcher: Dispatcher,
    pub handles: HandleTable,
    pub config: AppServerConfig,
}

impl CasContext {
    pub fn new(session: Session, config: &AppServerConfig) -> Self {
        CasContext {
            session,
            dispatcher: Dispatcher::new(config.handle.autocommit_default),
            handles: HandleTable::new(config.handle.max_prepared_stmt_count),
            config: config.clone(),
        }
    }

    /// §8: on `COMMIT`, holdable handles survive; on `ROLLBACK`,
    /// nothing does.
    pub fn end_transaction(&mut self, committed: bool) {
        self.handles.free_all(!committed);
        self.dispatcher.in_transaction = false;
        self.dispatcher.pending_commit = false;
        self.dispatcher.pending_rollback = false;
    }

    /// §4.7 step 4: "After the handler, if `need_auto_commit !=
    /// NONE`, run the commit or rollback, then set connection status
    /// to `OUT_TRAN`." Handlers set `pending_commit`/`pending_rollback`
    /// on the dispatcher rather than calling `end_transaction`
    /// directly, so this single chokepoint is what the connection loop
    /// calls after every dispatched request.
    pub fn apply_pending_auto_commit(&mut self) {
        if self.dispatcher.pending_rollback {
            self.end_transaction(false);
        } else if self.dispatcher.pending_commit {
            self.end_transaction(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::session::{ClientType, DbConnectMode, SessionKey};
    use crate::handle::StatementHandle;

    fn sample_session() -> Session {
        Session {
            key: SessionKey::from_seed(1),
            client_type: ClientType::Cci,
            connect_mode: DbConnectMode::ReadWrite,
            db_name: "testdb".into(),
            db_user: "dba".into(),
        }
    }

    #[test]
    fn rollback_frees_holdable_handles_too() {
        let config = AppServerConfig::default();
        let mut ctx = CasContext::new(sample_session(), &config);
        let id = ctx.handles.alloc(StatementHandle::new("select 1", true)).unwrap();
        ctx.end_transaction(false);
        assert!(ctx.handles.get(id).is_err());
    }

    #[test]
    fn commit_keeps_holdable_handles() {
        let config = AppServerConfig::default();
        let mut ctx = CasContext::new(sample_session(), &config);
        let id = ctx.handles.alloc(StatementHandle::new("select 1", true)).unwrap();
        ctx.end_transaction(true);
        assert!(ctx.handles.get(id).is_ok());
    }
}
