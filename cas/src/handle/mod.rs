//! C8 Statement & Cursor Cache (§8): the dense, id-addressed table of
//! prepared statements a connection keeps open, grown in
//! [`SRV_HANDLE_ALLOC_SIZE`]-slot chunks.
pub mod query_result;

use catalog::record::header::SRV_HANDLE_ALLOC_SIZE;
use common::err::{CasError, CResult};

pub use query_result::QueryResult;

/// One entry of the handle table (§8). `is_holdable` decides whether
/// the handle survives a `COMMIT` (it never survives a `ROLLBACK`).
/// `stmt_type`/`num_markers`/`columns` are filled in by `prepare`
/// (§4.7) once the query executor has compiled the SQL text.
pub struct StatementHandle {
    pub sql: String,
    pub is_holdable: bool,
    pub result: Option<QueryResult>,
    pub stmt_type: Option<crate::executor::StmtType>,
    pub num_markers: i32,
    pub columns: Vec<crate::wire::ColumnInfo>,
}

impl StatementHandle {
    pub fn new(sql: impl Into<String>, is_holdable: bool) -> Self {
        StatementHandle { sql: sql.into(), is_holdable, result: None, stmt_type: None, num_markers: 0, columns: Vec::new() }
    }
}

/// `current_handle_count` is how many slots are presently occupied;
/// `max_handle_id` is the capacity high-water mark — the table only
/// grows, even as individual handles are freed and their slots
/// recycled, because `max_handle_id` is what downstream statement-pool
/// accounting (§8's `statement_pooling`) keys its limits against, not
/// the transient occupancy (§4.8).
pub struct HandleTable {
    slots: Vec<Option<StatementHandle>>,
    current_handle_count: usize,
    max_prepared_stmt_count: usize,
    /// §8 "statement_pooling": sql text -> the still-live handle id
    /// that was prepared for it, so a duplicate `Prepare` of the same
    /// text reuses the cached plan instead of allocating a new slot.
    sql_to_handle: std::collections::HashMap<String, i32>,
}

impl HandleTable {
    pub fn new(max_prepared_stmt_count: usize) -> Self {
        HandleTable { slots: Vec::new(), current_handle_count: 0, max_prepared_stmt_count, sql_to_handle: std::collections::HashMap::new() }
    }

    /// §8: `Prepare` with statement pooling enabled returns the
    /// existing handle for identical `sql` text rather than allocating
    /// a new one. Pooling disabled (or no prior match) falls back to
    /// `alloc`.
    pub fn prepare(&mut self, sql: &str, is_holdable: bool, pooling_enabled: bool) -> CResult<i32> {
        if pooling_enabled {
            if let Some(&id) = self.sql_to_handle.get(sql) {
                if self.get(id).is_ok() {
                    return Ok(id);
                }
                self.sql_to_handle.remove(sql);
            }
        }

        let id = self.alloc(StatementHandle::new(sql, is_holdable))?;
        if pooling_enabled {
            self.sql_to_handle.insert(sql.to_string(), id);
        }
        Ok(id)
    }

    pub fn current_handle_count(&self) -> usize {
        self.current_handle_count
    }

    pub fn max_handle_id(&self) -> usize {
        self.slots.len()
    }

    /// §8: finds a free slot, growing the table by
    /// [`SRV_HANDLE_ALLOC_SIZE`] if none exist. Handle ids are 1-based
    /// (0 is reserved as "no handle" on the wire).
    pub fn alloc(&mut self, handle: StatementHandle) -> CResult<i32> {
        if self.current_handle_count >= self.max_prepared_stmt_count {
            return Err(CasError::MaxPreparedStmts);
        }

        if let Some(slot) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[slot] = Some(handle);
            self.current_handle_count += 1;
            return Ok((slot + 1) as i32);
        }

        let old_len = self.slots.len();
        self.slots.resize_with(old_len + SRV_HANDLE_ALLOC_SIZE, || None);
        self.slots[old_len] = Some(handle);
        self.current_handle_count += 1;
        Ok((old_len + 1) as i32)
    }

    fn slot_index(id: i32) -> CResult<usize> {
        if id < 1 {
            return Err(CasError::SrvHandle(id));
        }
        Ok((id - 1) as usize)
    }

    pub fn get(&self, id: i32) -> CResult<&StatementHandle> {
        let idx = Self::slot_index(id)?;
        self.slots.get(idx).and_then(|s| s.as_ref()).ok_or(CasError::SrvHandle(id))
    }

    pub fn get_mut(&mut self, id: i32) -> CResult<&mut StatementHandle> {
        let idx = Self::slot_index(id)?;
        self.slots.get_mut(idx).and_then(|s| s.as_mut()).ok_or(CasError::SrvHandle(id))
    }

    pub fn free(&mut self, id: i32) -> CResult<()> {
        let idx = Self::slot_index(id)?;
        let slot = self.slots.get_mut(idx).ok_or(CasError::SrvHandle(id))?;
        if slot.take().is_some() {
            self.current_handle_count -= 1;
            Ok(())
        } else {
            Err(CasError::SrvHandle(id))
        }
    }

    /// §8: frees every handle, except holdable ones when
    /// `free_holdable` is `false`. Called with `free_holdable = false`
    /// on `COMMIT` (holdable cursors survive) and `free_holdable = true`
    /// on `ROLLBACK` or connection close (nothing survives).
    pub fn free_all(&mut self, free_holdable: bool) {
        for slot in self.slots.iter_mut() {
            let keep = matches!(slot, Some(h) if h.is_holdable && !free_holdable);
            if !keep && slot.is_some() {
                *slot = None;
                self.current_handle_count -= 1;
            }
        }
    }
}
