//! End-to-end scenarios from spec §8, run against the real crates
//! wired together rather than against a single module's unit tests.
use std::sync::Arc;

use common::config::AppServerConfig;
use common::err::{CasError, CResult};
use common::oid::{Hfid, Oid, GLOBAL_GROUPID};
use common::value::{Domain, DomainType, OrValue, Value};

use cas::conn::request_loop::handle_one_request;
use cas::conn::session::{ClientType, DbConnectMode, Session, SessionKey};
use cas::context::CasContext;
use cas::dispatch::FunctionCode;
use cas::executor::{ExecuteOutcome, PreparedStatement, QueryExecutor, StmtType};
use cas::netbuf::{read_body_size, NetBuf, NetBufReader, StatusInfo, STATUS_INFO_SIZE};
use cas::wire::{CciType, ColumnInfo};

use catalog::heap::HeapStore;
use catalog::mirror::CatalogMirror;
use catalog::record::codec::decode_to_values;
use catalog::repr::builder::{AttributeDef, ClassReprBuilder, ConstraintDef};
use catalog::repr::class_repr::{AttrLocation, AttributeRepr, ClassRepr, IndexStatus, IndexType};
use catalog::mirror::CascadeRow;

/// A single-row query executor good enough to drive the wire-level
/// prepare/execute/fetch/commit path (§8 scenario 1) and the
/// auto-commit-rollback path (§8 scenario 3) without a real SQL engine.
struct FixtureExecutor {
    fail_inserts: bool,
}

impl QueryExecutor for FixtureExecutor {
    fn prepare(&self, sql: &str) -> CResult<PreparedStatement> {
        let upper = sql.trim_start().to_uppercase();
        let stmt_type = if upper.starts_with("SELECT") { StmtType::Select } else { StmtType::Insert };
        let columns = if stmt_type == StmtType::Select {
            vec![ColumnInfo { cci_type: CciType::Int, scale: 0, precision: 10, name: "col1".into() }]
        } else {
            vec![]
        };
        Ok(PreparedStatement { sql: sql.to_string(), stmt_type, num_markers: 0, columns })
    }

    fn execute(&self, stmt: &PreparedStatement, _host_vars: &[OrValue]) -> CResult<ExecuteOutcome> {
        match stmt.stmt_type {
            StmtType::Select => Ok(ExecuteOutcome::rows(vec![vec![OrValue::Scalar(Value::Integer(1))]])),
            _ if self.fail_inserts => Err(CasError::Dbms { code: -670, message: "no such table t".into() }),
            _ => Ok(ExecuteOutcome::affected(1)),
        }
    }
}

fn fresh_ctx() -> CasContext {
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

fn body_of(framed: &[u8]) -> &[u8] {
    &framed[4 + STATUS_INFO_SIZE..]
}

/// §8 scenario 1: connect -> prepare -> execute -> fetch -> commit,
/// driven entirely through [`handle_one_request`]'s wire encoding, the
/// same call the connection loop makes for every request.
#[test]
fn connect_prepare_execute_fetch_commit_disconnect() {
    let mut ctx = fresh_ctx();
    assert_ne!(ctx.session.key.session_id, 0, "a freshly established session carries a non-zero session id");
    let executor = FixtureExecutor { fail_inserts: false };

    let mut prepare_body = NetBuf::new();
    prepare_body.put_cas_string("SELECT 1");
    prepare_body.put_i8(0); // not holdable
    let framed = handle_one_request(&mut ctx, &executor, FunctionCode::Prepare, &prepare_body.into_vec(), StatusInfo::default());
    let body = body_of(&framed);
    let mut reader = NetBufReader::new(body);
    let handle_id = reader.get_i32().unwrap();
    assert_eq!(handle_id, 1);
    let stmt_type = reader.get_i8().unwrap();
    assert_eq!(stmt_type, 0); // SELECT
    let num_markers = reader.get_i32().unwrap();
    assert_eq!(num_markers, 0);
    let num_columns = reader.get_i32().unwrap();
    assert_eq!(num_columns, 1);

    let mut execute_body = NetBuf::new();
    execute_body.put_i32(handle_id);
    execute_body.put_i32(0); // max_row: no cap
    execute_body.put_i32(0); // zero host vars
    let framed = handle_one_request(&mut ctx, &executor, FunctionCode::Execute, &execute_body.into_vec(), StatusInfo::default());
    let body = body_of(&framed);
    let mut reader = NetBufReader::new(body);
    let _affected = reader.get_i64().unwrap();
    let row_count = reader.get_i32().unwrap();
    assert_eq!(row_count, 1, "execute eagerly fetches the first batch for a result-producing statement");

    let mut fetch_body = NetBuf::new();
    fetch_body.put_i32(handle_id);
    let framed = handle_one_request(&mut ctx, &executor, FunctionCode::Fetch, &fetch_body.into_vec(), StatusInfo::default());
    let body = body_of(&framed);
    let mut reader = NetBufReader::new(body);
    let row_count = reader.get_i32().unwrap();
    assert_eq!(row_count, 0, "the single row was already drained by execute's eager fetch");
    let cursor_closed = reader.get_i8().unwrap();
    assert_eq!(cursor_closed, 1);

    let mut commit_body = NetBuf::new();
    commit_body.put_i8(1); // commit
    let framed = handle_one_request(&mut ctx, &executor, FunctionCode::EndTran, &commit_body.into_vec(), StatusInfo::default());
    assert_eq!(read_body_size(&framed).unwrap() as usize, STATUS_INFO_SIZE, "commit reply carries no body");
}

/// §8 scenario 2: preparing the same SQL text twice in one session
/// reuses the cached handle once statement pooling kicks in.
#[test]
fn duplicate_prepare_is_cached() {
    let mut ctx = fresh_ctx();
    let executor = FixtureExecutor { fail_inserts: false };

    let mut body = NetBuf::new();
    body.put_cas_string("SELECT 1");
    body.put_i8(0);
    let body_bytes = body.into_vec();

    let framed1 = handle_one_request(&mut ctx, &executor, FunctionCode::Prepare, &body_bytes, StatusInfo::default());
    let framed2 = handle_one_request(&mut ctx, &executor, FunctionCode::Prepare, &body_bytes, StatusInfo::default());

    let id1 = NetBufReader::new(body_of(&framed1)).get_i32().unwrap();
    let id2 = NetBufReader::new(body_of(&framed2)).get_i32().unwrap();
    assert_eq!(id1, id2);
}

/// §8 scenario 3: an auto-commit failure on execute rolls back, and a
/// follow-up `server_mode` reports `OUT_TRAN`.
#[test]
fn auto_commit_rollback_then_server_mode_reports_out_tran() {
    let mut ctx = fresh_ctx();
    let executor = FixtureExecutor { fail_inserts: true };

    let mut prepare_body = NetBuf::new();
    prepare_body.put_cas_string("INSERT INTO t VALUES ('x')");
    prepare_body.put_i8(0);
    let framed = handle_one_request(&mut ctx, &executor, FunctionCode::Prepare, &prepare_body.into_vec(), StatusInfo::default());
    let handle_id = NetBufReader::new(body_of(&framed)).get_i32().unwrap();

    let mut execute_body = NetBuf::new();
    execute_body.put_i32(handle_id);
    execute_body.put_i32(0);
    execute_body.put_i32(0);
    let framed = handle_one_request(&mut ctx, &executor, FunctionCode::Execute, &execute_body.into_vec(), StatusInfo::default());
    assert_eq!(body_of(&framed)[0] as i8, -1, "execute reply carries a DBMS error");

    let framed = handle_one_request(&mut ctx, &executor, FunctionCode::ServerMode, &[], StatusInfo::default());
    assert_eq!(body_of(&framed)[0], 0, "connection landed OUT_TRAN after the implicit rollback");
}

/// §8 scenario 4: cancelling mid-request leaves the connection usable
/// for the next one. `CancelQuery` flips the flag the query executor's
/// scan hook is expected to check; this test exercises the dispatcher
/// side of that contract (the storage/query layer's hook itself is out
/// of scope, §1).
#[test]
fn cancellation_flag_is_visible_to_the_next_request_and_connection_stays_open() {
    let mut ctx = fresh_ctx();
    let executor = FixtureExecutor { fail_inserts: false };

    assert!(!ctx.dispatcher.cancellation.is_cancelled());
    let _ = handle_one_request(&mut ctx, &executor, FunctionCode::CancelQuery, &[], StatusInfo::default());
    assert!(ctx.dispatcher.cancellation.is_cancelled());

    // The connection is still usable: an ordinary request right after
    // cancellation succeeds normally.
    let mut prepare_body = NetBuf::new();
    prepare_body.put_cas_string("SELECT 1");
    prepare_body.put_i8(0);
    let framed = handle_one_request(&mut ctx, &executor, FunctionCode::Prepare, &prepare_body.into_vec(), StatusInfo::default());
    assert_eq!(body_of(&framed)[0] as i8, 0, "a prepare right after cancellation is not itself an error");
}

/// Framing invariant (§8): `body_size` always equals the bytes written
/// after the header, across every function code exercised above.
#[test]
fn framing_body_size_matches_actual_body_length() {
    let mut ctx = fresh_ctx();
    let executor = FixtureExecutor { fail_inserts: false };
    let framed = handle_one_request(&mut ctx, &executor, FunctionCode::CheckCasAlive, &[], StatusInfo::default());
    let declared = read_body_size(&framed).unwrap() as usize;
    assert_eq!(declared, framed.len() - 4);
}

struct InMemoryHeap {
    rows: std::sync::Mutex<std::collections::HashMap<Oid, Vec<u8>>>,
    next_slot: std::sync::atomic::AtomicI32,
}

impl InMemoryHeap {
    fn new() -> Self {
        InMemoryHeap { rows: std::sync::Mutex::new(std::collections::HashMap::new()), next_slot: std::sync::atomic::AtomicI32::new(1) }
    }
}

impl HeapStore for InMemoryHeap {
    fn insert(&self, _hfid: Hfid, record: &[u8]) -> CResult<Oid> {
        let slot = self.next_slot.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let oid = Oid::new(0, slot, 0, GLOBAL_GROUPID);
        self.rows.lock().unwrap().insert(oid, record.to_vec());
        Ok(oid)
    }

    fn update(&self, oid: Oid, record: &[u8]) -> CResult<()> {
        self.rows.lock().unwrap().insert(oid, record.to_vec());
        Ok(())
    }

    fn delete(&self, oid: Oid) -> CResult<()> {
        self.rows.lock().unwrap().remove(&oid);
        Ok(())
    }

    fn read(&self, oid: Oid) -> CResult<Vec<u8>> {
        self.rows.lock().unwrap().get(&oid).cloned().ok_or(CasError::Internal("row not found".into()))
    }
}

/// A `db_attribute`-shaped child repr: `class_of` (the root
/// back-pointer), `self_oid` (the two-phase self-reference), and
/// `name` — just enough to exercise §4.4's cascade stamping without
/// pulling in the full attribute-representation builder.
fn attribute_row_repr() -> Arc<ClassRepr> {
    let oid_domain = Arc::new(Domain::scalar(DomainType::Oid));
    let name_domain = Arc::new(Domain::scalar(DomainType::Varchar));
    let class_of_attr = AttributeRepr::reduced(1, AttrLocation::Fixed(0), 0, oid_domain.clone());
    let self_attr = AttributeRepr::reduced(2, AttrLocation::Fixed(10), 1, oid_domain);
    let mut name_attr = AttributeRepr::reduced(3, AttrLocation::Variable(0), 2, name_domain);
    name_attr.is_fixed = false;
    Arc::new(ClassRepr {
        class_oid: Oid::NULL,
        repr_id: 0,
        attributes: vec![class_of_attr, self_attr, name_attr],
        indexes: vec![],
        fixed_length: 20,
        n_variable: 1,
        is_shard_table: false,
    })
}

/// §8 scenario 5: build a minimal class with two fixed int columns and
/// one PK index, insert it through the catalog mirror, decode the
/// stored record back through the builder's representation, and
/// confirm the columns and PK invariant survive; then confirm the
/// class's `db_attribute` cascade children land with `class_of`
/// resolving to the class's own row oid (§4.4 step 2, §8's "every
/// `class_of` resolves back to `root_oid`" invariant); then delete the
/// class and confirm nothing remains.
#[test]
fn catalog_mirror_round_trip_for_a_two_column_primary_key_table() {
    let heap = InMemoryHeap::new();
    let mirror = CatalogMirror::new(heap);

    let attrs = vec![
        AttributeDef {
            id: 1,
            name: "id".into(),
            domain: Arc::new(Domain::scalar(DomainType::Integer)),
            default_value: None,
            current_default_value: None,
            is_notnull: true,
            is_shard_key: false,
            dropped: false,
        },
        AttributeDef {
            id: 2,
            name: "value".into(),
            domain: Arc::new(Domain::scalar(DomainType::Integer)),
            default_value: None,
            current_default_value: None,
            is_notnull: false,
            is_shard_key: false,
            dropped: false,
        },
    ];
    let constraints = vec![ConstraintDef {
        btid: common::oid::Btid { vfid: 10, root_page_id: 1 },
        index_type: IndexType::PrimaryKey,
        status: IndexStatus::Normal,
        name: "pk_c_id".into(),
        attr_ids: vec![1],
        asc_desc: vec![true],
    }];

    let repr = ClassReprBuilder::build_current(Oid::NULL, 0, &attrs, &constraints, false).unwrap();
    assert!(repr.check_primary_key_invariant());
    let repr = Arc::new(repr);

    let attr_repr = attribute_row_repr();
    let attribute_children = vec![
        CascadeRow {
            class_oid: Oid::new(0, 501, 0, GLOBAL_GROUPID),
            hfid: Hfid { vfid: 2, header_page_id: 0 },
            repr: attr_repr.clone(),
            values: vec![
                OrValue::Scalar(Value::Null),
                OrValue::Scalar(Value::Null),
                OrValue::Scalar(Value::Varchar("id".into())),
            ],
            self_ref_attrs: vec![1],
            class_of_attr: Some(0),
            children: vec![],
        },
        CascadeRow {
            class_oid: Oid::new(0, 502, 0, GLOBAL_GROUPID),
            hfid: Hfid { vfid: 2, header_page_id: 0 },
            repr: attr_repr.clone(),
            values: vec![
                OrValue::Scalar(Value::Null),
                OrValue::Scalar(Value::Null),
                OrValue::Scalar(Value::Varchar("value".into())),
            ],
            self_ref_attrs: vec![1],
            class_of_attr: Some(0),
            children: vec![],
        },
    ];

    let class_oid = Oid::new(0, 500, 0, GLOBAL_GROUPID);
    let row = CascadeRow {
        class_oid,
        hfid: Hfid { vfid: 1, header_page_id: 0 },
        repr: repr.clone(),
        values: vec![OrValue::Scalar(Value::Integer(7)), OrValue::Scalar(Value::Integer(42))],
        self_ref_attrs: vec![],
        class_of_attr: None,
        children: attribute_children,
    };

    let row_oid = mirror.insert_class(&row, true).unwrap();
    assert_eq!(mirror.class_oid_cache().get(class_oid), Some(row_oid));

    let stored = mirror.heap_for_test().read(row_oid).unwrap();
    let decoded = decode_to_values(&stored, &repr).unwrap();
    assert_eq!(decoded[0], OrValue::Scalar(Value::Integer(7)));
    assert_eq!(decoded[1], OrValue::Scalar(Value::Integer(42)));

    // Every db_attribute child's class_of must resolve back to the
    // class row's own oid, and its self_oid must no longer be NULL.
    let child_oids: Vec<Oid> =
        mirror.heap_for_test().rows.lock().unwrap().keys().filter(|oid| **oid != row_oid).copied().collect();
    assert_eq!(child_oids.len(), 2);
    for child_oid in &child_oids {
        let stored_child = mirror.heap_for_test().read(*child_oid).unwrap();
        let decoded_child = decode_to_values(&stored_child, &attr_repr).unwrap();
        assert_eq!(decoded_child[0], OrValue::Scalar(Value::Oid(row_oid)), "class_of must resolve back to the class row's oid");
        assert_ne!(decoded_child[1], OrValue::Scalar(Value::Null), "self_oid must no longer be NULL after insert");
    }

    mirror.delete_class(&row, row_oid, &child_oids, true).unwrap();
    assert_eq!(mirror.class_oid_cache().get(class_oid), None);
    assert!(mirror.heap_for_test().read(row_oid).is_err());
    for child_oid in &child_oids {
        assert!(mirror.heap_for_test().read(*child_oid).is_err(), "cascade delete must remove attribute children too");
    }
}

/// §8 scenario 6: a holdable cursor's handle survives a `COMMIT` (so a
/// client can keep fetching from it in the next transaction) but is
/// freed like everything else on `ROLLBACK`, driven through the same
/// wire-level [`handle_one_request`] path as scenario 1.
#[test]
fn holdable_cursor_survives_commit_but_not_rollback() {
    let mut ctx = fresh_ctx();
    let executor = FixtureExecutor { fail_inserts: false };

    let mut prepare_body = NetBuf::new();
    prepare_body.put_cas_string("SELECT 1");
    prepare_body.put_i8(1); // holdable
    let framed = handle_one_request(&mut ctx, &executor, FunctionCode::Prepare, &prepare_body.into_vec(), StatusInfo::default());
    let holdable_handle = NetBufReader::new(body_of(&framed)).get_i32().unwrap();

    let mut plain_body = NetBuf::new();
    plain_body.put_cas_string("SELECT 2");
    plain_body.put_i8(0); // not holdable
    let framed = handle_one_request(&mut ctx, &executor, FunctionCode::Prepare, &plain_body.into_vec(), StatusInfo::default());
    let plain_handle = NetBufReader::new(body_of(&framed)).get_i32().unwrap();
    assert_ne!(holdable_handle, plain_handle);

    let mut commit_body = NetBuf::new();
    commit_body.put_i8(1); // commit
    let _ = handle_one_request(&mut ctx, &executor, FunctionCode::EndTran, &commit_body.into_vec(), StatusInfo::default());
    assert!(ctx.handles.get(holdable_handle).is_ok(), "a holdable handle outlives a commit");
    assert!(ctx.handles.get(plain_handle).is_err(), "a non-holdable handle does not outlive a commit");

    let mut rollback_body = NetBuf::new();
    rollback_body.put_i8(0); // rollback
    let _ = handle_one_request(&mut ctx, &executor, FunctionCode::EndTran, &rollback_body.into_vec(), StatusInfo::default());
    assert!(ctx.handles.get(holdable_handle).is_err(), "even a holdable handle does not survive a rollback");
}
