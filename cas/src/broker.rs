//! Trait seam for the broker's shared-memory segment (§6, §9). The
//! segment itself is mapped and owned by the broker process; a CAS
//! process only ever reads configuration out of it and bumps its own
//! counters, never writes anyone else's.
pub trait BrokerShm: Send + Sync {
    fn broker_name(&self) -> &str;
    fn as_id(&self) -> i32;
    fn increment_active_session(&self);
    fn decrement_active_session(&self);
    fn active_session_count(&self) -> i64;
}

/// In-process stand-in used in tests and for a CAS process launched
/// outside of a real broker (e.g. `cas_server --standalone`).
pub struct InMemoryBrokerShm {
    broker_name: String,
    as_id: i32,
    active_sessions: std::sync::atomic::AtomicI64,
}

impl InMemoryBrokerShm {
    pub fn new(broker_name: impl Into<String>, as_id: i32) -> Self {
        InMemoryBrokerShm { broker_name: broker_name.into(), as_id, active_sessions: std::sync::atomic::AtomicI64::new(0) }
    }
}

impl BrokerShm for InMemoryBrokerShm {
    fn broker_name(&self) -> &str {
        &self.broker_name
    }

    fn as_id(&self) -> i32 {
        self.as_id
    }

    fn increment_active_session(&self) {
        self.active_sessions.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn decrement_active_session(&self) {
        self.active_sessions.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn active_session_count(&self) -> i64 {
        self.active_sessions.load(std::sync::atomic::Ordering::SeqCst)
    }
}
