//! C7 Request Dispatcher (§7): looks up a request's handler by
//! function code, tracks per-connection transaction state, and
//! arbitrates cancellation and timeouts around blocking DBMS calls.
pub mod function_code;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use common::err::{CasError, CResult};

pub use function_code::FunctionCode;

/// §7: "the alive timestamp is cleared before a blocking call into the
/// DBMS and set again once it returns" — the broker polls this
/// timestamp to decide whether a CAS process is wedged. Zero means
/// "currently blocked, don't know how long".
#[derive(Default)]
pub struct AliveTracker {
    last_alive_ms: AtomicI64,
}

impl AliveTracker {
    pub fn new() -> Self {
        AliveTracker { last_alive_ms: AtomicI64::new(0) }
    }

    pub fn clear(&self) {
        self.last_alive_ms.store(0, Ordering::SeqCst);
    }

    pub fn mark_alive(&self, now_ms: i64) {
        self.last_alive_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn last_alive_ms(&self) -> i64 {
        self.last_alive_ms.load(Ordering::SeqCst)
    }

    pub fn is_blocked(&self) -> bool {
        self.last_alive_ms() == 0
    }
}

/// §7: cancellation is signalled two ways — an async-signal handler
/// flips this flag directly (`SIGURG`-style out-of-band interrupt), or
/// the dispatcher notices a cancel byte waiting on the connection via
/// a non-blocking `POLLIN` peek and flips it itself. Either way the
/// flag is the single source of truth the running handler checks.
#[derive(Default)]
pub struct CancellationFlag {
    requested: AtomicBool,
}

impl CancellationFlag {
    pub fn new() -> Self {
        CancellationFlag { requested: AtomicBool::new(false) }
    }

    pub fn request_cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

/// Non-blocking check for a pending cancel byte on `fd` using `poll`
/// with a zero timeout followed by an `MSG_PEEK` recv, so the byte
/// stays queued for the connection's regular read loop to consume
/// (§7).
#[cfg(unix)]
pub fn peek_cancel_byte(fd: std::os::unix::io::RawFd) -> CResult<bool> {
    let mut pollfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
    let rc = unsafe { libc::poll(&mut pollfd, 1, 0) };
    if rc < 0 {
        return Err(CasError::Communication(std::io::Error::last_os_error().to_string()));
    }
    if rc == 0 || pollfd.revents & libc::POLLIN == 0 {
        return Ok(false);
    }
    let mut byte = [0u8; 1];
    let n = unsafe { libc::recv(fd, byte.as_mut_ptr() as *mut libc::c_void, 1, libc::MSG_PEEK) };
    Ok(n > 0)
}

/// §7: "the effective query timeout is the smaller of the driver's
/// requested timeout and the broker's configured timeout" — either
/// side may decline to set a limit at all.
pub fn effective_timeout(driver_timeout: Option<Duration>, broker_timeout: Option<Duration>) -> Option<Duration> {
    match (driver_timeout, broker_timeout) {
        (Some(d), Some(b)) => Some(d.min(b)),
        (Some(d), None) => Some(d),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Per-connection dispatch state: which function codes participate in
/// the open transaction, the cancellation flag, and the alive tracker.
/// One instance lives for the whole connection; `autocommit` tracks
/// whether a completed request should implicitly commit (§7, §8
/// "auto-commit rollback").
pub struct Dispatcher {
    pub cancellation: CancellationFlag,
    pub alive: AliveTracker,
    pub autocommit: bool,
    pub in_transaction: bool,
    /// §4.7 step 4's `need_auto_commit`: set by a handler (e.g.
    /// `execute`) to tell the connection loop which of commit/rollback
    /// to run once the handler returns, rather than running it inline
    /// (handlers don't own the transaction manager collaborator).
    pub pending_commit: bool,
    pub pending_rollback: bool,
}

impl Dispatcher {
    pub fn new(autocommit: bool) -> Self {
        Dispatcher {
            cancellation: CancellationFlag::new(),
            alive: AliveTracker::new(),
            autocommit,
            in_transaction: false,
            pending_commit: false,
            pending_rollback: false,
        }
    }

    /// Called before `code`'s handler runs (§7): opens a transaction on
    /// entry if `code` participates in one, and clears the alive
    /// timestamp since a blocking call into the handler — which may
    /// itself make a blocking DBMS call — is about to start. Split from
    /// [`Dispatcher::end_request`] rather than taking the handler as a
    /// closure because the handler itself needs `&mut` access to this
    /// same dispatcher (e.g. to set `pending_commit`).
    pub fn begin_request(&mut self, code: FunctionCode) {
        if code.is_transactional() {
            self.in_transaction = true;
        }
        self.alive.clear();
    }

    /// Called after `code`'s handler returns (§7): restores the alive
    /// timestamp, and for an autocommit connection closes the
    /// transaction a successful transactional request opened. A
    /// handler that already asked for an explicit commit/rollback via
    /// `pending_commit`/`pending_rollback` is unaffected — those are
    /// applied separately through `CasContext::apply_pending_auto_commit`.
    pub fn end_request(&mut self, code: FunctionCode, now_ms: i64, succeeded: bool) {
        self.alive.mark_alive(now_ms);

        if code.is_transactional() && self.autocommit && succeeded {
            self.in_transaction = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_timeout_picks_the_smaller_of_the_two() {
        let driver = Some(Duration::from_secs(30));
        let broker = Some(Duration::from_secs(10));
        assert_eq!(effective_timeout(driver, broker), Some(Duration::from_secs(10)));
    }

    #[test]
    fn effective_timeout_falls_back_when_one_side_is_unset() {
        assert_eq!(effective_timeout(None, Some(Duration::from_secs(5))), Some(Duration::from_secs(5)));
        assert_eq!(effective_timeout(Some(Duration::from_secs(5)), None), Some(Duration::from_secs(5)));
        assert_eq!(effective_timeout(None, None), None);
    }

    #[test]
    fn begin_request_clears_the_alive_timestamp() {
        let mut dispatcher = Dispatcher::new(true);
        dispatcher.alive.mark_alive(100);
        dispatcher.begin_request(FunctionCode::Execute);
        assert!(dispatcher.alive.is_blocked());
    }

    #[test]
    fn end_request_restores_the_alive_timestamp() {
        let mut dispatcher = Dispatcher::new(true);
        dispatcher.begin_request(FunctionCode::Execute);
        dispatcher.end_request(FunctionCode::Execute, 200, true);
        assert_eq!(dispatcher.alive.last_alive_ms(), 200);
    }

    #[test]
    fn begin_request_opens_a_transaction_for_transactional_codes() {
        let mut dispatcher = Dispatcher::new(false);
        dispatcher.begin_request(FunctionCode::Execute);
        assert!(dispatcher.in_transaction);
    }

    #[test]
    fn autocommit_closes_the_transaction_after_a_successful_transactional_request() {
        let mut dispatcher = Dispatcher::new(true);
        dispatcher.begin_request(FunctionCode::Execute);
        dispatcher.end_request(FunctionCode::Execute, 1, true);
        assert!(!dispatcher.in_transaction);
    }

    #[test]
    fn autocommit_keeps_the_transaction_open_after_a_failed_request() {
        let mut dispatcher = Dispatcher::new(true);
        dispatcher.begin_request(FunctionCode::Execute);
        dispatcher.end_request(FunctionCode::Execute, 1, false);
        assert!(dispatcher.in_transaction);
    }

    #[test]
    fn non_transactional_requests_never_open_a_transaction() {
        let mut dispatcher = Dispatcher::new(false);
        dispatcher.begin_request(FunctionCode::CheckCasAlive);
        dispatcher.end_request(FunctionCode::CheckCasAlive, 1, true);
        assert!(!dispatcher.in_transaction);
    }

    #[test]
    fn manual_commit_mode_keeps_the_transaction_open_after_success() {
        let mut dispatcher = Dispatcher::new(false);
        dispatcher.begin_request(FunctionCode::Execute);
        dispatcher.end_request(FunctionCode::Execute, 1, true);
        assert!(dispatcher.in_transaction);
    }

    #[test]
    fn cancellation_flag_round_trips() {
        let flag = CancellationFlag::new();
        assert!(!flag.is_cancelled());
        flag.request_cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!flag.is_cancelled());
    }
}
