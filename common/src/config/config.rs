use serde::{Deserialize, Serialize};

/// On-disk configuration for a CAS process, distinct from the two
/// mandatory environment variables of §6 (`APPL_SERVER_SHM_KEY`,
/// `AS_ID`) which identify *which* broker slot this process serves and
/// are never put in a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppServerConfig {
    pub app_name: String,

    pub dispatch: DispatchConfig,
    pub handle: HandleConfig,
    pub base: BaseConfig,
}

/// Knobs for the request dispatcher (C7): restart/timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// §4.7: "Restart the CAS if memory has grown past a configured
    /// limit and no holdable results exist."
    pub memory_limit_restart_bytes: Option<u64>,

    /// Driver-supplied query timeout ceiling, milliseconds. §4.7:
    /// "effective query timeout is min(driver_timeout, broker_timeout)".
    pub default_driver_timeout_ms: Option<u64>,

    /// Broker-supplied query timeout, milliseconds.
    pub broker_timeout_ms: Option<u64>,
}

/// Knobs for the statement/cursor cache (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleConfig {
    /// §4.8: `new_handle` fails with `MaxPreparedStmts` above this
    /// ceiling.
    pub max_prepared_stmt_count: usize,

    /// §4.6: default autocommit mode reported in the connect reply.
    pub autocommit_default: bool,

    /// §4.6: whether this build supports holdable cursors.
    pub holdable_result_support: bool,

    /// §4.6: whether statement pooling is enabled by default.
    pub statement_pooling: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    pub log_dir: Option<String>,
}

impl Default for AppServerConfig {
    fn default() -> Self {
        AppServerConfig {
            app_name: String::from("cas"),
            dispatch: DispatchConfig::default(),
            handle: HandleConfig::default(),
            base: BaseConfig::default(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            memory_limit_restart_bytes: Some(256 * 1024 * 1024),
            default_driver_timeout_ms: None,
            broker_timeout_ms: Some(30_000),
        }
    }
}

impl Default for HandleConfig {
    fn default() -> Self {
        HandleConfig {
            max_prepared_stmt_count: 1024,
            autocommit_default: true,
            holdable_result_support: true,
            statement_pooling: true,
        }
    }
}

impl Default for BaseConfig {
    fn default() -> Self {
        BaseConfig { log_dir: Some(String::from("/tmp/cas/logs")) }
    }
}

impl DispatchConfig {
    /// §4.7: "effective query timeout is min(driver_timeout,
    /// broker_timeout)"; returns `None` when neither side set a limit
    /// ("no limit", logged per §4.7).
    pub fn effective_query_timeout_ms(&self) -> Option<u64> {
        match (self.default_driver_timeout_ms, self.broker_timeout_ms) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}
