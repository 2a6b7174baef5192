mod cli;
mod stubs;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use cas::broker::InMemoryBrokerShm;
use cas::conn::UnixScmHandoff;
use common::config::load_style::Format;
use common::config::{read_config, AppServerConfig, BrokerEnv};
use common::err::CResult;
use common::log::tracing_factory::{OutputType, TracingFactory, TracingFactoryOptions};
use common::server::{Server, ShutdownHandle};

use crate::cli::CliArgs;
use crate::stubs::{AcceptAllAuthenticator, AllowAllAcl, UnimplementedExecutor};

/// Fixed descriptor the broker's control socket is inherited on (§6
/// step 1: "the broker ... hands the already-connected socket to a CAS
/// process"). The broker process convention this crate follows is that
/// the spawning broker dup2s its control pipe onto this fd before
/// exec-ing the CAS binary, the way prefork worker protocols commonly
/// pass a listening/control descriptor down to a child.
const BROKER_CONTROL_FD: std::os::unix::io::RawFd = 3;

/// §6: the broker-spawned CAS process loop. `start` waits for a
/// shutdown signal; the actual per-connection dispatch (handshake,
/// request loop) is driven by [`cas::context::CasContext`] once a
/// client fd is handed off, built in [`run_one_connection`].
struct CasServerProcess {
    shm: Arc<InMemoryBrokerShm>,
}

#[async_trait::async_trait]
impl Server for CasServerProcess {
    async fn start(&mut self) -> CResult<()> {
        info!(broker = self.shm.broker_name(), as_id = self.shm.as_id(), "cas process ready for handoff");
        Ok(())
    }

    async fn shutdown(&mut self, graceful: bool) -> CResult<()> {
        info!(graceful, "cas process shutting down");
        Ok(())
    }
}

/// Repeatedly receives a client fd from the broker and serves it to
/// completion before accepting the next one (§6: one CAS process
/// handles one connection at a time, going back to the broker for the
/// next handoff once the previous client disconnects).
async fn accept_loop(config: AppServerConfig, shm_index: i32) {
    let acl = AllowAllAcl;
    let authenticator = AcceptAllAuthenticator;
    let executor = UnimplementedExecutor;
    let session_counter = std::sync::atomic::AtomicU64::new(1);
    let server_start_time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i32)
        .unwrap_or(0);

    loop {
        let handoff = UnixScmHandoff::new(BROKER_CONTROL_FD);
        let seed = session_counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let result = cas::conn::request_loop::run_one_connection(
            &handoff,
            &acl,
            &authenticator,
            &executor,
            &config,
            seed,
            shm_index,
            server_start_time,
        )
        .await;
        if let Err(e) = result {
            warn!(error = %e, "connection ended with an error");
        }
    }
}

#[tokio::main]
async fn main() -> CResult<()> {
    let args = CliArgs::parse();

    let broker_env = match BrokerEnv::from_process_env() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };

    let config = match &args.config {
        Some(path) => {
            let format = if path.extension().and_then(|e| e.to_str()) == Some("yaml") { Format::Yaml } else { Format::Toml };
            read_config(path, format)?
        }
        None => AppServerConfig::default(),
    };

    let log_opt = TracingFactoryOptions::new(args.debug, OutputType::File, config.base.log_dir.clone());
    let log_factory = TracingFactory::init_log_with_options(log_opt);
    info!(log_dir = log_factory.get_log_dir(), "logging initialized");

    let shm = Arc::new(InMemoryBrokerShm::new(config.app_name.clone(), broker_env.as_id));

    let mut process = CasServerProcess { shm: shm.clone() };
    process.start().await?;

    let mut shutdown_handle = ShutdownHandle::create();
    shutdown_handle.add_service(Box::new(process));

    let accept_task = tokio::spawn(accept_loop(config, broker_env.as_id));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    accept_task.abort();
    shutdown_handle.shutdown_services(true).await?;

    Ok(())
}
