//! `station` – the base station daemon.
//!
//! 1. Loads `~/.station/config.toml`; writes the defaults there on first run.
//! 2. Opens the JSON inventory and the platform link, either TCP to
//!    `platform_addr` (dialled and re-dialled by the watchdog, so an absent
//!    platform is not fatal) or an in-process simulated platform
//!    (`simulate = true`).
//! 3. Serves length-delimited requests on `listen_addr` until **Ctrl-C**,
//!    then persists the inventory and exits.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use station_inventory::JsonFileStore;
use station_link::{
    PlatformClient, ShutdownTrigger, SimulatedPlatform, TcpPlatformClient, TcpRequestServer,
    channel_link, shutdown_channel,
};
use station_runtime::telemetry::init_tracing;
use station_runtime::{BaseManager, ManagerConfig};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const SIM_LINK_CAPACITY: usize = 64;

fn main() -> ExitCode {
    let guard = init_tracing("station");
    info!(otlp = guard.is_exporting(), "tracing initialised");

    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "configuration unusable");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start the Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "station failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> Result<config::Config, String> {
    let path = config::config_path();
    if let Some(cfg) = config::load_from(&path)? {
        info!(path = %path.display(), "config loaded");
        return Ok(cfg);
    }

    let mut cfg = config::Config::default();
    match config::save_to(&cfg, &path) {
        Ok(()) => info!(path = %path.display(), "no config found; wrote defaults"),
        Err(e) => warn!(error = %e, "no config found; running on defaults"),
    }
    config::apply_env_overrides(&mut cfg);
    Ok(cfg)
}

async fn serve(cfg: config::Config) -> Result<(), BoxError> {
    let store = Arc::new(JsonFileStore::new(&cfg.inventory_file));

    let mut simulator: Option<(ShutdownTrigger, JoinHandle<()>)> = None;
    let client: Arc<dyn PlatformClient> = if cfg.simulate {
        let (client, platform) = channel_link(SIM_LINK_CAPACITY);
        let (trigger, signal) = shutdown_channel();
        simulator = Some((trigger, tokio::spawn(SimulatedPlatform::new(platform).run(signal))));
        info!("using simulated platform");
        Arc::new(client)
    } else {
        let client = TcpPlatformClient::new(cfg.platform_addr.as_str());
        info!(platform = client.addr(), "platform link dialled by the watchdog");
        Arc::new(client)
    };

    let manager = Arc::new(BaseManager::new(
        store,
        client,
        ManagerConfig {
            heartbeat_timeout: cfg.heartbeat_timeout(),
        },
    )?);
    let server = TcpRequestServer::bind(cfg.listen_addr.as_str()).await?;
    info!(
        listen = %server.local_addr()?,
        inventory = %cfg.inventory_file.display(),
        "station listening"
    );

    let mut running = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run(&server).await }
    });

    let finished_early = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "Ctrl-C handler failed; shutting down");
            } else {
                info!("Ctrl-C received; shutting down");
            }
            None
        }
        finished = &mut running => Some(finished),
    };

    let persisted = manager.shutdown();
    let outcome = match finished_early {
        Some(finished) => finished,
        None => running.await,
    };
    if let Some((trigger, task)) = simulator {
        trigger.trigger();
        if let Err(e) = task.await {
            warn!(error = %e, "simulated platform task failed");
        }
    }

    persisted?;
    outcome??;
    info!("station exited cleanly");
    Ok(())
}
