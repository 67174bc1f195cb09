use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::core::audit::AuditLog;
use crate::core::dispatch::DispatchContext;
use crate::core::fleet::FleetRegistry;
use crate::core::lifecycle::{LifecycleComponent, LifecycleManager};
use crate::core::observers::ObserverRegistry;
use crate::core::scheduler::ScheduleEngine;
use crate::core::store::FleetStore;
use crate::interfaces::web::{ApiServer, ApiServerConfig};
use crate::logging::StreamMakeWriter;
use crate::platform::{NativePlatform, Platform};

pub struct ServeOptions {
    pub api_host: String,
    pub api_port: u16,
    pub data_dir: Option<PathBuf>,
    pub overlap_timeout_secs: i64,
}

pub fn parse_args(args: &[String]) -> ServeOptions {
    let mut options = ServeOptions {
        api_host: "127.0.0.1".to_string(),
        api_port: 18740,
        data_dir: None,
        overlap_timeout_secs: 300,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--api-host" => {
                if i + 1 < args.len() {
                    options.api_host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-port" => {
                if i + 1 < args.len() {
                    options.api_port = args[i + 1].parse().unwrap_or(18740);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--data-dir" => {
                if i + 1 < args.len() {
                    options.data_dir = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--overlap-timeout" => {
                if i + 1 < args.len() {
                    options.overlap_timeout_secs = args[i + 1].parse().unwrap_or(300);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    options
}

/// Registers persisted schedules once the rest of the control plane is up.
struct ScheduleBoot(Arc<ScheduleEngine>);

#[async_trait::async_trait]
impl LifecycleComponent for ScheduleBoot {
    async fn on_start(&mut self) -> Result<()> {
        self.0.load_persisted().await?;
        Ok(())
    }
}

pub async fn run(options: ServeOptions) -> Result<()> {
    let (log_tx, _) = tokio::sync::broadcast::channel::<String>(500);
    let make_writer = StreamMakeWriter {
        sender: log_tx.clone(),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // Ignore err in restart loop

    info!("Starting drover control plane...");

    let data_dir = options
        .data_dir
        .unwrap_or_else(NativePlatform::data_dir);
    let upload_dir = data_dir.join("uploads");

    let store = Arc::new(FleetStore::new(&data_dir).await?);
    let audit = Arc::new(AuditLog::new(store.db()));
    audit.initialize().await?;
    let fleet = Arc::new(FleetRegistry::new());
    let observers = Arc::new(ObserverRegistry::new());

    let mut lifecycle = LifecycleManager::new().await?;
    let scheduler = Arc::new(Mutex::new(lifecycle.scheduler.clone()));

    let ctx = DispatchContext {
        fleet: fleet.clone(),
        store: store.clone(),
        audit: audit.clone(),
        observers: observers.clone(),
    };
    let engine = Arc::new(ScheduleEngine::new(
        ctx,
        scheduler,
        options.overlap_timeout_secs,
    ));

    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(ApiServerConfig {
        fleet,
        store,
        audit,
        observers,
        engine: engine.clone(),
        log_tx,
        upload_dir,
        api_host: options.api_host.clone(),
        api_port: options.api_port,
    }))));
    lifecycle.attach(Arc::new(Mutex::new(ScheduleBoot(engine))));

    lifecycle.start().await?;
    info!(
        "drover ready at http://{}:{}",
        options.api_host, options.api_port
    );

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    Ok(())
}
