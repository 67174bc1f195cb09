mod handlers;
mod router;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use tracing::info;

use crate::core::audit::AuditLog;
use crate::core::dispatch::DispatchContext;
use crate::core::fleet::FleetRegistry;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::observers::ObserverRegistry;
use crate::core::scheduler::ScheduleEngine;
use crate::core::store::FleetStore;

pub struct ApiServerConfig {
    pub fleet: Arc<FleetRegistry>,
    pub store: Arc<FleetStore>,
    pub audit: Arc<AuditLog>,
    pub observers: Arc<ObserverRegistry>,
    pub engine: Arc<ScheduleEngine>,
    pub log_tx: tokio::sync::broadcast::Sender<String>,
    pub upload_dir: PathBuf,
    pub api_host: String,
    pub api_port: u16,
}

pub struct ApiServer {
    config: Option<ApiServerConfig>,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) fleet: Arc<FleetRegistry>,
    pub(crate) store: Arc<FleetStore>,
    pub(crate) audit: Arc<AuditLog>,
    pub(crate) observers: Arc<ObserverRegistry>,
    pub(crate) engine: Arc<ScheduleEngine>,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
    pub(crate) upload_dir: PathBuf,
    pub(crate) api_port: u16,
}

impl AppState {
    pub(crate) fn dispatch_ctx(&self) -> DispatchContext {
        DispatchContext {
            fleet: self.fleet.clone(),
            store: self.store.clone(),
            audit: self.audit.clone(),
            observers: self.observers.clone(),
        }
    }
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            config: Some(config),
        }
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| {
        match msg {
            Ok(log) => Ok(Event::default().data(log)), // SSE properly encodes this
            Err(_) => Ok(Event::default().data("Log stream lagged")),
        }
    });

    Sse::new(stream)
}

// --- Lifecycle Implementation ---

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let Some(config) = self.config.take() else {
            return Ok(());
        };

        tokio::spawn(async move {
            let addr = format!("{}:{}", config.api_host, config.api_port);
            let state = AppState {
                fleet: config.fleet,
                store: config.store,
                audit: config.audit,
                observers: config.observers,
                engine: config.engine,
                log_tx: config.log_tx,
                upload_dir: config.upload_dir,
                api_port: config.api_port,
            };
            let app = router::build_api_router(state);

            if let Ok(listener) = tokio::net::TcpListener::bind(&addr).await {
                info!("API Server running at http://{addr}");
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!("API Server crashed: {}", e);
                }
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        Ok(())
    }
}
