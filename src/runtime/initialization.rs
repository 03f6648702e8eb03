//! # Initialization
//!
//! One-time process setup before the controller starts: rustls, tracing,
//! metrics, the probe server socket, the Kubernetes client, and the wiring of
//! informer, queue, dispatcher, event recorder and reconciler.

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::dispatch::{ActionDispatcher, KubeObjectStore, NamespaceAnnotator};
use crate::controller::events::KubeEventRecorder;
use crate::controller::informer::{EnqueueHandler, Informer};
use crate::controller::queue::{controller_rate_limiter, WorkQueue};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{self, ServerState};
use crate::crd::Annotation;
use crate::observability;
use crate::runtime::controller::Controller;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Namespace;
use kube::{api::Api, Client};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Everything `run` needs to start the controller
pub struct InitializationResult {
    /// API the informer watches
    pub annotations: Api<Annotation>,
    pub informer: Informer<Annotation>,
    pub controller: Controller,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Bound probe server socket
    pub listener: TcpListener,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("controller", &self.controller)
            .field("listener", &self.listener.local_addr().ok())
            .finish_non_exhaustive()
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the default `annotation_controller=info` filter.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "annotation_controller=info".into()),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - Binding the HTTP server port
/// - Kubernetes client creation
/// - Informer, work queue, dispatcher, event recorder and reconciler wiring
pub async fn initialize(
    config: &ControllerConfig,
    server_config: &ServerConfig,
) -> Result<InitializationResult> {
    // Must run before any TLS connection is made
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_existing| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    init_tracing()?;

    info!("Starting Annotation Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        workers = config.workers,
        namespace = config.watch_namespace().unwrap_or("*"),
        max_retries = config.max_retries,
        "Controller configuration"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let listener = server::bind(server_config.metrics_port)
        .await
        .with_context(|| format!("Failed to bind HTTP server on port {}", server_config.metrics_port))?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let annotations: Api<Annotation> = match config.watch_namespace() {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };

    let queue = WorkQueue::new(controller_rate_limiter(
        config.backoff_base(),
        config.backoff_max(),
        config.rate_limit_qps,
        config.rate_limit_burst,
    ));
    let informer: Informer<Annotation> =
        Informer::new(Arc::new(EnqueueHandler::new(queue.clone())));

    let namespaces = KubeObjectStore::new(
        Api::<Namespace>::all(client.clone()),
        config.controller_name.as_str(),
    );
    let dispatcher = ActionDispatcher::new().with_handler(
        NamespaceAnnotator::KIND,
        NamespaceAnnotator::new(Arc::new(namespaces)),
    );
    info!(kinds = ?dispatcher.kinds().collect::<Vec<_>>(), "Registered target handlers");

    let recorder = KubeEventRecorder::new(
        client,
        &config.controller_name,
        config.instance.clone(),
    );
    let reconciler = Reconciler::new(Arc::new(informer.cache()), dispatcher, Arc::new(recorder));

    let controller = Controller::new(queue, reconciler)
        .with_config(config)
        .with_server_state(Arc::clone(&server_state));

    info!("Controller initialized");
    Ok(InitializationResult {
        annotations,
        informer,
        controller,
        server_state,
        listener,
    })
}
