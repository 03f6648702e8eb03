//! # Annotation Controller
//!
//! A Kubernetes controller that merges annotations declared in `Annotation`
//! resources into the objects they target.
//!
//! ## Overview
//!
//! 1. **Watching Annotations** - An informer keeps a local cache of `Annotation` resources and
//!    enqueues the key of every added or updated one
//! 2. **Work queue** - Keys are deduplicated and failed keys are requeued with backoff
//! 3. **Sync** - Workers re-read the cached record and apply each target; a `namespace` target
//!    adds its data as annotations on the record's Namespace, never overwriting existing values
//! 4. **Events** - Outcomes are reported as Kubernetes Events on the record
//!
//! ## Usage
//!
//! ```bash
//! annotation-controller --workers 4 --namespace team-a
//! ```
//!
//! Every flag can also be set through the environment (`WORKERS`, `WATCH_NAMESPACE`,
//! `METRICS_PORT`, ...).

use annotation_controller::config::{ControllerConfig, ServerConfig};
use anyhow::Result;
use clap::Parser;

/// Merge declared annotations into cluster objects
#[derive(Debug, Parser)]
#[command(name = "annotation-controller", version, about, long_about = None)]
struct Args {
    /// Number of worker loops
    #[arg(long, env = "WORKERS")]
    workers: Option<usize>,

    /// Only watch Annotations in this namespace (default: all namespaces)
    #[arg(short, long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Port serving /metrics, /healthz and /readyz
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

impl Args {
    fn apply(self, config: &mut ControllerConfig, server_config: &mut ServerConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(namespace) = self.namespace {
            config.watch_namespace = namespace;
        }
        if let Some(port) = self.metrics_port {
            server_config.metrics_port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ControllerConfig::from_env();
    let mut server_config = ServerConfig::from_env();
    args.apply(&mut config, &mut server_config);

    annotation_controller::runtime::run(config, server_config).await
}
