//! # Mimir Alertmanager Sync
//!
//! Synchronizes `AlertManagerConfig` resources with the multi-tenant
//! Alertmanager of [Grafana Mimir](https://grafana.com/docs/mimir/latest/).
//!
//! ## Features
//!
//! - Projects a resource down to the configuration document Mimir expects
//! - Stages the document per tenant and always removes it afterwards
//! - Verifies the document before loading it into Mimir
//! - Serializes syncs of the same tenant, runs different tenants concurrently
//! - Cancellation and deadlines for in-flight remote calls
//!
//! ## Example
//!
//! ```rust,no_run
//! use mimir_alertmanager_sync::{
//!     AlertManagerConfig, Authentication, MimirClient, SyncConfig, TenantSyncOrchestrator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::from_env();
//!     mimir_alertmanager_sync::init_logging(&config.log_level);
//!
//!     let client = MimirClient::new(config.request_timeout())?;
//!     let orchestrator = TenantSyncOrchestrator::from_config(client, &config);
//!
//!     let resource: AlertManagerConfig = serde_yaml::from_str(
//!         r#"
//! spec:
//!   id: t1
//!   url: http://mimir:8080
//!   config:
//!     groups:
//!       - name: g1
//!         rules: []
//! "#,
//!     )?;
//!
//!     let auth = Authentication::basic("tenant-admin", "api-key");
//!     orchestrator.sync(&auth, &resource).await?;
//!
//!     // On removal of the resource
//!     orchestrator.delete(&auth, &resource).await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod diagnostics;
mod errors;
mod orchestrator;
mod projector;
mod staging;
mod types;

pub use client::{MimirClient, SyncClient, TENANT_HEADER};
pub use config::SyncConfig;
pub use diagnostics::{DiagnosticSink, TracingDiagnostics};
pub use errors::{RemoteError, Result, SyncError, SyncStage};
pub use orchestrator::TenantSyncOrchestrator;
pub use projector::{ConfigProjector, ProjectedDocument};
pub use staging::{StagedDocument, StagingStore, STAGED_PREFIX};
pub use tokio_util::sync::CancellationToken;
pub use types::{AlertManagerConfig, AlertManagerConfigSpec, Authentication, ObjectMeta};

/// Initializes the tracing subscriber for logging.
///
/// This should be called once at application startup. `RUST_LOG` takes
/// precedence over `level`.
///
/// # Arguments
///
/// * `level` - The log level (error, warn, info, debug, trace)
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mimir_alertmanager_sync={level}")));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
