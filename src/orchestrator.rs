use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::client::SyncClient;
use crate::config::SyncConfig;
use crate::diagnostics::{DiagnosticSink, TracingDiagnostics};
use crate::errors::{RemoteError, Result, SyncError, SyncStage};
use crate::projector::ConfigProjector;
use crate::staging::{StagedDocument, StagingStore};
use crate::types::{AlertManagerConfig, Authentication};

/// Per-tenant single-flight locks
///
/// Entries only live while some caller holds or waits for them.
#[derive(Default)]
struct TenantLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TenantLocks {
    async fn acquire(&self, tenant: &str) -> TenantGuard<'_> {
        let lock = self
            .locks
            .lock()
            .entry(tenant.to_string())
            .or_default()
            .clone();

        TenantGuard {
            guard: Some(lock.lock_owned().await),
            locks: self,
            tenant: tenant.to_string(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

struct TenantGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a TenantLocks,
    tenant: String,
}

impl Drop for TenantGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.locks.locks.lock();
        if let Some(lock) = locks.get(&self.tenant) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&self.tenant);
            }
        }
    }
}

/// Removes a staged document if the sync future is dropped before cleanup
/// finished
struct StagedCleanup<'a> {
    path: Option<&'a Path>,
    store: &'a StagingStore,
    tenant: &'a str,
    diagnostics: &'a dyn DiagnosticSink,
}

impl StagedCleanup<'_> {
    fn disarm(mut self) {
        self.path = None;
    }
}

impl Drop for StagedCleanup<'_> {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(err) = self.store.unstage_blocking(path) {
                self.diagnostics.cleanup_failed(self.tenant, &err);
            }
        }
    }
}

#[derive(Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

/// Drives a tenant's configuration from an `AlertManagerConfig` into Mimir
///
/// A sync projects the resource, stages the document, verifies it, applies
/// it and removes the staged file on every path once it was written. Calls
/// for the same tenant run one at a time; different tenants run concurrently.
///
/// # Example
///
/// ```rust,no_run
/// use mimir_alertmanager_sync::{
///     AlertManagerConfig, Authentication, MimirClient, StagingStore, TenantSyncOrchestrator,
/// };
/// use std::time::Duration;
/// use url::Url;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = TenantSyncOrchestrator::new(
///         MimirClient::new(Duration::from_secs(10))?,
///         StagingStore::new(StagingStore::default_root()),
///     );
///
///     let config = serde_yaml::from_str("groups:\n  - name: g1\n    rules: []\n")?;
///     let resource = AlertManagerConfig::new("t1", Url::parse("http://mimir:8080")?, config);
///
///     orchestrator.sync(&Authentication::None, &resource).await?;
///     Ok(())
/// }
/// ```
pub struct TenantSyncOrchestrator<C> {
    client: C,
    store: StagingStore,
    projector: ConfigProjector,
    diagnostics: Arc<dyn DiagnosticSink>,
    sync_timeout: Option<Duration>,
    in_flight: TenantLocks,
}

impl<C: SyncClient> TenantSyncOrchestrator<C> {
    pub fn new(client: C, store: StagingStore) -> Self {
        Self {
            client,
            store,
            projector: ConfigProjector::new(),
            diagnostics: Arc::new(TracingDiagnostics),
            sync_timeout: None,
            in_flight: TenantLocks::default(),
        }
    }

    /// Create an orchestrator using the staging root and deadline from `config`
    pub fn from_config(client: C, config: &SyncConfig) -> Self {
        Self::new(client, StagingStore::new(config.staging_root()))
            .with_sync_timeout(config.sync_timeout())
    }

    /// Replace the sink receiving cleanup failures
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Bound the time spent in remote calls of a single sync
    pub fn with_sync_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn store(&self) -> &StagingStore {
        &self.store
    }

    /// Push the desired configuration of `resource` to Mimir
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage. A failure to remove the
    /// staged document is only reported to the diagnostic sink.
    pub async fn sync(
        &self,
        auth: &Authentication,
        resource: &AlertManagerConfig,
    ) -> Result<()> {
        self.sync_with_cancel(auth, resource, &CancellationToken::new())
            .await
    }

    /// Like [`sync`](Self::sync), aborting in-flight remote calls once
    /// `cancel` fires
    #[instrument(
        name = "TenantSyncOrchestrator::sync",
        skip_all,
        fields(alertmanagerconfig = %resource.tenant_id())
    )]
    pub async fn sync_with_cancel(
        &self,
        auth: &Authentication,
        resource: &AlertManagerConfig,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let tenant = resource.tenant_id();
        let _guard = self
            .acquire(tenant, SyncStage::Projection, cancel)
            .await?;

        let document = self.projector.project(resource)?;
        let staged = self
            .store
            .stage(tenant, &StagedDocument::name_for(tenant), &document)
            .await?;
        let cleanup = StagedCleanup {
            path: Some(staged.path()),
            store: &self.store,
            tenant,
            diagnostics: self.diagnostics.as_ref(),
        };

        let deadline = self.deadline();
        let result = self
            .verify_and_apply(auth, resource, &staged, cancel, deadline)
            .await;

        if let Err(err) = self.store.unstage(staged.path()).await {
            self.diagnostics.cleanup_failed(tenant, &err);
        }
        cleanup.disarm();

        if result.is_ok() {
            debug!("Alertmanager configuration synchronized");
        }
        result
    }

    /// Remove the tenant's configuration from Mimir
    ///
    /// No staging happens on this path.
    pub async fn delete(
        &self,
        auth: &Authentication,
        resource: &AlertManagerConfig,
    ) -> Result<()> {
        self.delete_with_cancel(auth, resource, &CancellationToken::new())
            .await
    }

    /// Like [`delete`](Self::delete), aborting the remote call once `cancel`
    /// fires
    #[instrument(
        name = "TenantSyncOrchestrator::delete",
        skip_all,
        fields(alertmanagerconfig = %resource.tenant_id())
    )]
    pub async fn delete_with_cancel(
        &self,
        auth: &Authentication,
        resource: &AlertManagerConfig,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let tenant = resource.tenant_id();
        let _guard = self.acquire(tenant, SyncStage::Delete, cancel).await?;

        self.guarded(
            SyncStage::Delete,
            cancel,
            self.deadline(),
            self.client.delete(auth, tenant, resource.endpoint()),
            SyncError::Delete,
        )
        .await?;

        debug!("Alertmanager configuration deleted");
        Ok(())
    }

    async fn verify_and_apply(
        &self,
        auth: &Authentication,
        resource: &AlertManagerConfig,
        staged: &StagedDocument,
        cancel: &CancellationToken,
        deadline: Option<Deadline>,
    ) -> Result<()> {
        let verified = self
            .guarded(
                SyncStage::Verification,
                cancel,
                deadline,
                self.client.verify(auth, staged.path()),
                SyncError::Verification,
            )
            .await;
        if let Err(err) = verified {
            error!(error = %err, "failed to validate configuration");
            return Err(err);
        }

        self.guarded(
            SyncStage::Apply,
            cancel,
            deadline,
            self.client
                .apply(auth, staged.path(), staged.tenant(), resource.endpoint()),
            SyncError::Apply,
        )
        .await
    }

    /// Wait for the tenant's single-flight lock unless `cancel` fires first
    async fn acquire(
        &self,
        tenant: &str,
        stage: SyncStage,
        cancel: &CancellationToken,
    ) -> Result<TenantGuard<'_>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled { stage }),
            guard = self.in_flight.acquire(tenant) => Ok(guard),
        }
    }

    fn deadline(&self) -> Option<Deadline> {
        self.sync_timeout.map(|budget| Deadline {
            at: Instant::now() + budget,
            budget,
        })
    }

    /// Run a remote call, giving up on cancellation or once the deadline passes
    async fn guarded<F>(
        &self,
        stage: SyncStage,
        cancel: &CancellationToken,
        deadline: Option<Deadline>,
        call: F,
        wrap: fn(RemoteError) -> SyncError,
    ) -> Result<()>
    where
        F: Future<Output = std::result::Result<(), RemoteError>>,
    {
        let timed = async {
            match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline.at, call).await {
                    Ok(result) => result.map_err(wrap),
                    Err(_) => Err(SyncError::Timeout {
                        stage,
                        after: deadline.budget,
                    }),
                },
                None => call.await.map_err(wrap),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled { stage }),
            result = timed => result,
        }
    }
}
