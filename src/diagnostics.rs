use tracing::error;

use crate::errors::SyncError;

/// One-way sink for failures that must be reported but never change a sync's
/// result
pub trait DiagnosticSink: Send + Sync {
    /// The staged document of `tenant` could not be removed
    fn cleanup_failed(&self, tenant: &str, error: &SyncError);
}

/// Reports diagnostics as `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn cleanup_failed(&self, tenant: &str, error: &SyncError) {
        error!(
            alertmanagerconfig = tenant,
            error = %error,
            "failed to cleanup fs after loading alert manager configuration to mimir"
        );
    }
}
