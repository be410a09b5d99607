use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::errors::{Result, SyncError};
use crate::projector::ProjectedDocument;

/// Prefix of every staged configuration file name
pub const STAGED_PREFIX: &str = "amc_";

/// Configuration document materialized on disk for a single sync attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDocument {
    tenant: String,
    name: String,
    path: PathBuf,
}

impl StagedDocument {
    /// File name used for a tenant's staged document (`amc_<tenant>`)
    pub fn name_for(tenant: &str) -> String {
        format!("{STAGED_PREFIX}{tenant}")
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Per-tenant staging area under a temporary root
///
/// Layout: `<root>/<tenant>/<name>`, directories `0700` and files `0600` on
/// unix.
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: PathBuf,
}

impl StagingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<system temp dir>/mimir-operator`
    pub fn default_root() -> PathBuf {
        std::env::temp_dir().join("mimir-operator")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a tenant's staged documents
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTenant`] if the tenant ID is not a single
    /// normal path segment.
    pub fn tenant_dir(&self, tenant: &str) -> Result<PathBuf> {
        check_segment(tenant).map_err(|reason| SyncError::InvalidTenant {
            tenant: tenant.to_string(),
            reason,
        })?;
        Ok(self.root.join(tenant))
    }

    /// Write a document to `<root>/<tenant>/<name>`
    ///
    /// The tenant directory is created if missing. Any previous content of the
    /// file is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTenant`] for unusable tenant IDs or names and
    /// [`SyncError::StagingWrite`] on any I/O failure.
    #[instrument(
        name = "StagingStore::stage",
        skip_all,
        fields(tenant = tenant, name = name)
    )]
    pub async fn stage(
        &self,
        tenant: &str,
        name: &str,
        document: &ProjectedDocument,
    ) -> Result<StagedDocument> {
        let dir = self.tenant_dir(tenant)?;
        check_segment(name).map_err(|reason| SyncError::InvalidTenant {
            tenant: tenant.to_string(),
            reason,
        })?;
        let path = dir.join(name);

        create_private_dir(&dir)
            .await
            .map_err(|source| SyncError::StagingWrite {
                path: dir.clone(),
                source,
            })?;

        write_private_file(&path, document.as_bytes())
            .await
            .map_err(|source| SyncError::StagingWrite {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "Staged alertmanager configuration");
        Ok(StagedDocument {
            tenant: tenant.to_string(),
            name: name.to_string(),
            path,
        })
    }

    /// Remove a staged document
    ///
    /// Removing a path that no longer exists succeeds. The tenant directory is
    /// left in place.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StagingCleanup`] if the file exists but cannot be
    /// removed.
    pub async fn unstage(&self, path: &Path) -> Result<()> {
        removed(path, tokio::fs::remove_file(path).await)
    }

    /// Blocking variant of [`unstage`](Self::unstage) for contexts that
    /// cannot await, such as `Drop`
    pub fn unstage_blocking(&self, path: &Path) -> Result<()> {
        removed(path, std::fs::remove_file(path))
    }
}

fn removed(path: &Path, result: io::Result<()>) -> Result<()> {
    match result {
        Ok(()) => {
            debug!(path = %path.display(), "Removed staged configuration");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SyncError::StagingCleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn check_segment(segment: &str) -> std::result::Result<(), &'static str> {
    if segment.is_empty() {
        return Err("must not be empty");
    }
    if segment.contains(['/', '\\', '\0']) {
        return Err("must not contain path separators");
    }
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err("must be a single path segment"),
    }
}

async fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await?;

    // mode() only applies to directories created here
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }
    Ok(())
}

async fn write_private_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;

    // mode() only applies on creation
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }

    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Mapping;
    use tempfile::TempDir;
    use url::Url;

    use crate::projector::ConfigProjector;
    use crate::types::AlertManagerConfig;

    fn document(config: &str) -> ProjectedDocument {
        let config: Mapping = serde_yaml::from_str(config).unwrap();
        let resource =
            AlertManagerConfig::new("t1", Url::parse("http://localhost:8080").unwrap(), config);
        ConfigProjector::new().project(&resource).unwrap()
    }

    #[tokio::test]
    async fn test_stage_writes_document_under_tenant_dir() {
        let temp_dir = TempDir::new().unwrap();
        let store = StagingStore::new(temp_dir.path());
        let doc = document("groups: []");

        let staged = store
            .stage("t1", &StagedDocument::name_for("t1"), &doc)
            .await
            .unwrap();

        assert_eq!(staged.tenant(), "t1");
        assert_eq!(staged.name(), "amc_t1");
        assert_eq!(staged.path(), temp_dir.path().join("t1").join("amc_t1"));
        assert_eq!(
            std::fs::read_to_string(staged.path()).unwrap(),
            doc.as_str()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stage_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = StagingStore::new(temp_dir.path());

        let staged = store
            .stage("t1", "amc_t1", &document("groups: []"))
            .await
            .unwrap();

        let file_mode = std::fs::metadata(staged.path()).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);

        let dir_mode = std::fs::metadata(temp_dir.path().join("t1"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o077, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stage_tightens_existing_tenant_dir() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let tenant_dir = temp_dir.path().join("t1");
        std::fs::create_dir(&tenant_dir).unwrap();
        std::fs::set_permissions(&tenant_dir, std::fs::Permissions::from_mode(0o755)).unwrap();
        let store = StagingStore::new(temp_dir.path());

        store
            .stage("t1", "amc_t1", &document("groups: []"))
            .await
            .unwrap();

        let dir_mode = std::fs::metadata(&tenant_dir).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn test_stage_is_idempotent_and_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let store = StagingStore::new(temp_dir.path());

        store
            .stage("t1", "amc_t1", &document("groups:\n  - name: a-much-longer-group-name\n"))
            .await
            .unwrap();
        let staged = store
            .stage("t1", "amc_t1", &document("groups: []"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(staged.path()).unwrap();
        assert!(!content.contains("a-much-longer-group-name"));
        assert_eq!(content, document("groups: []").as_str());
    }

    #[tokio::test]
    async fn test_unstage_removes_file_and_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = StagingStore::new(temp_dir.path());
        let staged = store
            .stage("t1", "amc_t1", &document("groups: []"))
            .await
            .unwrap();

        store.unstage(staged.path()).await.unwrap();
        assert!(!staged.path().exists());

        store.unstage(staged.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unstage_blocking_removes_file_and_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = StagingStore::new(temp_dir.path());
        let staged = store
            .stage("t1", "amc_t1", &document("groups: []"))
            .await
            .unwrap();

        store.unstage_blocking(staged.path()).unwrap();
        assert!(!staged.path().exists());

        store.unstage_blocking(staged.path()).unwrap();
    }

    #[tokio::test]
    async fn test_unstage_failure_is_cleanup_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = StagingStore::new(temp_dir.path());
        let blocker = temp_dir.path().join("t1").join("amc_t1");
        std::fs::create_dir_all(blocker.join("nested")).unwrap();

        let err = store.unstage(&blocker).await.unwrap_err();
        assert!(matches!(err, SyncError::StagingCleanup { .. }));
    }

    #[tokio::test]
    async fn test_stage_rejects_unsafe_tenant_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = StagingStore::new(temp_dir.path());
        let doc = document("groups: []");

        for tenant in ["", "..", ".", "a/b", "../escape"] {
            let err = store.stage(tenant, "amc_x", &doc).await.unwrap_err();
            assert!(
                matches!(err, SyncError::InvalidTenant { .. }),
                "tenant {tenant:?} should be rejected"
            );
        }
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_stage_write_failure() {
        let temp_dir = TempDir::new().unwrap();
        // A regular file where the root directory should be
        let root = temp_dir.path().join("not-a-dir");
        std::fs::write(&root, b"").unwrap();
        let store = StagingStore::new(&root);

        let err = store
            .stage("t1", "amc_t1", &document("groups: []"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::StagingWrite { .. }));
    }

    #[tokio::test]
    async fn test_different_tenants_use_distinct_paths() {
        let temp_dir = TempDir::new().unwrap();
        let store = StagingStore::new(temp_dir.path());
        let doc = document("groups: []");

        let first = store.stage("t1", "amc_t1", &doc).await.unwrap();
        let second = store.stage("t2", "amc_t2", &doc).await.unwrap();

        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_default_root_is_under_temp_dir() {
        assert!(StagingStore::default_root().starts_with(std::env::temp_dir()));
    }
}
