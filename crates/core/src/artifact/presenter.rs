//! Artifact presenter implementation.

use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::job::OutputFormat;
use crate::metrics::ARTIFACT_RELABELS;

use super::types::{Artifact, ArtifactError, HANDLE_PREFIX};

/// Turns job output into retrievable artifacts and owns their handles.
///
/// Every handle stays resolvable until it is revoked; callers revoke an
/// artifact's handle when the session that holds it resets or is replaced.
#[derive(Debug, Default)]
pub struct ArtifactPresenter {
    store: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl ArtifactPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps freshly produced bytes as an artifact of `format`.
    pub async fn present(&self, bytes: Vec<u8>, format: OutputFormat) -> Artifact {
        let bytes: Arc<[u8]> = Arc::from(bytes);
        let artifact = Self::labeled(Arc::clone(&bytes), format, format);
        self.store
            .write()
            .await
            .insert(artifact.retrieval_handle.clone(), bytes);

        info!(
            handle = %artifact.retrieval_handle,
            size_bytes = artifact.size_bytes,
            mime_type = %artifact.mime_type,
            "Artifact ready"
        );
        artifact
    }

    /// Offers the same bytes under another container label.
    ///
    /// The byte stream is not touched, so this is only allowed within one
    /// container family. Issues a new handle and revokes the old one.
    pub async fn relabel(
        &self,
        artifact: &Artifact,
        label: OutputFormat,
    ) -> Result<Artifact, ArtifactError> {
        if !artifact.container.can_relabel_as(label) {
            return Err(ArtifactError::IncompatibleLabel {
                from: artifact.container,
                to: label,
            });
        }

        let mut store = self.store.write().await;
        let bytes = store.remove(&artifact.retrieval_handle).ok_or_else(|| {
            ArtifactError::UnknownHandle {
                handle: artifact.retrieval_handle.clone(),
            }
        })?;

        let relabeled = Self::labeled(Arc::clone(&bytes), artifact.container, label);
        store.insert(relabeled.retrieval_handle.clone(), bytes);
        ARTIFACT_RELABELS.inc();

        debug!(
            from = %artifact.label,
            to = %label,
            handle = %relabeled.retrieval_handle,
            "Relabeled artifact"
        );
        Ok(relabeled)
    }

    /// Bytes behind a live handle.
    pub async fn resolve(&self, handle: &str) -> Result<Arc<[u8]>, ArtifactError> {
        self.store
            .read()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| ArtifactError::UnknownHandle {
                handle: handle.to_string(),
            })
    }

    /// Releases a handle. Returns whether it was live.
    pub async fn revoke(&self, handle: &str) -> bool {
        let revoked = self.store.write().await.remove(handle).is_some();
        if revoked {
            debug!(handle, "Revoked artifact handle");
        }
        revoked
    }

    /// Writes the artifact into `dir` under its default filename.
    pub async fn save(&self, artifact: &Artifact, dir: &Path) -> Result<PathBuf, ArtifactError> {
        let bytes = self.resolve(&artifact.retrieval_handle).await?;
        let path = dir.join(&artifact.default_filename);

        tokio::fs::write(&path, &bytes[..])
            .await
            .map_err(|source| ArtifactError::SaveFailed {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "Artifact saved");
        Ok(path)
    }

    /// Number of handles not yet revoked.
    pub async fn live_handles(&self) -> usize {
        self.store.read().await.len()
    }

    fn labeled(bytes: Arc<[u8]>, container: OutputFormat, label: OutputFormat) -> Artifact {
        Artifact {
            size_bytes: bytes.len() as u64,
            bytes,
            mime_type: label.mime_type().to_string(),
            default_filename: format!("video.{}", label.extension()),
            retrieval_handle: format!("{}{}", HANDLE_PREFIX, Uuid::new_v4()),
            container,
            label,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_present_mp4() {
        let presenter = ArtifactPresenter::new();
        let artifact = presenter.present(vec![1, 2, 3], OutputFormat::Mp4).await;

        assert_eq!(artifact.mime_type, "video/mp4");
        assert_eq!(artifact.default_filename, "video.mp4");
        assert_eq!(artifact.size_bytes, 3);
        assert!(artifact.retrieval_handle.starts_with(HANDLE_PREFIX));
        assert_eq!(
            presenter.resolve(&artifact.retrieval_handle).await.unwrap().to_vec(),
            vec![1u8, 2, 3]
        );
        assert_eq!(presenter.live_handles().await, 1);
    }

    #[tokio::test]
    async fn test_relabel_within_family() {
        let presenter = ArtifactPresenter::new();
        let original = presenter.present(vec![5; 10], OutputFormat::Mp4).await;

        let relabeled = presenter.relabel(&original, OutputFormat::Mov).await.unwrap();

        assert_eq!(relabeled.mime_type, "video/quicktime");
        assert_eq!(relabeled.default_filename, "video.mov");
        assert_eq!(relabeled.container, OutputFormat::Mp4);
        assert_eq!(relabeled.label, OutputFormat::Mov);
        assert_eq!(relabeled.bytes, original.bytes);
        assert_ne!(relabeled.retrieval_handle, original.retrieval_handle);

        // Old handle is gone, only the new one is live
        assert!(presenter.resolve(&original.retrieval_handle).await.is_err());
        assert!(presenter.resolve(&relabeled.retrieval_handle).await.is_ok());
        assert_eq!(presenter.live_handles().await, 1);
    }

    #[tokio::test]
    async fn test_relabel_across_families_is_refused() {
        let presenter = ArtifactPresenter::new();
        let original = presenter.present(vec![5; 10], OutputFormat::Mp4).await;

        let result = presenter.relabel(&original, OutputFormat::Avi).await;
        assert!(matches!(
            result,
            Err(ArtifactError::IncompatibleLabel {
                from: OutputFormat::Mp4,
                to: OutputFormat::Avi
            })
        ));
        assert!(presenter.resolve(&original.retrieval_handle).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let presenter = ArtifactPresenter::new();
        let artifact = presenter.present(vec![0], OutputFormat::Avi).await;

        assert!(presenter.revoke(&artifact.retrieval_handle).await);
        assert!(!presenter.revoke(&artifact.retrieval_handle).await);
        assert_eq!(presenter.live_handles().await, 0);
        assert!(matches!(
            presenter.resolve(&artifact.retrieval_handle).await,
            Err(ArtifactError::UnknownHandle { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_writes_default_filename() {
        let presenter = ArtifactPresenter::new();
        let artifact = presenter.present(vec![4; 128], OutputFormat::Mov).await;
        let dir = TempDir::new().unwrap();

        let path = presenter.save(&artifact, dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join("video.mov"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![4u8; 128]);
    }

    #[tokio::test]
    async fn test_save_revoked_artifact_fails() {
        let presenter = ArtifactPresenter::new();
        let artifact = presenter.present(vec![4], OutputFormat::Mp4).await;
        presenter.revoke(&artifact.retrieval_handle).await;
        let dir = TempDir::new().unwrap();

        let result = presenter.save(&artifact, dir.path()).await;
        assert!(matches!(result, Err(ArtifactError::UnknownHandle { .. })));
    }
}
