use anyhow::Result;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// On-disk image bytes, one flat file per image at `{dir}/{image_id}`.
/// Metadata lives in the database.
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn file_path(&self, image_id: Uuid) -> PathBuf {
        self.dir.join(image_id.to_string())
    }

    pub async fn write(&self, image_id: Uuid, data: &[u8]) -> Result<()> {
        let mut file = fs::File::create(self.file_path(image_id)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    /// `None` when the file is missing.
    pub async fn read(&self, image_id: Uuid) -> Result<Option<Vec<u8>>> {
        match fs::read(self.file_path(image_id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, image_id: Uuid) -> Result<()> {
        match fs::remove_file(self.file_path(image_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("File for image {} already gone", image_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best effort; failures are logged and skipped.
    pub async fn delete_all(&self, image_ids: &[Uuid]) {
        for id in image_ids {
            if let Err(e) = self.delete(*id).await {
                warn!("Failed to delete file for image {}: {}", id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("images")).await.unwrap();
        let id = Uuid::new_v4();

        assert!(store.read(id).await.unwrap().is_none());
        store.write(id, b"\x89PNG").await.unwrap();
        assert_eq!(store.read(id).await.unwrap().as_deref(), Some(&b"\x89PNG"[..]));

        store.delete(id).await.unwrap();
        // Deleting twice is fine.
        store.delete(id).await.unwrap();
        assert!(store.read(id).await.unwrap().is_none());
    }
}
