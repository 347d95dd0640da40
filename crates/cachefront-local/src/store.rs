//! On-disk object layout.
//!
//! One file per fingerprint under a single data directory, named
//! `<fingerprint><extension>`. Downloads land on a staging path and
//! become visible by rename once admitted, so readers never observe a
//! half-written artifact.

use cachefront_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// Opens (and creates if needed) the data directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Final path of the object for a fingerprint: `<root>/<fp><ext>`.
    pub fn object_path(&self, fingerprint: &str, ext: &str) -> PathBuf {
        self.root.join(format!("{fingerprint}{ext}"))
    }

    /// Where a download is staged before admission.
    pub fn staging_path(&self, fingerprint: &str) -> PathBuf {
        self.root.join(format!("{fingerprint}.part"))
    }

    /// Publish a staged download as the object file.
    pub async fn publish(&self, staging: &Path, object: &Path) -> Result<()> {
        tokio::fs::rename(staging, object).await?;
        Ok(())
    }

    /// Remove a file, tolerating it being already gone.
    pub async fn remove(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// First `len` bytes of a file (fewer when the file is shorter), for
    /// the sniffing gate.
    pub async fn read_head(&self, path: &Path, len: usize) -> Result<Vec<u8>> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut buf = vec![0u8; len];
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_concatenate_fingerprint_and_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(tmp.path().join("data")).unwrap();
        let fp = "ab".repeat(32);

        assert_eq!(
            store.object_path(&fp, ".png"),
            tmp.path().join("data").join(format!("{fp}.png"))
        );
        assert_eq!(
            store.object_path(&fp, ""),
            tmp.path().join("data").join(fp.clone())
        );
        assert_eq!(
            store.staging_path(&fp),
            tmp.path().join("data").join(format!("{fp}.part"))
        );
    }

    #[tokio::test]
    async fn publish_moves_the_staged_file_into_place() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(tmp.path().join("data")).unwrap();
        let staging = store.staging_path("f00d");
        let object = store.object_path("f00d", ".css");

        tokio::fs::write(&staging, b"a { color: red }").await.unwrap();
        store.publish(&staging, &object).await.unwrap();

        assert!(!staging.exists());
        assert_eq!(std::fs::read(&object).unwrap(), b"a { color: red }");
    }

    #[tokio::test]
    async fn remove_tolerates_missing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(tmp.path().join("data")).unwrap();
        store
            .remove(&store.object_path("dead", ".js"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn read_head_is_bounded_and_short_read_safe() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(tmp.path().join("data")).unwrap();
        let p = store.object_path("beef", ".bin");

        tokio::fs::write(&p, vec![7u8; 2048]).await.unwrap();
        assert_eq!(store.read_head(&p, 512).await.unwrap().len(), 512);

        tokio::fs::write(&p, b"tiny").await.unwrap();
        assert_eq!(store.read_head(&p, 512).await.unwrap(), b"tiny");
    }
}
