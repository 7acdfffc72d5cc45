//! Direct-serve writer.
//!
//! Publishes files into the filesystem tree that the HTTP server exposes
//! under `/files/`.

use std::path::Path;

use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{required, AccessInfo};
use crate::error::{Error, Result};

/// Write the stream to `<baseDir>/<folder>/<filename>`.
pub async fn write_direct_serve(
    cancel: &CancellationToken,
    access: &AccessInfo,
    mut reader: File,
) -> Result<()> {
    let base_dir = required(access, "baseDir")?;
    let filename = required(access, "filename")?;
    let folder = access.get("folder").map(String::as_str).unwrap_or("");

    let full_dir = Path::new(base_dir).join(folder);
    let full_path = full_dir.join(filename);

    tokio::fs::create_dir_all(&full_dir)
        .await
        .map_err(|e| Error::writer(format!("failed to create directories: {}", e)))?;

    let mut file = File::create(&full_path)
        .await
        .map_err(|e| Error::writer(format!("failed to create file {}: {}", full_path.display(), e)))?;

    tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        copied = tokio::io::copy(&mut reader, &mut file) => {
            copied.map_err(|e| {
                Error::writer(format!("failed to write to file {}: {}", full_path.display(), e))
            })?;
        }
    }

    info!("Saved file '{}' to '{}'", filename, full_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(base: &str, folder: &str, filename: &str) -> AccessInfo {
        [
            ("baseDir".to_string(), base.to_string()),
            ("folder".to_string(), folder.to_string()),
            ("filename".to_string(), filename.to_string()),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_writes_into_folder() {
        let serve = tempfile::tempdir().unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("src.jpg");
        tokio::fs::write(&src, b"jpeg bytes").await.unwrap();

        let reader = File::open(&src).await.unwrap();
        let info = access(serve.path().to_str().unwrap(), "u/1", "out.jpg");
        write_direct_serve(&CancellationToken::new(), &info, reader)
            .await
            .unwrap();

        let published = serve.path().join("u/1/out.jpg");
        assert_eq!(tokio::fs::read(&published).await.unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_empty_folder_writes_at_root() {
        let serve = tempfile::tempdir().unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("src");
        tokio::fs::write(&src, b"data").await.unwrap();

        let reader = File::open(&src).await.unwrap();
        let info = access(serve.path().to_str().unwrap(), "", "plain.bin");
        write_direct_serve(&CancellationToken::new(), &info, reader)
            .await
            .unwrap();

        assert!(serve.path().join("plain.bin").exists());
    }

    #[tokio::test]
    async fn test_missing_base_dir_fails() {
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("src");
        tokio::fs::write(&src, b"data").await.unwrap();
        let reader = File::open(&src).await.unwrap();

        let info: AccessInfo = [("filename".to_string(), "f".to_string())].into_iter().collect();
        let err = write_direct_serve(&CancellationToken::new(), &info, reader)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("baseDir"));
    }
}
