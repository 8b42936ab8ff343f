/// Document store for uploaded pitch decks.
///
/// Files are written under a generated name (`<uuid>.<ext>`) so uploads never collide and
/// earlier decks stay addressable after a re-upload. Bytes are streamed to a `.partial` file
/// in bounded chunks and renamed into place only once fully flushed, so a failed write is
/// never visible under the final name.
use std::fmt::Display;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{DocumentFormat, DocumentRef};

/// Maximum bytes handed to a single write call.
const WRITE_CHUNK_SIZE: usize = 8 * 1024;

pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Open the store, creating the root directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| AppError::Storage(format!("create {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    /// Persist an upload and return its reference.
    ///
    /// The stream is consumed incrementally; memory use does not depend on file size.
    /// A stream error, an I/O error, or an empty upload leaves nothing behind.
    pub async fn store<S, E>(
        &self,
        owner_id: Uuid,
        original_name: &str,
        format: DocumentFormat,
        stream: S,
    ) -> Result<DocumentRef, AppError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let id = Uuid::new_v4();
        let final_path = self.root.join(format!("{id}.{}", format.extension()));
        let partial_path = self.root.join(format!("{id}.{}.partial", format.extension()));

        match write_stream(&partial_path, stream).await {
            Ok((size_bytes, _)) if size_bytes == 0 => {
                discard(&partial_path).await;
                Err(AppError::InvalidInput("uploaded file is empty".to_string()))
            }
            Ok((size_bytes, sha256)) => {
                if let Err(e) = tokio::fs::rename(&partial_path, &final_path).await {
                    discard(&partial_path).await;
                    return Err(AppError::Storage(format!(
                        "rename {}: {e}",
                        partial_path.display()
                    )));
                }
                info!(
                    document_id = %id,
                    owner_id = %owner_id,
                    size_bytes,
                    path = %final_path.display(),
                    "document stored"
                );
                Ok(DocumentRef {
                    id,
                    owner_id,
                    path: final_path,
                    format,
                    original_name: original_name.to_string(),
                    size_bytes,
                    sha256,
                    created_at: Utc::now(),
                })
            }
            Err(e) => {
                discard(&partial_path).await;
                Err(e)
            }
        }
    }
}

/// Write the stream to `path`, returning the byte count and hex SHA-256.
async fn write_stream<S, E>(path: &Path, stream: S) -> Result<(u64, String), AppError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| AppError::Storage(format!("create {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    let mut size_bytes: u64 = 0;

    let mut stream = std::pin::pin!(stream);
    while let Some(next) = stream.next().await {
        let chunk = next.map_err(|e| AppError::Storage(format!("upload stream failed: {e}")))?;
        for piece in chunk.chunks(WRITE_CHUNK_SIZE) {
            file.write_all(piece)
                .await
                .map_err(|e| AppError::Storage(format!("write {}: {e}", path.display())))?;
            hasher.update(piece);
            size_bytes += piece.len() as u64;
        }
    }

    file.flush()
        .await
        .map_err(|e| AppError::Storage(format!("flush {}: {e}", path.display())))?;
    file.sync_all()
        .await
        .map_err(|e| AppError::Storage(format!("sync {}: {e}", path.display())))?;

    Ok((size_bytes, format!("{:x}", hasher.finalize())))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, path = %path.display(), "failed to remove partial upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(*p)))
                .collect::<Vec<_>>(),
        )
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn stores_stream_under_generated_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let owner = Uuid::new_v4();

        let doc = store
            .store(owner, "My Deck.pdf", DocumentFormat::Pdf, chunks(&[b"%PDF-", b"1.4 body"]))
            .await
            .unwrap();

        assert_eq!(doc.owner_id, owner);
        assert_eq!(doc.original_name, "My Deck.pdf");
        assert_eq!(doc.size_bytes, 13);
        assert_eq!(doc.path, dir.path().join(format!("{}.pdf", doc.id)));
        assert_eq!(std::fs::read(&doc.path).unwrap(), b"%PDF-1.4 body");

        let expected = format!("{:x}", Sha256::digest(b"%PDF-1.4 body"));
        assert_eq!(doc.sha256, expected);
        assert_eq!(file_names(dir.path()), vec![format!("{}.pdf", doc.id)]);
    }

    #[tokio::test]
    async fn large_chunks_are_written_completely() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let payload = vec![7u8; WRITE_CHUNK_SIZE * 3 + 17];
        let body = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(payload.clone()))]);

        let doc = store
            .store(Uuid::new_v4(), "big.pptx", DocumentFormat::SlideDeck, body)
            .await
            .unwrap();
        assert_eq!(doc.size_bytes, payload.len() as u64);
        assert_eq!(std::fs::read(&doc.path).unwrap(), payload);
    }

    #[tokio::test]
    async fn reupload_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let owner = Uuid::new_v4();

        let first = store
            .store(owner, "deck.pdf", DocumentFormat::Pdf, chunks(&[b"one"]))
            .await
            .unwrap();
        let second = store
            .store(owner, "deck.pdf", DocumentFormat::Pdf, chunks(&[b"two"]))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert!(first.path.exists());
        assert!(second.path.exists());
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
        ]);

        let err = store
            .store(Uuid::new_v4(), "deck.pdf", DocumentFormat::Pdf, body)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(file_names(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();

        let err = store
            .store(Uuid::new_v4(), "deck.pdf", DocumentFormat::Pdf, chunks(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(file_names(dir.path()).is_empty());
    }
}
