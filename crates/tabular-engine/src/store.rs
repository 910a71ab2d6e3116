//! Blob store collaborator.
//!
//! The engine persists artifacts through this trait rather than touching
//! the filesystem directly, so tests and alternative backends can swap
//! the implementation.

use std::io::Write;
use std::path::Path;

use tracing::warn;

pub trait BlobStore: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn size(&self, path: &Path) -> std::io::Result<u64>;
    fn read_bytes(&self, path: &Path) -> std::io::Result<Vec<u8>>;

    /// Write bytes so that the destination is never observable in a
    /// partially written state.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()>;
}

/// Local-filesystem blob store.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalBlobStore;

impl BlobStore for LocalBlobStore {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn size(&self, path: &Path) -> std::io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn read_bytes(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension(match path.extension() {
            Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
            None => "tmp".to_string(),
        });

        let result = (|| {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.flush()?;
            file.sync_all()?;
            std::fs::rename(&tmp, path)
        })();

        if result.is_err() {
            // best-effort cleanup; the original error is what matters
            if let Err(cleanup) = std::fs::remove_file(&tmp) {
                warn!(tmp = %tmp.display(), error = %cleanup, "tmp file cleanup failed");
            }
        }
        result
    }
}
