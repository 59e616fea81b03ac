use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `contents` to `dst` using write-to-temp-then-rename.
///
/// Readers of `dst` see either the old file or the complete new one, never a
/// partial write. The temp file lives next to `dst` so the rename stays on one
/// filesystem, and is removed again if any step fails.
pub async fn atomic_write(dst: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_path = temp_path_for(dst);

    let result = write_and_rename(&temp_path, dst, contents).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}

async fn write_and_rename(temp_path: &Path, dst: &Path, contents: &[u8]) -> io::Result<()> {
    // create_new: never follow a pre-planted file at the temp path
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)
        .await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    // Windows refuses to rename over an existing file
    #[cfg(windows)]
    if tokio::fs::try_exists(dst).await.unwrap_or(false) {
        tokio::fs::remove_file(dst).await?;
    }

    tokio::fs::rename(temp_path, dst).await
}

fn temp_path_for(dst: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!(".{name}.tmp.{nanos:x}.{seq}"))
}
