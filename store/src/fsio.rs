//! Atomic file primitives shared by every persisted artifact.
//!
//! All durable state is written the same way: serialize to a temp file in
//! the target's directory, optionally fsync, then rename over the target.
//! Readers either see the old bytes or the new bytes, never a torn write.
//! Temp files carry a unique suffix and are removed on any failure path.

use sequent_core::{Result, StoreError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique counter distinguishing concurrent temp files for the same
/// target.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_path_for(target: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    let mut name = target
        .file_name()
        .map_or_else(|| "file".to_string(), |f| f.to_string_lossy().into_owned());
    name.push_str(&format!(".tmp-{pid}-{n}"));
    target.with_file_name(name)
}

/// Write `bytes` to `target` atomically via temp file + rename.
///
/// When `flush` is set, the temp file's data and the containing directory
/// entry are fsync'd before and after the rename respectively, so the bytes
/// are durable when this returns. Without `flush` the write is left to the
/// OS cache.
///
/// A read-only `target` (write protection) is made writable before the
/// rename.
///
/// # Errors
///
/// Returns [`StoreError::Io`] on any filesystem failure; the temp file is
/// removed before the error surfaces.
pub async fn write_atomic(target: &Path, bytes: Vec<u8>, flush: bool) -> Result<()> {
    let target = target.to_path_buf();
    let context = format!("writing {}", target.display());
    tokio::task::spawn_blocking(move || write_atomic_blocking(&target, &bytes, flush))
        .await
        .map_err(|e| {
            StoreError::io(
                context,
                std::io::Error::other(format!("write task failed: {e}")),
            )
        })?
}

fn write_atomic_blocking(target: &Path, bytes: &[u8], flush: bool) -> Result<()> {
    use std::io::Write;

    let tmp = temp_path_for(target);
    let result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        if flush {
            file.sync_all()?;
        }
        drop(file);

        // Write protection from a previous commit would make the rename
        // fail on some platforms; clear it first.
        clear_readonly_blocking(target)?;
        std::fs::rename(&tmp, target)?;

        if flush {
            if let Some(dir) = target.parent() {
                fsync_dir(dir)?;
            }
        }
        Ok(())
    })();

    if let Err(source) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(StoreError::io(
            format!("writing {}", target.display()),
            source,
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) -> std::io::Result<()> {
    // Directory handles cannot be fsync'd on this platform; the rename is
    // still atomic.
    Ok(())
}

/// Read a file's bytes, mapping "not found" to `None`.
///
/// # Errors
///
/// Returns [`StoreError::Io`] for any failure other than `NotFound`.
pub async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(format!("reading {}", path.display()), e)),
    }
}

/// Mark a file read-only at the OS level (write protection).
///
/// # Errors
///
/// Returns [`StoreError::Io`] if the permissions cannot be changed.
pub async fn set_readonly(path: &Path) -> Result<()> {
    let path = path.to_path_buf();
    let context = format!("write-protecting {}", path.display());
    let result = tokio::task::spawn_blocking(move || {
        let metadata = std::fs::metadata(&path)?;
        let mut permissions = metadata.permissions();
        permissions.set_readonly(true);
        std::fs::set_permissions(&path, permissions)
    })
    .await;
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(StoreError::io(context, source)),
        Err(e) => Err(StoreError::io(
            context,
            std::io::Error::other(format!("permissions task failed: {e}")),
        )),
    }
}

#[allow(clippy::permissions_set_readonly_false)] // Intentional: restoring writability we set ourselves
fn clear_readonly_blocking(path: &Path) -> std::io::Result<()> {
    match std::fs::metadata(path) {
        Ok(metadata) => {
            let mut permissions = metadata.permissions();
            if permissions.readonly() {
                permissions.set_readonly(false);
                std::fs::set_permissions(path, permissions)?;
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove a file if it exists, clearing write protection first.
///
/// # Errors
///
/// Returns [`StoreError::Io`] on any failure other than the file already
/// being absent.
pub async fn remove_file_if_exists(path: &Path) -> Result<()> {
    let path = path.to_path_buf();
    let context = format!("removing {}", path.display());
    let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        clear_readonly_blocking(&path)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    })
    .await;
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(StoreError::io(context, source)),
        Err(e) => Err(StoreError::io(
            context,
            std::io::Error::other(format!("removal task failed: {e}")),
        )),
    }
}

/// Recursively delete a directory tree, clearing read-only flags as needed.
/// Missing directories are fine (the operation is idempotent).
///
/// # Errors
///
/// Returns [`StoreError::Io`] on any other filesystem failure.
pub async fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    let path = path.to_path_buf();
    let context = format!("removing {}", path.display());
    let result =
        tokio::task::spawn_blocking(move || -> std::io::Result<()> { remove_tree(&path) }).await;
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(StoreError::io(context, source)),
        Err(e) => Err(StoreError::io(
            context,
            std::io::Error::other(format!("removal task failed: {e}")),
        )),
    }
}

fn remove_tree(path: &Path) -> std::io::Result<()> {
    match std::fs::metadata(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
        Ok(metadata) if metadata.is_file() => {
            clear_readonly_blocking(path)?;
            return std::fs::remove_file(path);
        }
        Ok(_) => {}
    }
    for entry in std::fs::read_dir(path)? {
        remove_tree(&entry?.path())?;
    }
    std::fs::remove_dir(path)
}

/// Create a directory (and parents) if absent.
///
/// # Errors
///
/// Returns [`StoreError::Io`] on failure.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| StoreError::io(format!("creating {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("value.json");

        write_atomic(&target, b"{\"a\": 1}".to_vec(), true)
            .await
            .expect("write");
        let bytes = read_optional(&target).await.expect("read").expect("some");
        assert_eq!(bytes, b"{\"a\": 1}");
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn overwrite_replaces_previous_contents_atomically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("value.json");

        write_atomic(&target, b"old".to_vec(), false).await.expect("write old");
        write_atomic(&target, b"new".to_vec(), false).await.expect("write new");

        let bytes = read_optional(&target).await.expect("read").expect("some");
        assert_eq!(bytes, b"new");

        // No temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn write_protected_target_can_be_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("value.json");

        write_atomic(&target, b"v1".to_vec(), false).await.expect("write");
        set_readonly(&target).await.expect("protect");
        write_atomic(&target, b"v2".to_vec(), false).await.expect("overwrite");

        let bytes = read_optional(&target).await.expect("read").expect("some");
        assert_eq!(bytes, b"v2");
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn remove_file_is_idempotent_and_clears_protection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("value.json");

        write_atomic(&target, b"v".to_vec(), false).await.expect("write");
        set_readonly(&target).await.expect("protect");
        remove_file_if_exists(&target).await.expect("remove");
        remove_file_if_exists(&target).await.expect("remove again");
        assert!(read_optional(&target).await.expect("read").is_none());
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.json");
        assert!(read_optional(&missing).await.expect("read").is_none());
    }
}
