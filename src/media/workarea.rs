//! Scoped temporary storage for fetched media.
//!
//! A [`WorkArea`] is a private directory tree split into `images/`, `video/`
//! and `audio/` partitions. It is the only component that creates or deletes
//! media files: fetchers ask it for paths, and callers hand paths back through
//! [`WorkArea::release`] once an artifact has been delivered.
//!
//! Files that are still being written are wrapped in a [`PendingPath`], which
//! removes them on drop unless committed. Every early return, error and
//! cancelled future therefore leaves nothing behind.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::error::MediaError;
use super::types::Partition;

/// Prefix of every work area root directory.
pub const ROOT_PREFIX: &str = "sisyphe_media_";

/// Private, partitioned temporary storage owned by one subsystem instance.
#[derive(Debug)]
pub struct WorkArea {
    root: PathBuf,
    counter: AtomicU64,
}

impl WorkArea {
    /// Create a uniquely-named root under `parent` (the system temp directory
    /// when `None`) together with its three partitions.
    pub fn new(parent: Option<&Path>) -> Result<Self, MediaError> {
        let parent = parent
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&parent).map_err(|e| {
            MediaError::Io(format!("cannot create {}: {e}", parent.display()))
        })?;

        let root = parent.join(format!("{ROOT_PREFIX}{}", uuid::Uuid::new_v4().simple()));
        // create_dir (not _all) so an existing directory is never adopted
        std::fs::create_dir(&root)
            .map_err(|e| MediaError::Io(format!("cannot create {}: {e}", root.display())))?;

        for partition in Partition::ALL {
            let dir = root.join(partition.dir_name());
            std::fs::create_dir(&dir)
                .map_err(|e| MediaError::Io(format!("cannot create {}: {e}", dir.display())))?;
            debug!(partition = partition.dir_name(), path = %dir.display(), "partition created");
        }

        info!(root = %root.display(), "media work area created");
        Ok(Self {
            root,
            counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_dir(&self, partition: Partition) -> PathBuf {
        self.root.join(partition.dir_name())
    }

    /// Return a fresh path under `partition` that does not exist yet.
    ///
    /// The extension is lower-cased and stripped to ASCII alphanumerics; an
    /// empty result falls back to `bin`.
    pub fn issue_path(&self, partition: Partition, extension: &str) -> PathBuf {
        let ext = sanitize_extension(extension);
        let dir = self.partition_dir(partition);
        loop {
            let candidate = dir.join(format!("{}.{ext}", self.unique_stem(partition)));
            if !candidate.exists() {
                debug!(path = %candidate.display(), "path issued");
                return candidate;
            }
        }
    }

    /// Issue a path and wrap it in a guard that deletes the file on drop.
    pub fn pending_file(&self, partition: Partition, extension: &str) -> PendingPath {
        PendingPath::file(self.issue_path(partition, extension))
    }

    /// Create a fresh sub-directory under `partition` for a single job.
    ///
    /// The directory and everything in it is removed on drop unless the
    /// guard is committed.
    pub async fn pending_dir(&self, partition: Partition) -> Result<PendingPath, MediaError> {
        let dir = self.partition_dir(partition);
        loop {
            let candidate = dir.join(self.unique_stem(partition));
            match tokio::fs::create_dir(&candidate).await {
                Ok(()) => {
                    debug!(path = %candidate.display(), "job directory created");
                    return Ok(PendingPath::dir(candidate));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(MediaError::Io(format!(
                        "cannot create {}: {e}",
                        candidate.display()
                    )))
                }
            }
        }
    }

    /// Whether `path` lies inside this work area.
    ///
    /// The check is lexical; paths containing `..` are never considered
    /// inside.
    pub fn contains(&self, path: &Path) -> bool {
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return false;
        }
        path.starts_with(&self.root)
    }

    /// Delete an issued path, or reset every partition when `path` is `None`.
    ///
    /// Both forms are idempotent and tolerate missing files. Failures are
    /// logged and never returned: cleanup must not block message delivery.
    /// Returns the number of entries removed.
    pub async fn release(&self, path: Option<&Path>) -> usize {
        match path {
            Some(path) => self.release_path(path).await,
            None => self.reset().await,
        }
    }

    async fn release_path(&self, path: &Path) -> usize {
        if !self.contains(path) {
            warn!(path = %path.display(), "refusing to release path outside the work area");
            return 0;
        }
        if path == self.root {
            return self.reset().await;
        }
        if let Some(partition) = Partition::ALL
            .into_iter()
            .find(|p| path == self.partition_dir(*p))
        {
            return self.clear_partition(partition).await;
        }

        match remove_any(path).await {
            Ok(true) => {
                info!(path = %path.display(), "media released");
                self.prune_job_dir(path).await;
                1
            }
            Ok(false) => {
                debug!(path = %path.display(), "release of missing path ignored");
                0
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to release media");
                0
            }
        }
    }

    /// Remove the job directory that held `released` once it is empty.
    async fn prune_job_dir(&self, released: &Path) {
        let Some(parent) = released.parent() else {
            return;
        };
        let is_job_dir = Partition::ALL
            .into_iter()
            .any(|p| parent.parent() == Some(self.partition_dir(p).as_path()));
        if is_job_dir && tokio::fs::remove_dir(parent).await.is_ok() {
            debug!(path = %parent.display(), "empty job directory removed");
        }
    }

    async fn reset(&self) -> usize {
        let mut removed = 0;
        for partition in Partition::ALL {
            removed += self.clear_partition(partition).await;
        }
        info!(root = %self.root.display(), removed, "work area reset");
        removed
    }

    async fn clear_partition(&self, partition: Partition) -> usize {
        let dir = self.partition_dir(partition);
        let entries = count_entries(&dir).await;

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %dir.display(), error = %e, "failed to clear partition");
            }
        }
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(path = %dir.display(), error = %e, "failed to recreate partition");
        }
        debug!(partition = partition.dir_name(), removed = entries, "partition cleared");
        entries
    }

    fn unique_stem(&self, partition: Partition) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let prefix = match partition {
            Partition::Images => "image",
            Partition::Video => "video",
            Partition::Audio => "audio",
        };
        format!("{prefix}_{n:06}_{}", &nonce[..8])
    }
}

impl Drop for WorkArea {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(root = %self.root.display(), "media work area removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(root = %self.root.display(), error = %e, "failed to remove work area"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    File,
    Dir,
}

/// A path that is deleted when dropped, unless [`commit`](Self::commit)ted.
#[derive(Debug)]
pub struct PendingPath {
    path: PathBuf,
    kind: PendingKind,
    committed: bool,
}

impl PendingPath {
    fn file(path: PathBuf) -> Self {
        Self {
            path,
            kind: PendingKind::File,
            committed: false,
        }
    }

    fn dir(path: PathBuf) -> Self {
        Self {
            path,
            kind: PendingKind::Dir,
            committed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `bytes` to a pending file. Refuses to overwrite an existing file.
    pub async fn write_all(&self, bytes: &[u8]) -> Result<(), MediaError> {
        if self.kind != PendingKind::File {
            return Err(MediaError::Io(format!(
                "{} is a directory",
                self.path.display()
            )));
        }
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    /// Keep the path on disk and hand ownership back to the work area.
    pub fn commit(mut self) -> PathBuf {
        self.committed = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PendingPath {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let result = match self.kind {
            PendingKind::File => std::fs::remove_file(&self.path),
            PendingKind::Dir => std::fs::remove_dir_all(&self.path),
        };
        match result {
            Ok(()) => debug!(path = %self.path.display(), "pending media discarded"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to discard pending media"),
        }
    }
}

fn sanitize_extension(extension: &str) -> String {
    let ext: String = extension
        .trim_start_matches('.')
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(8)
        .collect::<String>()
        .to_ascii_lowercase();
    if ext.is_empty() {
        "bin".to_string()
    } else {
        ext
    }
}

/// Remove a file or directory tree. `Ok(false)` when nothing was there.
async fn remove_any(path: &Path) -> std::io::Result<bool> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

async fn count_entries(dir: &Path) -> usize {
    let mut count = 0;
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(_)) = entries.next_entry().await {
            count += 1;
        }
    }
    count
}
