use bincode::{deserialize, serialize};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use crate::error::StoreError;
use crate::library::Library;

/// Persistence boundary for the whole library snapshot.
///
/// `commit` is the single atomic write of one logical operation: either the
/// full snapshot lands or the previous one stays in place.
pub trait LibraryStore: Send + Sync {
    fn load(&self) -> Result<Library, StoreError>;
    fn commit(&self, library: &Library) -> Result<(), StoreError>;
}

/// Library stored as gzip-compressed bincode
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the library file on disk, 0 when missing
    pub fn size(&self) -> Result<u64, StoreError> {
        if self.path.exists() {
            Ok(std::fs::metadata(&self.path)?.len())
        } else {
            Ok(0)
        }
    }
}

impl LibraryStore for FileStore {
    fn load(&self) -> Result<Library, StoreError> {
        if !self.path.exists() {
            debug!(path = ?self.path, "Library file does not exist, starting empty");
            return Ok(Library::new());
        }

        let start = std::time::Instant::now();
        let data = std::fs::read(&self.path)?;
        let mut decoder = GzDecoder::new(&data[..]);
        let mut decompressed = Vec::new();

        let decoded = decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| StoreError::Decode(e.to_string()))
            .and_then(|_| deserialize::<Library>(&decompressed).map_err(|e| StoreError::Decode(e.to_string())));

        match decoded {
            Ok(library) => {
                info!(
                    sources = library.sources().len(),
                    items = library.item_count(),
                    queue = library.queue_len(),
                    inbox = library.inbox_len(),
                    "Loaded library in {:?}",
                    start.elapsed()
                );
                Ok(library)
            }
            Err(e) => {
                // Keep the unreadable file around; the caller decides whether to start over
                let backup_path = self.path.with_extension("bin.bak");
                match std::fs::copy(&self.path, &backup_path) {
                    Ok(_) => warn!("Library file is unreadable ({}). Backed it up to {:?}", e, backup_path),
                    Err(backup_err) => warn!("Library file is unreadable ({}) and backup failed: {}", e, backup_err),
                }
                Err(e)
            }
        }
    }

    fn commit(&self, library: &Library) -> Result<(), StoreError> {
        let start = std::time::Instant::now();
        let serialized = serialize(library).map_err(|e| StoreError::Encode(e.to_string()))?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        let encoded = encoder.finish()?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, encoded)?;
        std::fs::rename(&temp_path, &self.path)?;

        debug!(items = library.item_count(), "Committed library in {:?}", start.elapsed());
        Ok(())
    }
}

impl<T: LibraryStore + ?Sized> LibraryStore for Arc<T> {
    fn load(&self) -> Result<Library, StoreError> {
        (**self).load()
    }

    fn commit(&self, library: &Library) -> Result<(), StoreError> {
        (**self).commit(library)
    }
}

/// In-memory store for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    saved: StdMutex<Library>,
    commits: AtomicUsize,
    fail_after: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(library: Library) -> Self {
        Self {
            saved: StdMutex::new(library),
            ..Self::default()
        }
    }

    /// Commits beyond the first `commits` fail with an I/O error
    pub fn failing_after(mut self, commits: usize) -> Self {
        self.fail_after = Some(commits);
        self
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Last committed snapshot
    pub fn saved(&self) -> Library {
        match self.saved.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LibraryStore for MemoryStore {
    fn load(&self) -> Result<Library, StoreError> {
        Ok(self.saved())
    }

    fn commit(&self, library: &Library) -> Result<(), StoreError> {
        if let Some(limit) = self.fail_after {
            if self.commits.load(Ordering::SeqCst) >= limit {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "memory store refused commit",
                )));
            }
        }
        let mut guard = match self.saved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = library.clone();
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Single writer over the library snapshot.
///
/// Mutations run one at a time behind the lock, against a private copy of
/// the snapshot. The copy is committed and only then published, so readers
/// never observe a half-applied or uncommitted change. Store I/O runs on the
/// blocking pool while the lock is held.
pub struct LibraryHandle {
    library: Mutex<Library>,
    store: Arc<dyn LibraryStore>,
}

impl LibraryHandle {
    pub fn open(store: Box<dyn LibraryStore>) -> Result<Self, StoreError> {
        let library = store.load()?;
        Ok(Self {
            library: Mutex::new(library),
            store: Arc::from(store),
        })
    }

    pub async fn read<R>(&self, f: impl FnOnce(&Library) -> R) -> R {
        let guard = self.library.lock().await;
        f(&guard)
    }

    pub async fn snapshot(&self) -> Library {
        self.library.lock().await.clone()
    }

    /// Replace the published snapshot with the one in the store, picking up
    /// commits made through other handles since this one was opened
    pub async fn reload(&self) -> Result<(), StoreError> {
        let mut guard = self.library.lock().await;
        let store = Arc::clone(&self.store);
        let library = run_blocking(move || store.load()).await?;
        debug!(items = library.item_count(), "Reloaded library from store");
        *guard = library;
        Ok(())
    }

    /// Apply `f` and commit. When `f` returns an error nothing is committed
    /// and the inner error is handed back; a failed commit discards the change.
    pub async fn mutate<R, E>(
        &self,
        f: impl FnOnce(&mut Library) -> Result<R, E>,
    ) -> Result<Result<R, E>, StoreError> {
        let mut guard = self.library.lock().await;
        let mut working = guard.clone();

        let value = match f(&mut working) {
            Ok(value) => value,
            Err(e) => return Ok(Err(e)),
        };
        debug_assert!(working.check_invariants().is_ok(), "mutation left the library inconsistent");

        let store = Arc::clone(&self.store);
        let working = run_blocking(move || store.commit(&working).map(|()| working)).await?;
        *guard = working;
        Ok(Ok(value))
    }
}

async fn run_blocking<R: Send + 'static>(
    f: impl FnOnce() -> Result<R, StoreError> + Send + 'static,
) -> Result<R, StoreError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}
