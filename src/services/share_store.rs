use std::{
    collections::HashMap,
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs as async_fs, io::AsyncWriteExt, sync::RwLock};
use uuid::Uuid;

use crate::models::error_page::ErrorPageParams;
use crate::models::errors::AppError;
use crate::models::shared_page::SharedPage;
use crate::services::name_generator::{is_valid_name, NameGenerator, RandomNameGenerator};

/// Upper bound for the serialized parameters of a shared page
pub const MAX_PARAMS_SIZE: usize = 4096;
/// Names tried before a create gives up
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

const TEMP_PREFIX: &str = ".tmp-";
const RECORD_EXTENSION: &str = "json";

/// Why an insert did not happen
#[derive(Debug)]
pub enum InsertError {
    /// A page with the same name already exists
    Conflict,
    /// The backend failed; nothing was written
    Io(String),
}

/// Persistence boundary for shared pages.
///
/// `insert_new` must be atomic: afterwards the page is either fully visible
/// under its name or absent, and two inserts of the same name never both
/// succeed.
pub trait PageBackend: Send + Sync + 'static {
    fn insert_new(&self, page: &SharedPage) -> impl Future<Output = Result<(), InsertError>> + Send;

    fn find(&self, name: &str) -> impl Future<Output = Result<Option<SharedPage>, AppError>> + Send;

    fn count(&self) -> impl Future<Output = Result<usize, AppError>> + Send;
}

/// Creates and looks up shared pages
pub struct ShareStore<B: PageBackend> {
    backend: B,
    generator: Arc<dyn NameGenerator>,
    max_attempts: usize,
    max_params_size: usize,
}

impl<B: PageBackend> ShareStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            generator: Arc::new(RandomNameGenerator::default()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_params_size: MAX_PARAMS_SIZE,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn NameGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_max_params_size(mut self, max_params_size: usize) -> Self {
        self.max_params_size = max_params_size;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Persists `params` under a fresh unique name.
    ///
    /// Retries with a new name on collision, up to the configured attempts.
    /// Returns only once the page is readable through [`ShareStore::get`].
    pub async fn create(&self, params: ErrorPageParams) -> Result<SharedPage, AppError> {
        let size = params.serialized_len()?;
        if size > self.max_params_size {
            return Err(AppError::payload_too_large(size, self.max_params_size));
        }

        let mut page = SharedPage::new(String::new(), params);

        for attempt in 1..=self.max_attempts {
            page.name = self.generator.generate();

            match self.backend.insert_new(&page).await {
                Ok(()) => {
                    tracing::info!("Created shared page {} ({} bytes)", page.name, size);
                    return Ok(page);
                }
                Err(InsertError::Conflict) => {
                    tracing::warn!(
                        "Name collision on {} (attempt {}/{})",
                        page.name,
                        attempt,
                        self.max_attempts
                    );
                }
                Err(InsertError::Io(message)) => {
                    tracing::error!("Failed to persist shared page {}: {}", page.name, message);
                    return Err(AppError::store_failed(message));
                }
            }
        }

        tracing::error!("Gave up creating a shared page after {} attempts", self.max_attempts);
        Err(AppError::store_exhausted(self.max_attempts))
    }

    /// Looks up a page by exact name
    pub async fn get(&self, name: &str) -> Result<SharedPage, AppError> {
        if !is_valid_name(name) {
            return Err(AppError::not_found(name));
        }

        self.backend
            .find(name)
            .await?
            .ok_or_else(|| AppError::not_found(name))
    }

    pub async fn count(&self) -> Result<usize, AppError> {
        self.backend.count().await
    }
}

/// One JSON document per page inside a directory
#[derive(Debug, Clone)]
pub struct FilePageBackend {
    dir: PathBuf,
}

impl FilePageBackend {
    /// Opens the store directory, creating it if needed and removing temporary
    /// files left behind by interrupted writes.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();

        async_fs::create_dir_all(&dir)
            .await
            .map_err(|e| {
                AppError::store_failed(format!("Failed to create page directory: {}", e))
            })?;

        let backend = Self { dir };
        let removed = backend.sweep_temp_files().await?;
        if removed > 0 {
            tracing::info!("Removed {} stale temporary page files", removed);
        }

        Ok(backend)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, RECORD_EXTENSION))
    }

    async fn sweep_temp_files(&self) -> Result<usize, AppError> {
        let mut removed = 0;
        let mut entries = async_fs::read_dir(&self.dir)
            .await
            .map_err(|e| AppError::store_failed(format!("Failed to read page directory: {}", e)))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::store_failed(format!("Failed to read directory entry: {}", e)))?
        {
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                match async_fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(
                        "Failed to remove stale temp file {}: {}",
                        entry.path().display(),
                        e
                    ),
                }
            }
        }

        Ok(removed)
    }

    async fn write_temp(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = async_fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(data).await?;
        file.sync_all().await
    }

    async fn sync_dir(&self) {
        // Directory fsync makes the new link durable; not supported everywhere.
        if let Ok(dir) = async_fs::File::open(&self.dir).await {
            if let Err(e) = dir.sync_all().await {
                tracing::debug!("Directory sync unavailable: {}", e);
            }
        }
    }
}

impl PageBackend for FilePageBackend {
    async fn insert_new(&self, page: &SharedPage) -> Result<(), InsertError> {
        let data = serde_json::to_vec(page).map_err(|e| InsertError::Io(e.to_string()))?;
        let temp_path = self.dir.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));
        let final_path = self.record_path(&page.name);

        if let Err(e) = self.write_temp(&temp_path, &data).await {
            let _ = async_fs::remove_file(&temp_path).await;
            return Err(InsertError::Io(format!("Failed to write page: {}", e)));
        }

        // hard_link refuses to replace an existing file, which is what makes
        // the name unique; readers only ever see the completed temp file.
        let linked = async_fs::hard_link(&temp_path, &final_path).await;

        if let Err(e) = async_fs::remove_file(&temp_path).await {
            tracing::warn!("Failed to remove temp file {}: {}", temp_path.display(), e);
        }

        match linked {
            Ok(()) => {
                self.sync_dir().await;
                tracing::debug!("Stored page {}", final_path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(InsertError::Conflict),
            Err(e) => Err(InsertError::Io(format!("Failed to publish page: {}", e))),
        }
    }

    async fn find(&self, name: &str) -> Result<Option<SharedPage>, AppError> {
        let path = self.record_path(name);

        let data = match async_fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::store_failed(format!("Failed to read page: {}", e))),
        };

        let page = serde_json::from_slice(&data)
            .map_err(|e| AppError::store_failed(format!("Corrupt page record {}: {}", name, e)))?;

        tracing::debug!("Loaded page {}", name);
        Ok(Some(page))
    }

    async fn count(&self) -> Result<usize, AppError> {
        let mut count = 0;
        let mut entries = async_fs::read_dir(&self.dir)
            .await
            .map_err(|e| AppError::store_failed(format!("Failed to read page directory: {}", e)))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::store_failed(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == RECORD_EXTENSION)
                && !entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX);
            if is_record {
                count += 1;
            }
        }

        Ok(count)
    }
}

/// Keeps pages in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryPageBackend {
    pages: Arc<RwLock<HashMap<String, SharedPage>>>,
}

impl MemoryPageBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageBackend for MemoryPageBackend {
    async fn insert_new(&self, page: &SharedPage) -> Result<(), InsertError> {
        let mut pages = self.pages.write().await;
        match pages.entry(page.name.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => Err(InsertError::Conflict),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(page.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, name: &str) -> Result<Option<SharedPage>, AppError> {
        let pages = self.pages.read().await;
        Ok(pages.get(name).cloned())
    }

    async fn count(&self) -> Result<usize, AppError> {
        Ok(self.pages.read().await.len())
    }
}
