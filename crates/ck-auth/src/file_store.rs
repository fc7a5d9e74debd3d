use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::account::Account;
use crate::errors::{CkAuthError, Result};
use crate::store::AccountStore;

const STORE_VERSION: u32 = 1;

/// On-disk document wrapping the account list
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    accounts: Vec<Account>,
}

/// File-based account store
///
/// Keeps the whole pool in one JSON document, written atomically.
///
/// # Directory Structure
/// ```text
/// ~/.local/share/credkeeper/
/// ├── lock                   # Advisory lock file
/// └── accounts.json          # Account pool
/// ```
#[derive(Debug, Clone)]
pub struct FileAccountStore {
    storage_dir: PathBuf,
    accounts_file: PathBuf,
    lock_file: PathBuf,
}

impl FileAccountStore {
    /// Create a new file-based account store, creating the directory if needed
    pub async fn new(storage_dir: impl AsRef<Path>) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        fs::create_dir_all(&storage_dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&storage_dir, perms)?;
        }

        Ok(Self {
            accounts_file: storage_dir.join("accounts.json"),
            lock_file: storage_dir.join("lock"),
            storage_dir,
        })
    }

    /// Get default storage directory for the current platform
    pub fn default_storage_dir() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("", "", "credkeeper")
            .ok_or(CkAuthError::NoDataDir)?;

        Ok(project_dirs.data_dir().to_path_buf())
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn accounts_file(&self) -> &Path {
        &self.accounts_file
    }

    /// Acquire an exclusive lock on the storage
    fn acquire_lock(&self) -> Result<std::fs::File> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| CkAuthError::LockTimeout)?;

        Ok(lock_file)
    }

    async fn write_document(&self, document: &StoreDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(document)?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.accounts_file.with_extension("tmp");
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&temp_path).await?;

        // A leftover temp file keeps its old mode; tighten it before writing
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            file.set_permissions(perms).await?;
        }

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.accounts_file).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountStore for FileAccountStore {
    #[instrument(skip(self), fields(path = %self.accounts_file.display()))]
    async fn load(&self) -> Result<Vec<Account>> {
        let content = match fs::read(&self.accounts_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No account store yet, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let document: StoreDocument =
            serde_json::from_slice(&content).map_err(|e| CkAuthError::CorruptedStore {
                path: self.accounts_file.clone(),
                reason: e.to_string(),
            })?;

        if document.version > STORE_VERSION {
            return Err(CkAuthError::CorruptedStore {
                path: self.accounts_file.clone(),
                reason: format!("unsupported store version {}", document.version),
            });
        }

        debug!(count = document.accounts.len(), "Loaded accounts");
        Ok(document.accounts)
    }

    #[instrument(skip(self, accounts), fields(count = accounts.len()))]
    async fn save(&self, accounts: &[Account]) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let document = StoreDocument {
            version: STORE_VERSION,
            accounts: accounts.to_vec(),
        };
        self.write_document(&document).await?;

        debug!("Saved accounts");
        Ok(())
    }
}
