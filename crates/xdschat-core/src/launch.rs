//! Launch capabilities
//!
//! Collaborators the coordinator consults while preparing the data directory:
//! whether a fresh profile must be created, and how to lay out the file store.

use crate::errors::{ChatError, ChatResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tables created in every file store, in creation order
pub const STORE_TABLES: [&str; 5] = [
    "Profile",
    "Identity",
    "Message",
    "Peer",
    "MessageRelayRecord",
];

/// Directory name of a table inside the store
pub fn table_dir_name(table: &str) -> String {
    format!("tbl_{}", table)
}

// ----------------------------------------------------------------------------
// Capability Traits
// ----------------------------------------------------------------------------

/// Decides whether the user has to go through onboarding
#[async_trait]
pub trait OnboardingCheck: Send + Sync {
    async fn is_onboarding_required(&self) -> ChatResult<bool>;
}

/// Creates the on-disk store under the data directory root
#[async_trait]
pub trait StorageInitializer: Send + Sync {
    async fn initialize(&self, data_dir_root: &Path) -> ChatResult<()>;
}

// ----------------------------------------------------------------------------
// File Store
// ----------------------------------------------------------------------------

/// Lays out `<root>/<store_name>/tbl_<Table>` directories
#[derive(Debug, Clone)]
pub struct FileStoreInitializer {
    store_name: String,
}

impl FileStoreInitializer {
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
        }
    }

    pub fn store_root(&self, data_dir_root: &Path) -> PathBuf {
        data_dir_root.join(&self.store_name)
    }
}

#[async_trait]
impl StorageInitializer for FileStoreInitializer {
    async fn initialize(&self, data_dir_root: &Path) -> ChatResult<()> {
        let store_root = self.store_root(data_dir_root);
        for table in STORE_TABLES {
            let table_dir = store_root.join(table_dir_name(table));
            tokio::fs::create_dir_all(&table_dir).await.map_err(|e| {
                ChatError::Storage(format!("failed to create {}: {}", table_dir.display(), e))
            })?;
        }
        debug!(store = %store_root.display(), "File store ready");
        Ok(())
    }
}

/// Onboarding is required while the profile table holds no entries
#[derive(Debug, Clone)]
pub struct ProfileOnboardingCheck {
    profile_dir: PathBuf,
}

impl ProfileOnboardingCheck {
    pub fn new(data_dir_root: &Path, store_name: &str) -> Self {
        Self {
            profile_dir: data_dir_root
                .join(store_name)
                .join(table_dir_name("Profile")),
        }
    }
}

#[async_trait]
impl OnboardingCheck for ProfileOnboardingCheck {
    async fn is_onboarding_required(&self) -> ChatResult<bool> {
        let mut entries = match tokio::fs::read_dir(&self.profile_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        Ok(entries.next_entry().await?.is_none())
    }
}
