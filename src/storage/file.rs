use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::{DurableStore, OriginEvent, StorageEvents};
use crate::error::{AppError, Result};

/// 本地文件存储：`<dir>/<key>.json`
///
/// 单进程使用，没有其他句柄，因此订阅永远不会收到事件。
pub struct FileStore {
    base_path: PathBuf,
    sender: broadcast::Sender<OriginEvent>,
    origin: Uuid,
}

impl FileStore {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        let (sender, _) = broadcast::channel(1);
        Ok(Self {
            base_path,
            sender,
            origin: Uuid::new_v4(),
        })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(AppError::Storage(format!("Invalid storage key: {}", key)));
        }
        Ok(self.base_path.join(format!("{}.json", key)))
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        // 先写临时文件再重命名，避免写入中断留下半个文件
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        debug!(key = %key, path = %path.display(), "Stored record");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn subscribe(&self) -> StorageEvents {
        StorageEvents::new(self.sender.subscribe(), self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("crm-admin-test-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_set_get_remove() {
        let dir = temp_dir();
        let store = FileStore::new(&dir).unwrap();

        assert_eq!(store.get("auth-storage").unwrap(), None);
        store.set("auth-storage", r#"{"state":{}}"#).unwrap();
        assert_eq!(
            store.get("auth-storage").unwrap().as_deref(),
            Some(r#"{"state":{}}"#)
        );
        store.remove("auth-storage").unwrap();
        store.remove("auth-storage").unwrap();
        assert_eq!(store.get("auth-storage").unwrap(), None);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let dir = temp_dir();
        let store = FileStore::new(&dir).unwrap();

        assert!(store.set("../escape", "x").is_err());
        assert!(store.set("a/b", "x").is_err());
        assert!(store.get("").is_err());

        std::fs::remove_dir_all(dir).ok();
    }
}
