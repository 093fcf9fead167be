//! Filesystem-backed object store.
//!
//! A directory tree stands in for a bucket: the object key is the file's
//! path relative to the root, with `/` separators. Useful for replaying a
//! downloaded bucket snapshot and for tests.

use super::{ListPage, ObjectStore};
use crate::error::AuditError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Sorted keys of the most recent walk, reused while paging through it.
#[derive(Debug, Default)]
struct CachedListing {
    prefix: String,
    keys: Arc<Vec<String>>,
}

/// Object store rooted at a local directory.
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    page_size: usize,
    listing: Mutex<Option<CachedListing>>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            root: root.into(),
            page_size: page_size.max(1),
            listing: Mutex::new(None),
        }
    }

    /// Resolve a key to a path, refusing anything that escapes the root.
    fn object_path(&self, key: &str) -> Result<PathBuf, AuditError> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if key.is_empty() || !safe {
            return Err(AuditError::permanent(key, "key escapes the store root"));
        }
        Ok(self.root.join(relative))
    }

    /// Keys cached by the walk that started this listing.
    fn cached_keys(&self, prefix: &str) -> Option<Arc<Vec<String>>> {
        let guard = self.listing.lock().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()
            .filter(|cached| cached.prefix == prefix)
            .map(|cached| Arc::clone(&cached.keys))
    }

    fn cache_keys(&self, prefix: &str, keys: Arc<Vec<String>>) {
        let mut guard = self.listing.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(CachedListing {
            prefix: prefix.to_string(),
            keys,
        });
    }

    /// All keys under `prefix`, sorted.
    fn keys_with_prefix(root: &Path, prefix: &str) -> Result<Vec<String>, AuditError> {
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = root.join(dir_part);

        if !start.is_dir() {
            debug!("No directory for prefix {} under {}", prefix, root.display());
            return Ok(Vec::new());
        }

        let walker = WalkDir::new(&start)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || may_hold_prefix(
                        &relative_key(root, entry),
                        entry.file_type().is_dir(),
                        prefix,
                    )
            });

        let mut keys = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| AuditError::permanent(prefix, e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let key = relative_key(root, &entry);
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }
}

/// Object key for a walked entry: its path below the root, `/`-separated.
fn relative_key(root: &Path, entry: &DirEntry) -> String {
    match entry.path().strip_prefix(root) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => String::new(),
    }
}

/// Whether the entry at `key` can be, or contain, a key starting with `prefix`.
fn may_hold_prefix(key: &str, is_dir: bool, prefix: &str) -> bool {
    key.starts_with(prefix) || (is_dir && prefix.starts_with(&format!("{}/", key)))
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, AuditError> {
        // A fresh listing walks the tree; continuation pages reuse that walk.
        let cached = match continuation {
            Some(_) => self.cached_keys(prefix),
            None => None,
        };
        let keys = match cached {
            Some(keys) => keys,
            None => {
                let root = self.root.clone();
                let owned_prefix = prefix.to_string();
                let keys = tokio::task::spawn_blocking(move || {
                    Self::keys_with_prefix(&root, &owned_prefix)
                })
                .await
                .map_err(|e| AuditError::permanent(prefix, format!("listing task failed: {}", e)))??;
                let keys = Arc::new(keys);
                self.cache_keys(prefix, Arc::clone(&keys));
                keys
            }
        };

        // The continuation token is the last key of the previous page.
        let remaining: Vec<&String> = match continuation {
            Some(after) => keys.iter().filter(|k| k.as_str() > after).collect(),
            None => keys.iter().collect(),
        };

        let has_more = remaining.len() > self.page_size;
        let page: Vec<String> = remaining
            .into_iter()
            .take(self.page_size)
            .cloned()
            .collect();
        let next_continuation = if has_more { page.last().cloned() } else { None };

        Ok(ListPage {
            keys: page,
            next_continuation,
        })
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, AuditError> {
        let path = self.object_path(key)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                AuditError::permanent(key, e.to_string())
            }
            _ => AuditError::transient(key, e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_object(root: &Path, key: &str, body: &str) {
        let path = root.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn test_list_pages_through_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let prefix = "net/submissions/2024-01-01";
        for hour in 0..5 {
            write_object(
                temp_dir.path(),
                &format!("{}/2024-01-01T0{}:00:00Z-pk.json", prefix, hour),
                "{}",
            );
        }
        write_object(temp_dir.path(), "net/submissions/2024-01-02/2024-01-02T00:00:00Z-pk.json", "{}");

        let store = LocalStore::new(temp_dir.path(), 2);

        let first = store.list_page(prefix, None).await.unwrap();
        assert_eq!(first.keys.len(), 2);
        assert!(first.next_continuation.is_some());

        let second = store
            .list_page(prefix, first.next_continuation.as_deref())
            .await
            .unwrap();
        assert_eq!(second.keys.len(), 2);

        let third = store
            .list_page(prefix, second.next_continuation.as_deref())
            .await
            .unwrap();
        assert_eq!(third.keys.len(), 1);
        assert!(third.next_continuation.is_none());
        assert!(third.keys[0].contains("T04:00:00Z"));
    }

    #[test]
    fn test_walk_prunes_other_partitions() {
        let prefix = "net/submissions/2024-01-01";
        assert!(may_hold_prefix("net/submissions/2024-01-01", true, prefix));
        assert!(may_hold_prefix("net/submissions", true, prefix));
        assert!(may_hold_prefix("net/submissions/2024-01-01/2024-01-01T06:00:00Z-pk.json", false, prefix));
        assert!(!may_hold_prefix("net/submissions/2023-12-31", true, prefix));
        assert!(!may_hold_prefix("net/submissions/2024-01", true, prefix));
        assert!(!may_hold_prefix("net/submissions/2024-01-02/2024-01-02T00:00:00Z-pk.json", false, prefix));
    }

    #[test]
    fn test_keys_with_prefix_skips_sibling_partitions() {
        let temp_dir = TempDir::new().unwrap();
        write_object(temp_dir.path(), "net/submissions/2024-01-01/2024-01-01T01:00:00Z-a.json", "{}");
        write_object(temp_dir.path(), "net/submissions/2024-01-01x/2024-01-01T02:00:00Z-b.json", "{}");
        write_object(temp_dir.path(), "net/submissions/2023-12-31/2023-12-31T01:00:00Z-c.json", "{}");

        let keys =
            LocalStore::keys_with_prefix(temp_dir.path(), "net/submissions/2024-01-01").unwrap();
        assert_eq!(
            keys,
            vec![
                "net/submissions/2024-01-01/2024-01-01T01:00:00Z-a.json".to_string(),
                "net/submissions/2024-01-01x/2024-01-01T02:00:00Z-b.json".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_continuation_pages_reuse_first_walk() {
        let temp_dir = TempDir::new().unwrap();
        let prefix = "net/submissions/2024-01-01";
        for hour in 0..3 {
            write_object(
                temp_dir.path(),
                &format!("{}/2024-01-01T0{}:00:00Z-pk.json", prefix, hour),
                "{}",
            );
        }
        let store = LocalStore::new(temp_dir.path(), 2);

        let first = store.list_page(prefix, None).await.unwrap();
        write_object(
            temp_dir.path(),
            &format!("{}/2024-01-01T09:00:00Z-late.json", prefix),
            "{}",
        );

        let second = store
            .list_page(prefix, first.next_continuation.as_deref())
            .await
            .unwrap();
        assert_eq!(second.keys.len(), 1);
        assert!(second.keys[0].contains("T02:00:00Z"));

        // A new listing walks again and sees the late object.
        let fresh = store.list_page(prefix, None).await.unwrap();
        assert!(fresh.next_continuation.is_some());
        let rest = store
            .list_page(prefix, fresh.next_continuation.as_deref())
            .await
            .unwrap();
        assert_eq!(rest.keys.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_prefix_lists_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path(), 10);
        let page = store
            .list_page("net/submissions/2030-01-01", None)
            .await
            .unwrap();
        assert!(page.keys.is_empty());
        assert!(page.next_continuation.is_none());
    }

    #[tokio::test]
    async fn test_get_object() {
        let temp_dir = TempDir::new().unwrap();
        write_object(temp_dir.path(), "net/a.json", "{\"x\":1}");
        let store = LocalStore::new(temp_dir.path(), 10);

        let body = store.get_object("net/a.json").await.unwrap();
        assert_eq!(body, b"{\"x\":1}");

        let missing = store.get_object("net/b.json").await.unwrap_err();
        assert!(!missing.is_retryable());
    }

    #[tokio::test]
    async fn test_get_object_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path(), 10);
        assert!(store.get_object("../etc/passwd").await.is_err());
        assert!(store.get_object("/etc/passwd").await.is_err());
    }
}
