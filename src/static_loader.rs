//! Loads localized/static text used by views and validators. Mirrors
//! the text loader in the original source: a missing key never fails a
//! render, it falls back to placeholder copy so a content gap doesn't
//! take a chat out of service.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

const FALLBACK_TEXT: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.";

#[async_trait]
pub trait StaticLoader: Send + Sync {
    async fn get(&self, key: &str) -> String;
}

/// Loads `{key}.txt` files from a directory, caching them in memory
/// after first read. Falls back to `FALLBACK_TEXT` if the file is
/// missing, matching the `FileNotFoundError` branch in the original
/// text loader rather than propagating an error up to the view.
#[derive(Debug)]
pub struct FsStaticLoader {
    root: PathBuf,
    cache: dashmap::DashMap<String, Option<String>>,
}

impl FsStaticLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: dashmap::DashMap::new(),
        }
    }

    /// Resolves a dotted code like `a.b.c` to `<root>/a/b/c.txt`.
    fn read(root: &Path, key: &str) -> Option<String> {
        let mut path = root.to_path_buf();
        path.extend(key.split('.'));
        path.set_extension("txt");
        std::fs::read_to_string(path).ok()
    }
}

#[async_trait]
impl StaticLoader for FsStaticLoader {
    async fn get(&self, key: &str) -> String {
        if let Some(hit) = self.cache.get(key) {
            return hit.clone().unwrap_or_else(|| FALLBACK_TEXT.to_owned());
        }
        let value = Self::read(&self.root, key);
        let out = value.clone().unwrap_or_else(|| FALLBACK_TEXT.to_owned());
        self.cache.insert(key.to_owned(), value);
        out
    }
}

/// Loader backed by a fixed in-memory map, useful for tests and for
/// the demo binary where shipping a text/ directory would be overkill.
#[derive(Debug, Default)]
pub struct StaticMapLoader {
    entries: HashMap<String, String>,
}

impl StaticMapLoader {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl StaticLoader for StaticMapLoader {
    async fn get(&self, key: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| FALLBACK_TEXT.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_placeholder_on_missing_key() {
        let loader = StaticMapLoader::default();
        assert_eq!(loader.get("nope").await, FALLBACK_TEXT);
    }

    #[tokio::test]
    async fn returns_configured_value() {
        let mut entries = HashMap::new();
        entries.insert("greeting".to_owned(), "hi there".to_owned());
        let loader = StaticMapLoader::new(entries);
        assert_eq!(loader.get("greeting").await, "hi there");
    }

    #[tokio::test]
    async fn resolves_dotted_code_to_nested_path() {
        let dir = std::env::temp_dir().join(format!("chatfsm-static-{}", std::process::id()));
        let nested = dir.join("menu").join("main");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("title.txt"), "Welcome!").unwrap();

        let loader = FsStaticLoader::new(&dir);
        assert_eq!(loader.get("menu.main.title").await, "Welcome!");
        assert_eq!(loader.get("menu.main.missing").await, FALLBACK_TEXT);

        std::fs::remove_dir_all(&dir).ok();
    }
}
