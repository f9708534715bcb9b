use crate::assemble::WidgetDefinition;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub widget: WidgetDefinition,
}

/// Assembled widget definitions on disk, keyed by widget name and validated
/// against a digest of the widget's inputs.
pub struct IncrementalCache {
    cache_dir: PathBuf,
}

impl IncrementalCache {
    pub fn new(cache_dir: &Path) -> Self {
        if !cache_dir.exists() {
            fs::create_dir_all(cache_dir).ok();
        }
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn get_cache_path(&self, widget: &str) -> PathBuf {
        let safe_name = widget
            .replace('/', "_")
            .replace('\\', "_")
            .replace(':', "_");
        self.cache_dir.join(format!("{}.json", safe_name))
    }

    pub fn get(&self, widget: &str, hash: &str) -> Option<WidgetDefinition> {
        let cache_path = self.get_cache_path(widget);
        if !cache_path.exists() {
            return None;
        }

        let data = fs::read_to_string(&cache_path).ok()?;

        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(e) => e,
            Err(e) => {
                warn!("cache entry for {} is unreadable: {}", widget, e);
                // Invalidate corrupt cache file
                fs::remove_file(cache_path).ok();
                return None;
            }
        };

        if entry.hash == hash {
            debug!("cache hit for {}", widget);
            Some(entry.widget)
        } else {
            None
        }
    }

    pub fn set(&self, hash: &str, widget: &WidgetDefinition) {
        let cache_path = self.get_cache_path(&widget.name);
        let entry = CacheEntry {
            hash: hash.to_string(),
            widget: widget.clone(),
        };

        match serde_json::to_string(&entry) {
            Ok(data) => {
                if let Err(e) = fs::write(&cache_path, data) {
                    warn!("could not write cache entry {}: {}", cache_path.display(), e);
                }
            }
            Err(e) => warn!("could not serialize cache entry for {}: {}", widget.name, e),
        }
    }
}
