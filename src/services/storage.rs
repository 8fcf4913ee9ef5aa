//! Category-partitioned file storage for processed images
//!
//! Layout: `<root>/<category>/input/<name>` and `<root>/<category>/output/<name>`
//! for every [`ImageType`]. A stored pair shares one generated file name
//! across both directories.

use crate::classifier::ImageType;
use crate::error::{BgRemovalError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

const INPUT_DIR: &str = "input";
const OUTPUT_DIR: &str = "output";
const SUBDIRS: [&str; 2] = [INPUT_DIR, OUTPUT_DIR];

/// Longest stem kept from the client-supplied file name
pub const MAX_STEM_CHARS: usize = 20;

/// Paths written by [`FileStorageService::save_pair`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPair {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

/// File counts for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub input: usize,
    pub output: usize,
}

/// Snapshot of stored file counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub storage_path: String,
    pub categories: BTreeMap<String, CategoryCounts>,
    pub total_input: usize,
    pub total_output: usize,
}

/// Stores input/output pairs grouped by detected image category
#[derive(Debug, Clone)]
pub struct FileStorageService {
    root: PathBuf,
}

impl FileStorageService {
    /// Create the service and its directory tree
    ///
    /// # Errors
    /// - `Io` when a directory cannot be created
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        for image_type in ImageType::ALL {
            for subdir in SUBDIRS {
                let dir = root.join(image_type.as_str()).join(subdir);
                std::fs::create_dir_all(&dir)
                    .map_err(|e| BgRemovalError::file_io_error("create storage directory", &dir, &e))?;
            }
        }

        info!(path = %root.display(), "Storage directories ready");
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Unique file name: `{timestamp}_{stem}_{id}{ext}` or `{timestamp}_{id}.png`
    ///
    /// Only the final path component of `original` is used, and its stem and
    /// extension are reduced to `[A-Za-z0-9_-]`.
    #[must_use]
    pub fn generate_filename(original: Option<&str>) -> String {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let unique_id = format!("{:08x}", Uuid::new_v4().as_u128() >> 96);

        let Some(original) = original.filter(|name| !name.is_empty()) else {
            return format!("{timestamp}_{unique_id}.png");
        };

        let path = Path::new(original);
        let stem: String = path
            .file_stem()
            .map(|s| sanitize(&s.to_string_lossy()))
            .unwrap_or_default()
            .chars()
            .take(MAX_STEM_CHARS)
            .collect();
        let extension = path
            .extension()
            .map(|e| sanitize(&e.to_string_lossy()))
            .filter(|e| !e.is_empty())
            .map_or_else(|| ".png".to_string(), |e| format!(".{e}"));

        format!("{timestamp}_{stem}_{unique_id}{extension}")
    }

    /// Save a single input image under a generated name
    ///
    /// # Errors
    /// - `Storage` when the file cannot be written
    pub async fn save_input(&self, bytes: &[u8], image_type: ImageType, original: Option<&str>) -> Result<PathBuf> {
        let filename = Self::generate_filename(original);
        let path = self.file_path(image_type, INPUT_DIR, &filename);
        write_file(&path, bytes).await?;

        info!(path = %path.display(), "Saved input");
        Ok(path)
    }

    /// Save input and output under one generated name
    ///
    /// # Errors
    /// - `Storage` when either file cannot be written
    pub async fn save_pair(
        &self,
        input: &[u8],
        output: &[u8],
        image_type: ImageType,
        original: Option<&str>,
    ) -> Result<StoredPair> {
        let filename = Self::generate_filename(original);
        let input_path = self.file_path(image_type, INPUT_DIR, &filename);
        let output_path = self.file_path(image_type, OUTPUT_DIR, &filename);

        write_file(&input_path, input).await?;
        write_file(&output_path, output).await?;

        info!(
            input = %input_path.display(),
            output = %output_path.display(),
            "Saved pair"
        );
        Ok(StoredPair { input_path, output_path })
    }

    /// Count stored files per category and direction
    ///
    /// # Errors
    /// - `Io` when a directory exists but cannot be listed
    pub async fn category_stats(&self) -> Result<StorageStats> {
        let mut categories = BTreeMap::new();
        let mut total_input = 0;
        let mut total_output = 0;

        for image_type in ImageType::ALL {
            let counts = CategoryCounts {
                input: count_files(&self.root.join(image_type.as_str()).join(INPUT_DIR)).await?,
                output: count_files(&self.root.join(image_type.as_str()).join(OUTPUT_DIR)).await?,
            };
            total_input += counts.input;
            total_output += counts.output;
            categories.insert(image_type.to_string(), counts);
        }

        Ok(StorageStats {
            storage_path: self.root.display().to_string(),
            categories,
            total_input,
            total_output,
        })
    }

    /// Delete stored files last modified more than `days` days ago
    ///
    /// Returns the number of files deleted. Files that vanish or cannot be
    /// inspected mid-scan are skipped.
    ///
    /// # Errors
    /// - `Io` when a directory exists but cannot be listed
    pub async fn cleanup_old_files(&self, days: u64) -> Result<usize> {
        let max_age = Duration::from_secs(days.saturating_mul(86_400));
        let cutoff = SystemTime::now().checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut deleted = 0;

        for image_type in ImageType::ALL {
            for subdir in SUBDIRS {
                let dir = self.root.join(image_type.as_str()).join(subdir);
                let Some(mut entries) = read_dir_if_exists(&dir).await? else {
                    continue;
                };

                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| BgRemovalError::file_io_error("list storage directory", &dir, &e))?
                {
                    let path = entry.path();
                    let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                        Ok(modified) => modified,
                        Err(e) => {
                            debug!(path = %path.display(), error = %e, "Skipping unreadable entry");
                            continue;
                        },
                    };

                    if modified < cutoff && path.is_file() {
                        match tokio::fs::remove_file(&path).await {
                            Ok(()) => deleted += 1,
                            Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete old file"),
                        }
                    }
                }
            }
        }

        info!(deleted, days, "Cleaned up old files");
        Ok(deleted)
    }

    fn file_path(&self, image_type: ImageType, subdir: &str, filename: &str) -> PathBuf {
        self.root.join(image_type.as_str()).join(subdir).join(filename)
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| BgRemovalError::storage(format!("Failed to write '{}': {e}", path.display())))
}

async fn read_dir_if_exists(dir: &Path) -> Result<Option<tokio::fs::ReadDir>> {
    match tokio::fs::read_dir(dir).await {
        Ok(entries) => Ok(Some(entries)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BgRemovalError::file_io_error("list storage directory", dir, &e)),
    }
}

async fn count_files(dir: &Path) -> Result<usize> {
    let Some(mut entries) = read_dir_if_exists(dir).await? else {
        return Ok(0);
    };

    let mut count = 0;
    while let Some(_entry) = entries
        .next_entry()
        .await
        .map_err(|e| BgRemovalError::file_io_error("list storage directory", dir, &e))?
    {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_category_tree() {
        let dir = TempDir::new().unwrap();
        let _storage = FileStorageService::new(dir.path()).unwrap();

        for category in ["icon", "sticker", "cartoon", "photo"] {
            assert!(dir.path().join(category).join("input").is_dir());
            assert!(dir.path().join(category).join("output").is_dir());
        }
    }

    #[test]
    fn test_generate_filename_with_original() {
        let name = FileStorageService::generate_filename(Some("a-very-long-original-file-name.jpeg"));
        let parts: Vec<&str> = name.split('_').collect();

        // date, time, stem, id
        assert_eq!(parts.len(), 4, "unexpected name {name}");
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2], "a-very-long-original");
        assert!(parts[3].ends_with(".jpeg"));
        assert_eq!(parts[3].len(), 8 + ".jpeg".len());
    }

    #[test]
    fn test_generate_filename_without_original() {
        let name = FileStorageService::generate_filename(None);
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "20240101_120000_".len() + 8 + ".png".len());

        let no_ext = FileStorageService::generate_filename(Some("logo"));
        assert!(no_ext.contains("_logo_"));
        assert!(no_ext.ends_with(".png"));
    }

    #[test]
    fn test_generate_filename_strips_directories() {
        let name = FileStorageService::generate_filename(Some("../../etc/passwd.png"));
        assert!(!name.contains('/'));
        assert!(name.contains("_passwd_"));
    }

    #[test]
    fn test_generated_names_are_unique() {
        let a = FileStorageService::generate_filename(Some("x.png"));
        let b = FileStorageService::generate_filename(Some("x.png"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_save_pair_shares_name() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorageService::new(dir.path()).unwrap();

        let pair = storage
            .save_pair(b"input", b"output", ImageType::Sticker, Some("cat.png"))
            .await
            .unwrap();

        assert_eq!(pair.input_path.file_name(), pair.output_path.file_name());
        assert!(pair.input_path.starts_with(dir.path().join("sticker").join("input")));
        assert!(pair.output_path.starts_with(dir.path().join("sticker").join("output")));
        assert_eq!(std::fs::read(&pair.input_path).unwrap(), b"input");
        assert_eq!(std::fs::read(&pair.output_path).unwrap(), b"output");
    }

    #[tokio::test]
    async fn test_write_failure_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorageService::new(dir.path()).unwrap();
        std::fs::remove_dir_all(dir.path().join("icon")).unwrap();

        let result = storage.save_pair(b"i", b"o", ImageType::Icon, None).await;
        assert!(matches!(result, Err(BgRemovalError::Storage(_))));
    }

    #[tokio::test]
    async fn test_category_stats() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorageService::new(dir.path()).unwrap();

        storage.save_pair(b"i", b"o", ImageType::Icon, None).await.unwrap();
        storage.save_pair(b"i", b"o", ImageType::Icon, None).await.unwrap();
        storage.save_input(b"i", ImageType::Photo, Some("p.jpg")).await.unwrap();

        let stats = storage.category_stats().await.unwrap();
        assert_eq!(stats.categories["icon"], CategoryCounts { input: 2, output: 2 });
        assert_eq!(stats.categories["photo"], CategoryCounts { input: 1, output: 0 });
        assert_eq!(stats.categories["cartoon"], CategoryCounts::default());
        assert_eq!(stats.total_input, 3);
        assert_eq!(stats.total_output, 2);
    }

    #[tokio::test]
    async fn test_cleanup_old_files() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorageService::new(dir.path()).unwrap();

        let old = storage.save_input(b"old", ImageType::Cartoon, None).await.unwrap();
        let fresh = storage.save_input(b"new", ImageType::Cartoon, None).await.unwrap();

        let ten_days_ago = SystemTime::now() - Duration::from_secs(10 * 86_400);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(ten_days_ago)
            .unwrap();

        assert_eq!(storage.cleanup_old_files(7).await.unwrap(), 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }
}
