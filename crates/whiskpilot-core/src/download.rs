//! Turning attributed images into files on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use whiskpilot_config::{ConfigLoader, DownloadSettings};

use crate::error::PageError;

const MAX_NAME_CHARS: usize = 100;
/// Suffixed names tried before giving up on a free path.
const MAX_NAME_ATTEMPTS: u32 = 1000;
const RESERVED: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Make a prompt safe to use as a file name.
///
/// Reserved path characters become `_`, anything outside ASCII letters,
/// digits, `_`, `-` and whitespace is dropped, the result is trimmed and cut
/// to 100 characters.
pub fn sanitize_prompt(prompt: &str) -> String {
    let kept: String = prompt
        .chars()
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    kept.trim().chars().take(MAX_NAME_CHARS).collect()
}

/// Relative file name for an image: `[subfolder/]<safe prompt>_<ms>.png`.
pub fn download_filename(prompt: &str, subfolder: &str, timestamp_ms: i64) -> String {
    let name = format!("{}_{}.png", sanitize_prompt(prompt), timestamp_ms);
    let subfolder = subfolder.trim().trim_matches('/');
    if subfolder.is_empty() {
        name
    } else {
        format!("{}/{}", subfolder, name)
    }
}

/// Source of image bytes. `blob:` URLs only resolve inside the page that created them.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PageError>;
}

/// Download errors.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to fetch image: {0}")]
    Fetch(#[from] PageError),

    #[error("Failed to write image: {0}")]
    Io(#[from] std::io::Error),
}

/// Files written for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub image: PathBuf,
    pub prompt_file: Option<PathBuf>,
}

/// Writes attributed images below the configured download directory.
pub struct DownloadSaver<F: ?Sized> {
    fetcher: Arc<F>,
    settings: DownloadSettings,
    root: PathBuf,
}

impl<F: ResourceFetcher + ?Sized> DownloadSaver<F> {
    pub fn new(fetcher: Arc<F>, settings: DownloadSettings) -> Self {
        let root = PathBuf::from(ConfigLoader::expand_path(&settings.directory));
        Self {
            fetcher,
            settings,
            root,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.auto_download
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fetch `url` and save it under a name derived from `prompt`.
    ///
    /// Returns `Ok(None)` when auto-download is off.
    pub async fn save(&self, url: &str, prompt: &str) -> Result<Option<SavedImage>, DownloadError> {
        if !self.is_enabled() {
            debug!("Auto-download off, skipping {}", url);
            return Ok(None);
        }

        let bytes = self.fetcher.fetch(url).await?;
        let timestamp = chrono::Utc::now().timestamp_millis();
        let image = self
            .root
            .join(download_filename(prompt, &self.settings.subfolder, timestamp));

        if let Some(parent) = image.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let (image, mut file) = create_unique(&image).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        let prompt_file = if self.settings.save_prompt_txt {
            let path = image.with_extension("txt");
            tokio::fs::write(&path, prompt).await?;
            Some(path)
        } else {
            None
        };

        info!("Saved {} ({} bytes)", image.display(), bytes.len());
        Ok(Some(SavedImage { image, prompt_file }))
    }
}

/// `path` with ` (n)` inserted before the extension; `n == 0` is `path` itself.
fn numbered(path: &Path, n: u32) -> PathBuf {
    if n == 0 {
        return path.to_path_buf();
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
        None => format!("{} ({})", stem, n),
    };
    path.with_file_name(name)
}

/// Create a file that did not exist before, numbering the name on conflict.
///
/// Images rendered together are saved concurrently and can share a
/// millisecond timestamp; an existing file is never overwritten.
async fn create_unique(path: &Path) -> std::io::Result<(PathBuf, tokio::fs::File)> {
    for n in 0..MAX_NAME_ATTEMPTS {
        let candidate = numbered(path, n);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free file name for {}", path.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapFetcher {
        blobs: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl ResourceFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, PageError> {
            self.blobs
                .get(url)
                .cloned()
                .ok_or_else(|| PageError::Script(format!("Failed to fetch {}", url)))
        }
    }

    fn fetcher() -> Arc<MapFetcher> {
        let mut blobs = HashMap::new();
        blobs.insert("blob:https://labs.google/1".to_string(), vec![0x89, b'P', b'N', b'G']);
        Arc::new(MapFetcher { blobs })
    }

    fn settings(dir: &Path) -> DownloadSettings {
        DownloadSettings {
            auto_download: true,
            directory: dir.to_string_lossy().to_string(),
            subfolder: String::new(),
            save_prompt_txt: false,
        }
    }

    #[test]
    fn test_sanitize_reserved_characters() {
        assert_eq!(sanitize_prompt("cats/dogs: a*b?"), "cats_dogs_ a_b_");
        assert_eq!(sanitize_prompt("<tag>|\"q\""), "_tag___q_");
    }

    #[test]
    fn test_sanitize_drops_other_characters_and_trims() {
        assert_eq!(sanitize_prompt("  café, au lait!  "), "caf au lait");
        assert_eq!(sanitize_prompt("a-b_c 1"), "a-b_c 1");
        assert_eq!(sanitize_prompt("!!!"), "");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(250);
        assert_eq!(sanitize_prompt(&long).len(), 100);
    }

    #[test]
    fn test_download_filename() {
        assert_eq!(
            download_filename("a red fox", "", 1_700_000_000_000),
            "a red fox_1700000000000.png"
        );
        assert_eq!(
            download_filename("a red fox", "whisk", 42),
            "whisk/a red fox_42.png"
        );
        assert_eq!(download_filename("fox", "/nested/", 1), "nested/fox_1.png");
    }

    #[tokio::test]
    async fn test_save_writes_image() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DownloadSaver::new(fetcher(), settings(dir.path()));

        let saved = saver
            .save("blob:https://labs.google/1", "a red fox")
            .await
            .unwrap()
            .unwrap();

        assert!(saved.image.starts_with(dir.path()));
        assert_eq!(std::fs::read(&saved.image).unwrap(), vec![0x89, b'P', b'N', b'G']);
        assert!(saved.prompt_file.is_none());
        let name = saved.image.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("a red fox_"));
        assert!(name.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_save_with_subfolder_and_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.subfolder = "whisk".to_string();
        settings.save_prompt_txt = true;
        let saver = DownloadSaver::new(fetcher(), settings);

        let saved = saver
            .save("blob:https://labs.google/1", "a red fox: at dusk")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(saved.image.parent().unwrap(), dir.path().join("whisk"));
        let prompt_file = saved.prompt_file.unwrap();
        assert_eq!(prompt_file.extension().unwrap(), "txt");
        assert_eq!(
            std::fs::read_to_string(prompt_file).unwrap(),
            "a red fox: at dusk"
        );
    }

    #[test]
    fn test_numbered_name() {
        let path = Path::new("/d/fox_1.png");
        assert_eq!(numbered(path, 0), PathBuf::from("/d/fox_1.png"));
        assert_eq!(numbered(path, 2), PathBuf::from("/d/fox_1 (2).png"));
    }

    #[tokio::test]
    async fn test_concurrent_saves_for_one_prompt_keep_every_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut blobs = HashMap::new();
        blobs.insert("blob:1".to_string(), vec![1]);
        blobs.insert("blob:2".to_string(), vec![2]);
        let mut settings = settings(dir.path());
        settings.save_prompt_txt = true;
        let saver = DownloadSaver::new(Arc::new(MapFetcher { blobs }), settings);

        let (first, second) = tokio::join!(saver.save("blob:1", "fox"), saver.save("blob:2", "fox"));
        let first = first.unwrap().unwrap();
        let second = second.unwrap().unwrap();

        assert_ne!(first.image, second.image);
        assert_ne!(first.prompt_file, second.prompt_file);
        let mut contents = vec![
            std::fs::read(&first.image).unwrap(),
            std::fs::read(&second.image).unwrap(),
        ];
        contents.sort();
        assert_eq!(contents, vec![vec![1], vec![2]]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
    }

    #[tokio::test]
    async fn test_existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("fox_7.png");
        std::fs::write(&taken, b"old").unwrap();

        let (path, _file) = create_unique(&taken).await.unwrap();

        assert_eq!(path, dir.path().join("fox_7 (1).png"));
        assert_eq!(std::fs::read(&taken).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_save_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.auto_download = false;
        let saver = DownloadSaver::new(fetcher(), settings);

        assert!(!saver.is_enabled());
        assert!(saver.save("blob:https://labs.google/1", "fox").await.unwrap().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_save_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let saver = DownloadSaver::new(fetcher(), settings(dir.path()));

        let result = saver.save("blob:https://labs.google/missing", "fox").await;
        assert!(matches!(result, Err(DownloadError::Fetch(_))));
    }
}
