use std::path::{Path, PathBuf};

use futures::Stream;
use regex::Regex;
use tracing::warn;

use crate::error::{ErrorKind, Result};
use crate::record::extension_of;

/// Extensions treated as photographs.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".tif", ".webp", ".heic", ".heif", ".raw",
    ".cr2", ".nef", ".arw", ".dng",
];

/// Extensions treated as video clips.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".mov", ".avi", ".mkv", ".wmv", ".flv", ".webm", ".m4v", ".mpg", ".mpeg", ".3gp",
];

/// Whether `path` has one of the recognised media extensions.
pub fn is_media(path: &Path) -> bool {
    let ext = extension_of(path);
    IMAGE_EXTENSIONS.contains(&ext.as_str()) || VIDEO_EXTENSIONS.contains(&ext.as_str())
}

/// Recursive (or flat) media discovery under a root directory, with
/// glob-style exclusion patterns matched against every path component.
pub struct Scanner {
    recursive: bool,
    excludes: Vec<Regex>,
}

impl Scanner {
    pub fn new(recursive: bool, exclude: &[String]) -> Result<Self> {
        let excludes = exclude
            .iter()
            .map(|pattern| compile_glob(pattern))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            recursive,
            excludes,
        })
    }

    fn excluded(&self, name: &str) -> bool {
        self.excludes.iter().any(|pattern| pattern.is_match(name))
    }

    /// Walk `root` and yield every media file found, in no particular
    /// order. Unreadable directories are reported and skipped rather
    /// than aborting the walk.
    pub fn scan(&self, root: &Path) -> impl Stream<Item = Result<PathBuf>> + '_ {
        let root = root.to_path_buf();
        async_stream::try_stream! {
            let mut pending = vec![root];
            while let Some(dir) = pending.pop() {
                let mut entries = match tokio::fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(error) => {
                        warn!(directory = %dir.display(), %error, "skipping unreadable directory");
                        continue;
                    }
                };
                loop {
                    let entry = entries
                        .next_entry()
                        .await
                        .map_err(|_| exn::Exn::from(ErrorKind::Io(dir.clone())))?;
                    let Some(entry) = entry else { break };
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if self.excluded(&name) {
                        continue;
                    }
                    let file_type = entry
                        .file_type()
                        .await
                        .map_err(|_| exn::Exn::from(ErrorKind::Io(entry.path())))?;
                    if file_type.is_dir() {
                        if self.recursive {
                            pending.push(entry.path());
                        }
                    } else if file_type.is_file() && is_media(&entry.path()) {
                        yield entry.path();
                    }
                }
            }
        }
    }
}

/// Translate a shell-style glob (`*`, `?`) into an anchored regex.
fn compile_glob(pattern: &str) -> Result<Regex> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    Regex::new(&translated).map_err(|_| exn::Exn::from(ErrorKind::Pattern(pattern.to_owned())))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use futures::TryStreamExt;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("IMG_1234.jpg", true)]
    #[case("clip.MOV", true)]
    #[case("notes.txt", false)]
    #[case("archive.tar.gz", false)]
    fn recognises_media_extensions(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_media(Path::new(name)), expected);
    }

    #[rstest]
    #[case("*.tmp", "cache.tmp", true)]
    #[case("*.tmp", "cache.tmp.bak", false)]
    #[case("IMG_????.jpg", "IMG_1234.jpg", true)]
    #[case("backup*", "backup-2023", true)]
    fn glob_patterns_are_anchored(#[case] pattern: &str, #[case] name: &str, #[case] hit: bool) {
        let scanner = Scanner::new(true, &[pattern.to_owned()]).unwrap();
        assert_eq!(scanner.excluded(name), hit);
    }

    #[tokio::test]
    async fn walks_nested_directories_and_skips_excluded_ones() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("trip").join("day1");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(root.path().join("thumbnails")).unwrap();
        std::fs::write(root.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(nested.join("b.mp4"), b"x").unwrap();
        std::fs::write(nested.join("readme.txt"), b"x").unwrap();
        std::fs::write(root.path().join("thumbnails").join("c.jpg"), b"x").unwrap();

        let scanner = Scanner::new(true, &["thumbnails".to_owned()]).unwrap();
        let found: BTreeSet<PathBuf> = scanner
            .scan(root.path())
            .try_collect::<Vec<_>>()
            .await
            .unwrap()
            .into_iter()
            .collect();

        assert_eq!(
            found,
            BTreeSet::from([root.path().join("a.jpg"), nested.join("b.mp4")]),
        );
    }

    #[tokio::test]
    async fn flat_scan_ignores_subdirectories() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("deep")).unwrap();
        std::fs::write(root.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(root.path().join("deep").join("b.jpg"), b"x").unwrap();

        let scanner = Scanner::new(false, &[]).unwrap();
        let found: Vec<PathBuf> = scanner.scan(root.path()).try_collect().await.unwrap();
        assert_eq!(found, vec![root.path().join("a.jpg")]);
    }
}
