//! Staging paths and file-name helpers.
//!
//! Staged files live at `{staging_dir}/{fingerprint}_{safe_name}` where the
//! fingerprint is the first 32 hex digits of the SHA-256 of the transfer URL.
//! While a transfer is in flight the bytes go to the same path plus `.part`.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

/// Suffix of in-flight partial files.
pub const PARTIAL_SUFFIX: &str = ".part";

const FINGERPRINT_HEX_LEN: usize = 32;
const MAX_NAME_CHARS: usize = 180;
const FALLBACK_NAME: &str = "file";

/// Reduces a file name to alphanumerics plus `.`, `_` and `-`.
///
/// Anything else becomes `_`. Names that would be empty or a relative path
/// component fall back to `file`.
#[must_use]
pub fn safe_file_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_CHARS)
        .collect();

    if sanitized.is_empty() || !is_safe_filename_segment(&sanitized) {
        return FALLBACK_NAME.to_string();
    }
    sanitized
}

/// Fingerprint of a transfer URL used to keep staged names unique.
#[must_use]
pub fn url_fingerprint(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_HEX_LEN);
    hex
}

/// Staging path for the file `name` fetched from `transfer_url`.
#[must_use]
pub fn staging_path(staging_dir: &Path, transfer_url: &str, name: &str) -> PathBuf {
    staging_dir.join(format!(
        "{}_{}",
        url_fingerprint(transfer_url),
        safe_file_name(name)
    ))
}

/// File name of a staged path without its fingerprint prefix.
#[must_use]
pub fn staged_display_name(staged: &Path) -> String {
    let name = staged
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    match name.split_once('_') {
        Some((prefix, rest))
            if prefix.len() == FINGERPRINT_HEX_LEN
                && !rest.is_empty()
                && prefix.bytes().all(|b| b.is_ascii_hexdigit()) =>
        {
            rest.to_string()
        }
        _ => name,
    }
}

/// Path of the partial file backing `destination`.
#[must_use]
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map_or_else(|| OsString::from(FALLBACK_NAME), OsString::from);
    name.push(PARTIAL_SUFFIX);
    destination.with_file_name(name)
}

/// Resolves a path in `dir` that does not exist yet.
///
/// Example with `suffix_start = 2`: `file.pdf`, then `file_2.pdf`, `file_3.pdf`, ...
#[must_use]
pub fn resolve_unique_path(dir: &Path, filename: &str, suffix_start: usize) -> PathBuf {
    let filename = safe_file_name(filename);
    let base_path = dir.join(&filename);

    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename.as_str(), ""),
    };

    for i in suffix_start..1000 {
        let new_path = dir.join(format!("{stem}_{i}{ext}"));
        if !new_path.exists() {
            return new_path;
        }
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

/// Removes `path` if present. Returns whether a file was removed.
///
/// # Errors
///
/// Returns the IO error for anything other than a missing file.
pub async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_safe_file_name_replaces_specials() {
        assert_eq!(safe_file_name("My Video (1).mp4"), "My_Video__1_.mp4");
        assert_eq!(safe_file_name("a/b\\c:d.txt"), "a_b_c_d.txt");
        assert_eq!(safe_file_name("déjà-vu_01.mkv"), "déjà-vu_01.mkv");
    }

    #[test]
    fn test_safe_file_name_rejects_relative_components() {
        assert_eq!(safe_file_name(".."), "file");
        assert_eq!(safe_file_name("."), "file");
        assert_eq!(safe_file_name("   "), "file");
    }

    #[test]
    fn test_safe_file_name_truncates() {
        let long = "x".repeat(500);
        assert_eq!(safe_file_name(&long).chars().count(), MAX_NAME_CHARS);
    }

    #[test]
    fn test_staging_path_is_stable_and_url_specific() {
        let dir = Path::new("/staging");
        let a = staging_path(dir, "https://cdn/a?sig=1", "clip.mp4");
        let b = staging_path(dir, "https://cdn/a?sig=1", "clip.mp4");
        let c = staging_path(dir, "https://cdn/a?sig=2", "clip.mp4");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_clip.mp4"));
        assert_eq!(name.len(), FINGERPRINT_HEX_LEN + "_clip.mp4".len());
    }

    #[test]
    fn test_staged_display_name_strips_fingerprint() {
        let staged = staging_path(Path::new("/staging"), "https://cdn/a", "My clip.mp4");
        assert_eq!(staged_display_name(&staged), "My_clip.mp4");
        assert_eq!(
            staged_display_name(Path::new("/elsewhere/plain_name.txt")),
            "plain_name.txt"
        );
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        let p = partial_path(Path::new("/staging/abc_clip.mp4"));
        assert_eq!(p, PathBuf::from("/staging/abc_clip.mp4.part"));
    }

    #[test]
    fn test_resolve_unique_path_adds_suffix() {
        let dir = TempDir::new().unwrap();
        let first = resolve_unique_path(dir.path(), "clip.mp4", 2);
        assert_eq!(first, dir.path().join("clip.mp4"));

        std::fs::write(&first, b"x").unwrap();
        let second = resolve_unique_path(dir.path(), "clip.mp4", 2);
        assert_eq!(second, dir.path().join("clip_2.mp4"));
    }

    #[tokio::test]
    async fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a");
        assert!(!remove_if_exists(&path).await.unwrap());
        std::fs::write(&path, b"x").unwrap();
        assert!(remove_if_exists(&path).await.unwrap());
        assert!(!path.exists());
    }
}
