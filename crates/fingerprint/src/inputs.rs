//! Resolves a task's `inputs` glob patterns into content-hashed file lists.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{FingerprintError, Result};

/// One input file's path (relative to the project root) and content digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct InputFile {
    pub path: String,
    pub digest: String,
}

/// Expands `patterns` (each relative to `root`) into a sorted, deduplicated
/// list of matched files with their content digests.
///
/// A pattern matching zero files is not an error — §4.1 treats inputs as
/// glob declarations, not guarantees that anything exists yet.
pub fn resolve_inputs(root: &Path, patterns: &[String]) -> Result<Vec<InputFile>> {
    let mut files = Vec::new();

    for pattern in patterns {
        let full_pattern = root.join(pattern);
        let full_pattern = full_pattern.to_string_lossy().into_owned();
        let paths = glob::glob(&full_pattern).map_err(|source| FingerprintError::Glob {
            pattern: pattern.clone(),
            source,
        })?;

        for entry in paths {
            let path = entry.map_err(|e| FingerprintError::Io {
                path: pattern.clone(),
                source: e.into_error(),
            })?;
            if !path.is_file() {
                continue;
            }
            let digest = hash_file(&path).map_err(|source| FingerprintError::Io {
                path: path.to_string_lossy().into_owned(),
                source,
            })?;
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            files.push(InputFile { path: relative, digest });
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_matched_files_and_sorts_by_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"world").unwrap();

        let result = resolve_inputs(dir.path(), &["*.txt".to_string()]).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].path, "a.txt");
        assert_eq!(result[1].path, "b.txt");
        assert_ne!(result[0].digest, result[1].digest);
    }

    #[test]
    fn nonexistent_pattern_yields_no_files_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve_inputs(dir.path(), &["nothing/*.rs".to_string()]).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn bad_glob_pattern_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve_inputs(dir.path(), &["[".to_string()]);
        assert!(result.is_err());
    }
}
