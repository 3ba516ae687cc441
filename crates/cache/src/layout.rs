//! On-disk layout: a two-level shard by fingerprint prefix, keeping any
//! single directory from accumulating too many entries.

use std::path::{Path, PathBuf};

/// `{root}/objects/{fp[0:2]}/{fp[2:4]}/{fp}/`
pub fn record_dir(root: &Path, fingerprint: &str) -> PathBuf {
    let hash = fingerprint.strip_prefix("sha256:").unwrap_or(fingerprint);
    if hash.len() < 4 {
        return root.join("objects").join(hash);
    }
    root.join("objects").join(&hash[..2]).join(&hash[2..4]).join(hash)
}

pub fn record_file(record_dir: &Path) -> PathBuf {
    record_dir.join("record.json")
}

pub fn stdout_file(record_dir: &Path) -> PathBuf {
    record_dir.join("stdout.log")
}

pub fn stderr_file(record_dir: &Path) -> PathBuf {
    record_dir.join("stderr.log")
}

pub fn outputs_dir(record_dir: &Path) -> PathBuf {
    record_dir.join("outputs")
}

pub fn tmp_dir(root: &Path, token: &str) -> PathBuf {
    root.join("tmp").join(token)
}
