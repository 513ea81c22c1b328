//! Narrow filesystem collaborators (§1: explicitly out of scope as a
//! subsystem, invoked only through this small interface).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, RtkError};

pub fn is_directory(path: &Path) -> bool {
    path.is_dir()
}

pub fn is_nonempty_regular_file(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

/// Rename an existing file out of the way before it would otherwise be
/// overwritten, appending `.bak`, `.bak.1`, `.bak.2`, … until a free name is
/// found.
pub fn backup_existing(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let mut candidate: PathBuf = append_suffix(path, "bak");
    let mut n = 1;
    while candidate.exists() {
        candidate = append_suffix(path, &format!("bak.{n}"));
        n += 1;
    }
    fs::rename(path, &candidate).map_err(RtkError::SystemIo)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push('.');
    name.push_str(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_file_is_not_nonempty() {
        assert!(!is_nonempty_regular_file(Path::new("/nonexistent/path/xyz")));
    }

    #[test]
    fn backup_of_missing_file_is_a_no_op() {
        assert!(backup_existing(Path::new("/nonexistent/path/xyz")).is_ok());
    }
}
