//! Log-file helpers.
//!
//! Path resolution, rotation and level mapping. The `tracing-subscriber`
//! setup itself lives in the binary, which is the only crate depending on
//! it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Size at which the log file is rotated (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated log files kept next to the current one.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

/// Default log file: `~/.local/share/tether/tether.log`, or under `/tmp`
/// when there is no home directory.
pub fn default_log_file_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".local/share/tether/tether.log"),
        None => PathBuf::from("/tmp/tether/tether.log"),
    }
}

/// Create the parent directory of `log_path` if needed.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    if let Some(parent) = log_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Shift `log_path` into numbered generations once it reaches `max_size`
/// bytes. Generation 1 is the newest; anything past `keep` is dropped, and
/// with `keep == 0` the full log is simply discarded.
pub fn rotate_log_files(log_path: &Path, max_size: u64, keep: u32) -> io::Result<()> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if size < max_size {
        return Ok(());
    }

    for n in (1..=keep).rev() {
        let older = generation(log_path, n);
        let shifted = if n == keep {
            fs::remove_file(&older)
        } else {
            fs::rename(&older, generation(log_path, n + 1))
        };
        ignore_missing(shifted)?;
    }

    if keep == 0 {
        fs::remove_file(log_path)
    } else {
        fs::rename(log_path, generation(log_path, 1))
    }
}

/// `tether.log` plus `.n`, next to the original.
fn generation(log_path: &Path, n: u32) -> PathBuf {
    let mut name = log_path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_file_path_is_a_tether_log() {
        let path = default_log_file_path();
        assert!(path.to_string_lossy().contains("tether"));
        assert!(path.extension().is_some_and(|e| e == "log"));
    }

    #[test]
    fn generations_sit_next_to_the_log() {
        let base = Path::new("/tmp/tether.log");
        assert_eq!(generation(base, 1), PathBuf::from("/tmp/tether.log.1"));
        assert_eq!(generation(base, 3), PathBuf::from("/tmp/tether.log.3"));
    }

    #[test]
    fn rotate_no_op_when_small_or_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("tether.log");
        rotate_log_files(&log, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES).unwrap();
        fs::write(&log, "small").unwrap();
        rotate_log_files(&log, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES).unwrap();
        assert!(log.exists());
    }

    #[test]
    fn rotate_cascades_and_drops_oldest() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("tether.log");
        fs::write(dir.path().join("tether.log.1"), "old1").unwrap();
        fs::write(dir.path().join("tether.log.2"), "old2").unwrap();
        fs::write(&log, "x".repeat(200)).unwrap();

        rotate_log_files(&log, 50, 2).unwrap();

        assert!(!log.exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("tether.log.1")).unwrap(),
            "x".repeat(200)
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("tether.log.2")).unwrap(),
            "old1"
        );
        assert!(!dir.path().join("tether.log.3").exists());
    }

    #[test]
    fn rotate_with_no_generations_discards_full_log() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("tether.log");
        fs::write(&log, "x".repeat(100)).unwrap();

        rotate_log_files(&log, 10, 0).unwrap();

        assert!(!log.exists());
        assert!(!dir.path().join("tether.log.1").exists());
    }

    #[test]
    fn ensure_log_dir_creates_nested_parents() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("a").join("b").join("tether.log");
        ensure_log_dir(&log).unwrap();
        ensure_log_dir(&log).unwrap();
        assert!(dir.path().join("a").join("b").exists());
    }
}
