//! Startup preflight: both the database directory and the logs root must
//! exist, be writable, and sit on a filesystem with enough free space.
//! Any failure aborts startup with a non-zero exit.

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },

    #[error("directory {path} is not writable: {source}")]
    NotWritable {
        path: String,
        source: std::io::Error,
    },

    #[error("not enough free space under {path}: {free} bytes available, {required} required")]
    InsufficientSpace {
        path: String,
        free: u64,
        required: u64,
    },
}

/// Create-if-missing, probe-write, and free-space check for one directory.
pub fn check_directory(dir: &Path, min_free_bytes: u64) -> Result<(), PreflightError> {
    std::fs::create_dir_all(dir).map_err(|source| PreflightError::CreateDir {
        path: dir.display().to_string(),
        source,
    })?;

    let probe = dir.join(".mikroscope_probe");
    std::fs::write(&probe, b"probe").map_err(|source| PreflightError::NotWritable {
        path: dir.display().to_string(),
        source,
    })?;
    let _ = std::fs::remove_file(&probe);

    if let Some(free) = free_bytes(dir) {
        if free < min_free_bytes {
            return Err(PreflightError::InsufficientSpace {
                path: dir.display().to_string(),
                free,
                required: min_free_bytes,
            });
        }
    }

    Ok(())
}

/// Run the full preflight for the server: database parent directory and
/// logs root.
pub fn run_preflight(
    db_path: &Path,
    logs_root: &Path,
    min_free_bytes: u64,
) -> Result<(), PreflightError> {
    let db_dir = db_path.parent().unwrap_or_else(|| Path::new("."));
    check_directory(db_dir, min_free_bytes)?;
    check_directory(logs_root, min_free_bytes)?;
    Ok(())
}

/// Free bytes on the filesystem holding `path`, or `None` when the
/// platform call is unavailable.
#[cfg(unix)]
pub fn free_bytes(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let path_cstr = CString::new(path.as_os_str().as_bytes()).ok()?;

    unsafe {
        let mut stat: libc::statvfs = std::mem::zeroed();
        if libc::statvfs(path_cstr.as_ptr(), &mut stat) == 0 {
            Some(stat.f_bavail as u64 * stat.f_frsize as u64)
        } else {
            None
        }
    }
}

#[cfg(not(unix))]
pub fn free_bytes(_path: &Path) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_preflight_creates_missing_dirs() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("data/mikroscope.db");
        let logs = dir.path().join("logs");

        run_preflight(&db_path, &logs, 0).unwrap();
        assert!(db_path.parent().unwrap().is_dir());
        assert!(logs.is_dir());
    }

    #[test]
    fn test_preflight_probe_removed() {
        let dir = tempdir().unwrap();
        check_directory(dir.path(), 0).unwrap();
        assert!(!dir.path().join(".mikroscope_probe").exists());
    }

    #[test]
    fn test_preflight_rejects_absurd_free_requirement() {
        let dir = tempdir().unwrap();
        let err = check_directory(dir.path(), u64::MAX).unwrap_err();
        assert!(matches!(err, PreflightError::InsufficientSpace { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_preflight_unwritable_dir() {
        let err = run_preflight(
            Path::new("/proc/mikroscope/cannot.db"),
            Path::new("/proc/mikroscope-logs"),
            0,
        );
        assert!(err.is_err());
    }

    #[test]
    #[cfg(unix)]
    fn test_free_bytes_reports_something() {
        let dir = tempdir().unwrap();
        assert!(free_bytes(dir.path()).unwrap() > 0);
    }
}
