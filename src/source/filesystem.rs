//! Filesystem space usage via statvfs.

use std::ffi::CString;
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use super::{DiskUsage, SourceError};

/// Raw block counts as reported by statvfs, already scaled to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilesystemSpace {
    pub size_bytes: u64,
    /// Free blocks including those reserved for root.
    pub free_bytes: u64,
    /// Free blocks available to unprivileged users.
    pub available_bytes: u64,
}

impl FilesystemSpace {
    /// Usage as seen by unprivileged users: used / (used + available),
    /// rounded to one decimal. Reserved blocks count as neither.
    pub fn usage(&self) -> DiskUsage {
        let used = self.size_bytes.saturating_sub(self.free_bytes);
        let visible = used + self.available_bytes;
        let percent = if visible == 0 {
            0.0
        } else {
            (used as f64 / visible as f64 * 1000.0).round() / 10.0
        };

        DiskUsage {
            percent,
            total_bytes: self.size_bytes,
            used_bytes: used,
            free_bytes: self.available_bytes,
        }
    }
}

/// Gets filesystem statistics using libc statvfs.
pub fn statvfs_space(path: &Path) -> Result<FilesystemSpace, SourceError> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| SourceError::parse(path, format!("Invalid path: {}", e)))?;

    // SAFETY: statvfs writes into a zeroed plain-data struct and c_path is a
    // valid NUL-terminated string for the duration of the call
    let stat = unsafe {
        let mut stat: libc::statvfs = mem::zeroed();
        if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
            return Err(SourceError::io(path, std::io::Error::last_os_error()));
        }
        stat
    };

    let block_size = stat.f_frsize as u64;
    Ok(FilesystemSpace {
        size_bytes: block_size * stat.f_blocks as u64,
        free_bytes: block_size * stat.f_bfree as u64,
        available_bytes: block_size * stat.f_bavail as u64,
    })
}

pub fn read_disk_usage(path: &Path) -> Result<DiskUsage, SourceError> {
    statvfs_space(path).map(|space| space.usage())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_excludes_reserved_blocks() {
        let space = FilesystemSpace {
            size_bytes: 1000,
            free_bytes: 300,
            available_bytes: 200,
        };
        let usage = space.usage();
        assert_eq!(usage.used_bytes, 700);
        assert_eq!(usage.free_bytes, 200);
        // 700 / 900
        assert_eq!(usage.percent, 77.8);
    }

    #[test]
    fn test_usage_empty_filesystem() {
        let space = FilesystemSpace {
            size_bytes: 0,
            free_bytes: 0,
            available_bytes: 0,
        };
        assert_eq!(space.usage().percent, 0.0);
    }

    #[test]
    fn test_read_disk_usage_root() {
        let usage = read_disk_usage(Path::new("/")).expect("statvfs on / failed");
        assert!(usage.total_bytes > 0);
        assert!(usage.percent >= 0.0 && usage.percent <= 100.0);
    }

    #[test]
    fn test_read_disk_usage_missing_path() {
        assert!(read_disk_usage(Path::new("/definitely/not/a/mount")).is_err());
    }
}
