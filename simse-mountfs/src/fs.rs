//! The filesystem seam shared by the real filesystem and the interception
//! layer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Type of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    File,
    Directory,
    /// Only reported by the real filesystem; virtual stores have no links.
    Symlink,
}

/// Metadata about a file or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub entry_type: EntryType,
    /// Byte length for files, entry count for virtual directories.
    pub size: u64,
    /// POSIX mode including the file type bits.
    pub mode: u32,
    pub mtime: SystemTime,
    pub birthtime: SystemTime,
}

impl Stats {
    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }
}

/// A directory entry returned by `read_dir_entries`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name of the entry (not full path).
    pub name: String,
    pub entry_type: EntryType,
}

/// Synchronous filesystem interface.
///
/// Paths are real-world paths. Errors follow the `std::fs` convention so an
/// implementation can stand in for the operating system transparently.
pub trait FileSystem: Send + Sync {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate a file. Parents must exist.
    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    fn append_file(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Entry names of a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    fn read_dir_entries(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    fn stat(&self, path: &Path) -> io::Result<Stats>;

    /// Like `stat`, without following a final symbolic link.
    fn lstat(&self, path: &Path) -> io::Result<Stats> {
        self.stat(path)
    }

    /// Absolute path with `.`, `..` and links resolved. Fails if the path
    /// does not exist.
    fn realpath(&self, path: &Path) -> io::Result<PathBuf>;

    /// Succeeds if the path exists.
    fn access(&self, path: &Path) -> io::Result<()>;

    fn mkdir(&self, path: &Path, recursive: bool) -> io::Result<()>;

    fn unlink(&self, path: &Path) -> io::Result<()>;

    fn rmdir(&self, path: &Path, recursive: bool) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn copy_file(&self, src: &Path, dest: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool {
        self.stat(path).is_ok()
    }
}

/// The real filesystem, via `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl OsFs {
    fn entry_type(file_type: fs::FileType) -> EntryType {
        if file_type.is_dir() {
            EntryType::Directory
        } else if file_type.is_symlink() {
            EntryType::Symlink
        } else {
            EntryType::File
        }
    }

    #[cfg(unix)]
    fn mode(meta: &fs::Metadata) -> u32 {
        use std::os::unix::fs::MetadataExt;
        meta.mode()
    }

    #[cfg(not(unix))]
    fn mode(meta: &fs::Metadata) -> u32 {
        use crate::store::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
        let mode = if meta.is_dir() { DEFAULT_DIR_MODE } else { DEFAULT_FILE_MODE };
        if meta.permissions().readonly() { mode & !0o222 } else { mode }
    }

    fn stats(meta: fs::Metadata) -> io::Result<Stats> {
        let mtime = meta.modified()?;
        Ok(Stats {
            entry_type: Self::entry_type(meta.file_type()),
            size: meta.len(),
            mode: Self::mode(&meta),
            mtime,
            birthtime: meta.created().unwrap_or(mtime),
        })
    }
}

impl FileSystem for OsFs {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(path, data)
    }

    fn append_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        use std::io::Write;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?
            .write_all(data)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect()
    }

    fn read_dir_entries(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                entry_type: Self::entry_type(entry.file_type()?),
            });
        }
        Ok(entries)
    }

    fn stat(&self, path: &Path) -> io::Result<Stats> {
        Self::stats(fs::metadata(path)?)
    }

    fn lstat(&self, path: &Path) -> io::Result<Stats> {
        Self::stats(fs::symlink_metadata(path)?)
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn access(&self, path: &Path) -> io::Result<()> {
        fs::symlink_metadata(path).map(|_| ())
    }

    fn mkdir(&self, path: &Path, recursive: bool) -> io::Result<()> {
        if recursive {
            fs::create_dir_all(path)
        } else {
            fs::create_dir(path)
        }
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rmdir(&self, path: &Path, recursive: bool) -> io::Result<()> {
        if recursive {
            fs::remove_dir_all(path)
        } else {
            fs::remove_dir(path)
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn copy_file(&self, src: &Path, dest: &Path) -> io::Result<()> {
        fs::copy(src, dest).map(|_| ())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
