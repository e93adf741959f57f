use std::io;

use thiserror::Error;

pub type VfsResult<T> = Result<T, VfsError>;

/// Coarse classification of a [`VfsError`], independent of the path and
/// syscall it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    NotADirectory,
    IsADirectory,
    AlreadyExists,
    NotEmpty,
    MountConflict,
    AlreadyMounted,
    InvalidPath,
    InvalidOperation,
    InvalidState,
    InvalidEncoding,
    LimitExceeded,
    CrossMount,
    LockPoisoned,
    Io,
}

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("ENOENT: no such file or directory, {syscall} '{path}'")]
    NotFound { syscall: &'static str, path: String },
    #[error("ENOTDIR: not a directory, {syscall} '{path}'")]
    NotADirectory { syscall: &'static str, path: String },
    #[error("EISDIR: illegal operation on a directory, {syscall} '{path}'")]
    IsADirectory { syscall: &'static str, path: String },
    #[error("EEXIST: file already exists, {syscall} '{path}'")]
    AlreadyExists { syscall: &'static str, path: String },
    #[error("ENOTEMPTY: directory not empty, {syscall} '{path}'")]
    NotEmpty { syscall: &'static str, path: String },
    #[error("Mount conflict: {requested} overlaps existing mount {existing}")]
    MountConflict { requested: String, existing: String },
    #[error("Already mounted at {0}")]
    AlreadyMounted(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),
    #[error("EXDEV: cross-device link not permitted, {syscall} '{from}' -> '{to}'")]
    CrossMount {
        syscall: &'static str,
        from: String,
        to: String,
    },
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    pub fn not_found(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::NotFound {
            syscall,
            path: path.into(),
        }
    }

    pub fn not_a_directory(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::NotADirectory {
            syscall,
            path: path.into(),
        }
    }

    pub fn is_a_directory(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::IsADirectory {
            syscall,
            path: path.into(),
        }
    }

    pub fn already_exists(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::AlreadyExists {
            syscall,
            path: path.into(),
        }
    }

    pub fn not_empty(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::NotEmpty {
            syscall,
            path: path.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NotADirectory { .. } => ErrorKind::NotADirectory,
            Self::IsADirectory { .. } => ErrorKind::IsADirectory,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::NotEmpty { .. } => ErrorKind::NotEmpty,
            Self::MountConflict { .. } => ErrorKind::MountConflict,
            Self::AlreadyMounted(_) => ErrorKind::AlreadyMounted,
            Self::InvalidPath(_) => ErrorKind::InvalidPath,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::InvalidEncoding(_) => ErrorKind::InvalidEncoding,
            Self::LimitExceeded(_) => ErrorKind::LimitExceeded,
            Self::CrossMount { .. } => ErrorKind::CrossMount,
            Self::LockPoisoned(_) => ErrorKind::LockPoisoned,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Machine-readable code. Filesystem conditions use the POSIX errno name
    /// the real filesystem would report.
    pub fn code(&self) -> &str {
        match self {
            Self::NotFound { .. } => "ENOENT",
            Self::NotADirectory { .. } => "ENOTDIR",
            Self::IsADirectory { .. } => "EISDIR",
            Self::AlreadyExists { .. } => "EEXIST",
            Self::NotEmpty { .. } => "ENOTEMPTY",
            Self::MountConflict { .. } => "VFS_MOUNT_CONFLICT",
            Self::AlreadyMounted(_) => "VFS_ALREADY_MOUNTED",
            Self::InvalidPath(_) => "VFS_INVALID_PATH",
            Self::InvalidOperation(_) => "VFS_INVALID_OPERATION",
            Self::InvalidState(_) => "VFS_INVALID_STATE",
            Self::InvalidEncoding(_) => "VFS_INVALID_ENCODING",
            Self::LimitExceeded(_) => "VFS_LIMIT_EXCEEDED",
            Self::CrossMount { .. } => "EXDEV",
            Self::LockPoisoned(_) => "VFS_LOCK_POISONED",
            Self::Io(_) => "VFS_IO_ERROR",
        }
    }

    /// The path the failing operation was applied to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotFound { path, .. }
            | Self::NotADirectory { path, .. }
            | Self::IsADirectory { path, .. }
            | Self::AlreadyExists { path, .. }
            | Self::NotEmpty { path, .. } => Some(path),
            Self::CrossMount { from, .. } => Some(from),
            Self::MountConflict { requested, .. } => Some(requested),
            _ => None,
        }
    }

    /// The syscall name recorded for filesystem conditions (`open`, `scandir`, ...).
    pub fn syscall(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { syscall, .. }
            | Self::NotADirectory { syscall, .. }
            | Self::IsADirectory { syscall, .. }
            | Self::AlreadyExists { syscall, .. }
            | Self::NotEmpty { syscall, .. }
            | Self::CrossMount { syscall, .. } => Some(syscall),
            _ => None,
        }
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self.kind() {
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::NotADirectory => io::ErrorKind::NotADirectory,
            ErrorKind::IsADirectory => io::ErrorKind::IsADirectory,
            ErrorKind::AlreadyExists | ErrorKind::MountConflict => io::ErrorKind::AlreadyExists,
            ErrorKind::NotEmpty => io::ErrorKind::DirectoryNotEmpty,
            ErrorKind::InvalidPath | ErrorKind::InvalidOperation => io::ErrorKind::InvalidInput,
            ErrorKind::InvalidEncoding => io::ErrorKind::InvalidData,
            ErrorKind::LimitExceeded => io::ErrorKind::StorageFull,
            ErrorKind::CrossMount => io::ErrorKind::CrossesDevices,
            ErrorKind::AlreadyMounted => io::ErrorKind::ResourceBusy,
            ErrorKind::InvalidState
            | ErrorKind::LockPoisoned
            | ErrorKind::Io => io::ErrorKind::Other,
        }
    }
}

#[cfg(unix)]
fn os_code(kind: ErrorKind) -> Option<i32> {
    match kind {
        ErrorKind::NotFound => Some(libc::ENOENT),
        ErrorKind::NotADirectory => Some(libc::ENOTDIR),
        ErrorKind::IsADirectory => Some(libc::EISDIR),
        ErrorKind::AlreadyExists => Some(libc::EEXIST),
        ErrorKind::NotEmpty => Some(libc::ENOTEMPTY),
        ErrorKind::InvalidPath | ErrorKind::InvalidOperation => Some(libc::EINVAL),
        ErrorKind::CrossMount => Some(libc::EXDEV),
        ErrorKind::LimitExceeded => Some(libc::ENOSPC),
        _ => None,
    }
}

// Win32 system error codes, as returned by `GetLastError`.
#[cfg(windows)]
fn os_code(kind: ErrorKind) -> Option<i32> {
    match kind {
        ErrorKind::NotFound => Some(2),        // ERROR_FILE_NOT_FOUND
        ErrorKind::NotADirectory => Some(267), // ERROR_DIRECTORY
        ErrorKind::IsADirectory => Some(5),    // ERROR_ACCESS_DENIED
        ErrorKind::AlreadyExists => Some(183), // ERROR_ALREADY_EXISTS
        ErrorKind::NotEmpty => Some(145),      // ERROR_DIR_NOT_EMPTY
        ErrorKind::InvalidPath => Some(123),   // ERROR_INVALID_NAME
        ErrorKind::InvalidOperation => Some(87), // ERROR_INVALID_PARAMETER
        ErrorKind::CrossMount => Some(17),     // ERROR_NOT_SAME_DEVICE
        ErrorKind::LimitExceeded => Some(112), // ERROR_DISK_FULL
        _ => None,
    }
}

#[cfg(not(any(unix, windows)))]
fn os_code(_kind: ErrorKind) -> Option<i32> {
    None
}

/// Translate into the error shape `std::fs` produces for the same condition.
///
/// Filesystem conditions become raw OS errors, so `kind()` and
/// `raw_os_error()` match what a real call would have returned. Everything
/// else keeps the `VfsError` as the inner error.
impl From<VfsError> for io::Error {
    fn from(err: VfsError) -> Self {
        if let VfsError::Io(inner) = err {
            return inner;
        }
        match os_code(err.kind()) {
            Some(code) => io::Error::from_raw_os_error(code),
            None => io::Error::new(err.io_kind(), err),
        }
    }
}
