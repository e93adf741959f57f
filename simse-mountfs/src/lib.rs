//! In-memory virtual filesystem that can be mounted over a real path prefix.
//!
//! A [`VirtualFs`] holds files and directories in memory. Once mounted at a
//! real-world path, an [`InterceptedFs`] serves every call under that path
//! from memory and forwards everything else to the wrapped filesystem.
//! Module loaders resolve through the same mounts via [`ModuleHooks`].
//!
//! ```no_run
//! use std::path::Path;
//! use simse_mountfs::{create, FileSystem, InterceptedFs, MountRegistry};
//!
//! let vfs = create();
//! vfs.write_file("/config.json", r#"{"debug":true}"#)?;
//! vfs.mount("/srv/app")?;
//!
//! let fs = InterceptedFs::with_os_fs(MountRegistry::global());
//! let bytes = fs.read_file(Path::new("/srv/app/config.json"))?;
//! assert_eq!(bytes, br#"{"debug":true}"#);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod encoding;
pub mod error;
pub mod fs;
pub mod hooks;
pub mod intercept;
pub mod path;
pub mod registry;
pub mod store;
pub mod vfs;

pub use encoding::Encoding;
pub use error::{ErrorKind, VfsError, VfsResult};
pub use fs::{DirEntry, EntryType, FileSystem, OsFs, Stats};
pub use hooks::{ModuleHooks, ModuleStat};
pub use intercept::InterceptedFs;
pub use path::{translate, NormalizedPath, PathStyle, Translation, VfsLimits};
pub use registry::{MountInfo, MountMatch, MountRegistry};
pub use store::WriteOptions;
pub use vfs::{VfsOptions, VirtualFs};

/// Create an empty filesystem with default options, mounting into the
/// process-wide registry.
pub fn create() -> VirtualFs {
    VirtualFs::new(VfsOptions::default())
}
