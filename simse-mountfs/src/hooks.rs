//! The module loader's override point.
//!
//! A loader asks two questions while resolving a specifier: what kind of
//! entry a candidate path is, and what source a resolved file holds.
//! Compilation, evaluation and caching stay with the loader.

use std::io;
use std::path::{Path, PathBuf};

use crate::fs::{FileSystem, Stats};
use crate::intercept::InterceptedFs;

/// Result of probing a path during module resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleStat {
    File,
    Directory,
    Missing,
}

impl ModuleStat {
    pub(crate) fn classify(stats: Option<Stats>) -> Self {
        match stats {
            Some(stats) if stats.is_directory() => Self::Directory,
            Some(_) => Self::File,
            None => Self::Missing,
        }
    }

    /// Numeric form used by Node-style resolvers: `0` file, `1` directory,
    /// `-2` missing.
    pub fn code(self) -> i32 {
        match self {
            Self::File => 0,
            Self::Directory => 1,
            Self::Missing => -2,
        }
    }
}

pub trait ModuleHooks: Send + Sync {
    fn module_stat(&self, path: &Path) -> ModuleStat;

    /// Canonical path of a resolved module, used as its cache key.
    fn module_realpath(&self, path: &Path) -> io::Result<PathBuf>;

    fn read_module_source(&self, path: &Path) -> io::Result<Vec<u8>>;
}

impl ModuleHooks for InterceptedFs {
    fn module_stat(&self, path: &Path) -> ModuleStat {
        self.route_module(
            path,
            |store, segments| Ok(ModuleStat::classify(store.stat(segments).ok())),
            |fs| Ok(ModuleStat::classify(fs.stat(path).ok())),
        )
        .unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), "Module stat failed: {}", e);
            ModuleStat::Missing
        })
    }

    fn module_realpath(&self, path: &Path) -> io::Result<PathBuf> {
        let hit = self.registry().lookup_module(path)?;
        self.realpath_in(hit, path)
    }

    fn read_module_source(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.route_module(
            path,
            |store, segments| store.read(segments).map(<[u8]>::to_vec),
            |fs| fs.read_file(path),
        )
    }
}
