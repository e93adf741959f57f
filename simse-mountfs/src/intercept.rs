//! Routes real-world filesystem calls either to a mounted [`VirtualFs`] or
//! to the wrapped filesystem.
//!
//! [`VirtualFs`]: crate::VirtualFs

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{VfsError, VfsResult};
use crate::fs::{DirEntry, FileSystem, OsFs, Stats};
use crate::registry::{MountMatch, MountRegistry};
use crate::store::{NodeStore, WriteOptions};

/// A [`FileSystem`] that consults a [`MountRegistry`] on every call.
///
/// Paths outside every mount are forwarded unchanged. Paths inside a mount
/// are served from memory, and failures come back as the same
/// `io::Error` the operating system would have produced.
pub struct InterceptedFs {
    registry: Arc<MountRegistry>,
    real: Arc<dyn FileSystem>,
}

impl InterceptedFs {
    pub fn new(registry: Arc<MountRegistry>, real: Arc<dyn FileSystem>) -> Self {
        Self { registry, real }
    }

    /// Intercept over the real filesystem.
    pub fn with_os_fs(registry: Arc<MountRegistry>) -> Self {
        Self::new(registry, Arc::new(OsFs))
    }

    pub fn registry(&self) -> &Arc<MountRegistry> {
        &self.registry
    }

    pub fn real(&self) -> &dyn FileSystem {
        self.real.as_ref()
    }

    pub(crate) fn route<T>(
        &self,
        path: &Path,
        virt: impl FnOnce(&mut NodeStore, &[String]) -> VfsResult<T>,
        real: impl FnOnce(&dyn FileSystem) -> io::Result<T>,
    ) -> io::Result<T> {
        let hit = self.registry.lookup(path)?;
        self.dispatch(hit, path, virt, real)
    }

    /// Like `route`, but only mounts with module hooks are considered.
    pub(crate) fn route_module<T>(
        &self,
        path: &Path,
        virt: impl FnOnce(&mut NodeStore, &[String]) -> VfsResult<T>,
        real: impl FnOnce(&dyn FileSystem) -> io::Result<T>,
    ) -> io::Result<T> {
        let hit = self.registry.lookup_module(path)?;
        self.dispatch(hit, path, virt, real)
    }

    fn dispatch<T>(
        &self,
        hit: Option<MountMatch>,
        path: &Path,
        virt: impl FnOnce(&mut NodeStore, &[String]) -> VfsResult<T>,
        real: impl FnOnce(&dyn FileSystem) -> io::Result<T>,
    ) -> io::Result<T> {
        if let Some(hit) = hit {
            match hit.dispatch(|state, segments| virt(&mut state.store, segments))? {
                Some(result) => return result.map_err(io::Error::from),
                None => {
                    tracing::debug!(path = %path.display(), "Mount went away during lookup, passing through");
                }
            }
        }
        real(self.real.as_ref())
    }

    /// Inside a mount, the normalized mounted path of an existing node.
    pub(crate) fn realpath_in(&self, hit: Option<MountMatch>, path: &Path) -> io::Result<PathBuf> {
        let Some(hit) = hit else {
            return self.real.realpath(path);
        };
        let mount = hit.mount.clone();
        self.dispatch(
            Some(hit),
            path,
            |store, segments| {
                let segments = store.realpath(segments)?;
                Ok(PathBuf::from(mount.join(&segments).to_string()))
            },
            |fs| fs.realpath(path),
        )
    }

    /// Two-path operations stay within one mount or stay outside all mounts.
    fn route_pair(
        &self,
        syscall: &'static str,
        from: &Path,
        to: &Path,
        virt: impl FnOnce(&mut NodeStore, &[String], &[String]) -> VfsResult<()>,
        real: impl FnOnce(&dyn FileSystem) -> io::Result<()>,
    ) -> io::Result<()> {
        let source = self.registry.lookup(from)?;
        let dest = self.registry.lookup(to)?;
        match (source, dest) {
            (None, None) => real(self.real.as_ref()),
            (Some(source), Some(dest)) if source.same_mount(&dest) => {
                let dest_segments = dest.segments;
                match source.dispatch(|state, segments| virt(&mut state.store, segments, &dest_segments))? {
                    Some(result) => result.map_err(io::Error::from),
                    None => real(self.real.as_ref()),
                }
            }
            _ => {
                tracing::debug!(from = %from.display(), to = %to.display(), "Rejected cross-mount {}", syscall);
                Err(VfsError::CrossMount {
                    syscall,
                    from: from.display().to_string(),
                    to: to.display().to_string(),
                }
                .into())
            }
        }
    }
}

impl FileSystem for InterceptedFs {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.route(
            path,
            |store, segments| store.read(segments).map(<[u8]>::to_vec),
            |fs| fs.read_file(path),
        )
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.route(
            path,
            |store, segments| store.write(segments, data.to_vec(), &WriteOptions::default()),
            |fs| fs.write_file(path, data),
        )
    }

    fn append_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.route(
            path,
            |store, segments| store.append(segments, data),
            |fs| fs.append_file(path, data),
        )
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        self.route(
            path,
            |store, segments| store.read_dir(segments),
            |fs| fs.read_dir(path),
        )
    }

    fn read_dir_entries(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.route(
            path,
            |store, segments| store.read_dir_entries(segments),
            |fs| fs.read_dir_entries(path),
        )
    }

    fn stat(&self, path: &Path) -> io::Result<Stats> {
        self.route(path, |store, segments| store.stat(segments), |fs| fs.stat(path))
    }

    fn lstat(&self, path: &Path) -> io::Result<Stats> {
        self.route(path, |store, segments| store.stat(segments), |fs| fs.lstat(path))
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        let hit = self.registry.lookup(path)?;
        self.realpath_in(hit, path)
    }

    fn access(&self, path: &Path) -> io::Result<()> {
        self.route(path, |store, segments| store.access(segments), |fs| fs.access(path))
    }

    fn mkdir(&self, path: &Path, recursive: bool) -> io::Result<()> {
        self.route(
            path,
            |store, segments| store.mkdir(segments, recursive),
            |fs| fs.mkdir(path, recursive),
        )
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        self.route(path, |store, segments| store.unlink(segments), |fs| fs.unlink(path))
    }

    fn rmdir(&self, path: &Path, recursive: bool) -> io::Result<()> {
        self.route(
            path,
            |store, segments| store.rmdir(segments, recursive),
            |fs| fs.rmdir(path, recursive),
        )
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.route_pair(
            "rename",
            from,
            to,
            |store, from, to| store.rename(from, to),
            |fs| fs.rename(from, to),
        )
    }

    fn copy_file(&self, src: &Path, dest: &Path) -> io::Result<()> {
        self.route_pair(
            "copyfile",
            src,
            dest,
            |store, src, dest| store.copy(src, dest),
            |fs| fs.copy_file(src, dest),
        )
    }

    fn exists(&self, path: &Path) -> bool {
        self.route(
            path,
            |store, segments| Ok(store.exists(segments)),
            |fs| Ok(fs.exists(path)),
        )
        .unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), "Existence check failed: {}", e);
            false
        })
    }
}
