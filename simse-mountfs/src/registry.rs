//! Process-wide table of active mounts.
//!
//! Each entry maps a normalized mount path to a weak reference to the
//! owning [`VirtualFs`](crate::VirtualFs). Mount paths never overlap, so a
//! lookup matches at most one entry.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use crate::error::{VfsError, VfsResult};
use crate::path::{translate_normalized, NormalizedPath, PathStyle, Translation};
use crate::vfs::{VfsShared, VfsState};

static GLOBAL: OnceLock<Arc<MountRegistry>> = OnceLock::new();

#[derive(Debug)]
struct MountEntry {
    path: NormalizedPath,
    owner: Weak<VfsShared>,
    module_hooks: bool,
}

/// Information about an active mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// Normalized mount path, rendered in the registry's path style.
    pub path: String,
    /// Whether module-loader lookups are served from this mount.
    pub module_hooks: bool,
}

/// A path that falls under an active mount.
#[derive(Debug, Clone)]
pub struct MountMatch {
    pub(crate) owner: Arc<VfsShared>,
    pub(crate) mount: NormalizedPath,
    pub(crate) segments: Vec<String>,
}

impl MountMatch {
    pub fn mount_path(&self) -> &NormalizedPath {
        &self.mount
    }

    /// Segments below the mount root; empty for the root itself.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Same instance and same mount.
    pub(crate) fn same_mount(&self, other: &MountMatch) -> bool {
        Arc::ptr_eq(&self.owner, &other.owner) && self.mount == other.mount
    }

    /// Run `f` against the owning instance while it is still mounted here.
    pub(crate) fn dispatch<T>(&self, f: impl FnOnce(&mut VfsState, &[String]) -> T) -> VfsResult<Option<T>> {
        self.owner.with_mounted(&self.mount, |state| f(state, &self.segments))
    }
}

/// Registry of mounted virtual filesystems.
#[derive(Debug)]
pub struct MountRegistry {
    style: PathStyle,
    entries: Mutex<Vec<MountEntry>>,
    /// Mirrors `entries.len()` so lookups can skip the lock when idle.
    active: AtomicUsize,
}

impl Default for MountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MountRegistry {
    /// Create an empty registry using the platform's path style.
    pub fn new() -> Self {
        Self::with_style(PathStyle::native())
    }

    pub fn with_style(style: PathStyle) -> Self {
        Self {
            style,
            entries: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
        }
    }

    /// The registry shared by [`create`](crate::create) and
    /// [`VirtualFs::new`](crate::VirtualFs::new).
    pub fn global() -> Arc<Self> {
        GLOBAL.get_or_init(|| Arc::new(Self::new())).clone()
    }

    pub fn style(&self) -> PathStyle {
        self.style
    }

    /// True if nothing is mounted. Dead entries count until the next lookup
    /// prunes them.
    pub fn is_empty(&self) -> bool {
        self.active.load(Ordering::Acquire) == 0
    }

    fn lock(&self) -> VfsResult<MutexGuard<'_, Vec<MountEntry>>> {
        self.entries
            .lock()
            .map_err(|_| VfsError::LockPoisoned("mount registry"))
    }

    fn prune(&self, entries: &mut Vec<MountEntry>) {
        entries.retain(|entry| {
            let live = entry.owner.strong_count() > 0;
            if !live {
                tracing::warn!(mount = %entry.path, "Pruned mount whose filesystem was dropped");
            }
            live
        });
        self.active.store(entries.len(), Ordering::Release);
    }

    // ── Path resolution ─────────────────────────────────────────────────

    fn current_dir(&self) -> VfsResult<NormalizedPath> {
        let cwd = std::env::current_dir()?;
        let text = cwd
            .to_str()
            .ok_or_else(|| VfsError::InvalidPath(format!("{}", cwd.display())))?;
        NormalizedPath::parse(text, self.style)
    }

    /// Normalize a mount path, resolving relative paths against the process
    /// working directory.
    pub fn normalize_mount_path(&self, path: &str) -> VfsResult<NormalizedPath> {
        if path.is_empty() {
            return Err(VfsError::InvalidPath("Mount path cannot be empty".to_string()));
        }
        match NormalizedPath::parse(path, self.style) {
            Ok(normalized) => Ok(normalized),
            Err(e) if path.starts_with(['/', '\\']) => Err(e),
            Err(_) => Ok(self.current_dir()?.resolve(path)),
        }
    }

    /// The virtual cwd of the first mounted instance that has one set.
    fn virtual_cwd(&self) -> VfsResult<Option<NormalizedPath>> {
        let owners: Vec<Arc<VfsShared>> = {
            let entries = self.lock()?;
            entries
                .iter()
                .filter_map(|entry| entry.owner.upgrade())
                .filter(|owner| owner.options.virtual_cwd)
                .collect()
        };
        for owner in owners {
            if let Some(cwd) = owner.lock()?.mounted_cwd() {
                return Ok(Some(cwd));
            }
        }
        Ok(None)
    }

    /// Make an intercepted path absolute. Relative paths resolve against a
    /// mounted virtual cwd, else the process working directory. Paths that
    /// cannot be represented yield `None` and pass through.
    fn absolute(&self, path: &Path) -> VfsResult<Option<NormalizedPath>> {
        let Some(text) = path.to_str() else {
            return Ok(None);
        };
        if text.is_empty() {
            return Ok(None);
        }
        if let Ok(absolute) = NormalizedPath::parse(text, self.style) {
            return Ok(Some(absolute));
        }
        let base = match self.virtual_cwd()? {
            Some(cwd) => cwd,
            None => match self.current_dir() {
                Ok(cwd) => cwd,
                Err(_) => return Ok(None),
            },
        };
        Ok(Some(base.resolve(text)))
    }

    // ── Mount / unmount ─────────────────────────────────────────────────

    pub(crate) fn register(&self, owner: &Arc<VfsShared>, path: NormalizedPath) -> VfsResult<()> {
        let mut entries = self.lock()?;
        self.prune(&mut entries);
        if let Some(existing) = entries.iter().find(|entry| entry.path.overlaps(&path)) {
            tracing::warn!(requested = %path, existing = %existing.path, "Rejected overlapping mount");
            return Err(VfsError::MountConflict {
                requested: path.to_string(),
                existing: existing.path.to_string(),
            });
        }
        entries.push(MountEntry {
            path,
            owner: Arc::downgrade(owner),
            module_hooks: owner.options.module_hooks,
        });
        self.active.store(entries.len(), Ordering::Release);
        Ok(())
    }

    /// Remove every entry owned by `owner`.
    pub(crate) fn deregister(&self, owner: &Arc<VfsShared>) -> VfsResult<()> {
        let mut entries = self.lock()?;
        entries.retain(|entry| !Weak::ptr_eq(&entry.owner, &Arc::downgrade(owner)));
        self.prune(&mut entries);
        Ok(())
    }

    /// Unmount whatever is mounted at exactly `path`. Returns whether a mount
    /// was removed. The owning instance stays usable, detached.
    pub fn unmount(&self, path: &str) -> VfsResult<bool> {
        let target = self.normalize_mount_path(path)?;
        let owner = {
            let mut entries = self.lock()?;
            let Some(index) = entries.iter().position(|entry| entry.path == target) else {
                return Ok(false);
            };
            let entry = entries.remove(index);
            self.active.store(entries.len(), Ordering::Release);
            entry.owner.upgrade()
        };
        if let Some(owner) = owner {
            let mut state = owner.lock()?;
            if state.mount_point.as_ref() == Some(&target) {
                state.mount_point = None;
                state.cwd = None;
            }
        }
        tracing::info!(mount = %target, "Unmounted virtual filesystem");
        Ok(true)
    }

    pub fn list_mounts(&self) -> VfsResult<Vec<MountInfo>> {
        let mut entries = self.lock()?;
        self.prune(&mut entries);
        Ok(entries
            .iter()
            .map(|entry| MountInfo {
                path: entry.path.to_string(),
                module_hooks: entry.module_hooks,
            })
            .collect())
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    /// Find the mount containing `path`, if any.
    pub fn lookup(&self, path: &Path) -> VfsResult<Option<MountMatch>> {
        self.find(path, false)
    }

    /// Like [`lookup`](Self::lookup), but skips mounts created without
    /// module hooks.
    pub fn lookup_module(&self, path: &Path) -> VfsResult<Option<MountMatch>> {
        self.find(path, true)
    }

    fn find(&self, path: &Path, modules_only: bool) -> VfsResult<Option<MountMatch>> {
        if self.is_empty() {
            return Ok(None);
        }
        let Some(target) = self.absolute(path)? else {
            return Ok(None);
        };

        let mut entries = self.lock()?;
        self.prune(&mut entries);
        for entry in entries.iter() {
            if modules_only && !entry.module_hooks {
                continue;
            }
            let Translation::Inside(segments) = translate_normalized(&target, &entry.path) else {
                continue;
            };
            if let Some(owner) = entry.owner.upgrade() {
                tracing::trace!(path = %target, mount = %entry.path, "Path falls under mount");
                return Ok(Some(MountMatch {
                    owner,
                    mount: entry.path.clone(),
                    segments,
                }));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::vfs::{VfsOptions, VirtualFs};

    fn registry() -> Arc<MountRegistry> {
        Arc::new(MountRegistry::with_style(PathStyle::Posix))
    }

    fn mounted(registry: &Arc<MountRegistry>, path: &str) -> VirtualFs {
        let vfs = VirtualFs::with_registry(registry.clone(), VfsOptions::default());
        vfs.mount(path).unwrap();
        vfs
    }

    // ── lookup ──────────────────────────────────────────────────────────

    #[test]
    fn empty_registry_passes_everything_through() {
        let reg = registry();
        assert!(reg.is_empty());
        assert!(reg.lookup(Path::new("/anything")).unwrap().is_none());
    }

    #[test]
    fn lookup_translates_into_mount() {
        let reg = registry();
        let _vfs = mounted(&reg, "/tmp/vfs");
        let hit = reg.lookup(Path::new("/tmp/vfs/a/b.txt")).unwrap().unwrap();
        assert_eq!(hit.segments(), ["a", "b.txt"]);
        assert_eq!(hit.mount_path().to_string(), "/tmp/vfs");

        let root = reg.lookup(Path::new("/tmp/vfs")).unwrap().unwrap();
        assert!(root.segments().is_empty());

        assert!(reg.lookup(Path::new("/tmp/vfs-sibling")).unwrap().is_none());
        assert!(reg.lookup(Path::new("/tmp")).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn relative_lookup_uses_process_cwd() {
        let reg = registry();
        let _vfs = mounted(&reg, "relative-mount-for-registry-test");
        let mounts = reg.list_mounts().unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(
            mounts[0].path,
            cwd.join("relative-mount-for-registry-test").to_str().unwrap()
        );
        let hit = reg
            .lookup(Path::new("relative-mount-for-registry-test/x.js"))
            .unwrap()
            .unwrap();
        assert_eq!(hit.segments(), ["x.js"]);
    }

    #[test]
    fn windows_style_registry() {
        let reg = Arc::new(MountRegistry::with_style(PathStyle::Windows));
        let _vfs = mounted(&reg, r"C:\vfs\mount");
        let hit = reg
            .lookup(Path::new(r"c:/vfs/mount/dir\file.txt"))
            .unwrap()
            .unwrap();
        assert_eq!(hit.segments(), ["dir", "file.txt"]);
        assert!(reg.lookup(Path::new(r"C:\vfs\Mount\file.txt")).unwrap().is_none());
        assert_eq!(reg.list_mounts().unwrap()[0].path, r"C:\vfs\mount");
    }

    #[test]
    fn module_lookup_skips_mounts_without_hooks() {
        let reg = registry();
        let options = VfsOptions {
            module_hooks: false,
            ..VfsOptions::default()
        };
        let vfs = VirtualFs::with_registry(reg.clone(), options);
        vfs.mount("/no-hooks").unwrap();
        let path = Path::new("/no-hooks/mod.js");
        assert!(reg.lookup(path).unwrap().is_some());
        assert!(reg.lookup_module(path).unwrap().is_none());
        assert!(!reg.list_mounts().unwrap()[0].module_hooks);
    }

    // ── conflicts ───────────────────────────────────────────────────────

    #[test]
    fn overlapping_mounts_rejected() {
        let reg = registry();
        let first = mounted(&reg, "/mnt/a");
        for path in ["/mnt/a", "/mnt/a/", "/mnt/a/b", "/mnt", "/"] {
            let other = VirtualFs::with_registry(reg.clone(), VfsOptions::default());
            let err = other.mount(path).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MountConflict, "mounting {}", path);
            assert!(!other.is_mounted());
        }
        let sibling = mounted(&reg, "/mnt/ab");
        assert_eq!(reg.list_mounts().unwrap().len(), 2);
        assert!(first.is_mounted());
        assert!(sibling.is_mounted());
    }

    // ── unmount ─────────────────────────────────────────────────────────

    #[test]
    fn unmount_by_path_detaches_instance() {
        let reg = registry();
        let vfs = mounted(&reg, "/mnt/by-path");
        vfs.write_file("/f", "still here").unwrap();
        assert!(reg.unmount("/mnt/by-path/").unwrap());
        assert!(!vfs.is_mounted());
        assert!(reg.lookup(Path::new("/mnt/by-path/f")).unwrap().is_none());
        assert_eq!(vfs.read_file("/f").unwrap(), b"still here");
        assert!(!reg.unmount("/mnt/by-path").unwrap());
        vfs.mount("/mnt/elsewhere").unwrap();
    }

    #[test]
    fn dead_owners_are_pruned() {
        let reg = registry();
        let shared = VfsShared::new(VfsOptions::default());
        let path = NormalizedPath::parse("/mnt/dead", PathStyle::Posix).unwrap();
        reg.register(&shared, path).unwrap();
        assert!(!reg.is_empty());
        drop(shared);

        assert!(reg.lookup(Path::new("/mnt/dead/x")).unwrap().is_none());
        assert!(reg.is_empty());
        assert!(reg.list_mounts().unwrap().is_empty());
        // The path is free again.
        let _vfs = mounted(&reg, "/mnt/dead");
    }

    #[test]
    fn global_is_shared() {
        assert!(Arc::ptr_eq(&MountRegistry::global(), &MountRegistry::global()));
    }
}
