// ---------------------------------------------------------------------------
// VirtualFs: one in-memory store plus its mount state
// ---------------------------------------------------------------------------

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;

use crate::encoding::Encoding;
use crate::error::{VfsError, VfsResult};
use crate::fs::{DirEntry, Stats};
use crate::hooks::ModuleStat;
use crate::path::{display_virtual, resolve_virtual, NormalizedPath, VfsLimits};
use crate::registry::MountRegistry;
use crate::store::{NodeStore, WriteOptions};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VfsOptions {
	pub limits: VfsLimits,
	/// Serve module-loader lookups under the mount point.
	pub module_hooks: bool,
	/// Enable `chdir` / `cwd` and resolve relative paths against them.
	pub virtual_cwd: bool,
}

impl Default for VfsOptions {
	fn default() -> Self {
		Self {
			limits: VfsLimits::default(),
			module_hooks: true,
			virtual_cwd: false,
		}
	}
}

impl VfsOptions {
	pub fn from_json(json: &str) -> VfsResult<Self> {
		serde_json::from_str(json).map_err(|e| VfsError::InvalidOperation(format!("Invalid options: {}", e)))
	}
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct VfsState {
	pub(crate) store: NodeStore,
	pub(crate) mount_point: Option<NormalizedPath>,
	/// Virtual working directory, set by `chdir`.
	pub(crate) cwd: Option<Vec<String>>,
}

impl VfsState {
	fn resolve(&self, path: &str) -> Vec<String> {
		resolve_virtual(path, self.cwd.as_deref().unwrap_or(&[]))
	}

	/// The virtual cwd as a real-world path, while mounted.
	pub(crate) fn mounted_cwd(&self) -> Option<NormalizedPath> {
		match (&self.mount_point, &self.cwd) {
			(Some(mount), Some(cwd)) => Some(mount.join(cwd)),
			_ => None,
		}
	}
}

/// The part of a `VirtualFs` the registry can see through a weak reference.
#[derive(Debug)]
pub(crate) struct VfsShared {
	state: Mutex<VfsState>,
	pub(crate) options: VfsOptions,
}

impl VfsShared {
	pub(crate) fn new(options: VfsOptions) -> Arc<Self> {
		Arc::new(Self {
			state: Mutex::new(VfsState {
				store: NodeStore::new(options.limits.clone()),
				mount_point: None,
				cwd: None,
			}),
			options,
		})
	}

	pub(crate) fn lock(&self) -> VfsResult<MutexGuard<'_, VfsState>> {
		self.state.lock().map_err(|_| VfsError::LockPoisoned("vfs state"))
	}

	/// Run `f` under the state lock if still mounted at `mount`. `None` means
	/// the instance was unmounted or moved since the registry lookup.
	pub(crate) fn with_mounted<T>(
		&self,
		mount: &NormalizedPath,
		f: impl FnOnce(&mut VfsState) -> T,
	) -> VfsResult<Option<T>> {
		let mut state = self.lock()?;
		if state.mount_point.as_ref() != Some(mount) {
			return Ok(None);
		}
		Ok(Some(f(&mut state)))
	}
}

// ---------------------------------------------------------------------------
// VirtualFs
// ---------------------------------------------------------------------------

/// A mountable in-memory filesystem.
///
/// The direct API takes virtual paths (`/a/b.txt`) and behaves the same
/// whether or not the instance is mounted. Dropping a mounted instance
/// unmounts it.
#[derive(Debug)]
pub struct VirtualFs {
	shared: Arc<VfsShared>,
	registry: Arc<MountRegistry>,
}

impl VirtualFs {
	// -- Constructor ------------------------------------------------------

	/// Create an empty instance that mounts into the process-wide registry.
	pub fn new(options: VfsOptions) -> Self {
		Self::with_registry(MountRegistry::global(), options)
	}

	pub fn with_registry(registry: Arc<MountRegistry>, options: VfsOptions) -> Self {
		Self {
			shared: VfsShared::new(options),
			registry,
		}
	}

	pub fn options(&self) -> &VfsOptions {
		&self.shared.options
	}

	pub fn registry(&self) -> &Arc<MountRegistry> {
		&self.registry
	}

	fn state(&self) -> VfsResult<MutexGuard<'_, VfsState>> {
		self.shared.lock()
	}

	// -- File operations --------------------------------------------------

	pub fn write_file(&self, path: &str, data: impl AsRef<[u8]>) -> VfsResult<()> {
		self.write_file_with(path, data, &WriteOptions::default())
	}

	pub fn write_file_with(&self, path: &str, data: impl AsRef<[u8]>, options: &WriteOptions) -> VfsResult<()> {
		let mut state = self.state()?;
		let segments = state.resolve(path);
		state.store.write(&segments, data.as_ref().to_vec(), options)
	}

	pub fn write_file_encoded(&self, path: &str, text: &str, encoding: Encoding) -> VfsResult<()> {
		let data = encoding.encode(text)?;
		self.write_file(path, data)
	}

	pub fn append_file(&self, path: &str, data: impl AsRef<[u8]>) -> VfsResult<()> {
		let mut state = self.state()?;
		let segments = state.resolve(path);
		state.store.append(&segments, data.as_ref())
	}

	pub fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
		let state = self.state()?;
		state.store.read(&state.resolve(path)).map(<[u8]>::to_vec)
	}

	pub fn read_file_string(&self, path: &str, encoding: Encoding) -> VfsResult<String> {
		let state = self.state()?;
		state.store.read(&state.resolve(path)).map(|bytes| encoding.decode(bytes))
	}

	pub fn copy_file(&self, src: &str, dest: &str) -> VfsResult<()> {
		let mut state = self.state()?;
		let (src, dest) = (state.resolve(src), state.resolve(dest));
		state.store.copy(&src, &dest)
	}

	pub fn exists(&self, path: &str) -> VfsResult<bool> {
		let state = self.state()?;
		Ok(state.store.exists(&state.resolve(path)))
	}

	pub fn stat(&self, path: &str) -> VfsResult<Stats> {
		let state = self.state()?;
		state.store.stat(&state.resolve(path))
	}

	/// Canonical form of an existing path: a real-world path under the mount
	/// point while mounted, a virtual path otherwise.
	pub fn realpath(&self, path: &str) -> VfsResult<String> {
		let state = self.state()?;
		let segments = state.store.realpath(&state.resolve(path))?;
		Ok(match &state.mount_point {
			Some(mount) => mount.join(&segments).to_string(),
			None => display_virtual(&segments),
		})
	}

	pub fn access(&self, path: &str) -> VfsResult<()> {
		let state = self.state()?;
		state.store.access(&state.resolve(path))
	}

	/// Classify a path the way a module resolver asks about it.
	pub fn module_stat(&self, path: &str) -> VfsResult<ModuleStat> {
		let state = self.state()?;
		Ok(ModuleStat::classify(state.store.stat(&state.resolve(path)).ok()))
	}

	pub fn unlink(&self, path: &str) -> VfsResult<()> {
		let mut state = self.state()?;
		let segments = state.resolve(path);
		state.store.unlink(&segments)
	}

	pub fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
		let mut state = self.state()?;
		let (from, to) = (state.resolve(from), state.resolve(to));
		state.store.rename(&from, &to)
	}

	// -- Directory operations ---------------------------------------------

	pub fn mkdir(&self, path: &str, recursive: bool) -> VfsResult<()> {
		let mut state = self.state()?;
		let segments = state.resolve(path);
		state.store.mkdir(&segments, recursive)
	}

	/// Entry names in insertion order.
	pub fn read_dir(&self, path: &str) -> VfsResult<Vec<String>> {
		let state = self.state()?;
		state.store.read_dir(&state.resolve(path))
	}

	pub fn read_dir_entries(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
		let state = self.state()?;
		state.store.read_dir_entries(&state.resolve(path))
	}

	pub fn rmdir(&self, path: &str, recursive: bool) -> VfsResult<()> {
		let mut state = self.state()?;
		let segments = state.resolve(path);
		state.store.rmdir(&segments, recursive)
	}

	// -- Mounting ---------------------------------------------------------

	/// Mount at a real-world path. Relative paths resolve against the
	/// process working directory.
	pub fn mount(&self, path: &str) -> VfsResult<()> {
		let mount = self.registry.normalize_mount_path(path)?;
		let mut state = self.state()?;
		if let Some(existing) = &state.mount_point {
			return Err(VfsError::AlreadyMounted(existing.to_string()));
		}
		self.registry.register(&self.shared, mount.clone())?;
		tracing::info!(mount = %mount, "Mounted virtual filesystem");
		state.mount_point = Some(mount);
		Ok(())
	}

	/// Detach from the registry. A no-op when not mounted.
	pub fn unmount(&self) -> VfsResult<()> {
		let mut state = self.state()?;
		let Some(mount) = state.mount_point.take() else {
			return Ok(());
		};
		state.cwd = None;
		self.registry.deregister(&self.shared)?;
		tracing::info!(mount = %mount, "Unmounted virtual filesystem");
		Ok(())
	}

	pub fn is_mounted(&self) -> bool {
		self.state().map(|s| s.mount_point.is_some()).unwrap_or(false)
	}

	pub fn mount_point(&self) -> Option<String> {
		self.state().ok()?.mount_point.as_ref().map(ToString::to_string)
	}

	// -- Working directory ------------------------------------------------

	fn assert_virtual_cwd(&self) -> VfsResult<()> {
		if !self.shared.options.virtual_cwd {
			return Err(VfsError::InvalidState("virtual cwd is not enabled".to_string()));
		}
		Ok(())
	}

	pub fn chdir(&self, path: &str) -> VfsResult<()> {
		self.assert_virtual_cwd()?;
		let mut state = self.state()?;
		let segments = state.resolve(path);
		match state.store.stat(&segments) {
			Ok(stats) if stats.is_directory() => {}
			Ok(_) => return Err(VfsError::not_a_directory("chdir", display_virtual(&segments))),
			Err(_) => return Err(VfsError::not_found("chdir", display_virtual(&segments))),
		}
		state.cwd = Some(segments);
		Ok(())
	}

	/// The virtual cwd, or `None` before the first `chdir`. While mounted it
	/// is reported as a real-world path under the mount point.
	pub fn cwd(&self) -> VfsResult<Option<String>> {
		self.assert_virtual_cwd()?;
		let state = self.state()?;
		if let Some(real) = state.mounted_cwd() {
			return Ok(Some(real.to_string()));
		}
		Ok(state.cwd.as_deref().map(display_virtual))
	}
}

impl Drop for VirtualFs {
	fn drop(&mut self) {
		if let Err(e) = self.unmount() {
			tracing::warn!("Failed to unmount on drop: {}", e);
			let _ = self.registry.deregister(&self.shared);
		}
	}
}
