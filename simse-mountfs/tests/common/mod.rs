// ---------------------------------------------------------------------------
// Shared helpers for simse-mountfs integration tests
// ---------------------------------------------------------------------------

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use simse_mountfs::{InterceptedFs, MountRegistry, PathStyle, VfsOptions, VirtualFs};

/// Install a test-writer subscriber once. Set `RUST_LOG=simse_mountfs=trace`
/// to see dispatch decisions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A private registry plus an interceptor over the real filesystem, rooted
/// in a fresh temp directory.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub registry: Arc<MountRegistry>,
    pub fs: InterceptedFs,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let registry = Arc::new(MountRegistry::with_style(PathStyle::native()));
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
            fs: InterceptedFs::with_os_fs(registry.clone()),
            registry,
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn vfs(&self) -> VirtualFs {
        self.vfs_with(VfsOptions::default())
    }

    pub fn vfs_with(&self, options: VfsOptions) -> VirtualFs {
        VirtualFs::with_registry(self.registry.clone(), options)
    }

    /// Mount `vfs` at `relative` under the temp directory.
    pub fn mount(&self, vfs: &VirtualFs, relative: &str) -> PathBuf {
        let mount = self.path(relative);
        vfs.mount(path_str(&mount)).expect("mount");
        mount
    }
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}
