// ---------------------------------------------------------------------------
// Module loading through ModuleHooks
//
// TestLoader stands in for a host runtime's loader: it resolves specifiers
// with module_stat, canonicalizes with module_realpath, reads sources with
// read_module_source, evaluates a tiny `module.exports = <json>;` format and
// caches results by canonical path.
// ---------------------------------------------------------------------------

mod common;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use common::Harness;
use serde_json::{json, Value};
use simse_mountfs::{InterceptedFs, ModuleHooks, ModuleStat, VfsOptions, WriteOptions};

struct TestLoader {
    hooks: Arc<dyn ModuleHooks>,
    cache: Mutex<HashMap<PathBuf, Value>>,
}

impl TestLoader {
    fn new(hooks: Arc<dyn ModuleHooks>) -> Self {
        Self {
            hooks,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Try the path as given, with `.js`, then as a directory with `index.js`.
    fn resolve(&self, specifier: &Path) -> Option<PathBuf> {
        match self.hooks.module_stat(specifier) {
            ModuleStat::File => return Some(specifier.to_path_buf()),
            ModuleStat::Directory => {
                let index = specifier.join("index.js");
                if self.hooks.module_stat(&index) == ModuleStat::File {
                    return Some(index);
                }
            }
            ModuleStat::Missing => {}
        }
        let with_ext = specifier.with_extension("js");
        (self.hooks.module_stat(&with_ext) == ModuleStat::File).then_some(with_ext)
    }

    fn require(&self, specifier: &Path) -> Result<Value, String> {
        if let Some(cached) = self.cache.lock().unwrap().get(specifier) {
            return Ok(cached.clone());
        }
        let resolved = self
            .resolve(specifier)
            .ok_or_else(|| format!("Cannot find module '{}'", specifier.display()))?;
        let resolved = self
            .hooks
            .module_realpath(&resolved)
            .map_err(|e| e.to_string())?;
        if let Some(cached) = self.cache.lock().unwrap().get(&resolved) {
            return Ok(cached.clone());
        }
        let source = self
            .hooks
            .read_module_source(&resolved)
            .map_err(|e| e.to_string())?;
        let value = evaluate(&String::from_utf8_lossy(&source))?;
        let mut cache = self.cache.lock().unwrap();
        cache.insert(resolved, value.clone());
        cache.insert(specifier.to_path_buf(), value.clone());
        Ok(value)
    }

    fn forget(&self, path: &Path) {
        self.cache.lock().unwrap().remove(path);
    }
}

fn evaluate(source: &str) -> Result<Value, String> {
    let body = source
        .trim()
        .strip_prefix("module.exports =")
        .and_then(|rest| rest.trim().strip_suffix(';'))
        .ok_or_else(|| "unsupported module format".to_string())?;
    serde_json::from_str(body).map_err(|e| e.to_string())
}

fn loader_for(h: &Harness) -> TestLoader {
    TestLoader::new(Arc::new(InterceptedFs::with_os_fs(h.registry.clone())))
}

#[test]
fn module_served_from_memory_until_cache_is_cleared() {
    let h = Harness::new();
    let vfs = h.vfs();
    vfs.write_file("/module.js", r#"module.exports = {"answer": 42};"#)
        .unwrap();
    let mount = h.mount(&vfs, "app");
    let loader = loader_for(&h);
    let module = mount.join("module.js");

    assert_eq!(loader.require(&module).unwrap(), json!({"answer": 42}));

    // Unmounting leaves the loader's cache alone.
    vfs.unmount().unwrap();
    assert_eq!(loader.require(&module).unwrap(), json!({"answer": 42}));

    loader.forget(&module);
    let err = loader.require(&module).unwrap_err();
    assert!(err.starts_with("Cannot find module"), "{}", err);
}

#[test]
fn aliased_specifiers_share_one_cache_entry() {
    let h = Harness::new();
    let vfs = h.vfs();
    vfs.write_file_with(
        "/lib/value.js",
        r#"module.exports = "first";"#,
        &WriteOptions::create_parents(),
    )
    .unwrap();
    let mount = h.mount(&vfs, "alias");
    let loader = loader_for(&h);

    assert_eq!(loader.require(&mount.join("lib/value.js")).unwrap(), json!("first"));
    vfs.write_file("/lib/value.js", r#"module.exports = "second";"#)
        .unwrap();
    // A different spelling of the same file resolves to the cached entry.
    assert_eq!(loader.require(&mount.join("lib/../lib/value")).unwrap(), json!("first"));
}

#[test]
fn resolves_extensions_and_directory_index() {
    let h = Harness::new();
    let vfs = h.vfs();
    vfs.write_file_with(
        "/node_modules/pkg/index.js",
        r#"module.exports = "pkg";"#,
        &WriteOptions::create_parents(),
    )
    .unwrap();
    vfs.write_file("/util.js", "module.exports = [1, 2];").unwrap();
    let mount = h.mount(&vfs, "proj");
    let loader = loader_for(&h);

    assert_eq!(loader.require(&mount.join("node_modules/pkg")).unwrap(), json!("pkg"));
    assert_eq!(loader.require(&mount.join("util")).unwrap(), json!([1, 2]));
}

#[test]
fn real_modules_outside_the_mount_still_load() {
    let h = Harness::new();
    std::fs::write(h.path("real.js"), r#"module.exports = {"disk": true};"#).unwrap();
    let vfs = h.vfs();
    h.mount(&vfs, "virtual");
    let loader = loader_for(&h);

    assert_eq!(loader.require(&h.path("real.js")).unwrap(), json!({"disk": true}));
}

#[test]
fn mounts_without_module_hooks_are_invisible_to_the_loader() {
    let h = Harness::new();
    let vfs = h.vfs_with(VfsOptions {
        module_hooks: false,
        ..VfsOptions::default()
    });
    vfs.write_file("/hidden.js", "module.exports = 0;").unwrap();
    let mount = h.mount(&vfs, "nohooks");
    let loader = loader_for(&h);

    assert!(loader.require(&mount.join("hidden.js")).is_err());
}

#[test]
fn syntax_errors_surface_from_the_loader() {
    let h = Harness::new();
    let vfs = h.vfs();
    vfs.write_file("/broken.js", "module.exports = {;").unwrap();
    let mount = h.mount(&vfs, "broken");
    let loader = loader_for(&h);

    assert!(loader.require(&mount.join("broken.js")).is_err());
}
