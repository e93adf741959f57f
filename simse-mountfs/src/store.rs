// ---------------------------------------------------------------------------
// VNode store: the in-memory tree behind every VirtualFs
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use std::time::SystemTime;

use serde::Deserialize;

use crate::error::{VfsError, VfsResult};
use crate::fs::{DirEntry, EntryType, Stats};
use crate::path::{display_virtual, validate_segments, VfsLimits};

pub const DEFAULT_FILE_MODE: u32 = 0o100644;
pub const DEFAULT_DIR_MODE: u32 = 0o040755;

const S_IFREG: u32 = 0o100000;
const PERMISSION_BITS: u32 = 0o7777;

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct NodeMeta {
	pub mode: u32,
	pub birthtime: SystemTime,
	pub mtime: SystemTime,
}

impl NodeMeta {
	fn new(mode: u32, now: SystemTime) -> Self {
		Self {
			mode,
			birthtime: now,
			mtime: now,
		}
	}
}

#[derive(Debug, Clone)]
pub struct FileNode {
	pub content: Vec<u8>,
	pub meta: NodeMeta,
}

/// A directory's children, unique by name and listed in insertion order.
#[derive(Debug, Clone)]
pub struct DirNode {
	children: HashMap<String, VNode>,
	order: Vec<String>,
	pub meta: NodeMeta,
}

#[derive(Debug, Clone)]
pub enum VNode {
	File(FileNode),
	Directory(DirNode),
}

impl DirNode {
	fn new(now: SystemTime) -> Self {
		Self {
			children: HashMap::new(),
			order: Vec::new(),
			meta: NodeMeta::new(DEFAULT_DIR_MODE, now),
		}
	}

	pub fn get(&self, name: &str) -> Option<&VNode> {
		self.children.get(name)
	}

	fn get_mut(&mut self, name: &str) -> Option<&mut VNode> {
		self.children.get_mut(name)
	}

	/// Insert or replace. A replaced child keeps its listing position.
	fn insert(&mut self, name: String, node: VNode) {
		if self.children.insert(name.clone(), node).is_none() {
			self.order.push(name);
		}
	}

	fn remove(&mut self, name: &str) -> Option<VNode> {
		let node = self.children.remove(name)?;
		self.order.retain(|n| n != name);
		Some(node)
	}

	pub fn names(&self) -> &[String] {
		&self.order
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}

	fn entries(&self) -> impl Iterator<Item = (&String, &VNode)> {
		self.order
			.iter()
			.filter_map(|name| self.children.get(name).map(|node| (name, node)))
	}
}

impl VNode {
	pub fn entry_type(&self) -> EntryType {
		match self {
			Self::File(_) => EntryType::File,
			Self::Directory(_) => EntryType::Directory,
		}
	}

	/// Node count and content bytes of this subtree, itself included.
	fn usage(&self) -> (usize, u64) {
		match self {
			Self::File(file) => (1, file.content.len() as u64),
			Self::Directory(dir) => dir
				.children
				.values()
				.map(VNode::usage)
				.fold((1, 0), |(n, b), (cn, cb)| (n + cn, b + cb)),
		}
	}
}

enum NodeRef<'a> {
	File(&'a FileNode),
	Directory(&'a DirNode),
}

fn file_stats(file: &FileNode) -> Stats {
	Stats {
		entry_type: EntryType::File,
		size: file.content.len() as u64,
		mode: file.meta.mode,
		mtime: file.meta.mtime,
		birthtime: file.meta.birthtime,
	}
}

fn dir_stats(dir: &DirNode) -> Stats {
	Stats {
		entry_type: EntryType::Directory,
		size: dir.len() as u64,
		mode: dir.meta.mode,
		mtime: dir.meta.mtime,
		birthtime: dir.meta.birthtime,
	}
}

/// Walk to the directory at `segments`. Missing segments and files along
/// the way both yield `None`.
fn dir_mut<'a>(dir: &'a mut DirNode, segments: &[String]) -> Option<&'a mut DirNode> {
	match segments.split_first() {
		None => Some(dir),
		Some((first, rest)) => match dir.get_mut(first)? {
			VNode::Directory(child) => dir_mut(child, rest),
			VNode::File(_) => None,
		},
	}
}

/// Create every missing directory along `segments` under `dir`.
fn ensure_dirs(dir: &mut DirNode, segments: &[String], now: SystemTime) -> VfsResult<()> {
	let Some((first, rest)) = segments.split_first() else {
		return Ok(());
	};
	if dir.get(first).is_none() {
		dir.insert(first.clone(), VNode::Directory(DirNode::new(now)));
		dir.meta.mtime = now;
	}
	match dir.get_mut(first) {
		Some(VNode::Directory(child)) => ensure_dirs(child, rest, now),
		_ => Err(VfsError::InvalidState(format!(
			"Directory vanished while creating {}",
			first
		))),
	}
}

// ---------------------------------------------------------------------------
// Write options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WriteOptions {
	/// Create missing parent directories instead of failing with `ENOENT`.
	pub create_parents: bool,
	/// Permission bits for a newly created file. Ignored on overwrite.
	pub mode: Option<u32>,
}

impl WriteOptions {
	pub fn create_parents() -> Self {
		Self {
			create_parents: true,
			mode: None,
		}
	}
}

// ---------------------------------------------------------------------------
// NodeStore
// ---------------------------------------------------------------------------

/// Tree of VNodes addressed by normalized virtual segments. The root is
/// always a directory and cannot be removed.
#[derive(Debug, Clone)]
pub struct NodeStore {
	root: DirNode,
	limits: VfsLimits,
	total_size: u64,
	node_count: usize,
}

impl NodeStore {
	// -- Constructor ------------------------------------------------------

	pub fn new(limits: VfsLimits) -> Self {
		Self {
			root: DirNode::new(SystemTime::now()),
			limits,
			total_size: 0,
			node_count: 1,
		}
	}

	pub fn limits(&self) -> &VfsLimits {
		&self.limits
	}

	pub fn total_size(&self) -> u64 {
		self.total_size
	}

	pub fn node_count(&self) -> usize {
		self.node_count
	}

	// -- Helpers (private) ------------------------------------------------

	fn lookup(&self, segments: &[String]) -> Option<NodeRef<'_>> {
		let Some((last, parents)) = segments.split_last() else {
			return Some(NodeRef::Directory(&self.root));
		};
		let mut dir = &self.root;
		for seg in parents {
			match dir.get(seg)? {
				VNode::Directory(child) => dir = child,
				VNode::File(_) => return None,
			}
		}
		match dir.get(last)? {
			VNode::File(file) => Some(NodeRef::File(file)),
			VNode::Directory(child) => Some(NodeRef::Directory(child)),
		}
	}

	fn parent_dir(&self, parents: &[String]) -> Option<&DirNode> {
		match self.lookup(parents)? {
			NodeRef::Directory(dir) => Some(dir),
			NodeRef::File(_) => None,
		}
	}

	fn assert_capacity(&self, path: &str, old_size: u64, new_size: u64, new_nodes: usize) -> VfsResult<()> {
		if new_size > self.limits.max_file_size {
			return Err(VfsError::LimitExceeded(format!(
				"File size {} exceeds limit ({}): {}",
				new_size, self.limits.max_file_size, path
			)));
		}
		if self.total_size - old_size + new_size > self.limits.max_total_size {
			return Err(VfsError::LimitExceeded(format!(
				"Total storage size would exceed limit ({})",
				self.limits.max_total_size
			)));
		}
		if self.node_count + new_nodes > self.limits.max_node_count {
			return Err(VfsError::LimitExceeded(format!(
				"Maximum node count exceeded ({})",
				self.limits.max_node_count
			)));
		}
		Ok(())
	}

	/// Count the directories `segments` would need created, failing on the
	/// first file in the way.
	fn missing_dirs(&self, segments: &[String], syscall: &'static str) -> VfsResult<usize> {
		let mut dir = &self.root;
		for (i, seg) in segments.iter().enumerate() {
			match dir.get(seg) {
				Some(VNode::Directory(child)) => dir = child,
				Some(VNode::File(_)) if i + 1 == segments.len() && syscall == "mkdir" => {
					return Err(VfsError::already_exists(syscall, display_virtual(segments)));
				}
				Some(VNode::File(_)) => {
					return Err(VfsError::not_a_directory(syscall, display_virtual(&segments[..=i])));
				}
				None => return Ok(segments.len() - i),
			}
		}
		Ok(0)
	}

	fn create_dirs(&mut self, segments: &[String], syscall: &'static str) -> VfsResult<()> {
		let missing = self.missing_dirs(segments, syscall)?;
		if missing == 0 {
			return Ok(());
		}
		self.assert_capacity(&display_virtual(segments), 0, 0, missing)?;
		ensure_dirs(&mut self.root, segments, SystemTime::now())?;
		self.node_count += missing;
		Ok(())
	}

	// -- File operations --------------------------------------------------

	pub fn exists(&self, segments: &[String]) -> bool {
		self.lookup(segments).is_some()
	}

	pub fn read(&self, segments: &[String]) -> VfsResult<&[u8]> {
		match self.lookup(segments) {
			Some(NodeRef::File(file)) => Ok(&file.content),
			Some(NodeRef::Directory(_)) => Err(VfsError::is_a_directory("read", display_virtual(segments))),
			None => Err(VfsError::not_found("open", display_virtual(segments))),
		}
	}

	pub fn write(&mut self, segments: &[String], data: Vec<u8>, options: &WriteOptions) -> VfsResult<()> {
		validate_segments(segments, &self.limits)?;
		let path = display_virtual(segments);
		let Some((name, parents)) = segments.split_last() else {
			return Err(VfsError::is_a_directory("open", path));
		};

		if options.create_parents {
			self.create_dirs(parents, "open")?;
		}
		let parent = self
			.parent_dir(parents)
			.ok_or_else(|| VfsError::not_found("open", path.clone()))?;
		let old_size = match parent.get(name) {
			Some(VNode::Directory(_)) => return Err(VfsError::is_a_directory("open", path)),
			Some(VNode::File(file)) => Some(file.content.len() as u64),
			None => None,
		};
		let new_size = data.len() as u64;
		self.assert_capacity(&path, old_size.unwrap_or(0), new_size, usize::from(old_size.is_none()))?;

		let now = SystemTime::now();
		let parent = dir_mut(&mut self.root, parents).ok_or_else(|| VfsError::not_found("open", path.clone()))?;
		match parent.get_mut(name) {
			Some(VNode::File(file)) => {
				file.content = data;
				file.meta.mtime = now;
			}
			_ => {
				let mode = options
					.mode
					.map_or(DEFAULT_FILE_MODE, |m| S_IFREG | (m & PERMISSION_BITS));
				parent.insert(
					name.clone(),
					VNode::File(FileNode {
						content: data,
						meta: NodeMeta::new(mode, now),
					}),
				);
				self.node_count += 1;
			}
		}
		parent.meta.mtime = now;
		self.total_size = self.total_size - old_size.unwrap_or(0) + new_size;
		Ok(())
	}

	pub fn append(&mut self, segments: &[String], data: &[u8]) -> VfsResult<()> {
		let mut content = match self.lookup(segments) {
			Some(NodeRef::File(file)) => file.content.clone(),
			Some(NodeRef::Directory(_)) => {
				return Err(VfsError::is_a_directory("open", display_virtual(segments)));
			}
			None => Vec::new(),
		};
		content.extend_from_slice(data);
		self.write(segments, content, &WriteOptions::default())
	}

	pub fn copy(&mut self, src: &[String], dest: &[String]) -> VfsResult<()> {
		let (content, mode) = match self.lookup(src) {
			Some(NodeRef::File(file)) => (file.content.clone(), file.meta.mode),
			Some(NodeRef::Directory(_)) => {
				return Err(VfsError::is_a_directory("copyfile", display_virtual(src)));
			}
			None => return Err(VfsError::not_found("copyfile", display_virtual(src))),
		};
		let options = WriteOptions {
			create_parents: false,
			mode: Some(mode),
		};
		self.write(dest, content, &options)
	}

	// -- Directory operations ---------------------------------------------

	pub fn mkdir(&mut self, segments: &[String], recursive: bool) -> VfsResult<()> {
		validate_segments(segments, &self.limits)?;
		if recursive {
			return self.create_dirs(segments, "mkdir");
		}
		let path = display_virtual(segments);
		let Some((name, parents)) = segments.split_last() else {
			return Ok(());
		};
		let parent = self
			.parent_dir(parents)
			.ok_or_else(|| VfsError::not_found("mkdir", path.clone()))?;
		match parent.get(name) {
			Some(VNode::Directory(_)) => return Ok(()),
			Some(VNode::File(_)) => return Err(VfsError::already_exists("mkdir", path)),
			None => {}
		}
		self.assert_capacity(&path, 0, 0, 1)?;

		let now = SystemTime::now();
		let parent = dir_mut(&mut self.root, parents).ok_or_else(|| VfsError::not_found("mkdir", path))?;
		parent.insert(name.clone(), VNode::Directory(DirNode::new(now)));
		parent.meta.mtime = now;
		self.node_count += 1;
		Ok(())
	}

	pub fn read_dir(&self, segments: &[String]) -> VfsResult<Vec<String>> {
		match self.lookup(segments) {
			Some(NodeRef::Directory(dir)) => Ok(dir.names().to_vec()),
			Some(NodeRef::File(_)) => Err(VfsError::not_a_directory("scandir", display_virtual(segments))),
			None => Err(VfsError::not_found("scandir", display_virtual(segments))),
		}
	}

	pub fn read_dir_entries(&self, segments: &[String]) -> VfsResult<Vec<DirEntry>> {
		match self.lookup(segments) {
			Some(NodeRef::Directory(dir)) => Ok(dir
				.entries()
				.map(|(name, node)| DirEntry {
					name: name.clone(),
					entry_type: node.entry_type(),
				})
				.collect()),
			Some(NodeRef::File(_)) => Err(VfsError::not_a_directory("scandir", display_virtual(segments))),
			None => Err(VfsError::not_found("scandir", display_virtual(segments))),
		}
	}

	pub fn stat(&self, segments: &[String]) -> VfsResult<Stats> {
		match self.lookup(segments) {
			Some(NodeRef::File(file)) => Ok(file_stats(file)),
			Some(NodeRef::Directory(dir)) => Ok(dir_stats(dir)),
			None => Err(VfsError::not_found("stat", display_virtual(segments))),
		}
	}

	/// The store has no links, so an existing path is already canonical.
	pub fn realpath(&self, segments: &[String]) -> VfsResult<Vec<String>> {
		match self.lookup(segments) {
			Some(_) => Ok(segments.to_vec()),
			None => Err(VfsError::not_found("realpath", display_virtual(segments))),
		}
	}

	pub fn access(&self, segments: &[String]) -> VfsResult<()> {
		match self.lookup(segments) {
			Some(_) => Ok(()),
			None => Err(VfsError::not_found("access", display_virtual(segments))),
		}
	}

	// -- Removal ----------------------------------------------------------

	pub fn unlink(&mut self, segments: &[String]) -> VfsResult<()> {
		let path = display_virtual(segments);
		let Some((name, parents)) = segments.split_last() else {
			return Err(VfsError::is_a_directory("unlink", path));
		};
		let parent = dir_mut(&mut self.root, parents).ok_or_else(|| VfsError::not_found("unlink", path.clone()))?;
		match parent.get(name) {
			Some(VNode::File(_)) => {}
			Some(VNode::Directory(_)) => return Err(VfsError::is_a_directory("unlink", path)),
			None => return Err(VfsError::not_found("unlink", path)),
		}
		if let Some(VNode::File(file)) = parent.remove(name) {
			self.total_size -= file.content.len() as u64;
			self.node_count -= 1;
		}
		parent.meta.mtime = SystemTime::now();
		Ok(())
	}

	pub fn rmdir(&mut self, segments: &[String], recursive: bool) -> VfsResult<()> {
		let path = display_virtual(segments);
		let Some((name, parents)) = segments.split_last() else {
			return Err(VfsError::InvalidOperation("Cannot remove root directory".to_string()));
		};
		let parent = dir_mut(&mut self.root, parents).ok_or_else(|| VfsError::not_found("rmdir", path.clone()))?;
		match parent.get(name) {
			Some(VNode::Directory(dir)) if !dir.is_empty() && !recursive => {
				return Err(VfsError::not_empty("rmdir", path));
			}
			Some(VNode::Directory(_)) => {}
			Some(VNode::File(_)) => return Err(VfsError::not_a_directory("rmdir", path)),
			None => return Err(VfsError::not_found("rmdir", path)),
		}
		if let Some(removed) = parent.remove(name) {
			let (nodes, bytes) = removed.usage();
			self.node_count -= nodes;
			self.total_size -= bytes;
		}
		parent.meta.mtime = SystemTime::now();
		Ok(())
	}

	/// Move `from` to `to`, replacing a compatible destination.
	pub fn rename(&mut self, from: &[String], to: &[String]) -> VfsResult<()> {
		validate_segments(to, &self.limits)?;
		let from_path = display_virtual(from);
		let to_path = display_virtual(to);
		let (Some((from_name, from_parents)), Some((to_name, to_parents))) = (from.split_last(), to.split_last())
		else {
			return Err(VfsError::InvalidOperation(format!(
				"Cannot rename root directory: {} -> {}",
				from_path, to_path
			)));
		};

		let source_is_dir = match self.lookup(from) {
			Some(NodeRef::Directory(_)) => true,
			Some(NodeRef::File(_)) => false,
			None => return Err(VfsError::not_found("rename", from_path)),
		};
		if from == to {
			return Ok(());
		}
		if source_is_dir && to.starts_with(from) {
			return Err(VfsError::InvalidOperation(format!(
				"Cannot move directory into itself: {} -> {}",
				from_path, to_path
			)));
		}
		let dest_parent = self
			.parent_dir(to_parents)
			.ok_or_else(|| VfsError::not_found("rename", to_path.clone()))?;
		let replaced = match (dest_parent.get(to_name), source_is_dir) {
			(None, _) => None,
			(Some(VNode::Directory(_)), false) => return Err(VfsError::is_a_directory("rename", to_path)),
			(Some(VNode::File(_)), true) => return Err(VfsError::not_a_directory("rename", to_path)),
			(Some(VNode::Directory(dir)), true) if !dir.is_empty() => {
				return Err(VfsError::not_empty("rename", to_path));
			}
			(Some(existing), _) => Some(existing.usage()),
		};

		let now = SystemTime::now();
		let source_parent =
			dir_mut(&mut self.root, from_parents).ok_or_else(|| VfsError::not_found("rename", from_path.clone()))?;
		let node = source_parent
			.remove(from_name)
			.ok_or_else(|| VfsError::not_found("rename", from_path.clone()))?;
		source_parent.meta.mtime = now;

		match dir_mut(&mut self.root, to_parents) {
			Some(dest) => {
				dest.insert(to_name.clone(), node);
				dest.meta.mtime = now;
			}
			None => {
				if let Some(source_parent) = dir_mut(&mut self.root, from_parents) {
					source_parent.insert(from_name.clone(), node);
				}
				return Err(VfsError::not_found("rename", to_path));
			}
		}
		if let Some((nodes, bytes)) = replaced {
			self.node_count -= nodes;
			self.total_size -= bytes;
		}
		Ok(())
	}
}
