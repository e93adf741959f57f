use std::fmt;

use serde::Deserialize;

use crate::error::{VfsError, VfsResult};

// ── Limits ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VfsLimits {
    pub max_file_size: u64,
    pub max_total_size: u64,
    pub max_path_depth: usize,
    pub max_name_length: usize,
    pub max_node_count: usize,
    pub max_path_length: usize,
}

impl Default for VfsLimits {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,   // 10 MB
            max_total_size: 100 * 1024 * 1024, // 100 MB
            max_path_depth: 32,
            max_name_length: 255,
            max_node_count: 10_000,
            max_path_length: 1024,
        }
    }
}

// ── Path style ──────────────────────────────────────────────────────────────

/// Which platform convention a real-world path follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStyle {
    Posix,
    Windows,
}

impl PathStyle {
    pub fn native() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    fn is_separator(self, c: char) -> bool {
        c == '/' || (self == Self::Windows && c == '\\')
    }

    fn separator(self) -> char {
        match self {
            Self::Posix => '/',
            Self::Windows => '\\',
        }
    }
}

impl Default for PathStyle {
    fn default() -> Self {
        Self::native()
    }
}

// ── Normalized paths ────────────────────────────────────────────────────────

/// An absolute real-world path in canonical form.
///
/// `volume` is the Windows drive (`C:`, stored upper-case) or UNC share
/// (`\\server\share`, stored lower-case) and is `None` for POSIX paths and
/// Windows paths rooted at the current drive. Segments never contain
/// separators, `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPath {
    style: PathStyle,
    volume: Option<String>,
    segments: Vec<String>,
}

impl NormalizedPath {
    /// Parse and normalize an absolute path. Relative paths are rejected.
    pub fn parse(input: &str, style: PathStyle) -> VfsResult<Self> {
        let (volume, rest) = match style {
            PathStyle::Posix => (None, input),
            PathStyle::Windows => split_windows_volume(input)?,
        };

        if !rest.starts_with(|c: char| style.is_separator(c)) {
            return Err(VfsError::InvalidPath(format!(
                "Path must be absolute: {}",
                input
            )));
        }

        Ok(Self {
            style,
            volume,
            segments: collapse(rest.split(|c: char| style.is_separator(c))),
        })
    }

    pub fn style(&self) -> PathStyle {
        self.style
    }

    pub fn volume(&self) -> Option<&str> {
        self.volume.as_deref()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment-wise prefix test. `/mnt/a` is a prefix of `/mnt/a/b` and of
    /// itself, but not of `/mnt/ab`.
    pub fn starts_with(&self, prefix: &NormalizedPath) -> bool {
        self.volume == prefix.volume
            && self.segments.len() >= prefix.segments.len()
            && self.segments.iter().zip(&prefix.segments).all(|(a, b)| a == b)
    }

    /// Segments of `self` below `prefix`, or `None` if `prefix` does not
    /// contain `self`.
    pub fn strip_prefix(&self, prefix: &NormalizedPath) -> Option<Vec<String>> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(self.segments[prefix.segments.len()..].to_vec())
    }

    /// True if either path contains the other.
    pub fn overlaps(&self, other: &NormalizedPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    pub fn join<S: AsRef<str>>(&self, segments: &[S]) -> Self {
        let mut joined = self.clone();
        joined.segments = collapse(
            self.segments
                .iter()
                .map(String::as_str)
                .chain(segments.iter().map(|s| s.as_ref())),
        );
        joined
    }

    /// Resolve a relative path string against `self`, splitting it with this
    /// path's separators.
    pub fn resolve(&self, relative: &str) -> Self {
        let style = self.style;
        let parts: Vec<&str> = relative.split(|c: char| style.is_separator(c)).collect();
        self.join(&parts)
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = self.style.separator();
        if let Some(volume) = &self.volume {
            f.write_str(volume)?;
        }
        if self.segments.is_empty() {
            return write!(f, "{}", sep);
        }
        for segment in &self.segments {
            write!(f, "{}{}", sep, segment)?;
        }
        Ok(())
    }
}

/// Split a Windows path into its volume and the remainder, which starts at
/// the first separator after the volume.
fn split_windows_volume(input: &str) -> VfsResult<(Option<String>, &str)> {
    let verbatim = input
        .strip_prefix(r"\\?\")
        .or_else(|| input.strip_prefix("//?/"));
    // `\\?\UNC\server\share` is the verbatim spelling of `\\server\share`.
    if let Some(unc) = verbatim.and_then(strip_verbatim_unc) {
        return split_unc(unc, input);
    }
    let input = verbatim.unwrap_or(input);
    let bytes = input.as_bytes();

    // Drive letter: `C:\...`
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let volume = format!("{}:", (bytes[0] as char).to_ascii_uppercase());
        return Ok((Some(volume), &input[2..]));
    }

    // UNC: `\\server\share\...`
    if bytes.len() >= 2 && is_separator_byte(bytes[0]) && is_separator_byte(bytes[1]) {
        return split_unc(&input[2..], input);
    }

    Ok((None, input))
}

fn is_separator_byte(b: u8) -> bool {
    b == b'\\' || b == b'/'
}

/// The remainder after a case-insensitive `UNC` plus separator.
fn strip_verbatim_unc(rest: &str) -> Option<&str> {
    let prefix = rest.get(..3)?;
    let sep = *rest.as_bytes().get(3)?;
    (prefix.eq_ignore_ascii_case("UNC") && is_separator_byte(sep)).then(|| &rest[4..])
}

/// Split `server\share\rest` (the part after the leading separators) into a
/// lower-cased `\\server\share` volume and the remainder.
fn split_unc<'a>(body: &'a str, input: &str) -> VfsResult<(Option<String>, &'a str)> {
    let mut parts = body.splitn(3, ['\\', '/']);
    let server = parts.next().unwrap_or("");
    let share = parts.next().unwrap_or("");
    if server.is_empty() || share.is_empty() {
        return Err(VfsError::InvalidPath(format!(
            "UNC path is missing server or share: {}",
            input
        )));
    }
    let volume = format!(r"\\{}\{}", server.to_lowercase(), share.to_lowercase());
    let rest = &body[server.len() + 1 + share.len()..];
    // The share root itself has no trailing separator.
    let rest = if rest.is_empty() { r"\" } else { rest };
    Ok((Some(volume), rest))
}

/// Drop empty and `.` segments and resolve `..` (clamped at the root).
fn collapse<'a>(parts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut resolved: Vec<String> = Vec::new();
    for seg in parts {
        match seg {
            "" | "." => {}
            ".." => {
                resolved.pop();
            }
            other => resolved.push(other.to_string()),
        }
    }
    resolved
}

// ── Translation ─────────────────────────────────────────────────────────────

/// Where a real-world path falls relative to a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Outside,
    /// Segments below the mount root; empty for the mount root itself.
    Inside(Vec<String>),
}

/// Map `absolute_path` into the mount rooted at `mount_path`.
///
/// Both inputs are normalized first. Anything that does not parse as an
/// absolute path in `style` is `Outside`.
pub fn translate(absolute_path: &str, mount_path: &str, style: PathStyle) -> Translation {
    let (Ok(path), Ok(mount)) = (
        NormalizedPath::parse(absolute_path, style),
        NormalizedPath::parse(mount_path, style),
    ) else {
        return Translation::Outside;
    };
    translate_normalized(&path, &mount)
}

pub fn translate_normalized(path: &NormalizedPath, mount: &NormalizedPath) -> Translation {
    match path.strip_prefix(mount) {
        Some(rest) => Translation::Inside(rest),
        None => Translation::Outside,
    }
}

// ── Virtual paths ───────────────────────────────────────────────────────────

/// Split a virtual path into normalized segments. Both `/` and `\` separate;
/// a leading separator is optional.
pub fn virtual_segments(input: &str) -> Vec<String> {
    collapse(input.split(['/', '\\']))
}

/// Resolve a virtual path against `cwd` when it is relative.
pub fn resolve_virtual(input: &str, cwd: &[String]) -> Vec<String> {
    if input.starts_with(['/', '\\']) || cwd.is_empty() {
        return virtual_segments(input);
    }
    collapse(
        cwd.iter()
            .map(String::as_str)
            .chain(input.split(['/', '\\'])),
    )
}

/// Render virtual segments as a `/`-rooted path for error messages.
pub fn display_virtual<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(segment.as_ref());
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

// ── Validation ──────────────────────────────────────────────────────────────

/// Check if a path segment contains forbidden characters (control chars).
fn has_forbidden_chars(segment: &str) -> bool {
    segment.bytes().any(|b| b <= 0x1f)
}

/// Validate a single path segment. Returns `Some(error_message)` if invalid.
pub fn validate_segment(segment: &str, max_name_length: usize) -> Option<String> {
    if segment.is_empty() {
        return Some("Path segment cannot be empty".to_string());
    }
    if segment.len() > max_name_length {
        return Some(format!(
            "Path segment exceeds max name length ({})",
            max_name_length
        ));
    }
    if has_forbidden_chars(segment) {
        return Some("Path segment contains forbidden characters".to_string());
    }
    None
}

/// Validate virtual segments against limits.
pub fn validate_segments(segments: &[String], limits: &VfsLimits) -> VfsResult<()> {
    if segments.len() > limits.max_path_depth {
        return Err(VfsError::InvalidPath(format!(
            "Path exceeds max depth ({})",
            limits.max_path_depth
        )));
    }
    let length: usize = segments.iter().map(|s| s.len() + 1).sum();
    if length > limits.max_path_length {
        return Err(VfsError::InvalidPath(format!(
            "Path exceeds max length ({})",
            limits.max_path_length
        )));
    }
    for seg in segments {
        if let Some(err) = validate_segment(seg, limits.max_name_length) {
            return Err(VfsError::InvalidPath(format!("{}: {}", err, display_virtual(segments))));
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn posix(p: &str) -> NormalizedPath {
        NormalizedPath::parse(p, PathStyle::Posix).unwrap()
    }

    fn windows(p: &str) -> NormalizedPath {
        NormalizedPath::parse(p, PathStyle::Windows).unwrap()
    }

    fn inside(segs: &[&str]) -> Translation {
        Translation::Inside(segs.iter().map(|s| s.to_string()).collect())
    }

    // ── parse ───────────────────────────────────────────────────────────

    #[test]
    fn parse_posix_basic() {
        let p = posix("/tmp/vfs/data.txt");
        assert_eq!(p.segments(), ["tmp", "vfs", "data.txt"]);
        assert_eq!(p.to_string(), "/tmp/vfs/data.txt");
        assert!(p.volume().is_none());
    }

    #[test]
    fn parse_posix_collapses_dots_and_separators() {
        assert_eq!(posix("/a//b/./c/../d/").to_string(), "/a/b/d");
        assert_eq!(posix("/../..").to_string(), "/");
        assert!(posix("/").is_root());
    }

    #[test]
    fn parse_posix_backslash_is_literal() {
        let p = posix(r"/a\b");
        assert_eq!(p.segments(), [r"a\b"]);
    }

    #[test]
    fn parse_rejects_relative() {
        assert!(NormalizedPath::parse("tmp/x", PathStyle::Posix).is_err());
        assert!(NormalizedPath::parse("", PathStyle::Posix).is_err());
        assert!(NormalizedPath::parse("C:relative", PathStyle::Windows).is_err());
    }

    #[test]
    fn parse_windows_drive() {
        let p = windows(r"c:\Users\Dev\..\Public\file.txt");
        assert_eq!(p.volume(), Some("C:"));
        assert_eq!(p.segments(), ["Users", "Public", "file.txt"]);
        assert_eq!(p.to_string(), r"C:\Users\Public\file.txt");
        assert_eq!(windows("C:/").to_string(), r"C:\");
    }

    #[test]
    fn parse_windows_unc() {
        let p = windows(r"\\Server\Share\dir\f.txt");
        assert_eq!(p.volume(), Some(r"\\server\share"));
        assert_eq!(p.segments(), ["dir", "f.txt"]);
        assert!(windows(r"\\server\share").is_root());
        assert!(NormalizedPath::parse(r"\\server", PathStyle::Windows).is_err());
    }

    #[test]
    fn parse_windows_verbatim_prefix() {
        assert_eq!(windows(r"\\?\C:\a\b"), windows(r"C:\a\b"));
        assert_eq!(windows(r"\\?\UNC\Server\Share\x"), windows(r"\\server\share\x"));
        assert_eq!(windows("//?/unc/server/share"), windows(r"\\server\share"));
        assert!(NormalizedPath::parse(r"\\?\UNC\server", PathStyle::Windows).is_err());
    }

    #[test]
    fn translate_verbatim_unc_into_mount() {
        let s = PathStyle::Windows;
        assert_eq!(translate(r"\\?\UNC\host\share\pkg\a.js", r"\\host\share\pkg", s), inside(&["a.js"]));
        assert_eq!(translate(r"\\?\UNC\host\share\other", r"\\host\share\pkg", s), Translation::Outside);
    }

    // ── prefix relations ────────────────────────────────────────────────

    #[test]
    fn starts_with_is_segment_wise() {
        assert!(posix("/mnt/a/b").starts_with(&posix("/mnt/a")));
        assert!(posix("/mnt/a").starts_with(&posix("/mnt/a")));
        assert!(!posix("/mnt/ab").starts_with(&posix("/mnt/a")));
        assert!(posix("/anything").starts_with(&posix("/")));
    }

    #[test]
    fn overlaps_both_directions() {
        assert!(posix("/a").overlaps(&posix("/a/b")));
        assert!(posix("/a/b").overlaps(&posix("/a")));
        assert!(!posix("/a/b").overlaps(&posix("/a/c")));
    }

    #[test]
    fn join_normalizes() {
        let p = posix("/mnt").join(&["a", "..", "b"]);
        assert_eq!(p.to_string(), "/mnt/b");
    }

    #[test]
    fn resolve_relative_string() {
        assert_eq!(posix("/work").resolve("src/../lib/x.js").to_string(), "/work/lib/x.js");
        assert_eq!(
            windows(r"C:\work").resolve(r"src\main.js").to_string(),
            r"C:\work\src\main.js"
        );
    }

    // ── translate ───────────────────────────────────────────────────────

    #[test]
    fn translate_inside_and_outside() {
        let s = PathStyle::Posix;
        assert_eq!(
            translate("/tmp/vfs/sub/f.txt", "/tmp/vfs", s),
            inside(&["sub", "f.txt"])
        );
        assert_eq!(translate("/tmp/vfs", "/tmp/vfs", s), inside(&[]));
        assert_eq!(translate("/tmp/other-file", "/tmp/vfs", s), Translation::Outside);
        assert_eq!(translate("/tmp/vfs-2/x", "/tmp/vfs", s), Translation::Outside);
    }

    #[test]
    fn translate_ignores_trailing_separator() {
        let s = PathStyle::Posix;
        assert_eq!(translate("/m/x", "/m/", s), translate("/m/x", "/m", s));
        assert_eq!(translate("/m/", "/m", s), inside(&[]));
    }

    #[test]
    fn translate_collapses_dotdot_escape() {
        assert_eq!(
            translate("/m/sub/../../etc/passwd", "/m", PathStyle::Posix),
            Translation::Outside
        );
        assert_eq!(
            translate("/m/sub/../f", "/m", PathStyle::Posix),
            inside(&["f"])
        );
    }

    #[test]
    fn translate_posix_is_case_sensitive() {
        assert_eq!(
            translate("/Tmp/vfs/f", "/tmp/vfs", PathStyle::Posix),
            Translation::Outside
        );
    }

    #[test]
    fn translate_windows_drive_case_insensitive_only() {
        let s = PathStyle::Windows;
        assert_eq!(
            translate(r"c:\vfs\mount\f.txt", r"C:/vfs/mount", s),
            inside(&["f.txt"])
        );
        assert_eq!(
            translate(r"C:\VFS\mount\f.txt", r"C:\vfs\mount", s),
            Translation::Outside
        );
        assert_eq!(
            translate(r"D:\vfs\mount\f.txt", r"C:\vfs\mount", s),
            Translation::Outside
        );
    }

    #[test]
    fn translate_relative_is_outside() {
        assert_eq!(
            translate("vfs/f.txt", "/vfs", PathStyle::Posix),
            Translation::Outside
        );
    }

    // ── virtual paths ───────────────────────────────────────────────────

    #[test]
    fn virtual_segments_accepts_both_separators() {
        assert_eq!(virtual_segments(r"/a\b/./c"), ["a", "b", "c"]);
        assert!(virtual_segments("/").is_empty());
        assert_eq!(virtual_segments("x/y"), ["x", "y"]);
    }

    #[test]
    fn resolve_virtual_against_cwd() {
        let cwd = vec!["home".to_string(), "user".to_string()];
        assert_eq!(resolve_virtual("f.txt", &cwd), ["home", "user", "f.txt"]);
        assert_eq!(resolve_virtual("../x", &cwd), ["home", "x"]);
        assert_eq!(resolve_virtual("/abs", &cwd), ["abs"]);
    }

    #[test]
    fn display_virtual_root() {
        let empty: [&str; 0] = [];
        assert_eq!(display_virtual(&empty), "/");
        assert_eq!(display_virtual(&["a", "b"]), "/a/b");
    }

    // ── validation ──────────────────────────────────────────────────────

    #[test]
    fn validate_segment_rules() {
        assert_eq!(validate_segment("hello", 255), None);
        assert!(validate_segment("", 255).is_some());
        assert!(validate_segment(&"a".repeat(256), 255).is_some());
        assert!(validate_segment("foo\x01bar", 255).is_some());
    }

    #[test]
    fn validate_segments_depth_and_length() {
        let limits = VfsLimits {
            max_path_depth: 2,
            ..VfsLimits::default()
        };
        let deep = virtual_segments("/a/b/c");
        assert!(validate_segments(&deep, &limits).is_err());

        let limits = VfsLimits {
            max_path_length: 10,
            ..VfsLimits::default()
        };
        let long = virtual_segments("/a-very-long-path");
        assert!(validate_segments(&long, &limits).is_err());

        assert!(validate_segments(&virtual_segments("/ok/path"), &VfsLimits::default()).is_ok());
    }

    #[test]
    fn limits_deserialize_with_defaults() {
        let limits: VfsLimits = serde_json::from_str(r#"{"maxFileSize": 16}"#).unwrap();
        assert_eq!(limits.max_file_size, 16);
        assert_eq!(limits.max_node_count, VfsLimits::default().max_node_count);
    }
}
