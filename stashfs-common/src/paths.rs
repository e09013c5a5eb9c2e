//! Key codec: user-visible virtual paths and the flat store keys behind them.
//!
//! Every key lives under a per-user root (`user-{id}/`). A virtual path is a
//! sequence of validated segments, optionally terminated by `/` to denote a
//! folder. Folders are represented in the store by a zero-length marker object
//! whose key ends with the separator.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::TreeError;

pub const SEPARATOR: char = '/';

/// Relative upload paths: one or more segments of word characters, space and
/// `! . * + [ ] ' ( ) -`. `\w` is ASCII-only.
const FILENAME_PATTERN: &str = r"(?-u)^([\w !.*+\[\]'()\-]+/)*[\w !.*+\[\]'()\-]+$";

fn filename_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(FILENAME_PATTERN).expect("filename pattern is valid"))
}

/// Check a (possibly multi-segment) filename against the upload rule.
///
/// `.` and `..` segments are made of allowed characters but are rejected
/// anyway; they would let a key escape its parent prefix.
pub fn is_valid_filename(name: &str) -> bool {
    filename_regex().is_match(name) && name.split(SEPARATOR).all(|s| s != "." && s != "..")
}

fn validate_segment(segment: &str) -> Result<(), TreeError> {
    if segment.is_empty() {
        return Err(TreeError::InvalidPath("path contains an empty segment".to_string()));
    }
    if segment.contains(SEPARATOR) {
        return Err(TreeError::InvalidPath(format!(
            "name '{}' must not contain '{}'",
            segment, SEPARATOR
        )));
    }
    if segment == "." || segment == ".." {
        return Err(TreeError::InvalidPath(format!("relative segment '{}' is not allowed", segment)));
    }
    if !filename_regex().is_match(segment) {
        return Err(TreeError::InvalidPath(format!(
            "'{}' contains unsupported characters",
            segment
        )));
    }
    Ok(())
}

// ── User root ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl UserId {
    /// Store prefix owning every key of this user, including the trailing separator.
    pub fn root_prefix(&self) -> String {
        format!("user-{}/", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(UserId)
    }
}

// ── Virtual path ──

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath {
    segments: Vec<String>,
    folder: bool,
}

impl VirtualPath {
    pub fn root() -> Self {
        Self { segments: Vec::new(), folder: true }
    }

    /// Parse a root-relative path. The empty string is the root; a trailing
    /// separator marks a folder.
    pub fn parse(raw: &str) -> Result<Self, TreeError> {
        if raw.is_empty() {
            return Ok(Self::root());
        }
        if raw.starts_with(SEPARATOR) {
            return Err(TreeError::InvalidPath(format!("'{}' must not start with a separator", raw)));
        }
        let (body, folder) = match raw.strip_suffix(SEPARATOR) {
            Some(body) => (body, true),
            None => (raw, false),
        };
        let segments = body
            .split(SEPARATOR)
            .map(|s| validate_segment(s).map(|_| s.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments, folder })
    }

    /// Parse a path that must denote a folder; a missing trailing separator is tolerated.
    pub fn parse_folder(raw: &str) -> Result<Self, TreeError> {
        Self::parse(raw).map(|p| p.into_folder())
    }

    /// Parse a path that must denote a file.
    pub fn parse_file(raw: &str) -> Result<Self, TreeError> {
        let path = Self::parse(raw)?;
        if path.folder {
            return Err(TreeError::InvalidPath(format!("'{}' is not a file path", raw)));
        }
        Ok(path)
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_folder(&self) -> bool {
        self.folder
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Leaf name; `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Enclosing folder. The root is its own parent.
    pub fn parent(&self) -> VirtualPath {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments, folder: true }
    }

    pub fn into_folder(mut self) -> Self {
        self.folder = true;
        self
    }

    pub fn child_folder(&self, name: &str) -> Result<VirtualPath, TreeError> {
        self.child(name, true)
    }

    pub fn child_file(&self, name: &str) -> Result<VirtualPath, TreeError> {
        self.child(name, false)
    }

    fn child(&self, name: &str, folder: bool) -> Result<VirtualPath, TreeError> {
        if !self.folder {
            return Err(TreeError::InvalidPath(format!("'{}' is not a folder", self)));
        }
        validate_segment(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments, folder })
    }

    /// Same parent, same kind, different leaf.
    pub fn with_name(&self, name: &str) -> Result<VirtualPath, TreeError> {
        if self.is_root() {
            return Err(TreeError::InvalidPath("the root folder cannot be renamed".to_string()));
        }
        self.parent().child(name, self.folder)
    }

    /// Resolve a relative multi-segment path (`a/b/file.txt`) below this folder.
    pub fn join_relative(&self, relative: &str) -> Result<VirtualPath, TreeError> {
        if !self.folder {
            return Err(TreeError::InvalidPath(format!("'{}' is not a folder", self)));
        }
        let rel = VirtualPath::parse(relative)?;
        if rel.is_root() {
            return Err(TreeError::InvalidPath("relative path is empty".to_string()));
        }
        let mut segments = self.segments.clone();
        segments.extend(rel.segments);
        Ok(Self { segments, folder: rel.folder })
    }

    /// Enclosing folders from the top-level one down to the direct parent.
    /// The root is not included.
    pub fn ancestors(&self) -> Vec<VirtualPath> {
        (1..self.segments.len())
            .map(|n| Self { segments: self.segments[..n].to_vec(), folder: true })
            .collect()
    }

    /// True if `self` lies inside `ancestor` (or is the same folder).
    pub fn is_within(&self, ancestor: &VirtualPath) -> bool {
        ancestor.folder
            && self.segments.len() >= ancestor.segments.len()
            && self.segments[..ancestor.segments.len()] == ancestor.segments[..]
    }

    /// Path of `self` below `ancestor`, without the ancestor's segments.
    pub fn relative_to(&self, ancestor: &VirtualPath) -> Option<String> {
        if !self.is_within(ancestor) {
            return None;
        }
        let mut rel = self.segments[ancestor.segments.len()..].join("/");
        if self.folder && !rel.is_empty() {
            rel.push(SEPARATOR);
        }
        Some(rel)
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))?;
        if self.folder && !self.segments.is_empty() {
            f.write_str("/")?;
        }
        Ok(())
    }
}

impl Serialize for VirtualPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── Codec ──

pub fn to_key(user: UserId, path: &VirtualPath) -> String {
    format!("{}{}", user.root_prefix(), path)
}

pub fn to_virtual_path(user: UserId, key: &str) -> Result<VirtualPath, TreeError> {
    let rest = key.strip_prefix(&user.root_prefix()).ok_or_else(|| {
        TreeError::InvalidPath(format!("key '{}' is outside the root of user {}", key, user))
    })?;
    VirtualPath::parse(rest)
}

pub fn is_folder_key(key: &str) -> bool {
    key.ends_with(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let p = VirtualPath::parse("docs/2024/report.pdf").unwrap();
        assert!(!p.is_folder());
        assert_eq!(p.name(), Some("report.pdf"));
        assert_eq!(p.to_string(), "docs/2024/report.pdf");
        assert_eq!(p.parent().to_string(), "docs/2024/");

        let f = VirtualPath::parse("docs/").unwrap();
        assert!(f.is_folder());
        assert_eq!(f.to_string(), "docs/");
        assert_eq!(f.parent(), VirtualPath::root());
    }

    #[test]
    fn test_rejects_malformed_paths() {
        for bad in ["/docs", "docs//x", "docs/../etc", "./a", "a/b?", "caf\u{e9}.txt", "a\\b", "a/#/"] {
            assert!(
                matches!(VirtualPath::parse(bad), Err(TreeError::InvalidPath(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_allowed_punctuation() {
        let p = VirtualPath::parse("My Files!/a.b*c+d[1]'x'(2)-final.txt").unwrap();
        assert_eq!(p.segments().len(), 2);
    }

    #[test]
    fn test_single_segment_names() {
        let root = VirtualPath::root();
        let docs = VirtualPath::parse("docs/").unwrap();
        let file = VirtualPath::parse("docs/x.txt").unwrap();
        assert!(matches!(root.child_folder("a/b"), Err(TreeError::InvalidPath(_))));
        assert!(matches!(docs.child_file("sub/y.txt"), Err(TreeError::InvalidPath(_))));
        assert!(matches!(docs.child_folder("inner/"), Err(TreeError::InvalidPath(_))));
        assert!(matches!(file.with_name("x/y"), Err(TreeError::InvalidPath(_))));
        assert!(matches!(docs.with_name("docs/inner"), Err(TreeError::InvalidPath(_))));
        assert_eq!(docs.child_file("y.txt").unwrap().to_string(), "docs/y.txt");
        assert_eq!(docs.join_relative("a/b.txt").unwrap().to_string(), "docs/a/b.txt");
    }

    #[test]
    fn test_key_round_trip() {
        let user = UserId(42);
        for raw in ["", "docs/", "docs/2024/report.pdf", "a b/c (1)/", "x.txt"] {
            let p = VirtualPath::parse(raw).unwrap();
            let key = to_key(user, &p);
            assert!(key.starts_with("user-42/"));
            assert_eq!(to_virtual_path(user, &key).unwrap(), p);
        }
        assert_eq!(to_key(user, &VirtualPath::parse("docs/2024/report.pdf").unwrap()), "user-42/docs/2024/report.pdf");
    }

    #[test]
    fn test_foreign_key_rejected() {
        assert!(to_virtual_path(UserId(1), "user-2/docs/").is_err());
        assert!(to_virtual_path(UserId(1), "user-10/docs/").is_err());
    }

    #[test]
    fn test_is_folder_key() {
        assert!(is_folder_key("user-1/docs/"));
        assert!(!is_folder_key("user-1/docs/a.txt"));
    }

    #[test]
    fn test_children_and_rename() {
        let root = VirtualPath::root();
        let docs = root.child_folder("docs").unwrap();
        let file = docs.child_file("a.txt").unwrap();
        assert_eq!(file.to_string(), "docs/a.txt");
        assert_eq!(file.with_name("b.txt").unwrap().to_string(), "docs/b.txt");
        assert_eq!(docs.with_name("papers").unwrap().to_string(), "papers/");
        assert!(file.child_file("x").is_err());
        assert!(root.with_name("x").is_err());
        assert!(docs.child_folder("..").is_err());
    }

    #[test]
    fn test_within_and_relative() {
        let a_b = VirtualPath::parse("a/b/").unwrap();
        let deep = VirtualPath::parse("a/b/c/d.txt").unwrap();
        assert!(deep.is_within(&a_b));
        assert!(a_b.is_within(&a_b));
        assert!(!VirtualPath::parse("a/bc/").unwrap().is_within(&a_b));
        assert_eq!(deep.relative_to(&a_b).unwrap(), "c/d.txt");
        assert_eq!(VirtualPath::parse("a/b/c/").unwrap().relative_to(&a_b).unwrap(), "c/");
    }

    #[test]
    fn test_ancestors() {
        let names: Vec<String> = VirtualPath::parse("a/b/c.txt")
            .unwrap()
            .ancestors()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(names, vec!["a/", "a/b/"]);
        assert!(VirtualPath::parse("a/").unwrap().ancestors().is_empty());
        assert!(VirtualPath::root().ancestors().is_empty());
    }

    #[test]
    fn test_join_relative() {
        let base = VirtualPath::parse("docs/").unwrap();
        assert_eq!(base.join_relative("x/y/z.txt").unwrap().to_string(), "docs/x/y/z.txt");
        assert!(base.join_relative("x//z.txt").is_err());
        assert!(base.join_relative("").is_err());
    }

    #[test]
    fn test_filename_rule() {
        assert!(is_valid_filename("photos/2024/beach (1).jpg"));
        assert!(!is_valid_filename("photos/"));
        assert!(!is_valid_filename("/photos/a.jpg"));
        assert!(!is_valid_filename("a/../b.jpg"));
        assert!(!is_valid_filename("r\u{e9}sum\u{e9}.pdf"));
    }

    #[test]
    fn test_serializes_as_string() {
        let p = VirtualPath::parse("docs/a.txt").unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"docs/a.txt\"");
    }
}
