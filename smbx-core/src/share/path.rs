//! src/share/path.rs
//! ============================================================
//! Validated remote locations of the form `smb://server/share/dir/name`.
//!
//! Depth follows the share browser hierarchy:
//!   0 = network root (`smb://`)
//!   1 = server       (`smb://host/`)
//!   2 = share root   (`smb://host/share/`)
//!   3+ = inside a share
//!
//! A trailing `/` marks the directory form, which is required before a
//! child name can be appended.

use std::fmt;

use compact_str::{CompactString, format_compact};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub const SCHEME: &str = "smb://";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SharePath {
    raw: CompactString,
}

impl SharePath {
    /// Parse and validate a remote path.
    pub fn parse(input: &str) -> CoreResult<Self> {
        if input.is_empty() {
            return Err(CoreError::invalid_path(input, "empty path"));
        }

        let Some(head) = input.get(..SCHEME.len()) else {
            return Err(CoreError::invalid_path(input, "missing smb:// scheme"));
        };

        if !head.eq_ignore_ascii_case(SCHEME) {
            return Err(CoreError::invalid_path(input, "missing smb:// scheme"));
        }

        let rest: &str = &input[SCHEME.len()..];

        if rest.chars().any(|c: char| c == '\\' || c.is_control()) {
            return Err(CoreError::invalid_path(
                input,
                "backslashes and control characters are not allowed",
            ));
        }

        let body: &str = rest.strip_suffix('/').unwrap_or(rest);

        if !body.is_empty() {
            for segment in body.split('/') {
                match segment {
                    "" => return Err(CoreError::invalid_path(input, "empty path segment")),
                    "." | ".." => {
                        return Err(CoreError::invalid_path(input, "relative path segment"));
                    }
                    _ => {}
                }
            }
        } else if rest == "/" {
            return Err(CoreError::invalid_path(input, "empty server name"));
        }

        Ok(Self {
            raw: format_compact!("{SCHEME}{rest}"),
        })
    }

    /// The network root, `smb://`.
    #[must_use]
    pub fn root() -> Self {
        Self {
            raw: CompactString::const_new(SCHEME),
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Path components after the scheme, without separators.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.raw[SCHEME.len()..]
            .split('/')
            .filter(|s: &&str| !s.is_empty())
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.raw.len() == SCHEME.len()
    }

    #[inline]
    #[must_use]
    pub fn is_dir_form(&self) -> bool {
        self.is_root() || self.raw.ends_with('/')
    }

    /// Same location in directory form (trailing `/`).
    #[must_use]
    pub fn to_dir_form(&self) -> Self {
        if self.is_dir_form() {
            self.clone()
        } else {
            Self {
                raw: format_compact!("{}/", self.raw),
            }
        }
    }

    /// Append a raw child name as reported by a directory listing.
    ///
    /// The name may carry one trailing `/` (directories and shares) but no
    /// other separator.
    pub fn join(&self, name: &str) -> CoreResult<Self> {
        let bare: &str = name.strip_suffix('/').unwrap_or(name);

        if bare.is_empty() || bare.contains('/') {
            return Err(CoreError::invalid_path(name, "child name must be a single segment"));
        }

        let dir: Self = self.to_dir_form();

        Self::parse(&format!("{}{name}", dir.raw))
    }

    /// Containing directory in directory form; `None` for the network root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }

        let trimmed: &str = self.raw.strip_suffix('/').unwrap_or(&self.raw);
        let cut: usize = trimmed.rfind('/')?;

        Some(Self {
            raw: CompactString::new(&trimmed[..=cut]),
        })
    }

    /// Last segment without the trailing separator; empty for the root.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.segments().last().unwrap_or("")
    }

    /// Sibling that shares this entry's stem but carries `extension`.
    ///
    /// `smb://h/s/movie.mkv` → `smb://h/s/movie.srt`; names without a dot
    /// keep their full name as stem.
    pub fn sibling_with_extension(&self, extension: &str) -> CoreResult<Self> {
        let name: &str = self.file_name();
        let stem: &str = name.rfind('.').map_or(name, |i: usize| &name[..i]);
        let parent: Self = self
            .parent()
            .ok_or_else(|| CoreError::invalid_path(self.as_str(), "root has no siblings"))?;

        parent.join(&format!("{stem}.{extension}"))
    }
}

impl fmt::Display for SharePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for SharePath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SharePath {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SharePath> for String {
    fn from(value: SharePath) -> Self {
        value.raw.into_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_share_paths() {
        let p = SharePath::parse("smb://nas/media/photos/").unwrap();
        assert_eq!(p.depth(), 3);
        assert!(p.is_dir_form());
        assert_eq!(p.file_name(), "photos");

        let root = SharePath::parse("smb://").unwrap();
        assert!(root.is_root());
        assert_eq!(root.depth(), 0);

        let upper = SharePath::parse("SMB://nas/").unwrap();
        assert_eq!(upper.as_str(), "smb://nas/");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "nas/share",
            "http://nas/share",
            "smb:/nas",
            "smb://nas//share",
            "smb://nas/../etc",
            "smb://nas\\share",
            "smb:///",
        ] {
            let err = SharePath::parse(bad).unwrap_err();
            assert!(matches!(err, CoreError::InvalidPath { .. }), "{bad}");
        }
    }

    #[test]
    fn test_join_and_parent() {
        let dir = SharePath::parse("smb://nas/media").unwrap();
        let child = dir.join("a.jpg").unwrap();
        assert_eq!(child.as_str(), "smb://nas/media/a.jpg");
        assert_eq!(child.parent().unwrap().as_str(), "smb://nas/media/");

        let sub = dir.join("sub/").unwrap();
        assert_eq!(sub.as_str(), "smb://nas/media/sub/");
        assert_eq!(sub.parent().unwrap().as_str(), "smb://nas/media/");

        assert!(dir.join("a/b").is_err());
        assert!(SharePath::root().parent().is_none());
        assert_eq!(
            SharePath::parse("smb://nas/").unwrap().parent().unwrap(),
            SharePath::root()
        );
    }

    #[test]
    fn test_sibling_with_extension() {
        let movie = SharePath::parse("smb://nas/v/movie.part1.mkv").unwrap();
        assert_eq!(
            movie.sibling_with_extension("srt").unwrap().as_str(),
            "smb://nas/v/movie.part1.srt"
        );

        let bare = SharePath::parse("smb://nas/v/README").unwrap();
        assert_eq!(
            bare.sibling_with_extension("srt").unwrap().as_str(),
            "smb://nas/v/README.srt"
        );
    }

    #[test]
    fn test_serde_as_string() {
        let p = SharePath::parse("smb://nas/a/b.txt").unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"smb://nas/a/b.txt\"");
        let back: SharePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        assert!(serde_json::from_str::<SharePath>("\"ftp://x\"").is_err());
    }
}
