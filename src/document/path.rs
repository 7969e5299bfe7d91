//! Data Path Expressions
//!
//! Parses and represents path expressions used to select and place values
//! within an execution document.
//!
//! # Syntax
//!
//! - `$` - the whole document
//! - `$.order` - key access on an object
//! - `$.order[0].sku` - index access on a list, chained with keys
//! - `$$.item` / `$$.index` - the reserved iteration-context namespace
//!   (current Map item and its position)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PathError;

/// One step of a path: an object key or a list index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object key access (`.name`)
    Key(String),
    /// List index access (`[3]`)
    Index(usize),
}

/// The namespace a path starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRoot {
    /// `$` - the execution document
    Document,
    /// `$$` - the per-iteration context (Map item, index)
    Context,
}

/// A parsed path expression addressing a location in a document.
///
/// # Example
///
/// ```
/// use flowrunner::document::DataPath;
///
/// let path: DataPath = "$.order[0].sku".parse().unwrap();
/// assert_eq!(path.to_string(), "$.order[0].sku");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataPath {
    root: PathRoot,
    segments: Vec<Segment>,
}

impl DataPath {
    /// The whole-document path `$`.
    pub fn document_root() -> Self {
        Self {
            root: PathRoot::Document,
            segments: Vec::new(),
        }
    }

    /// A single-key document path such as `$.item`.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self {
            root: PathRoot::Document,
            segments: vec![Segment::Key(key.into())],
        }
    }

    /// Parses a path expression.
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        let expr = expr.trim();

        let (root, rest) = if let Some(rest) = expr.strip_prefix("$$") {
            (PathRoot::Context, rest)
        } else if let Some(rest) = expr.strip_prefix('$') {
            (PathRoot::Document, rest)
        } else {
            return Err(PathError::Malformed(expr.to_string()));
        };

        let mut segments = Vec::new();
        let mut chars = rest.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    let mut key = String::new();
                    while let Some(&next) = chars.peek() {
                        if next == '.' || next == '[' {
                            break;
                        }
                        key.push(next);
                        chars.next();
                    }
                    if key.is_empty() {
                        return Err(PathError::Malformed(expr.to_string()));
                    }
                    segments.push(Segment::Key(key));
                }
                '[' => {
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => digits.push(d),
                            _ => return Err(PathError::Malformed(expr.to_string())),
                        }
                    }
                    let index = digits
                        .parse()
                        .map_err(|_| PathError::Malformed(expr.to_string()))?;
                    segments.push(Segment::Index(index));
                }
                _ => return Err(PathError::Malformed(expr.to_string())),
            }
        }

        Ok(Self { root, segments })
    }

    /// Returns the namespace this path starts from.
    pub fn root(&self) -> PathRoot {
        self.root
    }

    /// Returns the parsed segments in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns true if this is the bare `$` (or `$$`) root.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            PathRoot::Document => write!(f, "$")?,
            PathRoot::Context => write!(f, "$$")?,
        }
        for segment in &self.segments {
            match segment {
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

impl FromStr for DataPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DataPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DataPath> for String {
    fn from(path: DataPath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_root() {
        let path = DataPath::parse("$").unwrap();
        assert_eq!(path.root(), PathRoot::Document);
        assert!(path.is_root());
    }

    #[test]
    fn test_parse_keys() {
        let path = DataPath::parse("$.order.total").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("order".to_string()),
                Segment::Key("total".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_index() {
        let path = DataPath::parse("$.order[2].sku").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("order".to_string()),
                Segment::Index(2),
                Segment::Key("sku".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_context_namespace() {
        let path = DataPath::parse("$$.item").unwrap();
        assert_eq!(path.root(), PathRoot::Context);
        assert_eq!(path.segments(), &[Segment::Key("item".to_string())]);
    }

    #[test]
    fn test_parse_rejects_missing_root() {
        assert!(DataPath::parse("order.total").is_err());
        assert!(DataPath::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_key() {
        assert!(DataPath::parse("$..a").is_err());
        assert!(DataPath::parse("$.").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_index() {
        assert!(DataPath::parse("$.a[x]").is_err());
        assert!(DataPath::parse("$.a[").is_err());
        assert!(DataPath::parse("$.a[]").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for expr in ["$", "$$", "$.a", "$.a.b[0].c", "$$.index"] {
            let path = DataPath::parse(expr).unwrap();
            assert_eq!(path.to_string(), expr);
        }
    }

    #[test]
    fn test_serde_as_string() {
        let path: DataPath = serde_json::from_str("\"$.order[1]\"").unwrap();
        assert_eq!(path.to_string(), "$.order[1]");

        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"$.order[1]\"");
    }

    #[test]
    fn test_serde_rejects_malformed() {
        let result: Result<DataPath, _> = serde_json::from_str("\"order\"");
        assert!(result.is_err());
    }
}
