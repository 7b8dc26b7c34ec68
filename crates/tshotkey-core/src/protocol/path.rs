//! Dotted field paths that locate a value inside a JSON message.
//!
//! A path is written the way it reads in the message:
//!
//! ```text
//! payload.apiKey        → object key "payload", then object key "apiKey"
//! items[].id            → key "items", any array element, then key "id"
//! ```
//!
//! Paths are matched segment by segment while the extractor walks the
//! message, so no part of the message has to be kept around to decide
//! whether a value is interesting.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error returned when a path string cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    /// The path string was empty.
    #[error("field path is empty")]
    Empty,

    /// A dotted component was empty (e.g. `payload..apiKey`).
    #[error("field path '{0}' contains an empty segment")]
    EmptySegment(String),

    /// Brackets other than a trailing `[]` were used.
    #[error("field path '{0}' contains a malformed array marker")]
    MalformedArrayMarker(String),

    /// More paths were requested than one extractor can watch.
    #[error("{count} field paths requested, at most {max} supported")]
    TooManyPaths { count: usize, max: usize },
}

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A member of an object, by key.
    Key(String),
    /// Any element of an array.
    AnyIndex,
}

impl Segment {
    /// Returns the key for [`Segment::Key`], `None` for array markers.
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Segment::Key(k) => Some(k),
            Segment::AnyIndex => None,
        }
    }
}

/// A parsed field path such as `payload.apiKey`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parses a dotted path.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] for empty paths, empty segments, or brackets
    /// that are not a trailing `[]`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tshotkey_core::protocol::path::{FieldPath, Segment};
    ///
    /// let path = FieldPath::parse("payload.apiKey").unwrap();
    /// assert_eq!(path.segments().len(), 2);
    /// assert_eq!(path.segments()[1], Segment::Key("apiKey".to_string()));
    /// ```
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = Vec::new();
        for part in raw.split('.') {
            let mut name = part;
            let mut indices = 0usize;
            while let Some(stripped) = name.strip_suffix("[]") {
                name = stripped;
                indices += 1;
            }
            if name.contains('[') || name.contains(']') {
                return Err(PathError::MalformedArrayMarker(raw.to_string()));
            }
            if name.is_empty() {
                // A bare `[]` is only meaningful as the very first segment
                // (a top-level array); anywhere else it is an empty key.
                if indices == 0 || !segments.is_empty() {
                    return Err(PathError::EmptySegment(raw.to_string()));
                }
            } else {
                segments.push(Segment::Key(name.to_string()));
            }
            segments.extend(std::iter::repeat(Segment::AnyIndex).take(indices));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The path's segments in order from the message root.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The path as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of segments (the depth at which the value sits).
    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
