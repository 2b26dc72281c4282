//! JSON Pointer paths for navigating the state tree.
//!
//! Paths are sequences of segments parsed from RFC 6901 pointers such as
//! `/ask_history/questions/0/citations`. Whether a segment addresses an object
//! key or an array element is only known once the container is visited, so a
//! numeric token is kept as [`Seg::Index`] and resolved against objects as the
//! equivalent string key.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::StateError;

/// One reference token of a pointer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Seg {
    Key(String),
    /// All-digit token without a leading zero. Against an object it reads as
    /// the same key.
    Index(usize),
    /// `-`, one past the last array element.
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArrayPos {
    At(usize),
    End,
}

impl Seg {
    pub fn object_key(&self) -> Cow<'_, str> {
        match self {
            Seg::Key(k) => Cow::Borrowed(k.as_str()),
            Seg::Index(i) => Cow::Owned(i.to_string()),
            Seg::End => Cow::Borrowed("-"),
        }
    }

    pub(crate) fn array_pos(&self) -> Option<ArrayPos> {
        match self {
            Seg::Index(i) => Some(ArrayPos::At(*i)),
            Seg::End => Some(ArrayPos::End),
            Seg::Key(k) => parse_index(k).map(ArrayPos::At),
        }
    }

    fn from_token(token: &str) -> Self {
        if token == "-" {
            return Seg::End;
        }
        parse_index(token).map_or_else(|| Seg::Key(token.to_owned()), Seg::Index)
    }
}

fn parse_index(token: &str) -> Option<usize> {
    let digits = !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit());
    let leading_zero = token.len() > 1 && token.starts_with('0');
    if digits && !leading_zero {
        token.parse().ok()
    } else {
        None
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => write!(f, "/{}", k.replace('~', "~0").replace('/', "~1")),
            Seg::Index(i) => write!(f, "/{i}"),
            Seg::End => f.write_str("/-"),
        }
    }
}

impl From<&str> for Seg {
    fn from(token: &str) -> Self {
        match token {
            "-" => Seg::End,
            key => Seg::Key(key.to_owned()),
        }
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// A parsed pointer. The empty path is the document root.
///
/// ```
/// use threadline_state::{Path, Seg};
///
/// let path: Path = "/ask_history/questions/-".parse().unwrap();
/// assert_eq!(path.len(), 3);
/// assert_eq!(path[2], Seg::End);
/// assert_eq!(path.to_string(), "/ask_history/questions/-");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(Vec<Seg>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Seg>) -> Self {
        Self(segments)
    }

    pub fn parse(pointer: &str) -> Result<Self, StateError> {
        if pointer.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = pointer.strip_prefix('/') else {
            return Err(StateError::invalid_pointer(pointer, "must start with '/'"));
        };
        rest.split('/')
            .map(|raw| unescape(raw).map(|token| Seg::from_token(&token)))
            .collect::<Option<Vec<_>>>()
            .map(Self)
            .ok_or_else(|| StateError::invalid_pointer(pointer, "invalid '~' escape"))
    }

    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn split_last(&self) -> Option<(&Seg, &[Seg])> {
        self.0.split_last()
    }

    /// True when `other` lies strictly below this path.
    pub fn is_proper_prefix_of(&self, other: &Path) -> bool {
        self.len() < other.len() && other.0.starts_with(&self.0)
    }
}

fn unescape(raw: &str) -> Option<String> {
    if !raw.contains('~') {
        return Some(raw.to_owned());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return None,
        }
    }
    Some(out)
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.0 {
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pointer = String::deserialize(deserializer)?;
        Path::parse(&pointer).map_err(serde::de::Error::custom)
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Seg;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// Build a [`Path`] from literal segments. Strings are keys (`"-"` is the
/// append marker), integers are indices.
///
/// ```
/// use threadline_state::path;
///
/// assert_eq!(path!("haiku.rag.chat", "qa_history", 0).to_string(), "/haiku.rag.chat/qa_history/0");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::Seg::from($seg));
        )+
        p
    }};
}
