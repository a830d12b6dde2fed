//! Identifiers for the two sides of a dependency edge.
//!
//! A *computation* (effect, computed, watcher) subscribes to *fields*. A field
//! is addressed by the subject that owns it (a signal, an observed object or
//! array) plus a key within that subject. Neither side holds a reference to
//! the other; the runtime's tables are keyed by these ids so that teardown is
//! "remove this id everywhere".

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a computation.
///
/// Each computation gets a unique ID when created. This ID is used to track
/// dependencies and to deduplicate pending runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComputationId(u64);

impl ComputationId {
    /// Generate a new unique computation ID.
    ///
    /// Uses an atomic counter so ids stay unique even though every thread
    /// runs its own runtime.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ComputationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique identifier for something whose fields can be read: a signal, a
/// memo, a raw object or a raw array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubjectId(u64);

impl SubjectId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// The part of a subject a computation read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    /// The whole value of a single-cell subject (signal or memo).
    Value,
    /// A named field of an object.
    Named(Rc<str>),
    /// An element of an array.
    Index(usize),
    /// The length of an array.
    Length,
    /// The key set of an object.
    Keys,
}

impl From<&str> for FieldKey {
    fn from(key: &str) -> Self {
        Self::Named(Rc::from(key))
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => f.write_str("value"),
            Self::Named(name) => f.write_str(name),
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Length => f.write_str("length"),
            Self::Keys => f.write_str("keys"),
        }
    }
}

/// A `(subject, field)` pair: the source end of a dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub subject: SubjectId,
    pub field: FieldKey,
}

impl EdgeKey {
    pub fn new(subject: SubjectId, field: impl Into<FieldKey>) -> Self {
        Self {
            subject,
            field: field.into(),
        }
    }

    /// Key for the single value of a signal or memo.
    pub fn value(subject: SubjectId) -> Self {
        Self {
            subject,
            field: FieldKey::Value,
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.subject, self.field)
    }
}
