//! Record model for the mwstream pipeline.
//!
//! Defines the value shapes shared by every stage: [`Revision`]/[`PageRef`]
//! (the MediaWiki-dump-shaped input), [`Operation`]/[`DiffMeta`]/[`DiffDoc`]
//! (the token-level edit script between consecutive revisions), [`Token`]
//! (an identity-bearing piece of text introduced by exactly one revision),
//! [`PersistenceStat`] (the per-token record emitted when its observation
//! window closes), and the generic [`Window`] FIFO used to bound that
//! observation.
//!
//! Token identity is per-insertion, not per-string: two tokens holding the
//! same text but introduced by different revisions are distinct values with
//! distinct [`TokenId`]s. This is what makes set-difference over tokens
//! (used by revert handling) correct — see `mw-engine`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Timestamp = DateTime<Utc>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unknown diff operation kind `{0}`")]
    UnknownOperationKind(String),
    #[error("non-UTF-8 bytes in field `{0}`")]
    InvalidUtf8(&'static str),
}

/// Either `{id, user_text}` for a registered editor, or absent for an
/// anonymous/deleted contributor (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub user_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRef {
    pub id: u64,
    pub title: String,
    pub namespace: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_title: Option<String>,
    #[serde(default)]
    pub restrictions: Vec<String>,
}

/// One saved version of a page. Immutable once constructed.
///
/// Invariant (enforced by callers, not this type): within a page group,
/// revisions are sorted by `(timestamp ASC, id ASC)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    pub timestamp: Timestamp,
    pub sha1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor: Option<Contributor>,
    #[serde(default)]
    pub minor: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub page: PageRef,
}

impl Revision {
    /// `text` treated as empty when absent, per the diff stage's contract.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Equal,
    Insert,
    Delete,
    Replace,
}

/// A tagged edit-script entry between the previous token list `a` and the
/// current token list `b`. `a1 <= a2`, `b1 <= b2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub a1: usize,
    pub a2: usize,
    pub b1: usize,
    pub b2: usize,
    /// `b[b1:b2]` for insert/replace, `a[a1:a2]` for delete, empty for equal.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,
}

impl Operation {
    pub fn equal(a1: usize, a2: usize, b1: usize, b2: usize) -> Self {
        Self { kind: OperationKind::Equal, a1, a2, b1, b2, tokens: Vec::new() }
    }

    pub fn insert(b1: usize, b2: usize, tokens: Vec<String>) -> Self {
        Self { kind: OperationKind::Insert, a1: b1, a2: b1, b1, b2, tokens }
    }

    pub fn delete(a1: usize, a2: usize, tokens: Vec<String>) -> Self {
        Self { kind: OperationKind::Delete, a1, a2, b1: a1, b2: a1, tokens }
    }

    pub fn replace(a1: usize, a2: usize, b1: usize, b2: usize, tokens: Vec<String>) -> Self {
        Self { kind: OperationKind::Replace, a1, a2, b1, b2, tokens }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffMeta {
    /// Id of the revision this diff was computed against, absent for the
    /// first revision of a page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_id: Option<u64>,
    /// `None` signals a timed-out diff whose state must be repaired by a
    /// mender (`mw-stages::mend_stage`).
    #[serde(default)]
    pub ops: Option<Vec<Operation>>,
    /// Wall-clock seconds spent in the diff call alone.
    pub time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffDoc {
    #[serde(flatten)]
    pub revision: Revision,
    pub diff: DiffMeta,
}

impl DiffDoc {
    pub fn new(revision: Revision, diff: DiffMeta) -> Self {
        Self { revision, diff }
    }
}

pub type TokenId = u64;

/// An identity-bearing piece of textual content introduced by one revision.
///
/// Two `Token`s holding the same `value` are still distinct if they carry
/// different `id`s — identity, not string equality, is what set-difference
/// over tokens must use (revert handling in `mw-engine` relies on this).
#[derive(Debug, Clone)]
pub struct Token {
    pub id: TokenId,
    pub value: String,
    /// One entry per revision that did not remove this token while it was
    /// in view. `revisions[0]` is the introducing (authoring) revision.
    pub revisions: Vec<Option<Contributor>>,
    /// Cumulative visible duration in seconds.
    pub visible: i64,
    pub visible_since: Option<Timestamp>,
}

impl Token {
    pub fn new(id: TokenId, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
            revisions: Vec::new(),
            visible: 0,
            visible_since: None,
        }
    }

    pub fn author(&self) -> Option<&Contributor> {
        self.revisions.first().and_then(|c| c.as_ref())
    }

    /// `persisted = |revisions| - 1`, excluding the introducing revision.
    pub fn persisted(&self) -> i64 {
        self.revisions.len() as i64 - 1
    }

    pub fn non_self_persisted(&self, author: Option<&Contributor>) -> i64 {
        self.revisions
            .iter()
            .filter(|c| c.as_ref() != author)
            .count() as i64
    }

    /// First-seen-only: a no-op if already visible.
    pub fn visible_at(&mut self, at: Timestamp) {
        if self.visible_since.is_none() {
            self.visible_since = Some(at);
        }
    }

    /// If currently visible, accrue the elapsed duration and clear the
    /// anchor. If already invisible, this is a silent no-op — matches diff
    /// engines that deduplicate identical inserts (spec §9 Open Question c).
    pub fn invisible_at(&mut self, at: Timestamp) {
        if let Some(since) = self.visible_since.take() {
            self.visible += (at - since).num_seconds().max(0);
        }
    }

    /// Total visible seconds as of `sunset`, including any still-open span.
    pub fn seconds_visible(&self, sunset: Timestamp) -> i64 {
        let open = self
            .visible_since
            .map(|since| (sunset - since).num_seconds().max(0))
            .unwrap_or(0);
        self.visible + open
    }
}

/// Minimal identity of the revision a `PersistenceStat` was emitted for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRef {
    pub id: u64,
    pub page_id: u64,
    pub page_title: String,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor: Option<Contributor>,
}

/// Per added-token record emitted at window eviction (spec §3/§4.C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceStat {
    pub token: String,
    pub persisted: i64,
    pub processed: i64,
    pub non_self_persisted: i64,
    pub non_self_processed: i64,
    pub seconds_visible: i64,
    pub seconds_possible: i64,
    pub revision: RevisionRef,
}

/// Bounded FIFO of up to `capacity` entries. Pushing past capacity evicts
/// and returns the oldest entry before admitting the new one, matching the
/// window-admission algorithm of spec §4.C7 step 6.
#[derive(Debug)]
pub struct Window<T> {
    capacity: usize,
    entries: std::collections::VecDeque<T>,
}

impl<T> Window<T> {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: std::collections::VecDeque::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Push `item`, evicting and returning the oldest entry first if the
    /// window was already at capacity.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() { self.entries.pop_front() } else { None };
        self.entries.push_back(item);
        evicted
    }

    /// Remove and return the oldest entry, if any (used to drain at page end).
    pub fn pop_oldest(&mut self) -> Option<T> {
        self.entries.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn front(&self) -> Option<&T> {
        self.entries.front()
    }

    /// Consume into a `Vec`, oldest entry first.
    pub fn into_vec(self) -> Vec<T> {
        self.entries.into_iter().collect()
    }
}
