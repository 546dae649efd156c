//! Per-page token-persistence engine (spec §4 C7).
//!
//! Tracks, for one page, the live set of token identities across a stream
//! of diffs: reverts substitute a whole token list from a remembered earlier
//! revision rather than replaying ops; every other revision derives the new
//! list by walking its diff ops against the previous list, allocating fresh
//! [`Token`]s for inserted/replaced spans. A token's visibility and
//! persistence credit accumulate revision by revision until its admitting
//! window entry is evicted (or the page ends), at which point a
//! [`PersistenceStat`] is emitted for it.

mod revert;
mod window_stats;

pub use revert::RevertDetector;

use mw_model::{DiffDoc, OperationKind, PersistenceStat, Timestamp, Token, TokenId, Window};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("revision {0} has no diff ops (unresolved timeout or missing mend)")]
    MissingOps(u64),
}

pub(crate) struct TokenArena {
    tokens: Vec<Token>,
}

impl TokenArena {
    fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    fn alloc(&mut self, value: impl Into<String>) -> TokenId {
        let id = self.tokens.len() as TokenId;
        self.tokens.push(Token::new(id, value));
        id
    }

    pub(crate) fn get(&self, id: TokenId) -> &Token {
        &self.tokens[id as usize]
    }

    fn get_mut(&mut self, id: TokenId) -> &mut Token {
        &mut self.tokens[id as usize]
    }
}

pub(crate) type WindowEntry = (DiffDoc, Vec<TokenId>);

/// Drives one page's worth of [`DiffDoc`]s through the persistence algorithm.
///
/// `window_size` bounds how many revisions a token must survive before its
/// stat is emitted; `revert_radius` bounds how far back the revert detector
/// (and the side cache backing it) looks for a matching `sha1`.
pub struct PageEngine {
    arena: TokenArena,
    last_tokens: Vec<TokenId>,
    window: Window<WindowEntry>,
    revert: RevertDetector,
    remembered: HashMap<u64, Vec<TokenId>>,
    remembered_order: VecDeque<u64>,
    remembered_cap: usize,
}

impl PageEngine {
    pub fn new(window_size: usize, revert_radius: usize) -> Self {
        tracing::trace!(target: "engine.page", window_size, revert_radius, "page_open");
        Self {
            arena: TokenArena::new(),
            last_tokens: Vec::new(),
            window: Window::new(window_size),
            revert: RevertDetector::new(revert_radius),
            remembered: HashMap::new(),
            remembered_order: VecDeque::new(),
            // The side cache must outlive the window itself: a revert can
            // point at a revision the window has already evicted, as long
            // as it's still within the detector's own radius.
            remembered_cap: window_size.max(revert_radius.max(1)),
        }
    }

    /// Process one revision's diff, returning any [`PersistenceStat`]s its
    /// admission evicted from the window.
    pub fn process(&mut self, doc: DiffDoc) -> Result<Vec<PersistenceStat>, EngineError> {
        let revision_id = doc.revision.id;
        let timestamp = doc.revision.timestamp;
        let contributor = doc.revision.contributor.clone();

        let (tokens, tokens_added, tokens_removed) =
            match self.revert.observe(&doc.revision.sha1, revision_id) {
                Some(target_id) => {
                    tracing::trace!(target: "engine.page", revision = revision_id, reverted_to = target_id, "revert_detected");
                    self.tokens_from_revert(target_id)
                }
                None => self.tokens_from_ops(&doc)?,
            };

        self.remember(revision_id, tokens.clone());

        for &id in &tokens_added {
            self.arena.get_mut(id).visible_at(timestamp);
        }
        for &id in &tokens_removed {
            self.arena.get_mut(id).invisible_at(timestamp);
        }
        for &id in &tokens {
            self.arena.get_mut(id).revisions.push(contributor.clone());
        }

        self.last_tokens = tokens;

        let mut emitted = Vec::new();
        if let Some((old_doc, old_added)) = self.window.push((doc, tokens_added)) {
            emitted.extend(window_stats::emit(&self.arena, &self.window, &old_doc, &old_added, None));
        }
        Ok(emitted)
    }

    /// Drain the remaining window at page end, emitting a stat for every
    /// token still inside it against a single shared `sunset` timestamp.
    pub fn drain(self, sunset: Timestamp) -> Vec<PersistenceStat> {
        let entries = self.window.into_vec();
        tracing::trace!(target: "engine.page", remaining = entries.len(), "page_close");
        window_stats::emit_all(&self.arena, &entries, sunset)
    }

    fn tokens_from_revert(&self, target_id: u64) -> (Vec<TokenId>, Vec<TokenId>, Vec<TokenId>) {
        let reverted_to = self.remembered.get(&target_id).cloned().unwrap_or_default();
        let last_set: HashSet<TokenId> = self.last_tokens.iter().copied().collect();
        let reverted_set: HashSet<TokenId> = reverted_to.iter().copied().collect();
        let tokens_added = reverted_to.iter().copied().filter(|id| !last_set.contains(id)).collect();
        let tokens_removed =
            self.last_tokens.iter().copied().filter(|id| !reverted_set.contains(id)).collect();
        (reverted_to, tokens_added, tokens_removed)
    }

    fn tokens_from_ops(
        &mut self,
        doc: &DiffDoc,
    ) -> Result<(Vec<TokenId>, Vec<TokenId>, Vec<TokenId>), EngineError> {
        let ops = doc.diff.ops.as_ref().ok_or(EngineError::MissingOps(doc.revision.id))?;
        let mut tokens = Vec::new();
        let mut tokens_added = Vec::new();
        let mut tokens_removed = Vec::new();
        for op in ops {
            match op.kind {
                OperationKind::Equal => {
                    tokens.extend_from_slice(&self.last_tokens[op.a1..op.a2]);
                }
                OperationKind::Insert => {
                    for value in &op.tokens {
                        let id = self.arena.alloc(value.clone());
                        tokens.push(id);
                        tokens_added.push(id);
                    }
                }
                OperationKind::Replace => {
                    tokens_removed.extend_from_slice(&self.last_tokens[op.a1..op.a2]);
                    for value in &op.tokens {
                        let id = self.arena.alloc(value.clone());
                        tokens.push(id);
                        tokens_added.push(id);
                    }
                }
                OperationKind::Delete => {
                    tokens_removed.extend_from_slice(&self.last_tokens[op.a1..op.a2]);
                }
            }
        }
        Ok((tokens, tokens_added, tokens_removed))
    }

    fn remember(&mut self, revision_id: u64, tokens: Vec<TokenId>) {
        self.remembered.insert(revision_id, tokens);
        self.remembered_order.push_back(revision_id);
        if self.remembered_order.len() > self.remembered_cap {
            if let Some(stale) = self.remembered_order.pop_front() {
                self.remembered.remove(&stale);
            }
        }
    }
}
