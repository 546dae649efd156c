//! Diff stage (spec §4.C5): revisions grouped by page, diffed against a
//! fresh per-page processor, optionally under a per-revision wall-clock
//! budget.

use crate::StageError;
use mw_model::{DiffDoc, DiffMeta, Operation, Revision};
use mw_stream::group_by_page;
use mw_text::{diff_algorithm, tokenize, Processor};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DiffStageConfig {
    /// `None` runs the diff call unguarded.
    pub timeout: Option<Duration>,
    /// Discard `revision.text` after diffing.
    pub drop_text: bool,
    /// Restrict to these namespaces; `None` means all.
    pub namespaces: Option<Vec<i32>>,
}

impl Default for DiffStageConfig {
    fn default() -> Self {
        Self { timeout: None, drop_text: false, namespaces: None }
    }
}

/// Filter by namespace *before* grouping, so filtering never splits a page
/// group and desyncs its processor anchor.
pub fn diff_stage<I>(revisions: I, config: DiffStageConfig) -> impl Iterator<Item = Result<DiffDoc, StageError>>
where
    I: Iterator<Item = Revision>,
{
    let DiffStageConfig { timeout, drop_text, namespaces } = config;
    let filtered = revisions
        .filter(move |r| namespaces.as_ref().map(|ns| ns.contains(&r.page.namespace)).unwrap_or(true));
    group_by_page(filtered).flat_map(move |group| diff_page(group, timeout, drop_text))
}

fn diff_page(group: Vec<Revision>, timeout: Option<Duration>, drop_text: bool) -> Vec<Result<DiffDoc, StageError>> {
    let page_id = group.first().map(|r| r.page.id).unwrap_or_default();
    tracing::trace!(target: "stages.diff", page_id, revisions = group.len(), "page_open");
    let mut processor = Processor::new();
    let mut prev_id: Option<u64> = None;
    let mut out = Vec::with_capacity(group.len());
    for mut revision in group {
        let text = revision.text_or_empty().to_string();
        let start = Instant::now();
        let (ops, elapsed) = run_guarded(&mut processor, &text, timeout, start);
        if ops.is_none() {
            tracing::trace!(target: "stages.diff", page_id, revision = revision.id, timeout_secs = ?timeout, "timeout_hit");
        }
        let diff = DiffMeta { last_id: prev_id, ops, time: elapsed };
        prev_id = Some(revision.id);
        if drop_text {
            revision.text = None;
        }
        out.push(Ok(DiffDoc::new(revision, diff)));
    }
    tracing::trace!(target: "stages.diff", page_id, "page_close");
    out
}

/// Run one diff call, advancing `processor`'s anchor to `tokenize(text)`
/// regardless of outcome. With a timeout configured, the diff itself runs
/// on a helper thread so the budget measures only the diff call, never the
/// surrounding I/O; on expiry the helper's result is simply discarded.
pub(crate) fn run_guarded(
    processor: &mut Processor,
    text: &str,
    timeout: Option<Duration>,
    start: Instant,
) -> (Option<Vec<Operation>>, f64) {
    match timeout {
        None => {
            let (ops, ..) = processor.process(text);
            (Some(ops), start.elapsed().as_secs_f64())
        }
        Some(budget) => {
            let anchor = processor.anchor().to_vec();
            let owned_text = text.to_string();
            let (tx, rx) = crossbeam_channel::bounded(1);
            std::thread::spawn(move || {
                let ops = diff_algorithm::diff_ops(&anchor, &tokenize(&owned_text));
                let _ = tx.send(ops);
            });
            let ops = rx.recv_timeout(budget).ok();
            processor.update(text);
            (ops, start.elapsed().as_secs_f64())
        }
    }
}
