//! Mend stage (spec §4.C6): repair a DiffDoc stream that may contain seams
//! where a worker started diffing from an empty anchor mid-page.

use crate::diff_stage::run_guarded;
use crate::StageError;
use mw_model::{DiffDoc, DiffMeta};
use mw_stream::group_by_page;
use mw_text::Processor;
use std::time::{Duration, Instant};

pub fn mend_stage<I>(docs: I, timeout: Option<Duration>) -> impl Iterator<Item = Result<DiffDoc, StageError>>
where
    I: Iterator<Item = DiffDoc>,
{
    group_by_page(docs).flat_map(move |group| match mend_page(group, timeout) {
        Ok(mended) => mended.into_iter().map(Ok).collect::<Vec<_>>(),
        Err(e) => vec![Err(e)],
    })
}

fn mend_page(group: Vec<DiffDoc>, timeout: Option<Duration>) -> Result<Vec<DiffDoc>, StageError> {
    for doc in &group {
        if doc.revision.text.is_none() {
            return Err(StageError::MendPrecondition(doc.revision.id, "text"));
        }
    }

    let page_id = group.first().map(|d| d.revision.page.id).unwrap_or_default();
    tracing::trace!(target: "stages.mend", page_id, revisions = group.len(), "page_open");

    let mut iter = group.into_iter();
    let first = iter.next().expect("page groups are non-empty");
    let mut processor = Processor::new();
    processor.update(first.revision.text_or_empty());
    let mut prev_id = first.revision.id;
    let mut out = vec![first];

    for doc in iter {
        let text = doc.revision.text_or_empty().to_string();
        if doc.diff.last_id == Some(prev_id) {
            processor.update(&text);
            prev_id = doc.revision.id;
            out.push(doc);
            continue;
        }
        let revision_id = doc.revision.id;
        tracing::trace!(target: "stages.mend", page_id, revision = revision_id, expected_last_id = prev_id, "seam_detected");
        let start = Instant::now();
        let (ops, elapsed) = run_guarded(&mut processor, &text, timeout, start);
        if ops.is_none() {
            tracing::trace!(target: "stages.mend", page_id, revision = revision_id, timeout_secs = ?timeout, "timeout_hit");
        }
        out.push(DiffDoc::new(doc.revision, DiffMeta { last_id: Some(prev_id), ops, time: elapsed }));
        prev_id = revision_id;
    }
    tracing::trace!(target: "stages.mend", page_id, "page_close");
    Ok(out)
}
