//! Stat generation for evicted window entries (spec §4.C7 step 6/7).

use crate::{TokenArena, WindowEntry};
use mw_model::{PersistenceStat, RevisionRef, TokenId, Timestamp, Window};

/// Emit stats for `old_added`, the tokens introduced by the just-evicted
/// `old_doc`. `window` is the window *after* the eviction that displaced
/// `old_doc` (it already holds the newly admitted entry), so its length is
/// `revisions_processed` and its newest timestamp is the fallback sunset
/// when none is configured.
pub(crate) fn emit(
    arena: &TokenArena,
    window: &Window<WindowEntry>,
    old_doc: &mw_model::DiffDoc,
    old_added: &[TokenId],
    sunset: Option<Timestamp>,
) -> Vec<PersistenceStat> {
    let fallback = window
        .iter()
        .last()
        .map(|(doc, _)| doc.revision.timestamp)
        .unwrap_or(old_doc.revision.timestamp);
    let effective_sunset = sunset.unwrap_or(fallback);
    let processed = window.len() as i64;
    let non_self_processed = window
        .iter()
        .filter(|(doc, _)| doc.revision.contributor != old_doc.revision.contributor)
        .count() as i64;
    build_stats(arena, old_doc, old_added, effective_sunset, processed, non_self_processed)
}

/// Emit stats for every entry still in the window at page end, scored
/// against the full remaining set (not shrinking as each entry is reported)
/// and a single shared `sunset`.
pub(crate) fn emit_all(arena: &TokenArena, entries: &[WindowEntry], sunset: Timestamp) -> Vec<PersistenceStat> {
    let processed = entries.len() as i64;
    let mut out = Vec::new();
    for (doc, added) in entries {
        let non_self_processed =
            entries.iter().filter(|(d, _)| d.revision.contributor != doc.revision.contributor).count() as i64;
        out.extend(build_stats(arena, doc, added, sunset, processed, non_self_processed));
    }
    out
}

fn build_stats(
    arena: &TokenArena,
    doc: &mw_model::DiffDoc,
    added: &[TokenId],
    sunset: Timestamp,
    processed: i64,
    non_self_processed: i64,
) -> Vec<PersistenceStat> {
    let seconds_possible = (sunset - doc.revision.timestamp).num_seconds().max(0);
    added
        .iter()
        .map(|&id| {
            let token = arena.get(id);
            PersistenceStat {
                token: token.value.clone(),
                persisted: token.persisted(),
                processed,
                non_self_persisted: token.non_self_persisted(doc.revision.contributor.as_ref()),
                non_self_processed,
                seconds_visible: token.seconds_visible(sunset),
                seconds_possible,
                revision: RevisionRef {
                    id: doc.revision.id,
                    page_id: doc.revision.page.id,
                    page_title: doc.revision.page.title.clone(),
                    timestamp: doc.revision.timestamp,
                    contributor: doc.revision.contributor.clone(),
                },
            }
        })
        .collect()
}
