//! End-to-end exercise of the stages a user chains together on the command
//! line: diff, mend, persistence, then revision-level aggregation.

use chrono::{TimeZone, Utc};
use mw_engine::PageEngine;
use mw_model::{Contributor, PageRef, PersistenceStat, Revision};
use mw_stages::{diff_stage, mend_stage, revision_stats, DiffStageConfig};

fn ts(secs: i64) -> mw_model::Timestamp {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn revision(id: u64, secs: i64, author: &str, text: &str) -> Revision {
    Revision {
        id,
        parent_id: if id == 1 { None } else { Some(id - 1) },
        timestamp: ts(secs),
        sha1: format!("sha{id}"),
        contributor: Some(Contributor { id: None, user_text: author.into() }),
        minor: false,
        comment: None,
        text: Some(text.to_string()),
        bytes: None,
        model: None,
        format: None,
        page: PageRef { id: 1, title: "Example".into(), namespace: 0, redirect_title: None, restrictions: Vec::new() },
    }
}

#[test]
fn diff_then_persistence_then_stats_roundtrips_a_small_page_history() {
    let revisions = vec![
        revision(1, 0, "alice", "a b"),
        revision(2, 1, "bob", "a b c"),
        revision(3, 2, "carol", "a b c d"),
    ];

    let diffed: Vec<_> = diff_stage(revisions.into_iter(), DiffStageConfig::default())
        .map(Result::unwrap)
        .collect();
    assert_eq!(diffed.len(), 3);
    assert!(diffed[0].diff.last_id.is_none());
    assert_eq!(diffed[2].diff.last_id, Some(2));

    let mut engine = PageEngine::new(10, 15);
    let mut stats: Vec<PersistenceStat> = Vec::new();
    for doc in diffed {
        stats.extend(engine.process(doc).unwrap());
    }
    stats.extend(engine.drain(ts(100)));
    // 4 distinct tokens introduced ("a", "b", "c", "d"), each gets exactly one stat.
    assert_eq!(stats.len(), 4);

    let summaries = revision_stats::aggregate(stats, &revision_stats::StatsConfig::default());
    // every stat's owning revision is one of the three page revisions processed.
    let total_tokens: i64 = summaries.iter().map(|s| s.tokens_added).sum();
    assert_eq!(total_tokens, 4);
}

#[test]
fn mend_stage_repairs_a_seam_left_by_independently_diffed_blocks() {
    // Simulate two dump2diffs workers each diffing half of the same page: the
    // second worker's first revision has no anchor, so its last_id/ops come
    // back empty exactly like a worker that started from scratch mid-page.
    let first_block = vec![revision(1, 0, "alice", "a"), revision(2, 1, "bob", "a b")];
    let second_block = vec![revision(3, 2, "carol", "a b c")];

    let mut diffed: Vec<_> =
        diff_stage(first_block.into_iter(), DiffStageConfig::default()).map(Result::unwrap).collect();
    let mut second_diffed: Vec<_> =
        diff_stage(second_block.into_iter(), DiffStageConfig::default()).map(Result::unwrap).collect();
    // Break the seam: as if `second_diffed[0]` had been diffed against an empty anchor.
    second_diffed[0].diff.last_id = None;
    diffed.append(&mut second_diffed);

    let mended: Vec<_> = mend_stage(diffed.into_iter(), None).map(Result::unwrap).collect();
    assert_eq!(mended[2].diff.last_id, Some(2));
    let ops = mended[2].diff.ops.as_ref().unwrap();
    assert!(ops.iter().any(|o| matches!(o.kind, mw_model::OperationKind::Insert)));
}
