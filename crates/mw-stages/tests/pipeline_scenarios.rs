//! The concrete multi-stage scenarios from spec §8: a page whose window
//! evicts mid-stream, a revert, a diff timeout, and a mend of a broken seam.

use chrono::{TimeZone, Utc};
use mw_engine::PageEngine;
use mw_model::{PageRef, Revision};
use mw_stages::{diff_stage, mend_stage, DiffStageConfig};
use std::time::Duration;

fn ts(secs: i64) -> mw_model::Timestamp {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn revision(id: u64, secs: i64, text: &str, sha1: &str) -> Revision {
    Revision {
        id,
        parent_id: if id > 1 { Some(id - 1) } else { None },
        timestamp: ts(secs),
        sha1: sha1.into(),
        contributor: Some(mw_model::Contributor { id: Some(id), user_text: format!("user{id}") }),
        minor: false,
        comment: None,
        text: Some(text.to_string()),
        bytes: None,
        model: None,
        format: None,
        page: PageRef { id: 1, title: "Foo".into(), namespace: 0, redirect_title: None, restrictions: Vec::new() },
    }
}

#[test]
fn window_eviction_reports_foos_earliest_tokens() {
    let revisions = vec![revision(1, 0, "a b", "s1"), revision(2, 1, "a b c", "s2"), revision(3, 2, "a b", "s3")];
    let docs: Vec<_> = diff_stage(revisions.into_iter(), DiffStageConfig::default()).map(Result::unwrap).collect();

    let mut engine = PageEngine::new(2, 15);
    let mut emitted = Vec::new();
    for doc in docs {
        emitted.extend(engine.process(doc).unwrap());
    }

    assert_eq!(emitted.len(), 2);
    let mut tokens: Vec<&str> = emitted.iter().map(|s| s.token.as_str()).collect();
    tokens.sort();
    assert_eq!(tokens, vec!["a", "b"]);
    for stat in &emitted {
        assert_eq!(stat.persisted, 2);
        assert_eq!(stat.processed, 2);
    }
}

#[test]
fn revert_reuses_token_identity_and_retires_the_intervening_insertion() {
    let revisions = vec![revision(1, 0, "x", "same-sha"), revision(2, 1, "y", "other-sha"), revision(3, 2, "x", "same-sha")];
    let docs: Vec<_> = diff_stage(revisions.into_iter(), DiffStageConfig::default()).map(Result::unwrap).collect();

    let mut engine = PageEngine::new(50, 15);
    for doc in docs {
        engine.process(doc).unwrap();
    }
    let stats = engine.drain(ts(10));

    let x = stats.iter().find(|s| s.token == "x").expect("x reported");
    assert_eq!(x.persisted, 1); // credited at r1 and r3, skipped at r2
    let y = stats.iter().find(|s| s.token == "y").expect("y reported");
    assert!(y.seconds_visible < 2); // visible only for the one second before r3 reverted it
}

#[test]
fn a_diff_that_overruns_its_budget_yields_no_ops_but_still_resyncs() {
    // Large enough that histogram diffing it takes meaningfully longer than
    // the budget below, while "seed" (r1, r3) diffs in well under it.
    let big_text = "word ".repeat(2_000_000);
    let revisions = vec![revision(1, 0, "seed", "s1"), revision(2, 1, &big_text, "s2"), revision(3, 2, "seed", "s3")];
    let docs: Vec<_> = diff_stage(
        revisions.into_iter(),
        DiffStageConfig { timeout: Some(Duration::from_millis(20)), ..Default::default() },
    )
    .map(Result::unwrap)
    .collect();

    assert!(docs[1].diff.ops.is_none(), "an essentially-zero budget should time out");
    // Regardless of r2's timeout, r3 must still diff correctly against r2's
    // text, since the processor's anchor was resynced via `update`.
    assert!(docs[2].diff.ops.is_some());
}

#[test]
fn mending_a_seam_recomputes_ops_against_the_true_prior_text() {
    // Worker A sees only r1; worker B (re)diffs r2, r3 starting from empty.
    let worker_a: Vec<_> = diff_stage(vec![revision(1, 0, "a b", "s1")].into_iter(), DiffStageConfig::default())
        .map(Result::unwrap)
        .collect();
    let worker_b: Vec<_> = diff_stage(
        vec![revision(2, 1, "a b c", "s2"), revision(3, 2, "a b c d", "s3")].into_iter(),
        DiffStageConfig::default(),
    )
    .map(Result::unwrap)
    .collect();

    let mut broken = worker_a;
    broken.extend(worker_b);
    assert_eq!(broken[1].diff.last_id, None); // the seam: worker B never saw r1

    let mended: Vec<_> = mend_stage(broken.into_iter(), None).map(Result::unwrap).collect();
    assert_eq!(mended[1].diff.last_id, Some(1));
    let ops = mended[1].diff.ops.as_ref().unwrap();
    assert!(ops.iter().any(|o| matches!(o.kind, mw_model::OperationKind::Insert) && o.tokens == vec!["c"]));
}
