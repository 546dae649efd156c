//! Token-level edit script between two token lists.
//!
//! Built on `imara-diff`'s histogram algorithm, the same engine `wikiwho_rs`
//! documents using for this exact problem. `imara-diff` only reports the
//! changed ranges (hunks); this module fills the equal gaps between and
//! around hunks so the result is a complete, contiguous operation list
//! covering every index of both token lists, in the tagged four-kind form
//! the record model expects.
use imara_diff::{Algorithm, Diff, InternedInput};
use mw_model::Operation;

/// Compute the edit script turning `a` into `b`. Deterministic for a fixed
/// `(a, b)` pair.
pub fn diff_ops(a: &[String], b: &[String]) -> Vec<Operation> {
    if a.is_empty() && b.is_empty() {
        return Vec::new();
    }
    let input = InternedInput::new(a.iter().map(String::as_str), b.iter().map(String::as_str));
    let diff = Diff::compute(Algorithm::Histogram, &input);

    let mut ops = Vec::new();
    let mut prev_a_end = 0usize;
    let mut prev_b_end = 0usize;
    for hunk in diff.hunks() {
        let a1 = hunk.before.start as usize;
        let a2 = hunk.before.end as usize;
        let b1 = hunk.after.start as usize;
        let b2 = hunk.after.end as usize;

        if a1 > prev_a_end {
            ops.push(Operation::equal(prev_a_end, a1, prev_b_end, b1));
        }

        match (a1 != a2, b1 != b2) {
            (false, true) => ops.push(Operation::insert(b1, b2, b[b1..b2].to_vec())),
            (true, false) => ops.push(Operation::delete(a1, a2, a[a1..a2].to_vec())),
            (true, true) => ops.push(Operation::replace(a1, a2, b1, b2, b[b1..b2].to_vec())),
            (false, false) => {}
        }

        prev_a_end = a2;
        prev_b_end = b2;
    }
    if prev_a_end < a.len() || prev_b_end < b.len() {
        ops.push(Operation::equal(prev_a_end, a.len(), prev_b_end, b.len()));
    }
    ops
}

/// Apply `ops` to `a`, returning the resulting token list. Used by tests to
/// verify the diff chain consistency property (spec §8).
pub fn apply_ops(a: &[String], ops: &[Operation]) -> Vec<String> {
    use mw_model::OperationKind::*;
    let mut out = Vec::new();
    for op in ops {
        match op.kind {
            Equal => out.extend_from_slice(&a[op.a1..op.a2]),
            Insert | Replace => out.extend(op.tokens.iter().cloned()),
            Delete => {}
        }
    }
    out
}
