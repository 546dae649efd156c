//! Small, stateless per-record transforms (spec §4.C9).

use crate::StageError;
use mw_model::Revision;
use serde_json::Value;

pub const DEFAULT_MAX_CHARS: usize = 2_097_152;

/// Truncate `doc.text` to `max_chars` characters, setting `truncated`
/// accordingly. Idempotent once `text` is within budget.
pub fn truncate_text(mut doc: Value, max_chars: usize) -> Value {
    let truncated = match doc.get("text").and_then(Value::as_str) {
        Some(text) if text.chars().count() > max_chars => {
            let clipped: String = text.chars().take(max_chars).collect();
            doc["text"] = Value::String(clipped);
            true
        }
        _ => false,
    };
    doc["truncated"] = Value::Bool(truncated);
    doc
}

/// Rewrite the deprecated `page.redirect = {title}` shape to
/// `page.redirect_title`. Idempotent: a doc already in the new shape passes
/// through untouched.
pub fn normalize(mut doc: Value) -> Value {
    if let Some(page) = doc.get_mut("page").and_then(Value::as_object_mut) {
        if let Some(redirect) = page.remove("redirect") {
            let title = redirect.get("title").cloned().unwrap_or(Value::Null);
            page.insert("redirect_title".to_string(), title);
        }
    }
    doc
}

/// Validate a sequence of `(line, doc)` pairs against `schema`, stopping at
/// the first failure (the failure itself is yielded, nothing after it).
pub fn validate_stream<I>(
    docs: I,
    schema: &Value,
) -> Result<impl Iterator<Item = Result<Value, StageError>>, StageError>
where
    I: Iterator<Item = (usize, Value)>,
{
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| StageError::SchemaViolation { line: 0, detail: e.to_string() })?;
    let mut failed = false;
    Ok(docs.scan((), move |_, (line, doc)| {
        if failed {
            return None;
        }
        match validator.validate(&doc) {
            Ok(()) => Some(Ok(doc)),
            Err(e) => {
                failed = true;
                Some(Err(StageError::SchemaViolation { line, detail: e.to_string() }))
            }
        }
    }))
}

/// Extract tab-separated field values by dot path; `-` emits the full
/// document as JSON. Absent fields, and traversals through a non-object
/// value, both emit the literal `NULL`.
pub fn json2tsv(doc: &Value, fields: &[String]) -> String {
    fields.iter().map(|path| field_value(doc, path)).collect::<Vec<_>>().join("\t")
}

fn field_value(doc: &Value, path: &str) -> String {
    if path == "-" {
        return doc.to_string();
    }
    let mut current = doc;
    for key in path.split('.') {
        match current.get(key) {
            Some(next) => current = next,
            None => return "NULL".to_string(),
        }
    }
    match current {
        Value::Null => "NULL".to_string(),
        Value::String(s) => escape(s),
        other => escape(&other.to_string()),
    }
}

fn escape(s: &str) -> String {
    s.replace('\t', "\\t").replace('\n', "\\n")
}

/// One page-pair unit from Wikihadoop's XML pairing (two consecutive
/// revisions of the same page bundled together by the Hadoop streaming
/// reducer). XML parsing itself lives upstream of this crate; by the time a
/// pair reaches here its two revisions are already decoded.
pub struct HadoopPagePair {
    pub revisions: Vec<Revision>,
}

/// Keep only page pairs carrying exactly two revisions, emitting the newer
/// (second) one — matching the upstream pairing contract.
pub fn wikihadoop2json<I>(pairs: I) -> impl Iterator<Item = Revision>
where
    I: Iterator<Item = HadoopPagePair>,
{
    pairs.filter_map(|pair| {
        if pair.revisions.len() == 2 {
            pair.revisions.into_iter().nth(1)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truncate_text_clips_and_flags() {
        let doc = json!({"text": "abcdef"});
        let out = truncate_text(doc, 3);
        assert_eq!(out["text"], "abc");
        assert_eq!(out["truncated"], true);
    }

    #[test]
    fn truncate_text_leaves_short_text_alone() {
        let doc = json!({"text": "ab"});
        let out = truncate_text(doc, 3);
        assert_eq!(out["text"], "ab");
        assert_eq!(out["truncated"], false);
    }

    #[test]
    fn normalize_rewrites_legacy_redirect_shape() {
        let doc = json!({"page": {"id": 1, "redirect": {"title": "Target"}}});
        let out = normalize(doc);
        assert_eq!(out["page"]["redirect_title"], "Target");
        assert!(out["page"].get("redirect").is_none());
    }

    #[test]
    fn normalize_is_idempotent() {
        let doc = json!({"page": {"id": 1, "redirect_title": "Target"}});
        let once = normalize(doc.clone());
        let twice = normalize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_leaves_a_never_redirected_page_untouched() {
        let doc = json!({"page": {"id": 1, "title": "Foo"}});
        let out = normalize(doc.clone());
        assert_eq!(out, doc);
    }

    #[test]
    fn json2tsv_matches_the_documented_scenario() {
        let doc = json!({"a": {"b": 5}, "c": null});
        let fields = vec!["a.b".to_string(), "c".to_string(), "d".to_string(), "-".to_string()];
        let line = json2tsv(&doc, &fields);
        assert_eq!(line, "5\tNULL\tNULL\t{\"a\":{\"b\":5},\"c\":null}");
    }

    #[test]
    fn json2tsv_escapes_tabs_and_newlines() {
        let doc = json!({"a": "x\ty\nz"});
        assert_eq!(json2tsv(&doc, &["a".to_string()]), "x\\ty\\nz");
    }

    #[test]
    fn wikihadoop2json_keeps_only_pairs() {
        use mw_model::PageRef;
        let rev = |id: u64| Revision {
            id,
            parent_id: None,
            timestamp: chrono::Utc::now(),
            sha1: "s".into(),
            contributor: None,
            minor: false,
            comment: None,
            text: None,
            bytes: None,
            model: None,
            format: None,
            page: PageRef { id: 1, title: "Foo".into(), namespace: 0, redirect_title: None, restrictions: Vec::new() },
        };
        let pairs = vec![
            HadoopPagePair { revisions: vec![rev(1), rev(2)] },
            HadoopPagePair { revisions: vec![rev(3)] },
        ];
        let out: Vec<_> = wikihadoop2json(pairs.into_iter()).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 2);
    }
}
