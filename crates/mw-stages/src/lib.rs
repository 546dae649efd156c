//! Per-record and per-page pipeline stages: diffing, mending, revision-level
//! aggregation, and the small ancillary transforms (spec §4.C5/C6/C8/C9).

pub mod ancillary;
pub mod diff_stage;
pub mod mend_stage;
pub mod revision_stats;

pub use ancillary::{json2tsv, normalize, truncate_text, validate_stream, wikihadoop2json, HadoopPagePair};
pub use diff_stage::{diff_stage, DiffStageConfig};
pub use mend_stage::mend_stage;
pub use revision_stats::{aggregate, RevisionStats, StatsConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("schema validation failed at line {line}: {detail}")]
    SchemaViolation { line: usize, detail: String },
    #[error("mend precondition failed for revision {0}: missing {1}")]
    MendPrecondition(u64, &'static str),
    #[error(transparent)]
    Stream(#[from] mw_stream::StreamError),
    #[error(transparent)]
    Engine(#[from] mw_engine::EngineError),
}
