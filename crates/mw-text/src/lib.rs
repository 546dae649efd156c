//! Tokenizer and per-page diff processor (spec §4.C4).
//!
//! The diff engine is treated as a pluggable interface: `Processor::process`
//! tokenizes and diffs against an internally held anchor; `Processor::update`
//! forcibly resynchronizes that anchor without emitting ops, used after a
//! timeout. Tokenization and the diff algorithm itself are swappable
//! implementation details behind this one type.

pub mod diff_algorithm;
pub mod segment;

pub use segment::tokenize;

use mw_model::Operation;

/// Stateful per-page diff processor. `new()` starts with an empty anchor.
#[derive(Debug, Default)]
pub struct Processor {
    last_tokens: Vec<String>,
}

impl Processor {
    pub fn new() -> Self {
        Self { last_tokens: Vec::new() }
    }

    /// Tokenize `text` into `b`, diff the processor's current anchor `a`
    /// against it, and advance the anchor to `b`. Returns `(ops, a, b)`.
    pub fn process(&mut self, text: &str) -> (Vec<Operation>, Vec<String>, Vec<String>) {
        let b = tokenize(text);
        let ops = diff_algorithm::diff_ops(&self.last_tokens, &b);
        let a = std::mem::replace(&mut self.last_tokens, b.clone());
        (ops, a, b)
    }

    /// Forcibly replace the anchor with `tokenize(last_text)`, without
    /// emitting ops. Used to resynchronize after a diff timeout.
    pub fn update(&mut self, last_text: &str) {
        self.last_tokens = tokenize(last_text);
    }

    /// Current anchor tokens, mostly useful for tests.
    pub fn anchor(&self) -> &[String] {
        &self.last_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_is_deterministic_for_fixed_inputs() {
        let mut p1 = Processor::new();
        let mut p2 = Processor::new();
        let (ops1, ..) = p1.process("a b c");
        let (ops2, ..) = p2.process("a b c");
        assert_eq!(ops1.len(), ops2.len());
    }

    #[test]
    fn process_advances_anchor_so_next_call_sees_a_equals_b() {
        let mut p = Processor::new();
        let (_, _, b1) = p.process("hello world");
        assert_eq!(p.anchor(), b1.as_slice());
        let (_, a2, _) = p.process("hello there");
        assert_eq!(a2, b1);
    }

    #[test]
    fn update_resyncs_anchor_without_emitting_ops() {
        let mut p = Processor::new();
        p.process("first version");
        p.update("second version");
        assert_eq!(p.anchor(), tokenize("second version").as_slice());
    }
}
