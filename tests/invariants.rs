//! Property tests: random sequences of raw inserts/deletes against the
//! engine must always agree with a plain `String` model.

use proptest::prelude::*;
use ziggurat_engine::{Document, EngineConfig};

#[derive(Clone, Debug)]
enum Op {
    Insert { at_fraction: f64, text: String },
    Delete { at_fraction: f64, len_fraction: f64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0.0..1.0f64, "[a-zA-Z0-9 \n]{1,12}").prop_map(|(at_fraction, text)| Op::Insert { at_fraction, text }),
        (0.0..1.0f64, 0.0..1.0f64).prop_map(|(at_fraction, len_fraction)| Op::Delete {
            at_fraction,
            len_fraction
        }),
    ]
}

fn apply(doc: &mut Document, model: &mut String, op: &Op) {
    match op {
        Op::Insert { at_fraction, text } => {
            let at = byte_boundary(model, *at_fraction);
            doc.raw_insert(at, text.as_bytes()).unwrap();
            model.insert_str(at, text);
        }
        Op::Delete { at_fraction, len_fraction } => {
            if model.is_empty() {
                return;
            }
            let at = byte_boundary(model, *at_fraction);
            let max_len = model.len() - at;
            if max_len == 0 {
                return;
            }
            let mut len = (max_len as f64 * len_fraction) as usize;
            len = len.min(max_len);
            // Snap to a char boundary so the model stays valid UTF-8, the
            // same way a caret-driven delete would.
            while len > 0 && !model.is_char_boundary(at + len) {
                len -= 1;
            }
            doc.raw_delete(at, len);
            model.replace_range(at..at + len, "");
        }
    }
}

fn byte_boundary(s: &str, fraction: f64) -> usize {
    if s.is_empty() {
        return 0;
    }
    let raw = (s.len() as f64 * fraction) as usize;
    let mut at = raw.min(s.len());
    while at > 0 && !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}

proptest! {
    #[test]
    fn random_edits_match_a_string_model(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let mut doc = Document::with_config(EngineConfig::tiny_fanout());
        let mut model = String::new();

        for op in &ops {
            apply(&mut doc, &mut model, op);

            let mut out = Vec::new();
            doc.materialize(&mut out).unwrap();
            prop_assert_eq!(&out, model.as_bytes());
            prop_assert_eq!(doc.size(), model.len());
            prop_assert_eq!(doc.line_count(), model.matches('\n').count() + 1);
        }
    }

    #[test]
    fn materialize_range_matches_a_string_slice(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut doc = Document::with_config(EngineConfig::tiny_fanout());
        let mut model = String::new();
        for op in &ops {
            apply(&mut doc, &mut model, op);
        }

        if !model.is_empty() {
            let start = byte_boundary(&model, 0.25);
            let end = byte_boundary(&model, 0.75).max(start);
            let mut out = Vec::new();
            doc.materialize_range(&mut out, start..end).unwrap();
            prop_assert_eq!(out.as_slice(), model[start..end].as_bytes());
        }
    }
}
