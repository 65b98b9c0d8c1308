//! Property-based tests for reply post-processing and stream decoding
//!
//! These tests verify:
//! - Reasoning removal is idempotent and never leaves a complete span behind
//! - Text without markers passes through untouched
//! - Line reassembly does not depend on where the byte stream is split

use super::ollama::LineBuffer;
use super::reasoning::strip_reasoning_markup;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Text built from fragments that are likely to form (or almost form) markers
fn arb_marked_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            3 => "[a-z \n]{0,8}",
            2 => Just("<think>".to_string()),
            2 => Just("</think>".to_string()),
            1 => Just("<thi".to_string()),
            1 => Just("nk>".to_string()),
            1 => Just("<".to_string()),
        ],
        0..16,
    )
    .prop_map(|parts| parts.concat())
}

/// JSON-ish lines without embedded newlines
fn arb_lines() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-zA-Z0-9{}\":, ]{1,30}", 0..8).prop_map(|lines| {
        lines
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn strip_is_idempotent(text in arb_marked_text()) {
        let once = strip_reasoning_markup(&text);
        let twice = strip_reasoning_markup(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn strip_leaves_no_closed_span(text in arb_marked_text()) {
        let out = strip_reasoning_markup(&text);
        if let Some((_, rest)) = out.split_once("<think>") {
            prop_assert!(!rest.contains("</think>"));
        }
    }

    #[test]
    fn strip_never_grows_text(text in arb_marked_text()) {
        prop_assert!(strip_reasoning_markup(&text).len() <= text.len());
    }

    #[test]
    fn text_without_markers_unchanged(text in "[a-zA-Z0-9 .,!?\n]{0,200}") {
        prop_assert_eq!(strip_reasoning_markup(&text), text);
    }

    #[test]
    fn line_buffer_independent_of_split_points(
        lines in arb_lines(),
        cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let body: String = lines.iter().map(|l| format!("{l}\n")).collect();
        let bytes = body.as_bytes();

        let mut offsets: Vec<usize> = cuts.iter().map(|c| c.index(bytes.len() + 1)).collect();
        offsets.push(0);
        offsets.push(bytes.len());
        offsets.sort_unstable();
        offsets.dedup();

        let mut buffer = LineBuffer::default();
        let mut seen = Vec::new();
        for window in offsets.windows(2) {
            seen.extend(buffer.push(&bytes[window[0]..window[1]]));
        }
        prop_assert_eq!(buffer.finish(), None);
        prop_assert_eq!(seen, lines);
    }
}
