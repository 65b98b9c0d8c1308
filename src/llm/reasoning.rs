//! Removal of model reasoning spans from reply text

use regex::Regex;
use std::sync::LazyLock;

const OPEN_TAG: &str = "<think>";

/// Non-greedy `<think>…</think>` span; `(?s)` lets it cross newlines
static THINK_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid reasoning regex"));

/// Strip every `<think>…</think>` span from `text`.
///
/// Removing one span can splice two fragments into a new span
/// (`<thi<think>x</think>nk>y</think>`), so this repeats until nothing matches.
/// Every pass shortens the text, and the result is a fixed point, which makes
/// the function idempotent.
pub fn strip_reasoning_markup(text: &str) -> String {
    let mut out = text.to_string();
    while THINK_SPAN.is_match(&out) {
        out = THINK_SPAN.replace_all(&out, "").into_owned();
    }
    out
}

/// Text safe to show while a reply is still streaming.
///
/// Closed spans are removed and anything after a still-open `<think>` is held back.
/// A trailing fragment that could still grow into `<think>` is held back too.
pub fn visible_text(partial: &str) -> String {
    let mut out = strip_reasoning_markup(partial);
    if let Some((before, _)) = out.split_once(OPEN_TAG) {
        out = before.to_string();
    }
    let held = (1..OPEN_TAG.len())
        .rev()
        .filter_map(|len| OPEN_TAG.get(..len))
        .find(|prefix| out.ends_with(prefix));
    if let Some(prefix) = held {
        out.truncate(out.len() - prefix.len());
    }
    out
}
