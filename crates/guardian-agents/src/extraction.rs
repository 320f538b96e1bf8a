//! Best-effort structured extraction from free-form oracle text
//!
//! Two stages: parse the whole reply as a JSON object; failing that, cut
//! brace-delimited candidates out of the text, largest first, and accept the
//! first one that parses as an object.

use guardian_core::ExtractionError;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

lazy_static! {
    /// First `{` to last `}` across lines
    static ref OUTERMOST_BLOCK: Regex = Regex::new(r"(?s)\{.*\}").expect("valid block regex");
}

/// Extract a JSON object from an oracle reply
pub fn extract_structured(text: &str) -> Result<Map<String, Value>, ExtractionError> {
    if let Some(map) = parse_object(text.trim()) {
        return Ok(map);
    }

    let candidates = brace_candidates(text);
    let tried = candidates.len();
    candidates
        .into_iter()
        .find_map(parse_object)
        .ok_or(ExtractionError { tried })
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Brace-delimited substrings, longest first, without duplicates
fn brace_candidates(text: &str) -> Vec<&str> {
    let mut candidates: Vec<&str> = Vec::new();

    if let Some(m) = OUTERMOST_BLOCK.find(text) {
        candidates.push(m.as_str());
    }
    candidates.extend(balanced_blocks(text));

    candidates.sort_by(|a, b| b.len().cmp(&a.len()));
    candidates.dedup();
    candidates
}

/// Top-level balanced `{...}` blocks. Braces inside JSON strings are ignored;
/// a stray `}` outside any block is skipped.
fn balanced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = idx;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    blocks.push(&text[start..=idx]);
                }
            }
            _ => {}
        }
    }

    blocks
}
