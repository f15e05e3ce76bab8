//! The Language Model (LM) provider external collaborator, plus the
//! resilient JSON-from-text extraction shared by every vertex that parses an
//! LM response.
//!
//! `generate` is the only capability a vertex needs; everything else here
//! (fenced-block stripping, balanced-brace scanning) exists to turn whatever
//! a model actually returned into a `serde_json::Value` without ever
//! panicking or leaking a malformed response to a consumer.

use crate::error::PentagramError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[async_trait]
pub trait LmProvider: Send + Sync {
    /// `temperature` is expected in `[0.0, 1.0]`; `max_tokens` must be positive.
    /// May fail with any error — callers treat failure as a transient I/O
    /// failure and must not propagate it out of a vertex's `vote`.
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> anyhow::Result<String>;
}

/// A canned-response provider for tests: returns responses from a queue in
/// order, or an error once the queue is drained.
#[derive(Default)]
pub struct StubLmProvider {
    responses: Mutex<VecDeque<anyhow::Result<String>>>,
}

impl StubLmProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I: IntoIterator<Item = String>>(responses: I) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
        }
    }

    pub fn push_response(&self, text: String) {
        self.responses.lock().unwrap().push_back(Ok(text));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!(message.into())));
    }
}

#[async_trait]
impl LmProvider for StubLmProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> anyhow::Result<String> {
        let mut queue = self.responses.lock().unwrap();
        queue
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("StubLmProvider: no more responses queued")))
    }
}

/// Resilient ordered extraction of a JSON value out of raw LM text:
///
/// 1. trim whitespace
/// 2. if a fenced block opened with ```json is present, take its body
/// 3. else if any fenced block (``` ... ```) is present, take its body
/// 4. try to parse the remaining text directly as JSON
/// 5. on failure, scan for the first balanced `{...}` object, then the first
///    balanced `[...]` array, and try each
/// 6. if all of the above fail, return a parse error
pub fn extract_json(text: &str) -> Result<serde_json::Value, PentagramError> {
    let trimmed = text.trim();

    let candidate = extract_fenced_block(trimmed, Some("json"))
        .or_else(|| extract_fenced_block(trimmed, None))
        .unwrap_or(trimmed);

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
        return Ok(value);
    }

    if let Some(obj_src) = find_balanced(candidate, '{', '}') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&obj_src) {
            return Ok(value);
        }
    }
    if let Some(arr_src) = find_balanced(candidate, '[', ']') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&arr_src) {
            return Ok(value);
        }
    }

    Err(PentagramError::ParseFailure(format!(
        "no valid JSON object or array found in LM response (len={})",
        text.len()
    )))
}

/// Extracts the body of the first fenced code block. When `lang` is `Some`,
/// only a block whose opening fence is immediately followed by that language
/// tag matches (e.g. ```json`); when `None`, any fenced block matches.
fn extract_fenced_block<'a>(text: &'a str, lang: Option<&str>) -> Option<&'a str> {
    let fence = "```";
    let start = text.find(fence)?;
    let rest = &text[start + fence.len()..];
    let opening_line_end = rest.find('\n')?;
    let opening_line = rest[..opening_line_end].trim();

    if let Some(tag) = lang {
        if opening_line != tag {
            return None;
        }
    }

    let body_region = &rest[opening_line_end + 1..];
    let end = body_region.find(fence)?;
    Some(body_region[..end].trim())
}

/// Finds the first substring delimited by balanced `open`/`close` characters,
/// respecting string literals so braces inside quoted text don't unbalance
/// the scan.
fn find_balanced(text: &str, open: char, close: char) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.iter().position(|&c| c == open)?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(chars[start..=i].iter().collect());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_object() {
        let v = extract_json(r#"{"score": 0.5}"#).unwrap();
        assert_eq!(v["score"], 0.5);
    }

    #[test]
    fn extracts_json_fenced_block() {
        let text = "Sure, here you go:\n```json\n{\"score\": 0.7}\n```\nDone.";
        let v = extract_json(text).unwrap();
        assert_eq!(v["score"], 0.7);
    }

    #[test]
    fn extracts_generic_fenced_block() {
        let text = "```\n{\"score\": 0.9}\n```";
        let v = extract_json(text).unwrap();
        assert_eq!(v["score"], 0.9);
    }

    #[test]
    fn falls_back_to_balanced_object_scan() {
        let text = "The model said: {\"score\": 0.4} -- trust me.";
        let v = extract_json(text).unwrap();
        assert_eq!(v["score"], 0.4);
    }

    #[test]
    fn falls_back_to_balanced_array_scan() {
        let text = "patterns: [1, 2, 3] end";
        let v = extract_json(text).unwrap();
        assert_eq!(v, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn malformed_fence_still_recovers_inner_object() {
        let text = "```json\nnot quite json but here {\"score\": 0.3} trailing\n```";
        let v = extract_json(text).unwrap();
        assert_eq!(v["score"], 0.3);
    }

    #[test]
    fn unparseable_text_is_a_parse_failure() {
        let err = extract_json("no json here at all").unwrap_err();
        assert!(matches!(err, PentagramError::ParseFailure(_)));
    }
}
