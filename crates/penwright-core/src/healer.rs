//! Tolerant decoding of structured payloads from free-text model output.
//!
//! Models are asked for a JSON object but routinely wrap it in Markdown
//! fences, surround it with prose, leave trailing commas, or stop before
//! the closing braces. The healer tries a fixed chain of strategies and
//! stops at the first one whose decoded value carries the required field.
//!
//! # Strategy order
//! ```text
//! 1. as-is            parse the trimmed text
//! 2. fenced-block     parse the interior of a ``` fence
//! 3. brace-span       parse from the first '{' to the last '}'
//! 4. trailing-commas  drop ',' before '}' or ']' and parse
//! 5. closing-braces   append the missing '}' and parse
//! ```
//!
//! When every strategy fails the result is `ok: false` with no value. The
//! healer never invents a partial payload.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

lazy_static! {
    /// A fenced block with an optional language tag, e.g. ```json ... ```
    static ref FENCED_BLOCK: Regex = Regex::new(
        r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```"
    ).unwrap();
}

/// Default field a healed payload must contain.
pub const DEFAULT_REQUIRED_FIELD: &str = "content";

/// A recovery strategy, in the order the healer applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealStrategy {
    /// Text parsed without changes
    AsIs,

    /// Interior of a fenced code block
    FencedBlock,

    /// Substring between the first `{` and the last `}`
    BraceSpan,

    /// Trailing commas removed
    TrailingCommas,

    /// Missing closing braces appended
    ClosingBraces,
}

impl fmt::Display for HealStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealStrategy::AsIs => "as_is",
            HealStrategy::FencedBlock => "fenced_block",
            HealStrategy::BraceSpan => "brace_span",
            HealStrategy::TrailingCommas => "trailing_commas",
            HealStrategy::ClosingBraces => "closing_braces",
        };
        f.write_str(name)
    }
}

/// Outcome of a healing attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealResult {
    /// Whether a payload was recovered
    pub ok: bool,

    /// The recovered payload
    pub value: Option<JsonValue>,

    /// Strategy that produced the payload
    pub strategy_used: Option<HealStrategy>,
}

impl HealResult {
    fn healed(value: JsonValue, strategy: HealStrategy) -> Self {
        Self {
            ok: true,
            value: Some(value),
            strategy_used: Some(strategy),
        }
    }

    fn failed() -> Self {
        Self {
            ok: false,
            value: None,
            strategy_used: None,
        }
    }

    /// Take the recovered value, if any.
    pub fn into_value(self) -> Option<JsonValue> {
        self.value
    }
}

/// Recovers a JSON object from a provider's raw text response.
#[derive(Debug, Clone)]
pub struct ResponseHealer {
    required_field: String,
}

impl ResponseHealer {
    /// Create a healer that requires `required_field` in the decoded object.
    pub fn new(required_field: impl Into<String>) -> Self {
        Self {
            required_field: required_field.into(),
        }
    }

    /// The field a decoded value must contain to count as healed.
    pub fn required_field(&self) -> &str {
        &self.required_field
    }

    /// Run the strategy chain over `raw`.
    pub fn heal(&self, raw: &str) -> HealResult {
        let text = raw.trim();
        if text.is_empty() {
            return HealResult::failed();
        }

        if let Some(value) = self.accept(text) {
            return self.finish(value, HealStrategy::AsIs);
        }

        let body = match strip_fence(text) {
            Some(inner) => {
                if let Some(value) = self.accept(inner) {
                    return self.finish(value, HealStrategy::FencedBlock);
                }
                inner
            }
            None => text,
        };

        let span = brace_span(body);
        if let Some(span) = span {
            if let Some(value) = self.accept(span) {
                return self.finish(value, HealStrategy::BraceSpan);
            }
        }

        let decommaed = remove_trailing_commas(span.unwrap_or(body));
        if let Some(value) = self.accept(&decommaed) {
            return self.finish(value, HealStrategy::TrailingCommas);
        }

        if let Some(repaired) = close_braces(body) {
            if let Some(value) = self.accept(&repaired) {
                return self.finish(value, HealStrategy::ClosingBraces);
            }
        }

        tracing::debug!(
            required_field = %self.required_field,
            length = raw.len(),
            "Response could not be healed"
        );
        HealResult::failed()
    }

    fn finish(&self, value: JsonValue, strategy: HealStrategy) -> HealResult {
        tracing::debug!(strategy = %strategy, "Response healed");
        HealResult::healed(value, strategy)
    }

    /// Parse `text` and keep it only if it is an object with the required field.
    fn accept(&self, text: &str) -> Option<JsonValue> {
        let value: JsonValue = serde_json::from_str(text.trim()).ok()?;
        let has_field = value
            .as_object()
            .map(|obj| obj.contains_key(&self.required_field))
            .unwrap_or(false);
        has_field.then_some(value)
    }
}

impl Default for ResponseHealer {
    fn default() -> Self {
        Self::new(DEFAULT_REQUIRED_FIELD)
    }
}

/// Interior of the first fenced block. An unterminated fence yields
/// everything after the opening line.
fn strip_fence(text: &str) -> Option<&str> {
    if let Some(caps) = FENCED_BLOCK.captures(text) {
        return caps.get(1).map(|m| m.as_str().trim());
    }

    let rest = text.strip_prefix("```")?;
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    Some(body.trim())
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Drop commas followed only by whitespace before `}` or `]`. Commas inside
/// string literals are kept.
fn remove_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut pending_comma: Option<usize> = None;

    for ch in text.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(ch);
            continue;
        }

        match ch {
            ',' => pending_comma = Some(out.len()),
            '}' | ']' => {
                if let Some(at) = pending_comma.take() {
                    out.remove(at);
                }
            }
            '"' => {
                in_string = true;
                pending_comma = None;
            }
            c if c.is_whitespace() => {}
            _ => pending_comma = None,
        }
        out.push(ch);
    }

    out
}

/// Text from the first `{` with the unmatched braces closed. `None` when
/// there is no object start or nothing is missing.
fn close_braces(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut tail = remove_trailing_commas(text[start..].trim_end());
    while tail.ends_with(',') {
        tail.pop();
        tail.truncate(tail.trim_end().len());
    }

    let deficit = unmatched_open_braces(&tail);
    if deficit == 0 {
        return None;
    }

    tail.extend(std::iter::repeat('}').take(deficit));
    Some(tail)
}

/// Count of `{` left open, ignoring braces inside string literals.
fn unmatched_open_braces(text: &str) -> usize {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
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
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    depth
}
