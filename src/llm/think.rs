//! Think-marker parsing.
//!
//! Reasoning models wrap internal reasoning in `<think>…</think>` ahead of
//! the user-facing answer. [`parse_buffer`] is a pure function of the whole
//! buffer received so far, so it can be called after every chunk: the view
//! only ever grows as the buffer grows.

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// Thinking/answer split of a (possibly partial) buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBuffer {
    /// `Some` once the opening marker has arrived.
    pub thinking: Option<String>,
    /// Empty while the stream is still inside the thinking segment.
    pub answer: String,
}

impl ParsedBuffer {
    /// Thinking text, if any was produced.
    pub fn thinking_text(&self) -> Option<&str> {
        self.thinking.as_deref().filter(|t| !t.is_empty())
    }
}

/// Split `raw` into thinking and answer segments.
///
/// A trailing fragment that could still become a marker (`"<thi"`) is held
/// back so that it never flashes up as text and then vanishes.
///
/// # Example
///
/// ```rust
/// use pagewise::llm::think::parse_buffer;
///
/// let p = parse_buffer("<think>abc def</think>xyz");
/// assert_eq!(p.thinking.as_deref(), Some("abc def"));
/// assert_eq!(p.answer, "xyz");
/// ```
pub fn parse_buffer(raw: &str) -> ParsedBuffer {
    parse(raw, true)
}

/// Final split of a complete response: `(answer, thinking)`.
///
/// Nothing more will arrive, so trailing marker prefixes are kept as text.
pub fn split_final(raw: &str) -> (String, Option<String>) {
    let parsed = parse(raw, false);
    let thinking = parsed.thinking_text().map(ToString::to_string);
    (parsed.answer, thinking)
}

fn parse(raw: &str, hold_back: bool) -> ParsedBuffer {
    let tail = |text: &str, marker: &str| -> String {
        let text = if hold_back {
            hold_back_partial(text, marker)
        } else {
            text
        };
        text.trim().to_string()
    };

    let Some(open) = raw.find(THINK_OPEN) else {
        return ParsedBuffer {
            thinking: None,
            answer: tail(raw, THINK_OPEN),
        };
    };

    let before = &raw[..open];
    let rest = &raw[open + THINK_OPEN.len()..];

    match rest.find(THINK_CLOSE) {
        None => ParsedBuffer {
            thinking: Some(tail(rest, THINK_CLOSE)),
            answer: before.trim().to_string(),
        },
        Some(close) => {
            let thinking = rest[..close].trim().to_string();
            let after = &rest[close + THINK_CLOSE.len()..];
            let answer = format!("{}{}", before.trim_start(), after.trim_start());
            ParsedBuffer {
                thinking: Some(thinking),
                answer: answer.trim().to_string(),
            }
        }
    }
}

/// Drop a suffix of `text` that is a proper prefix of `marker`.
fn hold_back_partial<'a>(text: &'a str, marker: &str) -> &'a str {
    for len in (1..marker.len()).rev() {
        if text.ends_with(&marker[..len]) {
            return &text[..text.len() - len];
        }
    }
    text
}
