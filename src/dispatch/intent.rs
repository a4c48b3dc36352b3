//! Intent classification for free-form input.
//!
//! Keywords must be whole words: "running late" is not a command and
//! "asking around" is not a question. Matching ignores ASCII case and
//! leading/trailing whitespace.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Ask { prompt: String },
    Run { command: String },
    Fallback,
}

/// Strip `keyword` from the front of `text` if it is followed by whitespace
/// or the end of input. Returns the trimmed remainder.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &text[keyword.len()..];
    match rest.chars().next() {
        None => Some(""),
        Some(c) if c.is_whitespace() => Some(rest.trim_start()),
        Some(_) => None,
    }
}

/// Keywords must be whole words, unlike a plain prefix test: "asking around"
/// and "running late" fall back instead of reaching the AI or the shell.
pub fn classify_intent(text: &str) -> Intent {
    let trimmed = text.trim();

    if let Some(rest) = strip_keyword(trimmed, "ask") {
        let rest = strip_keyword(rest, "ai").unwrap_or(rest);
        let prompt = if rest.is_empty() { trimmed } else { rest };
        return Intent::Ask {
            prompt: prompt.to_string(),
        };
    }

    match strip_keyword(trimmed, "run") {
        Some(rest) if !rest.is_empty() => Intent::Run {
            command: rest.to_string(),
        },
        _ => Intent::Fallback,
    }
}
