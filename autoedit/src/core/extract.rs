//! Extraction of the proposed file body from a raw model reply.
//!
//! The model is asked to wrap the complete file in [`FILE_OPEN`]/[`FILE_CLOSE`].
//! It does not always comply, so a fenced code block is accepted as a fallback.
//! Nothing is ever synthesized: if neither form is present the result is
//! [`Extraction::Empty`].

use std::sync::LazyLock;

use regex::Regex;

pub const FILE_OPEN: &str = "<FILE>";
pub const FILE_CLOSE: &str = "</FILE>";
pub const NO_CHANGE_MARKER: &str = "<NO_CHANGE>";

static DELIMITED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<FILE>(.*?)</FILE>").unwrap());

static FENCED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\w*\n(.*?)```").unwrap());

/// What a model reply amounts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The model explicitly declared that no change is needed.
    NoChange,
    /// Full proposed replacement body.
    Candidate(String),
    /// No recognizable file body in the reply.
    Empty,
}

impl Extraction {
    pub fn candidate(&self) -> Option<&str> {
        match self {
            Extraction::Candidate(body) => Some(body),
            _ => None,
        }
    }
}

/// Classify a raw reply. See module docs for the fallback order.
pub fn extract(reply: &str) -> Extraction {
    if reply.contains(NO_CHANGE_MARKER) {
        return Extraction::NoChange;
    }

    let body = if let Some(caps) = DELIMITED_RE.captures(reply) {
        normalize_delimited(&caps[1])
    } else if let Some(caps) = FENCED_RE.captures(reply) {
        caps[1].to_string()
    } else {
        return Extraction::Empty;
    };

    if body.is_empty() {
        Extraction::Empty
    } else {
        Extraction::Candidate(body)
    }
}

/// Undo delimiter artifacts: one leading newline after `<FILE>`, and a doubled
/// newline before `</FILE>`.
fn normalize_delimited(raw: &str) -> String {
    let body = raw.strip_prefix('\n').unwrap_or(raw);
    match body.strip_suffix('\n') {
        Some(rest) if rest.ends_with('\n') => rest.to_string(),
        _ => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_content_round_trips() {
        let content = "local x = 1\n\nreturn x\n";
        let reply = format!("Here you go:\n{FILE_OPEN}\n{content}{FILE_CLOSE}\nDone.");
        assert_eq!(extract(&reply), Extraction::Candidate(content.to_string()));
    }

    #[test]
    fn trailing_blank_line_collapses_to_single_newline() {
        let reply = "<FILE>\nline one\nline two\n\n</FILE>";
        assert_eq!(
            extract(reply),
            Extraction::Candidate("line one\nline two\n".to_string())
        );
    }

    #[test]
    fn only_one_leading_newline_is_stripped() {
        let reply = "<FILE>\n\nbody\n</FILE>";
        assert_eq!(extract(reply), Extraction::Candidate("\nbody\n".to_string()));
    }

    #[test]
    fn content_without_trailing_newline_is_kept_verbatim() {
        let reply = "<FILE>\nno newline at end</FILE>";
        assert_eq!(
            extract(reply),
            Extraction::Candidate("no newline at end".to_string())
        );
    }

    #[test]
    fn no_change_marker_wins_over_content() {
        let reply = "<NO_CHANGE> already done\n<FILE>\nx\n</FILE>";
        assert_eq!(extract(reply), Extraction::NoChange);
    }

    #[test]
    fn falls_back_to_fenced_block_with_any_tag() {
        let reply = "Sure!\n```lua\nprint('hi')\n```\n";
        assert_eq!(
            extract(reply),
            Extraction::Candidate("print('hi')\n".to_string())
        );
        let untagged = "```\nplain\n```";
        assert_eq!(extract(untagged), Extraction::Candidate("plain\n".to_string()));
    }

    #[test]
    fn first_delimited_block_is_used() {
        let reply = "<FILE>\nfirst\n</FILE> and <FILE>\nsecond\n</FILE>";
        assert_eq!(extract(reply), Extraction::Candidate("first\n".to_string()));
    }

    #[test]
    fn unrecognized_or_empty_reply_is_empty() {
        assert_eq!(extract("I cannot help with that."), Extraction::Empty);
        assert_eq!(extract("<FILE>\n</FILE>"), Extraction::Empty);
        assert_eq!(extract(""), Extraction::Empty);
    }
}
