//! Text normalization helpers used by the string trimmer.

use crate::constants::text::HTML_LINE_BREAKS;

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_inline_whitespace<T: AsRef<str>>(text: T) -> String {
    let mut normalized = String::new();
    let mut seen_space = false;
    for ch in text.as_ref().chars() {
        if ch.is_whitespace() {
            if !seen_space {
                normalized.push(' ');
                seen_space = true;
            }
        } else {
            normalized.push(ch);
            seen_space = false;
        }
    }
    normalized.trim().to_string()
}

/// Replace HTML line breaks left in review bodies with a space.
pub fn replace_html_line_breaks(text: &str) -> String {
    let mut replaced = text.to_string();
    for marker in HTML_LINE_BREAKS {
        if replaced.contains(marker) {
            replaced = replaced.replace(marker, " ");
        }
    }
    replaced
}

/// Drop control characters other than whitespace.
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|ch| !ch.is_control() || ch.is_whitespace())
        .collect()
}

/// Full normalization applied to validated review text.
pub fn normalize_review_text(text: &str) -> String {
    let without_breaks = replace_html_line_breaks(text);
    let printable = strip_control_chars(&without_breaks);
    normalize_inline_whitespace(printable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_inline_whitespace_collapses_runs() {
        let input = "Alpha\n\n  Beta\tGamma";
        assert_eq!(normalize_inline_whitespace(input), "Alpha Beta Gamma");
    }

    #[test]
    fn html_line_breaks_become_spaces() {
        assert_eq!(
            replace_html_line_breaks("Works well.<br />Would buy again.<br>Five"),
            "Works well. Would buy again. Five"
        );
    }

    #[test]
    fn control_chars_are_removed_but_whitespace_survives() {
        assert_eq!(strip_control_chars("a\u{0}b\u{7}c\td"), "abc\td");
    }

    #[test]
    fn normalize_review_text_combines_every_step() {
        assert_eq!(
            normalize_review_text("  Great\u{1b} value!<br /><br />\r\n Arrived   early.  "),
            "Great value! Arrived early."
        );
        assert_eq!(normalize_review_text(" \t\n "), "");
    }
}
