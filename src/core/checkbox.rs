//! Pure parsing and toggling of markdown checkbox task lines.
//!
//! Both functions are total: malformed input never errors, it simply yields
//! no tasks or leaves the text unchanged. The single write-back call site
//! lives in `io::source_doc`.

use std::sync::LazyLock;

use regex::Regex;

/// `- [ ] ID-123: do the thing`, with the id prefix optional.
static CHECKBOX_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*-\s+\[)([ xX])(\]\s+)(?:([A-Za-z]+-\d+)[:\s]+\s*)?(.+?)\s*$")
        .expect("checkbox regex")
});

/// One checkbox task line extracted from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCheckbox {
    /// 1-based line number in the source text.
    pub line: usize,
    /// Explicit id prefix, when present (e.g. `US-001`).
    pub id: Option<String>,
    pub name: String,
    pub checked: bool,
}

/// Parse one line as a checkbox task, yielding `(id, name, checked)`.
pub fn parse_line(line: &str) -> Option<(Option<String>, String, bool)> {
    let caps = CHECKBOX_LINE.captures(line)?;
    Some((
        caps.get(4).map(|m| m.as_str().to_string()),
        caps[5].trim().to_string(),
        caps[2].eq_ignore_ascii_case("x"),
    ))
}

/// Extract every checkbox task line from `text`.
pub fn parse_checkboxes(text: &str) -> Vec<ParsedCheckbox> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let (id, name, checked) = parse_line(line)?;
            Some(ParsedCheckbox {
                line: idx + 1,
                id,
                name,
                checked,
            })
        })
        .collect()
}

/// Count of (checked, total) checkboxes in `text`.
pub fn count_checkboxes(text: &str) -> (usize, usize) {
    let boxes = parse_checkboxes(text);
    let checked = boxes.iter().filter(|b| b.checked).count();
    (checked, boxes.len())
}

/// Set the checkbox character on a single 1-based line.
///
/// Returns the text unchanged when the line is out of range or carries no
/// checkbox; setting an already-matching state is a byte no-op. Only the
/// single character between the brackets is ever rewritten; the rest of the
/// line (id separators, trailing whitespace) stays verbatim.
pub fn toggle_line(text: &str, line: usize, checked: bool) -> String {
    if line == 0 {
        return text.to_string();
    }
    let mut lines: Vec<&str> = text.split('\n').collect();
    let Some(target) = lines.get(line - 1).copied() else {
        return text.to_string();
    };
    let Some(mark) = CHECKBOX_LINE.captures(target).and_then(|caps| caps.get(2)) else {
        return text.to_string();
    };

    let already = if checked {
        mark.as_str().eq_ignore_ascii_case("x")
    } else {
        mark.as_str() == " "
    };
    if already {
        return text.to_string();
    }

    let mut updated = String::with_capacity(target.len());
    updated.push_str(&target[..mark.start()]);
    updated.push(if checked { 'x' } else { ' ' });
    updated.push_str(&target[mark.end()..]);
    lines[line - 1] = &updated;
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Plan\n\n- [ ] US-001: set up repo\n- [x] US-002: add CI\n  - [ ] nested task\nnot a checkbox\n";

    #[test]
    fn parses_checkbox_lines_with_optional_ids() {
        let boxes = parse_checkboxes(DOC);
        assert_eq!(boxes.len(), 3);
        assert_eq!(
            boxes[0],
            ParsedCheckbox {
                line: 3,
                id: Some("US-001".to_string()),
                name: "set up repo".to_string(),
                checked: false,
            }
        );
        assert!(boxes[1].checked);
        assert_eq!(boxes[2].id, None);
        assert_eq!(boxes[2].name, "nested task");
    }

    #[test]
    fn counts_checked_and_total() {
        assert_eq!(count_checkboxes(DOC), (1, 3));
        assert_eq!(count_checkboxes("no tasks here"), (0, 0));
    }

    #[test]
    fn toggle_changes_only_the_addressed_line() {
        let updated = toggle_line(DOC, 3, true);
        let expected = DOC.replace("- [ ] US-001", "- [x] US-001");
        assert_eq!(updated, expected);
    }

    #[test]
    fn toggle_unchecks() {
        let updated = toggle_line(DOC, 4, false);
        assert!(updated.contains("- [ ] US-002: add CI"));
    }

    #[test]
    fn toggle_out_of_range_is_byte_identical() {
        assert_eq!(toggle_line(DOC, 0, true), DOC);
        assert_eq!(toggle_line(DOC, 999, true), DOC);
    }

    #[test]
    fn toggle_non_checkbox_line_is_unchanged() {
        assert_eq!(toggle_line(DOC, 1, true), DOC);
    }

    #[test]
    fn toggle_is_idempotent() {
        let once = toggle_line(DOC, 3, true);
        let twice = toggle_line(&once, 3, true);
        assert_eq!(once, twice);
    }

    #[test]
    fn toggle_leaves_everything_but_the_mark_verbatim() {
        // Space-separated id and trailing whitespace must survive untouched.
        let doc = "- [ ] US-001 set up repo  \n";
        assert_eq!(toggle_line(doc, 1, true), "- [x] US-001 set up repo  \n");
    }

    #[test]
    fn toggle_matching_state_is_byte_identical() {
        let doc = "- [X] US-001: set up repo\n- [ ] US-002: add CI \n";
        assert_eq!(toggle_line(doc, 1, true), doc);
        assert_eq!(toggle_line(doc, 2, false), doc);
    }
}
