//! The `edit_code` action's five-strategy matcher (§4.A).
//!
//! Strategies run in order: exact, line-trimmed, whitespace-normalized,
//! indent-flexible, block-anchor. The first strategy to find exactly one
//! candidate wins; a strategy that finds more than one candidate is
//! ambiguous and the whole match fails as `NoMatch` rather than falling
//! through to a looser strategy (falling through on ambiguity would make
//! the choice of replacement non-deterministic).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

/// Find the single byte range in `haystack` that `old_text` matches under
/// the first strategy that produces exactly one candidate. `Ok(None)` means
/// no strategy found any candidate at all; `Err(())` means some strategy
/// found more than one (ambiguous).
pub fn find_unique_match(haystack: &str, old_text: &str) -> Result<Option<ByteRange>, ()> {
    for strategy in [
        exact_matches,
        line_trimmed_matches,
        whitespace_normalized_matches,
        indent_flexible_matches,
        block_anchor_matches,
    ] {
        let candidates = strategy(haystack, old_text);
        match candidates.len() {
            0 => continue,
            1 => return Ok(Some(candidates[0])),
            _ => return Err(()),
        }
    }
    Ok(None)
}

fn exact_matches(haystack: &str, old_text: &str) -> Vec<ByteRange> {
    if old_text.is_empty() {
        return Vec::new();
    }
    haystack
        .match_indices(old_text)
        .map(|(start, m)| ByteRange { start, end: start + m.len() })
        .collect()
}

/// Compare old_text against every contiguous window of haystack lines with
/// the same line count, trimming each line's leading/trailing whitespace
/// before comparing.
fn line_trimmed_matches(haystack: &str, old_text: &str) -> Vec<ByteRange> {
    windowed_line_match(haystack, old_text, |l| l.trim().to_string())
}

fn whitespace_normalized_matches(haystack: &str, old_text: &str) -> Vec<ByteRange> {
    windowed_line_match(haystack, old_text, |l| normalize_whitespace(l))
}

/// Like line-trimmed, but additionally strips each side's common leading
/// indentation before comparing — tolerates a whole block being re-indented.
fn indent_flexible_matches(haystack: &str, old_text: &str) -> Vec<ByteRange> {
    let old_dedented = dedent(old_text);
    let old_lines: Vec<&str> = old_dedented.lines().collect();
    if old_lines.is_empty() {
        return Vec::new();
    }

    let hay_lines: Vec<(usize, usize, &str)> = line_spans(haystack);
    let mut out = Vec::new();
    if hay_lines.len() < old_lines.len() {
        return out;
    }
    for window in (0..=hay_lines.len() - old_lines.len()).map(|i| &hay_lines[i..i + old_lines.len()]) {
        let window_text: Vec<&str> = window.iter().map(|(_, _, l)| *l).collect();
        let window_joined = window_text.join("\n");
        let window_dedented = dedent(&window_joined);
        if window_dedented.lines().collect::<Vec<_>>() == old_lines {
            let start = window[0].0;
            let end = window[window.len() - 1].1;
            out.push(ByteRange { start, end });
        }
    }
    out
}

/// Treats only the first and last line of `old_text` (trimmed) as anchors;
/// everything strictly between them in `haystack` is accepted regardless of
/// content. Tolerates drift in the body of a multi-line block when only the
/// opening/closing lines are reliable.
fn block_anchor_matches(haystack: &str, old_text: &str) -> Vec<ByteRange> {
    let old_lines: Vec<&str> = old_text.lines().collect();
    if old_lines.len() < 2 {
        return Vec::new();
    }
    let first = old_lines[0].trim();
    let last = old_lines[old_lines.len() - 1].trim();
    if first.is_empty() || last.is_empty() {
        return Vec::new();
    }

    let hay_lines = line_spans(haystack);
    let mut out = Vec::new();
    for i in 0..hay_lines.len() {
        if hay_lines[i].2.trim() != first {
            continue;
        }
        for j in (i + 1)..hay_lines.len() {
            if hay_lines[j].2.trim() == last {
                out.push(ByteRange { start: hay_lines[i].0, end: hay_lines[j].1 });
                break;
            }
        }
    }
    out
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte spans of each line (start, end) excluding the trailing newline,
/// alongside the line's text.
fn line_spans(s: &str) -> Vec<(usize, usize, &str)> {
    let mut out = Vec::new();
    let mut pos = 0;
    for line in s.split('\n') {
        let start = pos;
        let end = start + line.len();
        out.push((start, end, line));
        pos = end + 1; // account for the '\n' consumed by split
    }
    out
}

fn windowed_line_match(haystack: &str, old_text: &str, transform: impl Fn(&str) -> String) -> Vec<ByteRange> {
    let old_lines: Vec<String> = old_text.lines().map(&transform).collect();
    if old_lines.is_empty() {
        return Vec::new();
    }
    let hay_lines = line_spans(haystack);
    if hay_lines.len() < old_lines.len() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for i in 0..=hay_lines.len() - old_lines.len() {
        let window = &hay_lines[i..i + old_lines.len()];
        if window.iter().map(|(_, _, l)| transform(l)).eq(old_lines.iter().cloned()) {
            out.push(ByteRange { start: window[0].0, end: window[window.len() - 1].1 });
        }
    }
    out
}

/// Strip the longest common leading whitespace prefix shared by every
/// non-blank line.
fn dedent(s: &str) -> String {
    let min_indent = s
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    s.lines()
        .map(|l| if l.len() >= min_indent { &l[min_indent..] } else { l.trim_start() })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply a single replacement of `old_text` with `new_text` in `haystack`,
/// using the five-strategy matcher. Replaces exactly the first (only)
/// unique match; never replaces more than once.
pub fn apply_edit(haystack: &str, old_text: &str, new_text: &str) -> Result<String, EditMatchError> {
    match find_unique_match(haystack, old_text) {
        Ok(Some(range)) => {
            let mut out = String::with_capacity(haystack.len() - (range.end - range.start) + new_text.len());
            out.push_str(&haystack[..range.start]);
            out.push_str(new_text);
            out.push_str(&haystack[range.end..]);
            Ok(out)
        }
        Ok(None) => Err(EditMatchError::NoMatch),
        Err(()) => Err(EditMatchError::NoMatch),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EditMatchError {
    #[error("no unique match for edit_code")]
    NoMatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_replaces_once() {
        let out = apply_edit("fn a() {}\nfn b() {}\n", "fn a() {}", "fn a() { 1 }").unwrap();
        assert_eq!(out, "fn a() { 1 }\nfn b() {}\n");
    }

    #[test]
    fn second_application_is_a_no_match_not_a_silent_noop() {
        let once = apply_edit("fn a() {}\n", "fn a() {}", "fn a() { 1 }").unwrap();
        let twice = apply_edit(&once, "fn a() {}", "fn a() { 1 }");
        assert!(matches!(twice, Err(EditMatchError::NoMatch)));
    }

    #[test]
    fn whitespace_normalized_strategy_tolerates_double_spaces() {
        let haystack = "if  x ==  1:\n    return\n";
        let old = "if x == 1:\n    return";
        let out = apply_edit(haystack, old, "if x == 2:\n    return").unwrap();
        assert_eq!(out, "if x == 2:\n    return\n");
    }

    #[test]
    fn line_trimmed_strategy_tolerates_trailing_whitespace() {
        let haystack = "line one   \nline two\n";
        let old = "line one\nline two";
        let out = apply_edit(haystack, old, "replaced").unwrap();
        assert_eq!(out, "replaced\n");
    }

    #[test]
    fn ambiguous_exact_match_fails_rather_than_guessing() {
        let haystack = "dup()\ndup()\n";
        let result = apply_edit(haystack, "dup()", "dup2()");
        assert!(matches!(result, Err(EditMatchError::NoMatch)));
    }

    #[test]
    fn block_anchor_strategy_tolerates_changed_middle_lines() {
        let haystack = "fn f() {\n    let x = 1;\n    let y = 2;\n}\n";
        let old = "fn f() {\n    let x = 999;\n}";
        let out = apply_edit(haystack, old, "fn f() {\n    let x = 3;\n}").unwrap();
        assert_eq!(out, "fn f() {\n    let x = 3;\n}\n");
    }

    #[test]
    fn no_match_when_nothing_resembles_old_text() {
        let result = apply_edit("totally different content\n", "fn a() {}", "fn a() { 1 }");
        assert!(matches!(result, Err(EditMatchError::NoMatch)));
    }
}
