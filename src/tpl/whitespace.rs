use crate::options::WhitespaceOptions;
use crate::tpl::lexer::{Token, TokenKind};

/// Applies trim flags, `trim_blocks` and `lstrip_blocks` to the text tokens
/// around each tag, in that order of precedence.
///
/// An explicit `-` on one side of a tag always wins, and the block rules are
/// never applied to that side. Only `{% %}` tags (and raw sections) are
/// subject to the block rules.
pub fn apply(tokens: &mut [Token], opts: &WhitespaceOptions) {
    // Decided on the untouched source so earlier edits cannot change
    // whether a tag starts its line.
    let line_start: Vec<bool> = tokens
        .iter()
        .enumerate()
        .map(|(i, token)| match &token.kind {
            TokenKind::Text(text) => ends_on_blank_line(text, i == 0),
            _ => false,
        })
        .collect();

    for i in 0..tokens.len() {
        if matches!(tokens[i].kind, TokenKind::Text(_)) {
            continue;
        }
        let left_trim = tokens[i].left_trim;
        let right_trim = tokens[i].right_trim;
        let block = tokens[i].is_directive();

        if i > 0
            && let TokenKind::Text(prev) = &mut tokens[i - 1].kind
        {
            if left_trim {
                trim_end_line(prev);
            } else if block && opts.lstrip_blocks && line_start[i - 1] {
                let keep = prev.trim_end_matches([' ', '\t']).len();
                prev.truncate(keep);
            }
        }

        if let Some(TokenKind::Text(next)) = tokens.get_mut(i + 1).map(|t| &mut t.kind) {
            if right_trim {
                trim_start_line(next);
            } else if block && opts.trim_blocks {
                strip_newline_start(next);
            }
        }
    }
}

/// True when everything after the last newline is horizontal whitespace and
/// that line really starts a line (after a newline, or at offset 0).
fn ends_on_blank_line(text: &str, at_template_start: bool) -> bool {
    let (tail, has_newline) = match text.rfind('\n') {
        Some(idx) => (&text[idx + 1..], true),
        None => (text, false),
    };
    (has_newline || at_template_start) && tail.chars().all(|c| c == ' ' || c == '\t')
}

fn trim_end_line(text: &mut String) {
    let mut keep = text.trim_end_matches([' ', '\t']).len();
    if text[..keep].ends_with("\r\n") {
        keep -= 2;
    } else if text[..keep].ends_with('\n') {
        keep -= 1;
    }
    text.truncate(keep);
}

fn trim_start_line(text: &mut String) {
    let skip = text.len() - text.trim_start_matches([' ', '\t']).len();
    text.drain(..skip);
    strip_newline_start(text);
}

fn strip_newline_start(text: &mut String) {
    if text.starts_with("\r\n") {
        text.drain(..2);
    } else if text.starts_with('\n') {
        text.drain(..1);
    }
}

/// A byte offset where text is spliced in after dedenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hole {
    pub at: usize,
    /// Counts as content on its line and ends that line's indent
    /// (`super()`). A hole that is not content leaves a line that holds
    /// nothing else blank (nested block output, dedented on its own).
    pub is_content: bool,
}

/// Removes the common leading whitespace of all non-blank lines.
///
/// Hole offsets are rewritten in place to match the returned text.
pub fn dedent(text: &str, holes: &mut [Hole]) -> String {
    let lines = line_spans(text);

    let mut prefix: Option<&str> = None;
    for &(start, end) in &lines {
        let line = &text[start..end];
        let mut indent = leading_ws(line);
        let anchor = holes
            .iter()
            .filter(|h| h.is_content && h.at >= start && h.at <= end)
            .map(|h| h.at)
            .min();
        match anchor {
            Some(h) => indent = indent.min(h - start),
            None if line.trim().is_empty() => continue,
            None => {}
        }
        let current = &line[..indent];
        prefix = Some(match prefix {
            None => current,
            Some(p) => &p[..common_len(p, current)],
        });
    }

    let prefix = match prefix {
        Some(p) if !p.is_empty() => p,
        _ => return text.to_string(),
    };

    let mut out = String::with_capacity(text.len());
    let mut removed = 0;
    for &(start, end) in &lines {
        let line = &text[start..end];
        let cut = common_len(prefix, &line[..leading_ws(line)]);

        for h in holes.iter_mut().filter(|h| h.at >= start && h.at <= end) {
            h.at = h.at - removed - cut.min(h.at - start);
        }

        out.push_str(&line[cut..]);
        if end < text.len() {
            out.push('\n');
        }
        removed += cut;
    }
    out
}

/// `(start, end)` of every line, `end` excluding the newline.
fn line_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices('\n') {
        spans.push((start, idx));
        start = idx + 1;
    }
    spans.push((start, text.len()));
    spans
}

fn leading_ws(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

fn common_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}
