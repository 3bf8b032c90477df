use crate::Result;
use crate::error::YaplError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Text(String),
    Comment,
    /// Inner content of `{{ ... }}`, trimmed.
    Variable(String),
    /// Inner content of `{% ... %}`, trimmed.
    Directive(String),
    /// Body of a `{% raw %}...{% endraw %}` section.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// `-` right after the opening delimiter.
    pub left_trim: bool,
    /// `-` right before the closing delimiter.
    pub right_trim: bool,
}

impl Token {
    pub fn is_directive(&self) -> bool {
        matches!(self.kind, TokenKind::Directive(_) | TokenKind::Raw(_))
    }
}

#[derive(Clone, Copy)]
enum TagKind {
    Comment,
    Variable,
    Directive,
}

impl TagKind {
    fn close(self) -> &'static str {
        match self {
            TagKind::Comment => "#}",
            TagKind::Variable => "}}",
            TagKind::Directive => "%}",
        }
    }

    fn name(self) -> &'static str {
        match self {
            TagKind::Comment => "comment",
            TagKind::Variable => "variable tag",
            TagKind::Directive => "directive tag",
        }
    }
}

/// Single forward pass over template source, yielding tokens lazily.
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            failed: false,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        let rest = self.remaining();
        if rest.is_empty() {
            return Ok(None);
        }

        match find_tag_open(rest) {
            Some((0, kind)) => self.lex_tag(kind).map(Some),
            Some((idx, _)) => Ok(Some(self.lex_text(idx))),
            None => Ok(Some(self.lex_text(rest.len()))),
        }
    }

    fn lex_text(&mut self, len: usize) -> Token {
        let start = self.pos;
        self.pos += len;
        Token {
            kind: TokenKind::Text(self.source[start..self.pos].to_string()),
            span: Span {
                start,
                end: self.pos,
            },
            left_trim: false,
            right_trim: false,
        }
    }

    fn lex_tag(&mut self, kind: TagKind) -> Result<Token> {
        let start = self.pos;
        let (inner_start, inner_end, end, left_trim, right_trim) = self.scan_tag(start, kind)?;
        self.pos = end;

        let inner = self.source[inner_start..inner_end].trim().to_string();
        let kind = match kind {
            TagKind::Comment => TokenKind::Comment,
            TagKind::Variable => TokenKind::Variable(inner),
            TagKind::Directive if inner == "raw" => return self.lex_raw(start, left_trim),
            TagKind::Directive => TokenKind::Directive(inner),
        };

        Ok(Token {
            kind,
            span: Span { start, end },
            left_trim,
            right_trim,
        })
    }

    /// Scans one tag starting at `start`. Returns the inner content range,
    /// the offset just past the closing delimiter and both trim flags.
    fn scan_tag(&self, start: usize, kind: TagKind) -> Result<(usize, usize, usize, bool, bool)> {
        let close = kind.close();
        let mut inner_start = start + 2;
        let left_trim = self.source[inner_start..].starts_with('-');
        if left_trim {
            inner_start += 1;
        }

        let body = &self.source[inner_start..];
        let close_idx = match kind {
            TagKind::Comment => body.find(close),
            TagKind::Variable | TagKind::Directive => find_close_outside_quotes(body, close),
        }
        .ok_or_else(|| {
            YaplError::lex(
                self.source,
                start,
                format!("unterminated {} (missing '{}')", kind.name(), close),
            )
        })?;

        let mut inner_end = inner_start + close_idx;
        let right_trim = close_idx > 0 && body[..close_idx].ends_with('-');
        if right_trim {
            inner_end -= 1;
        }

        Ok((inner_start, inner_end, inner_start + close_idx + close.len(), left_trim, right_trim))
    }

    /// Everything up to the matching `{% endraw %}` is emitted verbatim.
    fn lex_raw(&mut self, start: usize, left_trim: bool) -> Result<Token> {
        let body_start = self.pos;
        let mut search = body_start;

        while let Some(rel) = self.source[search..].find("{%") {
            let tag_start = search + rel;
            let Ok((inner_start, inner_end, end, _, right_trim)) =
                self.scan_tag(tag_start, TagKind::Directive)
            else {
                break;
            };
            if self.source[inner_start..inner_end].trim() == "endraw" {
                self.pos = end;
                return Ok(Token {
                    kind: TokenKind::Raw(self.source[body_start..tag_start].to_string()),
                    span: Span { start, end },
                    left_trim,
                    right_trim,
                });
            }
            search = tag_start + 2;
        }

        Err(YaplError::lex(
            self.source,
            start,
            "unterminated raw section (missing '{% endraw %}')",
        ))
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_token() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Tokenizes the whole source.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).collect()
}

fn find_tag_open(s: &str) -> Option<(usize, TagKind)> {
    let bytes = s.as_bytes();
    let mut from = 0;
    while let Some(rel) = s[from..].find('{') {
        let idx = from + rel;
        match bytes.get(idx + 1) {
            Some(b'{') => return Some((idx, TagKind::Variable)),
            Some(b'%') => return Some((idx, TagKind::Directive)),
            Some(b'#') => return Some((idx, TagKind::Comment)),
            _ => from = idx + 1,
        }
    }
    None
}

/// Finds `close` in `s`, skipping over single- or double-quoted strings.
/// Inside a string only the quote character itself can be escaped.
fn find_close_outside_quotes(s: &str, close: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match quote {
            Some(q) => {
                if c == '\\' && chars.peek().is_some_and(|&(_, n)| n == q) {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                } else if s[i..].starts_with(close) {
                    return Some(i);
                }
            }
        }
    }
    None
}
