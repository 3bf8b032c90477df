//! Tokenizer and recursive-descent parser for the expression language used
//! inside tags.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or      := and ("or" and)*
//! and     := cmp ("and" cmp)*
//! cmp     := test (("==" | "!=" | ">=" | "<=" | ">" | "<") test)?
//! test    := pipe ("is" "not"? ("defined" | "empty"))?
//! pipe    := primary ("|" "default" "(" or ")")*
//! primary := string | number | true | false | null | list | path | "(" or ")"
//! ```

use crate::tpl::ast::{Expr, Op, PropertyPath, Test};
use crate::value::{Segment, Value};

/// Syntax problem inside a tag. `offset` is relative to the tag content.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
}

impl SyntaxError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

type PResult<T> = Result<T, SyntaxError>;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Op(Op),
    Minus,
    Dot,
    Comma,
    Colon,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

fn tokenize(input: &str) -> PResult<Vec<(Tok, usize)>> {
    let mut out = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < input.len() {
        let c = input[i..].chars().next().unwrap_or(' ');
        if c.is_whitespace() {
            i += c.len_utf8();
            continue;
        }

        let start = i;
        let two = input.get(i..i + 2).unwrap_or("");
        let tok = match two {
            "==" => Some(Tok::Op(Op::Eq)),
            "!=" => Some(Tok::Op(Op::Ne)),
            ">=" => Some(Tok::Op(Op::Ge)),
            "<=" => Some(Tok::Op(Op::Le)),
            _ => None,
        };
        if let Some(tok) = tok {
            out.push((tok, start));
            i += 2;
            continue;
        }

        let single = match c {
            '>' => Some(Tok::Op(Op::Gt)),
            '<' => Some(Tok::Op(Op::Lt)),
            '-' => Some(Tok::Minus),
            '.' => Some(Tok::Dot),
            ',' => Some(Tok::Comma),
            ':' => Some(Tok::Colon),
            '|' => Some(Tok::Pipe),
            '(' => Some(Tok::LParen),
            ')' => Some(Tok::RParen),
            '[' => Some(Tok::LBracket),
            ']' => Some(Tok::RBracket),
            '{' => Some(Tok::LBrace),
            '}' => Some(Tok::RBrace),
            _ => None,
        };
        if let Some(tok) = single {
            out.push((tok, start));
            i += 1;
            continue;
        }

        if c == '"' || c == '\'' {
            let (s, len) = lex_string(&input[i..], c)
                .ok_or_else(|| SyntaxError::new("unterminated string literal", start))?;
            out.push((Tok::Str(s), start));
            i += len;
            continue;
        }

        if c.is_ascii_digit() {
            let mut end = i;
            let mut seen_dot = false;
            while end < input.len() {
                let b = bytes[end];
                // A dot only belongs to the number when a digit follows, so
                // `items.0.name` still splits into path segments.
                if b == b'.'
                    && !seen_dot
                    && bytes.get(end + 1).is_some_and(|n| n.is_ascii_digit())
                    && !matches!(out.last(), Some((Tok::Dot, _)))
                {
                    seen_dot = true;
                    end += 1;
                } else if b.is_ascii_digit() {
                    end += 1;
                } else {
                    break;
                }
            }
            let text = &input[i..end];
            let tok = if seen_dot {
                text.parse::<f64>().map(Tok::Float).map_err(|_| ())
            } else {
                text.parse::<i64>().map(Tok::Int).map_err(|_| ())
            }
            .map_err(|_| SyntaxError::new(format!("invalid number '{}'", text), start))?;
            out.push((tok, start));
            i = end;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let len: usize = input[i..]
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .map(char::len_utf8)
                .sum();
            out.push((Tok::Ident(input[i..i + len].to_string()), start));
            i += len;
            continue;
        }

        return Err(SyntaxError::new(format!("unexpected character '{}'", c), start));
    }

    Ok(out)
}

/// Reads a quoted literal starting at `s[0]`. Returns the unescaped string
/// and the number of bytes consumed including both quotes.
fn lex_string(s: &str, quote: char) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut chars = s.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\\' && chars.peek().is_some_and(|&(_, n)| n == quote) {
            chars.next();
            value.push(quote);
        } else if c == quote {
            return Some((value, i + c.len_utf8()));
        } else {
            value.push(c);
        }
    }
    None
}

struct ExprParser {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
    len: usize,
}

impl ExprParser {
    fn new(input: &str) -> PResult<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
            len: input.len(),
        })
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(self.len)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(s)) if s == kw)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> PResult<()> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.offset())
    }

    fn finish(&self) -> PResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(self.error(format!("unexpected {}", describe(tok)))),
        }
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_and()?;
        while self.at_keyword("or") {
            self.pos += 1;
            let right = self.parse_and()?;
            expr = Expr::Binary(Op::Or, Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_cmp()?;
        while self.at_keyword("and") {
            self.pos += 1;
            let right = self.parse_cmp()?;
            expr = Expr::Binary(Op::And, Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_cmp(&mut self) -> PResult<Expr> {
        let left = self.parse_test()?;
        if let Some(Tok::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_test()?;
            return Ok(Expr::Binary(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_test(&mut self) -> PResult<Expr> {
        let expr = self.parse_pipe()?;
        if !self.at_keyword("is") {
            return Ok(expr);
        }
        self.pos += 1;
        let negated = self.at_keyword("not");
        if negated {
            self.pos += 1;
        }
        let test = match (self.next(), negated) {
            (Some(Tok::Ident(t)), false) if t == "defined" => Test::Defined,
            (Some(Tok::Ident(t)), true) if t == "defined" => Test::NotDefined,
            (Some(Tok::Ident(t)), false) if t == "empty" => Test::Empty,
            (Some(Tok::Ident(t)), true) if t == "empty" => Test::NotEmpty,
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.error("expected 'defined' or 'empty' after 'is'"));
            }
        };
        Ok(Expr::Test(Box::new(expr), test))
    }

    fn parse_pipe(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        while self.eat(&Tok::Pipe) {
            let at = self.offset();
            match self.next() {
                Some(Tok::Ident(name)) if name == "default" => {
                    self.expect(Tok::LParen, "'(' after default")?;
                    if self.peek() == Some(&Tok::RParen) {
                        return Err(self.error("default() takes exactly one argument"));
                    }
                    let fallback = self.parse_or()?;
                    self.expect(Tok::RParen, "')' to close default(")?;
                    expr = Expr::Default(Box::new(expr), Box::new(fallback));
                }
                Some(Tok::Ident(name)) => {
                    return Err(SyntaxError::new(format!("unsupported filter: {}", name), at));
                }
                _ => return Err(SyntaxError::new("expected filter name after '|'", at)),
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let at = self.offset();
        match self.next() {
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Tok::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Tok::Float(n)) => Ok(Expr::Literal(Value::Float(n))),
            Some(Tok::Minus) => match self.next() {
                Some(Tok::Int(n)) => Ok(Expr::Literal(Value::Int(-n))),
                Some(Tok::Float(n)) => Ok(Expr::Literal(Value::Float(-n))),
                _ => Err(SyntaxError::new("expected number after '-'", at)),
            },
            Some(Tok::LParen) => {
                let expr = self.parse_or()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(expr)
            }
            Some(Tok::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Tok::RBracket) {
                    loop {
                        items.push(self.parse_or()?);
                        if self.eat(&Tok::RBracket) {
                            break;
                        }
                        self.expect(Tok::Comma, "',' or ']' in list")?;
                    }
                }
                Ok(Expr::List(items))
            }
            Some(Tok::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "none" => Ok(Expr::Literal(Value::Null)),
                "not" => Err(SyntaxError::new(
                    "'not' is not supported; use 'is not defined', 'is not empty' or '!='",
                    at,
                )),
                "and" | "or" | "is" => {
                    Err(SyntaxError::new(format!("unexpected keyword '{}'", name), at))
                }
                _ => self.parse_path_rest(name).map(Expr::Path),
            },
            Some(tok) => Err(SyntaxError::new(format!("unexpected {}", describe(&tok)), at)),
            None => Err(SyntaxError::new("expected an expression", at)),
        }
    }

    fn parse_path_rest(&mut self, head: String) -> PResult<PropertyPath> {
        let mut segments = vec![Segment::Key(head)];
        loop {
            if self.eat(&Tok::Dot) {
                let at = self.offset();
                match self.next() {
                    Some(Tok::Ident(k)) => segments.push(Segment::Key(k)),
                    Some(Tok::Int(n)) if n >= 0 => segments.push(Segment::Index(n as usize)),
                    _ => return Err(SyntaxError::new("expected property name after '.'", at)),
                }
            } else if self.eat(&Tok::LBracket) {
                let at = self.offset();
                match self.next() {
                    Some(Tok::Int(n)) if n >= 0 => segments.push(Segment::Index(n as usize)),
                    Some(Tok::Str(k)) => segments.push(Segment::Key(k)),
                    _ => return Err(SyntaxError::new("expected index or quoted key in '[...]'", at)),
                }
                self.expect(Tok::RBracket, "']'")?;
            } else {
                return Ok(PropertyPath { segments });
            }
        }
    }

    fn parse_string(&mut self, what: &str) -> PResult<String> {
        let at = self.offset();
        match self.next() {
            Some(Tok::Str(s)) => Ok(s),
            _ => Err(SyntaxError::new(format!("expected quoted {}", what), at)),
        }
    }

    fn parse_ident(&mut self, what: &str) -> PResult<String> {
        let at = self.offset();
        match self.next() {
            Some(Tok::Ident(s)) => Ok(s),
            _ => Err(SyntaxError::new(format!("expected {}", what), at)),
        }
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Ident(s) => format!("'{}'", s),
        Tok::Str(s) => format!("string \"{}\"", s),
        Tok::Int(n) => format!("number {}", n),
        Tok::Float(n) => format!("number {}", n),
        Tok::Op(op) => format!("operator {:?}", op),
        other => format!("{:?}", other),
    }
}

/// Parses a full condition or value expression.
pub fn parse_expr(input: &str) -> PResult<Expr> {
    let mut p = ExprParser::new(input)?;
    let expr = p.parse_or()?;
    p.finish()?;
    Ok(expr)
}

/// Content of a `{{ ... }}` tag.
#[derive(Debug)]
pub enum VariableTag {
    Super,
    Path {
        path: PropertyPath,
        default: Option<Expr>,
    },
}

pub fn parse_variable(input: &str) -> PResult<VariableTag> {
    let mut p = ExprParser::new(input)?;
    if p.at_keyword("super") && p.tokens.get(1).map(|(t, _)| t) == Some(&Tok::LParen) {
        p.pos += 2;
        p.expect(Tok::RParen, "')' after super(")?;
        p.finish()?;
        return Ok(VariableTag::Super);
    }

    let at = p.offset();
    let tag = match p.parse_pipe()? {
        Expr::Path(path) => VariableTag::Path { path, default: None },
        Expr::Default(inner, fallback) => match *inner {
            Expr::Path(path) => VariableTag::Path {
                path,
                default: Some(*fallback),
            },
            _ => return Err(SyntaxError::new("expected variable path", at)),
        },
        _ => return Err(SyntaxError::new("expected variable path", at)),
    };
    p.finish()?;
    Ok(tag)
}

/// `VAR in ITERABLE`
pub fn parse_for(input: &str) -> PResult<(String, Expr)> {
    let mut p = ExprParser::new(input)?;
    let var = p.parse_ident("loop variable name")?;
    if !p.at_keyword("in") {
        return Err(p.error("expected 'in' after loop variable"));
    }
    p.pos += 1;
    let iterable = p.parse_or()?;
    p.finish()?;
    Ok((var, iterable))
}

/// `"ref" [with { key: expr, ... }]`
pub fn parse_include(input: &str) -> PResult<(String, Option<Vec<(String, Expr)>>)> {
    let mut p = ExprParser::new(input)?;
    let template = p.parse_string("template path")?;
    if !p.at_keyword("with") {
        p.finish()?;
        return Ok((template, None));
    }
    p.pos += 1;
    p.expect(Tok::LBrace, "'{' after with")?;

    let mut entries: Vec<(String, Expr)> = Vec::new();
    if !p.eat(&Tok::RBrace) {
        loop {
            let at = p.offset();
            let key = match p.next() {
                Some(Tok::Ident(k)) | Some(Tok::Str(k)) => k,
                _ => return Err(SyntaxError::new("expected key in with-object", at)),
            };
            p.expect(Tok::Colon, "':' after key")?;
            let value = p.parse_or()?;
            // Later duplicates win, like an object literal.
            entries.retain(|(k, _)| *k != key);
            entries.push((key, value));
            if p.eat(&Tok::RBrace) {
                break;
            }
            p.expect(Tok::Comma, "',' or '}' in with-object")?;
        }
    }
    p.finish()?;
    Ok((template, Some(entries)))
}

/// `"a", "b", ...`
pub fn parse_mixin(input: &str) -> PResult<Vec<String>> {
    let mut p = ExprParser::new(input)?;
    let mut refs = vec![p.parse_string("mixin path")?];
    while p.eat(&Tok::Comma) {
        refs.push(p.parse_string("mixin path")?);
    }
    p.finish()?;
    Ok(refs)
}

/// `"ref"`
pub fn parse_extends(input: &str) -> PResult<String> {
    let mut p = ExprParser::new(input)?;
    let parent = p.parse_string("template path")?;
    p.finish()?;
    Ok(parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Expr {
        Expr::Path(PropertyPath {
            segments: parts.iter().map(|p| Segment::Key(p.to_string())).collect(),
        })
    }

    #[test]
    fn test_precedence_or_binds_loosest() {
        let expr = parse_expr("a == 1 and b or c").unwrap();
        match expr {
            Expr::Binary(Op::Or, left, right) => {
                assert!(matches!(*left, Expr::Binary(Op::And, _, _)));
                assert_eq!(*right, path(&["c"]));
            }
            other => panic!("Expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_comparison_operators() {
        for (src, op) in [
            ("a == b", Op::Eq),
            ("a != b", Op::Ne),
            ("a >= b", Op::Ge),
            ("a <= b", Op::Le),
            ("a > b", Op::Gt),
            ("a < b", Op::Lt),
        ] {
            match parse_expr(src).unwrap() {
                Expr::Binary(got, _, _) => assert_eq!(got, op, "{}", src),
                other => panic!("Expected Binary for {}, got {:?}", src, other),
            }
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_expr("'x'").unwrap(), Expr::Literal(Value::from("x")));
        assert_eq!(parse_expr("42").unwrap(), Expr::Literal(Value::Int(42)));
        assert_eq!(parse_expr("-1.5").unwrap(), Expr::Literal(Value::Float(-1.5)));
        assert_eq!(parse_expr("null").unwrap(), Expr::Literal(Value::Null));
        assert_eq!(
            parse_expr("[1, 'a']").unwrap(),
            Expr::List(vec![
                Expr::Literal(Value::Int(1)),
                Expr::Literal(Value::from("a"))
            ])
        );
    }

    #[test]
    fn test_paths() {
        let expr = parse_expr("items.0.name").unwrap();
        assert_eq!(
            expr,
            Expr::Path(PropertyPath {
                segments: vec![
                    Segment::Key("items".into()),
                    Segment::Index(0),
                    Segment::Key("name".into()),
                ]
            })
        );
        let expr = parse_expr(r#"m["odd key"][2]"#).unwrap();
        assert_eq!(
            expr,
            Expr::Path(PropertyPath {
                segments: vec![
                    Segment::Key("m".into()),
                    Segment::Key("odd key".into()),
                    Segment::Index(2),
                ]
            })
        );
    }

    #[test]
    fn test_tests() {
        assert_eq!(
            parse_expr("x is defined").unwrap(),
            Expr::Test(Box::new(path(&["x"])), Test::Defined)
        );
        assert_eq!(
            parse_expr("x is not empty").unwrap(),
            Expr::Test(Box::new(path(&["x"])), Test::NotEmpty)
        );
        assert!(parse_expr("x is big").is_err());
    }

    #[test]
    fn test_not_is_rejected() {
        let err = parse_expr("not x").unwrap_err();
        assert!(err.message.contains("'not' is not supported"));
    }

    #[test]
    fn test_unsupported_filter() {
        let err = parse_variable("name | upper").unwrap_err();
        assert_eq!(err.message, "unsupported filter: upper");
        assert_eq!(err.offset, 7);
    }

    #[test]
    fn test_variable_with_default() {
        match parse_variable(r#"user.name | default("anon")"#).unwrap() {
            VariableTag::Path { path, default } => {
                assert_eq!(path.to_string(), "user.name");
                assert_eq!(default, Some(Expr::Literal(Value::from("anon"))));
            }
            VariableTag::Super => panic!("Expected Path"),
        }
        assert!(matches!(parse_variable("super()").unwrap(), VariableTag::Super));
        assert!(parse_variable("'literal'").is_err());
    }

    #[test]
    fn test_for_header() {
        let (var, iterable) = parse_for("item in [1, 2]").unwrap();
        assert_eq!(var, "item");
        assert!(matches!(iterable, Expr::List(_)));
        assert!(parse_for("item of items").is_err());
    }

    #[test]
    fn test_include_with() {
        let (template, with) =
            parse_include(r#""partials/greeting" with { name: user.name, "tone": 'warm', n: 3 }"#)
                .unwrap();
        assert_eq!(template, "partials/greeting");
        let with = with.unwrap();
        assert_eq!(with.len(), 3);
        assert_eq!(with[0].0, "name");
        assert_eq!(with[1], ("tone".to_string(), Expr::Literal(Value::from("warm"))));
        assert_eq!(with[2], ("n".to_string(), Expr::Literal(Value::Int(3))));

        let (_, none) = parse_include("'footer'").unwrap();
        assert!(none.is_none());
        assert!(parse_include("footer").is_err());
    }

    #[test]
    fn test_mixin_list() {
        assert_eq!(
            parse_mixin(r#""a.yapl", 'b'"#).unwrap(),
            vec!["a.yapl".to_string(), "b".to_string()]
        );
        assert!(parse_mixin(r#""a" "b""#).is_err());
    }

    #[test]
    fn test_escaped_quote_in_string() {
        assert_eq!(
            parse_expr(r#""say \"hi\"""#).unwrap(),
            Expr::Literal(Value::from(r#"say "hi""#))
        );
    }
}
