use crate::Result;
use crate::error::{Location, YaplError};
use crate::options::WhitespaceOptions;
use crate::tpl::ast::{Expr, Node, Template};
use crate::tpl::expr::{self, SyntaxError, VariableTag};
use crate::tpl::lexer::{self, Token, TokenKind};
use crate::tpl::whitespace;
use std::sync::Arc;

/// Represents an open construct while parsing nested directives.
///
/// When a start tag (like `{% if %}`) is encountered, a new frame is pushed
/// together with a fresh node list for its body. The matching end tag pops
/// both and appends the finished node to the enclosing list.
enum TagFrame {
    If {
        /// Branches already closed by an `elif` or `else`.
        branches: Vec<(Option<Expr>, Vec<Node>)>,
        /// Condition of the branch currently being filled, `None` for `else`.
        current: Option<Expr>,
        has_else: bool,
        offset: usize,
    },
    For {
        var: String,
        iterable: Expr,
        offset: usize,
    },
    Block {
        name: String,
        offset: usize,
    },
}

impl TagFrame {
    fn keyword(&self) -> &'static str {
        match self {
            TagFrame::If { .. } => "if",
            TagFrame::For { .. } => "for",
            TagFrame::Block { .. } => "block",
        }
    }

    fn offset(&self) -> usize {
        match self {
            TagFrame::If { offset, .. }
            | TagFrame::For { offset, .. }
            | TagFrame::Block { offset, .. } => *offset,
        }
    }
}

/// Builds a `Template` from the token stream.
///
/// The parser uses a stack-based approach to handle nested constructs, and
/// validates structure as it goes: `extends` must come first, blocks may
/// only be defined once, every opened construct must be closed.
struct Parser<'a> {
    /// The original template source, for error locations.
    source: &'a str,
    /// A stack of node collections. Each level corresponds to the body of a
    /// nested construct. The first element is always the root-level nodes.
    nodes_stack: Vec<Vec<Node>>,
    /// A stack of constructs being parsed.
    tag_stack: Vec<TagFrame>,
    template: Template,
    /// Set once anything other than comments or blank text was seen.
    seen_content: bool,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            nodes_stack: vec![Vec::new()],
            tag_stack: Vec::new(),
            template: Template::default(),
            seen_content: false,
        }
    }

    fn parse(mut self, tokens: Vec<Token>) -> Result<Template> {
        for token in tokens {
            match &token.kind {
                TokenKind::Text(text) => {
                    if !text.trim().is_empty() {
                        self.seen_content = true;
                    }
                    self.append_text(text);
                }
                TokenKind::Raw(text) => {
                    self.seen_content = true;
                    self.append_text(text);
                }
                TokenKind::Comment => {}
                TokenKind::Variable(content) => self.handle_variable(&token, content)?,
                TokenKind::Directive(content) => self.handle_directive(&token, content)?,
            }
        }

        // Report the innermost construct that was left open.
        if let Some(frame) = self.tag_stack.last() {
            return Err(YaplError::parse(
                self.source,
                frame.offset(),
                format!("unclosed '{}'", frame.keyword()),
            ));
        }

        self.template.nodes = self.nodes_stack.pop().unwrap_or_default();
        Ok(self.template)
    }

    fn handle_variable(&mut self, token: &Token, content: &str) -> Result<()> {
        self.seen_content = true;
        let base = self.content_offset(token, content);
        match expr::parse_variable(content).map_err(|e| self.syntax_error(base, e))? {
            VariableTag::Super => {
                if !self.in_block() {
                    return Err(YaplError::parse(
                        self.source,
                        token.span.start,
                        "super() is only allowed inside a block",
                    ));
                }
                self.append_node(Node::Super);
            }
            VariableTag::Path { path, default } => self.append_node(Node::Variable {
                path,
                default,
                trim_left: token.left_trim,
                trim_right: token.right_trim,
            }),
        }
        Ok(())
    }

    fn handle_directive(&mut self, token: &Token, content: &str) -> Result<()> {
        let (keyword, rest) = match content.find(char::is_whitespace) {
            Some(idx) => (&content[..idx], content[idx..].trim_start()),
            None => (content, ""),
        };
        let base = self.content_offset(token, content) + (content.len() - rest.len());
        let offset = token.span.start;

        if keyword != "extends" {
            self.seen_content = true;
        }

        match keyword {
            "extends" => self.handle_extends(offset, rest, base),
            "mixin" => self.handle_mixin(offset, rest, base),
            "block" => self.handle_block(offset, rest),
            "endblock" => self.handle_endblock(offset, rest),
            "if" => {
                let cond = self.parse_expr(rest, base)?;
                self.push_frame(TagFrame::If {
                    branches: Vec::new(),
                    current: Some(cond),
                    has_else: false,
                    offset,
                });
                Ok(())
            }
            "elif" => {
                let cond = self.parse_expr(rest, base)?;
                self.next_branch(offset, "elif", Some(cond))
            }
            "else" => {
                self.expect_no_args("else", rest, offset)?;
                self.next_branch(offset, "else", None)
            }
            "endif" => {
                self.expect_no_args("endif", rest, offset)?;
                let TagFrame::If {
                    mut branches,
                    current,
                    ..
                } = self.pop_frame(offset, "endif", "if")?
                else {
                    return Err(self.unexpected(offset, "endif"));
                };
                let body = self.nodes_stack.pop().unwrap_or_default();
                branches.push((current, body));
                self.append_node(Node::If { branches });
                Ok(())
            }
            "for" => {
                let (var, iterable) = expr::parse_for(rest).map_err(|e| self.syntax_error(base, e))?;
                self.push_frame(TagFrame::For {
                    var,
                    iterable,
                    offset,
                });
                Ok(())
            }
            "endfor" => {
                self.expect_no_args("endfor", rest, offset)?;
                let TagFrame::For { var, iterable, .. } = self.pop_frame(offset, "endfor", "for")?
                else {
                    return Err(self.unexpected(offset, "endfor"));
                };
                let body = self.nodes_stack.pop().unwrap_or_default();
                self.append_node(Node::For {
                    var,
                    iterable,
                    body,
                });
                Ok(())
            }
            "include" => {
                let (template, with) =
                    expr::parse_include(rest).map_err(|e| self.syntax_error(base, e))?;
                self.append_node(Node::Include { template, with });
                Ok(())
            }
            "" => Err(YaplError::parse(self.source, offset, "empty directive")),
            other => Err(YaplError::parse(
                self.source,
                offset,
                format!("unknown directive '{}'", other),
            )),
        }
    }

    fn handle_extends(&mut self, offset: usize, rest: &str, base: usize) -> Result<()> {
        if !self.tag_stack.is_empty() {
            return Err(YaplError::parse(
                self.source,
                offset,
                "extends is only allowed at the top level",
            ));
        }
        if self.seen_content || self.template.extends.is_some() {
            return Err(YaplError::parse(self.source, offset, "extends must be first"));
        }
        let parent = expr::parse_extends(rest).map_err(|e| self.syntax_error(base, e))?;
        self.template.extends = Some(parent.clone());
        self.append_node(Node::Extends { parent });
        self.seen_content = true;
        Ok(())
    }

    fn handle_mixin(&mut self, offset: usize, rest: &str, base: usize) -> Result<()> {
        if !self.tag_stack.is_empty() {
            return Err(YaplError::parse(
                self.source,
                offset,
                "mixin is only allowed at the top level",
            ));
        }
        if !self.template.mixins.is_empty() {
            return Err(YaplError::parse(
                self.source,
                offset,
                "duplicate mixin directive",
            ));
        }
        let refs = expr::parse_mixin(rest).map_err(|e| self.syntax_error(base, e))?;
        self.template.mixins = refs.clone();
        self.append_node(Node::Mixin { refs });
        Ok(())
    }

    fn handle_block(&mut self, offset: usize, name: &str) -> Result<()> {
        if !is_valid_block_name(name) {
            return Err(YaplError::parse(
                self.source,
                offset,
                format!("invalid block name '{}'", name),
            ));
        }
        let open = self
            .tag_stack
            .iter()
            .any(|f| matches!(f, TagFrame::Block { name: n, .. } if n == name));
        if open || self.template.blocks.contains_key(name) {
            return Err(YaplError::parse(
                self.source,
                offset,
                format!("duplicate block '{}'", name),
            ));
        }
        self.push_frame(TagFrame::Block {
            name: name.to_string(),
            offset,
        });
        Ok(())
    }

    fn handle_endblock(&mut self, offset: usize, rest: &str) -> Result<()> {
        if let Some(TagFrame::Block { name, .. }) = self.tag_stack.last()
            && !rest.is_empty()
            && rest != name
        {
            return Err(YaplError::parse(
                self.source,
                offset,
                format!("mismatched block name: expected '{}', got '{}'", name, rest),
            ));
        }
        let TagFrame::Block { name, .. } = self.pop_frame(offset, "endblock", "block")? else {
            return Err(self.unexpected(offset, "endblock"));
        };
        let body = Arc::new(self.nodes_stack.pop().unwrap_or_default());
        self.template.blocks.insert(name.clone(), body.clone());
        self.append_node(Node::Block { name, body });
        Ok(())
    }

    /// Closes the current `if` branch and starts the next one.
    fn next_branch(&mut self, offset: usize, keyword: &str, cond: Option<Expr>) -> Result<()> {
        let body = match self.tag_stack.last() {
            Some(TagFrame::If { has_else: true, .. }) => {
                return Err(YaplError::parse(
                    self.source,
                    offset,
                    format!("'{}' after 'else'", keyword),
                ));
            }
            Some(TagFrame::If { .. }) => self.nodes_stack.pop().unwrap_or_default(),
            _ => {
                return Err(YaplError::parse(
                    self.source,
                    offset,
                    format!("'{}' outside of 'if'", keyword),
                ));
            }
        };

        if let Some(TagFrame::If {
            branches,
            current,
            has_else,
            ..
        }) = self.tag_stack.last_mut()
        {
            let finished = std::mem::replace(current, cond);
            branches.push((finished, body));
            *has_else = current.is_none();
        }
        self.nodes_stack.push(Vec::new());
        Ok(())
    }

    fn push_frame(&mut self, frame: TagFrame) {
        self.tag_stack.push(frame);
        self.nodes_stack.push(Vec::new());
    }

    /// Pops the innermost frame, which must have been opened by `opener`.
    fn pop_frame(&mut self, offset: usize, closer: &str, opener: &str) -> Result<TagFrame> {
        let open = self.tag_stack.last().map(|f| (f.keyword(), f.offset()));
        match open {
            Some((keyword, _)) if keyword == opener => self
                .tag_stack
                .pop()
                .ok_or_else(|| self.unexpected(offset, closer)),
            Some((keyword, at)) => Err(YaplError::parse(
                self.source,
                offset,
                format!(
                    "unexpected '{}', '{}' opened at {} is still open",
                    closer,
                    keyword,
                    Location::locate(self.source, at)
                ),
            )),
            None => Err(self.unexpected(offset, closer)),
        }
    }

    fn unexpected(&self, offset: usize, closer: &str) -> YaplError {
        YaplError::parse(self.source, offset, format!("unexpected '{}'", closer))
    }

    fn expect_no_args(&self, keyword: &str, rest: &str, offset: usize) -> Result<()> {
        if rest.is_empty() {
            Ok(())
        } else {
            Err(YaplError::parse(
                self.source,
                offset,
                format!("'{}' takes no arguments", keyword),
            ))
        }
    }

    fn in_block(&self) -> bool {
        self.tag_stack
            .iter()
            .any(|f| matches!(f, TagFrame::Block { .. }))
    }

    fn parse_expr(&self, input: &str, base: usize) -> Result<Expr> {
        expr::parse_expr(input).map_err(|e| self.syntax_error(base, e))
    }

    fn syntax_error(&self, base: usize, err: SyntaxError) -> YaplError {
        YaplError::parse(self.source, base + err.offset, err.message)
    }

    /// Absolute offset of a tag's trimmed content.
    fn content_offset(&self, token: &Token, content: &str) -> usize {
        let tag = &self.source[token.span.start..token.span.end];
        token.span.start + tag.find(content).unwrap_or(0)
    }

    fn append_node(&mut self, node: Node) {
        if let Some(nodes) = self.nodes_stack.last_mut() {
            nodes.push(node);
        }
    }

    /// Appends text, merging with a directly preceding text node.
    fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(nodes) = self.nodes_stack.last_mut() {
            if let Some(Node::Text(last)) = nodes.last_mut() {
                last.push_str(text);
            } else {
                nodes.push(Node::Text(text.to_string()));
            }
        }
    }
}

fn is_valid_block_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '-'))
}

/// Tokenizes, applies the whitespace rules and builds the node tree.
pub fn parse(source: &str, whitespace: &WhitespaceOptions) -> Result<Template> {
    let mut tokens = lexer::tokenize(source)?;
    whitespace::apply(&mut tokens, whitespace);
    Parser::new(source).parse(tokens)
}
