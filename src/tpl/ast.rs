use crate::value::{Segment, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
}

/// `is defined`, `is not defined`, `is empty`, `is not empty`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Test {
    Defined,
    NotDefined,
    Empty,
    NotEmpty,
}

/// Variable reference such as `user.name`, `items.0` or `items[0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyPath {
    pub segments: Vec<Segment>,
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(k) if i == 0 => f.write_str(k)?,
                Segment::Key(k) => write!(f, ".{}", k)?,
                Segment::Index(n) => write!(f, ".{}", n)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    Path(PropertyPath),
    Binary(Op, Box<Expr>, Box<Expr>),
    Test(Box<Expr>, Test),
    /// `value | default(fallback)`
    Default(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Variable {
        path: PropertyPath,
        default: Option<Expr>,
        trim_left: bool,
        trim_right: bool,
    },
    If {
        /// Tried in order; a `None` condition is the `else` branch and is always last.
        branches: Vec<(Option<Expr>, Vec<Node>)>,
    },
    For {
        var: String,
        iterable: Expr,
        body: Vec<Node>,
    },
    Block {
        name: String,
        body: Arc<Vec<Node>>,
    },
    Extends {
        parent: String,
    },
    Include {
        template: String,
        with: Option<Vec<(String, Expr)>>,
    },
    Mixin {
        refs: Vec<String>,
    },
    Super,
}

/// A parsed template. Immutable once built and shared through the cache.
#[derive(Debug, Clone, Default)]
pub struct Template {
    pub nodes: Vec<Node>,
    pub extends: Option<String>,
    pub mixins: Vec<String>,
    /// Every block defined anywhere in this template, by name.
    pub blocks: BTreeMap<String, Arc<Vec<Node>>>,
}
