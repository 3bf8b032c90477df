use crate::tpl::ast::PropertyPath;
use crate::value::{Segment, UNDEFINED, Value};
use std::collections::BTreeMap;

enum Frame<'a> {
    /// Variables handed to the render call.
    Root(&'a Value),
    /// A `for` loop variable.
    Local(&'a str, &'a Value),
    /// The evaluated `with` map of an include.
    Owned(BTreeMap<String, Value>),
}

/// Variable environment. A child scope holds a read-only reference to its
/// parent and never mutates it; lookups walk from the innermost frame out.
pub struct Scope<'a> {
    frame: Frame<'a>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    pub fn root(vars: &'a Value) -> Self {
        Self {
            frame: Frame::Root(vars),
            parent: None,
        }
    }

    /// Binds a single loop variable on top of this scope.
    pub fn with_local<'b>(&'b self, name: &'b str, value: &'b Value) -> Scope<'b> {
        Scope {
            frame: Frame::Local(name, value),
            parent: Some(self),
        }
    }

    /// Overlays `vars` on this scope; entries in `vars` take precedence.
    pub fn with_vars<'b>(&'b self, vars: BTreeMap<String, Value>) -> Scope<'b> {
        Scope {
            frame: Frame::Owned(vars),
            parent: Some(self),
        }
    }

    /// Resolves a path. Never fails: a missing name or segment yields
    /// `Value::Undefined`.
    pub fn lookup(&self, path: &PropertyPath) -> &Value {
        let Some((Segment::Key(name), rest)) = path.segments.split_first() else {
            return &UNDEFINED;
        };
        match self.find(name) {
            Some(value) => value.get_path(rest),
            None => &UNDEFINED,
        }
    }

    fn find(&self, name: &str) -> Option<&Value> {
        let mut current = Some(self);
        while let Some(scope) = current {
            let hit = match &scope.frame {
                Frame::Root(Value::Map(vars)) => vars.get(name),
                Frame::Root(_) => None,
                Frame::Local(n, v) => (*n == name).then_some(*v),
                Frame::Owned(map) => map.get(name),
            };
            if hit.is_some() {
                return hit;
            }
            current = scope.parent;
        }
        None
    }
}
