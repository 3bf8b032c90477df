use crate::Result;
use crate::engine::Engine;
use crate::error::YaplError;
use crate::tpl::ast::Node;
use crate::tpl::compose::{self, BlockDef, Composed, Layer};
use crate::tpl::eval;
use crate::tpl::scope::Scope;
use crate::tpl::whitespace::Hole;
use crate::value::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Text produced so far, plus the places where more text goes in once
/// this layer's text is final.
#[derive(Debug, Default)]
pub(crate) struct Output {
    pub text: String,
    pub splices: Vec<Splice>,
}

#[derive(Debug)]
pub(crate) struct Splice {
    pub hole: Hole,
    /// `None` for `super()`, otherwise the output of a nested block.
    pub fill: Option<String>,
}

impl Output {
    fn splice(&mut self, fill: Option<String>) {
        let hole = Hole {
            at: self.text.len(),
            is_content: fill.is_none(),
        };
        self.splices.push(Splice { hole, fill });
    }
}

/// Where the nodes being rendered were defined.
#[derive(Clone, Copy)]
struct Site<'a> {
    dir: &'a Path,
    depth: usize,
    composed: &'a Composed,
}

/// State of a single render call: the engine it runs against and every
/// template file it touched, in first-touch order.
pub(crate) struct Renderer<'e> {
    engine: &'e Engine,
    used_files: Vec<PathBuf>,
}

impl<'e> Renderer<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            used_files: Vec::new(),
        }
    }

    pub fn into_used_files(self) -> Vec<PathBuf> {
        self.used_files
    }

    /// Follows one reference. `depth` is the depth of the template being
    /// loaded; the check happens before the path is resolved or read.
    pub(crate) async fn load(
        &mut self,
        template_ref: &str,
        from_dir: &Path,
        depth: usize,
    ) -> Result<Layer> {
        if depth > self.engine.options().max_depth {
            return Err(YaplError::MaxDepthExceeded(format!(
                "\"{}\" at depth {} (max {})",
                template_ref,
                depth,
                self.engine.options().max_depth
            )));
        }
        let path = self.engine.resolve(template_ref, from_dir)?;
        let template = self.engine.load_template(&path).await?;
        if !self.used_files.contains(&path) {
            self.used_files.push(path.clone());
        }
        Ok(Layer::from_path(path, template, depth))
    }

    /// Composes `target` and renders its root layer.
    pub(crate) async fn render_layer(&mut self, target: Layer, scope: &Scope<'_>) -> Result<String> {
        let composed = self.compose(target).await?;
        let site = Site {
            dir: &composed.root.dir,
            depth: composed.root.depth,
            composed: &composed,
        };
        let mut out = Output::default();
        self.render_nodes(&composed.root.template.nodes, scope, site, &mut out)
            .await?;
        Ok(compose::fold_layer(out, "", false))
    }

    fn render_nodes<'a>(
        &'a mut self,
        nodes: &'a [Node],
        scope: &'a Scope<'a>,
        site: Site<'a>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for node in nodes {
                match node {
                    Node::Text(text) => out.text.push_str(text),
                    Node::Variable { path, default, .. } => {
                        let value = scope.lookup(path);
                        match (value, default) {
                            (Value::Undefined, Some(fallback)) => {
                                let v = eval::evaluate(fallback, scope);
                                out.text.push_str(&v.to_string());
                            }
                            _ => out.text.push_str(&value.to_string()),
                        }
                    }
                    Node::If { branches } => {
                        let taken = branches.iter().find(|(cond, _)| match cond {
                            Some(cond) => eval::is_true(cond, scope),
                            None => true,
                        });
                        if let Some((_, body)) = taken {
                            self.render_nodes(body, scope, site, out).await?;
                        }
                    }
                    Node::For {
                        var,
                        iterable,
                        body,
                    } => {
                        let value = eval::evaluate(iterable, scope);
                        match value.as_ref() {
                            Value::List(items) => {
                                for item in items {
                                    let child = scope.with_local(var, item);
                                    self.render_nodes(body, &child, site, out).await?;
                                }
                            }
                            Value::Undefined => {}
                            other => {
                                return Err(YaplError::Runtime(format!(
                                    "for loop iterable must be an array, got: {}",
                                    other.type_name()
                                )));
                            }
                        }
                    }
                    Node::Block { name, .. } => {
                        let text = self.render_block(name, scope, site).await?;
                        out.splice(Some(text));
                    }
                    Node::Include { template, with } => {
                        let layer = self.load(template, site.dir, site.depth + 1).await?;
                        let text = match with {
                            Some(entries) => {
                                let vars = entries
                                    .iter()
                                    .map(|(k, e)| (k.clone(), eval::evaluate(e, scope).into_owned()))
                                    .collect();
                                let child = scope.with_vars(vars);
                                self.render_layer(layer, &child).await?
                            }
                            None => self.render_layer(layer, scope).await?,
                        };
                        out.text.push_str(&text);
                    }
                    Node::Super => out.splice(None),
                    // Consumed by composition.
                    Node::Extends { .. } | Node::Mixin { .. } => {}
                }
            }
            Ok(())
        })
    }

    /// Folds every layer's definition of `name`, oldest first. Each layer's
    /// `super()` receives what the layers before it produced.
    async fn render_block(
        &mut self,
        name: &str,
        scope: &Scope<'_>,
        site: Site<'_>,
    ) -> Result<String> {
        // Every layer's blocks are registered, the root's included.
        let defs: &[BlockDef] = site
            .composed
            .blocks
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let dedent = self.engine.options().whitespace.dedent_blocks;
        let mut acc = String::new();
        for def in defs {
            let def_site = Site {
                dir: &def.dir,
                depth: def.depth,
                composed: site.composed,
            };
            let mut part = Output::default();
            self.render_nodes(&def.body, scope, def_site, &mut part)
                .await?;
            acc = compose::fold_layer(part, &acc, dedent);
        }
        Ok(acc)
    }
}
