use crate::Result;
use crate::error::YaplError;
use crate::tpl::ast::{Node, Template};
use crate::tpl::render::{BoxFuture, Output, Renderer, Splice};
use crate::tpl::whitespace::{self, Hole};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One template's contribution to a composition.
#[derive(Debug, Clone)]
pub(crate) struct Layer {
    /// Resolved path, `None` for a template rendered from a string.
    pub path: Option<PathBuf>,
    /// Directory that relative references inside this template resolve from.
    pub dir: PathBuf,
    pub template: Arc<Template>,
    /// How many references were followed to reach this template.
    pub depth: usize,
}

impl Layer {
    pub fn from_path(path: PathBuf, template: Arc<Template>, depth: usize) -> Self {
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            path: Some(path),
            dir,
            template,
            depth,
        }
    }

    pub fn inline(dir: PathBuf, template: Arc<Template>) -> Self {
        Self {
            path: None,
            dir,
            template,
            depth: 0,
        }
    }

    fn name(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "<string>".to_string(),
        }
    }
}

/// A block body together with where it was defined.
#[derive(Debug, Clone)]
pub(crate) struct BlockDef {
    pub body: Arc<Vec<Node>>,
    pub dir: PathBuf,
    pub depth: usize,
}

/// The result of following one render target's extends chain and mixins.
///
/// Only `root` contributes top-level content. `blocks` holds, per name, the
/// definitions of every layer in fold order: root ancestor first, then
/// mixins, finishing with the target itself.
#[derive(Debug)]
pub(crate) struct Composed {
    pub root: Layer,
    pub blocks: HashMap<String, Vec<BlockDef>>,
}

impl Composed {
    pub fn new(root: Layer, layers: &[Layer]) -> Self {
        let mut blocks: HashMap<String, Vec<BlockDef>> = HashMap::new();
        for layer in layers {
            for (name, body) in &layer.template.blocks {
                blocks.entry(name.clone()).or_default().push(BlockDef {
                    body: body.clone(),
                    dir: layer.dir.clone(),
                    depth: layer.depth,
                });
            }
        }
        Self { root, blocks }
    }
}

/// Finishes one layer of a block fold: dedents the layer's own output, then
/// fills every splice, `super()` with what the earlier layers built and
/// nested blocks with their already dedented output.
pub(crate) fn fold_layer(part: Output, inherited: &str, dedent: bool) -> String {
    let Output { mut text, splices } = part;
    let mut holes: Vec<Hole> = splices.iter().map(|s| s.hole).collect();
    if dedent {
        text = whitespace::dedent(&text, &mut holes);
    }
    for (hole, splice) in holes.iter().zip(&splices).rev() {
        text.insert_str(hole.at, splice.fill.as_deref().unwrap_or(inherited));
    }
    text
}

impl Renderer<'_> {
    /// Loads every layer of `target` and builds its composition.
    pub(crate) async fn compose(&mut self, target: Layer) -> Result<Composed> {
        let mut layers = Vec::new();
        let root = self.collect_layers(target, false, &mut layers).await?;
        Ok(Composed::new(root, &layers))
    }

    /// Pushes the layers of `layer` in fold order (parent chain, own mixins,
    /// then the layer itself) and returns the root of its extends chain.
    fn collect_layers<'a>(
        &'a mut self,
        layer: Layer,
        is_mixin: bool,
        out: &'a mut Vec<Layer>,
    ) -> BoxFuture<'a, Result<Layer>> {
        Box::pin(async move {
            let template = layer.template.clone();

            let mut root = None;
            if let Some(parent_ref) = &template.extends {
                if is_mixin {
                    return Err(YaplError::Resolution(format!(
                        "mixin {} cannot extend \"{}\"",
                        layer.name(),
                        parent_ref
                    )));
                }
                let parent = self.load(parent_ref, &layer.dir, layer.depth + 1).await?;
                root = Some(self.collect_layers(parent, false, out).await?);
            }

            for mixin_ref in &template.mixins {
                let mixin = self.load(mixin_ref, &layer.dir, layer.depth + 1).await?;
                self.collect_layers(mixin, true, out).await?;
            }

            let root = root.unwrap_or_else(|| layer.clone());
            out.push(layer);
            Ok(root)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::WhitespaceOptions;
    use crate::tpl::parser::parse;

    fn layer(name: &str, src: &str) -> Layer {
        let template = parse(src, &WhitespaceOptions::none()).unwrap();
        Layer::from_path(PathBuf::from(format!("t/{}.yapl", name)), Arc::new(template), 0)
    }

    #[test]
    fn test_block_defs_follow_layer_order() {
        let base = layer("base", "{% block g %}base{% endblock %}{% block h %}{% endblock %}");
        let mixin = layer("mix", "{% block g %}{{ super() }}-mix{% endblock %}");
        let child = layer("child", "{% extends \"base\" %}{% block g %}c{% endblock %}");

        let composed = Composed::new(base.clone(), &[base, mixin, child]);
        let g = &composed.blocks["g"];
        assert_eq!(g.len(), 3);
        assert_eq!(g[0].body.as_slice(), &[Node::Text("base".into())]);
        assert_eq!(g[1].body[0], Node::Super);
        assert_eq!(g[2].body.as_slice(), &[Node::Text("c".into())]);
        assert_eq!(composed.blocks["h"].len(), 1);
        assert_eq!(composed.root.path, Some(PathBuf::from("t/base.yapl")));
    }

    #[test]
    fn test_layer_dir() {
        let l = layer("x", "");
        assert_eq!(l.dir, PathBuf::from("t"));
    }

    fn output(text: &str, splices: &[(usize, Option<&str>)]) -> Output {
        Output {
            text: text.to_string(),
            splices: splices
                .iter()
                .map(|(at, fill)| Splice {
                    hole: Hole {
                        at: *at,
                        is_content: fill.is_none(),
                    },
                    fill: fill.map(str::to_string),
                })
                .collect(),
        }
    }

    #[test]
    fn test_fold_layer_splices_every_super() {
        let part = output("[]-[]", &[(1, None), (4, None)]);
        assert_eq!(fold_layer(part, "base", false), "[base]-[base]");
    }

    #[test]
    fn test_fold_layer_dedents_before_splicing() {
        let part = output("    one\n    \n", &[(12, None)]);
        // The inherited text keeps its own indentation.
        assert_eq!(fold_layer(part, "  two", true), "one\n  two\n");
    }

    #[test]
    fn test_fold_layer_nested_block_does_not_block_dedent() {
        let part = output("    A\n", &[(6, Some("B\n"))]);
        assert_eq!(fold_layer(part, "", true), "A\nB\n");
    }

    #[test]
    fn test_fold_layer_keeps_splice_order_at_same_offset() {
        let part = output("x", &[(1, Some("a")), (1, None), (1, Some("c"))]);
        assert_eq!(fold_layer(part, "b", false), "xabc");
    }
}
