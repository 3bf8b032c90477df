use crate::Result;
use crate::loader::{FsLoader, Loader, PathResolver, normalize};
use crate::options::EngineOptions;
use crate::tpl::ast::Template;
use crate::tpl::compose::Layer;
use crate::tpl::parser;
use crate::tpl::render::Renderer;
use crate::tpl::scope::Scope;
use crate::value::{ToValue, Value};
use dashmap::DashMap;
use log::{debug, trace};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Output of a render call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub content: String,
    /// Resolved paths of every template touched, in first-touch order.
    pub used_files: Vec<String>,
}

/// The template engine.
///
/// An `Engine` owns its configuration, a `Loader` and a cache of parsed
/// templates keyed by resolved path. It is `Send + Sync`; concurrent render
/// calls share nothing but that cache.
///
/// ```no_run
/// use std::collections::HashMap;
/// use yapl::{Engine, EngineOptions};
///
/// # async fn demo() -> yapl::Result<()> {
/// let engine = Engine::new(EngineOptions::new().base_dir("prompts"));
/// let mut vars = HashMap::new();
/// vars.insert("name".to_string(), "Ada");
/// let rendered = engine.render("agents/support", &vars).await?;
/// println!("{}", rendered.content);
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    options: EngineOptions,
    resolver: PathResolver,
    loader: Arc<dyn Loader>,
    /// Parsed templates by resolved path. Entries are only inserted after a
    /// successful parse.
    cache: DashMap<PathBuf, Arc<Template>>,
}

impl Engine {
    /// Creates an engine reading templates from disk.
    pub fn new(options: EngineOptions) -> Self {
        Self::with_loader(options, FsLoader)
    }

    pub fn with_loader(options: EngineOptions, loader: impl Loader + 'static) -> Self {
        Self::with_shared_loader(options, Arc::new(loader))
    }

    pub fn with_shared_loader(options: EngineOptions, loader: Arc<dyn Loader>) -> Self {
        let resolver = PathResolver::new(
            &options.base_dir,
            options.strict_paths,
            options.extension.clone(),
        );
        Self {
            options,
            resolver,
            loader,
            cache: DashMap::new(),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Loads `path` (relative to the base directory) and renders it.
    pub fn render<'a, T: ToValue + ?Sized>(
        &'a self,
        path: &'a str,
        vars: &T,
    ) -> impl Future<Output = Result<Rendered>> {
        self.render_value(path, vars.to_value())
    }

    /// Renders a template given as a string. `extends`, `include` and
    /// `mixin` inside it resolve relative to `current_dir`, or the base
    /// directory when no hint is given. String sources are never cached.
    pub fn render_string<'a, T: ToValue + ?Sized>(
        &'a self,
        source: &'a str,
        vars: &T,
        current_dir: Option<&'a Path>,
    ) -> impl Future<Output = Result<Rendered>> {
        self.render_string_value(source, vars.to_value(), current_dir)
    }

    async fn render_value(&self, path: &str, vars: Value) -> Result<Rendered> {
        let start = Instant::now();
        let scope = Scope::root(&vars);
        let mut renderer = Renderer::new(self);
        let result = async {
            let target = renderer.load(path, self.resolver.base_dir(), 0).await?;
            renderer.render_layer(target, &scope).await
        }
        .await;
        self.finish(path, start, renderer, result)
    }

    async fn render_string_value(
        &self,
        source: &str,
        vars: Value,
        current_dir: Option<&Path>,
    ) -> Result<Rendered> {
        let start = Instant::now();
        let scope = Scope::root(&vars);
        let mut renderer = Renderer::new(self);
        let dir = current_dir
            .map(normalize)
            .unwrap_or_else(|| self.resolver.base_dir().to_path_buf());
        let result = async {
            let template = Arc::new(parser::parse(source, &self.options.whitespace)?);
            renderer.render_layer(Layer::inline(dir, template), &scope).await
        }
        .await;
        self.finish("<string>", start, renderer, result)
    }

    fn finish(
        &self,
        target: &str,
        start: Instant,
        renderer: Renderer<'_>,
        result: Result<String>,
    ) -> Result<Rendered> {
        let elapsed = start.elapsed().as_millis();
        let used_files: Vec<String> = renderer
            .into_used_files()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        match result {
            Ok(content) => {
                debug!(
                    "Render: target={}, elapsed={}ms, len={}, files={:?}",
                    target,
                    elapsed,
                    content.len(),
                    used_files
                );
                Ok(Rendered {
                    content,
                    used_files,
                })
            }
            Err(e) => {
                debug!(
                    "Render: target={}, elapsed={}ms, error={:?}",
                    target, elapsed, e
                );
                Err(e)
            }
        }
    }

    /// Returns the parsed form of a template, through the cache.
    pub async fn parse(&self, path: &str) -> Result<Arc<Template>> {
        let resolved = self.resolve(path, self.resolver.base_dir())?;
        self.load_template(&resolved).await
    }

    /// Drops every cached template.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Number of templates currently cached.
    pub fn cached_templates(&self) -> usize {
        self.cache.len()
    }

    pub(crate) fn resolve(&self, template_ref: &str, from_dir: &Path) -> Result<PathBuf> {
        self.loader
            .resolve_path(&self.resolver, template_ref, from_dir)
    }

    pub(crate) async fn load_template(&self, path: &Path) -> Result<Arc<Template>> {
        if self.options.cache
            && let Some(hit) = self.cache.get(path)
        {
            trace!("Cache hit: {}", path.display());
            return Ok(hit.value().clone());
        }

        trace!("Cache miss: {}", path.display());
        let source = self.loader.load_file(path).await?;
        let template = match parser::parse(&source, &self.options.whitespace) {
            Ok(t) => Arc::new(t),
            Err(e) => {
                debug!("Parse: path={}, error={}", path.display(), e);
                return Err(e);
            }
        };
        if self.options.cache {
            self.cache.insert(path.to_path_buf(), template.clone());
        }
        Ok(template)
    }
}
