use crate::Result;
use crate::error::YaplError;
use async_trait::async_trait;
use glob::glob;
use log::trace;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Turns template references into normalized paths.
///
/// A reference starting with `/` is taken relative to `base_dir`, anything
/// else relative to the directory it is referenced from. The configured
/// extension is appended when the reference has none. `.` and `..` are
/// resolved lexically; the file system is never consulted.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base_dir: PathBuf,
    strict: bool,
    extension: String,
}

impl PathResolver {
    pub fn new(base_dir: impl AsRef<Path>, strict: bool, extension: impl Into<String>) -> Self {
        Self {
            base_dir: normalize(base_dir.as_ref()),
            strict,
            extension: extension.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resolve(&self, template_ref: &str, from_dir: &Path) -> Result<PathBuf> {
        let relative = template_ref.strip_prefix('/').unwrap_or(template_ref);
        // `join` would replace the base with an absolute remainder.
        if self.strict && has_root(Path::new(relative)) {
            return Err(YaplError::PathEscape(template_ref.to_string()));
        }
        let mut joined = match template_ref.strip_prefix('/') {
            Some(rooted) => self.base_dir.join(rooted),
            None => from_dir.join(template_ref),
        };
        if joined.extension().is_none() && !self.extension.is_empty() {
            joined.set_extension(&self.extension);
        }

        let resolved = normalize(&joined);
        if self.strict && !self.is_inside(&resolved) {
            return Err(YaplError::PathEscape(template_ref.to_string()));
        }
        trace!("Resolve: ref={}, from={}, path={}", template_ref, from_dir.display(), resolved.display());
        Ok(resolved)
    }

    fn is_inside(&self, path: &Path) -> bool {
        if has_root(path) && !has_root(&self.base_dir) {
            return false;
        }
        path.starts_with(&self.base_dir)
            && !path
                .strip_prefix(&self.base_dir)
                .map(|rest| rest.components().any(|c| c == Component::ParentDir))
                .unwrap_or(true)
    }
}

fn has_root(path: &Path) -> bool {
    path.has_root()
        || path
            .components()
            .any(|c| matches!(c, Component::RootDir | Component::Prefix(_)))
}

/// Lexically normalizes a path: drops `.`, folds `name/..` pairs and keeps
/// leading `..` of relative paths.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

/// `Loader` supplies template sources to the engine.
///
/// An implementation is responsible for:
/// - Mapping a template reference to a path (the default delegates to the
///   engine's `PathResolver`, which enforces strict-path mode)
/// - Reading the raw source text for a resolved path
#[async_trait]
pub trait Loader: Send + Sync {
    /// Resolves `template_ref` as seen from `from_dir`.
    ///
    /// Overrides must keep rejecting paths outside the base directory when
    /// `resolver` is strict.
    fn resolve_path(
        &self,
        resolver: &PathResolver,
        template_ref: &str,
        from_dir: &Path,
    ) -> Result<PathBuf> {
        resolver.resolve(template_ref, from_dir)
    }

    /// Returns the raw template source.
    ///
    /// # Returns
    /// - `Ok(String)` with the template text
    /// - `Err(YaplError::TemplateNotFound)` if nothing exists at `path`
    async fn load_file(&self, path: &Path) -> Result<String>;
}

/// Reads templates from disk with `tokio::fs`.
#[derive(Debug, Default, Clone)]
pub struct FsLoader;

#[async_trait]
impl Loader for FsLoader {
    async fn load_file(&self, path: &Path) -> Result<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(source) => Ok(source),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(YaplError::TemplateNotFound(path.display().to_string()))
            }
            Err(e) => Err(YaplError::Io(e)),
        }
    }
}

/// Serves templates from memory, keyed by normalized path.
///
/// Keys must match what the engine resolves to, i.e. be written relative
/// to the same base directory the engine is configured with.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    templates: HashMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template. A later registration for the same path replaces
    /// the earlier one.
    pub fn add(&mut self, path: impl AsRef<Path>, source: impl Into<String>) -> &mut Self {
        self.templates
            .insert(normalize(path.as_ref()), source.into());
        self
    }

    pub fn with_template(mut self, path: impl AsRef<Path>, source: impl Into<String>) -> Self {
        self.add(path, source);
        self
    }

    /// Builds a loader from `(path, source)` pairs, as produced by
    /// `embed_templates!`.
    pub fn from_assets<P: AsRef<Path>, S: Into<String>>(assets: Vec<(P, S)>) -> Self {
        let mut loader = Self::new();
        for (path, source) in assets {
            loader.add(path, source);
        }
        loader
    }

    /// Reads every file matching a glob pattern into memory, keyed by the
    /// matched path.
    pub fn load_glob(pattern: &str) -> Result<Self> {
        let paths = glob(pattern)
            .map_err(|e| YaplError::Resolution(format!("invalid glob pattern {}: {}", pattern, e)))?;
        let mut loader = Self::new();
        for entry in paths {
            let path = entry.map_err(|e| YaplError::Io(e.into()))?;
            if path.is_file() {
                let source = std::fs::read_to_string(&path)?;
                loader.add(&path, source);
            }
        }
        Ok(loader)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn load_file(&self, path: &Path) -> Result<String> {
        self.templates
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| YaplError::TemplateNotFound(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("./a/b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize(Path::new("../a")), PathBuf::from("../a"));
        assert_eq!(normalize(Path::new("/x/../../y")), PathBuf::from("/y"));
        assert_eq!(normalize(Path::new(".")), PathBuf::new());
    }

    #[test]
    fn test_resolve_relative_and_rooted() {
        let r = PathResolver::new("prompts", true, "yapl");
        assert_eq!(
            r.resolve("base", Path::new("prompts/agents")).unwrap(),
            PathBuf::from("prompts/agents/base.yapl")
        );
        assert_eq!(
            r.resolve("../shared/tone.yapl", Path::new("prompts/agents")).unwrap(),
            PathBuf::from("prompts/shared/tone.yapl")
        );
        assert_eq!(
            r.resolve("/layouts/base", Path::new("prompts/agents")).unwrap(),
            PathBuf::from("prompts/layouts/base.yapl")
        );
    }

    #[test]
    fn test_existing_extension_is_kept() {
        let r = PathResolver::new(".", true, "yapl");
        assert_eq!(
            r.resolve("notes.txt", Path::new("")).unwrap(),
            PathBuf::from("notes.txt")
        );
    }

    #[test]
    fn test_strict_rejects_escape() {
        let r = PathResolver::new("/srv/prompts", true, "yapl");
        let err = r
            .resolve("../../../etc/passwd", Path::new("/srv/prompts"))
            .unwrap_err();
        assert!(err.is_security());

        let r = PathResolver::new(".", true, "yapl");
        assert!(r.resolve("../outside", Path::new("")).unwrap_err().is_security());
    }

    #[test]
    fn test_strict_rejects_absolute_remainder_with_default_base() {
        let r = PathResolver::new(".", true, "yapl");
        let err = r.resolve("//etc/ssl/openssl.cnf", Path::new("")).unwrap_err();
        assert!(err.is_security(), "{:?}", err);
        // A from-dir that is already absolute never passes for a relative base.
        assert!(r.resolve("a", Path::new("/tmp")).unwrap_err().is_security());
        assert_eq!(
            r.resolve("/partials/a", Path::new("agents")).unwrap(),
            PathBuf::from("partials/a.yapl")
        );
    }

    #[test]
    fn test_lenient_allows_escape() {
        let r = PathResolver::new("/srv/prompts", false, "yapl");
        assert_eq!(
            r.resolve("../shared/x", Path::new("/srv/prompts")).unwrap(),
            PathBuf::from("/srv/shared/x.yapl")
        );
    }

    #[tokio::test]
    async fn test_memory_loader_normalizes_keys() {
        let loader = MemoryLoader::new().with_template("./a/../b.yapl", "B");
        assert_eq!(loader.load_file(Path::new("b.yapl")).await.unwrap(), "B");
        assert!(matches!(
            loader.load_file(Path::new("c.yapl")).await,
            Err(YaplError::TemplateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fs_loader_missing_file() {
        let err = FsLoader
            .load_file(Path::new("definitely/not/here.yapl"))
            .await
            .unwrap_err();
        assert!(matches!(err, YaplError::TemplateNotFound(_)));
    }
}
