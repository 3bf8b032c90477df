use serde::Deserialize;
use std::path::PathBuf;

/// Whitespace rules applied while parsing and rendering.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct WhitespaceOptions {
    /// Remove the first newline after a `{% %}` tag.
    pub trim_blocks: bool,
    /// Strip spaces and tabs before a `{% %}` tag that starts its line.
    pub lstrip_blocks: bool,
    /// Remove the common indentation of each rendered block body.
    pub dedent_blocks: bool,
}

impl Default for WhitespaceOptions {
    fn default() -> Self {
        Self {
            trim_blocks: true,
            lstrip_blocks: true,
            dedent_blocks: true,
        }
    }
}

impl WhitespaceOptions {
    /// Every rule switched off: output keeps the source layout exactly.
    pub fn none() -> Self {
        Self {
            trim_blocks: false,
            lstrip_blocks: false,
            dedent_blocks: false,
        }
    }
}

/// Engine configuration.
///
/// Can be built fluently or deserialized from camelCase keys:
///
/// ```
/// use yapl::EngineOptions;
///
/// let opts = EngineOptions::new().base_dir("prompts").max_depth(8);
/// assert_eq!(opts.max_depth, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct EngineOptions {
    /// Root for relative path resolution.
    pub base_dir: PathBuf,
    /// Memoize parsed templates by resolved path.
    pub cache: bool,
    /// Reject resolved paths outside `base_dir`.
    pub strict_paths: bool,
    /// Shared recursion budget across extends, include and mixin.
    pub max_depth: usize,
    /// Appended to references that have no extension.
    pub extension: String,
    pub whitespace: WhitespaceOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            cache: true,
            strict_paths: true,
            max_depth: 20,
            extension: "yapl".to_string(),
            whitespace: WhitespaceOptions::default(),
        }
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    pub fn strict_paths(mut self, enabled: bool) -> Self {
        self.strict_paths = enabled;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn whitespace(mut self, whitespace: WhitespaceOptions) -> Self {
        self.whitespace = whitespace;
        self
    }

    pub fn trim_blocks(mut self, enabled: bool) -> Self {
        self.whitespace.trim_blocks = enabled;
        self
    }

    pub fn lstrip_blocks(mut self, enabled: bool) -> Self {
        self.whitespace.lstrip_blocks = enabled;
        self
    }

    pub fn dedent_blocks(mut self, enabled: bool) -> Self {
        self.whitespace.dedent_blocks = enabled;
        self
    }
}
