pub mod engine;
pub mod error;
pub mod loader;
pub mod options;
pub mod tpl;
pub mod value;

pub use engine::{Engine, Rendered};
pub use error::{Location, YaplError};
pub use loader::{FsLoader, Loader, MemoryLoader, PathResolver};
pub use options::{EngineOptions, WhitespaceOptions};
pub use value::{ToValue, Value, to_value};
pub use yapl_macros::{Vars, embed_templates};

pub type Result<T> = std::result::Result<T, YaplError>;
