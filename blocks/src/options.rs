use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::CssBlocksError;

/// How block objects are turned into output class names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// `block`, `block__class`, `block--state`, `block__class--group-state`.
    #[default]
    Bem,
}

impl FromStr for OutputMode {
    type Err = CssBlocksError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bem" => Ok(OutputMode::Bem),
            _ => Err(CssBlocksError::block(format!("Unknown output mode: {}", s))),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Bem => write!(f, "bem"),
        }
    }
}

/// Compiler configuration, usually read from `css-blocks.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Options {
    pub output_mode: OutputMode,
    /// Directory that top-level import paths are resolved against.
    pub root_dir: PathBuf,
    /// Upper bound on preprocessing jobs running at once.
    pub max_concurrent_compiles: usize,
    /// Do not pipe non-CSS syntaxes through the CSS preprocessor.
    pub disable_preprocess_chaining: bool,
    /// Append an interoperable-CSS `:export` rule to compiled output.
    pub export_icss: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            output_mode: OutputMode::Bem,
            root_dir: PathBuf::from("."),
            max_concurrent_compiles: 4,
            disable_preprocess_chaining: false,
            export_icss: false,
        }
    }
}
