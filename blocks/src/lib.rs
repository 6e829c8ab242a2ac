pub mod block;
pub mod compiler;
pub mod error;
pub mod factory;
pub mod importing;
pub mod options;
pub mod parser;
pub mod selector;
pub mod stylesheet;

use std::path::Path;
use std::rc::Rc;

pub use block::{Block, BlockGraph, BlockId, BlockObject, ObjectId, ObjectKey};
pub use compiler::BlockCompiler;
pub use error::{CssBlocksError, Result, SourceLocation};
pub use factory::BlockFactory;
pub use importing::{FileIdentifier, FilesystemImporter, ImportedFile, Importer, Syntax};
pub use options::{Options, OutputMode};
pub use stylesheet::Stylesheet;

/// Compile one block file's source text into CSS.
///
/// `from` is the path of the file the source came from; references are
/// resolved relative to it. Without it there is no stable identity for the
/// block, so the call fails with [`CssBlocksError::MissingSourcePath`].
pub async fn process(source: &str, from: Option<&Path>, mut options: Options) -> Result<String> {
    let from = from.ok_or(CssBlocksError::MissingSourcePath)?;
    let from = std::path::absolute(from).unwrap_or_else(|_| from.to_path_buf());
    if let Some(dir) = from.parent() {
        options.root_dir = dir.to_path_buf();
    }
    let factory = BlockFactory::new(options, Rc::new(FilesystemImporter));
    let identifier =
        factory
            .importer()
            .identifier(None, &from.to_string_lossy(), factory.options());
    let default_name = factory
        .importer()
        .default_name(&identifier, factory.options());
    let block = factory
        .parse_source(source.to_string(), identifier, &default_name)
        .await?;

    let graph = factory.graph();
    let compiled = BlockCompiler::new(&graph, factory.options()).compile(block)?;
    Ok(compiled.to_string())
}
