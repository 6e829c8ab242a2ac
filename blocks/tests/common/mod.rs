#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use css_blocks::{
    BlockCompiler, BlockFactory, BlockId, CssBlocksError, FileIdentifier, ImportedFile, Importer, Options, Result,
    Syntax,
};
use futures::FutureExt;
use futures::future::LocalBoxFuture;

/// Serves files from a map. Identifiers are the file names, resolved
/// relative to the importing file's directory.
#[derive(Default)]
pub struct MemoryImporter {
    files: RefCell<HashMap<String, String>>,
    imports: RefCell<HashMap<String, usize>>,
}

impl MemoryImporter {
    pub fn new(files: &[(&str, &str)]) -> Rc<Self> {
        let importer = MemoryImporter::default();
        for (name, contents) in files {
            importer.files.borrow_mut().insert(name.to_string(), contents.to_string());
        }
        Rc::new(importer)
    }

    /// How many times `name` was imported.
    pub fn import_count(&self, name: &str) -> usize {
        self.imports.borrow().get(name).copied().unwrap_or(0)
    }
}

fn normalize(path: &Path) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.to_str().unwrap_or_default().split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }
    parts.join("/")
}

impl Importer for MemoryImporter {
    fn identifier(&self, from: Option<&FileIdentifier>, import_path: &str, _options: &Options) -> FileIdentifier {
        let base = from
            .and_then(|from| Path::new(from.as_str()).parent().map(Path::to_path_buf))
            .unwrap_or_default();
        FileIdentifier::new(normalize(&base.join(import_path)))
    }

    fn import<'a>(
        &'a self,
        identifier: &'a FileIdentifier,
        options: &'a Options,
    ) -> LocalBoxFuture<'a, Result<ImportedFile>> {
        async move {
            // Let concurrent loads interleave.
            tokio::task::yield_now().await;
            *self.imports.borrow_mut().entry(identifier.to_string()).or_insert(0) += 1;
            let contents = self
                .files
                .borrow()
                .get(identifier.as_str())
                .cloned()
                .ok_or_else(|| CssBlocksError::io(format!("no such file: {}", identifier)))?;
            Ok(ImportedFile {
                identifier: identifier.clone(),
                contents,
                syntax: Syntax::from_path(Path::new(identifier.as_str())),
                default_name: self.default_name(identifier, options),
                timestamp: None,
            })
        }
        .boxed_local()
    }

    fn filesystem_path(&self, _identifier: &FileIdentifier, _options: &Options) -> Option<PathBuf> {
        None
    }

    fn debug_identifier(&self, identifier: &FileIdentifier, _options: &Options) -> String {
        identifier.to_string()
    }

    fn default_name(&self, identifier: &FileIdentifier, _options: &Options) -> String {
        let stem = Path::new(identifier.as_str())
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        stem.strip_suffix(".block").map(str::to_string).unwrap_or(stem)
    }
}

pub fn factory(files: &[(&str, &str)]) -> (BlockFactory, Rc<MemoryImporter>) {
    factory_with(files, Options::default())
}

pub fn factory_with(files: &[(&str, &str)], options: Options) -> (BlockFactory, Rc<MemoryImporter>) {
    let importer = MemoryImporter::new(files);
    (BlockFactory::new(options, importer.clone()), importer)
}

pub async fn load(factory: &BlockFactory, name: &str) -> Result<BlockId> {
    factory.get_block(&FileIdentifier::new(name)).await
}

/// Load and compile one file, returning the CSS text.
pub async fn compile_with(files: &[(&str, &str)], entry: &str, options: Options) -> Result<String> {
    let (factory, _) = factory_with(files, options);
    let block = load(&factory, entry).await?;
    let graph = factory.graph();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let compiled = BlockCompiler::new(&graph, factory.options()).compile_with_output(block, &mut stdout, &mut stderr)?;
    Ok(compiled.to_string())
}

pub async fn compile(files: &[(&str, &str)], entry: &str) -> Result<String> {
    compile_with(files, entry, Options::default()).await
}

pub async fn compile_error(files: &[(&str, &str)], entry: &str) -> String {
    match compile(files, entry).await {
        Ok(css) => panic!("expected an error, got:\n{}", css),
        Err(err) => err.to_string(),
    }
}
