//! Where block files come from.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::error::{CssBlocksError, Result};
use crate::options::Options;

/// Opaque identity of a block file, as produced by an [`Importer`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentifier(String);

impl FileIdentifier {
    pub fn new(identifier: impl Into<String>) -> Self {
        FileIdentifier(identifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source syntax of an imported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syntax {
    Css,
    Sass,
    Scss,
    Less,
    Stylus,
    Other,
}

impl Syntax {
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "css" => Syntax::Css,
            "sass" => Syntax::Sass,
            "scss" => Syntax::Scss,
            "less" => Syntax::Less,
            "styl" => Syntax::Stylus,
            _ => Syntax::Other,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|extension| extension.to_str())
            .map_or(Syntax::Other, Syntax::from_extension)
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Syntax::Css => "css",
            Syntax::Sass => "sass",
            Syntax::Scss => "scss",
            Syntax::Less => "less",
            Syntax::Stylus => "styl",
            Syntax::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ImportedFile {
    pub identifier: FileIdentifier,
    pub contents: String,
    pub syntax: Syntax,
    pub default_name: String,
    pub timestamp: Option<SystemTime>,
}

/// Resolves import paths to identifiers and loads file contents.
pub trait Importer {
    /// Resolve `import_path` as written in `from` (or at the top level).
    fn identifier(&self, from: Option<&FileIdentifier>, import_path: &str, options: &Options) -> FileIdentifier;

    fn import<'a>(
        &'a self,
        identifier: &'a FileIdentifier,
        options: &'a Options,
    ) -> LocalBoxFuture<'a, Result<ImportedFile>>;

    fn filesystem_path(&self, identifier: &FileIdentifier, options: &Options) -> Option<PathBuf>;

    /// A short identifier for messages.
    fn debug_identifier(&self, identifier: &FileIdentifier, options: &Options) -> String;

    /// The block name used when a file does not declare one.
    fn default_name(&self, identifier: &FileIdentifier, options: &Options) -> String;
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Memoizes an importer's `identifier` and `import` results.
pub struct ImportCache {
    importer: Rc<dyn Importer>,
    identifiers: RefCell<HashMap<(Option<FileIdentifier>, String), FileIdentifier>>,
    imports: RefCell<HashMap<FileIdentifier, ImportedFile>>,
}

impl ImportCache {
    pub fn new(importer: Rc<dyn Importer>) -> Self {
        ImportCache {
            importer,
            identifiers: RefCell::new(HashMap::new()),
            imports: RefCell::new(HashMap::new()),
        }
    }

    pub fn identifier(&self, from: Option<&FileIdentifier>, import_path: &str, options: &Options) -> FileIdentifier {
        let key = (from.cloned(), import_path.to_string());
        if let Some(identifier) = self.identifiers.borrow().get(&key) {
            return identifier.clone();
        }
        let identifier = self.importer.identifier(from, import_path, options);
        self.identifiers.borrow_mut().insert(key, identifier.clone());
        identifier
    }

    pub async fn import(&self, identifier: &FileIdentifier, options: &Options) -> Result<ImportedFile> {
        if let Some(file) = self.imports.borrow().get(identifier) {
            return Ok(file.clone());
        }
        let file = self.importer.import(identifier, options).await?;
        self.imports.borrow_mut().insert(identifier.clone(), file.clone());
        Ok(file)
    }

    pub fn filesystem_path(&self, identifier: &FileIdentifier, options: &Options) -> Option<PathBuf> {
        self.importer.filesystem_path(identifier, options)
    }

    pub fn debug_identifier(&self, identifier: &FileIdentifier, options: &Options) -> String {
        self.importer.debug_identifier(identifier, options)
    }

    pub fn default_name(&self, identifier: &FileIdentifier, options: &Options) -> String {
        self.importer.default_name(identifier, options)
    }

    /// Forget one file and every path that resolved to it.
    pub fn purge_identifier(&self, identifier: &FileIdentifier) {
        self.imports.borrow_mut().remove(identifier);
        self.identifiers
            .borrow_mut()
            .retain(|_, resolved| resolved != identifier);
    }

    pub fn purge_all(&self) {
        self.imports.borrow_mut().clear();
        self.identifiers.borrow_mut().clear();
    }
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// Imports files from disk. Identifiers are absolute paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemImporter;

impl Importer for FilesystemImporter {
    fn identifier(&self, from: Option<&FileIdentifier>, import_path: &str, options: &Options) -> FileIdentifier {
        let path = Path::new(import_path);
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            let base = from
                .and_then(|from| Path::new(from.as_str()).parent().map(Path::to_path_buf))
                .unwrap_or_else(|| options.root_dir.clone());
            base.join(path)
        };
        let absolute = std::path::absolute(&resolved).unwrap_or(resolved);
        let normalized = absolute.canonicalize().unwrap_or(absolute);
        FileIdentifier::new(normalized.to_string_lossy())
    }

    fn import<'a>(
        &'a self,
        identifier: &'a FileIdentifier,
        _options: &'a Options,
    ) -> LocalBoxFuture<'a, Result<ImportedFile>> {
        async move {
            let path = PathBuf::from(identifier.as_str());
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|err| CssBlocksError::io(format!("cannot read '{}': {}", path.display(), err)))?;
            let timestamp = tokio::fs::metadata(&path)
                .await
                .ok()
                .and_then(|metadata| metadata.modified().ok());
            tracing::trace!(path = %path.display(), bytes = contents.len(), "imported block file");
            Ok(ImportedFile {
                identifier: identifier.clone(),
                contents,
                syntax: Syntax::from_path(&path),
                default_name: default_name_for(&path),
                timestamp,
            })
        }
        .boxed_local()
    }

    fn filesystem_path(&self, identifier: &FileIdentifier, _options: &Options) -> Option<PathBuf> {
        Some(PathBuf::from(identifier.as_str()))
    }

    fn debug_identifier(&self, identifier: &FileIdentifier, options: &Options) -> String {
        let path = Path::new(identifier.as_str());
        let root = std::path::absolute(&options.root_dir).unwrap_or_else(|_| options.root_dir.clone());
        let root = root.canonicalize().unwrap_or(root);
        path.strip_prefix(&root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn default_name(&self, identifier: &FileIdentifier, _options: &Options) -> String {
        default_name_for(Path::new(identifier.as_str()))
    }
}

/// `nav.block.css` and `nav.css` are both named `nav`.
fn default_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.strip_suffix(".block") {
        Some(name) => name.to_string(),
        None => stem,
    }
}
