//! Loads, parses and caches blocks by file identifier.

pub mod preprocess;

use std::cell::{Ref, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use tracing::{debug, trace};

pub use preprocess::{PreprocessQueue, Preprocessor, ProcessedFile};

use crate::block::{BlockGraph, BlockId};
use crate::error::{CssBlocksError, Result};
use crate::importing::{FileIdentifier, ImportCache, ImportedFile, Importer, Syntax};
use crate::options::Options;
use crate::parser::BlockParser;
use crate::stylesheet::parse_stylesheet;

type BlockFuture = Shared<LocalBoxFuture<'static, Result<BlockId>>>;

/// Shared handle to a block cache. Clones refer to the same cache.
#[derive(Clone)]
pub struct BlockFactory {
    inner: Rc<FactoryState>,
}

struct FactoryState {
    options: Options,
    importer: ImportCache,
    preprocessors: RefCell<HashMap<Syntax, Rc<dyn Preprocessor>>>,
    queue: PreprocessQueue,
    graph: RefCell<BlockGraph>,
    ids: RefCell<HashMap<FileIdentifier, BlockId>>,
    /// One shared load per identifier, finished or not.
    loads: RefCell<HashMap<FileIdentifier, BlockFuture>>,
    /// Which in-flight loads are waiting on which references.
    waiting: RefCell<HashMap<FileIdentifier, Vec<FileIdentifier>>>,
    /// How many blocks have claimed each declared name.
    names: RefCell<HashMap<String, usize>>,
}

impl BlockFactory {
    pub fn new(options: Options, importer: Rc<dyn Importer>) -> Self {
        let queue = PreprocessQueue::new(options.max_concurrent_compiles);
        BlockFactory {
            inner: Rc::new(FactoryState {
                options,
                importer: ImportCache::new(importer),
                preprocessors: RefCell::new(HashMap::new()),
                queue,
                graph: RefCell::new(BlockGraph::new()),
                ids: RefCell::new(HashMap::new()),
                loads: RefCell::new(HashMap::new()),
                waiting: RefCell::new(HashMap::new()),
                names: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn importer(&self) -> &ImportCache {
        &self.inner.importer
    }

    pub fn preprocess_queue(&self) -> &PreprocessQueue {
        &self.inner.queue
    }

    /// Register the preprocessor for one syntax, replacing any previous one.
    pub fn add_preprocessor(&self, syntax: Syntax, preprocessor: Rc<dyn Preprocessor>) {
        self.inner.preprocessors.borrow_mut().insert(syntax, preprocessor);
    }

    /// The loaded blocks. Do not hold the borrow across an `.await`.
    pub fn graph(&self) -> Ref<'_, BlockGraph> {
        self.inner.graph.borrow()
    }

    /// Load a block. Concurrent and repeated calls for one identifier share
    /// a single import and parse.
    pub async fn get_block(&self, identifier: &FileIdentifier) -> Result<BlockId> {
        self.load(identifier.clone()).await
    }

    pub async fn get_block_relative(&self, from: &FileIdentifier, import_path: &str) -> Result<BlockId> {
        let identifier = self.inner.importer.identifier(Some(from), import_path, &self.inner.options);
        self.get_block(&identifier).await
    }

    pub async fn get_block_from_path(&self, import_path: &str) -> Result<BlockId> {
        let identifier = self.inner.importer.identifier(None, import_path, &self.inner.options);
        self.get_block(&identifier).await
    }

    /// Parse already loaded source text as the block for `identifier`.
    pub async fn parse_source(&self, contents: String, identifier: FileIdentifier, default_name: &str) -> Result<BlockId> {
        let id = self.reserve(&identifier);
        let result = self
            .build(id, identifier.clone(), &contents, default_name, Vec::new())
            .await;
        if result.is_err() {
            self.inner.queue.drain().await;
        }
        let done: LocalBoxFuture<'static, Result<BlockId>> = futures::future::ready(result.clone()).boxed_local();
        self.inner.loads.borrow_mut().insert(identifier, done.shared());
        result
    }

    /// Drop every cached import, block and name.
    pub fn reset(&self) {
        debug!("resetting block factory");
        self.inner.importer.purge_all();
        *self.inner.graph.borrow_mut() = BlockGraph::new();
        self.inner.ids.borrow_mut().clear();
        self.inner.loads.borrow_mut().clear();
        self.inner.waiting.borrow_mut().clear();
        self.inner.names.borrow_mut().clear();
    }

    /// Load a block referenced from `requester`.
    ///
    /// When `target` is already (transitively) waiting on `requester`, its
    /// reserved id is returned at once so reference cycles do not deadlock.
    /// That block is not complete until its own load finishes.
    pub(crate) async fn get_referenced_block(&self, requester: &FileIdentifier, target: FileIdentifier) -> Result<BlockId> {
        if self.waits_on(&target, requester) {
            debug!(%requester, %target, "block reference cycle");
            return Ok(self.reserve(&target));
        }
        self.add_wait(requester, &target);
        let result = self.load(target.clone()).await;
        self.remove_wait(requester, &target);
        result
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    fn load(&self, identifier: FileIdentifier) -> BlockFuture {
        if let Some(pending) = self.inner.loads.borrow().get(&identifier) {
            trace!(%identifier, "reusing block load");
            return pending.clone();
        }
        let factory = self.clone();
        let key = identifier.clone();
        let future = async move { factory.load_block(identifier).await }
            .boxed_local()
            .shared();
        self.inner.loads.borrow_mut().insert(key, future.clone());
        future
    }

    async fn load_block(self, identifier: FileIdentifier) -> Result<BlockId> {
        let id = self.reserve(&identifier);
        debug!(%identifier, "loading block");
        let result = match self.inner.importer.import(&identifier, &self.inner.options).await {
            Ok(file) => self.parse_file(id, file).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            debug!(%identifier, error = %err, "block failed to load");
            self.inner.queue.drain().await;
        }
        result
    }

    async fn parse_file(&self, id: BlockId, file: ImportedFile) -> Result<BlockId> {
        let processed = self.preprocess(&file).await?;
        self.build(
            id,
            file.identifier,
            &processed.content,
            &file.default_name,
            processed.dependencies,
        )
        .await
    }

    async fn build(
        &self,
        id: BlockId,
        identifier: FileIdentifier,
        contents: &str,
        default_name: &str,
        dependencies: Vec<String>,
    ) -> Result<BlockId> {
        let options = &self.inner.options;
        let debug_identifier = self.inner.importer.debug_identifier(&identifier, options);
        let stylesheet = parse_stylesheet(contents, &debug_identifier)?;

        let mut block = BlockParser::new(self)
            .parse(stylesheet, identifier, default_name)
            .await?;
        for dependency in dependencies {
            block.add_dependency(dependency);
        }
        let declared = block.name().to_string();
        let name = self.unique_name(&declared);
        if let Err(err) = block.set_name(name) {
            self.release_name(&declared);
            return Err(err);
        }
        debug!(name = block.name(), "parsed block");

        self.inner.graph.borrow_mut().insert(id, block);
        let implemented = self.inner.graph.borrow().check_implementations(id);
        if let Err(err) = implemented {
            self.inner.graph.borrow_mut().remove(id);
            self.release_name(&declared);
            return Err(err);
        }
        Ok(id)
    }

    async fn preprocess(&self, file: &ImportedFile) -> Result<ProcessedFile> {
        let options = &self.inner.options;
        let importer = &self.inner.importer;
        let full_path = match importer.filesystem_path(&file.identifier, options) {
            Some(path) => path.display().to_string(),
            None => importer.debug_identifier(&file.identifier, options),
        };

        let mut processed = if file.syntax == Syntax::Css {
            ProcessedFile::unchanged(file.contents.clone())
        } else {
            let preprocessor = self.preprocessor(file.syntax).ok_or_else(|| {
                CssBlocksError::block(format!(
                    "No preprocessor provided for {} files: {}",
                    file.syntax, full_path
                ))
            })?;
            trace!(path = %full_path, syntax = %file.syntax, "preprocessing");
            self.inner
                .queue
                .run(preprocessor.process(&full_path, file.contents.clone(), options, None))
                .await?
        };

        let chained = file.syntax == Syntax::Css || !options.disable_preprocess_chaining;
        if let Some(css) = self.preprocessor(Syntax::Css).filter(|_| chained) {
            let source_map = processed.source_map.clone();
            let next = self
                .inner
                .queue
                .run(css.process(&full_path, processed.content.clone(), options, source_map))
                .await?;
            processed = processed.chain(next);
        }
        Ok(processed)
    }

    fn preprocessor(&self, syntax: Syntax) -> Option<Rc<dyn Preprocessor>> {
        self.inner.preprocessors.borrow().get(&syntax).cloned()
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    fn reserve(&self, identifier: &FileIdentifier) -> BlockId {
        if let Some(id) = self.inner.ids.borrow().get(identifier) {
            return *id;
        }
        let id = self.inner.graph.borrow_mut().reserve();
        self.inner.ids.borrow_mut().insert(identifier.clone(), id);
        id
    }

    /// `name`, then `name-2`, `name-3`, ... for later blocks with the same
    /// declared name.
    fn unique_name(&self, name: &str) -> String {
        let mut names = self.inner.names.borrow_mut();
        let count = names.entry(name.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            name.to_string()
        } else {
            format!("{}-{}", name, count)
        }
    }

    /// Give back the last number handed out for `name` by a block that
    /// then failed to load.
    fn release_name(&self, name: &str) {
        let mut names = self.inner.names.borrow_mut();
        if let Some(count) = names.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                names.remove(name);
            }
        }
    }

    /// Whether the load of `from` is waiting, directly or through other
    /// loads, on the load of `to`.
    fn waits_on(&self, from: &FileIdentifier, to: &FileIdentifier) -> bool {
        let waiting = self.inner.waiting.borrow();
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(targets) = waiting.get(current) {
                stack.extend(targets.iter());
            }
        }
        false
    }

    fn add_wait(&self, from: &FileIdentifier, to: &FileIdentifier) {
        self.inner
            .waiting
            .borrow_mut()
            .entry(from.clone())
            .or_default()
            .push(to.clone());
    }

    fn remove_wait(&self, from: &FileIdentifier, to: &FileIdentifier) {
        let mut waiting = self.inner.waiting.borrow_mut();
        if let Some(targets) = waiting.get_mut(from) {
            if let Some(index) = targets.iter().position(|target| target == to) {
                targets.swap_remove(index);
            }
            if targets.is_empty() {
                waiting.remove(from);
            }
        }
    }
}
