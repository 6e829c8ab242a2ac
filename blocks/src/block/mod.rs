//! The Block Object Model: one [`Block`] per parsed file, its classes and
//! states, and the [`BlockGraph`] arena that links blocks together.

mod object;
pub mod property;
pub mod reference;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Index;

pub use object::BlockObject;
pub use property::PropertyContainer;
pub use reference::{BlockReference, ObjectReference};

use crate::error::{CssBlocksError, Result};
use crate::importing::FileIdentifier;
use crate::options::Options;
use crate::selector::ParsedSelector;
use crate::stylesheet::{RuleId, Stylesheet};

/// Index of a block in its [`BlockGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) usize);

/// Which object inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKey {
    Root,
    Class(usize),
    /// A state on the root (`class: None`) or on a class.
    State { class: Option<usize>, state: usize },
}

impl ObjectKey {
    pub fn is_root_level(self) -> bool {
        matches!(self, ObjectKey::Root | ObjectKey::State { class: None, .. })
    }

    pub fn is_class_level(self) -> bool {
        !self.is_root_level()
    }
}

/// A block object anywhere in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub block: BlockId,
    pub key: ObjectKey,
}

// ---------------------------------------------------------------------------
// States and classes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct State {
    group: Option<String>,
    name: String,
    properties: PropertyContainer,
}

impl State {
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &PropertyContainer {
        &self.properties
    }

    pub fn matches(&self, group: Option<&str>, name: &str) -> bool {
        self.group.as_deref() == group && self.name == name
    }

    /// `[state|name]` or `[state|group=name]`.
    pub fn as_source(&self) -> String {
        match &self.group {
            Some(group) => format!("[state|{}={}]", group, self.name),
            None => format!("[state|{}]", self.name),
        }
    }

    /// `name` or `group-name`, the suffix used in generated names.
    pub fn suffix(&self) -> String {
        match &self.group {
            Some(group) => format!("{}-{}", group, self.name),
            None => self.name.clone(),
        }
    }
}

/// The states of the root or of one class. Unique by `(group, name)`.
#[derive(Debug, Clone, Default)]
pub struct StateContainer {
    states: Vec<State>,
}

impl StateContainer {
    pub fn iter(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    pub fn get(&self, index: usize) -> Option<&State> {
        self.states.get(index)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn find(&self, group: Option<&str>, name: &str) -> Option<usize> {
        self.states.iter().position(|state| state.matches(group, name))
    }

    /// Names of the exclusive groups, in declaration order.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups = Vec::new();
        for group in self.states.iter().filter_map(State::group) {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        groups
    }

    pub(crate) fn ensure_state(&mut self, group: Option<&str>, name: &str) -> usize {
        if let Some(index) = self.find(group, name) {
            return index;
        }
        self.states.push(State {
            group: group.map(str::to_string),
            name: name.to_string(),
            properties: PropertyContainer::default(),
        });
        self.states.len() - 1
    }
}

#[derive(Debug, Clone)]
pub struct BlockClass {
    name: String,
    states: StateContainer,
    properties: PropertyContainer,
}

impl BlockClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &StateContainer {
        &self.states
    }

    pub fn properties(&self) -> &PropertyContainer {
        &self.properties
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// One parsed block file.
#[derive(Debug, Clone)]
pub struct Block {
    name: String,
    name_locked: bool,
    identifier: FileIdentifier,
    debug_identifier: String,
    base: Option<BlockId>,
    /// The local reference name `extends` used.
    base_name: Option<String>,
    implements: Vec<BlockId>,
    references: BTreeMap<String, BlockId>,
    properties: PropertyContainer,
    states: StateContainer,
    classes: Vec<BlockClass>,
    dependencies: BTreeSet<String>,
    stylesheet: Stylesheet,
    /// Parsed selectors of every rule in `stylesheet`.
    selectors: HashMap<RuleId, Vec<ParsedSelector>>,
}

impl Block {
    pub fn new(name: impl Into<String>, identifier: FileIdentifier, debug_identifier: impl Into<String>) -> Self {
        let debug_identifier = debug_identifier.into();
        Block {
            name: name.into(),
            name_locked: false,
            identifier,
            stylesheet: Stylesheet::new(debug_identifier.clone()),
            debug_identifier,
            base: None,
            base_name: None,
            implements: Vec::new(),
            references: BTreeMap::new(),
            properties: PropertyContainer::default(),
            states: StateContainer::default(),
            classes: Vec::new(),
            dependencies: BTreeSet::new(),
            selectors: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assign the final name. Allowed exactly once.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        if self.name_locked {
            return Err(CssBlocksError::block(format!(
                "Cannot set the name of block `{}` more than once",
                self.name
            )));
        }
        self.name = name.into();
        self.name_locked = true;
        Ok(())
    }

    pub fn identifier(&self) -> &FileIdentifier {
        &self.identifier
    }

    pub fn debug_identifier(&self) -> &str {
        &self.debug_identifier
    }

    pub fn base(&self) -> Option<BlockId> {
        self.base
    }

    pub fn base_name(&self) -> Option<&str> {
        self.base_name.as_deref()
    }

    pub fn implements(&self) -> &[BlockId] {
        &self.implements
    }

    pub fn reference(&self, name: &str) -> Option<BlockId> {
        self.references.get(name).copied()
    }

    pub fn references(&self) -> impl Iterator<Item = (&str, BlockId)> {
        self.references.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn classes(&self) -> &[BlockClass] {
        &self.classes
    }

    pub fn find_class(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|class| class.name == name)
    }

    /// Root-level states.
    pub fn states(&self) -> &StateContainer {
        &self.states
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(String::as_str)
    }

    pub fn stylesheet(&self) -> &Stylesheet {
        &self.stylesheet
    }

    /// Source selectors of a rule in this block's stylesheet.
    pub fn parsed_selectors(&self, rule: RuleId) -> &[ParsedSelector] {
        self.selectors.get(&rule).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The state container a key's states live in.
    pub fn state_container(&self, class: Option<usize>) -> Option<&StateContainer> {
        match class {
            None => Some(&self.states),
            Some(index) => self.classes.get(index).map(|class| &class.states),
        }
    }

    pub fn contains(&self, key: ObjectKey) -> bool {
        match key {
            ObjectKey::Root => true,
            ObjectKey::Class(index) => index < self.classes.len(),
            ObjectKey::State { class, state } => self
                .state_container(class)
                .is_some_and(|states| state < states.len()),
        }
    }

    pub fn properties(&self, key: ObjectKey) -> Option<&PropertyContainer> {
        match key {
            ObjectKey::Root => Some(&self.properties),
            ObjectKey::Class(index) => self.classes.get(index).map(|class| &class.properties),
            ObjectKey::State { class, state } => self
                .state_container(class)?
                .get(state)
                .map(|state| &state.properties),
        }
    }

    /// Source syntax for an object: `.root`, `.foo`, `[state|x]`,
    /// `.foo[state|g=x]`.
    pub fn object_source(&self, key: ObjectKey) -> String {
        match key {
            ObjectKey::Root => ".root".to_string(),
            ObjectKey::Class(index) => format!(".{}", self.class_name(index)),
            ObjectKey::State { class, state } => {
                let state = self
                    .state_container(class)
                    .and_then(|states| states.get(state))
                    .map(State::as_source)
                    .unwrap_or_default();
                match class {
                    Some(index) => format!(".{}{}", self.class_name(index), state),
                    None => state,
                }
            }
        }
    }

    fn class_name(&self, index: usize) -> &str {
        self.classes.get(index).map_or("", |class| class.name.as_str())
    }

    // -----------------------------------------------------------------------
    // Construction (parser only)
    // -----------------------------------------------------------------------

    pub(crate) fn set_base(&mut self, base: BlockId, local_name: &str) {
        self.base = Some(base);
        self.base_name = Some(local_name.to_string());
    }

    pub(crate) fn add_implements(&mut self, block: BlockId) {
        if !self.implements.contains(&block) {
            self.implements.push(block);
        }
    }

    pub(crate) fn add_reference(&mut self, name: String, block: BlockId) {
        self.references.insert(name, block);
    }

    pub(crate) fn add_dependency(&mut self, path: impl Into<String>) {
        self.dependencies.insert(path.into());
    }

    pub(crate) fn ensure_class(&mut self, name: &str) -> usize {
        if let Some(index) = self.find_class(name) {
            return index;
        }
        self.classes.push(BlockClass {
            name: name.to_string(),
            states: StateContainer::default(),
            properties: PropertyContainer::default(),
        });
        self.classes.len() - 1
    }

    /// Get or create a state on the root or on an existing class.
    pub(crate) fn ensure_state(&mut self, class: Option<usize>, group: Option<&str>, name: &str) -> ObjectKey {
        let container = match class.and_then(|index| self.classes.get_mut(index)) {
            Some(class) => &mut class.states,
            None => &mut self.states,
        };
        let state = container.ensure_state(group, name);
        ObjectKey::State { class, state }
    }

    pub(crate) fn properties_mut(&mut self, key: ObjectKey) -> Option<&mut PropertyContainer> {
        match key {
            ObjectKey::Root => Some(&mut self.properties),
            ObjectKey::Class(index) => self.classes.get_mut(index).map(|class| &mut class.properties),
            ObjectKey::State { class, state } => {
                let container = match class {
                    None => &mut self.states,
                    Some(index) => &mut self.classes.get_mut(index)?.states,
                };
                container.states.get_mut(state).map(|state| &mut state.properties)
            }
        }
    }

    pub(crate) fn set_stylesheet(&mut self, stylesheet: Stylesheet, selectors: HashMap<RuleId, Vec<ParsedSelector>>) {
        self.stylesheet = stylesheet;
        self.selectors = selectors;
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Arena of blocks. A slot is reserved when a load starts and filled once
/// the block has parsed.
#[derive(Debug, Default)]
pub struct BlockGraph {
    slots: Vec<Option<Block>>,
}

impl BlockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn is_complete(&self, id: BlockId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|block| (BlockId(index), block)))
    }

    /// View an object. The object must exist.
    pub fn object(&self, id: ObjectId) -> BlockObject<'_> {
        BlockObject::new(self, id)
    }

    pub fn root(&self, block: BlockId) -> BlockObject<'_> {
        self.object(ObjectId {
            block,
            key: ObjectKey::Root,
        })
    }

    /// Find an object by its reference syntax, as seen from `block`.
    ///
    /// A leading block name resolves through `block`'s references. Objects
    /// missing from a block are looked for along its base chain.
    pub fn lookup(&self, block: BlockId, reference: &str) -> Option<BlockObject<'_>> {
        let reference = ObjectReference::parse(reference)?;
        self.resolve_reference(block, &reference)
    }

    pub fn resolve_reference(&self, block: BlockId, reference: &ObjectReference) -> Option<BlockObject<'_>> {
        let source = self.get(block)?;
        if let Some(name) = &reference.block {
            let target = source.reference(name)?;
            return self.resolve_reference(target, &reference.without_block());
        }

        let mut current = Some(block);
        while let Some(id) = current {
            let candidate = self.get(id)?;
            if let Some(key) = find_own(candidate, reference) {
                return Some(self.object(ObjectId { block: id, key }));
            }
            current = candidate.base();
        }
        None
    }

    /// The human-readable object tree of a block.
    pub fn debug_lines(&self, block: BlockId, options: &Options) -> Vec<String> {
        let Some(source) = self.get(block) else {
            return Vec::new();
        };
        let mut lines = vec![format!("Source: {}", source.debug_identifier())];
        for object in self.root(block).all(false) {
            let depth = match object.key() {
                ObjectKey::Root => 0,
                ObjectKey::Class(_) | ObjectKey::State { class: None, .. } => 1,
                ObjectKey::State { class: Some(_), .. } => 2,
            };
            lines.push(format!(
                "{}{} => .{}",
                "  ".repeat(depth),
                object.as_source(),
                object.css_class(options)
            ));
        }
        lines
    }

    /// Fail when `block` does not define every object of the blocks it
    /// implements.
    pub fn check_implementations(&self, block: BlockId) -> Result<()> {
        let Some(source) = self.get(block) else {
            return Ok(());
        };
        let provided: BTreeSet<String> = self
            .root(block)
            .all(true)
            .iter()
            .map(BlockObject::as_source)
            .collect();

        for &interface in source.implements() {
            let Some(implemented) = self.get(interface) else {
                continue;
            };
            let missing: Vec<String> = self
                .root(interface)
                .all(true)
                .iter()
                .map(BlockObject::as_source)
                .filter(|selector| !provided.contains(selector))
                .collect();
            if !missing.is_empty() {
                return Err(CssBlocksError::block(format!(
                    "Missing implementations for {} from {}",
                    missing.join(", "),
                    implemented.debug_identifier()
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn reserve(&mut self) -> BlockId {
        self.slots.push(None);
        BlockId(self.slots.len() - 1)
    }

    pub(crate) fn insert(&mut self, id: BlockId, block: Block) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            *slot = Some(block);
        }
    }

    /// Empty a slot again, leaving the block unloaded.
    pub(crate) fn remove(&mut self, id: BlockId) -> Option<Block> {
        self.slots.get_mut(id.0).and_then(Option::take)
    }
}

impl Index<BlockId> for BlockGraph {
    type Output = Block;

    fn index(&self, id: BlockId) -> &Block {
        match self.get(id) {
            Some(block) => block,
            None => panic!("block {:?} is not loaded", id),
        }
    }
}

fn find_own(block: &Block, reference: &ObjectReference) -> Option<ObjectKey> {
    let class = match reference.class.as_deref() {
        None | Some("root") => None,
        Some(name) => Some(block.find_class(name)?),
    };
    match &reference.state {
        None => Some(class.map_or(ObjectKey::Root, ObjectKey::Class)),
        Some((group, name)) => {
            let state = block.state_container(class)?.find(group.as_deref(), name)?;
            Some(ObjectKey::State { class, state })
        }
    }
}
