use std::collections::BTreeSet;
use std::fmt;

use crate::block::{Block, BlockClass, BlockGraph, ObjectId, ObjectKey, PropertyContainer, State, find_own};
use crate::block::reference::ObjectReference;
use crate::options::{Options, OutputMode};
use crate::selector::CompoundSelector;

/// A borrowed view of one block object: a block root, a class or a state.
#[derive(Clone, Copy)]
pub struct BlockObject<'g> {
    graph: &'g BlockGraph,
    id: ObjectId,
}

impl PartialEq for BlockObject<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BlockObject<'_> {}

impl fmt::Debug for BlockObject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockObject({} {})", self.block().name(), self.as_source())
    }
}

impl<'g> BlockObject<'g> {
    pub(crate) fn new(graph: &'g BlockGraph, id: ObjectId) -> Self {
        BlockObject { graph, id }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn key(&self) -> ObjectKey {
        self.id.key
    }

    pub fn block(&self) -> &'g Block {
        &self.graph[self.id.block]
    }

    pub fn class(&self) -> Option<&'g BlockClass> {
        let index = match self.id.key {
            ObjectKey::Class(index) | ObjectKey::State { class: Some(index), .. } => index,
            _ => return None,
        };
        self.block().classes().get(index)
    }

    pub fn state(&self) -> Option<&'g State> {
        match self.id.key {
            ObjectKey::State { class, state } => self.block().state_container(class)?.get(state),
            _ => None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.id.key == ObjectKey::Root
    }

    pub fn as_source(&self) -> String {
        self.block().object_source(self.id.key)
    }

    /// Name used for this object in `:export` rules and analyses.
    pub fn local_name(&self) -> String {
        let owner = self.class().map_or("root", BlockClass::name);
        match self.state() {
            Some(state) => format!("{}--{}", owner, state.suffix()),
            None => owner.to_string(),
        }
    }

    /// The generated class name.
    pub fn css_class(&self, options: &Options) -> String {
        match options.output_mode {
            OutputMode::Bem => {
                let mut class = self.block().name().to_string();
                if let Some(owner) = self.class() {
                    class.push_str("__");
                    class.push_str(owner.name());
                }
                if let Some(state) = self.state() {
                    class.push_str("--");
                    class.push_str(&state.suffix());
                }
                class
            }
        }
    }

    pub fn properties(&self) -> &'g PropertyContainer {
        static EMPTY: PropertyContainer = PropertyContainer::empty();
        self.block().properties(self.id.key).unwrap_or(&EMPTY)
    }

    /// The object this one is scoped to: a state's class or root, a class's
    /// root.
    pub fn parent(&self) -> Option<BlockObject<'g>> {
        let key = match self.id.key {
            ObjectKey::Root => return None,
            ObjectKey::Class(_) | ObjectKey::State { class: None, .. } => ObjectKey::Root,
            ObjectKey::State { class: Some(index), .. } => ObjectKey::Class(index),
        };
        Some(self.sibling(key))
    }

    /// The same-named object in the nearest ancestor block that has one.
    pub fn base(&self) -> Option<BlockObject<'g>> {
        let reference = self.reference();
        let mut current = self.block().base();
        while let Some(id) = current {
            let ancestor = self.graph.get(id)?;
            if let Some(key) = find_own(ancestor, &reference) {
                return Some(BlockObject::new(self.graph, ObjectId { block: id, key }));
            }
            current = ancestor.base();
        }
        None
    }

    /// This object followed by every ancestor it overrides, nearest first.
    pub fn resolve_styles(&self) -> Vec<BlockObject<'g>> {
        let mut styles = vec![*self];
        let mut current = self.base();
        while let Some(object) = current {
            if styles.contains(&object) {
                break;
            }
            styles.push(object);
            current = object.base();
        }
        styles
    }

    /// This object and the objects it owns. With `include_inherited`, also
    /// the objects inherited from the base chain that are not redefined.
    pub fn all(&self, include_inherited: bool) -> Vec<BlockObject<'g>> {
        let block = self.block();
        let mut objects = vec![*self];
        match self.id.key {
            ObjectKey::Root => {
                objects.extend(self.states_of(None));
                for index in 0..block.classes().len() {
                    objects.push(self.sibling(ObjectKey::Class(index)));
                    objects.extend(self.states_of(Some(index)));
                }
            }
            ObjectKey::Class(index) => objects.extend(self.states_of(Some(index))),
            ObjectKey::State { .. } => return objects,
        }

        if include_inherited {
            if let Some(base) = self.base() {
                let own: BTreeSet<String> = objects.iter().map(BlockObject::as_source).collect();
                let inherited: Vec<_> = base
                    .all(true)
                    .into_iter()
                    .filter(|object| !own.contains(&object.as_source()))
                    .collect();
                objects.extend(inherited);
            }
        }
        objects
    }

    /// Whether `compound` selects this object in its own block's source.
    /// Pseudo-classes and plain attribute selectors are ignored.
    pub fn matches(&self, compound: &CompoundSelector) -> bool {
        let Some(reference) = ObjectReference::in_compound(compound) else {
            return false;
        };
        reference.block.is_none() && find_own(self.block(), &reference) == Some(self.id.key)
    }

    fn sibling(&self, key: ObjectKey) -> BlockObject<'g> {
        BlockObject::new(
            self.graph,
            ObjectId {
                block: self.id.block,
                key,
            },
        )
    }

    fn states_of(&self, class: Option<usize>) -> Vec<BlockObject<'g>> {
        let count = self.block().state_container(class).map_or(0, |states| states.len());
        (0..count)
            .map(|state| self.sibling(ObjectKey::State { class, state }))
            .collect()
    }

    /// This object as a block-relative reference.
    fn reference(&self) -> ObjectReference {
        ObjectReference {
            block: None,
            class: self.class().map(|class| class.name().to_string()),
            state: self
                .state()
                .map(|state| (state.group().map(str::to_string), state.name().to_string())),
        }
    }
}
