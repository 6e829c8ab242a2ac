use crate::block::{Block, BlockGraph, ObjectKey, ObjectReference};
use crate::error::{CssBlocksError, Result, SourceLocation};
use crate::selector::{
    AttributeOperator, Combinator, CompoundSelector, ParsedSelector, ROOT_CLASS, SimpleSelector,
};

/// What one compound selector refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompoundObject {
    Own(ObjectKey),
    /// An object of a referenced block, e.g. `other.foo`.
    Foreign,
}

/// Register the block objects a selector names and check that the chain is
/// legal. Returns the key object when it belongs to this block.
pub(crate) fn classify_selector(
    block: &mut Block,
    graph: &BlockGraph,
    selector: &ParsedSelector,
    location: &SourceLocation,
) -> Result<Option<ObjectKey>> {
    let key_index = selector.combinator_count();
    let mut objects = Vec::with_capacity(key_index + 1);

    for (index, (combinator, compound)) in selector.compounds().enumerate() {
        if compound.pseudo_element.is_some() && index != key_index {
            return Err(CssBlocksError::syntax(
                format!("Pseudo-elements are only allowed on the key selector: `{}`", selector),
                location.clone(),
            ));
        }
        let object = classify_compound(block, graph, compound, selector, location)?;
        objects.push((combinator, object));
    }

    assert_valid_combinators(block, &objects, selector, location)?;
    Ok(match objects.last() {
        Some((_, CompoundObject::Own(key))) => Some(*key),
        _ => None,
    })
}

fn classify_compound(
    block: &mut Block,
    graph: &BlockGraph,
    compound: &CompoundSelector,
    selector: &ParsedSelector,
    location: &SourceLocation,
) -> Result<CompoundObject> {
    let fail = |message: String| Err(CssBlocksError::syntax(message, location.clone()));

    for node in &compound.nodes {
        match node {
            SimpleSelector::Id(id) => {
                return fail(format!("Id selectors are not allowed in blocks: `#{}` in `{}`", id, selector));
            }
            SimpleSelector::Universal => {
                return fail(format!("Universal selectors are not allowed in blocks: `{}`", selector));
            }
            SimpleSelector::Type(name) if block.reference(name).is_none() => {
                return fail(format!(
                    "Tag name selectors are not allowed in blocks: `{}` in `{}`",
                    name, selector
                ));
            }
            _ => {}
        }
    }

    if compound.nodes.iter().any(|node| matches!(node, SimpleSelector::Type(_))) {
        check_foreign_object(block, graph, compound, selector, location)?;
        return Ok(CompoundObject::Foreign);
    }

    let mut root = false;
    let mut class: Option<usize> = None;
    let mut state: Option<ObjectKey> = None;

    for node in &compound.nodes {
        match node {
            SimpleSelector::Class(name) if name == ROOT_CLASS => {
                if class.is_some() {
                    return fail(format!(
                        "Cannot put block classes on the block's root element: `{}`",
                        selector
                    ));
                }
                root = true;
            }
            SimpleSelector::Class(name) => {
                if root || (state.is_some() && class.is_none()) {
                    return fail(format!(
                        "Cannot put block classes on the block's root element: `{}`",
                        selector
                    ));
                }
                if let Some(existing) = class {
                    let existing = block.classes()[existing].name();
                    if existing != name {
                        return fail(format!(
                            "Cannot combine classes `.{}` and `.{}` on the same element in `{}`",
                            existing, name, selector
                        ));
                    }
                }
                class = Some(block.ensure_class(name));
            }
            SimpleSelector::Attribute(attribute) if attribute.is_state() => {
                let plain = attribute.flag.is_none()
                    && attribute
                        .operator
                        .is_none_or(|operator| operator == AttributeOperator::Equals);
                let Some((group, name)) = node.as_state().filter(|_| plain) else {
                    return fail(format!(
                        "States must be written as `[state|name]` or `[state|group=name]`: `{}`",
                        selector
                    ));
                };
                let key = block.ensure_state(class, group, name);
                if let Some(existing) = state {
                    if existing != key {
                        return fail(format!(
                            "Cannot combine states `{}` and `{}` on the same element in `{}`",
                            block.object_source(existing),
                            block.object_source(key),
                            selector
                        ));
                    }
                }
                state = Some(key);
            }
            _ => {}
        }
    }

    match (state, class, root) {
        (Some(key), _, _) => Ok(CompoundObject::Own(key)),
        (None, Some(index), _) => Ok(CompoundObject::Own(ObjectKey::Class(index))),
        (None, None, true) => Ok(CompoundObject::Own(ObjectKey::Root)),
        (None, None, false) => fail(format!(
            "Missing block object in selector component `{}` of `{}`",
            compound, selector
        )),
    }
}

/// Fail unless a compound naming a referenced block selects one object
/// that block defines. A block still loading further up a reference cycle
/// cannot be checked yet.
fn check_foreign_object(
    block: &Block,
    graph: &BlockGraph,
    compound: &CompoundSelector,
    selector: &ParsedSelector,
    location: &SourceLocation,
) -> Result<()> {
    let Some(reference) = ObjectReference::in_compound(compound) else {
        return Err(CssBlocksError::syntax(
            format!("`{}` must name one block object in `{}`", compound, selector),
            location.clone(),
        ));
    };
    let Some((name, target)) = reference
        .block
        .as_deref()
        .and_then(|name| block.reference(name).map(|target| (name, target)))
    else {
        return Ok(());
    };
    if !graph.is_complete(target) {
        return Ok(());
    }

    let local = reference.without_block();
    if graph.resolve_reference(target, &local).is_some() {
        return Ok(());
    }
    let class = ObjectReference {
        state: None,
        ..local.clone()
    };
    let message = match &local.class {
        Some(class_name) if graph.resolve_reference(target, &class).is_none() => {
            format!("No class named \"{}\" found in block \"{}\"", class_name, name)
        }
        _ => match &local.state {
            Some((group, state)) => format!(
                "No state `{}` found in block \"{}\"",
                SimpleSelector::state(group.as_deref(), state),
                name
            ),
            None => format!("Cannot find `{}` in block \"{}\"", compound, name),
        },
    };
    Err(CssBlocksError::block_at(message, location.clone()))
}

fn assert_valid_combinators(
    block: &Block,
    objects: &[(Option<Combinator>, CompoundObject)],
    selector: &ParsedSelector,
    location: &SourceLocation,
) -> Result<()> {
    let fail = |message: String| Err(CssBlocksError::syntax(message, location.clone()));

    for pair in objects.windows(2) {
        let (_, previous) = pair[0];
        let (combinator, next) = pair[1];
        let (CompoundObject::Own(previous), CompoundObject::Own(next), Some(combinator)) =
            (previous, next, combinator)
        else {
            continue;
        };
        if combinator.is_hierarchical() && previous.is_class_level() && next.is_root_level() {
            return fail(format!(
                "Illegal use of a class-level object ({}) as an ancestor of a root-level object ({}) in `{}`",
                block.object_source(previous),
                block.object_source(next),
                selector
            ));
        }
        if combinator.is_sibling() && previous.is_class_level() != next.is_class_level() {
            return fail(format!(
                "Illegal use of a class-level object and a root-level object as siblings: {} and {} in `{}`",
                block.object_source(previous),
                block.object_source(next),
                selector
            ));
        }
    }

    let mut class_level: Option<ObjectKey> = None;
    let mut root_level: Option<ObjectKey> = None;
    for (_, object) in objects {
        let CompoundObject::Own(key) = *object else {
            continue;
        };
        if key.is_class_level() {
            class_level = Some(key);
            continue;
        }
        if let Some(class) = class_level {
            return fail(format!(
                "Illegal use of a root-level object ({}) after a class-level object ({}) in `{}`",
                block.object_source(key),
                block.object_source(class),
                selector
            ));
        }
        if let Some(previous) = root_level.filter(|previous| *previous != key) {
            return fail(format!(
                "Distinct root-level objects {} and {} cannot be combined in `{}`",
                block.object_source(previous),
                block.object_source(key),
                selector
            ));
        }
        root_level = Some(key);
    }
    Ok(())
}
