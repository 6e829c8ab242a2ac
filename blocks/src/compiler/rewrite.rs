use std::collections::HashMap;

use crate::block::{BlockGraph, BlockId, BlockObject, ObjectReference};
use crate::options::Options;
use crate::selector::{CompoundSelector, ParsedSelector, SimpleSelector, selector_list};
use crate::stylesheet::{RuleId, Stylesheet};

/// Rewrite every rule selector of `block`'s stylesheet to generated class
/// names. Returns the rewritten selectors by rule.
pub(crate) fn rewrite_rules(
    graph: &BlockGraph,
    block: BlockId,
    options: &Options,
    stylesheet: &mut Stylesheet,
) -> HashMap<RuleId, Vec<ParsedSelector>> {
    let source = &graph[block];
    let mut rewritten = HashMap::new();
    stylesheet.walk_rules_mut(&mut |rule| {
        let parsed = source.parsed_selectors(rule.id);
        if parsed.is_empty() {
            return;
        }
        let selectors: Vec<ParsedSelector> = parsed
            .iter()
            .map(|selector| rewrite_selector(graph, block, selector, options))
            .collect();
        rule.selector = selector_list(&selectors);
        rewritten.insert(rule.id, selectors);
    });
    rewritten
}

/// A selector of `block`'s source with every block object replaced by its
/// generated class.
pub fn rewrite_selector(graph: &BlockGraph, block: BlockId, selector: &ParsedSelector, options: &Options) -> ParsedSelector {
    selector.map_compounds(|compound| rewrite_compound(graph, block, compound, options))
}

fn rewrite_compound(graph: &BlockGraph, block: BlockId, compound: &CompoundSelector, options: &Options) -> CompoundSelector {
    let mut consumed = vec![false; compound.nodes.len()];
    let mut nodes = Vec::with_capacity(compound.nodes.len());
    for index in 0..compound.nodes.len() {
        if consumed[index] {
            continue;
        }
        match object_at(graph, block, &compound.nodes, index) {
            Some((object, parts)) => {
                for part in parts {
                    consumed[part] = true;
                }
                nodes.push(SimpleSelector::Class(object.css_class(options)));
            }
            None => nodes.push(compound.nodes[index].clone()),
        }
    }
    CompoundSelector {
        nodes,
        pseudo_element: compound.pseudo_element.clone(),
    }
}

/// The block object named starting at `nodes[start]`, and the indices of
/// every node that names it.
///
/// An object is an optional block name, then an optional class, then an
/// optional state: `.root`, `.class`, `[state|x]`, `.class[state|x]` for
/// this block, `other`, `other.class`, `other[state|x]`,
/// `other.class[state|x]` for a referenced block. Other simple selectors
/// may sit between the parts (`.class:hover[state|x]`) and stay as written.
/// A second class or block name ends the object.
fn object_at<'g>(
    graph: &'g BlockGraph,
    block: BlockId,
    nodes: &[SimpleSelector],
    start: usize,
) -> Option<(BlockObject<'g>, Vec<usize>)> {
    let mut reference = ObjectReference::default();
    let mut parts = vec![start];
    match &nodes[start] {
        SimpleSelector::Type(name) => reference.block = Some(name.clone()),
        SimpleSelector::Class(name) => reference.class = Some(name.clone()),
        node => {
            let (group, name) = node.as_state()?;
            reference.state = Some((group.map(str::to_string), name.to_string()));
        }
    }

    if reference.state.is_none() {
        for (index, node) in nodes.iter().enumerate().skip(start + 1) {
            match node {
                SimpleSelector::Type(_) => break,
                SimpleSelector::Class(name) if reference.class.is_none() => {
                    reference.class = Some(name.clone());
                    parts.push(index);
                }
                SimpleSelector::Class(_) => break,
                node => {
                    if let Some((group, name)) = node.as_state() {
                        reference.state = Some((group.map(str::to_string), name.to_string()));
                        parts.push(index);
                        break;
                    }
                }
            }
        }
    }

    graph
        .resolve_reference(block, &reference)
        .map(|object| (object, parts))
}
