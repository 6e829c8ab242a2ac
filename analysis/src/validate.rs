//! Rules for the styles that may share one element.

use css_blocks::{BlockGraph, ObjectId, ObjectKey};

use crate::element::ElementAnalysis;

type Validator = fn(&BlockGraph, &ElementAnalysis) -> Result<(), String>;

const VALIDATORS: &[Validator] = &[root_class, class_pairs, state_groups, state_parent];

pub(crate) fn validate_element(graph: &BlockGraph, element: &ElementAnalysis) -> Result<(), String> {
    VALIDATORS.iter().try_for_each(|validator| validator(graph, element))
}

/// Every pair of distinct styles of one block that can apply together.
fn coexisting_pairs(element: &ElementAnalysis) -> Vec<(ObjectId, ObjectId)> {
    let styles: Vec<ObjectId> = element.all_styles().into_iter().collect();
    let mut pairs = Vec::new();
    for (index, &a) in styles.iter().enumerate() {
        for &b in &styles[index + 1..] {
            if a.block == b.block && element.may_coexist(a, b) {
                pairs.push((a, b));
            }
        }
    }
    pairs
}

fn class_of(key: ObjectKey) -> Option<usize> {
    match key {
        ObjectKey::Class(index) | ObjectKey::State { class: Some(index), .. } => Some(index),
        _ => None,
    }
}

/// A block's root and its classes belong on different elements.
fn root_class(graph: &BlockGraph, element: &ElementAnalysis) -> Result<(), String> {
    for (a, b) in coexisting_pairs(element) {
        if a.key.is_root_level() != b.key.is_root_level() {
            let (root, class) = if a.key.is_root_level() { (a, b) } else { (b, a) };
            return Err(format!(
                "Cannot put block classes on the block's root element: `{}` and `{}`",
                graph.object(root).as_source(),
                graph.object(class).as_source()
            ));
        }
    }
    Ok(())
}

/// Two classes of one block cannot share an element.
fn class_pairs(graph: &BlockGraph, element: &ElementAnalysis) -> Result<(), String> {
    for (a, b) in coexisting_pairs(element) {
        if let (Some(first), Some(second)) = (class_of(a.key), class_of(b.key)) {
            if first != second {
                return Err(format!(
                    "Classes `{}` and `{}` from the same block `{}` are not allowed on the same element at the same time",
                    graph.object(a).as_source(),
                    graph.object(b).as_source(),
                    graph[a.block].name()
                ));
            }
        }
    }
    Ok(())
}

/// At most one state of an exclusive group applies.
fn state_groups(graph: &BlockGraph, element: &ElementAnalysis) -> Result<(), String> {
    for (a, b) in coexisting_pairs(element) {
        let (
            ObjectKey::State { class: first_class, .. },
            ObjectKey::State { class: second_class, .. },
        ) = (a.key, b.key)
        else {
            continue;
        };
        if first_class != second_class {
            continue;
        }
        let (first, second) = (graph.object(a), graph.object(b));
        let groups = first.state().and_then(|state| state.group()).zip(second.state().and_then(|state| state.group()));
        if matches!(groups, Some((x, y)) if x == y) {
            return Err(format!(
                "Cannot apply `{}` and `{}` at the same time; they belong to one exclusive state group",
                first.as_source(),
                second.as_source()
            ));
        }
    }
    Ok(())
}

/// A state needs its class (or the block root) on the same element.
fn state_parent(graph: &BlockGraph, element: &ElementAnalysis) -> Result<(), String> {
    let styles = element.all_styles();
    for style in &styles {
        if !matches!(style.key, ObjectKey::State { .. }) {
            continue;
        }
        let state = graph.object(*style);
        let Some(parent) = state.parent() else {
            continue;
        };
        let present = styles.contains(&parent.id()) && element.may_coexist(parent.id(), *style);
        if !present {
            return Err(format!(
                "Cannot use state `{}` without its parent `{}` also applied",
                state.as_source(),
                parent.as_source()
            ));
        }
    }
    Ok(())
}
