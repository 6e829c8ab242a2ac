use std::collections::{BTreeMap, BTreeSet};

/// Shorthand properties and the properties they set.
const SHORTHANDS: &[(&str, &[&str])] = &[
    ("margin", &["margin-top", "margin-right", "margin-bottom", "margin-left"]),
    ("padding", &["padding-top", "padding-right", "padding-bottom", "padding-left"]),
    (
        "border",
        &[
            "border-width",
            "border-style",
            "border-color",
            "border-top",
            "border-right",
            "border-bottom",
            "border-left",
        ],
    ),
    (
        "border-width",
        &["border-top-width", "border-right-width", "border-bottom-width", "border-left-width"],
    ),
    (
        "border-style",
        &["border-top-style", "border-right-style", "border-bottom-style", "border-left-style"],
    ),
    (
        "border-color",
        &["border-top-color", "border-right-color", "border-bottom-color", "border-left-color"],
    ),
    ("border-top", &["border-top-width", "border-top-style", "border-top-color"]),
    ("border-right", &["border-right-width", "border-right-style", "border-right-color"]),
    ("border-bottom", &["border-bottom-width", "border-bottom-style", "border-bottom-color"]),
    ("border-left", &["border-left-width", "border-left-style", "border-left-color"]),
    (
        "border-radius",
        &[
            "border-top-left-radius",
            "border-top-right-radius",
            "border-bottom-right-radius",
            "border-bottom-left-radius",
        ],
    ),
    (
        "background",
        &[
            "background-color",
            "background-image",
            "background-repeat",
            "background-attachment",
            "background-position",
            "background-size",
            "background-origin",
            "background-clip",
        ],
    ),
    (
        "font",
        &[
            "font-style",
            "font-variant",
            "font-weight",
            "font-stretch",
            "font-size",
            "line-height",
            "font-family",
        ],
    ),
    ("flex", &["flex-grow", "flex-shrink", "flex-basis"]),
    ("flex-flow", &["flex-direction", "flex-wrap"]),
    ("list-style", &["list-style-type", "list-style-position", "list-style-image"]),
    ("outline", &["outline-width", "outline-style", "outline-color"]),
    ("overflow", &["overflow-x", "overflow-y"]),
    ("text-decoration", &["text-decoration-line", "text-decoration-style", "text-decoration-color"]),
    (
        "transition",
        &["transition-property", "transition-duration", "transition-timing-function", "transition-delay"],
    ),
    (
        "animation",
        &[
            "animation-name",
            "animation-duration",
            "animation-timing-function",
            "animation-delay",
            "animation-iteration-count",
            "animation-direction",
            "animation-fill-mode",
            "animation-play-state",
        ],
    ),
    ("columns", &["column-width", "column-count"]),
    ("gap", &["row-gap", "column-gap"]),
    ("place-items", &["align-items", "justify-items"]),
    ("place-content", &["align-content", "justify-content"]),
    ("inset", &["top", "right", "bottom", "left"]),
];

/// `property` plus everything it sets, transitively.
pub fn expand_property(property: &str) -> BTreeSet<String> {
    let mut expanded = BTreeSet::new();
    let mut pending = vec![property.to_string()];
    while let Some(next) = pending.pop() {
        if !expanded.insert(next.clone()) {
            continue;
        }
        if let Some((_, longhands)) = SHORTHANDS.iter().find(|(name, _)| *name == next) {
            pending.extend(longhands.iter().map(|longhand| longhand.to_string()));
        }
    }
    expanded
}

/// Whether setting one property can change the value of the other.
pub fn properties_conflict(a: &str, b: &str) -> bool {
    a == b || !expand_property(a).is_disjoint(&expand_property(b))
}

/// Property names declared for one block object, keyed by pseudo-element.
#[derive(Debug, Clone, Default)]
pub struct PropertyContainer {
    properties: BTreeMap<Option<String>, BTreeSet<String>>,
}

impl PropertyContainer {
    pub const fn empty() -> Self {
        PropertyContainer {
            properties: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, property: &str, pseudo_element: Option<&str>) {
        self.properties
            .entry(pseudo_element.map(str::to_string))
            .or_default()
            .insert(property.to_string());
    }

    pub fn get(&self, pseudo_element: Option<&str>) -> impl Iterator<Item = &str> {
        self.properties
            .get(&pseudo_element.map(str::to_string))
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn contains(&self, property: &str, pseudo_element: Option<&str>) -> bool {
        self.get(pseudo_element).any(|declared| declared == property)
    }

    pub fn pseudo_elements(&self) -> impl Iterator<Item = Option<&str>> {
        self.properties.keys().map(|key| key.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.properties.values().all(BTreeSet::is_empty)
    }

    /// Properties in `self` that conflict with some property in `other`
    /// under the same pseudo-element.
    pub fn conflicts(&self, other: &PropertyContainer, pseudo_element: Option<&str>) -> BTreeSet<String> {
        self.get(pseudo_element)
            .filter(|mine| other.get(pseudo_element).any(|theirs| properties_conflict(mine, theirs)))
            .map(str::to_string)
            .collect()
    }
}
