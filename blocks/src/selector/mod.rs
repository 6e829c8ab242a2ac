//! Selector chains as the block grammar sees them.

mod parse;

use std::fmt;

use cssparser::{serialize_identifier, serialize_string};

pub use parse::{SelectorError, parse_selectors};

/// The reserved class naming a block's root element.
pub const ROOT_CLASS: &str = "root";
/// The attribute namespace that marks a state selector.
pub const STATE_NAMESPACE: &str = "state";

const LEGACY_PSEUDO_ELEMENTS: &[&str] = &["before", "after", "first-line", "first-letter"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    /// ` `
    Descendant,
    /// `>`
    Child,
    /// `+`
    NextSibling,
    /// `~`
    SubsequentSibling,
}

impl Combinator {
    pub fn is_hierarchical(self) -> bool {
        matches!(self, Combinator::Descendant | Combinator::Child)
    }

    pub fn is_sibling(self) -> bool {
        !self.is_hierarchical()
    }

    /// `>` and `+` relate adjacent elements; ` ` and `~` may skip some.
    pub fn is_contiguous(self) -> bool {
        matches!(self, Combinator::Child | Combinator::NextSibling)
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Combinator::Descendant => " ",
            Combinator::Child => " > ",
            Combinator::NextSibling => " + ",
            Combinator::SubsequentSibling => " ~ ",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeOperator {
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

impl AttributeOperator {
    fn as_str(self) -> &'static str {
        match self {
            AttributeOperator::Equals => "=",
            AttributeOperator::Includes => "~=",
            AttributeOperator::DashMatch => "|=",
            AttributeOperator::Prefix => "^=",
            AttributeOperator::Suffix => "$=",
            AttributeOperator::Substring => "*=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeSelector {
    pub namespace: Option<String>,
    pub name: String,
    pub operator: Option<AttributeOperator>,
    pub value: Option<String>,
    pub flag: Option<String>,
}

impl AttributeSelector {
    pub fn is_state(&self) -> bool {
        self.namespace.as_deref() == Some(STATE_NAMESPACE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimpleSelector {
    Type(String),
    Universal,
    Class(String),
    Id(String),
    Attribute(AttributeSelector),
    PseudoClass {
        name: String,
        /// Raw argument text for functional pseudo-classes.
        argument: Option<String>,
    },
}

impl SimpleSelector {
    pub fn state(group: Option<&str>, name: &str) -> Self {
        let (attribute, operator, value) = match group {
            Some(group) => (group, Some(AttributeOperator::Equals), Some(name.to_string())),
            None => (name, None, None),
        };
        SimpleSelector::Attribute(AttributeSelector {
            namespace: Some(STATE_NAMESPACE.to_string()),
            name: attribute.to_string(),
            operator,
            value,
            flag: None,
        })
    }

    pub fn is_root(&self) -> bool {
        matches!(self, SimpleSelector::Class(name) if name == ROOT_CLASS)
    }

    /// `(group, name)` when this is a state selector.
    ///
    /// `[state|x]` is the boolean state `x`; `[state|g=x]` is member `x` of
    /// group `g`.
    pub fn as_state(&self) -> Option<(Option<&str>, &str)> {
        match self {
            SimpleSelector::Attribute(attribute) if attribute.is_state() => {
                match &attribute.value {
                    Some(value) => Some((Some(attribute.name.as_str()), value.as_str())),
                    None => Some((None, attribute.name.as_str())),
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PseudoElement {
    pub name: String,
    /// Written with a single colon (`:before`).
    pub legacy: bool,
}

impl PseudoElement {
    pub fn is_legacy_name(name: &str) -> bool {
        LEGACY_PSEUDO_ELEMENTS.contains(&name)
    }
}

/// Simple selectors applying to one element, plus an optional trailing
/// pseudo-element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CompoundSelector {
    pub nodes: Vec<SimpleSelector>,
    pub pseudo_element: Option<PseudoElement>,
}

impl CompoundSelector {
    pub fn new(nodes: Vec<SimpleSelector>) -> Self {
        CompoundSelector {
            nodes,
            pseudo_element: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.pseudo_element.is_none()
    }

    /// Both compounds on one element: `self`'s nodes, then `other`'s nodes
    /// not already present.
    pub fn merged(&self, other: &CompoundSelector) -> CompoundSelector {
        let mut nodes = self.nodes.clone();
        for node in &other.nodes {
            if !nodes.contains(node) {
                nodes.push(node.clone());
            }
        }
        CompoundSelector {
            nodes,
            pseudo_element: self
                .pseudo_element
                .clone()
                .or_else(|| other.pseudo_element.clone()),
        }
    }
}

/// A complex selector: a head compound and `(combinator, compound)` links
/// to the right of it. The last compound is the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedSelector {
    head: CompoundSelector,
    tail: Vec<(Combinator, CompoundSelector)>,
}

impl ParsedSelector {
    pub fn new(key: CompoundSelector) -> Self {
        ParsedSelector {
            head: key,
            tail: Vec::new(),
        }
    }

    pub fn push(&mut self, combinator: Combinator, compound: CompoundSelector) {
        self.tail.push((combinator, compound));
    }

    /// Extend the chain to the right.
    pub fn then(mut self, combinator: Combinator, compound: CompoundSelector) -> Self {
        self.push(combinator, compound);
        self
    }

    pub fn key(&self) -> &CompoundSelector {
        self.tail.last().map_or(&self.head, |(_, compound)| compound)
    }

    pub fn pseudo_element(&self) -> Option<&PseudoElement> {
        self.key().pseudo_element.as_ref()
    }

    /// The combinator joining the context to the key.
    pub fn combinator(&self) -> Option<Combinator> {
        self.tail.last().map(|(combinator, _)| *combinator)
    }

    /// Everything before the last combinator.
    pub fn context(&self) -> Option<ParsedSelector> {
        self.split_last().map(|(context, _)| context)
    }

    /// The context and the combinator joining it to the key.
    pub fn split_last(&self) -> Option<(ParsedSelector, Combinator)> {
        let (combinator, _) = self.tail.last()?;
        let context = ParsedSelector {
            head: self.head.clone(),
            tail: self.tail[..self.tail.len() - 1].to_vec(),
        };
        Some((context, *combinator))
    }

    pub fn combinator_count(&self) -> usize {
        self.tail.len()
    }

    /// Compounds left to right, each with the combinator preceding it.
    pub fn compounds(&self) -> impl Iterator<Item = (Option<Combinator>, &CompoundSelector)> {
        std::iter::once((None, &self.head)).chain(
            self.tail
                .iter()
                .map(|(combinator, compound)| (Some(*combinator), compound)),
        )
    }

    /// A new chain with every compound replaced by `f(compound)`.
    pub fn map_compounds(&self, mut f: impl FnMut(&CompoundSelector) -> CompoundSelector) -> ParsedSelector {
        ParsedSelector {
            head: f(&self.head),
            tail: self
                .tail
                .iter()
                .map(|(combinator, compound)| (*combinator, f(compound)))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

impl fmt::Display for SimpleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimpleSelector::Type(name) => serialize_identifier(name, f),
            SimpleSelector::Universal => f.write_str("*"),
            SimpleSelector::Class(name) => {
                f.write_str(".")?;
                serialize_identifier(name, f)
            }
            SimpleSelector::Id(name) => {
                f.write_str("#")?;
                serialize_identifier(name, f)
            }
            SimpleSelector::Attribute(attribute) => {
                f.write_str("[")?;
                if let Some(namespace) = &attribute.namespace {
                    if namespace != "*" {
                        serialize_identifier(namespace, f)?;
                    } else {
                        f.write_str("*")?;
                    }
                    f.write_str("|")?;
                }
                serialize_identifier(&attribute.name, f)?;
                if let (Some(operator), Some(value)) = (attribute.operator, &attribute.value) {
                    f.write_str(operator.as_str())?;
                    if is_identifier(value) {
                        serialize_identifier(value, f)?;
                    } else {
                        serialize_string(value, f)?;
                    }
                }
                if let Some(flag) = &attribute.flag {
                    write!(f, " {}", flag)?;
                }
                f.write_str("]")
            }
            SimpleSelector::PseudoClass { name, argument } => {
                f.write_str(":")?;
                serialize_identifier(name, f)?;
                if let Some(argument) = argument {
                    write!(f, "({})", argument)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for CompoundSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            write!(f, "{}", node)?;
        }
        if let Some(pseudo) = &self.pseudo_element {
            f.write_str(if pseudo.legacy { ":" } else { "::" })?;
            serialize_identifier(&pseudo.name, f)?;
        }
        Ok(())
    }
}

impl fmt::Display for ParsedSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        for (combinator, compound) in &self.tail {
            write!(f, "{}{}", combinator, compound)?;
        }
        Ok(())
    }
}

/// Join selectors the way they are written in a rule prelude.
pub fn selector_list(selectors: &[ParsedSelector]) -> String {
    selectors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    let first = match chars.next() {
        Some('-') => match chars.next() {
            Some(c) => c,
            None => return false,
        },
        Some(c) => c,
        None => return false,
    };
    (first.is_alphabetic() || first == '_' || first == '-')
        && chars.all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}
