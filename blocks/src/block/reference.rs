use cssparser::{Parser, ParserInput, Token};

use crate::selector::{CompoundSelector, SimpleSelector, parse_selectors};

/// An `@block-reference` statement: `name from "path"` or just `"path"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReference {
    /// Local name; when absent, the referenced block's own name is used.
    pub local_name: Option<String>,
    pub path: String,
}

impl BlockReference {
    pub fn parse(params: &str) -> Option<BlockReference> {
        let mut input = ParserInput::new(params);
        let mut parser = Parser::new(&mut input);

        let reference = match parser.next().ok()?.clone() {
            Token::QuotedString(path) => BlockReference {
                local_name: None,
                path: path.to_string(),
            },
            Token::Ident(name) => {
                match parser.next().ok()?.clone() {
                    Token::Ident(keyword) if keyword.eq_ignore_ascii_case("from") => {}
                    _ => return None,
                }
                match parser.next().ok()?.clone() {
                    Token::QuotedString(path) => BlockReference {
                        local_name: Some(name.to_string()),
                        path: path.to_string(),
                    },
                    _ => return None,
                }
            }
            _ => return None,
        };
        parser.is_exhausted().then_some(reference)
    }
}

/// A reference to a block object from inside a block:
/// `[block](.class)?([state|x] | [state|g=x] | :state(x) | :state(g x))?`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectReference {
    /// Name of a referenced block; `None` for the current block.
    pub block: Option<String>,
    /// Class name. `root` names the block's root.
    pub class: Option<String>,
    /// `(group, name)` of a state.
    pub state: Option<(Option<String>, String)>,
}

impl ObjectReference {
    pub fn parse(text: &str) -> Option<ObjectReference> {
        let mut selectors = parse_selectors(text.trim()).ok()?;
        if selectors.len() != 1 {
            return None;
        }
        let selector = selectors.remove(0);
        if selector.combinator_count() > 0 || selector.pseudo_element().is_some() {
            return None;
        }
        Self::from_compound(selector.key())
    }

    /// Interpret a compound selector as a single object reference, or
    /// `None` when it holds anything besides a block name, one class and
    /// one state.
    pub fn from_compound(compound: &CompoundSelector) -> Option<ObjectReference> {
        let mut reference = ObjectReference::default();
        for (index, node) in compound.nodes.iter().enumerate() {
            match node {
                SimpleSelector::Type(name) if index == 0 => reference.block = Some(name.clone()),
                SimpleSelector::Class(name) if reference.class.is_none() && reference.state.is_none() => {
                    reference.class = Some(name.clone());
                }
                SimpleSelector::Attribute(_) if reference.state.is_none() => {
                    let (group, name) = node.as_state()?;
                    reference.state = Some((group.map(str::to_string), name.to_string()));
                }
                SimpleSelector::PseudoClass {
                    name,
                    argument: Some(argument),
                } if name == "state" && reference.state.is_none() => {
                    let mut words = argument.split_whitespace();
                    let state = match (words.next(), words.next(), words.next()) {
                        (Some(name), None, None) => (None, name.to_string()),
                        (Some(group), Some(name), None) => (Some(group.to_string()), name.to_string()),
                        _ => return None,
                    };
                    reference.state = Some(state);
                }
                _ => return None,
            }
        }
        if reference == ObjectReference::default() {
            return None;
        }
        Some(reference)
    }

    /// The object a compound selects, ignoring pseudo-classes and plain
    /// attribute selectors around its parts.
    pub fn in_compound(compound: &CompoundSelector) -> Option<ObjectReference> {
        let significant = CompoundSelector::new(
            compound
                .nodes
                .iter()
                .filter(|node| match node {
                    SimpleSelector::Attribute(_) => node.as_state().is_some(),
                    SimpleSelector::PseudoClass { name, .. } => name == "state",
                    _ => true,
                })
                .cloned()
                .collect(),
        );
        Self::from_compound(&significant)
    }

    pub fn is_root_class(&self) -> bool {
        matches!(self.class.as_deref(), None | Some("root"))
    }

    /// The same reference, resolved inside the named block.
    pub fn without_block(&self) -> ObjectReference {
        ObjectReference {
            block: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_anonymous_block_references() {
        assert_eq!(
            BlockReference::parse("other from \"./other.block.css\""),
            Some(BlockReference {
                local_name: Some("other".into()),
                path: "./other.block.css".into(),
            })
        );
        assert_eq!(
            BlockReference::parse("'base.css'"),
            Some(BlockReference {
                local_name: None,
                path: "base.css".into(),
            })
        );
        assert_eq!(BlockReference::parse("other \"x.css\""), None);
        assert_eq!(BlockReference::parse("other from \"x.css\" extra"), None);
    }

    #[test]
    fn parses_object_references() {
        let reference = ObjectReference::parse("other.foo[state|size=large]").expect("valid reference");
        assert_eq!(reference.block.as_deref(), Some("other"));
        assert_eq!(reference.class.as_deref(), Some("foo"));
        assert_eq!(reference.state, Some((Some("size".into()), "large".into())));

        let pseudo = ObjectReference::parse("other:state(open)").expect("valid reference");
        assert_eq!(pseudo.state, Some((None, "open".into())));
        assert!(pseudo.is_root_class());

        assert!(ObjectReference::parse(".foo .bar").is_none());
        assert!(ObjectReference::parse(".foo.bar").is_none());
        assert!(ObjectReference::parse("").is_none());
    }
}
