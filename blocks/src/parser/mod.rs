//! Builds a [`Block`] from a parsed stylesheet.

mod validate;

use std::collections::{HashMap, HashSet};

use futures::future::try_join_all;
use tracing::trace;

use crate::block::{Block, BlockId, BlockReference};
use crate::error::{CssBlocksError, Result, SourceLocation};
use crate::factory::BlockFactory;
use crate::importing::FileIdentifier;
use crate::selector::{ParsedSelector, SelectorError, parse_selectors};
use crate::stylesheet::{Declaration, Node, Rule, RuleId, Stylesheet};

/// Declarations that configure the block instead of styling it. Only
/// allowed in a rule with a bare `.root` selector.
pub const BOOKKEEPING_PROPERTIES: &[&str] = &["extends", "implements", "block-name"];

pub fn is_bookkeeping(property: &str) -> bool {
    BOOKKEEPING_PROPERTIES.contains(&property)
}

/// Whether a selector is exactly `.root`.
pub fn is_root_selector(selector: &ParsedSelector) -> bool {
    selector.combinator_count() == 0
        && selector.pseudo_element().is_none()
        && matches!(selector.key().nodes.as_slice(), [node] if node.is_root())
}

/// Whether a rule's selector list includes a bare `.root`, which lets the
/// rule carry bookkeeping declarations.
pub fn is_root_rule(selectors: &[ParsedSelector]) -> bool {
    selectors.iter().any(is_root_selector)
}

pub struct BlockParser<'f> {
    factory: &'f BlockFactory,
}

impl<'f> BlockParser<'f> {
    pub fn new(factory: &'f BlockFactory) -> Self {
        BlockParser { factory }
    }

    pub async fn parse(&self, stylesheet: Stylesheet, identifier: FileIdentifier, default_name: &str) -> Result<Block> {
        let options = self.factory.options();
        let debug_identifier = self.factory.importer().debug_identifier(&identifier, options);
        let selectors = parse_rule_selectors(&stylesheet)?;

        let root_rules: HashSet<RuleId> = stylesheet
            .nodes
            .iter()
            .filter_map(|node| match node {
                Node::Rule(rule) => Some(rule),
                _ => None,
            })
            .filter(|rule| selectors.get(&rule.id).is_some_and(|parsed| is_root_rule(parsed)))
            .map(|rule| rule.id)
            .collect();

        let name = block_name(&stylesheet, &root_rules, default_name)?;
        let mut block = Block::new(name, identifier, debug_identifier);

        self.resolve_references(&mut block, &stylesheet).await?;
        self.process_extends(&mut block, &stylesheet, &root_rules)?;
        self.process_implements(&mut block, &stylesheet, &root_rules)?;

        let graph = self.factory.graph();
        for rule in stylesheet.style_rules() {
            let location = stylesheet.location(rule.position);
            if !root_rules.contains(&rule.id) {
                if let Some(declaration) = rule.declarations().find(|d| is_bookkeeping(&d.prop)) {
                    return Err(CssBlocksError::syntax(
                        format!(
                            "`{}` can only be declared in a `.root` rule, not in `{}`",
                            declaration.prop, rule.selector
                        ),
                        stylesheet.location(declaration.position),
                    ));
                }
            }

            for selector in selectors.get(&rule.id).into_iter().flatten() {
                let Some(key) = validate::classify_selector(&mut block, &graph, selector, &location)? else {
                    continue;
                };
                let pseudo = selector.pseudo_element().map(|pseudo| pseudo.name.as_str());
                if let Some(properties) = block.properties_mut(key) {
                    for declaration in rule.declarations().filter(|d| !is_bookkeeping(&d.prop)) {
                        properties.add(&declaration.prop, pseudo);
                    }
                }
            }
        }

        trace!(name = block.name(), classes = block.classes().len(), "built block");
        block.set_stylesheet(stylesheet, selectors);
        Ok(block)
    }

    async fn resolve_references(&self, block: &mut Block, stylesheet: &Stylesheet) -> Result<()> {
        let options = self.factory.options();
        let importer = self.factory.importer();

        let mut requests = Vec::new();
        for node in &stylesheet.nodes {
            let Node::AtRule(at_rule) = node else {
                continue;
            };
            if at_rule.name != "block-reference" {
                continue;
            }
            let location = stylesheet.location(at_rule.position);
            let reference = BlockReference::parse(&at_rule.params).ok_or_else(|| {
                CssBlocksError::syntax(
                    format!("Malformed block reference: `@block-reference {}`", at_rule.params),
                    location.clone(),
                )
            })?;
            let target = importer.identifier(Some(block.identifier()), &reference.path, options);
            requests.push((reference, target, location));
        }

        let requester = block.identifier().clone();
        let ids: Vec<BlockId> = try_join_all(
            requests
                .iter()
                .map(|(_, target, _)| self.factory.get_referenced_block(&requester, target.clone())),
        )
        .await?;

        for ((reference, target, location), id) in requests.into_iter().zip(ids) {
            let local_name = match reference.local_name {
                Some(name) => name,
                None => {
                    let loaded = self.factory.graph().get(id).map(|block| block.name().to_string());
                    loaded.unwrap_or_else(|| importer.default_name(&target, options))
                }
            };
            if block.reference(&local_name).is_some() {
                return Err(CssBlocksError::syntax(
                    format!("Cannot have two block references named `{}`", local_name),
                    location,
                ));
            }
            block.add_reference(local_name, id);
        }
        Ok(())
    }

    fn process_extends(&self, block: &mut Block, stylesheet: &Stylesheet, root_rules: &HashSet<RuleId>) -> Result<()> {
        for declaration in root_declarations(stylesheet, root_rules, "extends") {
            let location = stylesheet.location(declaration.position);
            if block.base().is_some() {
                return Err(CssBlocksError::syntax("A block can only be extended once", location));
            }
            let name = declaration.value.trim();
            let base = self.completed_reference(block, name, "extend", location)?;
            block.set_base(base, name);
        }
        Ok(())
    }

    fn process_implements(&self, block: &mut Block, stylesheet: &Stylesheet, root_rules: &HashSet<RuleId>) -> Result<()> {
        for declaration in root_declarations(stylesheet, root_rules, "implements") {
            for name in declaration.value.split(',').map(str::trim).filter(|name| !name.is_empty()) {
                let location = stylesheet.location(declaration.position);
                let interface = self.completed_reference(block, name, "implement", location)?;
                block.add_implements(interface);
            }
        }
        Ok(())
    }

    /// A referenced block that has finished parsing.
    fn completed_reference(&self, block: &Block, name: &str, verb: &str, location: SourceLocation) -> Result<BlockId> {
        let Some(id) = block.reference(name) else {
            return Err(CssBlocksError::block_at(format!("No block named \"{}\" found", name), location));
        };
        if !self.factory.graph().is_complete(id) {
            return Err(CssBlocksError::block_at(
                format!(
                    "Cannot {} block \"{}\" because it references this block",
                    verb, name
                ),
                location,
            ));
        }
        Ok(id)
    }
}

/// Parse every style rule's selector list.
fn parse_rule_selectors(stylesheet: &Stylesheet) -> Result<HashMap<RuleId, Vec<ParsedSelector>>> {
    let mut selectors = HashMap::new();
    for rule in stylesheet.style_rules() {
        let parsed = parse_selectors(&rule.selector).map_err(|err| {
            CssBlocksError::syntax(
                format!("{} in `{}`", err.message, rule.selector),
                selector_location(stylesheet, rule, &err),
            )
        })?;
        selectors.insert(rule.id, parsed);
    }
    Ok(selectors)
}

fn selector_location(stylesheet: &Stylesheet, rule: &Rule, err: &SelectorError) -> SourceLocation {
    let mut location = stylesheet.location(rule.position);
    if err.line <= 1 {
        let shift = err.column.saturating_sub(1);
        location.column += shift;
        location.offset += shift as usize;
    } else {
        location.line += err.line - 1;
        location.column = err.column;
    }
    location
}

fn root_declarations<'a>(
    stylesheet: &'a Stylesheet,
    root_rules: &'a HashSet<RuleId>,
    property: &'a str,
) -> impl Iterator<Item = &'a Declaration> {
    stylesheet
        .nodes
        .iter()
        .filter_map(|node| match node {
            Node::Rule(rule) if root_rules.contains(&rule.id) => Some(rule),
            _ => None,
        })
        .flat_map(|rule| rule.declarations())
        .filter(move |declaration| declaration.prop == property)
}

fn block_name(stylesheet: &Stylesheet, root_rules: &HashSet<RuleId>, default_name: &str) -> Result<String> {
    let Some(declaration) = root_declarations(stylesheet, root_rules, "block-name").last() else {
        return Ok(default_name.to_string());
    };
    let name = declaration.value.trim();
    if !is_valid_name(name) {
        return Err(CssBlocksError::syntax(
            format!("Illegal block name. '{}' is not a legal CSS identifier", name),
            stylesheet.location(declaration.position),
        ));
    }
    Ok(name.to_string())
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = match chars.next() {
        Some('-') => chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_'),
        Some(c) => c.is_ascii_alphabetic() || c == '_',
        None => false,
    };
    starts_well && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
