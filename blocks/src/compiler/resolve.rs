use std::collections::{HashMap, HashSet};

use cssparser::{ParseError, Parser, ParserInput, Token};
use tracing::trace;

use crate::block::property::properties_conflict;
use crate::block::{BlockGraph, BlockId, BlockObject};
use crate::compiler::merge::merge_key_selectors;
use crate::compiler::rewrite::rewrite_selector;
use crate::error::{CssBlocksError, Result, SourceLocation};
use crate::options::Options;
use crate::selector::{CompoundSelector, ParsedSelector, selector_list};
use crate::stylesheet::{AtRule, Declaration, Node, Position, Rule, RuleId, Stylesheet};

/// A `resolve("<ref>")` or `resolve-inherited("<ref>")` declaration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub reference: String,
    /// `resolve-inherited`: only the referenced object itself is checked,
    /// not its ancestors.
    pub inherited: bool,
}

impl Resolution {
    pub fn parse(value: &str) -> Option<Resolution> {
        let mut input = ParserInput::new(value);
        let mut parser = Parser::new(&mut input);
        let inherited = match parser.next().ok()?.clone() {
            Token::Function(name) if name.eq_ignore_ascii_case("resolve") => false,
            Token::Function(name) if name.eq_ignore_ascii_case("resolve-inherited") => true,
            _ => return None,
        };
        let reference: std::result::Result<String, ParseError<'_, ()>> = parser.parse_nested_block(|arguments| {
            let reference = arguments.expect_string()?.to_string();
            arguments.expect_exhausted()?;
            Ok(reference)
        });
        let reference = reference.ok()?;
        parser.is_exhausted().then_some(Resolution { reference, inherited })
    }
}

fn is_resolution(declaration: &Declaration) -> bool {
    Resolution::parse(&declaration.value).is_some()
}

/// What resolving against one object found.
enum Outcome {
    NoConflict,
    SameValues,
    Rules(Vec<Rule>),
}

/// Reconciles property conflicts between a block's rules and the rules of
/// the objects they inherit from or explicitly resolve against.
pub struct ConflictResolver<'g> {
    graph: &'g BlockGraph,
    options: &'g Options,
}

impl<'g> ConflictResolver<'g> {
    pub fn new(graph: &'g BlockGraph, options: &'g Options) -> Self {
        ConflictResolver { graph, options }
    }

    // -----------------------------------------------------------------------
    // Inheritance
    // -----------------------------------------------------------------------

    /// Prepend `prop: resolve-inherited("<base>")` to every rule that sets a
    /// property its key object's base also sets, so the local value wins.
    pub fn annotate_inheritance(&self, block: BlockId, stylesheet: &mut Stylesheet) {
        let source = &self.graph[block];
        let Some(base_name) = source.base_name() else {
            return;
        };

        stylesheet.walk_rules_mut(&mut |rule| {
            let explicit: HashSet<String> = rule
                .declarations()
                .filter(|declaration| is_resolution(declaration))
                .map(|declaration| declaration.prop.clone())
                .collect();
            let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
            let mut synthetic: Vec<Declaration> = Vec::new();

            for selector in source.parsed_selectors(rule.id) {
                let Some(object) = self.own_object(block, selector.key()) else {
                    continue;
                };
                let Some(base) = object.base() else {
                    continue;
                };
                let pseudo = selector.pseudo_element().map(|pseudo| pseudo.name.as_str());
                let conflicts = object.properties().conflicts(base.properties(), pseudo);
                let value = format!("resolve-inherited(\"{}{}\")", base_name, base.as_source());

                for declaration in rule.declarations() {
                    if !conflicts.contains(&declaration.prop)
                        || explicit.contains(&declaration.prop)
                        || !seen.insert((declaration.prop.clone(), pseudo.map(str::to_string)))
                    {
                        continue;
                    }
                    if synthetic
                        .iter()
                        .any(|existing| existing.prop == declaration.prop && existing.value == value)
                    {
                        continue;
                    }
                    synthetic.push(Declaration::new(declaration.prop.clone(), value.clone(), rule.position));
                }
            }

            if !synthetic.is_empty() {
                trace!(selector = %rule.selector, count = synthetic.len(), "inherited conflicts");
                rule.nodes.splice(0..0, synthetic.into_iter().map(Node::Declaration));
            }
        });
    }

    fn own_object(&self, block: BlockId, key: &CompoundSelector) -> Option<BlockObject<'g>> {
        self.graph
            .root(block)
            .all(false)
            .into_iter()
            .find(|object| object.matches(key))
    }

    // -----------------------------------------------------------------------
    // Explicit resolution
    // -----------------------------------------------------------------------

    /// Replace every `resolve()` declaration with rules that settle the
    /// conflict. `rewritten` holds each rule's selectors with generated
    /// class names.
    pub fn resolve(
        &self,
        block: BlockId,
        stylesheet: &mut Stylesheet,
        rewritten: &HashMap<RuleId, Vec<ParsedSelector>>,
    ) -> Result<()> {
        let mut nodes = std::mem::take(&mut stylesheet.nodes);
        let result = self.resolve_nodes(block, &mut nodes, stylesheet, rewritten);
        stylesheet.nodes = nodes;
        result
    }

    fn resolve_nodes(
        &self,
        block: BlockId,
        nodes: &mut Vec<Node>,
        stylesheet: &mut Stylesheet,
        rewritten: &HashMap<RuleId, Vec<ParsedSelector>>,
    ) -> Result<()> {
        let mut index = 0;
        while index < nodes.len() {
            let generated = match &mut nodes[index] {
                Node::Rule(rule) => {
                    self.resolve_nodes(block, &mut rule.nodes, stylesheet, rewritten)?;
                    self.resolve_rule(block, rule, stylesheet, rewritten)?
                }
                Node::AtRule(AtRule {
                    nodes: Some(children),
                    ..
                }) => {
                    self.resolve_nodes(block, children, stylesheet, rewritten)?;
                    Vec::new()
                }
                _ => Vec::new(),
            };
            let count = generated.len();
            nodes.splice(index + 1..index + 1, generated.into_iter().map(Node::Rule));
            index += 1 + count;
        }
        Ok(())
    }

    fn resolve_rule(
        &self,
        block: BlockId,
        rule: &mut Rule,
        stylesheet: &mut Stylesheet,
        rewritten: &HashMap<RuleId, Vec<ParsedSelector>>,
    ) -> Result<Vec<Rule>> {
        let resolutions: Vec<(usize, String, Resolution)> = rule
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match node {
                Node::Declaration(declaration) => Resolution::parse(&declaration.value)
                    .map(|resolution| (index, declaration.prop.clone(), resolution)),
                _ => None,
            })
            .collect();
        if resolutions.is_empty() {
            return Ok(Vec::new());
        }

        let location = stylesheet.location(rule.position);
        let current = rewritten.get(&rule.id).map(Vec::as_slice).unwrap_or(&[]);
        let mut generated = Vec::new();

        for (index, property, resolution) in &resolutions {
            let (local, last_local) = local_values(rule, property, &location)?;
            // After the local values, the referenced value wins.
            let override_local = *index > last_local;

            let other = self.graph.lookup(block, &resolution.reference).ok_or_else(|| {
                CssBlocksError::syntax(
                    format!(
                        "Cannot find `{}` to resolve `{}` against",
                        resolution.reference, property
                    ),
                    location.clone(),
                )
            })?;

            let context = ResolveContext {
                property,
                local: &local,
                current,
                override_local,
                position: rule.position,
                location: &location,
            };
            let mut target = Some(other);
            let mut found = false;
            while let Some(object) = target {
                match self.resolve_against(object, &context, stylesheet)? {
                    Outcome::NoConflict => {}
                    Outcome::SameValues => found = true,
                    Outcome::Rules(rules) => {
                        found = true;
                        generated.extend(rules);
                    }
                }
                if found || resolution.inherited {
                    break;
                }
                target = object.base();
            }

            if !found {
                return Err(CssBlocksError::syntax(
                    format!(
                        "Cannot resolve conflict for `{}` with `{}`: no conflicting values found",
                        property, resolution.reference
                    ),
                    location,
                ));
            }
        }

        rule.nodes
            .retain(|node| !matches!(node, Node::Declaration(declaration) if is_resolution(declaration)));
        Ok(generated)
    }

    /// Compare the local values with every rule of `object`'s block whose
    /// key selects `object`.
    fn resolve_against(&self, object: BlockObject<'g>, context: &ResolveContext<'_>, stylesheet: &mut Stylesheet) -> Result<Outcome> {
        let other_block = object.block();
        let other_id = object.id().block;
        let mut rules = Vec::new();
        let mut same_values = false;

        for other_rule in other_block.stylesheet().style_rules() {
            let values: Vec<&Declaration> = other_rule
                .declarations()
                .filter(|declaration| {
                    properties_conflict(&declaration.prop, context.property) && !is_resolution(declaration)
                })
                .collect();
            if values.is_empty() {
                continue;
            }

            let mut merged: Vec<ParsedSelector> = Vec::new();
            for other_selector in other_block.parsed_selectors(other_rule.id) {
                if !object.matches(other_selector.key()) {
                    continue;
                }
                let other_selector = rewrite_selector(self.graph, other_id, other_selector, self.options);
                let other_pseudo = other_selector.pseudo_element().map(|pseudo| &pseudo.name);
                for current in context.current {
                    if current.pseudo_element().map(|pseudo| &pseudo.name) != other_pseudo {
                        continue;
                    }
                    if same_declarations(context.local, &values) {
                        same_values = true;
                        continue;
                    }
                    let selectors = merge_key_selectors(&other_selector, current)
                        .map_err(|err| CssBlocksError::syntax(err.message(), context.location.clone()))?;
                    for selector in selectors {
                        if !merged.contains(&selector) {
                            merged.push(selector);
                        }
                    }
                }
            }
            if merged.is_empty() {
                continue;
            }

            let declarations = if context.override_local {
                values
                    .iter()
                    .map(|declaration| {
                        Node::Declaration(Declaration {
                            position: context.position,
                            ..(*declaration).clone()
                        })
                    })
                    .collect()
            } else {
                context.local.iter().cloned().map(Node::Declaration).collect()
            };
            trace!(selector = %selector_list(&merged), "generated resolution rule");
            rules.push(stylesheet.create_rule(selector_list(&merged), declarations, context.position));
        }

        Ok(if !rules.is_empty() {
            Outcome::Rules(rules)
        } else if same_values {
            Outcome::SameValues
        } else {
            Outcome::NoConflict
        })
    }
}

struct ResolveContext<'a> {
    property: &'a str,
    /// The rule's concrete declarations of `property`.
    local: &'a [Declaration],
    /// The rule's rewritten selectors.
    current: &'a [ParsedSelector],
    override_local: bool,
    position: Position,
    location: &'a SourceLocation,
}

/// The concrete declarations of `property` in `rule` and the index of the
/// last one. Resolutions of `property` must come before or after all of
/// them.
fn local_values(rule: &Rule, property: &str, location: &SourceLocation) -> Result<(Vec<Declaration>, usize)> {
    let declarations: Vec<(usize, &Declaration, bool)> = rule
        .nodes
        .iter()
        .enumerate()
        .filter_map(|(index, node)| match node {
            Node::Declaration(declaration) if declaration.prop == property => {
                Some((index, declaration, is_resolution(declaration)))
            }
            _ => None,
        })
        .collect();

    let concrete: Vec<usize> = declarations
        .iter()
        .filter(|(_, _, resolution)| !resolution)
        .map(|(index, _, _)| *index)
        .collect();
    let (Some(&first), Some(&last)) = (concrete.first(), concrete.last()) else {
        return Err(CssBlocksError::syntax(
            format!("Cannot resolve `{}` without a concrete value in the same rule", property),
            location.clone(),
        ));
    };
    if declarations
        .iter()
        .any(|(index, _, resolution)| *resolution && *index > first && *index < last)
    {
        return Err(CssBlocksError::syntax(
            format!(
                "Cannot mix resolutions with values of `{}`; resolve before or after all of them",
                property
            ),
            location.clone(),
        ));
    }

    let local = declarations
        .into_iter()
        .filter(|(_, _, resolution)| !resolution)
        .map(|(_, declaration, _)| declaration.clone())
        .collect();
    Ok((local, last))
}

fn same_declarations(local: &[Declaration], other: &[&Declaration]) -> bool {
    local.len() == other.len()
        && local.iter().zip(other).all(|(mine, theirs)| {
            mine.prop == theirs.prop && mine.value == theirs.value && mine.important == theirs.important
        })
}
