//! A small owned CSS AST: the input every block stage reads and the output
//! the compiler serializes.

mod parse;

use std::fmt;

pub use parse::parse_stylesheet;

use crate::error::SourceLocation;

/// Identifies a rule within one stylesheet. Stable across clones, so caches
/// keyed by it survive the compiler's copy of the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct Stylesheet {
    pub filename: String,
    pub nodes: Vec<Node>,
    next_rule: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Rule(Rule),
    AtRule(AtRule),
    Declaration(Declaration),
    /// Raw comment text, without the `/*` `*/` delimiters.
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: RuleId,
    pub selector: String,
    pub nodes: Vec<Node>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtRule {
    pub name: String,
    pub params: String,
    /// `None` for statement at-rules ending in `;`.
    pub nodes: Option<Vec<Node>>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub prop: String,
    pub value: String,
    pub important: bool,
    pub position: Position,
}

impl Declaration {
    pub fn new(prop: impl Into<String>, value: impl Into<String>, position: Position) -> Self {
        Declaration {
            prop: prop.into(),
            value: value.into(),
            important: false,
            position,
        }
    }
}

impl Stylesheet {
    pub fn new(filename: impl Into<String>) -> Self {
        Stylesheet {
            filename: filename.into(),
            nodes: Vec::new(),
            next_rule: 0,
        }
    }

    pub fn next_rule_id(&mut self) -> RuleId {
        let id = RuleId(self.next_rule);
        self.next_rule += 1;
        id
    }

    /// Create a rule with a fresh id. The caller decides where it goes.
    pub fn create_rule(&mut self, selector: impl Into<String>, nodes: Vec<Node>, position: Position) -> Rule {
        Rule {
            id: self.next_rule_id(),
            selector: selector.into(),
            nodes,
            position,
        }
    }

    pub fn location(&self, position: Position) -> SourceLocation {
        SourceLocation {
            filename: self.filename.clone(),
            line: position.line,
            column: position.column,
            offset: position.offset,
        }
    }

    /// Visit every rule, including rules nested in rules and at-rule bodies.
    pub fn walk_rules<'a>(&'a self, f: &mut dyn FnMut(&'a Rule)) {
        walk_rules_in(&self.nodes, f);
    }

    pub fn walk_rules_mut(&mut self, f: &mut dyn FnMut(&mut Rule)) {
        walk_rules_in_mut(&mut self.nodes, f);
    }

    pub fn rules(&self) -> Vec<&Rule> {
        let mut rules = Vec::new();
        self.walk_rules(&mut |rule| rules.push(rule));
        rules
    }

    /// Rules that select elements: every rule except keyframe steps.
    pub fn style_rules(&self) -> Vec<&Rule> {
        let mut rules = Vec::new();
        collect_style_rules(&self.nodes, &mut rules);
        rules
    }

    /// Keep only the top-level nodes matching `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&Node) -> bool) {
        self.nodes.retain(keep);
    }
}

impl Rule {
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Declaration(declaration) => Some(declaration),
            _ => None,
        })
    }
}

fn walk_rules_in<'a>(nodes: &'a [Node], f: &mut dyn FnMut(&'a Rule)) {
    for node in nodes {
        match node {
            Node::Rule(rule) => {
                f(rule);
                walk_rules_in(&rule.nodes, f);
            }
            Node::AtRule(AtRule {
                nodes: Some(children),
                ..
            }) => walk_rules_in(children, f),
            _ => {}
        }
    }
}

fn collect_style_rules<'a>(nodes: &'a [Node], rules: &mut Vec<&'a Rule>) {
    for node in nodes {
        match node {
            Node::Rule(rule) => {
                rules.push(rule);
                collect_style_rules(&rule.nodes, rules);
            }
            Node::AtRule(at_rule) if !at_rule.name.ends_with("keyframes") => {
                if let Some(children) = &at_rule.nodes {
                    collect_style_rules(children, rules);
                }
            }
            _ => {}
        }
    }
}

fn walk_rules_in_mut(nodes: &mut [Node], f: &mut dyn FnMut(&mut Rule)) {
    for node in nodes {
        match node {
            Node::Rule(rule) => {
                f(rule);
                walk_rules_in_mut(&mut rule.nodes, f);
            }
            Node::AtRule(AtRule {
                nodes: Some(children),
                ..
            }) => walk_rules_in_mut(children, f),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

impl fmt::Display for Stylesheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write_node(f, node, 0)?;
        }
        Ok(())
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &Node, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    match node {
        Node::Rule(rule) => {
            writeln!(f, "{}{} {{", indent, rule.selector)?;
            write_children(f, &rule.nodes, depth + 1)?;
            writeln!(f, "{}}}", indent)
        }
        Node::AtRule(at_rule) => {
            write!(f, "{}@{}", indent, at_rule.name)?;
            if !at_rule.params.is_empty() {
                write!(f, " {}", at_rule.params)?;
            }
            match &at_rule.nodes {
                Some(children) => {
                    writeln!(f, " {{")?;
                    write_children(f, children, depth + 1)?;
                    writeln!(f, "{}}}", indent)
                }
                None => writeln!(f, ";"),
            }
        }
        Node::Declaration(declaration) => {
            write!(f, "{}{}: {}", indent, declaration.prop, declaration.value)?;
            if declaration.important {
                write!(f, " !important")?;
            }
            writeln!(f, ";")
        }
        Node::Comment(text) => writeln!(f, "{}/*{}*/", indent, text),
    }
}

fn write_children(f: &mut fmt::Formatter<'_>, nodes: &[Node], depth: usize) -> fmt::Result {
    for node in nodes {
        write_node(f, node, depth)?;
    }
    Ok(())
}
