//! Turns a parsed block into its output stylesheet.

mod merge;
mod resolve;
mod rewrite;

use std::io::{self, Write};

use tracing::debug;

use crate::block::{BlockGraph, BlockId, BlockObject};
use crate::error::{CssBlocksError, Result};
use crate::options::Options;
use crate::parser::{BOOKKEEPING_PROPERTIES, is_root_rule};
use crate::stylesheet::{Declaration, Node, Stylesheet};

pub use merge::merge_key_selectors;
pub use resolve::{ConflictResolver, Resolution};
pub use rewrite::rewrite_selector;

/// Where a `@block-debug` dump goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebugChannel {
    Comment,
    Stderr,
    Stdout,
}

pub struct BlockCompiler<'g> {
    graph: &'g BlockGraph,
    options: &'g Options,
}

impl<'g> BlockCompiler<'g> {
    pub fn new(graph: &'g BlockGraph, options: &'g Options) -> Self {
        BlockCompiler { graph, options }
    }

    /// Compile `block`, writing `@block-debug` output to the process's
    /// stdout and stderr.
    pub fn compile(&self, block: BlockId) -> Result<Stylesheet> {
        self.compile_with_output(block, &mut io::stdout(), &mut io::stderr())
    }

    pub fn compile_with_output(
        &self,
        block: BlockId,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<Stylesheet> {
        let source = self.graph.get(block).ok_or_else(|| {
            CssBlocksError::block(format!("Block {:?} has not finished loading", block))
        })?;
        debug!(block = source.name(), "compiling");
        let mut stylesheet = source.stylesheet().clone();

        self.process_debug_statements(block, &mut stylesheet, stdout, stderr)?;
        stylesheet.retain(|node| !matches!(node, Node::AtRule(at_rule) if at_rule.name == "block-reference"));
        self.strip_root_declarations(block, &mut stylesheet);

        let resolver = ConflictResolver::new(self.graph, self.options);
        resolver.annotate_inheritance(block, &mut stylesheet);
        let rewritten = rewrite::rewrite_rules(self.graph, block, self.options, &mut stylesheet);
        resolver.resolve(block, &mut stylesheet, &rewritten)?;

        if self.options.export_icss {
            self.inject_export(block, &mut stylesheet);
        }
        Ok(stylesheet)
    }

    fn process_debug_statements(
        &self,
        block: BlockId,
        stylesheet: &mut Stylesheet,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let source = &self.graph[block];
        let mut nodes = Vec::with_capacity(stylesheet.nodes.len());

        for node in std::mem::take(&mut stylesheet.nodes) {
            let Node::AtRule(at_rule) = &node else {
                nodes.push(node);
                continue;
            };
            if at_rule.name != "block-debug" {
                nodes.push(node);
                continue;
            }

            let location = stylesheet.location(at_rule.position);
            let mut words = at_rule.params.split_whitespace();
            let (Some(name), Some("to"), Some(channel), None) = (words.next(), words.next(), words.next(), words.next())
            else {
                return Err(CssBlocksError::syntax(
                    format!(
                        "Malformed block debug: `@block-debug {}`; expected `@block-debug <name> to comment|stderr|stdout`",
                        at_rule.params
                    ),
                    location,
                ));
            };
            let channel = match channel {
                "comment" => DebugChannel::Comment,
                "stderr" => DebugChannel::Stderr,
                "stdout" => DebugChannel::Stdout,
                other => {
                    return Err(CssBlocksError::syntax(
                        format!("Unknown block debug channel `{}`", other),
                        location,
                    ));
                }
            };
            let target = if name == source.name() {
                block
            } else {
                source.reference(name).ok_or_else(|| {
                    CssBlocksError::syntax(format!("No block named \"{}\" to debug", name), location.clone())
                })?
            };

            let lines = self.graph.debug_lines(target, self.options);
            match channel {
                DebugChannel::Comment => nodes.push(Node::Comment(format!(" {}\n", lines.join("\n")))),
                DebugChannel::Stderr => write_lines(stderr, &lines)?,
                DebugChannel::Stdout => write_lines(stdout, &lines)?,
            }
        }

        stylesheet.nodes = nodes;
        Ok(())
    }

    /// Remove bookkeeping declarations from rules selecting `.root`, then
    /// the root rules left empty.
    fn strip_root_declarations(&self, block: BlockId, stylesheet: &mut Stylesheet) {
        let source = &self.graph[block];
        let root_rule = |rule: &crate::stylesheet::Rule| is_root_rule(source.parsed_selectors(rule.id));

        for node in &mut stylesheet.nodes {
            if let Node::Rule(rule) = node {
                if root_rule(rule) {
                    rule.nodes.retain(
                        |child| !matches!(child, Node::Declaration(d) if BOOKKEEPING_PROPERTIES.contains(&d.prop.as_str())),
                    );
                }
            }
        }
        stylesheet.retain(|node| match node {
            Node::Rule(rule) => !(rule.nodes.is_empty() && root_rule(rule)),
            _ => true,
        });
    }

    /// Append an `:export` rule mapping each object's local name to its
    /// output classes.
    fn inject_export(&self, block: BlockId, stylesheet: &mut Stylesheet) {
        let position = stylesheet
            .nodes
            .last()
            .map(node_position)
            .unwrap_or_default();
        let declarations = self
            .graph
            .root(block)
            .all(true)
            .into_iter()
            .map(|object| {
                let classes: Vec<String> = object
                    .resolve_styles()
                    .iter()
                    .map(|style: &BlockObject<'_>| style.css_class(self.options))
                    .collect();
                Node::Declaration(Declaration::new(object.local_name(), classes.join(" "), position))
            })
            .collect();
        let rule = stylesheet.create_rule(":export", declarations, position);
        stylesheet.nodes.push(Node::Rule(rule));
    }
}

fn node_position(node: &Node) -> crate::stylesheet::Position {
    match node {
        Node::Rule(rule) => rule.position,
        Node::AtRule(at_rule) => at_rule.position,
        Node::Declaration(declaration) => declaration.position,
        Node::Comment(_) => Default::default(),
    }
}

fn write_lines(out: &mut dyn Write, lines: &[String]) -> Result<()> {
    for line in lines {
        writeln!(out, "{}", line).map_err(|err| CssBlocksError::io(err.to_string()))?;
    }
    Ok(())
}
