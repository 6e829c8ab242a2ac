use cssparser::{Delimiter, ParseError, Parser, ParserInput, Token};

use crate::error::CssBlocksError;
use crate::stylesheet::{AtRule, Declaration, Node, Position, Rule, Stylesheet};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse CSS source text into a [`Stylesheet`].
///
/// Every malformed item is collected; the first one is returned and the rest
/// are logged.
pub fn parse_stylesheet(source: &str, filename: &str) -> Result<Stylesheet, CssBlocksError> {
    let mut input = ParserInput::new(source);
    let mut parser = Parser::new(&mut input);

    let mut state = ParseState::new(filename);
    let nodes = state.parse_list(&mut parser, true);
    state.finalize(nodes)
}

// ---------------------------------------------------------------------------
// Parse state
// ---------------------------------------------------------------------------

struct ParseState {
    stylesheet: Stylesheet,
    errors: Vec<CssBlocksError>,
}

impl ParseState {
    fn new(filename: &str) -> Self {
        ParseState {
            stylesheet: Stylesheet::new(filename),
            errors: Vec::new(),
        }
    }

    fn finalize(mut self, nodes: Vec<Node>) -> Result<Stylesheet, CssBlocksError> {
        if self.errors.is_empty() {
            self.stylesheet.nodes = nodes;
            return Ok(self.stylesheet);
        }
        for extra in &self.errors[1..] {
            tracing::debug!(error = %extra, "additional stylesheet syntax error");
        }
        Err(self.errors.swap_remove(0))
    }

    /// Parse items until the end of the current block (or input).
    fn parse_list(&mut self, parser: &mut Parser<'_, '_>, top_level: bool) -> Vec<Node> {
        let mut nodes = Vec::new();
        loop {
            let position = position_of(parser);
            let start = parser.state();
            let token = match parser.next_including_whitespace_and_comments() {
                Ok(token) => token.clone(),
                Err(_) => break,
            };
            match token {
                Token::WhiteSpace(_) | Token::Semicolon | Token::CDO | Token::CDC => {}
                Token::Comment(text) => nodes.push(Node::Comment(text.to_string())),
                Token::AtKeyword(name) => {
                    let at_rule = self.parse_at_rule(parser, name.to_string(), position);
                    nodes.push(Node::AtRule(at_rule));
                }
                _ => {
                    parser.reset(&start);
                    if let Some(node) = self.parse_rule_or_declaration(parser, top_level, position) {
                        nodes.push(node);
                    }
                }
            }
        }
        nodes
    }

    fn parse_at_rule(&mut self, parser: &mut Parser<'_, '_>, name: String, position: Position) -> AtRule {
        let params = consume_prelude(parser);
        let opens_block = matches!(parser.next(), Ok(Token::CurlyBracketBlock));
        let nodes = if opens_block {
            Some(self.parse_block(parser))
        } else {
            None
        };
        AtRule {
            name,
            params,
            nodes,
            position,
        }
    }

    fn parse_rule_or_declaration(
        &mut self,
        parser: &mut Parser<'_, '_>,
        top_level: bool,
        position: Position,
    ) -> Option<Node> {
        let prelude = consume_prelude(parser);
        let opens_block = matches!(parser.next(), Ok(Token::CurlyBracketBlock));

        if opens_block {
            let nodes = self.parse_block(parser);
            let id = self.stylesheet.next_rule_id();
            return Some(Node::Rule(Rule {
                id,
                selector: prelude,
                nodes,
                position,
            }));
        }

        if top_level {
            self.error(format!("Unexpected `{}` outside of a rule", prelude), position);
            return None;
        }

        match parse_declaration(&prelude, position) {
            Some(declaration) => Some(Node::Declaration(declaration)),
            None => {
                self.error(format!("Malformed declaration `{}`", prelude), position);
                None
            }
        }
    }

    fn parse_block(&mut self, parser: &mut Parser<'_, '_>) -> Vec<Node> {
        let result: Result<Vec<Node>, ParseError<'_, ()>> =
            parser.parse_nested_block(|nested| Ok(self.parse_list(nested, false)));
        result.unwrap_or_default()
    }

    fn error(&mut self, message: String, position: Position) {
        let location = self.stylesheet.location(position);
        self.errors.push(CssBlocksError::syntax(message, location));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Consume everything up to the next `;` or `{ }` block and return it as text.
fn consume_prelude(parser: &mut Parser<'_, '_>) -> String {
    let start = parser.position();
    let _: Result<(), ParseError<'_, ()>> =
        parser.parse_until_before(Delimiter::Semicolon | Delimiter::CurlyBracketBlock, |inner| {
            while inner.next_including_whitespace_and_comments().is_ok() {}
            Ok(())
        });
    parser.slice_from(start).trim().to_string()
}

fn parse_declaration(text: &str, position: Position) -> Option<Declaration> {
    let (prop, value) = text.split_once(':')?;
    let prop = prop.trim();
    if prop.is_empty() {
        return None;
    }

    let mut value = value.trim();
    let mut important = false;
    if let Some(bang) = value.rfind('!') {
        if value[bang + 1..].trim().eq_ignore_ascii_case("important") {
            important = true;
            value = value[..bang].trim_end();
        }
    }

    Some(Declaration {
        prop: prop.to_string(),
        value: value.to_string(),
        important,
        position,
    })
}

fn position_of(parser: &Parser<'_, '_>) -> Position {
    let location = parser.current_source_location();
    Position {
        line: location.line + 1,
        column: location.column,
        offset: parser.position().byte_index(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Stylesheet {
        parse_stylesheet(source, "test.css").expect("stylesheet should parse")
    }

    #[test]
    fn parses_rules_and_declarations() {
        let sheet = parse(".root { color: red; float: left !important }");
        assert_eq!(sheet.nodes.len(), 1);
        let Node::Rule(rule) = &sheet.nodes[0] else {
            panic!("expected a rule");
        };
        assert_eq!(rule.selector, ".root");
        let declarations: Vec<_> = rule.declarations().collect();
        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations[0].prop, "color");
        assert_eq!(declarations[0].value, "red");
        assert!(!declarations[0].important);
        assert_eq!(declarations[1].value, "left");
        assert!(declarations[1].important);
    }

    #[test]
    fn parses_statement_and_block_at_rules() {
        let sheet = parse("@block-reference other from \"./other.css\";\n@media (min-width: 10px) { .foo { color: blue; } }");
        let Node::AtRule(reference) = &sheet.nodes[0] else {
            panic!("expected an at-rule");
        };
        assert_eq!(reference.name, "block-reference");
        assert_eq!(reference.params, "other from \"./other.css\"");
        assert!(reference.nodes.is_none());

        let Node::AtRule(media) = &sheet.nodes[1] else {
            panic!("expected an at-rule");
        };
        assert_eq!(media.params, "(min-width: 10px)");
        assert_eq!(sheet.rules().len(), 1);
    }

    #[test]
    fn values_keep_functions_and_strings() {
        let sheet = parse(".foo { color: resolve(\"other.bar\"); background: url(a.png) no-repeat; }");
        let rules = sheet.rules();
        let values: Vec<_> = rules[0].declarations().map(|d| d.value.as_str()).collect();
        assert_eq!(values, vec!["resolve(\"other.bar\")", "url(a.png) no-repeat"]);
    }

    #[test]
    fn records_positions() {
        let sheet = parse("\n\n  .foo { color: red; }");
        let rules = sheet.rules();
        assert_eq!(rules[0].position.line, 3);
        assert_eq!(rules[0].position.offset, 4);
    }

    #[test]
    fn rule_ids_are_unique() {
        let sheet = parse(".a {} .b {} @media print { .c {} }");
        let mut ids: Vec<_> = sheet.rules().iter().map(|rule| rule.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn malformed_declaration_is_an_error() {
        let err = parse_stylesheet(".foo { color red; }", "bad.css").unwrap_err();
        assert!(err.to_string().contains("Malformed declaration"), "{}", err);
        assert_eq!(err.location().map(|l| l.line), Some(1));
    }

    #[test]
    fn serializes_with_two_space_indent() {
        let sheet = parse(".a{color:red}.b{float:left}");
        assert_eq!(sheet.to_string(), ".a {\n  color: red;\n}\n\n.b {\n  float: left;\n}\n");
    }

    #[test]
    fn comments_survive() {
        let sheet = parse("/* hello */ .a { color: red; }");
        assert_eq!(sheet.nodes[0], Node::Comment(" hello ".to_string()));
        assert!(sheet.to_string().starts_with("/* hello */\n"));
    }
}
