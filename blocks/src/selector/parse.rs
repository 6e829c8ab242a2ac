use std::fmt;

use cssparser::{BasicParseErrorKind, ParseError, ParseErrorKind, Parser, ParserInput, Token};

use crate::selector::{
    AttributeOperator, AttributeSelector, Combinator, CompoundSelector, ParsedSelector,
    PseudoElement, SimpleSelector,
};

/// A selector that does not fit the grammar. Line and column are relative
/// to the selector text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl SelectorError {
    fn from_parse_error(error: ParseError<'_, String>) -> Self {
        let message = match error.kind {
            ParseErrorKind::Custom(message) => message,
            ParseErrorKind::Basic(BasicParseErrorKind::EndOfInput) => {
                "Unexpected end of selector".to_string()
            }
            ParseErrorKind::Basic(BasicParseErrorKind::UnexpectedToken(token)) => {
                format!("Unexpected {:?} in selector", token)
            }
            ParseErrorKind::Basic(other) => format!("{:?}", other),
        };
        SelectorError {
            message,
            line: error.location.line + 1,
            column: error.location.column,
        }
    }
}

type SelectorParseError<'i> = ParseError<'i, String>;

/// Parse a comma-separated selector list.
pub fn parse_selectors(text: &str) -> Result<Vec<ParsedSelector>, SelectorError> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    parse_selector_list(&mut parser).map_err(SelectorError::from_parse_error)
}

fn parse_selector_list<'i>(
    parser: &mut Parser<'i, '_>,
) -> Result<Vec<ParsedSelector>, SelectorParseError<'i>> {
    let mut selectors = Vec::new();
    let mut builder = ChainBuilder::default();

    loop {
        let token = match parser.next_including_whitespace().cloned() {
            Ok(token) => token,
            Err(_) => break,
        };
        match token {
            Token::WhiteSpace(_) => builder.whitespace(),
            Token::Comma => selectors.push(builder.finish(parser)?),
            Token::Delim('>') => builder.combinator(parser, Combinator::Child)?,
            Token::Delim('+') => builder.combinator(parser, Combinator::NextSibling)?,
            Token::Delim('~') => builder.combinator(parser, Combinator::SubsequentSibling)?,
            Token::Delim('.') => {
                let name = expect_ident_immediate(parser)?;
                builder.simple(parser, SimpleSelector::Class(name))?;
            }
            Token::Delim('*') => builder.simple(parser, SimpleSelector::Universal)?,
            Token::Ident(name) => builder.simple(parser, SimpleSelector::Type(name.to_string()))?,
            Token::IDHash(id) | Token::Hash(id) => {
                builder.simple(parser, SimpleSelector::Id(id.to_string()))?
            }
            Token::SquareBracketBlock => {
                let attribute = parser.parse_nested_block(parse_attribute)?;
                builder.simple(parser, SimpleSelector::Attribute(attribute))?;
            }
            Token::Colon => parse_pseudo(parser, &mut builder)?,
            other => {
                return Err(parser.new_custom_error(format!("Unexpected {:?} in selector", other)));
            }
        }
    }

    selectors.push(builder.finish(parser)?);
    Ok(selectors)
}

/// Accumulates one complex selector as tokens arrive.
#[derive(Default)]
struct ChainBuilder {
    chain: Option<ParsedSelector>,
    compound: CompoundSelector,
    combinator: Option<Combinator>,
    whitespace: bool,
}

impl ChainBuilder {
    fn whitespace(&mut self) {
        self.whitespace = true;
    }

    /// Whitespace between two compounds is the descendant combinator.
    fn take_descendant(&mut self) {
        if self.whitespace && !self.compound.is_empty() {
            self.end_compound();
            self.combinator = Some(Combinator::Descendant);
        }
        self.whitespace = false;
    }

    fn simple<'i>(
        &mut self,
        parser: &Parser<'i, '_>,
        node: SimpleSelector,
    ) -> Result<(), SelectorParseError<'i>> {
        self.take_descendant();
        if self.compound.pseudo_element.is_some() {
            return Err(parser.new_custom_error(
                "A pseudo-element must be the last part of a compound selector".to_string(),
            ));
        }
        self.compound.nodes.push(node);
        Ok(())
    }

    fn pseudo_element<'i>(
        &mut self,
        parser: &Parser<'i, '_>,
        pseudo: PseudoElement,
    ) -> Result<(), SelectorParseError<'i>> {
        self.take_descendant();
        if self.compound.pseudo_element.is_some() {
            return Err(parser.new_custom_error(
                "A compound selector can only have one pseudo-element".to_string(),
            ));
        }
        self.compound.pseudo_element = Some(pseudo);
        Ok(())
    }

    fn combinator<'i>(
        &mut self,
        parser: &Parser<'i, '_>,
        combinator: Combinator,
    ) -> Result<(), SelectorParseError<'i>> {
        if self.compound.is_empty() {
            return Err(parser.new_custom_error(format!(
                "Unexpected combinator `{}`",
                combinator.to_string().trim()
            )));
        }
        self.end_compound();
        self.combinator = Some(combinator);
        self.whitespace = false;
        Ok(())
    }

    fn end_compound(&mut self) {
        let compound = std::mem::take(&mut self.compound);
        match (self.chain.as_mut(), self.combinator.take()) {
            (Some(chain), Some(combinator)) => chain.push(combinator, compound),
            _ => self.chain = Some(ParsedSelector::new(compound)),
        }
    }

    fn finish<'i>(&mut self, parser: &Parser<'i, '_>) -> Result<ParsedSelector, SelectorParseError<'i>> {
        if self.compound.is_empty() {
            return Err(parser.new_custom_error("Expected a selector".to_string()));
        }
        self.end_compound();
        let chain = self.chain.take();
        *self = ChainBuilder::default();
        chain.ok_or_else(|| parser.new_custom_error("Expected a selector".to_string()))
    }
}

fn expect_ident_immediate<'i>(parser: &mut Parser<'i, '_>) -> Result<String, SelectorParseError<'i>> {
    match parser.next_including_whitespace().cloned() {
        Ok(Token::Ident(name)) => Ok(name.to_string()),
        _ => Err(parser.new_custom_error("Expected an identifier".to_string())),
    }
}

fn parse_pseudo<'i>(
    parser: &mut Parser<'i, '_>,
    builder: &mut ChainBuilder,
) -> Result<(), SelectorParseError<'i>> {
    match parser.next_including_whitespace().cloned() {
        Ok(Token::Colon) => {
            let name = expect_ident_immediate(parser)?.to_ascii_lowercase();
            builder.pseudo_element(parser, PseudoElement { name, legacy: false })
        }
        Ok(Token::Ident(name)) => {
            let name = name.to_ascii_lowercase();
            if PseudoElement::is_legacy_name(&name) {
                builder.pseudo_element(parser, PseudoElement { name, legacy: true })
            } else {
                builder.simple(parser, SimpleSelector::PseudoClass { name, argument: None })
            }
        }
        Ok(Token::Function(name)) => {
            let name = name.to_ascii_lowercase();
            let argument = parser.parse_nested_block(|nested| {
                let start = nested.position();
                while nested.next_including_whitespace_and_comments().is_ok() {}
                Ok::<_, SelectorParseError<'i>>(nested.slice_from(start).trim().to_string())
            })?;
            builder.simple(
                parser,
                SimpleSelector::PseudoClass {
                    name,
                    argument: Some(argument),
                },
            )
        }
        _ => Err(parser.new_custom_error("Expected a pseudo-class or pseudo-element name".to_string())),
    }
}

fn parse_attribute<'i>(parser: &mut Parser<'i, '_>) -> Result<AttributeSelector, SelectorParseError<'i>> {
    parser.skip_whitespace();
    let (namespace, name) = match parser.next_including_whitespace().cloned()? {
        Token::Ident(first) => {
            let state = parser.state();
            match parser.next_including_whitespace().cloned() {
                Ok(Token::Delim('|')) => (Some(first.to_string()), expect_ident_immediate(parser)?),
                _ => {
                    parser.reset(&state);
                    (None, first.to_string())
                }
            }
        }
        Token::Delim('*') => match parser.next_including_whitespace().cloned() {
            Ok(Token::Delim('|')) => (Some("*".to_string()), expect_ident_immediate(parser)?),
            _ => return Err(parser.new_custom_error("Expected `|` after `*`".to_string())),
        },
        Token::Delim('|') => (Some(String::new()), expect_ident_immediate(parser)?),
        _ => return Err(parser.new_custom_error("Expected an attribute name".to_string())),
    };

    let mut attribute = AttributeSelector {
        namespace,
        name,
        operator: None,
        value: None,
        flag: None,
    };
    if parser.is_exhausted() {
        return Ok(attribute);
    }

    let operator = match parser.next().cloned()? {
        Token::Delim('=') => AttributeOperator::Equals,
        Token::IncludeMatch => AttributeOperator::Includes,
        Token::DashMatch => AttributeOperator::DashMatch,
        Token::PrefixMatch => AttributeOperator::Prefix,
        Token::SuffixMatch => AttributeOperator::Suffix,
        Token::SubstringMatch => AttributeOperator::Substring,
        _ => return Err(parser.new_custom_error("Expected an attribute operator".to_string())),
    };
    let value = match parser.next().cloned()? {
        Token::Ident(value) | Token::QuotedString(value) => value.to_string(),
        _ => return Err(parser.new_custom_error("Expected an attribute value".to_string())),
    };
    attribute.operator = Some(operator);
    attribute.value = Some(value);

    if !parser.is_exhausted() {
        match parser.next().cloned()? {
            Token::Ident(flag) => attribute.flag = Some(flag.to_string()),
            _ => {
                return Err(parser.new_custom_error("Unexpected token in attribute selector".to_string()));
            }
        }
    }
    Ok(attribute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::selector_list;

    fn parse_one(text: &str) -> ParsedSelector {
        let mut selectors = parse_selectors(text).expect("selector should parse");
        assert_eq!(selectors.len(), 1);
        selectors.remove(0)
    }

    #[test]
    fn splits_key_and_context() {
        let selector = parse_one(".root > .foo .bar");
        assert_eq!(selector.combinator_count(), 2);
        assert_eq!(selector.key().nodes, vec![SimpleSelector::Class("bar".into())]);
        assert_eq!(selector.combinator(), Some(Combinator::Descendant));
        assert_eq!(selector.context().map(|c| c.to_string()), Some(".root > .foo".to_string()));
    }

    #[test]
    fn classifies_states() {
        let selector = parse_one(".foo[state|size=large]");
        let key = selector.key();
        assert_eq!(key.nodes.len(), 2);
        assert_eq!(key.nodes[1].as_state(), Some((Some("size"), "large")));

        let boolean = parse_one("[state|open]");
        assert_eq!(boolean.key().nodes[0].as_state(), Some((None, "open")));

        let plain = parse_one("[data-x=\"1\"]");
        assert_eq!(plain.key().nodes[0].as_state(), None);
    }

    #[test]
    fn pseudo_elements_trail_the_key() {
        let selector = parse_one(".foo::before");
        assert_eq!(selector.pseudo_element().map(|p| p.name.as_str()), Some("before"));

        let legacy = parse_one(".foo:after");
        let pseudo = legacy.pseudo_element().expect("legacy pseudo-element");
        assert!(pseudo.legacy);
        assert_eq!(legacy.to_string(), ".foo:after");

        let class = parse_one(".foo:hover");
        assert!(class.pseudo_element().is_none());
        assert_eq!(class.key().nodes.len(), 2);
    }

    #[test]
    fn pseudo_element_must_end_compound() {
        let err = parse_selectors(".foo::before.bar").unwrap_err();
        assert!(err.message.contains("pseudo-element"), "{}", err);
    }

    #[test]
    fn parses_lists_and_serializes() {
        let selectors = parse_selectors(".a,.b ~ .c+.d").expect("list should parse");
        assert_eq!(selectors.len(), 2);
        assert_eq!(selector_list(&selectors), ".a, .b ~ .c + .d");
    }

    #[test]
    fn functional_pseudo_class_keeps_argument() {
        let selector = parse_one("other:state(size large)");
        assert_eq!(
            selector.key().nodes[1],
            SimpleSelector::PseudoClass {
                name: "state".into(),
                argument: Some("size large".into()),
            }
        );
    }

    #[test]
    fn rejects_dangling_combinators() {
        assert!(parse_selectors(".a >").is_err());
        assert!(parse_selectors("> .a").is_err());
        assert!(parse_selectors(".a > > .b").is_err());
        assert!(parse_selectors(".a,").is_err());
    }

    #[test]
    fn state_serialization_round_trips() {
        let node = SimpleSelector::state(Some("size"), "large");
        assert_eq!(node.to_string(), "[state|size=large]");
        assert_eq!(SimpleSelector::state(None, "open").to_string(), "[state|open]");
    }
}
