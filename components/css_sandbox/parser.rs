/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Builds a [`StyleSheet`] from CSS text.
//!
//! Parsing is tolerant: a malformed rule or declaration is dropped with a
//! warning and parsing resumes after it. At-rules are not supported and are
//! skipped.

use cssparser::{
    BasicParseErrorKind, Delimiter, ParseError, ParseErrorKind, Parser, ParserInput,
    SourceLocation, ToCss, Token, parse_important,
};
use url::Url;

use crate::messages::{Message, MessageKind, MessageLevel, MessageQueue};
use crate::name::Name;
use crate::tree::{
    Atom, Attrib, AttribOperator, Combinator, Declaration, ElementName, Expr, FunctionCall,
    Operation, Operator, Property, Pseudo, PseudoKind, RuleSet, Selector, SelectorComponent,
    SelectorPart, SimpleSelector, StyleSheet, Term, UnaryOperator,
};

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SyntaxError {
    #[error("empty selector")]
    EmptySelector,
    #[error("selector ends with a combinator")]
    DanglingCombinator,
    #[error("unsupported attribute matcher {0}")]
    UnsupportedAttributeMatcher(String),
    #[error("missing value")]
    EmptyExpression,
    #[error("operator {0} without a term on both sides")]
    MisplacedOperator(String),
    #[error("{0} is not allowed in a property value")]
    UnexpectedValue(String),
    #[error("substitution without a body")]
    BadSubstitution,
}

type Result<'i, T> = std::result::Result<T, ParseError<'i, SyntaxError>>;

/// Parses `css`, reporting anything that had to be dropped to `mq`.
pub fn parse_stylesheet(css: &str, base_url: Url, mq: &mut dyn MessageQueue) -> StyleSheet {
    let mut input = ParserInput::new(css);
    let mut input = Parser::new(&mut input);
    let mut sheet = StyleSheet::new(base_url);
    let mut builder = TreeBuilder { mq };

    loop {
        let start = input.state();
        let location = input.current_source_location();
        let token = match input.next() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        match token {
            Token::CDO | Token::CDC => {},
            Token::AtKeyword(ref name) => {
                builder.report(MessageKind::UnsupportedCssAtRule, location, name);
                skip_at_rule(&mut input);
            },
            _ => {
                input.reset(&start);
                match builder.parse_rule_set(&mut input) {
                    Ok(rule) => sheet.rules.push(rule),
                    Err(error) => {
                        builder.report_error(&error);
                        // Selectors were consumed up to the block; drop it.
                        let _ = input.expect_curly_bracket_block();
                    },
                }
            },
        }
    }
    sheet
}

/// Skips to the end of an at-rule's block or semicolon. Any block is skipped
/// by the next call to `next`.
fn skip_at_rule(input: &mut Parser) {
    while let Ok(token) = input.next() {
        if matches!(token, Token::Semicolon | Token::CurlyBracketBlock) {
            break;
        }
    }
}

fn describe(kind: &ParseErrorKind<SyntaxError>) -> String {
    match kind {
        ParseErrorKind::Basic(BasicParseErrorKind::UnexpectedToken(token)) => {
            format!("unexpected {}", token.to_css_string())
        },
        ParseErrorKind::Basic(BasicParseErrorKind::EndOfInput) => {
            "unexpected end of input".to_owned()
        },
        ParseErrorKind::Basic(other) => format!("{other:?}"),
        ParseErrorKind::Custom(error) => error.to_string(),
    }
}

struct TreeBuilder<'a> {
    mq: &'a mut dyn MessageQueue,
}

impl TreeBuilder<'_> {
    fn report(&mut self, kind: MessageKind, location: SourceLocation, detail: &str) {
        self.mq.add_message(Message::new(
            kind,
            MessageLevel::Warning,
            location,
            vec![detail.into()],
        ));
    }

    fn report_error(&mut self, error: &ParseError<SyntaxError>) {
        let detail = describe(&error.kind);
        self.report(MessageKind::CssSyntaxError, error.location, &detail);
    }

    fn parse_rule_set<'i>(&mut self, input: &mut Parser<'i, '_>) -> Result<'i, RuleSet> {
        let location = input.current_source_location();
        let selectors = input.parse_until_before(Delimiter::CurlyBracketBlock, |input| {
            input.parse_comma_separated(parse_selector)
        })?;
        input.expect_curly_bracket_block()?;
        let declarations = input.parse_nested_block(|input| -> Result<'i, _> {
            Ok(self.parse_declarations(input))
        })?;
        Ok(RuleSet {
            location,
            selectors,
            declarations,
        })
    }

    fn parse_declarations(&mut self, input: &mut Parser) -> Vec<Declaration> {
        let mut declarations = vec![];
        while !input.is_exhausted() {
            let state = input.state();
            if let Ok(&Token::Semicolon) = input.next() {
                continue;
            }
            input.reset(&state);
            match input.parse_until_after(Delimiter::Semicolon, parse_declaration) {
                Ok(declaration) => declarations.push(declaration),
                Err(error) => self.report_error(&error),
            }
        }
        declarations
    }
}

fn parse_selector<'i>(input: &mut Parser<'i, '_>) -> Result<'i, Selector> {
    input.skip_whitespace();
    let location = input.current_source_location();
    let mut parts = vec![SelectorPart::Simple(parse_simple_selector(input)?)];
    loop {
        let mut combinator = None;
        loop {
            let state = input.state();
            let token = match input.next_including_whitespace() {
                Ok(token) => token.clone(),
                Err(_) => {
                    return match combinator {
                        None | Some(Combinator::Descendant) => Ok(Selector {
                            location,
                            parts,
                            invalid: false,
                        }),
                        Some(_) => {
                            Err(input.new_custom_error(SyntaxError::DanglingCombinator))
                        },
                    };
                },
            };
            let explicit = match token {
                Token::WhiteSpace(_) => {
                    combinator.get_or_insert(Combinator::Descendant);
                    continue;
                },
                Token::Delim('>') => Combinator::Child,
                Token::Delim('+') => Combinator::Sibling,
                _ => {
                    input.reset(&state);
                    break;
                },
            };
            if matches!(combinator, Some(Combinator::Child | Combinator::Sibling)) {
                return Err(state
                    .source_location()
                    .new_unexpected_token_error(token));
            }
            combinator = Some(explicit);
        }
        let Some(combinator) = combinator else {
            let token = input.next_including_whitespace()?.clone();
            return Err(input.new_unexpected_token_error(token));
        };
        parts.push(SelectorPart::Combination(combinator));
        parts.push(SelectorPart::Simple(parse_simple_selector(input)?));
    }
}

fn parse_simple_selector<'i>(input: &mut Parser<'i, '_>) -> Result<'i, SimpleSelector> {
    let location = input.current_source_location();
    let state = input.state();
    let element = match input.next_including_whitespace() {
        Ok(Token::Ident(name)) => Some(ElementName::Ident(Name::css(name))),
        Ok(Token::Delim('*')) => Some(ElementName::Wildcard),
        _ => {
            input.reset(&state);
            None
        },
    };

    let mut components = vec![];
    loop {
        let state = input.state();
        let location = input.current_source_location();
        let token = match input.next_including_whitespace() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        let component = match token {
            Token::IDHash(ref id) => SelectorComponent::Id(id.to_string()),
            Token::Delim('.') => match input.next_including_whitespace()? {
                Token::Ident(class) => SelectorComponent::Class(class.to_string()),
                other => {
                    let other = other.clone();
                    return Err(input.new_unexpected_token_error(other));
                },
            },
            Token::SquareBracketBlock => SelectorComponent::Attrib(
                input.parse_nested_block(|input| parse_attrib(input, location))?,
            ),
            Token::Colon => SelectorComponent::Pseudo(parse_pseudo(input, location)?),
            _ => {
                input.reset(&state);
                break;
            },
        };
        components.push(component);
    }

    if element.is_none() && components.is_empty() {
        return Err(input.new_custom_error(SyntaxError::EmptySelector));
    }
    Ok(SimpleSelector {
        location,
        element,
        components,
        invalid: false,
    })
}

fn parse_attrib<'i>(input: &mut Parser<'i, '_>, location: SourceLocation) -> Result<'i, Attrib> {
    let ident = Name::css(input.expect_ident()?);
    let matcher = match input.next() {
        Err(_) => None,
        Ok(token) => {
            let operator = match token {
                Token::Delim('=') => AttribOperator::Equal,
                Token::IncludeMatch => AttribOperator::Includes,
                Token::DashMatch => AttribOperator::DashMatch,
                other => {
                    let other = other.to_css_string();
                    return Err(
                        input.new_custom_error(SyntaxError::UnsupportedAttributeMatcher(other))
                    );
                },
            };
            let value = input.expect_ident_or_string()?.to_string();
            input.expect_exhausted()?;
            Some((operator, value))
        },
    };
    Ok(Attrib {
        location,
        ident,
        matcher,
        invalid: false,
    })
}

/// After the `:`.
fn parse_pseudo<'i>(input: &mut Parser<'i, '_>, location: SourceLocation) -> Result<'i, Pseudo> {
    let state = input.state();
    if !matches!(input.next_including_whitespace(), Ok(Token::Colon)) {
        input.reset(&state);
    }
    let kind = match input.next_including_whitespace()?.clone() {
        Token::Ident(name) => PseudoKind::Ident(Name::css(&name)),
        Token::Function(name) => PseudoKind::Function(FunctionCall {
            name: Name::css(&name),
            args: input.parse_nested_block(parse_expr)?,
        }),
        other => return Err(input.new_unexpected_token_error(other)),
    };
    Ok(Pseudo { location, kind })
}

fn parse_declaration<'i>(input: &mut Parser<'i, '_>) -> Result<'i, Declaration> {
    input.skip_whitespace();
    let location = input.current_source_location();
    let name = Name::css(input.expect_ident()?);
    input.expect_colon()?;
    let expr = input.parse_until_before(Delimiter::Bang, parse_expr)?;
    if expr.is_empty() {
        return Err(input.new_custom_error(SyntaxError::EmptyExpression));
    }
    let important = input.try_parse(parse_important).is_ok();
    input.expect_exhausted()?;
    Ok(Declaration {
        location,
        property: Property {
            location,
            name,
            invalid: false,
        },
        expr,
        important,
        invalid: false,
    })
}

/// Terms separated by whitespace, `/` or `,`.
fn parse_expr<'i>(input: &mut Parser<'i, '_>) -> Result<'i, Expr> {
    input.skip_whitespace();
    let mut expr = Expr::new(input.current_source_location());
    let mut pending: Option<Operation> = None;
    loop {
        let location = input.current_source_location();
        let start = input.position();
        let token = match input.next_including_whitespace() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        let operator = match token {
            Token::WhiteSpace(_) => {
                if pending.is_none() {
                    pending = Some(Operation {
                        location,
                        operator: Operator::None,
                    });
                }
                continue;
            },
            Token::Delim('/') => Some(Operator::Div),
            Token::Comma => Some(Operator::Comma),
            _ => None,
        };
        if let Some(operator) = operator {
            let previous = pending.as_ref().map(|operation| operation.operator);
            if expr.is_empty() || matches!(previous, Some(Operator::Div | Operator::Comma)) {
                return Err(location.new_custom_error(SyntaxError::MisplacedOperator(
                    operator.symbol().to_owned(),
                )));
            }
            pending = Some(Operation { location, operator });
            continue;
        }

        let term = parse_term(input, token, location, start)?;
        expr.push(pending.take(), term);
    }

    match pending {
        Some(Operation {
            location,
            operator: operator @ (Operator::Div | Operator::Comma),
        }) => Err(location.new_custom_error(SyntaxError::MisplacedOperator(
            operator.symbol().to_owned(),
        ))),
        _ => Ok(expr),
    }
}

fn parse_term<'i>(
    input: &mut Parser<'i, '_>,
    token: Token<'i>,
    location: SourceLocation,
    start: cssparser::SourcePosition,
) -> Result<'i, Term> {
    let atom = match token {
        Token::Ident(ref ident) => Atom::Ident(ident.to_string()),
        Token::QuotedString(ref value) => Atom::String(value.to_string()),
        Token::IDHash(ref value) | Token::Hash(ref value) => Atom::Hash(value.to_string()),
        Token::UnquotedUrl(ref value) => Atom::Uri(value.to_string()),
        Token::Number { has_sign, .. } |
        Token::Percentage { has_sign, .. } |
        Token::Dimension { has_sign, .. } => {
            let text = input.slice_from(start);
            let operator = match text.chars().next() {
                Some('-') if has_sign => Some(UnaryOperator::Negation),
                Some('+') if has_sign => Some(UnaryOperator::Identity),
                _ => None,
            };
            let magnitude = if operator.is_some() { &text[1..] } else { text };
            return Ok(Term {
                location,
                operator,
                atom: Atom::Quantity(magnitude.to_owned()),
                part: None,
            });
        },
        Token::Function(ref name) if name.eq_ignore_ascii_case("url") => {
            Atom::Uri(input.parse_nested_block(|input| -> Result<'i, _> {
                let value = input.expect_string()?.to_string();
                input.expect_exhausted()?;
                Ok(value)
            })?)
        },
        Token::Function(ref name) => Atom::Function(FunctionCall {
            name: Name::css(name),
            args: input.parse_nested_block(parse_expr)?,
        }),
        Token::Delim('$') => Atom::Substitution(parse_substitution(input, start)?),
        other => {
            return Err(location.new_custom_error(SyntaxError::UnexpectedValue(
                other.to_css_string(),
            )));
        },
    };
    Ok(Term::new(location, atom))
}

/// `$(...)` with an optional unit directly after the closing parenthesis.
fn parse_substitution<'i>(
    input: &mut Parser<'i, '_>,
    start: cssparser::SourcePosition,
) -> Result<'i, String> {
    if !matches!(input.next_including_whitespace(), Ok(Token::ParenthesisBlock)) {
        return Err(input.new_custom_error(SyntaxError::BadSubstitution));
    }
    input.parse_nested_block(|input| -> Result<'i, _> {
        while input.next().is_ok() {}
        Ok(())
    })?;
    let state = input.state();
    if !matches!(
        input.next_including_whitespace(),
        Ok(Token::Ident(_) | Token::Delim('%'))
    ) {
        input.reset(&state);
    }
    Ok(input.slice_from(start).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SimpleMessageQueue;

    fn parse(css: &str) -> (StyleSheet, SimpleMessageQueue) {
        let mut mq = SimpleMessageQueue::new();
        let base = Url::parse("http://example.org/").unwrap();
        let sheet = parse_stylesheet(css, base, &mut mq);
        (sheet, mq)
    }

    fn round_trip(css: &str) -> String {
        let (sheet, mq) = parse(css);
        assert!(mq.messages().is_empty(), "{:?}", mq.messages());
        sheet.to_css_string()
    }

    #[test]
    fn test_selectors() {
        assert_eq!(
            round_trip("DIV#ok > p.a.b + *[title='x'] :hover, a:visited {}"),
            "div#ok > p.a.b + *[title=\"x\"] :hover, a:visited { }"
        );
        assert_eq!(round_trip("p::before { }"), "p:before { }");
        assert_eq!(round_trip("li:nth-child(2n) { }"), "li:nth-child(2n) { }");
    }

    #[test]
    fn test_declarations() {
        assert_eq!(
            round_trip("p { font: 12pt/14pt 'Times New Roman', serif ; color: red !important }"),
            "p { font: 12pt/14pt \"Times New Roman\", serif; color: red !important }"
        );
    }

    #[test]
    fn test_terms() {
        let (sheet, _) =
            parse("p { margin: -5px +4 .5em url(a.png) url('b.png') rgb(1, 2, 3) #fff $(x)em }");
        let expr = &sheet.rules[0].declarations[0].expr;
        assert_eq!(expr.terms.len(), 8);
        assert_eq!(expr.terms[0].operator, Some(UnaryOperator::Negation));
        assert_eq!(expr.terms[0].atom, Atom::Quantity("5px".to_owned()));
        assert_eq!(expr.terms[1].operator, Some(UnaryOperator::Identity));
        assert_eq!(expr.terms[2].atom, Atom::Quantity(".5em".to_owned()));
        assert_eq!(expr.terms[3].atom, Atom::Uri("a.png".to_owned()));
        assert_eq!(expr.terms[4].atom, Atom::Uri("b.png".to_owned()));
        match expr.terms[5].atom {
            Atom::Function(ref call) => {
                assert_eq!(call.name, Name::css("rgb"));
                assert_eq!(call.args.terms.len(), 3);
                assert_eq!(call.args.operations[0].operator, Operator::Comma);
            },
            ref other => panic!("unexpected {other:?}"),
        }
        assert_eq!(expr.terms[6].atom, Atom::Hash("fff".to_owned()));
        assert_eq!(expr.terms[7].atom, Atom::Substitution("$(x)em".to_owned()));
        assert!(expr.operations.iter().all(|op| op.operator == Operator::None));
    }

    #[test]
    fn test_recovery() {
        let (sheet, mq) = parse(
            "@import 'x.css'; p > { color: red } a { color: ; width: 1px; ; } \
             @media print { p { color: blue } } i { color: red }",
        );
        assert_eq!(sheet.to_css_string(), "a { width: 1px }\ni { color: red }");
        assert!(mq.has_kind(MessageKind::UnsupportedCssAtRule));
        assert_eq!(
            mq.messages()
                .iter()
                .filter(|message| message.kind == MessageKind::CssSyntaxError)
                .count(),
            2
        );
        assert!(!mq.has_errors());
    }

    #[test]
    fn test_misplaced_operators() {
        let (sheet, mq) = parse("p { margin: 1px / / 2px; padding: , 1px; width: 1px, }");
        assert!(sheet.rules[0].declarations.is_empty());
        assert_eq!(mq.messages().len(), 3);
    }
}
