/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Property value signatures, written in the grammar used by the CSS 2.1
//! property definitions, e.g. `[ <color> | transparent ]{1,4} | inherit`.
//!
//! <https://www.w3.org/TR/CSS21/about.html#value-defs>

use std::fmt;
use std::iter::Peekable;
use std::vec::IntoIter;

use crate::name::Name;

/// Upper bound of `*`, `+` and `||`.
pub const UNBOUNDED: u32 = u32::MAX;

/// The most members a `||` group may have.
pub const MAX_EXCLUSIVE_MEMBERS: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub enum Signature {
    /// A keyword, number or punctuation mark that must appear as written.
    Literal(String),
    /// Juxtaposed signatures that must all match in order.
    Series(Vec<Signature>),
    /// `a | b`: the first alternative that matches wins.
    Set(Vec<Signature>),
    /// `a || b`: any members in any order, each at most once. Only
    /// meaningful as the child of a [`Signature::Repeated`].
    ExclusiveSet(Vec<Signature>),
    /// `a*`, `a+`, `a?`, `a{m,n}`.
    Repeated {
        child: Box<Signature>,
        min: u32,
        max: u32,
    },
    /// `<name>` or `<name:min,max>`.
    Symbol {
        name: Name,
        range: Option<SymbolRange>,
    },
    /// `'property'`, the value grammar of another property.
    PropertyRef(Name),
    /// `name(formals)`. A call without formals takes no arguments.
    Call {
        name: Name,
        formals: Option<Box<Signature>>,
    },
}

/// The numeric bounds of a symbol such as `<length:0,>`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SymbolRange {
    pub min: f64,
    /// Infinite when the upper bound was omitted.
    pub max: f64,
}

impl SymbolRange {
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("illegal character {0:?}")]
    IllegalCharacter(char),
    #[error("unexpected {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of signature")]
    UnexpectedEnd,
    /// `{m,n}` with `m > n` or a bound that is not a number.
    #[error("bad repetition bounds")]
    BadRepetition,
    #[error("more than {MAX_EXCLUSIVE_MEMBERS} members in a || group")]
    TooManyAlternatives,
}

impl Signature {
    pub fn parse(input: &str) -> Result<Signature, SignatureError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens: tokens.into_iter().peekable(),
        };
        let signature = parser.parse_alternatives()?;
        match parser.tokens.next() {
            None => Ok(signature),
            Some(token) => Err(SignatureError::UnexpectedToken(token.to_string())),
        }
    }

    /// Calls `f` on this signature and every signature nested in it,
    /// parents first.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Signature)) {
        f(self);
        match self {
            Signature::Series(children) |
            Signature::Set(children) |
            Signature::ExclusiveSet(children) => {
                for child in children {
                    child.walk(f);
                }
            },
            Signature::Repeated { child, .. } => child.walk(f),
            Signature::Call {
                formals: Some(formals),
                ..
            } => formals.walk(f),
            Signature::Literal(_) |
            Signature::Symbol { .. } |
            Signature::PropertyRef(_) |
            Signature::Call { formals: None, .. } => {},
        }
    }

    /// The keywords that appear anywhere in this signature.
    pub fn keywords(&self) -> Vec<&str> {
        let mut keywords = vec![];
        self.walk(&mut |signature| {
            if let Signature::Literal(value) = signature {
                if value.starts_with(|c: char| c.is_ascii_alphabetic()) {
                    keywords.push(value.as_str());
                }
            }
        });
        keywords
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn join(f: &mut fmt::Formatter, children: &[Signature], separator: &str) -> fmt::Result {
            f.write_str("[ ")?;
            for (i, child) in children.iter().enumerate() {
                if i != 0 {
                    f.write_str(separator)?;
                }
                child.fmt(f)?;
            }
            f.write_str(" ]")
        }

        match self {
            Signature::Literal(value) => f.write_str(value),
            Signature::Series(children) => join(f, children, " "),
            Signature::Set(children) => join(f, children, " | "),
            Signature::ExclusiveSet(children) => join(f, children, " || "),
            Signature::Repeated { child, min, max } => {
                child.fmt(f)?;
                match (*min, *max) {
                    (0, UNBOUNDED) => f.write_str("*"),
                    (1, UNBOUNDED) => f.write_str("+"),
                    (0, 1) => f.write_str("?"),
                    (min, UNBOUNDED) => write!(f, "{{{min},}}"),
                    (min, max) if min == max => write!(f, "{{{min}}}"),
                    (min, max) => write!(f, "{{{min},{max}}}"),
                }
            },
            Signature::Symbol { name, range: None } => write!(f, "<{name}>"),
            Signature::Symbol {
                name,
                range: Some(range),
            } => {
                if range.max.is_infinite() {
                    write!(f, "<{name}:{},>", range.min)
                } else {
                    write!(f, "<{name}:{},{}>", range.min, range.max)
                }
            },
            Signature::PropertyRef(name) => write!(f, "'{name}'"),
            Signature::Call {
                name,
                formals: None,
            } => write!(f, "{name}()"),
            Signature::Call {
                name,
                formals: Some(formals),
            } => write!(f, "{name}({formals})"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token<'a> {
    /// `<length:0,>`, without the angle brackets.
    Symbol(&'a str),
    /// `'font-size'`, without the quotes.
    PropertyRef(&'a str),
    Keyword(&'a str),
    Number(&'a str),
    /// `||`
    DoubleBar,
    /// `|`
    Bar,
    /// `(`
    OpeningParenthesis,
    /// `)`
    ClosingParenthesis,
    /// `{`
    OpeningBrace,
    /// `}`
    ClosingBrace,
    /// `[`
    OpeningBracket,
    /// `]`
    ClosingBracket,
    /// `*`
    Star,
    /// `+`
    Plus,
    /// `?`
    QuestionMark,
    /// `,`
    Comma,
    /// `/`
    Slash,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Symbol(name) => write!(f, "<{name}>"),
            Token::PropertyRef(name) => write!(f, "'{name}'"),
            Token::Keyword(text) | Token::Number(text) => f.write_str(text),
            Token::DoubleBar => f.write_str("||"),
            Token::Bar => f.write_str("|"),
            Token::OpeningParenthesis => f.write_str("("),
            Token::ClosingParenthesis => f.write_str(")"),
            Token::OpeningBrace => f.write_str("{"),
            Token::ClosingBrace => f.write_str("}"),
            Token::OpeningBracket => f.write_str("["),
            Token::ClosingBracket => f.write_str("]"),
            Token::Star => f.write_str("*"),
            Token::Plus => f.write_str("+"),
            Token::QuestionMark => f.write_str("?"),
            Token::Comma => f.write_str(","),
            Token::Slash => f.write_str("/"),
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_name_continuation(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

struct Tokenizer<'a> {
    remaining: &'a str,
}

impl<'a> Tokenizer<'a> {
    /// `[a-zA-Z][\w-]*`. If the result is `None` then `self.remaining` is
    /// unchanged.
    fn consume_name(&mut self) -> Option<&'a str> {
        if !self.remaining.starts_with(is_name_start) {
            return None;
        }
        let end = self
            .remaining
            .find(|c: char| !is_name_continuation(c))
            .unwrap_or(self.remaining.len());
        let (name, remaining) = self.remaining.split_at(end);
        self.remaining = remaining;
        Some(name)
    }

    fn consume_digits(&mut self) -> &'a str {
        let end = self
            .remaining
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.remaining.len());
        let (digits, remaining) = self.remaining.split_at(end);
        self.remaining = remaining;
        digits
    }

    /// `<name>` or `<name:min,max>` with an optional `max`.
    fn consume_symbol(&mut self) -> Result<&'a str, SignatureError> {
        let start = self.remaining;
        self.remaining = &self.remaining[1..];
        self.consume_name()
            .ok_or(SignatureError::IllegalCharacter('<'))?;
        if self.remaining.starts_with(':') {
            self.remaining = &self.remaining[1..];
            if self.consume_digits().is_empty() || !self.remaining.starts_with(',') {
                return Err(SignatureError::BadRepetition);
            }
            self.remaining = &self.remaining[1..];
            self.consume_digits();
        }
        if !self.remaining.starts_with('>') {
            return Err(SignatureError::IllegalCharacter('<'));
        }
        self.remaining = &self.remaining[1..];
        let consumed = start.len() - self.remaining.len();
        Ok(&start[1..consumed - 1])
    }

    fn consume_property_ref(&mut self) -> Result<&'a str, SignatureError> {
        self.remaining = &self.remaining[1..];
        let name = self
            .consume_name()
            .ok_or(SignatureError::IllegalCharacter('\''))?;
        if !self.remaining.starts_with('\'') {
            return Err(SignatureError::IllegalCharacter('\''));
        }
        self.remaining = &self.remaining[1..];
        Ok(name)
    }

    /// Parses a single token from the beginning and updates the remaining
    /// input accordingly.
    fn consume_single_token(&mut self) -> Result<Token<'a>, SignatureError> {
        if let Some(name) = self.consume_name() {
            return Ok(Token::Keyword(name));
        }

        let Some(next) = self.remaining.chars().next() else {
            return Err(SignatureError::UnexpectedEnd);
        };
        let token = match next {
            '<' => return self.consume_symbol().map(Token::Symbol),
            '\'' => return self.consume_property_ref().map(Token::PropertyRef),
            '0'..='9' => {
                let digits = self.consume_digits();
                if self.remaining.starts_with(is_name_continuation) {
                    return Err(SignatureError::IllegalCharacter(next));
                }
                return Ok(Token::Number(digits));
            },
            '|' if self.remaining.starts_with("||") => {
                self.remaining = &self.remaining[2..];
                return Ok(Token::DoubleBar);
            },
            '|' => Token::Bar,
            '(' => Token::OpeningParenthesis,
            ')' => Token::ClosingParenthesis,
            '{' => Token::OpeningBrace,
            '}' => Token::ClosingBrace,
            '[' => Token::OpeningBracket,
            ']' => Token::ClosingBracket,
            '*' => Token::Star,
            '+' => Token::Plus,
            '?' => Token::QuestionMark,
            ',' => Token::Comma,
            '/' => Token::Slash,
            other => {
                log::debug!("Illegal character in signature: {other:?}");
                return Err(SignatureError::IllegalCharacter(other));
            },
        };
        self.remaining = &self.remaining[1..];
        Ok(token)
    }

    fn skip_whitespace(&mut self) {
        self.remaining = self
            .remaining
            .trim_start_matches(|c: char| c.is_ascii_whitespace());
    }
}

fn tokenize(input: &str) -> Result<Vec<Token<'_>>, SignatureError> {
    let mut tokenizer = Tokenizer { remaining: input };
    let mut tokens = vec![];
    loop {
        tokenizer.skip_whitespace();
        if tokenizer.remaining.is_empty() {
            return Ok(tokens);
        }
        tokens.push(tokenizer.consume_single_token()?);
    }
}

/// Recursive descent over the token stream. From loosest to tightest:
/// `|`, `||`, juxtaposition, then the postfix repetition operators.
struct Parser<'a> {
    tokens: Peekable<IntoIter<Token<'a>>>,
}

impl<'a> Parser<'a> {
    fn eat(&mut self, expected: Token) -> bool {
        if self.tokens.peek() == Some(&expected) {
            self.tokens.next();
            return true;
        }
        false
    }

    fn expect(&mut self, expected: Token) -> Result<(), SignatureError> {
        match self.tokens.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(SignatureError::UnexpectedToken(token.to_string())),
            None => Err(SignatureError::UnexpectedEnd),
        }
    }

    fn parse_alternatives(&mut self) -> Result<Signature, SignatureError> {
        let mut alternatives = vec![self.parse_exclusive_set()?];
        while self.eat(Token::Bar) {
            alternatives.push(self.parse_exclusive_set()?);
        }
        if alternatives.len() == 1 {
            return Ok(alternatives.remove(0));
        }
        Ok(Signature::Set(alternatives))
    }

    fn parse_exclusive_set(&mut self) -> Result<Signature, SignatureError> {
        let mut members = vec![self.parse_series()?];
        while self.eat(Token::DoubleBar) {
            members.push(self.parse_series()?);
        }
        if members.len() == 1 {
            return Ok(members.remove(0));
        }
        if members.len() > MAX_EXCLUSIVE_MEMBERS {
            return Err(SignatureError::TooManyAlternatives);
        }
        Ok(Signature::Repeated {
            min: 1,
            max: members.len() as u32,
            child: Box::new(Signature::ExclusiveSet(members)),
        })
    }

    fn parse_series(&mut self) -> Result<Signature, SignatureError> {
        let mut children = vec![self.parse_postfixed()?];
        while let Some(token) = self.tokens.peek() {
            if matches!(
                token,
                Token::ClosingBracket | Token::ClosingParenthesis | Token::Bar | Token::DoubleBar
            ) {
                break;
            }
            children.push(self.parse_postfixed()?);
        }
        if children.len() == 1 {
            return Ok(children.remove(0));
        }
        Ok(Signature::Series(children))
    }

    fn parse_postfixed(&mut self) -> Result<Signature, SignatureError> {
        let mut signature = self.parse_atom()?;
        loop {
            let (min, max) = match self.tokens.peek() {
                Some(Token::Star) => (0, UNBOUNDED),
                Some(Token::Plus) => (1, UNBOUNDED),
                Some(Token::QuestionMark) => (0, 1),
                Some(Token::OpeningBrace) => {
                    self.tokens.next();
                    let bounds = self.parse_bounds()?;
                    signature = repeat(signature, bounds);
                    continue;
                },
                _ => return Ok(signature),
            };
            self.tokens.next();
            signature = repeat(signature, (min, max));
        }
    }

    /// The inside of `{m}`, `{m,n}` or `{m,}`, after the opening brace.
    fn parse_bounds(&mut self) -> Result<(u32, u32), SignatureError> {
        let min = self.parse_count()?;
        let max = if self.eat(Token::Comma) {
            if self.eat(Token::ClosingBrace) {
                return Ok((min, UNBOUNDED));
            }
            self.parse_count()?
        } else {
            min
        };
        self.expect(Token::ClosingBrace)?;
        if min > max {
            return Err(SignatureError::BadRepetition);
        }
        Ok((min, max))
    }

    fn parse_count(&mut self) -> Result<u32, SignatureError> {
        match self.tokens.next() {
            Some(Token::Number(digits)) => {
                digits.parse().map_err(|_| SignatureError::BadRepetition)
            },
            Some(_) => Err(SignatureError::BadRepetition),
            None => Err(SignatureError::UnexpectedEnd),
        }
    }

    fn parse_atom(&mut self) -> Result<Signature, SignatureError> {
        let Some(token) = self.tokens.next() else {
            return Err(SignatureError::UnexpectedEnd);
        };
        match token {
            Token::OpeningBracket => {
                let group = self.parse_alternatives()?;
                self.expect(Token::ClosingBracket)?;
                Ok(group)
            },
            Token::Keyword(keyword) => {
                if !self.eat(Token::OpeningParenthesis) {
                    return Ok(Signature::Literal(keyword.to_ascii_lowercase()));
                }
                let formals = if self.eat(Token::ClosingParenthesis) {
                    None
                } else {
                    let formals = self.parse_alternatives()?;
                    self.expect(Token::ClosingParenthesis)?;
                    Some(Box::new(formals))
                };
                Ok(Signature::Call {
                    name: Name::css(keyword),
                    formals,
                })
            },
            Token::Symbol(text) => parse_symbol(text),
            Token::PropertyRef(name) => Ok(Signature::PropertyRef(Name::css(name))),
            Token::Number(digits) => Ok(Signature::Literal(digits.to_owned())),
            Token::Comma => Ok(Signature::Literal(",".to_owned())),
            Token::Slash => Ok(Signature::Literal("/".to_owned())),
            other => Err(SignatureError::UnexpectedToken(other.to_string())),
        }
    }
}

/// Nested repetitions collapse into one, e.g. `[a{1,2}]{2,3}` repeats `a`
/// at least once and at most six times. A `||` group never repeats past
/// its member count.
fn repeat(signature: Signature, (min, max): (u32, u32)) -> Signature {
    match signature {
        Signature::Repeated {
            child,
            min: inner_min,
            max: inner_max,
        } => {
            let max = if matches!(*child, Signature::ExclusiveSet(_)) {
                inner_max
            } else {
                max.saturating_mul(inner_max)
            };
            Signature::Repeated {
                child,
                min: min.min(inner_min),
                max,
            }
        },
        other => Signature::Repeated {
            child: Box::new(other),
            min,
            max,
        },
    }
}

fn parse_symbol(text: &str) -> Result<Signature, SignatureError> {
    let Some((name, bounds)) = text.split_once(':') else {
        return Ok(Signature::Symbol {
            name: Name::css(text),
            range: None,
        });
    };
    let (min, max) = bounds
        .split_once(',')
        .ok_or(SignatureError::BadRepetition)?;
    let min = min.parse().map_err(|_| SignatureError::BadRepetition)?;
    let max = if max.is_empty() {
        f64::INFINITY
    } else {
        max.parse().map_err(|_| SignatureError::BadRepetition)?
    };
    Ok(Signature::Symbol {
        name: Name::css(name),
        range: Some(SymbolRange { min, max }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(value: &str) -> Signature {
        Signature::Literal(value.to_owned())
    }

    fn symbol(name: &str) -> Signature {
        Signature::Symbol {
            name: Name::css(name),
            range: None,
        }
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("<length:0,> | 'font-size' [a||b]{1,4} rgb(<red>,<green>)"),
            Ok(vec![
                Token::Symbol("length:0,"),
                Token::Bar,
                Token::PropertyRef("font-size"),
                Token::OpeningBracket,
                Token::Keyword("a"),
                Token::DoubleBar,
                Token::Keyword("b"),
                Token::ClosingBracket,
                Token::OpeningBrace,
                Token::Number("1"),
                Token::Comma,
                Token::Number("4"),
                Token::ClosingBrace,
                Token::Keyword("rgb"),
                Token::OpeningParenthesis,
                Token::Symbol("red"),
                Token::Comma,
                Token::Symbol("green"),
                Token::ClosingParenthesis,
            ])
        );
    }

    #[test]
    fn test_tokenize_errors() {
        assert_eq!(tokenize("a & b"), Err(SignatureError::IllegalCharacter('&')));
        assert_eq!(tokenize("<length"), Err(SignatureError::IllegalCharacter('<')));
        assert_eq!(tokenize("<length:a,>"), Err(SignatureError::BadRepetition));
        assert_eq!(tokenize("'font"), Err(SignatureError::IllegalCharacter('\'')));
    }

    #[test]
    fn test_alternation() {
        assert_eq!(
            Signature::parse("none | left | right | both | inherit"),
            Ok(Signature::Set(vec![
                literal("none"),
                literal("left"),
                literal("right"),
                literal("both"),
                literal("inherit"),
            ]))
        );
    }

    #[test]
    fn test_exclusive_set_binds_tighter_than_alternation() {
        assert_eq!(
            Signature::parse("a || b | c"),
            Ok(Signature::Set(vec![
                Signature::Repeated {
                    child: Box::new(Signature::ExclusiveSet(vec![literal("a"), literal("b")])),
                    min: 1,
                    max: 2,
                },
                literal("c"),
            ]))
        );
    }

    #[test]
    fn test_series_binds_tighter_than_exclusive_set() {
        assert_eq!(
            Signature::parse("<uri> [ mix || repeat ]?"),
            Ok(Signature::Series(vec![
                symbol("uri"),
                Signature::Repeated {
                    child: Box::new(Signature::ExclusiveSet(vec![
                        literal("mix"),
                        literal("repeat"),
                    ])),
                    min: 0,
                    max: 2,
                },
            ]))
        );
    }

    #[test]
    fn test_repetition() {
        assert_eq!(
            Signature::parse("<border-style>{1,4}"),
            Ok(Signature::Repeated {
                child: Box::new(symbol("border-style")),
                min: 1,
                max: 4,
            })
        );
        assert_eq!(
            Signature::parse("a{2}"),
            Ok(Signature::Repeated {
                child: Box::new(literal("a")),
                min: 2,
                max: 2,
            })
        );
        assert_eq!(
            Signature::parse("a+*"),
            Ok(Signature::Repeated {
                child: Box::new(literal("a")),
                min: 0,
                max: UNBOUNDED,
            })
        );
        assert_eq!(
            Signature::parse("[a{1,2}]{2,3}"),
            Ok(Signature::Repeated {
                child: Box::new(literal("a")),
                min: 1,
                max: 6,
            })
        );
        assert_eq!(
            Signature::parse("a{3,1}"),
            Err(SignatureError::BadRepetition)
        );
    }

    #[test]
    fn test_symbol_ranges() {
        assert_eq!(
            Signature::parse("<integer:0,255>"),
            Ok(Signature::Symbol {
                name: Name::css("integer"),
                range: Some(SymbolRange {
                    min: 0.0,
                    max: 255.0
                }),
            })
        );
        let Ok(Signature::Symbol {
            range: Some(range), ..
        }) = Signature::parse("<length:0,>")
        else {
            panic!("expected a ranged symbol");
        };
        assert!(range.max.is_infinite());
        assert!(range.contains(12.0));
        assert!(!range.contains(-5.0));
    }

    #[test]
    fn test_calls() {
        assert_eq!(
            Signature::parse("rgb(<red>, <green>, <blue>)"),
            Ok(Signature::Call {
                name: Name::css("rgb"),
                formals: Some(Box::new(Signature::Series(vec![
                    symbol("red"),
                    literal(","),
                    symbol("green"),
                    literal(","),
                    symbol("blue"),
                ]))),
            })
        );
        assert_eq!(
            Signature::parse("f()"),
            Ok(Signature::Call {
                name: Name::css("f"),
                formals: None,
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Signature::parse("[ a | b"), Err(SignatureError::UnexpectedEnd));
        assert_eq!(
            Signature::parse("a ]"),
            Err(SignatureError::UnexpectedToken("]".to_owned()))
        );
        assert_eq!(
            Signature::parse("| a"),
            Err(SignatureError::UnexpectedToken("|".to_owned()))
        );
        assert_eq!(Signature::parse(""), Err(SignatureError::UnexpectedEnd));
    }

    #[test]
    fn test_keywords() {
        let Ok(signature) = Signature::parse("[ <color> | transparent ]{1,4} | inherit | 100")
        else {
            panic!("signature should parse");
        };
        assert_eq!(signature.keywords(), vec!["transparent", "inherit"]);
        assert_eq!(
            signature.to_string(),
            "[ [ <color> | transparent ]{1,4} | inherit | 100 ]"
        );
    }
}
