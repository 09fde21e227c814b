/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Diagnostics produced while validating and rewriting CSS.

use std::fmt;

use cssparser::SourceLocation;
use log::Level;

use crate::name::Name;

/// How serious a message is. Sanitization succeeded when nothing at
/// [`MessageLevel::Error`] or above was reported.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageLevel {
    Lint,
    Warning,
    Error,
    Fatal,
}

impl MessageLevel {
    fn log_level(self) -> Level {
        match self {
            MessageLevel::Lint => Level::Debug,
            MessageLevel::Warning => Level::Info,
            MessageLevel::Error | MessageLevel::Fatal => Level::Warn,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// A selector part or property name outside the safe identifier syntax,
    /// or a class/id in the reserved namespace.
    UnsafeCssIdentifier,
    UnknownCssProperty,
    MalformedCssPropertyValue,
    CssValueOutOfRange,
    UnknownTag,
    UnsafeTag,
    UnknownAttribute,
    UnsafeAttribute,
    DisallowedUri,
    MalformedUri,
    UnsafeCssPseudoSelector,
    DisallowedCssPropertyInSelector,
    CssLinkPseudoSelectorNotAllowedOnNonanchor,
    AssumingPixelsForLength,
    NonStandardColor,
    QuotedCssValue,
    CssSyntaxError,
    UnsupportedCssAtRule,
}

impl MessageKind {
    /// Text with one `{}` per message part.
    fn template(self) -> &'static str {
        match self {
            MessageKind::UnsafeCssIdentifier => "css identifier {} is not allowed",
            MessageKind::UnknownCssProperty => "unknown css property {}",
            MessageKind::MalformedCssPropertyValue => "css property {} has bad value: {}",
            MessageKind::CssValueOutOfRange => {
                "css property {} has value {} outside the range [{}, {}]"
            },
            MessageKind::UnknownTag => "unknown tag {}",
            MessageKind::UnsafeTag => "tag {} is not allowed",
            MessageKind::UnknownAttribute => "unknown attribute {} on {}",
            MessageKind::UnsafeAttribute => "attribute {} on {} may not appear in a selector",
            MessageKind::DisallowedUri => "url {} is not allowed",
            MessageKind::MalformedUri => "url {} is malformed",
            MessageKind::UnsafeCssPseudoSelector => "pseudo selector {} is not allowed",
            MessageKind::DisallowedCssPropertyInSelector => {
                "css property {} may not be used with selector {}"
            },
            MessageKind::CssLinkPseudoSelectorNotAllowedOnNonanchor => {
                "link pseudo selector may only be used with <a>, not {}"
            },
            MessageKind::AssumingPixelsForLength => "unitless length {} treated as pixels",
            MessageKind::NonStandardColor => "non standard color {} rewritten to {}",
            MessageKind::QuotedCssValue => "quoted unquoted css value {}",
            MessageKind::CssSyntaxError => "css syntax error: {}",
            MessageKind::UnsupportedCssAtRule => "unsupported at-rule @{}",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MessagePart {
    Name(Name),
    Text(String),
    Number(f64),
}

impl fmt::Display for MessagePart {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessagePart::Name(name) => name.fmt(f),
            MessagePart::Text(text) => f.write_str(text),
            MessagePart::Number(number) => number.fmt(f),
        }
    }
}

impl From<Name> for MessagePart {
    fn from(name: Name) -> MessagePart {
        MessagePart::Name(name)
    }
}

impl From<&Name> for MessagePart {
    fn from(name: &Name) -> MessagePart {
        MessagePart::Name(name.clone())
    }
}

impl From<String> for MessagePart {
    fn from(text: String) -> MessagePart {
        MessagePart::Text(text)
    }
}

impl From<&str> for MessagePart {
    fn from(text: &str) -> MessagePart {
        MessagePart::Text(text.to_owned())
    }
}

impl From<f64> for MessagePart {
    fn from(number: f64) -> MessagePart {
        MessagePart::Number(number)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub level: MessageLevel,
    pub location: SourceLocation,
    pub parts: Vec<MessagePart>,
}

impl Message {
    pub fn new(
        kind: MessageKind,
        level: MessageLevel,
        location: SourceLocation,
        parts: Vec<MessagePart>,
    ) -> Message {
        Message {
            kind,
            level,
            location,
            parts,
        }
    }

    /// The message text without level or location.
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut parts = self.parts.iter();
        let mut pieces = self.kind.template().split("{}");
        if let Some(first) = pieces.next() {
            out.push_str(first);
        }
        for piece in pieces {
            match parts.next() {
                Some(part) => out.push_str(&part.to_string()),
                None => out.push_str("?"),
            }
            out.push_str(piece);
        }
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {}:{}: {}",
            self.level,
            self.location.line + 1,
            self.location.column,
            self.text()
        )
    }
}

/// A sink for diagnostics.
pub trait MessageQueue {
    fn add_message(&mut self, message: Message);

    fn messages(&self) -> &[Message];

    /// The most severe level reported so far, if anything was reported.
    fn max_level(&self) -> Option<MessageLevel> {
        self.messages().iter().map(|message| message.level).max()
    }

    fn has_errors(&self) -> bool {
        self.max_level()
            .is_some_and(|level| level >= MessageLevel::Error)
    }
}

/// A message queue that keeps every message and also reports it through
/// [the `log` crate](https://docs.rs/log).
///
/// This logging is silent by default, and can be enabled with a
/// `RUST_LOG=css_sandbox=debug` environment variable.
#[derive(Debug, Default)]
pub struct SimpleMessageQueue {
    messages: Vec<Message>,
}

impl SimpleMessageQueue {
    pub fn new() -> SimpleMessageQueue {
        SimpleMessageQueue::default()
    }

    /// Messages at `level` or above.
    pub fn at_least(&self, level: MessageLevel) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |message| message.level >= level)
    }

    pub fn has_kind(&self, kind: MessageKind) -> bool {
        self.messages.iter().any(|message| message.kind == kind)
    }
}

impl MessageQueue for SimpleMessageQueue {
    fn add_message(&mut self, message: Message) {
        log::log!(message.level.log_level(), "{message}");
        self.messages.push(message);
    }

    fn messages(&self) -> &[Message] {
        &self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> SourceLocation {
        SourceLocation { line: 0, column: 1 }
    }

    #[test]
    fn test_message_text() {
        let message = Message::new(
            MessageKind::MalformedCssPropertyValue,
            MessageLevel::Error,
            location(),
            vec![Name::css("clear").into(), "==>top<==".into()],
        );
        assert_eq!(message.text(), "css property clear has bad value: ==>top<==");
        assert_eq!(
            message.to_string(),
            "ERROR: 1:1: css property clear has bad value: ==>top<=="
        );
    }

    #[test]
    fn test_numbers_in_messages() {
        let message = Message::new(
            MessageKind::CssValueOutOfRange,
            MessageLevel::Warning,
            location(),
            vec![
                Name::css("width").into(),
                (-5.0).into(),
                0.0.into(),
                f64::INFINITY.into(),
            ],
        );
        assert_eq!(
            message.text(),
            "css property width has value -5 outside the range [0, inf]"
        );
    }

    #[test]
    fn test_max_level() {
        let mut mq = SimpleMessageQueue::new();
        assert_eq!(mq.max_level(), None);
        mq.add_message(Message::new(
            MessageKind::QuotedCssValue,
            MessageLevel::Lint,
            location(),
            vec!["Times New Roman".into()],
        ));
        assert!(!mq.has_errors());
        mq.add_message(Message::new(
            MessageKind::UnsafeTag,
            MessageLevel::Error,
            location(),
            vec![Name::css("script").into()],
        ));
        assert_eq!(mq.max_level(), Some(MessageLevel::Error));
        assert!(mq.has_errors());
        assert_eq!(mq.at_least(MessageLevel::Warning).count(), 1);
        assert_eq!(MessageLevel::Warning.to_string(), "WARNING");
        assert_eq!(
            MessageKind::CssLinkPseudoSelectorNotAllowedOnNonanchor.to_string(),
            "CSS_LINK_PSEUDO_SELECTOR_NOT_ALLOWED_ON_NONANCHOR"
        );
    }
}
