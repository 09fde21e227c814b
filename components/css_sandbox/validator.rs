/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Checks a stylesheet against a [`CssSchema`] and an [`HtmlSchema`].
//!
//! Every term of a valid declaration is tagged with the [`PropertyPart`] it
//! matched, which is what the rewriter keys off. Nodes that fail validation
//! are marked invalid rather than removed.

use cssparser::ToCss;

use crate::html::HtmlSchema;
use crate::messages::{Message, MessageKind, MessageLevel, MessageQueue};
use crate::name::Name;
use crate::resolver::{Candidate, SignatureResolver};
use crate::schema::CssSchema;
use crate::tree::{
    Attrib, Declaration, ElementName, Expr, ExprNode, Operator, PropertyPart, RuleSet,
    SelectorComponent, SimpleSelector, StyleSheet,
};

pub struct CssValidator<'a> {
    schema: &'a CssSchema,
    html_schema: &'a dyn HtmlSchema,
    invalid_node_message_level: MessageLevel,
}

impl<'a> CssValidator<'a> {
    pub fn new(schema: &'a CssSchema, html_schema: &'a dyn HtmlSchema) -> CssValidator<'a> {
        CssValidator {
            schema,
            html_schema,
            invalid_node_message_level: MessageLevel::Error,
        }
    }

    /// The level of the messages reported for nodes that will be removed.
    pub fn with_invalid_node_message_level(mut self, level: MessageLevel) -> CssValidator<'a> {
        self.invalid_node_message_level = level;
        self
    }

    /// Returns whether every selector and declaration is valid. Validation
    /// continues past the first failure so that every problem is reported.
    pub fn validate_css(&self, sheet: &mut StyleSheet, mq: &mut dyn MessageQueue) -> bool {
        let mut valid = true;
        for rule in &mut sheet.rules {
            valid &= self.validate_rule_set(rule, mq);
        }
        valid
    }

    fn validate_rule_set(&self, rule: &mut RuleSet, mq: &mut dyn MessageQueue) -> bool {
        let mut valid = true;
        for selector in &mut rule.selectors {
            for simple in selector.simple_selectors_mut() {
                valid &= self.validate_simple_selector(simple, mq);
            }
        }
        for declaration in &mut rule.declarations {
            valid &= self.validate_declaration(declaration, mq);
        }
        valid
    }

    fn report(
        &self,
        mq: &mut dyn MessageQueue,
        kind: MessageKind,
        location: cssparser::SourceLocation,
        parts: Vec<crate::messages::MessagePart>,
    ) {
        mq.add_message(Message::new(
            kind,
            self.invalid_node_message_level,
            location,
            parts,
        ));
    }

    fn validate_simple_selector(
        &self,
        simple: &mut SimpleSelector,
        mq: &mut dyn MessageQueue,
    ) -> bool {
        let mut valid = true;
        if let Some(name) = simple.element_name() {
            let kind = if self.html_schema.lookup_element(name).is_none() {
                Some(MessageKind::UnknownTag)
            } else if !self.html_schema.is_element_allowed(name) {
                Some(MessageKind::UnsafeTag)
            } else {
                None
            };
            if let Some(kind) = kind {
                self.report(mq, kind, simple.location, vec![name.into()]);
                simple.invalid = true;
                valid = false;
            }
        }

        let element = match simple.element {
            Some(ElementName::Ident(ref name)) => name.clone(),
            Some(ElementName::Wildcard) | None => Name::css("*"),
        };
        for component in &mut simple.components {
            if let SelectorComponent::Attrib(attrib) = component {
                valid &= self.validate_attrib(&element, attrib, mq);
            }
        }
        valid
    }

    fn validate_attrib(
        &self,
        element: &Name,
        attrib: &mut Attrib,
        mq: &mut dyn MessageQueue,
    ) -> bool {
        let kind = match self.html_schema.lookup_attribute(element, &attrib.ident) {
            None => MessageKind::UnknownAttribute,
            Some(_) if !self.html_schema.is_attribute_allowed(element, &attrib.ident) => {
                MessageKind::UnsafeAttribute
            },
            Some(_) => return true,
        };
        self.report(
            mq,
            kind,
            attrib.location,
            vec![(&attrib.ident).into(), element.into()],
        );
        attrib.invalid = true;
        false
    }

    /// Unknown properties are reported and marked for removal, but do not
    /// make the stylesheet invalid. Values that do not match their property's
    /// signature do.
    fn validate_declaration(
        &self,
        declaration: &mut Declaration,
        mq: &mut dyn MessageQueue,
    ) -> bool {
        let name = &declaration.property.name;
        let info = match self.schema.property(name) {
            Some(info) if self.schema.is_property_allowed(name) => info,
            _ => {
                mq.add_message(Message::new(
                    MessageKind::UnknownCssProperty,
                    MessageLevel::Warning,
                    declaration.property.location,
                    vec![name.into()],
                ));
                declaration.property.invalid = true;
                return true;
            },
        };

        let mut resolver = SignatureResolver::new(self.schema, &declaration.expr);
        let len = declaration.expr.len();
        let winner: Option<Candidate> = resolver
            .resolve(&info.name, &info.signature)
            .into_iter()
            .find(|candidate| candidate.expr_index == len);

        let Some(winner) = winner else {
            let best = resolver.best_attempt().map_or(0, |best| best.expr_index);
            let rendered = render_with_marker(&declaration.expr, best);
            log::debug!("No match for {name}: {rendered}");
            self.report(
                mq,
                MessageKind::MalformedCssPropertyValue,
                declaration.location,
                vec![name.into(), rendered.into()],
            );
            declaration.invalid = true;
            return false;
        };

        declaration.expr.for_each_term_mut(&mut |term| term.part = None);
        for found in winner.matches.oldest_first() {
            if let Some(term) = declaration.expr.term_at_path_mut(&found.path) {
                term.part = Some(PropertyPart {
                    name: found.property.clone(),
                    part_type: found.part_type,
                });
            }
        }
        for warning in winner.warnings.oldest_first() {
            mq.add_message(warning.clone());
        }
        true
    }
}

/// Renders `expr` with the node at `marker` called out, e.g.
/// `12pt ==>bogus<== serif`.
fn render_with_marker(expr: &Expr, marker: usize) -> String {
    // Whitespace has nothing to point at.
    let marker = match expr.node(marker) {
        Some(ExprNode::Operation(operation)) if operation.operator == Operator::None => marker + 1,
        _ => marker,
    };
    let mut pieces = vec![];
    for index in 0..expr.len() {
        let text = match expr.node(index) {
            Some(ExprNode::Term(term)) => term.to_css_string(),
            Some(ExprNode::Operation(operation)) => operation.operator.symbol().to_owned(),
            None => String::new(),
        };
        if index == marker {
            pieces.push(format!("==>{text}<=="));
        } else if !text.is_empty() {
            pieces.push(text);
        }
    }
    if marker >= expr.len() {
        pieces.push("==><==".to_owned());
    }
    pieces.join(" ")
}
