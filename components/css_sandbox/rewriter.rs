/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Transforms a validated stylesheet into one that is safe to embed.
//!
//! The passes rely on the [`PropertyPart`]s the validator attached to value
//! terms, and run in a fixed order:
//!
//! 1. Rule sets mixing `:link`/`:visited` selectors with others are split.
//! 2. Runs of loose words are quoted.
//! 3. Unitless lengths and non-standard colors are fixed up.
//! 4. Unsafe identifiers, pseudo classes, history sniffing properties and
//!    URLs are removed, along with everything the validator marked invalid.
//! 5. Classes and ids in the reserved namespace are removed.
//! 6. URLs are replaced with what the [`UriPolicy`] returns.
//!
//! [`PropertyPart`]: crate::tree::PropertyPart

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use cssparser::{SourceLocation, ToCss};
use regex::Regex;
use url::Url;

use crate::colors;
use crate::messages::{Message, MessageKind, MessageLevel, MessagePart, MessageQueue};
use crate::name::Name;
use crate::schema::CssSchema;
use crate::tree::{
    Atom, Declaration, ElementName, Expr, Operator, PartType, PropertyPart, PseudoKind, RuleSet,
    Selector, SelectorComponent, SimpleSelector, StyleSheet, Term,
};
use crate::uri_policy::{ExternalReference, LoaderType, UriEffect, UriPolicy, UriPolicyHintKey};

static SAFE_SELECTOR_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[#!\.]?[a-zA-Z][_a-zA-Z0-9\-]*$").expect("valid regex"));
static SAFE_PROPERTY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9\-]*$").expect("valid regex"));

const ALLOWED_PSEUDO_CLASSES: &[&str] = &[
    "active",
    "after",
    "before",
    "first-child",
    "first-letter",
    "focus",
    "hover",
    "link",
    "visited",
];

/// Properties whose value cannot be observed through computed style, and so
/// do not reveal whether a link was visited.
const HISTORY_INSENSITIVE_PROPERTIES: &[&str] = &["background-color", "color", "cursor"];

/// Classes and ids ending with this are reserved for the host page.
const RESERVED_SUFFIX: &str = "__";

/// The symbol listing the color keywords every user agent understands.
const STANDARD_COLOR_SYMBOL: &str = "color-standard";

pub struct CssRewriter<'a> {
    uri_policy: &'a dyn UriPolicy,
    invalid_node_message_level: MessageLevel,
    history_insensitive_properties: HashSet<Name>,
    standard_colors: HashSet<Name>,
}

impl<'a> CssRewriter<'a> {
    pub fn new(schema: &'a CssSchema, uri_policy: &'a dyn UriPolicy) -> CssRewriter<'a> {
        let standard_colors = schema
            .symbol(&Name::css(STANDARD_COLOR_SYMBOL))
            .map(|symbol| {
                symbol
                    .signature
                    .keywords()
                    .into_iter()
                    .map(Name::css)
                    .collect()
            })
            .unwrap_or_default();
        CssRewriter {
            uri_policy,
            invalid_node_message_level: MessageLevel::Error,
            history_insensitive_properties: HISTORY_INSENSITIVE_PROPERTIES
                .iter()
                .copied()
                .map(Name::css)
                .collect(),
            standard_colors,
        }
    }

    /// The level of the messages reported for nodes that are removed.
    pub fn with_invalid_node_message_level(mut self, level: MessageLevel) -> CssRewriter<'a> {
        self.invalid_node_message_level = level;
        self
    }

    /// Properties the host page exposes through computed style. These may
    /// not appear in rules that apply to visited links.
    pub fn with_computed_style_properties<I>(mut self, properties: I) -> CssRewriter<'a>
    where
        I: IntoIterator<Item = Name>,
    {
        for property in properties {
            self.history_insensitive_properties.remove(&property);
        }
        self
    }

    pub fn rewrite(&self, sheet: &mut StyleSheet, mq: &mut dyn MessageQueue) {
        log::debug!("Rewriting {} rule sets", sheet.rules.len());
        self.split_history_sensitive_rule_sets(sheet, mq);
        for rule in &mut sheet.rules {
            for declaration in &mut rule.declarations {
                quote_loose_words(&mut declaration.expr, mq);
                self.fix_terms(&mut declaration.expr, mq);
            }
        }
        self.remove_unsafe_constructs(sheet, mq);
        self.remove_forbidden_identifiers(sheet, mq);
        self.remove_unsafe_constructs(sheet, mq);
        self.translate_urls(sheet, mq);
    }

    fn report(
        &self,
        mq: &mut dyn MessageQueue,
        kind: MessageKind,
        location: SourceLocation,
        parts: Vec<MessagePart>,
    ) {
        mq.add_message(Message::new(
            kind,
            self.invalid_node_message_level,
            location,
            parts,
        ));
    }

    /// Moves history sensitive selectors into a rule set of their own, ahead
    /// of the rule set they came from.
    fn split_history_sensitive_rule_sets(&self, sheet: &mut StyleSheet, mq: &mut dyn MessageQueue) {
        let rules = std::mem::take(&mut sheet.rules);
        for rule in rules {
            let RuleSet {
                location,
                selectors,
                declarations,
            } = rule;
            let (mut links, others): (Vec<Selector>, Vec<Selector>) = selectors
                .into_iter()
                .partition(Selector::is_history_sensitive);
            for selector in &mut links {
                self.anchor_link_selector(selector, mq);
            }

            if !links.is_empty() && !others.is_empty() {
                sheet.rules.push(RuleSet {
                    location,
                    selectors: links,
                    declarations: declarations.clone(),
                });
                sheet.rules.push(RuleSet {
                    location,
                    selectors: others,
                    declarations,
                });
            } else {
                let mut selectors = links;
                selectors.extend(others);
                sheet.rules.push(RuleSet {
                    location,
                    selectors,
                    declarations,
                });
            }
        }
    }

    /// `:link` and `:visited` only match anchors, so `:visited` becomes
    /// `a:visited`. Any other element is an error.
    fn anchor_link_selector(&self, selector: &mut Selector, mq: &mut dyn MessageQueue) {
        let mut invalid = false;
        for simple in selector.simple_selectors_mut() {
            if !simple.is_history_sensitive() {
                continue;
            }
            match simple.element {
                None | Some(ElementName::Wildcard) => {
                    simple.element = Some(ElementName::Ident(Name::css("a")));
                },
                Some(ElementName::Ident(ref name)) if *name == "a" => {},
                Some(ElementName::Ident(ref name)) => {
                    let name = name.clone();
                    self.report(
                        mq,
                        MessageKind::CssLinkPseudoSelectorNotAllowedOnNonanchor,
                        simple.location,
                        vec![name.into()],
                    );
                    invalid = true;
                },
            }
        }
        selector.invalid |= invalid;
    }

    /// Appends `px` to unitless lengths, and replaces color keywords that
    /// are not in the standard set with their hex value.
    fn fix_terms(&self, expr: &mut Expr, mq: &mut dyn MessageQueue) {
        expr.for_each_term_mut(&mut |term| match term.part_type() {
            Some(PartType::Length) => {
                if let Atom::Quantity(ref mut value) = term.atom {
                    if is_unitless(value) && !is_zero(value) {
                        mq.add_message(Message::new(
                            MessageKind::AssumingPixelsForLength,
                            MessageLevel::Warning,
                            term.location,
                            vec![value.as_str().into()],
                        ));
                        value.push_str("px");
                    }
                }
            },
            Some(PartType::Ident) => self.fix_color(term, mq),
            _ => {},
        });
    }

    fn fix_color(&self, term: &mut Term, mq: &mut dyn MessageQueue) {
        let Atom::Ident(ref ident) = term.atom else {
            return;
        };
        let is_color = term.part_name().is_some_and(|name| name.ends_with("::color"));
        if !is_color || self.standard_colors.contains(&Name::css(ident)) {
            return;
        }

        let (hex, level) = match colors::color_hash(ident) {
            Some(hex) => (hex, MessageLevel::Lint),
            None => ("000".to_owned(), MessageLevel::Error),
        };
        mq.add_message(Message::new(
            MessageKind::NonStandardColor,
            level,
            term.location,
            vec![ident.as_str().into(), format!("#{hex}").into()],
        ));
        term.atom = Atom::Hash(hex);
        if let Some(ref mut part) = term.part {
            part.part_type = PartType::Color;
        }
    }

    fn remove_unsafe_constructs(&self, sheet: &mut StyleSheet, mq: &mut dyn MessageQueue) {
        let base_url = &sheet.base_url;
        for rule in &mut sheet.rules {
            for selector in &mut rule.selectors {
                self.check_selector_identifiers(selector, mq);
                self.check_pseudo_classes(selector, mq);
            }
            for declaration in &mut rule.declarations {
                let name = declaration.property.name.canonical_form();
                if !SAFE_PROPERTY_NAME.is_match(name) {
                    self.report(
                        mq,
                        MessageKind::UnsafeCssIdentifier,
                        declaration.property.location,
                        vec![name.into()],
                    );
                    declaration.property.invalid = true;
                }
            }
            if rule.selectors.iter().any(Selector::is_history_sensitive) {
                self.restrict_history_sensitive_declarations(rule, mq);
            }

            for selector in &mut rule.selectors {
                let invalid = selector.simple_selectors().any(|simple| {
                    simple.invalid ||
                        simple.components.iter().any(|component| {
                            matches!(component, SelectorComponent::Attrib(attrib) if attrib.invalid)
                        })
                });
                selector.invalid |= invalid;
            }
            for declaration in &mut rule.declarations {
                declaration.invalid |= declaration.property.invalid;
                if !declaration.invalid {
                    self.check_uris(base_url, declaration, mq);
                }
            }

            rule.selectors.retain(|selector| {
                if selector.invalid {
                    log::debug!("Removing selector {}", selector.to_css_string());
                }
                !selector.invalid && !selector.parts.is_empty()
            });
            rule.declarations.retain(|declaration| {
                if declaration.invalid {
                    log::debug!("Removing declaration {}", declaration.to_css_string());
                }
                !declaration.invalid
            });
        }
        remove_empty_rule_sets(sheet);
    }

    fn check_selector_identifiers(&self, selector: &mut Selector, mq: &mut dyn MessageQueue) {
        let mut invalid = false;
        for simple in selector.simple_selectors() {
            for identifier in selector_identifiers(simple) {
                if !SAFE_SELECTOR_PART.is_match(&identifier) {
                    self.report(
                        mq,
                        MessageKind::UnsafeCssIdentifier,
                        simple.location,
                        vec![identifier.into()],
                    );
                    invalid = true;
                }
            }
        }
        selector.invalid |= invalid;
    }

    fn check_pseudo_classes(&self, selector: &mut Selector, mq: &mut dyn MessageQueue) {
        let mut invalid = false;
        for simple in selector.simple_selectors() {
            for pseudo in simple.pseudos() {
                let allowed = match pseudo.kind {
                    PseudoKind::Ident(ref name) => {
                        ALLOWED_PSEUDO_CLASSES.contains(&name.canonical_form())
                    },
                    PseudoKind::Function(_) => false,
                };
                if !allowed {
                    self.report(
                        mq,
                        MessageKind::UnsafeCssPseudoSelector,
                        pseudo.location,
                        vec![pseudo.to_css_string().into()],
                    );
                    invalid = true;
                }
            }
        }
        selector.invalid |= invalid;
    }

    /// Rules that apply to visited links may only set properties that cannot
    /// be read back, and may not load anything.
    fn restrict_history_sensitive_declarations(
        &self,
        rule: &mut RuleSet,
        mq: &mut dyn MessageQueue,
    ) {
        let selectors = rule
            .selectors
            .iter()
            .map(ToCss::to_css_string)
            .collect::<Vec<_>>()
            .join(", ");
        rule.declarations.retain(|declaration| {
            let name = &declaration.property.name;
            if self.history_insensitive_properties.contains(name) &&
                !might_contain_url(&declaration.expr)
            {
                return true;
            }
            mq.add_message(Message::new(
                MessageKind::DisallowedCssPropertyInSelector,
                MessageLevel::Error,
                declaration.location,
                vec![name.into(), selectors.as_str().into()],
            ));
            false
        });
    }

    /// Marks `declaration` invalid if any of its URLs is malformed or denied
    /// by the policy.
    fn check_uris(&self, base_url: &Url, declaration: &mut Declaration, mq: &mut dyn MessageQueue) {
        let mut invalid = false;
        declaration.expr.for_each_term(&mut |term| {
            if self.resolve_uri(base_url, term, mq).is_some_and(|uri| uri.is_none()) {
                invalid = true;
            }
        });
        declaration.invalid |= invalid;
    }

    /// For a URL term, what the policy rewrites it to, or `Some(None)` if the
    /// URL is malformed or denied. `None` for terms that are not URLs.
    fn resolve_uri(
        &self,
        base_url: &Url,
        term: &Term,
        mq: &mut dyn MessageQueue,
    ) -> Option<Option<String>> {
        let value = match term.atom {
            Atom::Uri(ref value) | Atom::String(ref value)
                if term.part_type() == Some(PartType::Uri) =>
            {
                value
            },
            _ => return None,
        };
        let name = term.part_name().map_or(String::new(), ToString::to_string);

        let uri = match base_url.join(value) {
            Ok(uri) => uri,
            Err(error) => {
                log::debug!("Can't resolve {value:?} against {base_url}: {error}");
                self.report(
                    mq,
                    MessageKind::MalformedUri,
                    term.location,
                    vec![value.as_str().into()],
                );
                return Some(None);
            },
        };
        let reference = ExternalReference {
            uri,
            location: term.location,
        };
        let hints = HashMap::from([(UriPolicyHintKey::CssProp, name)]);
        let rewritten = self.uri_policy.rewrite_uri(
            &reference,
            UriEffect::SameDocument,
            LoaderType::Sandboxed,
            &hints,
        );
        if rewritten.is_none() {
            self.report(
                mq,
                MessageKind::DisallowedUri,
                term.location,
                vec![reference.uri.as_str().into()],
            );
        }
        Some(rewritten)
    }

    fn remove_forbidden_identifiers(&self, sheet: &mut StyleSheet, mq: &mut dyn MessageQueue) {
        for selector in sheet
            .rules
            .iter_mut()
            .flat_map(|rule| rule.selectors.iter_mut())
        {
            let mut invalid = false;
            for simple in selector.simple_selectors() {
                for component in &simple.components {
                    let identifier = match component {
                        SelectorComponent::Id(id) => format!("#{id}"),
                        SelectorComponent::Class(class) => format!(".{class}"),
                        _ => continue,
                    };
                    if identifier.ends_with(RESERVED_SUFFIX) {
                        self.report(
                            mq,
                            MessageKind::UnsafeCssIdentifier,
                            simple.location,
                            vec![identifier.into()],
                        );
                        invalid = true;
                    }
                }
            }
            selector.invalid |= invalid;
        }
    }

    /// Replaces every URL with the policy's rewritten form. Declarations
    /// whose URLs the policy no longer accepts are removed.
    fn translate_urls(&self, sheet: &mut StyleSheet, mq: &mut dyn MessageQueue) {
        let base_url = &sheet.base_url;
        for rule in &mut sheet.rules {
            for declaration in &mut rule.declarations {
                let mut invalid = false;
                declaration.expr.for_each_term_mut(&mut |term| {
                    match self.resolve_uri(base_url, term, mq) {
                        Some(Some(rewritten)) => term.atom = Atom::Uri(rewritten),
                        Some(None) => invalid = true,
                        None => {},
                    }
                });
                declaration.invalid |= invalid;
            }
            rule.declarations.retain(|declaration| !declaration.invalid);
        }
        remove_empty_rule_sets(sheet);
    }
}

/// Joins each run of loose words that belong to the same property part into
/// a single string.
fn quote_loose_words(expr: &mut Expr, mq: &mut dyn MessageQueue) {
    let mut start = 0;
    while start < expr.terms.len() {
        let Some(part) = loose_word_part(&expr.terms[start]).cloned() else {
            if let Atom::Function(ref mut call) = expr.terms[start].atom {
                quote_loose_words(&mut call.args, mq);
            }
            start += 1;
            continue;
        };

        let mut end = start + 1;
        while end < expr.terms.len() &&
            expr.operations[end - 1].operator == Operator::None &&
            loose_word_part(&expr.terms[end]) == Some(&part)
        {
            end += 1;
        }
        let words = expr.terms[start..end]
            .iter()
            .filter_map(|term| match term.atom {
                Atom::Ident(ref word) => Some(word.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ");

        let term = &mut expr.terms[start];
        if end - start > 1 {
            mq.add_message(Message::new(
                MessageKind::QuotedCssValue,
                MessageLevel::Lint,
                term.location,
                vec![words.as_str().into()],
            ));
        }
        term.atom = Atom::String(words);
        term.part = Some(PropertyPart {
            name: part.name,
            part_type: PartType::String,
        });
        expr.terms.drain(start + 1..end);
        expr.operations.drain(start..end - 1);
        start += 1;
    }
}

fn loose_word_part(term: &Term) -> Option<&PropertyPart> {
    term.part
        .as_ref()
        .filter(|part| part.part_type == PartType::LooseWord)
}

/// The element name, ids, classes and attribute names of `simple`, with ids
/// and classes prefixed the way they are written.
fn selector_identifiers(simple: &SimpleSelector) -> Vec<String> {
    let mut identifiers = vec![];
    if let Some(name) = simple.element_name() {
        identifiers.push(name.canonical_form().to_owned());
    }
    for component in &simple.components {
        match component {
            SelectorComponent::Id(id) => identifiers.push(format!("#{id}")),
            SelectorComponent::Class(class) => identifiers.push(format!(".{class}")),
            SelectorComponent::Attrib(attrib) => {
                identifiers.push(attrib.ident.canonical_form().to_owned())
            },
            SelectorComponent::Pseudo(_) => {},
        }
    }
    identifiers
}

/// Anything other than keywords, numbers and hex colors could cause a load.
fn might_contain_url(expr: &Expr) -> bool {
    let mut found = false;
    expr.for_each_term(&mut |term| {
        found |= !matches!(
            term.atom,
            Atom::Ident(_) | Atom::Quantity(_) | Atom::Hash(_)
        );
    });
    found
}

fn remove_empty_rule_sets(sheet: &mut StyleSheet) {
    sheet.rules.retain(|rule| {
        let keep = !rule.selectors.is_empty() && !rule.declarations.is_empty();
        if !keep {
            log::debug!("Removing rule set {}", rule.to_css_string());
        }
        keep
    });
}

fn is_unitless(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn is_zero(value: &str) -> bool {
    value.chars().all(|c| c == '0' || c == '.')
}
