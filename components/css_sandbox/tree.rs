/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The CSS tree the validator annotates and the rewriter transforms.
//!
//! Nodes own their children. The only annotations are the explicit
//! `invalid` flags and the [`PropertyPart`] attached to value terms.

use std::fmt::{self, Write};

use cssparser::{SourceLocation, ToCss, serialize_identifier, serialize_name, serialize_string};
use smallvec::SmallVec;
use url::Url;

use crate::name::Name;

/// Indices of terms leading from a declaration's expression down through
/// function arguments to a single term.
pub(crate) type TermPath = SmallVec<[usize; 4]>;

/// The kind of value a term was matched as.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PartType {
    Ident,
    Length,
    Number,
    Integer,
    Percentage,
    FamilyName,
    /// One word of an unquoted multi-word name such as a font family.
    LooseWord,
    Color,
    Angle,
    Time,
    Frequency,
    SpecificVoice,
    Uri,
    String,
}

/// Which part of which signature a term matched, e.g. `font::font-size`
/// and [`PartType::Length`].
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyPart {
    pub name: Name,
    pub part_type: PartType,
}

#[derive(Clone, Debug)]
pub struct StyleSheet {
    /// Relative URLs in the sheet are resolved against this.
    pub base_url: Url,
    pub rules: Vec<RuleSet>,
}

#[derive(Clone, Debug)]
pub struct RuleSet {
    pub location: SourceLocation,
    pub selectors: Vec<Selector>,
    pub declarations: Vec<Declaration>,
}

#[derive(Clone, Debug)]
pub struct Selector {
    pub location: SourceLocation,
    /// Simple selectors separated by combinators.
    pub parts: Vec<SelectorPart>,
    pub invalid: bool,
}

#[derive(Clone, Debug)]
pub enum SelectorPart {
    Simple(SimpleSelector),
    Combination(Combinator),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Combinator {
    /// ` `
    Descendant,
    /// `>`
    Child,
    /// `+`
    Sibling,
}

#[derive(Clone, Debug)]
pub struct SimpleSelector {
    pub location: SourceLocation,
    pub element: Option<ElementName>,
    pub components: Vec<SelectorComponent>,
    pub invalid: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementName {
    /// `*`
    Wildcard,
    Ident(Name),
}

#[derive(Clone, Debug)]
pub enum SelectorComponent {
    /// `#name`
    Id(String),
    /// `.name`
    Class(String),
    Attrib(Attrib),
    Pseudo(Pseudo),
}

#[derive(Clone, Debug)]
pub struct Attrib {
    pub location: SourceLocation,
    pub ident: Name,
    pub matcher: Option<(AttribOperator, String)>,
    pub invalid: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttribOperator {
    /// `=`
    Equal,
    /// `~=`
    Includes,
    /// `|=`
    DashMatch,
}

#[derive(Clone, Debug)]
pub struct Pseudo {
    pub location: SourceLocation,
    pub kind: PseudoKind,
}

#[derive(Clone, Debug)]
pub enum PseudoKind {
    Ident(Name),
    Function(FunctionCall),
}

#[derive(Clone, Debug)]
pub struct Declaration {
    pub location: SourceLocation,
    pub property: Property,
    pub expr: Expr,
    pub important: bool,
    pub invalid: bool,
}

#[derive(Clone, Debug)]
pub struct Property {
    pub location: SourceLocation,
    pub name: Name,
    pub invalid: bool,
}

/// Terms joined by operators: `terms[i]` and `terms[i + 1]` are separated by
/// `operations[i]`.
///
/// Positions in the expression are counted the way the resolver walks it,
/// with terms at even and operations at odd indices.
#[derive(Clone, Debug)]
pub struct Expr {
    pub location: SourceLocation,
    pub terms: Vec<Term>,
    pub operations: Vec<Operation>,
}

#[derive(Clone, Copy, Debug)]
pub enum ExprNode<'a> {
    Term(&'a Term),
    Operation(&'a Operation),
}

#[derive(Clone, Debug)]
pub struct Operation {
    pub location: SourceLocation,
    pub operator: Operator,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operator {
    /// Whitespace.
    None,
    /// `/`
    Div,
    /// `,`
    Comma,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::None => "",
            Operator::Div => "/",
            Operator::Comma => ",",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOperator {
    /// `-`
    Negation,
    /// `+`
    Identity,
}

#[derive(Clone, Debug)]
pub struct Term {
    pub location: SourceLocation,
    pub operator: Option<UnaryOperator>,
    pub atom: Atom,
    pub part: Option<PropertyPart>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Atom {
    Ident(String),
    /// A number with an optional unit, kept as written: `12pt`, `.5`, `50%`.
    Quantity(String),
    String(String),
    /// Without the leading `#`.
    Hash(String),
    Uri(String),
    /// A `$(...)` placeholder filled in at runtime, with any unit suffix.
    Substitution(String),
    Function(FunctionCall),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionCall {
    pub name: Name,
    pub args: Expr,
}

impl StyleSheet {
    pub fn new(base_url: Url) -> StyleSheet {
        StyleSheet {
            base_url,
            rules: Vec::new(),
        }
    }
}

impl Selector {
    pub fn simple_selectors(&self) -> impl Iterator<Item = &SimpleSelector> {
        self.parts.iter().filter_map(|part| match part {
            SelectorPart::Simple(simple) => Some(simple),
            SelectorPart::Combination(_) => None,
        })
    }

    pub fn simple_selectors_mut(&mut self) -> impl Iterator<Item = &mut SimpleSelector> {
        self.parts.iter_mut().filter_map(|part| match part {
            SelectorPart::Simple(simple) => Some(simple),
            SelectorPart::Combination(_) => None,
        })
    }

    /// Whether any of the simple selectors uses `:link` or `:visited`.
    pub fn is_history_sensitive(&self) -> bool {
        self.simple_selectors()
            .any(SimpleSelector::is_history_sensitive)
    }
}

impl SimpleSelector {
    pub fn pseudos(&self) -> impl Iterator<Item = &Pseudo> {
        self.components.iter().filter_map(|component| match component {
            SelectorComponent::Pseudo(pseudo) => Some(pseudo),
            _ => None,
        })
    }

    pub fn is_history_sensitive(&self) -> bool {
        self.pseudos().any(Pseudo::is_link_pseudo)
    }

    pub fn element_name(&self) -> Option<&Name> {
        match self.element {
            Some(ElementName::Ident(ref name)) => Some(name),
            _ => None,
        }
    }
}

impl Pseudo {
    pub fn is_link_pseudo(&self) -> bool {
        matches!(self.kind, PseudoKind::Ident(ref name) if *name == "link" || *name == "visited")
    }
}

impl Expr {
    pub fn new(location: SourceLocation) -> Expr {
        Expr {
            location,
            terms: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// The number of terms and operations.
    pub fn len(&self) -> usize {
        self.terms.len() + self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<ExprNode<'_>> {
        if index % 2 == 0 {
            self.terms.get(index / 2).map(ExprNode::Term)
        } else {
            self.operations.get(index / 2).map(ExprNode::Operation)
        }
    }

    pub fn push(&mut self, operation: Option<Operation>, term: Term) {
        if !self.terms.is_empty() {
            self.operations.push(operation.unwrap_or(Operation {
                location: term.location,
                operator: Operator::None,
            }));
        }
        self.terms.push(term);
    }

    pub(crate) fn term_at_path_mut(&mut self, path: &[usize]) -> Option<&mut Term> {
        let (&first, rest) = path.split_first()?;
        let term = self.terms.get_mut(first)?;
        if rest.is_empty() {
            return Some(term);
        }
        match term.atom {
            Atom::Function(ref mut call) => call.args.term_at_path_mut(rest),
            _ => None,
        }
    }

    /// Visits every term, including the arguments of function calls.
    pub fn for_each_term_mut(&mut self, f: &mut dyn FnMut(&mut Term)) {
        for term in &mut self.terms {
            f(term);
            if let Atom::Function(ref mut call) = term.atom {
                call.args.for_each_term_mut(f);
            }
        }
    }

    pub fn for_each_term(&self, f: &mut dyn FnMut(&Term)) {
        for term in &self.terms {
            f(term);
            if let Atom::Function(ref call) = term.atom {
                call.args.for_each_term(f);
            }
        }
    }
}

impl Term {
    pub fn new(location: SourceLocation, atom: Atom) -> Term {
        Term {
            location,
            operator: None,
            atom,
            part: None,
        }
    }

    pub fn part_type(&self) -> Option<PartType> {
        self.part.as_ref().map(|part| part.part_type)
    }

    pub fn part_name(&self) -> Option<&Name> {
        self.part.as_ref().map(|part| &part.name)
    }
}

// Expressions compare by content only.
impl PartialEq for Expr {
    fn eq(&self, other: &Expr) -> bool {
        self.terms == other.terms &&
            self.operations
                .iter()
                .map(|operation| operation.operator)
                .eq(other.operations.iter().map(|operation| operation.operator))
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Term) -> bool {
        self.operator == other.operator && self.atom == other.atom
    }
}

impl ToCss for StyleSheet {
    fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
        for (i, rule) in self.rules.iter().enumerate() {
            if i != 0 {
                dest.write_char('\n')?;
            }
            rule.to_css(dest)?;
        }
        Ok(())
    }
}

impl ToCss for RuleSet {
    fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
        for (i, selector) in self.selectors.iter().enumerate() {
            if i != 0 {
                dest.write_str(", ")?;
            }
            selector.to_css(dest)?;
        }
        dest.write_str(" {")?;
        for (i, declaration) in self.declarations.iter().enumerate() {
            dest.write_str(if i == 0 { " " } else { "; " })?;
            declaration.to_css(dest)?;
        }
        dest.write_str(" }")
    }
}

impl ToCss for Selector {
    fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
        for part in &self.parts {
            match part {
                SelectorPart::Simple(simple) => simple.to_css(dest)?,
                SelectorPart::Combination(Combinator::Descendant) => dest.write_char(' ')?,
                SelectorPart::Combination(Combinator::Child) => dest.write_str(" > ")?,
                SelectorPart::Combination(Combinator::Sibling) => dest.write_str(" + ")?,
            }
        }
        Ok(())
    }
}

impl ToCss for SimpleSelector {
    fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
        match self.element {
            Some(ElementName::Wildcard) => dest.write_char('*')?,
            Some(ElementName::Ident(ref name)) => {
                serialize_identifier(name.canonical_form(), dest)?
            },
            None if self.components.is_empty() => dest.write_char('*')?,
            None => {},
        }
        for component in &self.components {
            match component {
                SelectorComponent::Id(id) => {
                    dest.write_char('#')?;
                    serialize_name(id, dest)?;
                },
                SelectorComponent::Class(class) => {
                    dest.write_char('.')?;
                    serialize_identifier(class, dest)?;
                },
                SelectorComponent::Attrib(attrib) => attrib.to_css(dest)?,
                SelectorComponent::Pseudo(pseudo) => pseudo.to_css(dest)?,
            }
        }
        Ok(())
    }
}

impl ToCss for Attrib {
    fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
        dest.write_char('[')?;
        serialize_identifier(self.ident.canonical_form(), dest)?;
        if let Some((operator, ref value)) = self.matcher {
            dest.write_str(match operator {
                AttribOperator::Equal => "=",
                AttribOperator::Includes => "~=",
                AttribOperator::DashMatch => "|=",
            })?;
            serialize_string(value, dest)?;
        }
        dest.write_char(']')
    }
}

impl ToCss for Pseudo {
    fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
        dest.write_char(':')?;
        match self.kind {
            PseudoKind::Ident(ref name) => serialize_identifier(name.canonical_form(), dest),
            PseudoKind::Function(ref call) => call.to_css(dest),
        }
    }
}

impl ToCss for Declaration {
    fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
        serialize_identifier(self.property.name.canonical_form(), dest)?;
        dest.write_str(": ")?;
        self.expr.to_css(dest)?;
        if self.important {
            dest.write_str(" !important")?;
        }
        Ok(())
    }
}

impl ToCss for Expr {
    fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i != 0 {
                dest.write_str(match self.operations[i - 1].operator {
                    Operator::None => " ",
                    Operator::Div => "/",
                    Operator::Comma => ", ",
                })?;
            }
            term.to_css(dest)?;
        }
        Ok(())
    }
}

impl ToCss for Term {
    fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
        match self.operator {
            Some(UnaryOperator::Negation) => dest.write_char('-')?,
            Some(UnaryOperator::Identity) => dest.write_char('+')?,
            None => {},
        }
        self.atom.to_css(dest)
    }
}

impl ToCss for Atom {
    fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
        match self {
            Atom::Ident(ident) => serialize_identifier(ident, dest),
            Atom::Quantity(text) | Atom::Substitution(text) => dest.write_str(text),
            Atom::String(value) => serialize_string(value, dest),
            Atom::Hash(value) => {
                dest.write_char('#')?;
                serialize_name(value, dest)
            },
            Atom::Uri(value) => {
                dest.write_str("url(")?;
                serialize_string(value, dest)?;
                dest.write_char(')')
            },
            Atom::Function(call) => call.to_css(dest),
        }
    }
}

impl ToCss for FunctionCall {
    fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
        serialize_identifier(self.name.canonical_form(), dest)?;
        dest.write_char('(')?;
        self.args.to_css(dest)?;
        dest.write_char(')')
    }
}
