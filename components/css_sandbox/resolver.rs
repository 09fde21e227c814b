/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Matching of property value expressions against signatures.
//!
//! The resolver is a backtracking matcher. Every way of matching a prefix of
//! the expression is a [`Candidate`], and applying a signature to a list of
//! candidates yields the candidates that survive it. Candidates share their
//! match and warning history, so forking one is cheap.

use std::rc::Rc;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::messages::{Message, MessageKind, MessageLevel};
use crate::name::Name;
use crate::schema::CssSchema;
use crate::signature::{Signature, SymbolRange};
use crate::tree::{Atom, Expr, ExprNode, Operator, PartType, Term, TermPath, UnaryOperator};

/// The most optional repetitions that fork a "stop here" candidate. Past
/// this, repetition is greedy.
///
/// This is the greatest number of contiguous ambiguous terms expected in
/// practice, as in `font: inherit inherit inherit inherit`.
pub const MAX_BRANCHING_FACTOR: usize = 4;

/// Symbols matched by [`SignatureResolver`] itself rather than through a
/// schema definition.
const BUILTIN_SYMBOLS: &[&str] = &[
    "angle",
    "family-name",
    "frequency",
    "hex-color",
    "identifier",
    "integer",
    "length",
    "number",
    "percentage",
    "specific-voice",
    "string",
    "time",
    "uri",
];

pub(crate) fn is_builtin_symbol(name: &Name) -> bool {
    BUILTIN_SYMBOLS.contains(&name.canonical_form())
}

/// <https://www.w3.org/TR/CSS21/syndata.html#numbers>
///
/// A decimal point must be followed by digits.
const REAL_NUMBER: &str = r"(?:\d+(?:\.\d+)?|\.\d+)";

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("valid regex")
}

/// Lengths may be unitless; the rewriter assumes pixels for those.
static LENGTH: LazyLock<Regex> = LazyLock::new(|| {
    case_insensitive(&format!(r"^{REAL_NUMBER}(?:in|cm|mm|pt|pc|em|ex|px)?$"))
});
static NUMBER: LazyLock<Regex> = LazyLock::new(|| case_insensitive(&format!("^{REAL_NUMBER}$")));
static INTEGER: LazyLock<Regex> = LazyLock::new(|| case_insensitive(r"^\d+$"));
static PERCENTAGE: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(&format!("^{REAL_NUMBER}%$")));
static ANGLE: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(&format!("^(?:{REAL_NUMBER}(?:deg|grad|rad)|0+)$")));
static TIME: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(&format!("^(?:{REAL_NUMBER}(?:ms|s)|0+)$")));
static FREQUENCY: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(&format!("^(?:{REAL_NUMBER}(?:hz|khz)|0+)$")));
/// Font family names and voice names written as strings.
static WORDS: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(r"^\s*(?:[\w\-]+(?:\s+[\w\-]+)*)\s*$"));

// A substitution like `$(x * 4)em` can only be a length, and one without a
// suffix can only be one of the unitless kinds.
static LENGTH_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(r"\)(?:in|cm|mm|pt|pc|em|ex|px)$"));
static PERCENTAGE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| case_insensitive(r"\)%$"));
static NO_SUFFIX: LazyLock<Regex> = LazyLock::new(|| case_insensitive(r"\)$"));
static ANGLE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(r"\)(?:deg|grad|rad)$"));
static TIME_SUFFIX: LazyLock<Regex> = LazyLock::new(|| case_insensitive(r"\)(?:ms|s)$"));
static FREQUENCY_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(r"\)(?:hz|khz)$"));
static URI_SUFFIX: LazyLock<Regex> = LazyLock::new(|| case_insensitive(r"\)(?:uri)?$"));

struct Link<T> {
    head: T,
    tail: Chain<T>,
}

/// A persistent singly linked list, newest element first. Pushing returns a
/// new chain that shares its tail with the old one.
pub(crate) struct Chain<T>(Option<Rc<Link<T>>>);

impl<T> Clone for Chain<T> {
    fn clone(&self) -> Self {
        Chain(self.0.clone())
    }
}

impl<T> Chain<T> {
    pub(crate) fn empty() -> Chain<T> {
        Chain(None)
    }

    pub(crate) fn push(&self, head: T) -> Chain<T> {
        Chain(Some(Rc::new(Link {
            head,
            tail: self.clone(),
        })))
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Newest first.
    pub(crate) fn iter(&self) -> ChainIter<'_, T> {
        ChainIter(self.0.as_deref())
    }

    pub(crate) fn oldest_first(&self) -> Vec<&T> {
        let mut elements: Vec<&T> = self.iter().collect();
        elements.reverse();
        elements
    }
}

pub(crate) struct ChainIter<'a, T>(Option<&'a Link<T>>);

impl<'a, T> Iterator for ChainIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let link = self.0?;
        self.0 = link.tail.0.as_deref();
        Some(&link.head)
    }
}

/// That the term at `path` matched part of the signature of `property`.
#[derive(Clone, Debug)]
pub(crate) struct Match {
    pub path: TermPath,
    pub part_type: PartType,
    pub property: Name,
}

/// One way of matching a prefix of the expression.
#[derive(Clone)]
pub(crate) struct Candidate {
    /// The number of expression nodes consumed.
    pub expr_index: usize,
    pub matches: Chain<Match>,
    pub warnings: Chain<Message>,
}

impl Candidate {
    fn start() -> Candidate {
        Candidate {
            expr_index: 0,
            matches: Chain::empty(),
            warnings: Chain::empty(),
        }
    }

    fn advance(&self) -> Candidate {
        Candidate {
            expr_index: self.expr_index + 1,
            ..self.clone()
        }
    }
}

pub(crate) struct SignatureResolver<'a> {
    schema: &'a CssSchema,
    expr: &'a Expr,
    /// Path of the function call whose arguments `expr` is, if any.
    path: TermPath,
    best: Option<Candidate>,
}

impl<'a> SignatureResolver<'a> {
    pub(crate) fn new(schema: &'a CssSchema, expr: &'a Expr) -> SignatureResolver<'a> {
        SignatureResolver {
            schema,
            expr,
            path: TermPath::new(),
            best: None,
        }
    }

    /// Returns every candidate that matches a prefix of the expression.
    /// Callers want the ones that consumed all of it.
    pub(crate) fn resolve(&mut self, property: &Name, signature: &Signature) -> Vec<Candidate> {
        self.apply(vec![Candidate::start()], property, signature)
    }

    /// The candidate that got furthest, successful or not.
    pub(crate) fn best_attempt(&self) -> Option<&Candidate> {
        self.best.as_ref()
    }

    fn len(&self) -> usize {
        self.expr.len()
    }

    fn apply(
        &mut self,
        candidates: Vec<Candidate>,
        property: &Name,
        signature: &Signature,
    ) -> Vec<Candidate> {
        let mut passed = Vec::new();
        for candidate in candidates {
            if candidate.expr_index >= self.len() {
                // Only an empty repetition can match nothing.
                if matches!(signature, Signature::Repeated { min: 0, .. }) {
                    passed.push(candidate);
                }
                continue;
            }
            let candidate = self.skip_blank(candidate);
            passed.extend(self.apply_one(candidate, property, signature));
        }

        for candidate in &passed {
            if self
                .best
                .as_ref()
                .is_none_or(|best| best.expr_index < candidate.expr_index)
            {
                self.best = Some(candidate.clone());
            }
        }
        passed
    }

    fn skip_blank(&self, candidate: Candidate) -> Candidate {
        match self.expr.node(candidate.expr_index) {
            Some(ExprNode::Operation(operation)) if operation.operator == Operator::None => {
                candidate.advance()
            },
            _ => candidate,
        }
    }

    fn apply_one(
        &mut self,
        candidate: Candidate,
        property: &Name,
        signature: &Signature,
    ) -> Vec<Candidate> {
        match signature {
            Signature::Series(children) => {
                let mut to_apply = vec![candidate];
                for child in children {
                    to_apply = self.apply(to_apply, property, child);
                    if to_apply.is_empty() {
                        log::trace!("{property}: no match for {child}");
                        break;
                    }
                }
                to_apply
            },
            Signature::Set(children) => {
                for child in children {
                    let passed = self.apply(vec![candidate.clone()], property, child);
                    if !passed.is_empty() {
                        return passed;
                    }
                }
                vec![]
            },
            Signature::ExclusiveSet(children) => self
                .apply_exclusive(candidate, 0, property, children)
                .into_iter()
                .map(|(candidate, _)| candidate)
                .collect(),
            Signature::Repeated { child, min, max } => {
                self.apply_repeated(candidate, property, child, *min, *max)
            },
            Signature::Literal(value) => self.apply_literal(candidate, property, value),
            Signature::Symbol { name, range } if is_builtin_symbol(name) => {
                self.apply_builtin(candidate, property, name, *range)
            },
            Signature::Symbol { name, .. } => match self.schema.symbol(name) {
                Some(info) => {
                    let qualified = property.qualify(&info.name);
                    self.apply(vec![candidate], &qualified, &info.signature)
                },
                None => {
                    log::debug!("Reference to unknown symbol <{name}>");
                    vec![]
                },
            },
            Signature::PropertyRef(name) => match self.schema.property(name) {
                Some(info) => self.apply(vec![candidate], &info.name, &info.signature),
                None => {
                    log::debug!("Reference to unknown property {name}");
                    vec![]
                },
            },
            Signature::Call { name, formals } => {
                self.apply_call(candidate, property, name, formals.as_deref())
            },
        }
    }

    /// One use of a `||` group. Returns the surviving candidates together
    /// with the updated set of members used so far.
    fn apply_exclusive(
        &mut self,
        candidate: Candidate,
        used: u64,
        property: &Name,
        children: &[Signature],
    ) -> Vec<(Candidate, u64)> {
        for (i, child) in children.iter().enumerate() {
            let bit = 1u64 << i;
            if used & bit != 0 {
                continue;
            }
            let passed = self.apply(vec![candidate.clone()], property, child);
            if !passed.is_empty() {
                return passed
                    .into_iter()
                    .map(|candidate| (candidate, used | bit))
                    .collect();
            }
        }
        vec![]
    }

    /// Applies `child` once to each candidate. Members of a `||` child that
    /// a candidate already used are not used again.
    fn repeat_once(
        &mut self,
        working: Vec<(Candidate, u64)>,
        property: &Name,
        child: &Signature,
    ) -> Vec<(Candidate, u64)> {
        let Signature::ExclusiveSet(children) = child else {
            let candidates = working.into_iter().map(|(candidate, _)| candidate).collect();
            return self
                .apply(candidates, property, child)
                .into_iter()
                .map(|candidate| (candidate, 0))
                .collect();
        };
        let mut passed = Vec::new();
        for (candidate, used) in working {
            if candidate.expr_index >= self.len() {
                continue;
            }
            let candidate = self.skip_blank(candidate);
            passed.extend(self.apply_exclusive(candidate, used, property, children));
        }
        passed
    }

    fn apply_repeated(
        &mut self,
        candidate: Candidate,
        property: &Name,
        child: &Signature,
        min: u32,
        max: u32,
    ) -> Vec<Candidate> {
        let mut working = vec![(candidate, 0u64)];
        let mut k = 0;
        while k < min {
            working = self.repeat_once(working, property, child);
            if working.is_empty() {
                return vec![];
            }
            k += 1;
        }

        let mut passed = Vec::new();
        while k < max && !working.is_empty() {
            let mut next = Vec::new();
            if (k as usize) < MAX_BRANCHING_FACTOR {
                passed.extend(working.iter().map(|(candidate, _)| candidate.clone()));
                for (candidate, used) in working {
                    let start = candidate.expr_index;
                    next.extend(
                        self.repeat_once(vec![(candidate, used)], property, child)
                            .into_iter()
                            .filter(|(extended, _)| extended.expr_index > start),
                    );
                }
            } else {
                // Greedy: a candidate only stops where it cannot go on.
                for (candidate, used) in working {
                    let start = candidate.expr_index;
                    let extended: Vec<_> = self
                        .repeat_once(vec![(candidate.clone(), used)], property, child)
                        .into_iter()
                        .filter(|(extended, _)| extended.expr_index > start)
                        .collect();
                    if extended.is_empty() {
                        passed.push(candidate);
                    } else {
                        next.extend(extended);
                    }
                }
            }
            working = next;
            k += 1;
        }
        passed.extend(working.into_iter().map(|(candidate, _)| candidate));
        passed
    }

    /// The term at the candidate's position, if it is at a term.
    fn term(&self, candidate: &Candidate) -> Option<&'a Term> {
        match self.expr.node(candidate.expr_index) {
            Some(ExprNode::Term(term)) => Some(term),
            _ => None,
        }
    }

    fn term_path(&self, expr_index: usize) -> TermPath {
        let mut path = self.path.clone();
        path.push(expr_index / 2);
        path
    }

    fn record(&self, candidate: &Candidate, property: &Name, part_type: PartType) -> Candidate {
        Candidate {
            expr_index: candidate.expr_index + 1,
            matches: candidate.matches.push(Match {
                path: self.term_path(candidate.expr_index),
                part_type,
                property: property.clone(),
            }),
            warnings: candidate.warnings.clone(),
        }
    }

    fn apply_literal(&self, candidate: Candidate, property: &Name, value: &str) -> Vec<Candidate> {
        match self.expr.node(candidate.expr_index) {
            Some(ExprNode::Term(term)) => {
                let matched = term.operator.is_none() &&
                    match term.atom {
                        Atom::Ident(ref ident) => ident.eq_ignore_ascii_case(value),
                        Atom::Quantity(ref quantity) => quantity == value,
                        _ => false,
                    };
                if matched {
                    vec![self.record(&candidate, property, PartType::Ident)]
                } else {
                    vec![]
                }
            },
            Some(ExprNode::Operation(operation)) if operation.operator.symbol() == value => {
                vec![candidate.advance()]
            },
            _ => vec![],
        }
    }

    fn apply_builtin(
        &self,
        candidate: Candidate,
        property: &Name,
        symbol: &Name,
        range: Option<SymbolRange>,
    ) -> Vec<Candidate> {
        let Some(term) = self.term(&candidate) else {
            return vec![];
        };
        // A substitution computes its own sign.
        if matches!(term.atom, Atom::Substitution(_)) && term.operator.is_some() {
            return vec![];
        }

        let quantity =
            |pattern: &Regex, suffix: &Regex| quantity_matches(&term.atom, pattern, suffix);
        let unsigned = term.operator.is_none();

        let part_type = match symbol.canonical_form() {
            "length" if quantity(&LENGTH, &LENGTH_SUFFIX) => PartType::Length,
            "number" if quantity(&NUMBER, &NO_SUFFIX) => PartType::Number,
            "integer" if quantity(&INTEGER, &NO_SUFFIX) => PartType::Integer,
            "percentage" if quantity(&PERCENTAGE, &PERCENTAGE_SUFFIX) => PartType::Percentage,
            "angle" if quantity(&ANGLE, &ANGLE_SUFFIX) => PartType::Angle,
            "time" if unsigned && quantity(&TIME, &TIME_SUFFIX) => PartType::Time,
            "frequency" if unsigned && quantity(&FREQUENCY, &FREQUENCY_SUFFIX) => {
                PartType::Frequency
            },
            "hex-color" => match term.atom {
                Atom::Hash(ref hex)
                    if (hex.len() == 3 || hex.len() == 6) &&
                        hex.chars().all(|c| c.is_ascii_hexdigit()) =>
                {
                    PartType::Color
                },
                Atom::Substitution(ref value) if NO_SUFFIX.is_match(value) => PartType::Color,
                _ => return vec![],
            },
            "uri" if unsigned => match term.atom {
                // Strings are treated as URIs, as many user agents do.
                Atom::Uri(_) | Atom::String(_) => PartType::Uri,
                Atom::Substitution(ref value) if URI_SUFFIX.is_match(value) => PartType::Uri,
                _ => return vec![],
            },
            "string" if unsigned && matches!(term.atom, Atom::String(_)) => PartType::String,
            "identifier" if unsigned && matches!(term.atom, Atom::Ident(_)) => PartType::Ident,
            "specific-voice" if unsigned => match term.atom {
                Atom::Ident(ref name) if !self.schema.is_keyword(&Name::css(name)) => {
                    PartType::SpecificVoice
                },
                Atom::String(ref name) if WORDS.is_match(name) => PartType::SpecificVoice,
                _ => return vec![],
            },
            "family-name" if unsigned => return self.apply_family_name(candidate, property),
            _ => return vec![],
        };

        let mut matched = self.record(&candidate, property, part_type);
        if let (Some(range), Atom::Quantity(value)) = (range, &term.atom) {
            let magnitude = leading_number(value);
            let value = match term.operator {
                Some(UnaryOperator::Negation) => -magnitude,
                _ => magnitude,
            };
            if !range.contains(value) {
                // Not a security problem, and rejecting it could make a
                // later alternative match instead.
                matched.warnings = matched.warnings.push(Message::new(
                    MessageKind::CssValueOutOfRange,
                    MessageLevel::Warning,
                    term.location,
                    vec![
                        property.into(),
                        value.into(),
                        range.min.into(),
                        range.max.into(),
                    ],
                ));
            }
        }
        vec![matched]
    }

    /// A quoted family name, or a run of identifiers that spells one. Every
    /// possible run length is offered, longest first.
    fn apply_family_name(&self, candidate: Candidate, property: &Name) -> Vec<Candidate> {
        let Some(term) = self.term(&candidate) else {
            return vec![];
        };
        match term.atom {
            Atom::String(ref name) if WORDS.is_match(name) => {
                return vec![self.record(&candidate, property, PartType::FamilyName)];
            },
            Atom::Ident(ref name) if !self.schema.is_keyword(&Name::css(name)) => {},
            _ => return vec![],
        }

        let is_word = |index: usize| {
            matches!(
                self.expr.node(index),
                Some(ExprNode::Term(Term {
                    operator: None,
                    atom: Atom::Ident(_),
                    ..
                }))
            )
        };
        let is_blank = |index: usize| {
            matches!(
                self.expr.node(index),
                Some(ExprNode::Operation(operation)) if operation.operator == Operator::None
            )
        };
        let mut end = candidate.expr_index;
        while is_blank(end + 1) && is_word(end + 2) {
            end += 2;
        }
        if end == candidate.expr_index {
            return vec![self.record(&candidate, property, PartType::FamilyName)];
        }

        let mut passed = Vec::new();
        let mut last = end;
        while last > candidate.expr_index {
            let mut run = candidate.clone();
            while run.expr_index <= last {
                run = self.record(&run, property, PartType::LooseWord);
                if run.expr_index < last {
                    run = run.advance();
                }
            }
            passed.push(run);
            last -= 2;
        }
        passed.push(self.record(&candidate, property, PartType::FamilyName));
        passed
    }

    fn apply_call(
        &mut self,
        candidate: Candidate,
        property: &Name,
        name: &Name,
        formals: Option<&Signature>,
    ) -> Vec<Candidate> {
        let Some(term) = self.term(&candidate) else {
            return vec![];
        };
        let Atom::Function(ref call) = term.atom else {
            return vec![];
        };
        if term.operator.is_some() || call.name != *name || !self.schema.is_function_allowed(name)
        {
            return vec![];
        }

        let inside = Candidate {
            expr_index: 0,
            ..candidate.clone()
        };
        let results = match formals {
            Some(formals) => {
                let mut nested = SignatureResolver {
                    schema: self.schema,
                    expr: &call.args,
                    path: self.term_path(candidate.expr_index),
                    best: None,
                };
                nested.apply(vec![inside], property, formals)
            },
            None => vec![inside],
        };
        let args = call.args.len();
        results
            .into_iter()
            .filter(|result| result.expr_index == args)
            .map(|result| Candidate {
                expr_index: candidate.expr_index + 1,
                ..result
            })
            .collect()
    }
}

fn quantity_matches(atom: &Atom, pattern: &Regex, suffix: &Regex) -> bool {
    match atom {
        Atom::Quantity(value) => pattern.is_match(value),
        Atom::Substitution(value) => suffix.is_match(value),
        _ => false,
    }
}

/// The number at the start of a quantity such as `12.5pt`.
fn leading_number(quantity: &str) -> f64 {
    let end = quantity
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(quantity.len());
    quantity[..end].parse().unwrap_or(0.0)
}
