/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use css_sandbox::tree::{Declaration, SelectorComponent, SelectorPart};
use css_sandbox::{
    CssSchema, CssValidator, MessageKind, MessageLevel, MessageQueue, Name, PartType,
    SimpleMessageQueue, StyleSheet,
};

use crate::{HTML_SCHEMA, SCHEMA, parse};

fn validate(css: &str) -> (StyleSheet, bool, SimpleMessageQueue) {
    validate_against(&SCHEMA, css)
}

fn validate_against(schema: &CssSchema, css: &str) -> (StyleSheet, bool, SimpleMessageQueue) {
    let mut mq = SimpleMessageQueue::new();
    let mut sheet = parse(css, &mut mq);
    assert!(mq.messages().is_empty(), "{:?}", mq.messages());
    let valid = CssValidator::new(schema, &*HTML_SCHEMA).validate_css(&mut sheet, &mut mq);
    (sheet, valid, mq)
}

fn declaration(sheet: &StyleSheet) -> &Declaration {
    &sheet.rules[0].declarations[0]
}

fn part_types(declaration: &Declaration) -> Vec<Option<PartType>> {
    let mut types = vec![];
    declaration
        .expr
        .for_each_term(&mut |term| types.push(term.part_type()));
    types
}

fn texts(mq: &SimpleMessageQueue) -> Vec<String> {
    mq.messages().iter().map(|message| message.text()).collect()
}

#[test]
fn test_keyword_values() {
    let (sheet, valid, mq) = validate("p { clear: both }");
    assert!(valid);
    assert!(mq.messages().is_empty());
    let term = &declaration(&sheet).expr.terms[0];
    assert_eq!(term.part_type(), Some(PartType::Ident));
    assert_eq!(term.part_name(), Some(&Name::css("clear")));
}

#[test]
fn test_mismatched_value_is_reported_and_marked() {
    let (sheet, valid, mq) = validate("p { clear: top }");
    assert!(!valid);
    assert!(declaration(&sheet).invalid);
    assert_eq!(texts(&mq), ["css property clear has bad value: ==>top<=="]);
    assert_eq!(mq.messages()[0].level, MessageLevel::Error);

    let (_, valid, mq) = validate("p { margin: 1px 2px 3px 4px 5px }");
    assert!(!valid);
    assert_eq!(
        texts(&mq),
        ["css property margin has bad value: 1px 2px 3px 4px ==>5px<=="]
    );
}

#[test]
fn test_invalid_node_message_level() {
    let mut mq = SimpleMessageQueue::new();
    let mut sheet = parse("p { clear: top }", &mut mq);
    let valid = CssValidator::new(&SCHEMA, &*HTML_SCHEMA)
        .with_invalid_node_message_level(MessageLevel::Warning)
        .validate_css(&mut sheet, &mut mq);
    assert!(!valid);
    assert!(!mq.has_errors());
    assert_eq!(mq.messages()[0].level, MessageLevel::Warning);
}

#[test]
fn test_unknown_property_is_tolerated() {
    let (sheet, valid, mq) = validate("p { bogus: 1; color: red }");
    assert!(valid);
    assert!(declaration(&sheet).property.invalid);
    assert!(!sheet.rules[0].declarations[1].property.invalid);
    assert_eq!(texts(&mq), ["unknown css property bogus"]);
    assert_eq!(mq.messages()[0].level, MessageLevel::Warning);
}

#[test]
fn test_out_of_range_values_are_warnings() {
    let (sheet, valid, mq) = validate("p { width: -5px }");
    assert!(valid);
    assert!(!declaration(&sheet).invalid);
    assert_eq!(
        texts(&mq),
        ["css property width has value -5 outside the range [0, inf]"]
    );
    assert!(!mq.has_errors());
}

#[test]
fn test_font_shorthand_is_tagged() {
    let (sheet, valid, mq) = validate("p { font: 12pt/14pt \"Times New Roman\", serif }");
    assert!(valid, "{:?}", texts(&mq));
    assert_eq!(
        part_types(declaration(&sheet)),
        [
            Some(PartType::Length),
            Some(PartType::Length),
            Some(PartType::FamilyName),
            Some(PartType::Ident),
        ]
    );
}

#[test]
fn test_unquoted_family_names_are_loose_words() {
    let (sheet, valid, _) = validate("p { font-family: Times New Roman, serif }");
    assert!(valid);
    assert_eq!(
        part_types(declaration(&sheet)),
        [
            Some(PartType::LooseWord),
            Some(PartType::LooseWord),
            Some(PartType::LooseWord),
            Some(PartType::Ident),
        ]
    );

    let (sheet, valid, _) = validate("p { font-family: Arial }");
    assert!(valid);
    assert_eq!(part_types(declaration(&sheet)), [Some(PartType::FamilyName)]);
}

#[test]
fn test_terms_in_function_arguments_are_tagged() {
    let (sheet, valid, _) = validate("p { color: rgb(255, 0, 10%) }");
    assert!(valid);
    assert_eq!(
        part_types(declaration(&sheet)),
        [
            None,
            Some(PartType::Integer),
            Some(PartType::Integer),
            Some(PartType::Percentage),
        ]
    );

    let (_, valid, _) = validate("p { color: expression(alert(1)) }");
    assert!(!valid);
}

#[test]
fn test_exclusive_sets_use_each_member_once() {
    let schema = CssSchema::from_json(
        r#"{
            "types": [ { "key": "pair", "signature": "[ a || b ]" } ],
            "allowed": ["pair"]
        }"#,
        r#"{ "allowed": [] }"#,
    )
    .unwrap();
    for value in ["a", "b", "a b", "b a"] {
        let (_, valid, mq) = validate_against(&schema, &format!("p {{ pair: {value} }}"));
        assert!(valid, "{value}: {:?}", texts(&mq));
    }
    for value in ["a a", "b b", "a b a"] {
        let (_, valid, _) = validate_against(&schema, &format!("p {{ pair: {value} }}"));
        assert!(!valid, "{value}");
    }
}

#[test]
fn test_unknown_and_unsafe_tags() {
    let (sheet, valid, mq) = validate("a, bogus, script { color: red }");
    assert!(!valid);
    assert_eq!(texts(&mq), ["unknown tag bogus", "tag script is not allowed"]);
    let invalid = sheet.rules[0]
        .selectors
        .iter()
        .map(|selector| match selector.parts[0] {
            SelectorPart::Simple(ref simple) => simple.invalid,
            SelectorPart::Combination(_) => unreachable!(),
        })
        .collect::<Vec<_>>();
    assert_eq!(invalid, [false, true, true]);
}

#[test]
fn test_attributes() {
    let (sheet, valid, mq) = validate("div[zwop] { color: red }");
    assert!(!valid);
    assert_eq!(texts(&mq), ["unknown attribute zwop on div"]);
    let SelectorPart::Simple(ref simple) = sheet.rules[0].selectors[0].parts[0] else {
        unreachable!()
    };
    assert!(matches!(
        simple.components[0],
        SelectorComponent::Attrib(ref attrib) if attrib.invalid
    ));

    let (_, valid, mq) = validate("p[onclick] { color: red }");
    assert!(!valid);
    assert!(mq.has_kind(MessageKind::UnsafeAttribute));

    let (_, valid, mq) = validate("*[title], [class~=\"x\"], input[type=text] { color: red }");
    assert!(valid, "{:?}", texts(&mq));
}

#[test]
fn test_every_problem_is_reported() {
    let (_, valid, mq) = validate("bogus { clear: top; width: 10px; color: nope }");
    assert!(!valid);
    assert_eq!(mq.messages().len(), 3);
}
