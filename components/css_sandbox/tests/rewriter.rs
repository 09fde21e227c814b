/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use css_sandbox::{
    CssRewriter, CssValidator, DenyAllUriPolicy, MessageKind, MessageLevel, MessageQueue, Name,
    SimpleMessageQueue, sanitize_stylesheet,
};
use cssparser::ToCss;

use crate::{HTML_SCHEMA, SCHEMA, TestUriPolicy, parse, sanitize, sanitize_with};

fn assert_sanitized(css: &str, expected: &str) -> SimpleMessageQueue {
    let (output, mq) = sanitize(css);
    assert_eq!(output, expected, "{css}");
    mq
}

fn count(mq: &SimpleMessageQueue, kind: MessageKind) -> usize {
    mq.messages()
        .iter()
        .filter(|message| message.kind == kind)
        .count()
}

#[test]
fn test_safe_css_is_unchanged() {
    let mq = assert_sanitized(
        "p, div.note > a:hover { color: red; margin: 0 auto !important }",
        "p, div.note > a:hover { color: red; margin: 0 auto !important }",
    );
    assert!(mq.messages().is_empty(), "{:?}", mq.messages());
    assert_sanitized("p:first-child { line-height: 2 }", "p:first-child { line-height: 2 }");
}

#[test]
fn test_history_sensitive_selectors_are_split_out() {
    assert_sanitized(
        "p, a:visited, div { color: blue }",
        "a:visited { color: blue }\np, div { color: blue }",
    );
    assert_sanitized(":visited { color: blue }", "a:visited { color: blue }");
    assert_sanitized("*:link { color: blue }", "a:link { color: blue }");
    assert_sanitized("p a:link { color: blue }", "p a:link { color: blue }");
}

#[test]
fn test_link_pseudo_classes_need_anchors() {
    let mq = assert_sanitized("div:visited, p { color: blue }", "p { color: blue }");
    assert_eq!(
        count(&mq, MessageKind::CssLinkPseudoSelectorNotAllowedOnNonanchor),
        1
    );
    assert!(mq.has_errors());
}

#[test]
fn test_visited_links_may_only_set_unobservable_properties() {
    let mq = assert_sanitized(
        "a:visited { color: blue; width: 10px; background-color: #fff; \
         cursor: url(x.png), pointer }",
        "a:visited { color: blue; background-color: #fff }",
    );
    assert_eq!(count(&mq, MessageKind::DisallowedCssPropertyInSelector), 2);
    assert!(!mq.has_kind(MessageKind::DisallowedUri));

    assert_sanitized(
        "a:link { cursor: pointer }",
        "a:link { cursor: pointer }",
    );
}

#[test]
fn test_computed_style_properties_are_restricted() {
    let policy = TestUriPolicy::default();
    let mut mq = SimpleMessageQueue::new();
    let mut sheet = parse("a:visited { color: blue; background-color: red }", &mut mq);
    assert!(CssValidator::new(&SCHEMA, &*HTML_SCHEMA).validate_css(&mut sheet, &mut mq));
    CssRewriter::new(&SCHEMA, &policy)
        .with_computed_style_properties([Name::css("color")])
        .rewrite(&mut sheet, &mut mq);
    assert_eq!(sheet.to_css_string(), "a:visited { background-color: red }");
}

#[test]
fn test_invalid_selectors_do_not_affect_their_siblings() {
    let mq = assert_sanitized("DIV#ok, SCRIPT#evil { color: red }", "div#ok { color: red }");
    assert!(mq.has_kind(MessageKind::UnsafeTag));
    assert_sanitized("a, bogus, i { color: red }", "a, i { color: red }");
    assert_sanitized("div[zwop] { color: red }", "");
    assert_sanitized("div[title], p[onclick] { color: red }", "div[title] { color: red }");
}

#[test]
fn test_unsafe_identifiers() {
    let mq = assert_sanitized("._c { color: red }", "");
    assert!(mq.has_kind(MessageKind::UnsafeCssIdentifier));
    assert_sanitized("p._c, p.c { color: red }", "p.c { color: red }");
}

#[test]
fn test_configurable_invalid_node_message_level() {
    let policy = TestUriPolicy::default();
    let mut mq = SimpleMessageQueue::new();
    let mut sheet = parse("._c, p { color: red }", &mut mq);
    assert!(CssValidator::new(&SCHEMA, &*HTML_SCHEMA).validate_css(&mut sheet, &mut mq));
    CssRewriter::new(&SCHEMA, &policy)
        .with_invalid_node_message_level(MessageLevel::Warning)
        .rewrite(&mut sheet, &mut mq);
    assert_eq!(sheet.to_css_string(), "p { color: red }");
    let message = mq
        .messages()
        .iter()
        .find(|message| message.kind == MessageKind::UnsafeCssIdentifier)
        .unwrap();
    assert_eq!(message.level, MessageLevel::Warning);
    assert!(!mq.has_errors(), "{:?}", mq.messages());
}

#[test]
fn test_best_effort_pipeline() {
    let policy = TestUriPolicy::default();
    let mut mq = SimpleMessageQueue::new();
    let mut sheet = parse("._c, p { clear: top; color: red }", &mut mq);
    let valid = sanitize_stylesheet(
        &mut sheet,
        &SCHEMA,
        &*HTML_SCHEMA,
        &policy,
        MessageLevel::Warning,
        &mut mq,
    );
    assert!(!valid);
    assert_eq!(sheet.to_css_string(), "p { color: red }");
    assert!(mq.has_kind(MessageKind::MalformedCssPropertyValue));
    assert!(mq.has_kind(MessageKind::UnsafeCssIdentifier));
    assert_eq!(mq.max_level(), Some(MessageLevel::Warning));
}

#[test]
fn test_reserved_identifiers() {
    let mq = assert_sanitized(".foo__ { color: red }", "");
    assert_eq!(count(&mq, MessageKind::UnsafeCssIdentifier), 1);
    assert_sanitized("#bar__, p, .foo_ { color: red }", "p, .foo_ { color: red }");
}

#[test]
fn test_pseudo_classes() {
    let mq = assert_sanitized("a:badness { color: red }", "");
    assert!(mq.has_kind(MessageKind::UnsafeCssPseudoSelector));
    assert_sanitized("li:nth-child(2n), b { color: red }", "b { color: red }");
    assert_sanitized(
        "a:focus, p:before, p:first-letter { color: red }",
        "a:focus, p:before, p:first-letter { color: red }",
    );
}

#[test]
fn test_invalid_declarations_are_removed() {
    let mq = assert_sanitized("p { clear: top; color: red }", "p { color: red }");
    assert!(mq.has_kind(MessageKind::MalformedCssPropertyValue));
    let mq = assert_sanitized("p { bogus: 1; color: red }", "p { color: red }");
    assert!(!mq.has_errors());
    assert_sanitized("p { }", "");
}

#[test]
fn test_loose_words_are_quoted() {
    let mq = assert_sanitized(
        "p { font: 12pt Times New Roman }",
        "p { font: 12pt \"Times New Roman\" }",
    );
    assert_eq!(count(&mq, MessageKind::QuotedCssValue), 1);
    assert_eq!(mq.max_level(), Some(MessageLevel::Lint));

    assert_sanitized(
        "p { font-family: Trebuchet MS, Arial, sans-serif }",
        "p { font-family: \"Trebuchet MS\", Arial, sans-serif }",
    );
}

#[test]
fn test_unitless_lengths_become_pixels() {
    let mq = assert_sanitized(
        "p { padding: 10 0 5.0 4 }",
        "p { padding: 10px 0 5.0px 4px }",
    );
    assert_eq!(count(&mq, MessageKind::AssumingPixelsForLength), 3);
    assert!(!mq.has_errors());
    assert_sanitized("p { margin: -5 5 }", "p { margin: -5px 5px }");
}

#[test]
fn test_out_of_range_values_are_kept() {
    let mq = assert_sanitized("p { width: -5px }", "p { width: -5px }");
    assert!(mq.has_kind(MessageKind::CssValueOutOfRange));
}

#[test]
fn test_non_standard_colors() {
    let mq = assert_sanitized("p { color: aliceblue }", "p { color: #f0f8ff }");
    assert_eq!(
        mq.messages()[0].text(),
        "non standard color aliceblue rewritten to #f0f8ff"
    );
    assert_eq!(mq.max_level(), Some(MessageLevel::Lint));
    assert_sanitized(
        "p { border-color: PapayaWhip red }",
        "p { border-color: #ffefd5 red }",
    );
    let mq = assert_sanitized("p { background: transparent }", "p { background: transparent }");
    assert!(mq.messages().is_empty());
}

#[test]
fn test_urls_are_rewritten() {
    let policy = TestUriPolicy::default();
    let mut mq = SimpleMessageQueue::new();
    let (output, valid) = sanitize_with("p { background: url(/bar.png) }", &policy, &mut mq);
    assert!(valid);
    assert_eq!(output, "p { background: url(\"/foo/bar.png\") }");
    let hints = policy.hints.borrow();
    assert!(!hints.is_empty());
    assert!(hints.iter().all(|hint| hint == "background-image"));

    assert_sanitized(
        "p { list-style-image: url(http://whitelisted-host.com/a.png) }",
        "p { list-style-image: url(\"http://whitelisted-host.com/a.png\") }",
    );
    assert_sanitized(
        "p { background-image: \"x.png\" }",
        "p { background-image: url(\"/foo/x.png\") }",
    );
}

#[test]
fn test_denied_urls_are_removed() {
    let mq = assert_sanitized(
        "p { background-image: url(http://evil.example/x.png); color: red }",
        "p { color: red }",
    );
    assert!(mq.has_kind(MessageKind::DisallowedUri));

    let mut mq = SimpleMessageQueue::new();
    let (output, _) = sanitize_with(
        "p { background: url(/bar.png) } i { list-style-image: url(/a.png) }",
        &DenyAllUriPolicy,
        &mut mq,
    );
    assert_eq!(output, "");
    assert_eq!(
        mq.messages()
            .iter()
            .filter(|message| message.kind == MessageKind::DisallowedUri)
            .count(),
        2
    );
}

#[test]
fn test_malformed_urls_are_removed() {
    let mq = assert_sanitized("p { background-image: url(\"http://[oops/\") }", "");
    assert!(mq.has_kind(MessageKind::MalformedUri));
}

#[test]
fn test_sanitizing_is_idempotent() {
    let inputs = [
        "p, a:visited, div { color: blue }",
        "p { font: 12pt Times New Roman }",
        "p { padding: 10 0 5.0 4; color: aliceblue }",
        "p { background: url(/bar.png) no-repeat }",
        "DIV#ok, SCRIPT#evil, .foo__ { color: red; clear: top }",
        "a:visited { color: blue; width: 10px }",
    ];
    for input in inputs {
        let (once, _) = sanitize(input);
        let (twice, mq) = sanitize(&once);
        assert_eq!(once, twice, "{input}");
        assert!(!mq.has_errors(), "{input}: {:?}", mq.messages());
    }
}
