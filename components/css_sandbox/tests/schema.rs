/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::path::{Path, PathBuf};

use css_sandbox::{ConfigError, CssSchema, CssValidator, JsonHtmlSchema, SimpleMessageQueue};

use crate::{HTML_SCHEMA, SCHEMA, parse};

fn resource(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("resources")
        .join(name)
}

#[test]
fn test_load_from_paths() {
    let schema = CssSchema::from_paths(&resource("css21.json"), &resource("css21-fns.json"))
        .unwrap();
    assert_eq!(
        schema.property_names().count(),
        SCHEMA.property_names().count()
    );
    assert!(JsonHtmlSchema::from_path(&resource("html4.json")).is_ok());
}

#[test]
fn test_missing_file() {
    let result = CssSchema::from_paths(&resource("missing.json"), &resource("css21-fns.json"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_config_errors_name_the_culprit() {
    let error = CssSchema::from_json(
        r#"{ "types": [ { "key": "clear", "signature": "none | [ left" } ] }"#,
        r#"{ "allowed": [] }"#,
    )
    .unwrap_err();
    assert!(error.to_string().contains("clear"), "{error}");

    let error = CssSchema::from_json(
        r#"{ "types": [ { "key": "color", "signature": "<colour>" } ] }"#,
        r#"{ "allowed": [] }"#,
    )
    .unwrap_err();
    assert_eq!(
        error.to_string(),
        "signature of color refers to undefined symbol <colour>"
    );
}

/// Every initial value that is written as CSS must be accepted by its own
/// property.
#[test]
fn test_default_values_match_their_signatures() {
    let validator = CssValidator::new(&SCHEMA, &*HTML_SCHEMA);
    let mut failures = vec![];
    for name in SCHEMA.property_names() {
        let Some(default) = SCHEMA.property(name).and_then(|info| info.default_value.as_deref())
        else {
            continue;
        };
        if ["see ", "depends ", "the value "]
            .iter()
            .any(|prose| default.starts_with(prose))
        {
            continue;
        }
        let mut mq = SimpleMessageQueue::new();
        let mut sheet = parse(&format!("p {{ {name}: {default} }}"), &mut mq);
        if !validator.validate_css(&mut sheet, &mut mq) {
            failures.push(format!("{name}: {default}"));
        }
    }
    assert!(failures.is_empty(), "{failures:?}");
}
