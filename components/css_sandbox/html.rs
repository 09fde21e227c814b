/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The HTML elements and attributes that selectors may refer to.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::name::Name;

static ELEMENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\*|[a-zA-Z][a-zA-Z0-9]*)$").expect("valid regex"));
static ATTRIBUTE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9\-]*$").expect("valid regex"));

const DEFAULT_WHITELIST: &str = include_str!("resources/html4.json");

/// The element name under which attributes valid on any element are kept.
const ANY_ELEMENT: &str = "*";

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType {
    #[default]
    None,
    Classes,
    Id,
    IdRef,
    IdRefs,
    Script,
    Style,
    Uri,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElementInfo {
    pub name: Name,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeInfo {
    /// `*` for attributes valid on any element.
    pub element: Name,
    pub name: Name,
    pub attribute_type: AttributeType,
}

pub trait HtmlSchema {
    fn lookup_element(&self, name: &Name) -> Option<&ElementInfo>;

    fn is_element_allowed(&self, name: &Name) -> bool;

    /// Looks for an attribute specific to `element` first, then for one
    /// valid on any element.
    fn lookup_attribute(&self, element: &Name, name: &Name) -> Option<&AttributeInfo>;

    fn is_attribute_allowed(&self, element: &Name, name: &Name) -> bool;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HtmlWhiteList {
    #[serde(default)]
    description: Option<String>,
    elements: Vec<ElementDefinition>,
    attributes: Vec<AttributeDefinition>,
    allowed: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ElementDefinition {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AttributeDefinition {
    /// `element::attribute`.
    key: String,
    #[serde(default, rename = "type")]
    attribute_type: AttributeType,
}

/// An [`HtmlSchema`] loaded from a JSON whitelist.
#[derive(Debug)]
pub struct JsonHtmlSchema {
    elements: HashMap<Name, ElementInfo>,
    attributes: HashMap<(Name, Name), AttributeInfo>,
    allowed_elements: HashSet<Name>,
    allowed_attributes: HashSet<(Name, Name)>,
}

impl JsonHtmlSchema {
    /// The HTML 4 whitelist that ships with this crate.
    pub fn default_schema() -> Result<JsonHtmlSchema, ConfigError> {
        JsonHtmlSchema::from_json(DEFAULT_WHITELIST)
    }

    pub fn from_path(path: &Path) -> Result<JsonHtmlSchema, ConfigError> {
        JsonHtmlSchema::from_json(&fs::read_to_string(path)?)
    }

    pub fn from_json(json: &str) -> Result<JsonHtmlSchema, ConfigError> {
        let whitelist: HtmlWhiteList = serde_json::from_str(json)?;
        log::debug!(
            "Loading HTML schema {:?} with {} elements",
            whitelist.description.as_deref().unwrap_or(""),
            whitelist.elements.len()
        );

        let mut elements = HashMap::new();
        for definition in whitelist.elements {
            if !ELEMENT_NAME.is_match(&definition.key) {
                return Err(ConfigError::BadElementName(definition.key));
            }
            let name = Name::css(&definition.key);
            elements.insert(name.clone(), ElementInfo { name });
        }

        let mut attributes = HashMap::new();
        for definition in whitelist.attributes {
            let key = attribute_key(&definition.key)?;
            attributes.insert(
                key.clone(),
                AttributeInfo {
                    element: key.0,
                    name: key.1,
                    attribute_type: definition.attribute_type,
                },
            );
        }

        let mut allowed_elements = HashSet::new();
        let mut allowed_attributes = HashSet::new();
        for key in &whitelist.allowed {
            if key.contains("::") {
                allowed_attributes.insert(attribute_key(key)?);
            } else {
                allowed_elements.insert(Name::css(key));
            }
        }

        Ok(JsonHtmlSchema {
            elements,
            attributes,
            allowed_elements,
            allowed_attributes,
        })
    }

    fn attribute_key(&self, element: &Name, name: &Name) -> Option<(Name, Name)> {
        [element.clone(), Name::css(ANY_ELEMENT)]
            .into_iter()
            .map(|element| (element, name.clone()))
            .find(|key| self.attributes.contains_key(key))
    }
}

fn attribute_key(key: &str) -> Result<(Name, Name), ConfigError> {
    match key.split_once("::") {
        Some((element, attribute))
            if ELEMENT_NAME.is_match(element) && ATTRIBUTE_NAME.is_match(attribute) =>
        {
            Ok((Name::css(element), Name::css(attribute)))
        },
        _ => Err(ConfigError::BadElementName(key.to_owned())),
    }
}

impl HtmlSchema for JsonHtmlSchema {
    fn lookup_element(&self, name: &Name) -> Option<&ElementInfo> {
        self.elements.get(name)
    }

    fn is_element_allowed(&self, name: &Name) -> bool {
        self.allowed_elements.contains(name)
    }

    fn lookup_attribute(&self, element: &Name, name: &Name) -> Option<&AttributeInfo> {
        self.attribute_key(element, name)
            .and_then(|key| self.attributes.get(&key))
    }

    fn is_attribute_allowed(&self, element: &Name, name: &Name) -> bool {
        self.attribute_key(element, name)
            .is_some_and(|key| self.allowed_attributes.contains(&key))
    }
}
