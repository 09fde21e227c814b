/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The whitelist of CSS properties, the grammars of their values, and the
//! functions values may call.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::name::Name;
use crate::resolver::is_builtin_symbol;
use crate::signature::Signature;

static CSS_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z\-][\w\-]*$").expect("valid regex"));
static JS_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][\w_]*$").expect("valid regex"));
static HTML_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-]+$").expect("valid regex"));

/// <https://www.w3.org/TR/CSS21/media.html#media-groups>
const MEDIA_GROUPS: &[&str] = &[
    "aural",
    "bitmap",
    "continuous",
    "grid",
    "interactive",
    "paged",
    "static",
    "tactile",
    "visual",
];

const DEFAULT_PROPERTIES: &str = include_str!("resources/css21.json");
const DEFAULT_FUNCTIONS: &str = include_str!("resources/css21-fns.json");

/// A whitelist file: type definitions plus the names that are allowed.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WhiteList {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    types: Vec<TypeDefinition>,
    #[serde(default)]
    allowed: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TypeDefinition {
    key: String,
    #[serde(default, rename = "as")]
    alias: Option<String>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    applies_to: Option<CriterionConfig>,
    #[serde(default)]
    inherited: Option<bool>,
    #[serde(default)]
    media_groups: Option<CriterionConfig>,
    #[serde(default)]
    dom2property: Option<OneOrMany>,
    #[serde(default)]
    description: Option<String>,
}

impl TypeDefinition {
    /// Fills in whatever this definition leaves out from `base`.
    fn merged_with(&self, base: &TypeDefinition) -> TypeDefinition {
        TypeDefinition {
            key: self.key.clone(),
            alias: None,
            signature: self.signature.clone().or_else(|| base.signature.clone()),
            default: self.default.clone().or_else(|| base.default.clone()),
            applies_to: self.applies_to.clone().or_else(|| base.applies_to.clone()),
            inherited: self.inherited.or(base.inherited),
            media_groups: self
                .media_groups
                .clone()
                .or_else(|| base.media_groups.clone()),
            dom2property: self
                .dom2property
                .clone()
                .or_else(|| base.dom2property.clone()),
            description: self
                .description
                .clone()
                .or_else(|| base.description.clone()),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum CriterionConfig {
    /// `"*"` or a single member.
    Single(String),
    List(Vec<String>),
    Include { include: Vec<String> },
    Exclude { exclude: Vec<String> },
}

/// A predicate over element groups or media types.
#[derive(Clone, Debug, PartialEq)]
pub enum Criterion {
    Any,
    AnyOf(HashSet<String>),
    NoneOf(HashSet<String>),
}

impl Criterion {
    fn from_config(config: Option<&CriterionConfig>) -> Criterion {
        let set = |members: &[String]| members.iter().cloned().collect();
        match config {
            None => Criterion::Any,
            Some(CriterionConfig::Single(value)) if value == "*" => Criterion::Any,
            Some(CriterionConfig::Single(value)) => {
                Criterion::AnyOf(HashSet::from([value.clone()]))
            },
            Some(CriterionConfig::List(members)) |
            Some(CriterionConfig::Include { include: members }) => {
                Criterion::AnyOf(set(members))
            },
            Some(CriterionConfig::Exclude { exclude }) => Criterion::NoneOf(set(exclude)),
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Criterion::Any => true,
            Criterion::AnyOf(members) => members.contains(value),
            Criterion::NoneOf(members) => !members.contains(value),
        }
    }
}

/// A CSS property and its value grammar.
#[derive(Clone, Debug)]
pub struct PropertyInfo {
    pub name: Name,
    pub signature: Signature,
    /// `None` when the initial value depends on the user agent or other
    /// properties.
    pub default_value: Option<String>,
    /// The element groups the property applies to, e.g. `block`.
    pub applies_to: Criterion,
    pub inherited: bool,
    pub media_groups: Criterion,
    /// Names of the property in the DOM2 `CSSStyleDeclaration` interface.
    pub dom2properties: Vec<String>,
}

impl PropertyInfo {
    pub fn applies_to_element_group(&self, group: &str) -> bool {
        HTML_IDENTIFIER.is_match(group) && self.applies_to.accepts(group)
    }

    pub fn in_media_group(&self, group: &str) -> bool {
        MEDIA_GROUPS.contains(&group) && self.media_groups.accepts(group)
    }
}

/// A named piece of grammar, referenced from signatures as `<name>`.
#[derive(Clone, Debug)]
pub struct SymbolInfo {
    pub name: Name,
    pub signature: Signature,
}

#[derive(Debug)]
pub struct CssSchema {
    properties: HashMap<Name, PropertyInfo>,
    symbols: HashMap<Name, SymbolInfo>,
    properties_allowed: HashSet<Name>,
    functions_allowed: HashSet<Name>,
    /// Every literal in any signature, plus `initial`.
    keywords: HashSet<Name>,
}

impl CssSchema {
    /// The CSS 2.1 schema that ships with this crate.
    pub fn default_schema() -> Result<CssSchema, ConfigError> {
        CssSchema::from_json(DEFAULT_PROPERTIES, DEFAULT_FUNCTIONS)
    }

    pub fn from_paths(properties: &Path, functions: &Path) -> Result<CssSchema, ConfigError> {
        let properties = fs::read_to_string(properties)?;
        let functions = fs::read_to_string(functions)?;
        CssSchema::from_json(&properties, &functions)
    }

    /// Builds a schema from a property/symbol whitelist and a function
    /// whitelist, both JSON.
    pub fn from_json(properties: &str, functions: &str) -> Result<CssSchema, ConfigError> {
        let properties: WhiteList = serde_json::from_str(properties)?;
        let functions: WhiteList = serde_json::from_str(functions)?;
        log::debug!(
            "Loading CSS schema {:?} with {} types",
            properties.description.as_deref().unwrap_or(""),
            properties.types.len()
        );
        CssSchema::load(properties, functions)
    }

    fn load(properties: WhiteList, functions: WhiteList) -> Result<CssSchema, ConfigError> {
        let by_key: HashMap<&str, &TypeDefinition> = properties
            .types
            .iter()
            .map(|definition| (definition.key.as_str(), definition))
            .collect();

        let mut schema = CssSchema {
            properties: HashMap::new(),
            symbols: HashMap::new(),
            properties_allowed: properties.allowed.iter().map(|key| Name::css(key)).collect(),
            functions_allowed: functions.allowed.iter().map(|key| Name::css(key)).collect(),
            keywords: HashSet::new(),
        };

        for definition in &properties.types {
            let definition = match definition.alias {
                Some(ref alias) => {
                    let base = by_key.get(alias.as_str()).ok_or_else(|| {
                        ConfigError::UnknownAlias(definition.key.clone(), alias.clone())
                    })?;
                    definition.merged_with(base)
                },
                None => definition.clone(),
            };
            match definition
                .key
                .strip_prefix('<')
                .and_then(|key| key.strip_suffix('>'))
            {
                Some(symbol) => schema.define_symbol(symbol, &definition)?,
                None => schema.define_property(&definition)?,
            }
        }

        schema.check_references()?;

        let mut keywords = HashSet::new();
        let signatures = schema
            .properties
            .values()
            .map(|info| &info.signature)
            .chain(schema.symbols.values().map(|info| &info.signature));
        for signature in signatures {
            keywords.extend(signature.keywords().into_iter().map(Name::css));
        }
        keywords.insert(Name::css("initial"));
        schema.keywords = keywords;

        Ok(schema)
    }

    fn define_symbol(&mut self, key: &str, definition: &TypeDefinition) -> Result<(), ConfigError> {
        if !CSS_IDENTIFIER.is_match(key) {
            return Err(ConfigError::BadSymbolName(key.to_owned()));
        }
        let name = Name::css(key);
        if is_builtin_symbol(&name) {
            return Err(ConfigError::BuiltinSymbolRedefined(key.to_owned()));
        }
        let signature = parse_signature(key, definition)?;
        self.symbols
            .insert(name.clone(), SymbolInfo { name, signature });
        Ok(())
    }

    fn define_property(&mut self, definition: &TypeDefinition) -> Result<(), ConfigError> {
        let key = definition.key.as_str();
        if !CSS_IDENTIFIER.is_match(key) {
            return Err(ConfigError::BadPropertyName(key.to_owned()));
        }
        if definition.default.as_deref() == Some("") {
            return Err(ConfigError::EmptyDefault(key.to_owned()));
        }
        let dom2properties = match definition.dom2property {
            None => vec![],
            Some(OneOrMany::One(ref name)) => vec![name.clone()],
            Some(OneOrMany::Many(ref names)) => names.clone(),
        };
        if let Some(bad) = dom2properties
            .iter()
            .find(|name| !JS_IDENTIFIER.is_match(name))
        {
            return Err(ConfigError::BadDom2Name {
                property: key.to_owned(),
                dom2_name: bad.clone(),
            });
        }

        let signature = parse_signature(key, definition)?;
        let name = Name::css(key);
        self.properties.insert(
            name.clone(),
            PropertyInfo {
                name,
                signature,
                default_value: definition.default.clone(),
                applies_to: Criterion::from_config(definition.applies_to.as_ref()),
                inherited: definition.inherited.unwrap_or(false),
                media_groups: Criterion::from_config(definition.media_groups.as_ref()),
                dom2properties,
            },
        );
        Ok(())
    }

    /// Every `<symbol>` must be built in or defined, and every `'property'`
    /// must be defined.
    fn check_references(&self) -> Result<(), ConfigError> {
        let signatures = self
            .properties
            .values()
            .map(|info| (&info.name, &info.signature))
            .chain(
                self.symbols
                    .values()
                    .map(|info| (&info.name, &info.signature)),
            );
        for (owner, signature) in signatures {
            let mut error = None;
            signature.walk(&mut |part| {
                if error.is_some() {
                    return;
                }
                match part {
                    Signature::Symbol { name, range } => {
                        if is_builtin_symbol(name) {
                            return;
                        }
                        if !self.symbols.contains_key(name) {
                            error = Some(ConfigError::UndefinedSymbol(
                                owner.to_string(),
                                name.to_string(),
                            ));
                        } else if range.is_some() {
                            error = Some(ConfigError::RangeOnSchemaSymbol(
                                owner.to_string(),
                                name.to_string(),
                            ));
                        }
                    },
                    Signature::PropertyRef(name) => {
                        if !self.properties.contains_key(name) {
                            error = Some(ConfigError::UndefinedProperty(
                                owner.to_string(),
                                name.to_string(),
                            ));
                        }
                    },
                    _ => {},
                }
            });
            if let Some(error) = error {
                return Err(error);
            }
        }
        Ok(())
    }

    pub fn property(&self, name: &Name) -> Option<&PropertyInfo> {
        self.properties.get(name)
    }

    pub fn symbol(&self, name: &Name) -> Option<&SymbolInfo> {
        self.symbols.get(name)
    }

    pub fn is_keyword(&self, name: &Name) -> bool {
        self.keywords.contains(name)
    }

    pub fn is_function_allowed(&self, name: &Name) -> bool {
        self.functions_allowed.contains(name)
    }

    pub fn is_property_allowed(&self, name: &Name) -> bool {
        self.properties_allowed.contains(name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &Name> {
        self.properties.keys()
    }
}

fn parse_signature(key: &str, definition: &TypeDefinition) -> Result<Signature, ConfigError> {
    let text = definition
        .signature
        .as_deref()
        .ok_or_else(|| ConfigError::MissingSignature(key.to_owned()))?;
    Signature::parse(text).map_err(|source| ConfigError::Signature {
        name: key.to_owned(),
        signature: text.to_owned(),
        source,
    })
}
