/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt;

use serde::{Deserialize, Deserializer};

/// A CSS or HTML identifier compared ASCII case-insensitively.
///
/// The canonical form is the lower-cased text, so two names that differ only
/// in case hash and compare equal.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Name(String);

impl Name {
    pub fn css(value: &str) -> Name {
        Name(value.to_ascii_lowercase())
    }

    pub fn canonical_form(&self) -> &str {
        &self.0
    }

    /// `self::child`, the name used to tag terms matched inside a symbol.
    pub(crate) fn qualify(&self, child: &Name) -> Name {
        Name(format!("{}::{}", self.0, child.0))
    }

    pub fn ends_with(&self, suffix: &str) -> bool {
        self.0.ends_with(&suffix.to_ascii_lowercase())
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Name {
        Name::css(value)
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Name, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Name::css(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_ignore_case() {
        assert_eq!(Name::css("Background-Color"), Name::css("background-color"));
        assert_eq!(Name::css("DIV").canonical_form(), "div");
        assert!(Name::css("p") == "P");
    }

    #[test]
    fn test_qualified_names() {
        let property = Name::css("font-family");
        let qualified = property.qualify(&Name::css("family-name"));
        assert_eq!(qualified.canonical_form(), "font-family::family-name");
        assert!(qualified.ends_with("::Family-Name"));
    }
}
