/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::signature::SignatureError;

/// Errors raised while building a [`crate::CssSchema`] or an
/// [`crate::HtmlSchema`] from configuration.
///
/// These are the only failures that abort. Everything found in untrusted
/// CSS is reported through a [`crate::MessageQueue`] instead.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The whitelist is not valid JSON or does not have the expected shape.
    #[error("malformed whitelist: {0}")]
    Json(#[from] serde_json::Error),
    /// A whitelist file could not be read.
    #[error("cannot read whitelist: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing signature of {name} `{signature}`: {source}")]
    Signature {
        name: String,
        signature: String,
        #[source]
        source: SignatureError,
    },
    #[error("missing signature for {0}")]
    MissingSignature(String),
    #[error("bad property name: {0}")]
    BadPropertyName(String),
    #[error("bad symbol name: {0}")]
    BadSymbolName(String),
    #[error("bad default value for {0}, use null instead")]
    EmptyDefault(String),
    #[error("bad DOM2 name {dom2_name} for property {property}")]
    BadDom2Name { property: String, dom2_name: String },
    #[error("{0} is an alias of undefined type {1}")]
    UnknownAlias(String, String),
    #[error("signature of {0} refers to undefined symbol <{1}>")]
    UndefinedSymbol(String, String),
    #[error("symbol <{0}> is built in and cannot be redefined")]
    BuiltinSymbolRedefined(String),
    #[error("signature of {0} puts a range on <{1}>, which is not a built in quantity")]
    RangeOnSchemaSymbol(String, String),
    #[error("signature of {0} refers to undefined property '{1}'")]
    UndefinedProperty(String, String),
    #[error("bad element name: {0}")]
    BadElementName(String),
}
