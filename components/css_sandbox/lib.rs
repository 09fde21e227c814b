/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Validation and rewriting of untrusted CSS so that it can be embedded in a
//! host page without running script, leaking browsing history, or loading
//! URLs the embedder did not approve.
//!
//! The pipeline is driven by a [`CssSchema`] describing which properties
//! exist and what values they accept. The [`CssValidator`] matches every
//! declaration against its signature and annotates the tree. The
//! [`CssRewriter`] then uses those annotations together with a [`UriPolicy`]
//! to remove or transform whatever is unsafe.

#![deny(unsafe_code)]

pub mod colors;
mod error;
pub mod html;
pub mod messages;
mod name;
pub mod parser;
mod resolver;
pub mod rewriter;
pub mod schema;
pub mod signature;
pub mod tree;
pub mod uri_policy;
pub mod validator;

pub use crate::error::ConfigError;
pub use crate::html::{HtmlSchema, JsonHtmlSchema};
pub use crate::messages::{
    Message, MessageKind, MessageLevel, MessagePart, MessageQueue, SimpleMessageQueue,
};
pub use crate::name::Name;
pub use crate::parser::parse_stylesheet;
pub use crate::resolver::MAX_BRANCHING_FACTOR;
pub use crate::rewriter::CssRewriter;
pub use crate::schema::{CssSchema, PropertyInfo, SymbolInfo};
pub use crate::signature::{Signature, SignatureError};
pub use crate::tree::{PartType, StyleSheet};
pub use crate::uri_policy::{
    DenyAllUriPolicy, ExternalReference, LoaderType, UriEffect, UriPolicy, UriPolicyHintKey,
};
pub use crate::validator::CssValidator;

/// Runs the whole safety pipeline over `sheet`: signature validation and
/// tagging, followed by every rewriting pass.
///
/// Nodes that are removed are reported at `invalid_node_message_level`.
/// Passing [`MessageLevel::Warning`] gives a best effort mode where removal
/// alone does not count as an error.
///
/// Returns whether the validator accepted the sheet as written. Callers that
/// need a strict verdict should inspect `mq` for messages at
/// [`MessageLevel::Error`] or above, since the rewriter may still remove
/// content after a successful validation.
pub fn sanitize_stylesheet(
    sheet: &mut StyleSheet,
    schema: &CssSchema,
    html_schema: &dyn HtmlSchema,
    uri_policy: &dyn UriPolicy,
    invalid_node_message_level: MessageLevel,
    mq: &mut dyn MessageQueue,
) -> bool {
    let valid = CssValidator::new(schema, html_schema)
        .with_invalid_node_message_level(invalid_node_message_level)
        .validate_css(sheet, mq);
    CssRewriter::new(schema, uri_policy)
        .with_invalid_node_message_level(invalid_node_message_level)
        .rewrite(sheet, mq);
    valid
}
