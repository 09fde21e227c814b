/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashMap;

use cssparser::SourceLocation;
use url::Url;

/// A URL found in untrusted content.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalReference {
    /// Already resolved against the stylesheet's base URL.
    pub uri: Url,
    pub location: SourceLocation,
}

/// What following the reference does.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UriEffect {
    /// The URL is only mentioned.
    NotLoaded,
    /// The content is loaded into the current document, e.g. an image.
    SameDocument,
    /// The URL replaces or opens a document, e.g. a link.
    NewDocument,
}

/// How the content behind the reference is loaded.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LoaderType {
    /// Loaded as inert data.
    Data,
    /// Loaded in a way that cannot run script outside the sandbox.
    Sandboxed,
    Unsandboxed,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UriPolicyHintKey {
    /// The property part that the URL was matched as, e.g.
    /// `background-image::uri`.
    CssProp,
}

/// Decides which URLs untrusted content may refer to.
pub trait UriPolicy {
    /// Returns the URL to emit in place of `reference`, or `None` to deny
    /// it.
    fn rewrite_uri(
        &self,
        reference: &ExternalReference,
        effect: UriEffect,
        loader: LoaderType,
        hints: &HashMap<UriPolicyHintKey, String>,
    ) -> Option<String>;
}

/// Denies every URL.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenyAllUriPolicy;

impl UriPolicy for DenyAllUriPolicy {
    fn rewrite_uri(
        &self,
        reference: &ExternalReference,
        _: UriEffect,
        _: LoaderType,
        _: &HashMap<UriPolicyHintKey, String>,
    ) -> Option<String> {
        log::debug!("Denying {}", reference.uri);
        None
    }
}
