//! Content-addressed identifiers.
//!
//! A nanopublication is named by an *artifact code*: the module id `RA`
//! followed by the unpadded base64url SHA-256 digest of the document (43
//! characters). Users may give either the bare code or any absolute URI that
//! ends in one, e.g. `http://purl.org/np/RA...`.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Module id for RDF-graph content hashes
pub const MODULE_ID: &str = "RA";

/// Length of a full artifact code (module id + digest)
pub const ARTIFACT_CODE_LEN: usize = 45;

#[allow(clippy::expect_used)]
static ARTIFACT_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^RA[A-Za-z0-9_-]{43}$").expect("artifact code pattern is valid")
});

/// A validated artifact code
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactCode(String);

impl ArtifactCode {
    /// Normalize user input (URI or bare code) to an artifact code
    ///
    /// Input containing `:` is treated as a URI; otherwise it must be a bare code.
    /// Nothing is fetched: malformed input is rejected here.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.contains(':') {
            Self::from_uri(input)
        } else if ARTIFACT_CODE.is_match(input) {
            Ok(Self(input.to_string()))
        } else {
            Err(invalid(input, "not a well-formed artifact code"))
        }
    }

    /// Extract the artifact code that ends a URI
    pub fn from_uri(uri: &str) -> Result<Self> {
        let parsed =
            url::Url::parse(uri).map_err(|e| invalid(uri, &format!("not a valid URI: {e}")))?;
        if parsed.cannot_be_a_base() && parsed.scheme() != "urn" {
            return Err(invalid(uri, "not a hierarchical URI"));
        }
        trailing_code(uri)
            .map(|code| Self(code.to_string()))
            .ok_or_else(|| invalid(uri, "not a well-formed trusty URI"))
    }

    /// The code itself
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Find the artifact code at the end of `text`, if any
///
/// The code is the last 45 characters of the trailing run of base64url characters.
pub(crate) fn trailing_code(text: &str) -> Option<&str> {
    let run_start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_code_char(*c))
        .last()
        .map(|(i, _)| i)?;
    let run = &text[run_start..];
    if run.len() < ARTIFACT_CODE_LEN {
        return None;
    }
    let code = &run[run.len() - ARTIFACT_CODE_LEN..];
    ARTIFACT_CODE.is_match(code).then_some(code)
}

fn is_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn invalid(input: &str, reason: &str) -> Error {
    Error::InvalidIdentifier {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

impl std::fmt::Display for ArtifactCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ArtifactCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ArtifactCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ArtifactCode> for String {
    fn from(code: ArtifactCode) -> Self {
        code.0
    }
}

impl AsRef<str> for ArtifactCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
