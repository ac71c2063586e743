//! Content-address computation and verification.
//!
//! The digest covers the document with its own artifact code blanked out:
//! every IRI has each occurrence of the code replaced by a single space, the
//! quads are rendered as N-Quads lines, sorted, joined with `\n` and hashed
//! with SHA-256. The code is `RA` + the unpadded base64url digest.

use crate::document::{Document, Quad, Term};
use crate::error::ParseError;
use crate::format::quad_line;
use crate::identifier::{ArtifactCode, MODULE_ID};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Check that a document matches the artifact code in its own URI
pub fn is_valid_content_addressed(doc: &Document) -> bool {
    match doc.artifact_code() {
        Some(code) => compute_code(&doc.quads, code.as_str()) == code.as_str(),
        None => false,
    }
}

/// Compute the artifact code of `quads`, treating `self_reference` as the blanked-out code
pub fn compute_code(quads: &[Quad], self_reference: &str) -> String {
    let mut lines: Vec<String> = quads
        .iter()
        .map(|quad| quad_line(&blank_out(quad, self_reference, " ")))
        .collect();
    lines.sort_unstable();

    let mut hasher = Sha256::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(line.as_bytes());
    }
    format!("{}{}", MODULE_ID, URL_SAFE_NO_PAD.encode(hasher.finalize()))
}

/// Turn a document template into a content-addressed document
///
/// The template is written with `placeholder` wherever the artifact code
/// belongs (at least at the end of the nanopublication URI). The returned
/// document carries the computed code in its place; a template whose URI
/// does not end in the placeholder is rejected.
pub fn seal(template: Vec<Quad>, placeholder: &str) -> Result<(ArtifactCode, Document), ParseError> {
    let code = compute_code(&template, placeholder);
    let quads = template
        .iter()
        .map(|quad| blank_out(quad, placeholder, &code))
        .collect();
    let doc = Document::from_quads(quads)?;
    let code = doc.artifact_code().ok_or(ParseError::MissingNanopubUri)?;
    Ok((code, doc))
}

fn blank_out(quad: &Quad, needle: &str, replacement: &str) -> Quad {
    let replace_in_iri = |term: &Term| match term {
        Term::Iri { value } => Term::iri(value.replace(needle, replacement)),
        other => other.clone(),
    };
    Quad {
        subject: replace_in_iri(&quad.subject),
        predicate: replace_in_iri(&quad.predicate),
        object: replace_in_iri(&quad.object),
        graph: quad.graph.as_ref().map(replace_in_iri),
    }
}
