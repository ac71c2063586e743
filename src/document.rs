//! Document model: a nanopublication as a set of quads, plus the index view.
//!
//! An index is an ordinary nanopublication whose head subject is typed
//! `npx:NanopubIndex` and which lists other nanopublications as elements,
//! sub-indexes, and at most one appended index. [`Document::kind`] exposes
//! that structure as a tagged variant so the scheduler never walks raw quads.

use crate::error::{Error, ParseError, Result};
use crate::identifier::{self, ArtifactCode};
use serde::{Deserialize, Serialize};

/// RDF `type` predicate
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
/// Class of every nanopublication
pub const NANOPUBLICATION: &str = "http://www.nanopub.org/nschema#Nanopublication";
/// Class of index nanopublications
pub const NANOPUB_INDEX: &str = "http://purl.org/nanopub/x/NanopubIndex";
/// Index member that is a leaf nanopublication
pub const INCLUDES_ELEMENT: &str = "http://purl.org/nanopub/x/includesElement";
/// Index member that is itself an index
pub const INCLUDES_SUBINDEX: &str = "http://purl.org/nanopub/x/includesSubindex";
/// Continuation of a long index
pub const APPENDS_INDEX: &str = "http://purl.org/nanopub/x/appendsIndex";

/// An RDF term
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Term {
    /// IRI reference
    Iri {
        /// The IRI
        value: String,
    },
    /// Blank node
    Blank {
        /// Local label without the `_:` prefix
        value: String,
    },
    /// Literal value
    Literal {
        /// Lexical form
        value: String,
        /// Datatype IRI, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        /// Language tag, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
}

impl Term {
    /// Construct an IRI term
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri {
            value: value.into(),
        }
    }

    /// Construct a plain literal
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    /// The IRI, if this term is one
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri { value } => Some(value),
            _ => None,
        }
    }
}

/// One statement, optionally in a named graph
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quad {
    /// Subject (IRI or blank node)
    pub subject: Term,
    /// Predicate IRI
    pub predicate: Term,
    /// Object
    pub object: Term,
    /// Graph name; `None` is the default graph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<Term>,
}

impl Quad {
    /// Quad made of IRIs, the common case in nanopub head and pubinfo graphs
    pub fn iris(subject: &str, predicate: &str, object: &str, graph: Option<&str>) -> Self {
        Self {
            subject: Term::iri(subject),
            predicate: Term::iri(predicate),
            object: Term::iri(object),
            graph: graph.map(Term::iri),
        }
    }
}

/// A resolved nanopublication
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// URI of the nanopublication (carries its artifact code)
    pub uri: String,
    /// All statements of the nanopublication
    pub quads: Vec<Quad>,
}

/// Index structure of a document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexDocument {
    /// Leaf members, in document order
    pub elements: Vec<String>,
    /// Member indexes, in document order
    pub sub_indexes: Vec<String>,
    /// Continuation of this index
    pub appended_index: Option<String>,
}

/// What a document is, as far as traversal is concerned
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    /// Plain content
    Leaf,
    /// Index over further documents
    Index(IndexDocument),
}

impl Document {
    /// Build a document from quads, locating the nanopublication URI
    pub fn from_quads(quads: Vec<Quad>) -> std::result::Result<Self, ParseError> {
        let uri = quads
            .iter()
            .find(|q| {
                q.predicate.as_iri() == Some(RDF_TYPE)
                    && q.object.as_iri() == Some(NANOPUBLICATION)
            })
            .and_then(|q| q.subject.as_iri())
            .ok_or(ParseError::MissingNanopubUri)?
            .to_string();
        Ok(Self { uri, quads })
    }

    /// Artifact code carried by the document URI, if well-formed
    pub fn artifact_code(&self) -> Option<ArtifactCode> {
        identifier::trailing_code(&self.uri).and_then(|code| ArtifactCode::parse(code).ok())
    }

    /// Whether the document declares itself an index
    pub fn is_index(&self) -> bool {
        self.quads.iter().any(|q| {
            q.subject.as_iri() == Some(self.uri.as_str())
                && q.predicate.as_iri() == Some(RDF_TYPE)
                && q.object.as_iri() == Some(NANOPUB_INDEX)
        })
    }

    /// Classify the document as leaf or index
    ///
    /// Members are collected from statements about the document URI in any
    /// graph, keeping first-seen order and dropping repeats.
    pub fn kind(&self) -> Result<DocumentKind> {
        if !self.is_index() {
            return Ok(DocumentKind::Leaf);
        }

        let mut index = IndexDocument::default();
        for quad in &self.quads {
            if quad.subject.as_iri() != Some(self.uri.as_str()) {
                continue;
            }
            let (Some(predicate), Some(member)) = (quad.predicate.as_iri(), quad.object.as_iri())
            else {
                continue;
            };
            match predicate {
                INCLUDES_ELEMENT => push_unique(&mut index.elements, member),
                INCLUDES_SUBINDEX => push_unique(&mut index.sub_indexes, member),
                APPENDS_INDEX => match &index.appended_index {
                    Some(existing) if existing != member => {
                        return Err(Error::MalformedIndex {
                            uri: self.uri.clone(),
                            reason: format!("appends both {existing} and {member}"),
                        });
                    }
                    _ => index.appended_index = Some(member.to_string()),
                },
                _ => {}
            }
        }
        Ok(DocumentKind::Index(index))
    }
}

fn push_unique(members: &mut Vec<String>, member: &str) {
    if !members.iter().any(|m| m == member) {
        members.push(member.to_string());
    }
}
