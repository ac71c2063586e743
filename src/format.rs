//! Serialization formats for documents.
//!
//! Two interchangeable textual formats are supported:
//! - [`Format::NQuads`]: one statement per line, the canonical wire format
//! - [`Format::JsonLines`]: one JSON object per document
//!
//! Gzip is not a format of its own; it wraps the output stream (see [`crate::output`]).

use crate::document::{Document, Quad, Term};
use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Document serialization format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// N-Quads
    #[default]
    NQuads,
    /// Newline-delimited JSON, one document per line
    JsonLines,
}

impl Format {
    /// MIME type used in `Accept` headers
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::NQuads => "application/n-quads",
            Format::JsonLines => "application/x-ndjson",
        }
    }

    /// Look up a format by short name (`nq`, `json`, ...), ignoring a `.gz` suffix
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim_start_matches('.').to_ascii_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        match name {
            "nq" | "nquads" | "n-quads" => Some(Format::NQuads),
            "json" | "jsonl" | "ndjson" => Some(Format::JsonLines),
            _ => None,
        }
    }

    /// Detect a format from a file name such as `out.nq.gz`
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".gz").unwrap_or(file_name);
        let (_, extension) = stem.rsplit_once('.')?;
        Self::from_name(extension)
    }

    /// Parse a payload in this format
    pub fn parse(&self, bytes: &[u8]) -> Result<Document, ParseError> {
        match self {
            Format::NQuads => {
                let text = std::str::from_utf8(bytes).map_err(|_| ParseError::Utf8)?;
                Document::from_quads(parse_nquads(text)?)
            }
            Format::JsonLines => Ok(serde_json::from_slice(bytes)?),
        }
    }

    /// Write a document in this format
    pub fn write(&self, doc: &Document, out: &mut dyn Write) -> std::io::Result<()> {
        match self {
            Format::NQuads => {
                for quad in &doc.quads {
                    writeln!(out, "{}", quad_line(quad))?;
                }
                Ok(())
            }
            Format::JsonLines => {
                serde_json::to_writer(&mut *out, doc)?;
                out.write_all(b"\n")
            }
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::NQuads => write!(f, "nq"),
            Format::JsonLines => write!(f, "jsonl"),
        }
    }
}

/// Render a quad as an N-Quads line (without the newline)
pub fn quad_line(quad: &Quad) -> String {
    let mut line = format!(
        "{} {} {}",
        term_text(&quad.subject),
        term_text(&quad.predicate),
        term_text(&quad.object)
    );
    if let Some(graph) = &quad.graph {
        line.push(' ');
        line.push_str(&term_text(graph));
    }
    line.push_str(" .");
    line
}

fn term_text(term: &Term) -> String {
    match term {
        Term::Iri { value } => format!("<{value}>"),
        Term::Blank { value } => format!("_:{value}"),
        Term::Literal {
            value,
            datatype,
            language,
        } => {
            let mut text = String::with_capacity(value.len() + 2);
            text.push('"');
            for c in value.chars() {
                match c {
                    '"' => text.push_str("\\\""),
                    '\\' => text.push_str("\\\\"),
                    '\n' => text.push_str("\\n"),
                    '\r' => text.push_str("\\r"),
                    '\t' => text.push_str("\\t"),
                    c => text.push(c),
                }
            }
            text.push('"');
            if let Some(lang) = language {
                text.push('@');
                text.push_str(lang);
            } else if let Some(dt) = datatype {
                text.push_str("^^<");
                text.push_str(dt);
                text.push('>');
            }
            text
        }
    }
}

/// Parse an N-Quads document into quads
pub fn parse_nquads(text: &str) -> Result<Vec<Quad>, ParseError> {
    let mut quads = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut cursor = Cursor {
            line: index + 1,
            rest: line,
        };
        let subject = cursor.term()?;
        let predicate = cursor.term()?;
        let object = cursor.term()?;
        let graph = if cursor.peek() == Some('.') {
            None
        } else {
            Some(cursor.term()?)
        };
        cursor.expect('.')?;
        if !cursor.rest.trim_start().is_empty() && !cursor.rest.trim_start().starts_with('#') {
            return Err(cursor.error("trailing content after '.'"));
        }
        if matches!(subject, Term::Literal { .. }) {
            return Err(cursor.error("literal in subject position"));
        }
        if !matches!(predicate, Term::Iri { .. }) {
            return Err(cursor.error("predicate must be an IRI"));
        }
        quads.push(Quad {
            subject,
            predicate,
            object,
            graph,
        });
    }
    Ok(quads)
}

struct Cursor<'a> {
    line: usize,
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn error(&self, message: &str) -> ParseError {
        ParseError::Syntax {
            line: self.line,
            message: message.to_string(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.rest = self.rest.trim_start();
        self.rest.chars().next()
    }

    fn expect(&mut self, c: char) -> Result<(), ParseError> {
        if self.peek() == Some(c) {
            self.rest = &self.rest[c.len_utf8()..];
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn term(&mut self) -> Result<Term, ParseError> {
        match self.peek() {
            Some('<') => Ok(Term::Iri { value: self.iri()? }),
            Some('_') => {
                let rest = self
                    .rest
                    .strip_prefix("_:")
                    .ok_or_else(|| self.error("expected '_:'"))?;
                let end = rest
                    .find(|c: char| c.is_whitespace())
                    .unwrap_or(rest.len());
                if end == 0 {
                    return Err(self.error("empty blank node label"));
                }
                let label = rest[..end].trim_end_matches('.');
                let consumed = label.len();
                self.rest = &rest[consumed..];
                Ok(Term::Blank {
                    value: label.to_string(),
                })
            }
            Some('"') => self.literal(),
            Some(_) => Err(self.error("expected a term")),
            None => Err(self.error("unexpected end of line")),
        }
    }

    fn iri(&mut self) -> Result<String, ParseError> {
        self.expect('<')?;
        let end = self
            .rest
            .find('>')
            .ok_or_else(|| self.error("unterminated IRI"))?;
        let value = &self.rest[..end];
        if value.chars().any(|c| c.is_whitespace() || c == '<') {
            return Err(self.error("invalid character in IRI"));
        }
        self.rest = &self.rest[end + 1..];
        Ok(value.to_string())
    }

    fn literal(&mut self) -> Result<Term, ParseError> {
        self.expect('"')?;
        let body = self.rest;
        let mut value = String::new();
        let mut chars = body.char_indices();
        let close = loop {
            match chars.next() {
                Some((i, '"')) => break i,
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, 'u')) => value.push(self.unicode_escape(&mut chars, 4)?),
                    Some((_, 'U')) => value.push(self.unicode_escape(&mut chars, 8)?),
                    _ => return Err(self.error("invalid escape in literal")),
                },
                Some((_, c)) => value.push(c),
                None => return Err(self.error("unterminated literal")),
            }
        };
        self.rest = &body[close + 1..];

        let mut datatype = None;
        let mut language = None;
        if let Some(tagged) = self.rest.strip_prefix('@') {
            let end = tagged
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
                .unwrap_or(tagged.len());
            if end == 0 {
                return Err(self.error("empty language tag"));
            }
            language = Some(tagged[..end].to_string());
            self.rest = &tagged[end..];
        } else if let Some(typed) = self.rest.strip_prefix("^^") {
            self.rest = typed;
            datatype = Some(self.iri()?);
        }
        Ok(Term::Literal {
            value,
            datatype,
            language,
        })
    }

    fn unicode_escape(
        &self,
        chars: &mut std::str::CharIndices<'_>,
        digits: usize,
    ) -> Result<char, ParseError> {
        let hex: String = chars.by_ref().take(digits).map(|(_, c)| c).collect();
        if hex.len() != digits {
            return Err(self.error("truncated unicode escape"));
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid unicode escape"))
    }
}
